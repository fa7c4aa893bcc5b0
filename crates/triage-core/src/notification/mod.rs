pub mod dispatcher;

use crate::models::CoreError;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher, notification_tag};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Not decided yet; the user has not been asked.
    #[default]
    Default,
}

impl NotificationPermission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        }
    }
}

impl std::str::FromStr for NotificationPermission {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "default" => Ok(Self::Default),
            _ => Err(()),
        }
    }
}

/// Surface that displays alerts to the user.
pub trait NotificationHost: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn request_permission(&self) -> NotificationPermission;

    fn show(&self, tag: &str, title: &str, body: &str) -> Result<(), CoreError>;
}
