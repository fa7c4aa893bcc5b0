use std::sync::{Mutex, PoisonError};

use triage_core::models::CoreError;
use triage_core::notification::{NotificationHost, NotificationPermission};

/// Prints alerts to stdout. Permission is granted on the first prompt unless
/// alerts were muted on the command line.
pub struct TerminalNotificationHost {
    muted: bool,
    permission: Mutex<NotificationPermission>,
}

impl TerminalNotificationHost {
    pub fn new(muted: bool) -> Self {
        let permission = if muted {
            NotificationPermission::Denied
        } else {
            NotificationPermission::Default
        };
        Self {
            muted,
            permission: Mutex::new(permission),
        }
    }
}

impl NotificationHost for TerminalNotificationHost {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_permission(&self) -> NotificationPermission {
        let mut permission = self.permission.lock().unwrap_or_else(PoisonError::into_inner);
        if *permission == NotificationPermission::Default {
            *permission = if self.muted {
                NotificationPermission::Denied
            } else {
                NotificationPermission::Granted
            };
        }
        *permission
    }

    fn show(&self, tag: &str, title: &str, body: &str) -> Result<(), CoreError> {
        println!("\x07[{tag}] {title}\n    {body}");
        Ok(())
    }
}
