use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::clock::{is_expired, remaining_label};

pub const MAX_TIMER_MINUTES: i64 = 999;
pub const SNOOZE_MINUTES: i64 = 15;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionStatus {
    Incomplete,
    InProgress,
    Complete,
}

impl CompletionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Incomplete => Self::InProgress,
            Self::InProgress => Self::Complete,
            Self::Complete => Self::Incomplete,
        }
    }
}

impl std::str::FromStr for CompletionStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "incomplete" => Ok(Self::Incomplete),
            "in-progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            _ => Err(()),
        }
    }
}

/// Task entry as supplied on patient intake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewTask {
    pub text: String,
    pub timer_minutes: Option<i64>,
}

impl NewTask {
    pub fn new(text: impl Into<String>, timer_minutes: Option<i64>) -> Self {
        Self {
            text: text.into(),
            timer_minutes,
        }
    }
}

/// Change in derived expiry observed by [`TrackedTask::evaluate`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExpiryTransition {
    Unchanged,
    Rising { was_acknowledged: bool },
    Falling,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackedTask {
    pub id: TaskId,
    pub text: String,
    pub timer_end: Option<SystemTime>,
    pub is_timer_expired: bool,
    pub completion_status: CompletionStatus,
    pub created_at: SystemTime,
    pub completed_at: Option<SystemTime>,
    pub notes: String,
    pub is_acknowledged: bool,
}

impl TrackedTask {
    pub fn new(
        id: TaskId,
        text: impl Into<String>,
        timer_minutes: Option<i64>,
        now: SystemTime,
    ) -> Self {
        let mut task = Self {
            id,
            text: text.into(),
            timer_end: None,
            is_timer_expired: false,
            completion_status: CompletionStatus::Incomplete,
            created_at: now,
            completed_at: None,
            notes: String::new(),
            is_acknowledged: false,
        };
        task.set_timer(timer_minutes, now);
        task
    }

    pub fn is_complete(&self) -> bool {
        self.completion_status == CompletionStatus::Complete
    }

    /// Expiry as derived from the clock, ignoring the cached flag.
    pub fn expired_at(&self, now: SystemTime) -> bool {
        !self.is_complete() && is_expired(self.timer_end, now)
    }

    pub fn has_running_timer(&self) -> bool {
        self.timer_end.is_some() && !self.is_timer_expired && !self.is_complete()
    }

    pub fn remaining_label(&self, now: SystemTime) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        remaining_label(self.timer_end, now)
    }

    /// Arms a fresh timer for `minutes`, or clears it when the value is absent or
    /// outside `1..=999`.
    pub fn set_timer(&mut self, minutes: Option<i64>, now: SystemTime) {
        self.timer_end = minutes
            .and_then(normalize_timer_minutes)
            .map(|minutes| now + Duration::from_secs(minutes * 60));
        self.is_timer_expired = self.expired_at(now);
        // complete tasks stay acknowledged whatever happens to the timer
        self.is_acknowledged = self.is_complete();
    }

    pub fn snooze(&mut self, now: SystemTime) {
        self.set_timer(Some(SNOOZE_MINUTES), now);
    }

    /// Returns false when there is no expired timer to acknowledge.
    pub fn acknowledge(&mut self) -> bool {
        if !self.is_timer_expired {
            return false;
        }
        self.is_acknowledged = true;
        true
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn advance_completion(&mut self, now: SystemTime) {
        self.set_completion(self.completion_status.next(), now);
    }

    pub fn set_completion(&mut self, status: CompletionStatus, now: SystemTime) {
        if status == self.completion_status {
            return;
        }
        let reopening = self.is_complete();
        self.completion_status = status;

        if status == CompletionStatus::Complete {
            self.completed_at = Some(now);
            self.is_acknowledged = true;
            self.is_timer_expired = false;
            return;
        }

        self.completed_at = None;
        if reopening {
            // an elapsed timer was already seen before completion; a running one
            // has not fired yet
            self.is_timer_expired = self.expired_at(now);
            self.is_acknowledged = self.is_timer_expired;
        }
    }

    /// Recomputes the cached expiry flag. A rising edge on an open task clears the
    /// acknowledgement so the new expiry is surfaced.
    pub fn evaluate(&mut self, now: SystemTime) -> ExpiryTransition {
        let expired = self.expired_at(now);
        if expired == self.is_timer_expired {
            return ExpiryTransition::Unchanged;
        }

        self.is_timer_expired = expired;
        if expired {
            let was_acknowledged = self.is_acknowledged;
            self.is_acknowledged = false;
            ExpiryTransition::Rising { was_acknowledged }
        } else {
            ExpiryTransition::Falling
        }
    }
}

pub fn normalize_timer_minutes(minutes: i64) -> Option<u64> {
    if (1..=MAX_TIMER_MINUTES).contains(&minutes) {
        u64::try_from(minutes).ok()
    } else {
        None
    }
}
