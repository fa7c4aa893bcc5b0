use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::models::{CompletionStatus, TaskId};
use crate::notification::{NotificationHost, NotificationPermission};
use crate::tracking::ExpiryEvent;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    Delivered,
    /// The tag already fired for this `timer_end`.
    Duplicate,
    /// The task was acknowledged or complete at the transition.
    Suppressed,
    PermissionDenied,
    /// The host rejected the notification; the error was logged.
    Failed,
}

#[derive(Default)]
struct DispatchState {
    permission_prompted: bool,
    delivered: HashMap<String, SystemTime>,
}

/// Turns expiry rising edges into host notifications, at most one per tag and
/// timer deadline.
pub struct NotificationDispatcher {
    host: Arc<dyn NotificationHost>,
    state: Mutex<DispatchState>,
}

impl NotificationDispatcher {
    pub fn new(host: Arc<dyn NotificationHost>) -> Self {
        Self {
            host,
            state: Mutex::new(DispatchState::default()),
        }
    }

    pub fn dispatch(&self, event: &ExpiryEvent) -> DispatchOutcome {
        if event.was_acknowledged || event.completion_status == CompletionStatus::Complete {
            return DispatchOutcome::Suppressed;
        }

        let tag = notification_tag(&event.task_id);
        let mut state = self.lock_state();
        if state.delivered.get(&tag) == Some(&event.timer_end) {
            tracing::debug!(tag = %tag, "expiry notification already delivered");
            return DispatchOutcome::Duplicate;
        }

        if !self.permission_granted(&mut state) {
            return DispatchOutcome::PermissionDenied;
        }

        let title = format!("Task Timer Expired: {}", event.patient_name);
        match self.host.show(&tag, &title, &event.task_text) {
            Ok(()) => {
                state.delivered.insert(tag.clone(), event.timer_end);
                tracing::info!(
                    tag = %tag,
                    patient_id = %event.patient_id,
                    "delivered expiry notification"
                );
                DispatchOutcome::Delivered
            }
            Err(error) => {
                tracing::error!(
                    tag = %tag,
                    kind = ?error.kind,
                    message = %error.message,
                    "notification host failed to show expiry"
                );
                DispatchOutcome::Failed
            }
        }
    }

    pub fn dispatch_all(&self, events: &[ExpiryEvent]) -> Vec<DispatchOutcome> {
        events.iter().map(|event| self.dispatch(event)).collect()
    }

    /// Drops the delivery record of a removed task.
    pub fn forget_task(&self, task_id: &TaskId) {
        self.lock_state()
            .delivered
            .remove(&notification_tag(task_id));
    }

    pub fn delivered_count(&self) -> usize {
        self.lock_state().delivered.len()
    }

    fn permission_granted(&self, state: &mut DispatchState) -> bool {
        let mut permission = self.host.permission();
        if permission == NotificationPermission::Default && !state.permission_prompted {
            state.permission_prompted = true;
            permission = self.host.request_permission();
            tracing::info!(permission = permission.as_str(), "notification permission requested");
        }
        permission == NotificationPermission::Granted
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn notification_tag(task_id: &TaskId) -> String {
    format!("task-{task_id}")
}
