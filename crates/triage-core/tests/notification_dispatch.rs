use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use triage_core::models::{CompletionStatus, CoreError, CoreErrorKind, PatientId, TaskId};
use triage_core::notification::{
    DispatchOutcome, NotificationDispatcher, NotificationHost, NotificationPermission,
    notification_tag,
};
use triage_core::tracking::ExpiryEvent;

struct RecordingHost {
    permission: Mutex<NotificationPermission>,
    answer: NotificationPermission,
    prompts: AtomicUsize,
    failing: AtomicBool,
    shown: Mutex<Vec<(String, String, String)>>,
}

impl RecordingHost {
    fn new(initial: NotificationPermission, answer: NotificationPermission) -> Arc<Self> {
        Arc::new(Self {
            permission: Mutex::new(initial),
            answer,
            prompts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            shown: Mutex::new(Vec::new()),
        })
    }

    fn shown(&self) -> Vec<(String, String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

impl NotificationHost for RecordingHost {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap()
    }

    fn request_permission(&self) -> NotificationPermission {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        *self.permission.lock().unwrap() = self.answer;
        self.answer
    }

    fn show(&self, tag: &str, title: &str, body: &str) -> Result<(), CoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::new(
                CoreErrorKind::NotificationFailure,
                "notification center unavailable",
            ));
        }
        self.shown
            .lock()
            .unwrap()
            .push((tag.to_string(), title.to_string(), body.to_string()));
        Ok(())
    }
}

fn expiry(task_id: &str, timer_end_secs: u64) -> ExpiryEvent {
    ExpiryEvent {
        patient_id: PatientId::from("patient-1"),
        patient_name: "Ada Lovelace".to_string(),
        task_id: TaskId::from(task_id),
        task_text: "Repeat troponin".to_string(),
        timer_end: timer_end(timer_end_secs),
        completion_status: CompletionStatus::Incomplete,
        was_acknowledged: false,
    }
}

fn timer_end(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

#[test]
fn delivers_with_stable_tag_title_and_body() {
    let host = RecordingHost::new(NotificationPermission::Granted, NotificationPermission::Granted);
    let dispatcher = NotificationDispatcher::new(host.clone());

    assert_eq!(
        dispatcher.dispatch(&expiry("task-17", 1_000)),
        DispatchOutcome::Delivered
    );
    assert_eq!(
        host.shown(),
        vec![(
            "task-task-17".to_string(),
            "Task Timer Expired: Ada Lovelace".to_string(),
            "Repeat troponin".to_string()
        )]
    );
    assert_eq!(notification_tag(&TaskId::from("42")), "task-42");
    assert_eq!(host.prompts.load(Ordering::SeqCst), 0);
}

#[test]
fn same_deadline_never_fires_twice() {
    let host = RecordingHost::new(NotificationPermission::Granted, NotificationPermission::Granted);
    let dispatcher = NotificationDispatcher::new(host.clone());

    dispatcher.dispatch(&expiry("task-1", 1_000));
    assert_eq!(
        dispatcher.dispatch(&expiry("task-1", 1_000)),
        DispatchOutcome::Duplicate
    );
    assert_eq!(
        dispatcher.dispatch(&expiry("task-1", 1_900)),
        DispatchOutcome::Delivered
    );
    assert_eq!(host.shown().len(), 2);
    assert_eq!(dispatcher.delivered_count(), 1);
}

#[test]
fn forgotten_tasks_can_fire_again() {
    let host = RecordingHost::new(NotificationPermission::Granted, NotificationPermission::Granted);
    let dispatcher = NotificationDispatcher::new(host.clone());

    dispatcher.dispatch(&expiry("task-1", 1_000));
    dispatcher.forget_task(&TaskId::from("task-1"));
    assert_eq!(dispatcher.delivered_count(), 0);
    assert_eq!(
        dispatcher.dispatch(&expiry("task-1", 1_000)),
        DispatchOutcome::Delivered
    );
}

#[test]
fn acknowledged_or_complete_expiries_are_suppressed() {
    let host = RecordingHost::new(NotificationPermission::Granted, NotificationPermission::Granted);
    let dispatcher = NotificationDispatcher::new(host.clone());

    let mut acknowledged = expiry("task-1", 1_000);
    acknowledged.was_acknowledged = true;
    let mut complete = expiry("task-2", 1_000);
    complete.completion_status = CompletionStatus::Complete;

    assert_eq!(dispatcher.dispatch(&acknowledged), DispatchOutcome::Suppressed);
    assert_eq!(dispatcher.dispatch(&complete), DispatchOutcome::Suppressed);
    assert!(host.shown().is_empty());
}

#[test]
fn permission_is_requested_once_and_denial_is_silent() {
    let host = RecordingHost::new(NotificationPermission::Default, NotificationPermission::Denied);
    let dispatcher = NotificationDispatcher::new(host.clone());

    let outcomes = dispatcher.dispatch_all(&[expiry("task-1", 1_000), expiry("task-2", 1_000)]);

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::PermissionDenied,
            DispatchOutcome::PermissionDenied
        ]
    );
    assert_eq!(host.prompts.load(Ordering::SeqCst), 1);
    assert!(host.shown().is_empty());
}

#[test]
fn granted_prompt_delivers_the_triggering_expiry() {
    let host = RecordingHost::new(NotificationPermission::Default, NotificationPermission::Granted);
    let dispatcher = NotificationDispatcher::new(host.clone());

    assert_eq!(
        dispatcher.dispatch(&expiry("task-1", 1_000)),
        DispatchOutcome::Delivered
    );
    dispatcher.dispatch(&expiry("task-2", 1_000));
    assert_eq!(host.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(host.shown().len(), 2);
}

#[test]
fn host_failures_are_swallowed_and_retried_on_the_next_edge() {
    let host = RecordingHost::new(NotificationPermission::Granted, NotificationPermission::Granted);
    let dispatcher = NotificationDispatcher::new(host.clone());

    host.failing.store(true, Ordering::SeqCst);
    assert_eq!(
        dispatcher.dispatch(&expiry("task-1", 1_000)),
        DispatchOutcome::Failed
    );
    assert_eq!(dispatcher.delivered_count(), 0);

    host.failing.store(false, Ordering::SeqCst);
    assert_eq!(
        dispatcher.dispatch(&expiry("task-1", 1_000)),
        DispatchOutcome::Delivered
    );
}
