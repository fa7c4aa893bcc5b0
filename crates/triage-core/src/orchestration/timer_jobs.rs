use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use crate::models::{PatientId, TaskId};
use crate::notification::NotificationDispatcher;
use crate::tracking::{BoardSnapshot, TimerEvaluation, TrackingStore};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TimerKey {
    pub patient_id: PatientId,
    pub task_id: TaskId,
}

struct TimerJob {
    timer_end: SystemTime,
    handle: AbortHandle,
}

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<TimerKey, TimerJob>,
    known_tasks: HashSet<TaskId>,
    supervisor: Option<AbortHandle>,
}

/// Keeps exactly one polling job per running timer on the board.
///
/// Jobs are reconciled against every published snapshot: re-armed timers get a
/// fresh job, and cleared, completed or removed ones lose theirs.
#[derive(Clone)]
pub struct TimerScheduler {
    store: Arc<TrackingStore>,
    dispatcher: Arc<NotificationDispatcher>,
    state: Arc<Mutex<SchedulerState>>,
}

impl TimerScheduler {
    pub fn new(store: Arc<TrackingStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Catches up on timers that lapsed while nothing was watching, then
    /// follows board updates until [`TimerScheduler::shutdown`]. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) {
        let events = self.store.resync();
        self.dispatcher.dispatch_all(&events);

        let mut updates = self.store.subscribe();
        let initial = updates.borrow_and_update().clone();
        self.reconcile(&initial);

        let scheduler = self.clone();
        let supervisor = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                scheduler.reconcile(&snapshot);
            }
            tracing::debug!("board update channel closed; timer supervisor exiting");
        });

        if let Some(previous) = self.lock_state().supervisor.replace(supervisor.abort_handle()) {
            previous.abort();
        }
        tracing::info!(
            expired_while_idle = events.len(),
            "timer scheduler started"
        );
    }

    pub fn reconcile(&self, snapshot: &BoardSnapshot) {
        let mut desired = HashMap::new();
        let mut present = HashSet::new();
        for patient in snapshot.patients() {
            for task in &patient.tasks {
                present.insert(task.id.clone());
                if let Some(timer_end) = task.timer_end
                    && task.has_running_timer()
                {
                    let key = TimerKey {
                        patient_id: patient.id.clone(),
                        task_id: task.id.clone(),
                    };
                    desired.insert(key, timer_end);
                }
            }
        }

        let mut state = self.lock_state();
        state.jobs.retain(|key, job| {
            let keep = desired.get(key) == Some(&job.timer_end) && !job.handle.is_finished();
            if !keep {
                job.handle.abort();
                tracing::debug!(task_id = %key.task_id, "cancelled timer job");
            }
            keep
        });

        for (key, timer_end) in desired {
            if state.jobs.contains_key(&key) {
                continue;
            }
            let handle = self.spawn_job(key.clone());
            tracing::debug!(task_id = %key.task_id, "scheduled timer job");
            state.jobs.insert(key, TimerJob { timer_end, handle });
        }

        for removed in state.known_tasks.difference(&present) {
            self.dispatcher.forget_task(removed);
        }
        state.known_tasks = present;
    }

    /// Timers with a live polling job, in key order.
    pub fn scheduled(&self) -> Vec<TimerKey> {
        let state = self.lock_state();
        let mut keys: Vec<TimerKey> = state
            .jobs
            .iter()
            .filter(|(_, job)| !job.handle.is_finished())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        if let Some(supervisor) = state.supervisor.take() {
            supervisor.abort();
        }
        for (_, job) in state.jobs.drain() {
            job.handle.abort();
        }
        tracing::info!("timer scheduler stopped");
    }

    fn spawn_job(&self, key: TimerKey) -> AbortHandle {
        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        let period = store.config().timer_poll_interval();

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.evaluate_task_timer(&key.patient_id, &key.task_id) {
                    TimerEvaluation::Pending { .. } => {}
                    TimerEvaluation::Expired { event } => {
                        if let Some(event) = event {
                            dispatcher.dispatch(&event);
                        }
                        break;
                    }
                    TimerEvaluation::Inactive => break,
                }
            }
            tracing::debug!(task_id = %key.task_id, "timer job finished");
        });
        join_handle.abort_handle()
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
