use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use crate::tracking::{PatientStay, TrackingStore};

/// Republishes every patient's length of stay on a fixed cadence.
pub struct StayTicker {
    store: Arc<TrackingStore>,
    report: Arc<watch::Sender<Vec<PatientStay>>>,
    handle: Mutex<Option<AbortHandle>>,
}

impl StayTicker {
    pub fn new(store: Arc<TrackingStore>) -> Self {
        let (report, _) = watch::channel(store.stay_report());
        Self {
            store,
            report: Arc::new(report),
            handle: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<PatientStay>> {
        self.report.subscribe()
    }

    pub fn latest(&self) -> Vec<PatientStay> {
        self.report.borrow().clone()
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let store = Arc::clone(&self.store);
        let report = Arc::clone(&self.report);
        let period = store.config().stay_refresh_interval();

        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = store.stay_report();
                report.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
            }
        });

        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = handle.replace(join_handle.abort_handle()) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
