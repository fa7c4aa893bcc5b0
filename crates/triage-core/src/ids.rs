use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{PatientId, TaskId};

/// Issues `patient-<millis>-<seq>` / `task-<millis>-<seq>` identifiers. The
/// sequence keeps ids unique when several are minted within one millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next_sequence: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patient_id(&self, now: SystemTime) -> PatientId {
        PatientId(self.mint("patient", now))
    }

    pub fn task_id(&self, now: SystemTime) -> TaskId {
        TaskId(self.mint("task", now))
    }

    fn mint(&self, prefix: &str, now: SystemTime) -> String {
        let millis = now
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{millis}-{sequence}")
    }
}
