use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::ids::IdGenerator;
use crate::models::Patient;
use crate::persistence::{KeyValueStore, PersistenceResult, decode_board, encode_board};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PersistenceHealth {
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Set once failures reach the warning threshold; cleared by the next good save.
    pub degraded: bool,
}

/// Flushes and revives the whole board under a single key.
pub struct BoardPersistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
    failure_warn_threshold: u32,
    health: Mutex<PersistenceHealth>,
}

impl BoardPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            failure_warn_threshold: 3,
            health: Mutex::new(PersistenceHealth::default()),
        }
    }

    pub fn with_failure_warn_threshold(mut self, threshold: u32) -> Self {
        self.failure_warn_threshold = threshold.max(1);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn save(&self, patients: &[Patient]) {
        let result =
            encode_board(patients).and_then(|payload| self.store.set(&self.key, &payload));
        self.record_save(result);
    }

    /// `None` means "start from the default board": nothing stored, unreadable
    /// storage, or a payload that is not a JSON array.
    pub fn load(&self, now: SystemTime, ids: &IdGenerator) -> Option<Vec<Patient>> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %self.key, "no persisted board found");
                return None;
            }
            Err(error) => {
                tracing::warn!(
                    key = %self.key,
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to read persisted board"
                );
                return None;
            }
        };

        match decode_board(&raw, now, ids) {
            Ok(patients) => {
                tracing::info!(
                    key = %self.key,
                    patients = patients.len(),
                    "loaded persisted board"
                );
                Some(patients)
            }
            Err(error) => {
                tracing::warn!(
                    key = %self.key,
                    kind = ?error.kind,
                    message = %error.message,
                    "discarding unreadable persisted board"
                );
                None
            }
        }
    }

    pub fn health(&self) -> PersistenceHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_save(&self, result: PersistenceResult<()>) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(()) => {
                if health.consecutive_failures > 0 {
                    tracing::info!(
                        key = %self.key,
                        failed_saves = health.consecutive_failures,
                        "board persistence recovered"
                    );
                }
                *health = PersistenceHealth::default();
            }
            Err(error) => {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                health.last_error = Some(error.message.clone());
                tracing::error!(
                    key = %self.key,
                    kind = ?error.kind,
                    message = %error.message,
                    consecutive_failures = health.consecutive_failures,
                    "failed to persist board; in-memory state remains authoritative"
                );
                if health.consecutive_failures == self.failure_warn_threshold {
                    health.degraded = true;
                    tracing::warn!(
                        key = %self.key,
                        consecutive_failures = health.consecutive_failures,
                        "board persistence keeps failing; recent changes exist only in memory"
                    );
                }
            }
        }
    }
}
