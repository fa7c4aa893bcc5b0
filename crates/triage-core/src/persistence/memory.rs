use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{CoreError, CoreErrorKind};
use crate::persistence::{KeyValueStore, PersistenceResult};

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        store
    }

    fn lock_entries(&self) -> PersistenceResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| {
            CoreError::new(
                CoreErrorKind::Internal,
                "in-memory key-value store mutex poisoned",
            )
        })
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.lock_entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()> {
        self.lock_entries()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
