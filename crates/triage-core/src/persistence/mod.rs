pub mod board_codec;
pub mod board_store;
pub mod memory;

pub use board_codec::{
    decode_board, encode_board, format_timestamp, parse_timestamp, to_date_time,
};
pub use board_store::{BoardPersistence, PersistenceHealth};
pub use memory::InMemoryKeyValueStore;

use crate::models::CoreError;

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Durable string store the board is flushed into.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PersistenceResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PersistenceResult<()>;
}
