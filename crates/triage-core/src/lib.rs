pub mod clock;
pub mod config;
pub mod ids;
pub mod logging;
pub mod models;
pub mod notification;
pub mod orchestration;
pub mod persistence;
pub mod sqlite;
pub mod tracking;
