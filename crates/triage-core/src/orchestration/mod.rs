pub mod stay_ticker;
pub mod timer_jobs;

pub use stay_ticker::StayTicker;
pub use timer_jobs::{TimerKey, TimerScheduler};
