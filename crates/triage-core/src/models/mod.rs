pub mod error;
pub mod outcome;
pub mod patient;
pub mod task;

pub use error::{CoreError, CoreErrorKind};
pub use outcome::MutationOutcome;
pub use patient::{
    AttentionSummary, LengthOfStay, NewPatient, Patient, PatientId, PatientStatus, StayBand,
};
pub use task::{
    CompletionStatus, ExpiryTransition, MAX_TIMER_MINUTES, NewTask, SNOOZE_MINUTES, TaskId,
    TrackedTask, normalize_timer_minutes,
};
