pub mod store;

use std::sync::Arc;
use std::time::SystemTime;

use crate::models::{
    CompletionStatus, LengthOfStay, Patient, PatientId, StayBand, TaskId, TrackedTask,
};

pub use store::TrackingStore;

/// Immutable view of the board published after every applied mutation.
#[derive(Clone, Debug, Default)]
pub struct BoardSnapshot {
    revision: u64,
    patients: Arc<Vec<Patient>>,
}

impl BoardSnapshot {
    pub(crate) fn new(revision: u64, patients: Vec<Patient>) -> Self {
        Self {
            revision,
            patients: Arc::new(patients),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Patients in arrival order, oldest first.
    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn patient(&self, patient_id: &PatientId) -> Option<&Patient> {
        self.patients.iter().find(|patient| &patient.id == patient_id)
    }

    pub fn task(&self, patient_id: &PatientId, task_id: &TaskId) -> Option<&TrackedTask> {
        self.patient(patient_id)
            .and_then(|patient| patient.task(task_id))
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }
}

/// Emitted once per rising edge of a task's expiry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpiryEvent {
    pub patient_id: PatientId,
    pub patient_name: String,
    pub task_id: TaskId,
    pub task_text: String,
    pub timer_end: SystemTime,
    pub completion_status: CompletionStatus,
    /// Acknowledgement state just before the edge reset it.
    pub was_acknowledged: bool,
}

impl ExpiryEvent {
    pub(crate) fn new(
        patient: &Patient,
        task: &TrackedTask,
        was_acknowledged: bool,
    ) -> Option<Self> {
        Some(Self {
            patient_id: patient.id.clone(),
            patient_name: patient.name.clone(),
            task_id: task.id.clone(),
            task_text: task.text.clone(),
            timer_end: task.timer_end?,
            completion_status: task.completion_status,
            was_acknowledged,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TimerEvaluation {
    /// Timer still running.
    Pending { timer_end: SystemTime },
    /// Timer elapsed; `event` is present only on the evaluation that observed
    /// the transition.
    Expired { event: Option<ExpiryEvent> },
    /// No timer, task complete, or the task no longer exists.
    Inactive,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatientStay {
    pub patient_id: PatientId,
    pub patient_name: String,
    pub length_of_stay: LengthOfStay,
    pub band: StayBand,
}
