use std::fmt::{Display, Formatter};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::StayBandThresholds;
use crate::models::{CompletionStatus, MutationOutcome, NewTask, TaskId, TrackedTask};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub String);

impl PatientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PatientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    #[default]
    Active,
    Admitted,
    Discharged,
}

impl PatientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Admitted => "admitted",
            Self::Discharged => "discharged",
        }
    }
}

impl std::str::FromStr for PatientStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "admitted" => Ok(Self::Admitted),
            "discharged" => Ok(Self::Discharged),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub arrival_time: SystemTime,
    pub notes: String,
    pub tasks: Vec<NewTask>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LengthOfStay {
    pub total_minutes: u64,
}

impl LengthOfStay {
    pub fn between(arrival_time: SystemTime, now: SystemTime) -> Self {
        let elapsed = now.duration_since(arrival_time).unwrap_or_default();
        Self {
            total_minutes: elapsed.as_secs() / 60,
        }
    }

    pub fn hours(self) -> u64 {
        self.total_minutes / 60
    }

    pub fn minutes(self) -> u64 {
        self.total_minutes % 60
    }
}

impl Display for LengthOfStay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h {}m", self.hours(), self.minutes())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StayBand {
    Routine,
    Elevated,
    High,
    Critical,
}

impl StayBand {
    pub fn classify(stay: LengthOfStay, thresholds: &StayBandThresholds) -> Self {
        let minutes = stay.total_minutes;
        if minutes >= thresholds.critical_minutes {
            Self::Critical
        } else if minutes >= thresholds.high_minutes {
            Self::High
        } else if minutes >= thresholds.elevated_minutes {
            Self::Elevated
        } else {
            Self::Routine
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Elevated => "elevated",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AttentionSummary {
    pub incomplete: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub expired_unacknowledged: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub arrival_time: SystemTime,
    pub tasks: Vec<TrackedTask>,
    pub notes: String,
    pub status: PatientStatus,
}

impl Patient {
    pub fn task(&self, task_id: &TaskId) -> Option<&TrackedTask> {
        self.tasks.iter().find(|task| &task.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &TaskId) -> Option<&mut TrackedTask> {
        self.tasks.iter_mut().find(|task| &task.id == task_id)
    }

    pub fn add_task(
        &mut self,
        task_id: TaskId,
        text: &str,
        timer_minutes: Option<i64>,
        now: SystemTime,
    ) -> MutationOutcome {
        if text.trim().is_empty() {
            return MutationOutcome::Rejected;
        }
        self.tasks
            .push(TrackedTask::new(task_id, text, timer_minutes, now));
        MutationOutcome::Applied
    }

    pub fn remove_task(&mut self, task_id: &TaskId) -> MutationOutcome {
        let before = self.tasks.len();
        self.tasks.retain(|task| &task.id != task_id);
        if self.tasks.len() == before {
            MutationOutcome::NotFound
        } else {
            MutationOutcome::Applied
        }
    }

    pub fn update_task_notes(&mut self, task_id: &TaskId, notes: &str) -> MutationOutcome {
        self.with_task(task_id, |task| {
            task.set_notes(notes);
            MutationOutcome::Applied
        })
    }

    pub fn update_task_timer(
        &mut self,
        task_id: &TaskId,
        minutes: Option<i64>,
        now: SystemTime,
    ) -> MutationOutcome {
        self.with_task(task_id, |task| {
            task.set_timer(minutes, now);
            MutationOutcome::Applied
        })
    }

    pub fn snooze_task(&mut self, task_id: &TaskId, now: SystemTime) -> MutationOutcome {
        self.with_task(task_id, |task| {
            task.snooze(now);
            MutationOutcome::Applied
        })
    }

    pub fn update_task_completion(
        &mut self,
        task_id: &TaskId,
        status: CompletionStatus,
        now: SystemTime,
    ) -> MutationOutcome {
        self.with_task(task_id, |task| {
            if task.completion_status == status {
                return MutationOutcome::Unchanged;
            }
            task.set_completion(status, now);
            MutationOutcome::Applied
        })
    }

    pub fn advance_task_completion(&mut self, task_id: &TaskId, now: SystemTime) -> MutationOutcome {
        self.with_task(task_id, |task| {
            task.advance_completion(now);
            MutationOutcome::Applied
        })
    }

    pub fn acknowledge_task_timer(&mut self, task_id: &TaskId) -> MutationOutcome {
        self.with_task(task_id, |task| {
            if task.acknowledge() {
                MutationOutcome::Applied
            } else {
                MutationOutcome::Rejected
            }
        })
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn set_status(&mut self, status: PatientStatus) {
        self.status = status;
    }

    pub fn length_of_stay(&self, now: SystemTime) -> LengthOfStay {
        LengthOfStay::between(self.arrival_time, now)
    }

    pub fn stay_band(&self, now: SystemTime, thresholds: &StayBandThresholds) -> StayBand {
        StayBand::classify(self.length_of_stay(now), thresholds)
    }

    pub fn attention_summary(&self) -> AttentionSummary {
        self.tasks
            .iter()
            .fold(AttentionSummary::default(), |mut summary, task| {
                match task.completion_status {
                    CompletionStatus::Incomplete => summary.incomplete += 1,
                    CompletionStatus::InProgress => summary.in_progress += 1,
                    CompletionStatus::Complete => summary.complete += 1,
                }
                if task.is_timer_expired && !task.is_acknowledged {
                    summary.expired_unacknowledged += 1;
                }
                summary
            })
    }

    fn with_task(
        &mut self,
        task_id: &TaskId,
        operation: impl FnOnce(&mut TrackedTask) -> MutationOutcome,
    ) -> MutationOutcome {
        match self.task_mut(task_id) {
            Some(task) => operation(task),
            None => MutationOutcome::NotFound,
        }
    }
}
