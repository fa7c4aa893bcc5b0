use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::ids::IdGenerator;
use crate::models::{
    CompletionStatus, ExpiryTransition, MutationOutcome, NewPatient, Patient, PatientId,
    PatientStatus, TaskId, TrackedTask,
};
use crate::persistence::{BoardPersistence, KeyValueStore, PersistenceHealth};
use crate::tracking::{BoardSnapshot, ExpiryEvent, PatientStay, TimerEvaluation};

/// Owns the board. Every applied mutation is flushed to storage and then
/// published to subscribers as a new [`BoardSnapshot`].
pub struct TrackingStore {
    board: Mutex<BoardSnapshot>,
    persistence: BoardPersistence,
    clock: Arc<dyn Clock>,
    ids: IdGenerator,
    config: TrackerConfig,
    updates: watch::Sender<BoardSnapshot>,
}

impl TrackingStore {
    /// Loads the persisted board, falling back to an empty one when nothing
    /// usable is stored. Never fails.
    pub fn open(
        key_value_store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        let persistence = BoardPersistence::new(key_value_store, config.storage_key.clone())
            .with_failure_warn_threshold(config.persist_failure_warn_threshold);
        let ids = IdGenerator::new();
        let patients = persistence
            .load(clock.now(), &ids)
            .unwrap_or_else(|| {
                tracing::info!(key = %persistence.key(), "starting with an empty board");
                Vec::new()
            });

        let snapshot = BoardSnapshot::new(0, patients);
        let (updates, _) = watch::channel(snapshot.clone());
        Self {
            board: Mutex::new(snapshot),
            persistence,
            clock,
            ids,
            config,
            updates,
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.lock_board().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.updates.subscribe()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    pub fn persistence_health(&self) -> PersistenceHealth {
        self.persistence.health()
    }

    /// Returns `None` when the name is blank. Arrival times in the future are
    /// clamped to now and blank intake tasks are dropped.
    pub fn add_patient(&self, new_patient: NewPatient) -> Option<PatientId> {
        let (_, patient_id) = self.apply("add_patient", |patients, now, ids| {
            if new_patient.name.trim().is_empty() {
                return (MutationOutcome::Rejected, None);
            }

            let patient_id = ids.patient_id(now);
            let mut patient = Patient {
                id: patient_id.clone(),
                name: new_patient.name,
                arrival_time: new_patient.arrival_time.min(now),
                tasks: Vec::new(),
                notes: new_patient.notes,
                status: PatientStatus::Active,
            };
            for task in new_patient
                .tasks
                .into_iter()
                .filter(|task| !task.text.trim().is_empty())
            {
                patient.add_task(ids.task_id(now), &task.text, task.timer_minutes, now);
            }

            patients.push(patient);
            sort_by_arrival(patients);
            (MutationOutcome::Applied, Some(patient_id))
        });
        patient_id
    }

    pub fn remove_patient(&self, patient_id: &PatientId) -> MutationOutcome {
        self.mutate("remove_patient", |patients, _, _| {
            let before = patients.len();
            patients.retain(|patient| &patient.id != patient_id);
            if patients.len() == before {
                MutationOutcome::NotFound
            } else {
                MutationOutcome::Applied
            }
        })
    }

    pub fn update_patient_notes(&self, patient_id: &PatientId, notes: &str) -> MutationOutcome {
        self.mutate("update_patient_notes", |patients, _, _| {
            on_patient(patients, patient_id, |patient| {
                patient.set_notes(notes);
                MutationOutcome::Applied
            })
        })
    }

    pub fn update_patient_status(
        &self,
        patient_id: &PatientId,
        status: PatientStatus,
    ) -> MutationOutcome {
        self.mutate("update_patient_status", |patients, _, _| {
            on_patient(patients, patient_id, |patient| {
                if patient.status == status {
                    return MutationOutcome::Unchanged;
                }
                patient.set_status(status);
                MutationOutcome::Applied
            })
        })
    }

    /// Returns `None` when the patient is unknown or the text is blank.
    pub fn add_task(
        &self,
        patient_id: &PatientId,
        text: &str,
        timer_minutes: Option<i64>,
    ) -> Option<TaskId> {
        let (_, task_id) = self.apply("add_task", |patients, now, ids| {
            let Some(patient) = find_patient(patients, patient_id) else {
                return (MutationOutcome::NotFound, None);
            };
            if text.trim().is_empty() {
                return (MutationOutcome::Rejected, None);
            }
            let task_id = ids.task_id(now);
            let outcome = patient.add_task(task_id.clone(), text, timer_minutes, now);
            (outcome, outcome.is_applied().then_some(task_id))
        });
        task_id
    }

    pub fn remove_task(&self, patient_id: &PatientId, task_id: &TaskId) -> MutationOutcome {
        self.mutate("remove_task", |patients, _, _| {
            on_patient(patients, patient_id, |patient| patient.remove_task(task_id))
        })
    }

    pub fn update_task_notes(
        &self,
        patient_id: &PatientId,
        task_id: &TaskId,
        notes: &str,
    ) -> MutationOutcome {
        self.mutate("update_task_notes", |patients, _, _| {
            on_patient(patients, patient_id, |patient| {
                patient.update_task_notes(task_id, notes)
            })
        })
    }

    /// `None` or a value outside `1..=999` clears the timer.
    pub fn update_task_timer(
        &self,
        patient_id: &PatientId,
        task_id: &TaskId,
        minutes: Option<i64>,
    ) -> MutationOutcome {
        self.mutate("update_task_timer", |patients, now, _| {
            on_patient(patients, patient_id, |patient| {
                patient.update_task_timer(task_id, minutes, now)
            })
        })
    }

    pub fn snooze_task(&self, patient_id: &PatientId, task_id: &TaskId) -> MutationOutcome {
        self.mutate("snooze_task", |patients, now, _| {
            on_patient(patients, patient_id, |patient| {
                patient.snooze_task(task_id, now)
            })
        })
    }

    pub fn update_task_completion(
        &self,
        patient_id: &PatientId,
        task_id: &TaskId,
        status: CompletionStatus,
    ) -> MutationOutcome {
        self.mutate("update_task_completion", |patients, now, _| {
            on_patient(patients, patient_id, |patient| {
                patient.update_task_completion(task_id, status, now)
            })
        })
    }

    pub fn advance_task_completion(
        &self,
        patient_id: &PatientId,
        task_id: &TaskId,
    ) -> MutationOutcome {
        self.mutate("advance_task_completion", |patients, now, _| {
            on_patient(patients, patient_id, |patient| {
                patient.advance_task_completion(task_id, now)
            })
        })
    }

    pub fn acknowledge_task_timer(
        &self,
        patient_id: &PatientId,
        task_id: &TaskId,
    ) -> MutationOutcome {
        self.mutate("acknowledge_task_timer", |patients, _, _| {
            on_patient(patients, patient_id, |patient| {
                patient.acknowledge_task_timer(task_id)
            })
        })
    }

    /// Re-derives expiry for one task. Persists only when the cached flag flips.
    pub fn evaluate_task_timer(
        &self,
        patient_id: &PatientId,
        task_id: &TaskId,
    ) -> TimerEvaluation {
        let (_, evaluation) = self.apply("evaluate_task_timer", |patients, now, _| {
            let Some(patient) = find_patient(patients, patient_id) else {
                return (MutationOutcome::NotFound, TimerEvaluation::Inactive);
            };
            evaluate_task(patient, task_id, now)
        });
        evaluation
    }

    /// Re-derives expiry for every task and returns the rising edges observed.
    pub fn evaluate_timers(&self) -> Vec<ExpiryEvent> {
        let (_, events) = self.apply("evaluate_timers", |patients, now, _| {
            evaluate_board(patients, now)
        });
        events
    }

    /// Restores arrival order and re-derives every timer, as after a restart
    /// or a long suspension.
    pub fn resync(&self) -> Vec<ExpiryEvent> {
        let (_, events) = self.apply("resync", |patients, now, _| {
            let sorted = patients
                .windows(2)
                .all(|pair| pair[0].arrival_time <= pair[1].arrival_time);
            if !sorted {
                sort_by_arrival(patients);
            }
            let (outcome, events) = evaluate_board(patients, now);
            let outcome = if sorted {
                outcome
            } else {
                MutationOutcome::Applied
            };
            (outcome, events)
        });
        events
    }

    pub fn clear_all(&self) -> MutationOutcome {
        self.mutate("clear_all", |patients, _, _| {
            if patients.is_empty() {
                return MutationOutcome::Unchanged;
            }
            patients.clear();
            MutationOutcome::Applied
        })
    }

    pub fn stay_report(&self) -> Vec<PatientStay> {
        let now = self.clock.now();
        let thresholds = &self.config.stay_bands;
        self.snapshot()
            .patients()
            .iter()
            .map(|patient| {
                let length_of_stay = patient.length_of_stay(now);
                PatientStay {
                    patient_id: patient.id.clone(),
                    patient_name: patient.name.clone(),
                    length_of_stay,
                    band: patient.stay_band(now, thresholds),
                }
            })
            .collect()
    }

    fn mutate(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut Vec<Patient>, SystemTime, &IdGenerator) -> MutationOutcome,
    ) -> MutationOutcome {
        self.apply(operation, |patients, now, ids| {
            (change(patients, now, ids), ())
        })
        .0
    }

    /// Runs `change` against a copy of the board. The copy replaces the board,
    /// is persisted and is published only when the change reports `Applied`.
    fn apply<T>(
        &self,
        operation: &'static str,
        change: impl FnOnce(&mut Vec<Patient>, SystemTime, &IdGenerator) -> (MutationOutcome, T),
    ) -> (MutationOutcome, T) {
        let mut board = self.lock_board();
        let now = self.clock.now();
        let mut patients = board.patients().to_vec();
        let (outcome, value) = change(&mut patients, now, &self.ids);

        if outcome.is_applied() {
            let next = BoardSnapshot::new(board.revision() + 1, patients);
            self.persistence.save(next.patients());
            *board = next.clone();
            self.updates.send_replace(next);
            tracing::debug!(operation, revision = board.revision(), "board updated");
        } else {
            tracing::debug!(operation, outcome = ?outcome, "board left unchanged");
        }
        (outcome, value)
    }

    fn lock_board(&self) -> MutexGuard<'_, BoardSnapshot> {
        // snapshots are swapped whole, so a poisoned guard still holds a valid board
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn find_patient<'a>(patients: &'a mut [Patient], patient_id: &PatientId) -> Option<&'a mut Patient> {
    patients.iter_mut().find(|patient| &patient.id == patient_id)
}

fn on_patient(
    patients: &mut [Patient],
    patient_id: &PatientId,
    change: impl FnOnce(&mut Patient) -> MutationOutcome,
) -> MutationOutcome {
    find_patient(patients, patient_id).map_or(MutationOutcome::NotFound, change)
}

fn sort_by_arrival(patients: &mut [Patient]) {
    patients.sort_by_key(|patient| patient.arrival_time);
}

fn evaluate_task(
    patient: &mut Patient,
    task_id: &TaskId,
    now: SystemTime,
) -> (MutationOutcome, TimerEvaluation) {
    let Some(task) = patient.task_mut(task_id) else {
        return (MutationOutcome::NotFound, TimerEvaluation::Inactive);
    };
    let transition = task.evaluate(now);
    let outcome = match transition {
        ExpiryTransition::Unchanged => MutationOutcome::Unchanged,
        _ => MutationOutcome::Applied,
    };
    let task = task.clone();
    (outcome, timer_evaluation(patient, &task, transition))
}

fn evaluate_board(patients: &mut [Patient], now: SystemTime) -> (MutationOutcome, Vec<ExpiryEvent>) {
    let mut outcome = MutationOutcome::Unchanged;
    let mut events = Vec::new();
    for patient in patients.iter_mut() {
        let task_ids: Vec<TaskId> = patient.tasks.iter().map(|task| task.id.clone()).collect();
        for task_id in &task_ids {
            let (task_outcome, evaluation) = evaluate_task(patient, task_id, now);
            if task_outcome.is_applied() {
                outcome = MutationOutcome::Applied;
            }
            if let TimerEvaluation::Expired { event: Some(event) } = evaluation {
                events.push(event);
            }
        }
    }
    (outcome, events)
}

fn timer_evaluation(
    patient: &Patient,
    task: &TrackedTask,
    transition: ExpiryTransition,
) -> TimerEvaluation {
    let Some(timer_end) = task.timer_end else {
        return TimerEvaluation::Inactive;
    };
    if task.is_complete() {
        return TimerEvaluation::Inactive;
    }
    match transition {
        ExpiryTransition::Rising { was_acknowledged } => TimerEvaluation::Expired {
            event: ExpiryEvent::new(patient, task, was_acknowledged),
        },
        _ if task.is_timer_expired => TimerEvaluation::Expired { event: None },
        _ => TimerEvaluation::Pending { timer_end },
    }
}
