use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use triage_core::clock::ManualClock;
use triage_core::config::TrackerConfig;
use triage_core::models::{
    CompletionStatus, MutationOutcome, NewPatient, NewTask, PatientId, PatientStatus, StayBand,
    TaskId,
};
use triage_core::persistence::{InMemoryKeyValueStore, KeyValueStore};
use triage_core::tracking::{TimerEvaluation, TrackingStore};

const MINUTE: Duration = Duration::from_secs(60);

fn start_time() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

fn open_store() -> (Arc<ManualClock>, Arc<InMemoryKeyValueStore>, TrackingStore) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let storage = Arc::new(InMemoryKeyValueStore::new());
    let store = TrackingStore::open(storage.clone(), clock.clone(), TrackerConfig::default());
    (clock, storage, store)
}

fn patient(name: &str, arrived_minutes_ago: u32) -> NewPatient {
    NewPatient {
        name: name.to_string(),
        arrival_time: start_time() - MINUTE * arrived_minutes_ago,
        notes: String::new(),
        tasks: Vec::new(),
    }
}

fn with_task(store: &TrackingStore, timer_minutes: Option<i64>) -> (PatientId, TaskId) {
    let patient_id = store.add_patient(patient("Ada", 5)).unwrap();
    let task_id = store
        .add_task(&patient_id, "Repeat troponin", timer_minutes)
        .unwrap();
    (patient_id, task_id)
}

#[test]
fn blank_patient_names_are_ignored() {
    let (_, storage, store) = open_store();

    assert_eq!(store.add_patient(patient("   ", 0)), None);
    assert!(store.snapshot().is_empty());
    assert_eq!(store.snapshot().revision(), 0);
    assert_eq!(storage.get("patientTrackerData").unwrap(), None);
}

#[test]
fn intake_drops_blank_tasks_and_clamps_future_arrival() {
    let (_, _, store) = open_store();
    let mut intake = patient("Grace", 0);
    intake.arrival_time = start_time() + MINUTE * 30;
    intake.tasks = vec![
        NewTask::new("ECG", Some(10)),
        NewTask::new("  ", Some(5)),
        NewTask::new("Bloods", None),
    ];

    let patient_id = store.add_patient(intake).unwrap();
    let snapshot = store.snapshot();
    let patient = snapshot.patient(&patient_id).unwrap();

    assert_eq!(patient.arrival_time, start_time());
    assert_eq!(patient.status, PatientStatus::Active);
    let texts: Vec<&str> = patient.tasks.iter().map(|task| task.text.as_str()).collect();
    assert_eq!(texts, vec!["ECG", "Bloods"]);
    assert_eq!(patient.tasks[0].timer_end, Some(start_time() + MINUTE * 10));
    assert!(!patient.tasks[0].is_acknowledged);
}

#[test]
fn patients_are_kept_in_arrival_order() {
    let (_, _, store) = open_store();
    store.add_patient(patient("T-90", 90)).unwrap();
    store.add_patient(patient("T-10", 10)).unwrap();
    store.add_patient(patient("T-250", 250)).unwrap();

    let names: Vec<String> = store
        .snapshot()
        .patients()
        .iter()
        .map(|patient| patient.name.clone())
        .collect();
    assert_eq!(names, vec!["T-250", "T-90", "T-10"]);
}

#[test]
fn tasks_without_timers_are_never_expired() {
    let (clock, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, None);

    clock.advance(MINUTE * 10_000);
    assert_eq!(
        store.evaluate_task_timer(&patient_id, &task_id),
        TimerEvaluation::Inactive
    );
    let task = store.snapshot().task(&patient_id, &task_id).cloned().unwrap();
    assert_eq!(task.timer_end, None);
    assert!(!task.is_timer_expired);
}

#[test]
fn out_of_range_timer_values_clear_the_timer() {
    let (_, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(30));

    for minutes in [Some(0), Some(-5), Some(1000), None] {
        assert_eq!(
            store.update_task_timer(&patient_id, &task_id, minutes),
            MutationOutcome::Applied
        );
        let snapshot = store.snapshot();
        let task = snapshot.task(&patient_id, &task_id).unwrap();
        assert_eq!(task.timer_end, None, "minutes {minutes:?} should clear");
        assert!(!task.is_timer_expired);
    }

    store.update_task_timer(&patient_id, &task_id, Some(999));
    let snapshot = store.snapshot();
    let task = snapshot.task(&patient_id, &task_id).unwrap();
    assert_eq!(task.timer_end, Some(start_time() + MINUTE * 999));
    assert!(!task.is_acknowledged);
}

#[test]
fn completion_sets_completed_at_and_acknowledges() {
    let (clock, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(5));

    clock.advance(MINUTE * 2);
    store.update_task_completion(&patient_id, &task_id, CompletionStatus::Complete);
    let task = store.snapshot().task(&patient_id, &task_id).cloned().unwrap();
    assert_eq!(task.completed_at, Some(start_time() + MINUTE * 2));
    assert!(task.is_acknowledged);
    assert!(!task.is_timer_expired);

    store.update_task_completion(&patient_id, &task_id, CompletionStatus::InProgress);
    let task = store.snapshot().task(&patient_id, &task_id).cloned().unwrap();
    assert_eq!(task.completed_at, None);
    assert_eq!(task.completion_status, CompletionStatus::InProgress);
}

#[test]
fn setting_the_same_completion_status_changes_nothing() {
    let (_, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, None);
    let revision = store.snapshot().revision();

    assert_eq!(
        store.update_task_completion(&patient_id, &task_id, CompletionStatus::Incomplete),
        MutationOutcome::Unchanged
    );
    assert_eq!(store.snapshot().revision(), revision);
}

#[test]
fn three_advances_cycle_back_to_incomplete() {
    let (_, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, None);

    let mut seen = Vec::new();
    for _ in 0..3 {
        store.advance_task_completion(&patient_id, &task_id);
        let snapshot = store.snapshot();
        let task = snapshot.task(&patient_id, &task_id).unwrap();
        seen.push(task.completion_status);
    }

    assert_eq!(
        seen,
        vec![
            CompletionStatus::InProgress,
            CompletionStatus::Complete,
            CompletionStatus::Incomplete
        ]
    );
    let snapshot = store.snapshot();
    let task = snapshot.task(&patient_id, &task_id).unwrap();
    assert_eq!(task.completed_at, None);
}

#[test]
fn reopening_after_the_deadline_does_not_raise_a_fresh_alert() {
    let (clock, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(5));

    store.update_task_completion(&patient_id, &task_id, CompletionStatus::Complete);
    clock.advance(MINUTE * 10);
    store.update_task_completion(&patient_id, &task_id, CompletionStatus::Incomplete);

    let snapshot = store.snapshot();
    let task = snapshot.task(&patient_id, &task_id).unwrap();
    assert!(task.is_timer_expired);
    assert!(task.is_acknowledged);
    assert!(store.evaluate_timers().is_empty());
}

#[test]
fn expiry_is_reported_once_per_rising_edge() {
    let (clock, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(1));

    assert!(matches!(
        store.evaluate_task_timer(&patient_id, &task_id),
        TimerEvaluation::Pending { .. }
    ));

    clock.advance(Duration::from_secs(61));
    let events = store.evaluate_timers();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].patient_name, "Ada");
    assert_eq!(events[0].task_text, "Repeat troponin");
    assert!(!events[0].was_acknowledged);

    assert!(store.evaluate_timers().is_empty());
    assert_eq!(
        store.evaluate_task_timer(&patient_id, &task_id),
        TimerEvaluation::Expired { event: None }
    );
}

#[test]
fn unchanged_evaluations_do_not_persist_or_publish() {
    let (_, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(30));
    let mut updates = store.subscribe();
    let _ = updates.borrow_and_update();
    let revision = store.snapshot().revision();

    store.evaluate_task_timer(&patient_id, &task_id);
    store.evaluate_timers();

    assert_eq!(store.snapshot().revision(), revision);
    assert!(!updates.has_changed().unwrap());
}

#[test]
fn acknowledge_keeps_expiry_and_deadline() {
    let (clock, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(1));

    assert_eq!(
        store.acknowledge_task_timer(&patient_id, &task_id),
        MutationOutcome::Rejected
    );

    clock.advance(MINUTE * 2);
    store.evaluate_timers();
    assert_eq!(
        store.acknowledge_task_timer(&patient_id, &task_id),
        MutationOutcome::Applied
    );

    let snapshot = store.snapshot();
    let task = snapshot.task(&patient_id, &task_id).unwrap();
    assert!(task.is_acknowledged);
    assert!(task.is_timer_expired);
    assert_eq!(task.timer_end, Some(start_time() + MINUTE));
}

#[test]
fn snooze_rearms_for_fifteen_minutes() {
    let (clock, _, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(1));

    clock.advance(MINUTE * 3);
    store.evaluate_timers();
    store.acknowledge_task_timer(&patient_id, &task_id);
    store.snooze_task(&patient_id, &task_id);

    let snapshot = store.snapshot();
    let task = snapshot.task(&patient_id, &task_id).unwrap();
    assert_eq!(task.timer_end, Some(start_time() + MINUTE * 18));
    assert!(!task.is_timer_expired);
    assert!(!task.is_acknowledged);
}

#[test]
fn unknown_ids_are_silent_no_ops() {
    let (_, _, store) = open_store();
    let (patient_id, _) = with_task(&store, None);
    let missing_patient = PatientId::from("patient-missing");
    let missing_task = TaskId::from("task-missing");
    let revision = store.snapshot().revision();

    assert_eq!(
        store.remove_patient(&missing_patient),
        MutationOutcome::NotFound
    );
    assert_eq!(
        store.update_task_notes(&patient_id, &missing_task, "x"),
        MutationOutcome::NotFound
    );
    assert_eq!(
        store.snooze_task(&missing_patient, &missing_task),
        MutationOutcome::NotFound
    );
    assert_eq!(store.add_task(&missing_patient, "Bloods", None), None);
    assert_eq!(store.add_task(&patient_id, " ", None), None);
    assert_eq!(
        store.evaluate_task_timer(&missing_patient, &missing_task),
        TimerEvaluation::Inactive
    );
    assert_eq!(store.snapshot().revision(), revision);
}

#[test]
fn notes_and_status_updates_are_published_and_persisted() {
    let (_, storage, store) = open_store();
    let (patient_id, task_id) = with_task(&store, None);
    let mut updates = store.subscribe();
    let _ = updates.borrow_and_update();

    store.update_patient_notes(&patient_id, "Allergic to penicillin");
    store.update_task_notes(&patient_id, &task_id, "Second set at 14:00");
    assert_eq!(
        store.update_patient_status(&patient_id, PatientStatus::Admitted),
        MutationOutcome::Applied
    );
    assert_eq!(
        store.update_patient_status(&patient_id, PatientStatus::Admitted),
        MutationOutcome::Unchanged
    );

    assert!(updates.has_changed().unwrap());
    let published = updates.borrow_and_update().clone();
    let patient = published.patient(&patient_id).unwrap();
    assert_eq!(patient.notes, "Allergic to penicillin");
    assert_eq!(patient.status, PatientStatus::Admitted);
    assert_eq!(patient.tasks[0].notes, "Second set at 14:00");

    let saved = storage.get("patientTrackerData").unwrap().unwrap();
    assert!(saved.contains("Allergic to penicillin"));
    assert!(saved.contains("\"status\":\"admitted\""));
}

#[test]
fn removing_and_clearing_empties_the_board() {
    let (_, storage, store) = open_store();
    let (patient_id, task_id) = with_task(&store, Some(10));
    store.add_patient(patient("Linus", 20)).unwrap();

    assert_eq!(store.remove_task(&patient_id, &task_id), MutationOutcome::Applied);
    assert!(store.snapshot().patient(&patient_id).unwrap().tasks.is_empty());
    assert_eq!(store.remove_patient(&patient_id), MutationOutcome::Applied);
    assert_eq!(store.snapshot().len(), 1);

    assert_eq!(store.clear_all(), MutationOutcome::Applied);
    assert_eq!(store.clear_all(), MutationOutcome::Unchanged);
    assert!(store.snapshot().is_empty());
    assert_eq!(storage.get("patientTrackerData").unwrap().as_deref(), Some("[]"));
}

#[test]
fn stay_report_classifies_each_patient() {
    let (clock, _, store) = open_store();
    store.add_patient(patient("Recent", 30)).unwrap();
    store.add_patient(patient("Long", 239)).unwrap();

    let report = store.stay_report();
    assert_eq!(report[0].patient_name, "Long");
    assert_eq!(report[0].length_of_stay.to_string(), "3h 59m");
    assert_eq!(report[0].band, StayBand::Elevated);
    assert_eq!(report[1].band, StayBand::Routine);

    clock.advance(MINUTE * 61);
    let report = store.stay_report();
    assert_eq!(report[0].band, StayBand::Critical);
    assert_eq!(report[1].band, StayBand::Routine);
}

#[test]
fn attention_summary_counts_unacknowledged_expiries() {
    let (clock, _, store) = open_store();
    let (patient_id, first) = with_task(&store, Some(1));
    let second = store.add_task(&patient_id, "Obs", Some(1)).unwrap();
    store.add_task(&patient_id, "Discharge letter", None).unwrap();
    store.advance_task_completion(&patient_id, &second);

    clock.advance(MINUTE * 2);
    store.evaluate_timers();
    store.acknowledge_task_timer(&patient_id, &first);
    let summary = store.snapshot().patient(&patient_id).unwrap().attention_summary();
    assert_eq!(summary.incomplete, 2);
    assert_eq!(summary.in_progress, 1);
    assert_eq!(summary.expired_unacknowledged, 1);
}
