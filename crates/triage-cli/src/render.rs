use std::time::SystemTime;

use serde::Serialize;
use time::macros::format_description;
use triage_core::config::TrackerConfig;
use triage_core::models::{CompletionStatus, Patient, TrackedTask};
use triage_core::persistence::to_date_time;
use triage_core::tracking::BoardSnapshot;

#[derive(Serialize)]
struct PatientView<'a> {
    id: &'a str,
    name: &'a str,
    status: &'static str,
    arrival_time: String,
    length_of_stay: String,
    stay_band: &'static str,
    notes: &'a str,
    expired_unacknowledged: usize,
    tasks: Vec<TaskView<'a>>,
}

#[derive(Serialize)]
struct TaskView<'a> {
    id: &'a str,
    text: &'a str,
    completion_status: &'static str,
    timer_end: Option<String>,
    remaining: Option<String>,
    is_timer_expired: bool,
    is_acknowledged: bool,
    notes: &'a str,
}

pub fn board_text(snapshot: &BoardSnapshot, config: &TrackerConfig, now: SystemTime) -> String {
    if snapshot.is_empty() {
        return "No patients on the board.".to_string();
    }

    let mut lines = Vec::new();
    for patient in snapshot.patients() {
        let summary = patient.attention_summary();
        lines.push(format!(
            "{}  {}  [{}] arrived {} ({}, {}){}",
            patient.id,
            patient.name,
            patient.status.as_str(),
            clock_time(patient.arrival_time),
            patient.length_of_stay(now),
            patient.stay_band(now, &config.stay_bands).as_str(),
            if summary.expired_unacknowledged > 0 {
                format!("  !{} expired", summary.expired_unacknowledged)
            } else {
                String::new()
            }
        ));
        if !patient.notes.is_empty() {
            lines.push(format!("    notes: {}", patient.notes));
        }
        for task in &patient.tasks {
            lines.push(task_line(task, now));
            if !task.notes.is_empty() {
                lines.push(format!("        notes: {}", task.notes));
            }
        }
    }
    lines.join("\n")
}

pub fn board_json(
    snapshot: &BoardSnapshot,
    config: &TrackerConfig,
    now: SystemTime,
) -> Result<String, serde_json::Error> {
    let views: Vec<PatientView<'_>> = snapshot
        .patients()
        .iter()
        .map(|patient| patient_view(patient, config, now))
        .collect();
    serde_json::to_string_pretty(&views)
}

pub fn clock_time(value: SystemTime) -> String {
    to_date_time(value)
        .and_then(|value| {
            value
                .format(format_description!("[hour]:[minute] UTC"))
                .ok()
        })
        .unwrap_or_else(|| "--:--".to_string())
}

fn task_line(task: &TrackedTask, now: SystemTime) -> String {
    let marker = match task.completion_status {
        CompletionStatus::Complete => "[x]",
        CompletionStatus::InProgress => "[~]",
        CompletionStatus::Incomplete => "[ ]",
    };
    let timer = match task.remaining_label(now) {
        Some(label) if task.is_timer_expired && !task.is_acknowledged => {
            format!("  ({label}, unacknowledged)")
        }
        Some(label) => format!("  ({label})"),
        None => String::new(),
    };
    format!("    {marker} {}  {}{timer}", task.id, task.text)
}

fn patient_view<'a>(
    patient: &'a Patient,
    config: &TrackerConfig,
    now: SystemTime,
) -> PatientView<'a> {
    PatientView {
        id: patient.id.as_str(),
        name: &patient.name,
        status: patient.status.as_str(),
        arrival_time: clock_time(patient.arrival_time),
        length_of_stay: patient.length_of_stay(now).to_string(),
        stay_band: patient.stay_band(now, &config.stay_bands).as_str(),
        notes: &patient.notes,
        expired_unacknowledged: patient.attention_summary().expired_unacknowledged,
        tasks: patient
            .tasks
            .iter()
            .map(|task| TaskView {
                id: task.id.as_str(),
                text: &task.text,
                completion_status: task.completion_status.as_str(),
                timer_end: task.timer_end.map(clock_time),
                remaining: task.remaining_label(now),
                is_timer_expired: task.is_timer_expired,
                is_acknowledged: task.is_acknowledged,
                notes: &task.notes,
            })
            .collect(),
    }
}
