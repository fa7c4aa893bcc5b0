use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::ids::IdGenerator;
use crate::models::{
    CompletionStatus, CoreError, CoreErrorKind, Patient, PatientId, PatientStatus, TaskId,
    TrackedTask,
};
use crate::persistence::PersistenceResult;

const UNTITLED_TASK: &str = "Untitled Task";
const UNKNOWN_PATIENT: &str = "Unknown Patient";
// widest range a JavaScript Date accepts
const MAX_EPOCH_MILLIS: i64 = 8_640_000_000_000_000;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedPatient<'a> {
    id: &'a str,
    name: &'a str,
    arrival_time: String,
    notes: &'a str,
    tasks: Vec<PersistedTask<'a>>,
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTask<'a> {
    id: &'a str,
    text: &'a str,
    timer_end: Option<String>,
    is_timer_expired: bool,
    completion_status: &'static str,
    created_at: String,
    completed_at: Option<String>,
    notes: &'a str,
    is_acknowledged: bool,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawPatient {
    id: Value,
    name: Value,
    arrival_time: Value,
    notes: Value,
    tasks: Value,
    status: Value,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawTask {
    id: Value,
    text: Value,
    timer_end: Value,
    is_timer_expired: Value,
    completion_status: Value,
    created_at: Value,
    completed_at: Value,
    notes: Value,
    is_acknowledged: Value,
}

pub fn encode_board(patients: &[Patient]) -> PersistenceResult<String> {
    let records = patients
        .iter()
        .map(persisted_patient)
        .collect::<PersistenceResult<Vec<_>>>()?;
    serde_json::to_string(&records).map_err(|error| {
        CoreError::new(
            CoreErrorKind::Internal,
            format!("failed to serialize board: {error}"),
        )
    })
}

/// Revives a persisted board. Fails only when the payload is not JSON or not an
/// array; everything below the top level is repaired in place.
pub fn decode_board(
    raw: &str,
    now: SystemTime,
    ids: &IdGenerator,
) -> PersistenceResult<Vec<Patient>> {
    let value: Value = serde_json::from_str(raw).map_err(|error| {
        CoreError::new(
            CoreErrorKind::ParseFailure,
            format!("persisted board is not valid JSON: {error}"),
        )
    })?;
    let Value::Array(entries) = value else {
        return Err(CoreError::new(
            CoreErrorKind::ParseFailure,
            "persisted board is not an array",
        ));
    };

    let mut revival = Revival {
        now,
        ids,
        repaired: 0,
        skipped: 0,
    };
    let mut patients: Vec<Patient> = entries
        .into_iter()
        .filter_map(|entry| revival.patient(entry))
        .collect();
    patients.sort_by_key(|patient| patient.arrival_time);

    if revival.repaired > 0 || revival.skipped > 0 {
        tracing::info!(
            repaired_fields = revival.repaired,
            skipped_entries = revival.skipped,
            "repaired persisted board while loading"
        );
    }
    Ok(patients)
}

pub fn format_timestamp(value: SystemTime) -> PersistenceResult<String> {
    to_date_time(value)
        .ok_or_else(|| {
            CoreError::new(
                CoreErrorKind::Internal,
                "timestamp is outside the representable date range",
            )
        })?
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("failed to format timestamp: {error}"),
            )
        })
}

/// Checked `SystemTime` to UTC date conversion; `None` past year 9999 either way.
pub fn to_date_time(value: SystemTime) -> Option<OffsetDateTime> {
    let nanos = match value.duration_since(UNIX_EPOCH) {
        Ok(after) => i128::try_from(after.as_nanos()).ok()?,
        Err(before) => -i128::try_from(before.duration().as_nanos()).ok()?,
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Accepts RFC 3339 strings and epoch-millisecond numbers.
pub fn parse_timestamp(value: &Value) -> Option<SystemTime> {
    match value {
        Value::String(raw) => OffsetDateTime::parse(raw.trim(), &Rfc3339)
            .ok()
            .map(SystemTime::from),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|millis| millis.is_finite() && millis.abs() <= MAX_EPOCH_MILLIS as f64)
                    .map(|millis| millis.trunc() as i64)
            })
            .filter(|millis| millis.unsigned_abs() <= MAX_EPOCH_MILLIS as u64)
            .and_then(|millis| {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
            })
            .map(SystemTime::from),
        _ => None,
    }
}

fn persisted_patient(patient: &Patient) -> PersistenceResult<PersistedPatient<'_>> {
    Ok(PersistedPatient {
        id: patient.id.as_str(),
        name: &patient.name,
        arrival_time: format_timestamp(patient.arrival_time)?,
        notes: &patient.notes,
        tasks: patient
            .tasks
            .iter()
            .map(persisted_task)
            .collect::<PersistenceResult<Vec<_>>>()?,
        status: patient.status.as_str(),
    })
}

fn persisted_task(task: &TrackedTask) -> PersistenceResult<PersistedTask<'_>> {
    Ok(PersistedTask {
        id: task.id.as_str(),
        text: &task.text,
        timer_end: task.timer_end.map(format_timestamp).transpose()?,
        is_timer_expired: task.is_timer_expired,
        completion_status: task.completion_status.as_str(),
        created_at: format_timestamp(task.created_at)?,
        completed_at: task.completed_at.map(format_timestamp).transpose()?,
        notes: &task.notes,
        is_acknowledged: task.is_acknowledged,
    })
}

struct Revival<'a> {
    now: SystemTime,
    ids: &'a IdGenerator,
    repaired: usize,
    skipped: usize,
}

impl Revival<'_> {
    fn patient(&mut self, entry: Value) -> Option<Patient> {
        let Some(raw) = self.object::<RawPatient>(entry) else {
            self.skipped += 1;
            return None;
        };

        let id = match opaque_id(&raw.id) {
            Some(id) => PatientId(id),
            None => {
                self.repaired += 1;
                self.ids.patient_id(self.now)
            }
        };
        let name = self.text_or(&raw.name, UNKNOWN_PATIENT);
        let arrival_time = self.required_timestamp(&raw.arrival_time);
        let tasks = match raw.tasks {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|entry| self.task(entry))
                .collect(),
            _ => Vec::new(),
        };
        let status = raw
            .status
            .as_str()
            .and_then(|value| value.parse().ok())
            .unwrap_or(PatientStatus::Active);

        Some(Patient {
            id,
            name,
            arrival_time,
            tasks,
            notes: raw.notes.as_str().unwrap_or_default().to_string(),
            status,
        })
    }

    fn task(&mut self, entry: Value) -> Option<TrackedTask> {
        let Some(raw) = self.object::<RawTask>(entry) else {
            self.skipped += 1;
            return None;
        };

        let id = match opaque_id(&raw.id) {
            Some(id) => TaskId(id),
            None => {
                self.repaired += 1;
                self.ids.task_id(self.now)
            }
        };
        let completion_status = raw
            .completion_status
            .as_str()
            .and_then(|value| value.parse().ok())
            .unwrap_or(CompletionStatus::Incomplete);
        let complete = completion_status == CompletionStatus::Complete;
        let created_at = self.required_timestamp(&raw.created_at);
        let timer_end = self.optional_timestamp(&raw.timer_end);

        let completed_at = match (complete, self.optional_timestamp(&raw.completed_at)) {
            (true, None) => {
                self.repaired += 1;
                Some(self.now)
            }
            (false, Some(_)) => {
                self.repaired += 1;
                None
            }
            (_, completed_at) => completed_at,
        };

        let mut task = TrackedTask {
            id,
            text: self.text_or(&raw.text, UNTITLED_TASK),
            timer_end,
            // the saved flag only tells us what the previous session observed
            is_timer_expired: timer_end.is_some() && !complete && truthy(&raw.is_timer_expired),
            completion_status,
            created_at,
            completed_at,
            notes: raw.notes.as_str().unwrap_or_default().to_string(),
            is_acknowledged: complete || truthy(&raw.is_acknowledged),
        };
        task.evaluate(self.now);
        Some(task)
    }

    fn object<T: for<'de> Deserialize<'de>>(&self, entry: Value) -> Option<T> {
        if !entry.is_object() {
            return None;
        }
        serde_json::from_value(entry).ok()
    }

    fn text_or(&mut self, value: &Value, fallback: &str) -> String {
        match value.as_str() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => {
                self.repaired += 1;
                fallback.to_string()
            }
        }
    }

    fn required_timestamp(&mut self, value: &Value) -> SystemTime {
        parse_timestamp(value).unwrap_or_else(|| {
            self.repaired += 1;
            self.now
        })
    }

    fn optional_timestamp(&mut self, value: &Value) -> Option<SystemTime> {
        let parsed = parse_timestamp(value);
        if parsed.is_none() && !value.is_null() {
            self.repaired += 1;
        }
        parsed
    }
}

fn opaque_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
