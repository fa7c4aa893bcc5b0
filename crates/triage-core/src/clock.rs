use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

const EXPIRED_LABEL: &str = "Expired";

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, value: SystemTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn is_expired(timer_end: Option<SystemTime>, now: SystemTime) -> bool {
    matches!(timer_end, Some(end) if end <= now)
}

/// `"in 12 minutes"` while running, `"Expired"` once elapsed, `None` without a timer.
pub fn remaining_label(timer_end: Option<SystemTime>, now: SystemTime) -> Option<String> {
    let end = timer_end?;
    match end.duration_since(now) {
        Ok(remaining) if !remaining.is_zero() => Some(format!("in {}", strict_distance(remaining))),
        _ => Some(EXPIRED_LABEL.to_string()),
    }
}

/// Parses free-text minute entry the way a numeric form field is read: leading
/// whitespace skipped, optional sign, then the leading run of digits.
pub fn parse_timer_minutes(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let magnitude: i64 = rest[..digits_end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn strict_distance(remaining: Duration) -> String {
    let seconds = remaining.as_secs_f64();
    let (value, unit) = if seconds < 60.0 {
        (seconds, "second")
    } else if seconds < 3_600.0 {
        (seconds / 60.0, "minute")
    } else if seconds < 86_400.0 {
        (seconds / 3_600.0, "hour")
    } else {
        (seconds / 86_400.0, "day")
    };

    let rounded = value.round() as u64;
    if rounded == 1 {
        format!("1 {unit}")
    } else {
        format!("{rounded} {unit}s")
    }
}
