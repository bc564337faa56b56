use crate::error::AppError;
use std::sync::Mutex;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const HOUR_INPUT_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]-[hour]");
const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub fn validate_future(due_date: OffsetDateTime, now: OffsetDateTime) -> Result<(), AppError> {
    if due_date <= now {
        return Err(AppError::PastDate);
    }
    Ok(())
}

/// Parses user-entered due dates.
///
/// Accepts `YYYY-MM-DD-HH` in the given offset, or a full RFC 3339 timestamp.
pub fn parse_due_date(text: &str, offset: UtcOffset) -> Result<OffsetDateTime, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("due date is required"));
    }

    if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, HOUR_INPUT_FORMAT) {
        return Ok(parsed.assume_offset(offset));
    }

    OffsetDateTime::parse(trimmed, &Rfc3339)
        .map_err(|_| AppError::invalid_input("due date must be YYYY-MM-DD-HH or RFC3339"))
}

pub fn format_due_date(value: OffsetDateTime) -> String {
    value
        .format(DISPLAY_FORMAT)
        .unwrap_or_else(|_| value.to_string())
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}
