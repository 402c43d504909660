//! Recognized per-tenant settings keys, their defaults, and fail-fast validation.
//!
//! Malformed values must be rejected when they are written, not when the schedule
//! is next computed, so stored state is never silently inconsistent.

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{Result, WeekcastError};
use crate::types::DeliverySchedule;

/// IANA zone used for a tenant's weekly slot.
pub const KEY_TIMEZONE: &str = "timezone";
/// Local wall-clock time of the weekly slot, `HH:MM`.
pub const KEY_TIME: &str = "time";
/// Outbound webhook destination for deliveries.
pub const KEY_WEBHOOK: &str = "webhook";

pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_TIME: &str = "09:30";

const TIME_FORMAT: &str = "%H:%M";

/// Validate a recognized key's value before it is persisted.
/// Unrecognized keys are accepted as-is (opaque collaborator data).
pub fn validate(key: &str, value: &str) -> Result<()> {
    match key {
        KEY_TIMEZONE => {
            value.parse::<Tz>().map_err(|_| {
                WeekcastError::invalid_setting(key, format!("unknown IANA zone '{value}'"))
            })?;
        }
        KEY_TIME => {
            NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|_| {
                WeekcastError::invalid_setting(key, format!("'{value}' is not HH:MM"))
            })?;
        }
        _ => {}
    }
    Ok(())
}

/// Build a tenant's delivery schedule from its stored settings, applying defaults.
///
/// A stored `time` that no longer parses falls back to the default with a warning;
/// [`validate`] makes that path unreachable for values written through the store.
pub fn schedule_from(timezone: Option<String>, time: Option<String>) -> DeliverySchedule {
    let timezone = timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let raw_time = time.unwrap_or_else(|| DEFAULT_TIME.to_string());
    let time_of_day = NaiveTime::parse_from_str(&raw_time, TIME_FORMAT).unwrap_or_else(|_| {
        tracing::warn!("Stored time '{raw_time}' unparsable, using {DEFAULT_TIME}");
        default_time()
    });
    DeliverySchedule { timezone, time_of_day }
}

fn default_time() -> NaiveTime {
    // DEFAULT_TIME is a valid HH:MM literal
    NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default()
}
