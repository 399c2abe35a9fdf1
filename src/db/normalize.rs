//! Cell value normalization.
//!
//! Converts driver temporal values into the canonical date, time and
//! date-time forms of [`Value`]. Everything else passes through untouched.

use super::types::{DriverValue, Value};
use chrono::Local;

/// Normalizes one driver cell value.
///
/// Timestamps become [`Value::DateTime`] (zoned instants are shown in local
/// wall-clock time), dates become [`Value::Date`], times become
/// [`Value::Time`]. Never fails; applying it to an already normalized value
/// returns that value.
pub fn normalize(raw: DriverValue) -> Value {
    match raw {
        DriverValue::Timestamp(ts) => Value::DateTime(ts),
        DriverValue::TimestampTz(ts) => Value::DateTime(ts.with_timezone(&Local).naive_local()),
        DriverValue::Date(date) => Value::Date(date),
        DriverValue::Time(time) => Value::Time(time),
        DriverValue::Plain(value) => value,
    }
}
