//! Decoding of CF-convention time axes (`<unit> since <reference>`).

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

/// Units used for every time axis this tool writes.
pub const OUTPUT_TIME_UNITS: &str = "hours since 1970-01-01 00:00:00";
pub const OUTPUT_CALENDAR: &str = "standard";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// The time variable has no `units` or `calendar` attribute.
    #[error("time variable is missing the `{0}` attribute")]
    MissingAttribute(&'static str),

    /// The attributes are present but could not be interpreted.
    #[error("cannot decode time with units `{units}` and calendar `{calendar}`: {reason}")]
    Malformed {
        units: String,
        calendar: String,
        reason: String,
    },
}

/// The time axis as read off a dataset, before decoding.
#[derive(Debug, Clone, Default)]
pub struct RawTimeAxis {
    pub values: Vec<f64>,
    pub units: Option<String>,
    pub calendar: Option<String>,
}

impl RawTimeAxis {
    pub fn decode(&self) -> Result<Vec<NaiveDateTime>, DecodeError> {
        let units = self
            .units
            .as_deref()
            .ok_or(DecodeError::MissingAttribute("units"))?;
        let calendar = self
            .calendar
            .as_deref()
            .ok_or(DecodeError::MissingAttribute("calendar"))?;

        decode_times(&self.values, units, calendar)
    }
}

/// Converts raw time values to timestamps.
///
/// Only calendars that map onto real-world dates are accepted. Values are
/// rounded to the nearest millisecond.
pub fn decode_times(
    values: &[f64],
    units: &str,
    calendar: &str,
) -> Result<Vec<NaiveDateTime>, DecodeError> {
    let malformed = |reason: String| DecodeError::Malformed {
        units: units.to_string(),
        calendar: calendar.to_string(),
        reason,
    };

    match calendar.trim().to_lowercase().as_str() {
        "standard" | "gregorian" | "proleptic_gregorian" => {}
        other => return Err(malformed(format!("unsupported calendar `{}`", other))),
    }

    let (millis_per_unit, reference) = parse_units(units).map_err(malformed)?;

    values
        .iter()
        .map(|&value| {
            if !value.is_finite() {
                return Err(malformed(format!("non-finite time value {}", value)));
            }
            let offset = (value * millis_per_unit).round();
            if offset.abs() > i64::MAX as f64 {
                return Err(malformed(format!("time value {} out of range", value)));
            }
            Duration::try_milliseconds(offset as i64)
                .and_then(|delta| reference.checked_add_signed(delta))
                .ok_or_else(|| malformed(format!("time value {} out of range", value)))
        })
        .collect()
}

/// Encodes timestamps with [`OUTPUT_TIME_UNITS`].
pub fn encode_hours(times: &[NaiveDateTime]) -> Vec<f64> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap_or_default()
        .and_time(NaiveTime::default());

    times
        .iter()
        .map(|t| (*t - epoch).num_milliseconds() as f64 / 3_600_000.0)
        .collect()
}

fn parse_units(units: &str) -> Result<(f64, NaiveDateTime), String> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| "expected `<unit> since <reference>`".to_string())?;

    let millis_per_unit = match unit.trim().to_lowercase().as_str() {
        "days" | "day" | "d" => 86_400_000.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000.0,
        "minutes" | "minute" | "mins" | "min" => 60_000.0,
        "seconds" | "second" | "secs" | "sec" | "s" => 1_000.0,
        "milliseconds" | "millisecond" | "msecs" | "msec" | "ms" => 1.0,
        other => return Err(format!("unknown time unit `{}`", other)),
    };

    Ok((millis_per_unit, parse_reference(reference)?))
}

// Accepts `YYYY-M-D`, optionally followed by `H:M[:S[.f]]` (space or `T`) and `Z`/`UTC`.
fn parse_reference(reference: &str) -> Result<NaiveDateTime, String> {
    let trimmed = reference.trim();
    let trimmed = trimmed
        .strip_suffix("UTC")
        .or_else(|| trimmed.strip_suffix('Z'))
        .unwrap_or(trimmed)
        .trim();

    let (date_part, time_part) = match trimmed.split_once(|c| c == ' ' || c == 'T') {
        Some((date, time)) => (date, Some(time.trim())),
        None => (trimmed, None),
    };

    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| format!("invalid reference date `{}`", reference))?;

    let time = match time_part.filter(|t| !t.is_empty()) {
        None => NaiveTime::default(),
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
            .map_err(|_| format!("invalid reference time `{}`", reference))?,
    };

    Ok(date.and_time(time))
}

// -- Tests -------------------------------------------------------------------
