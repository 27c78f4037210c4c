//! Birth local time to Julian Day (UT).
//!
//! Calendar rollover (a local time whose UT equivalent falls on the previous
//! or next day) is done with chrono date arithmetic, so month lengths and
//! leap years are honoured.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::{ChartError, ChartResult};
use crate::JulianDay;

/// Julian Day of the Unix epoch, 1970-01-01T00:00:00 UT.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;
/// Real-world UTC offsets span UTC-12 to UTC+14.
const MAX_OFFSET_HOURS: f64 = 14.0;

/// Converts a birth date ("YYYY-MM-DD"), local time ("HH:MM[:SS]") and UTC
/// offset in hours into a Julian Day in UT.
pub fn compute_julian_day(date: &str, time: &str, tz_offset_hours: f64) -> ChartResult<JulianDay> {
    let local = parse_birth_datetime(date, time)?;
    let universal = to_universal_time(local, tz_offset_hours)?;
    Ok(naive_utc_to_julian_day(universal))
}

/// Offset used when the geocoder could not provide one: one hour per 15° of
/// longitude, east positive.
pub fn offset_from_longitude(longitude: f64) -> f64 {
    (longitude / 15.0).round()
}

pub fn parse_birth_datetime(date: &str, time: &str) -> ChartResult<NaiveDateTime> {
    Ok(NaiveDateTime::new(parse_date(date)?, parse_time(time)?))
}

/// Shifts a local wall-clock time to UT, rolling the calendar date when the
/// shift crosses midnight.
pub fn to_universal_time(local: NaiveDateTime, tz_offset_hours: f64) -> ChartResult<NaiveDateTime> {
    if !tz_offset_hours.is_finite() || tz_offset_hours.abs() > MAX_OFFSET_HOURS {
        return Err(ChartError::invalid_input(format!(
            "timezone offset {tz_offset_hours} is outside [-{MAX_OFFSET_HOURS}, {MAX_OFFSET_HOURS}] hours"
        )));
    }
    let offset = ChronoDuration::seconds((tz_offset_hours * 3600.0).round() as i64);
    local
        .checked_sub_signed(offset)
        .ok_or_else(|| ChartError::invalid_input("birth date is out of the supported range"))
}

pub fn naive_utc_to_julian_day(universal: NaiveDateTime) -> JulianDay {
    date_to_julian_day(Utc.from_utc_datetime(&universal))
}

pub fn date_to_julian_day(date_time: DateTime<Utc>) -> JulianDay {
    let seconds = date_time.timestamp() as f64 + date_time.timestamp_subsec_nanos() as f64 / 1e9;
    UNIX_EPOCH_JD + seconds / SECONDS_PER_DAY
}

pub fn julian_day_to_date(jd: JulianDay) -> Option<DateTime<Utc>> {
    if !jd.is_finite() {
        return None;
    }
    let millis = ((jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
}

fn parse_date(date: &str) -> ChartResult<NaiveDate> {
    let parts: Vec<&str> = date.trim().split('-').collect();
    if parts.len() != 3 {
        return Err(ChartError::invalid_input(format!(
            "birthdate `{date}` is not in YYYY-MM-DD form"
        )));
    }
    let year: i32 = parse_field(parts[0], "year")?;
    let month: u32 = parse_field(parts[1], "month")?;
    let day: u32 = parse_field(parts[2], "day")?;

    if !(1..=12).contains(&month) {
        return Err(ChartError::invalid_input(format!("month {month} is out of range")));
    }
    if !(1..=31).contains(&day) {
        return Err(ChartError::invalid_input(format!("day {day} is out of range")));
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ChartError::invalid_input(format!("{year:04}-{month:02} has no day {day}"))
    })
}

fn parse_time(time: &str) -> ChartResult<NaiveTime> {
    let parts: Vec<&str> = time.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(ChartError::invalid_input(format!(
            "birthtime `{time}` is not in HH:MM[:SS] form"
        )));
    }
    let hour: u32 = parse_field(parts[0], "hour")?;
    let minute: u32 = parse_field(parts[1], "minute")?;
    let second: u32 = match parts.get(2) {
        Some(value) => parse_field(value, "second")?,
        None => 0,
    };

    if hour >= 24 {
        return Err(ChartError::invalid_input(format!("hour {hour} is out of range")));
    }
    if minute >= 60 {
        return Err(ChartError::invalid_input(format!("minute {minute} is out of range")));
    }
    if second >= 60 {
        return Err(ChartError::invalid_input(format!("second {second} is out of range")));
    }
    NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| ChartError::invalid_input(format!("invalid birthtime `{time}`")))
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &str) -> ChartResult<T> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ChartError::invalid_input(format!(
            "{field} `{value}` is not numeric"
        )));
    }
    value
        .parse()
        .map_err(|_| ChartError::invalid_input(format!("{field} `{value}` is not numeric")))
}
