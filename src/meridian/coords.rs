//! Sexagesimal coordinate parsing and sidereal time

use super::error::{MeridianError, MeridianResult};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Julian day of the J2000.0 epoch
const J2000: f64 = 2_451_545.0;

/// Split `HH:MM:SS[.s]` (colon or whitespace separated) into three numbers
fn split_sexagesimal(value: &str) -> Option<(f64, f64, f64)> {
    let parts: Vec<&str> = value
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() != 3 {
        return None;
    }

    let a = parts[0].parse::<f64>().ok()?;
    let b = parts[1].parse::<f64>().ok()?;
    let c = parts[2].parse::<f64>().ok()?;

    if !(0.0..60.0).contains(&b) || !(0.0..60.0).contains(&c) {
        return None;
    }

    Some((a, b, c))
}

/// Parse right ascension `HH:MM:SS[.s]` into decimal hours
pub fn parse_ra(value: &str) -> MeridianResult<f64> {
    let trimmed = value.trim();
    let (h, m, s) = split_sexagesimal(trimmed)
        .ok_or_else(|| MeridianError::invalid_ra(value, "expected HH:MM:SS"))?;

    if h < 0.0 || h.fract() != 0.0 || trimmed.starts_with('-') {
        return Err(MeridianError::invalid_ra(value, "hours must be a whole non-negative number"));
    }

    let hours = h + m / 60.0 + s / 3600.0;
    if hours >= 24.0 {
        return Err(MeridianError::invalid_ra(value, "must be below 24h"));
    }

    Ok(hours)
}

/// Parse declination `±DD:MM:SS[.s]` into decimal degrees
///
/// A missing sign means north (positive).
pub fn parse_dec(value: &str) -> MeridianResult<f64> {
    let trimmed = value.trim();
    let (negative, body) = match trimmed.chars().next() {
        Some('-') => (true, &trimmed[1..]),
        Some('+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (d, m, s) = split_sexagesimal(body)
        .ok_or_else(|| MeridianError::invalid_dec(value, "expected ±DD:MM:SS"))?;

    if d < 0.0 || d.fract() != 0.0 {
        return Err(MeridianError::invalid_dec(value, "degrees must be a whole number"));
    }

    let degrees = d + m / 60.0 + s / 3600.0;
    if degrees > 90.0 {
        return Err(MeridianError::invalid_dec(value, "must be within ±90°"));
    }

    Ok(if negative { -degrees } else { degrees })
}

/// Julian day for a UTC instant
pub fn julian_day(dt: &DateTime<Utc>) -> f64 {
    let (y, m) = if dt.month() <= 2 {
        (dt.year() - 1, dt.month() + 12)
    } else {
        (dt.year(), dt.month())
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let jd = (365.25 * (f64::from(y) + 4716.0)).floor()
        + (30.6001 * (f64::from(m) + 1.0)).floor()
        + f64::from(dt.day())
        + f64::from(b)
        - 1524.5;

    let seconds = f64::from(dt.num_seconds_from_midnight())
        + f64::from(dt.nanosecond().min(999_999_999)) / 1e9;

    jd + seconds / 86_400.0
}

/// Local mean sidereal time in hours `[0, 24)` for a UTC instant and an
/// east-positive longitude in degrees
pub fn local_sidereal_time(dt: &DateTime<Utc>, longitude: f64) -> f64 {
    let jd = julian_day(dt);
    let t = (jd - J2000) / 36_525.0;

    // Greenwich mean sidereal time, degrees
    let gmst = 280.460_618_37 + 360.985_647_366_29 * (jd - J2000) + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;

    (gmst + longitude).rem_euclid(360.0) / 15.0
}

/// Format decimal hours as `HH:MM:SS`
pub fn format_hours(hours: f64) -> String {
    let total = (hours.rem_euclid(24.0) * 3600.0).round() as u64 % 86_400;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
