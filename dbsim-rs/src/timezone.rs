//! Conversion between UTC offsets and the product's duration-offset
//! notation, used to cross-check the offset a running cluster reports
//! against the zone the container was started with.
//!
//! The notation is an ISO-8601-style dayTimeDuration: sign (only when
//! negative), `PT{hours}H`, then `{minutes}M` only when the minutes
//! component is non-zero. `America/St_Johns` in standard time is
//! `-PT3H30M`; `+05:00` is `PT5H`.

use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::errors::{HarnessError, Result};

/// Formats a UTC offset in seconds as the duration-offset notation.
pub fn offset_notation(offset_seconds: i32) -> String {
    let total_minutes = offset_seconds.abs() / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    let sign = if offset_seconds < 0 { "-" } else { "" };
    if minutes == 0 {
        format!("{sign}PT{hours}H")
    } else {
        format!("{sign}PT{hours}H{minutes}M")
    }
}

/// Resolves an IANA zone name to its offset notation at an explicit
/// instant. The instant matters: zones with daylight saving change offset
/// through the year.
pub fn zone_offset_notation(zone: &str, at: DateTime<Utc>) -> Result<String> {
    let tz: Tz = zone
        .parse()
        .map_err(|_| HarnessError::UnknownTimezone(zone.to_string()))?;
    let offset = tz.offset_from_utc_datetime(&at.naive_utc());
    Ok(offset_notation(offset.fix().local_minus_utc()))
}

/// Resolves an IANA zone name to its offset notation right now; the live
/// cross-check compares this against the cluster-reported value at the
/// same moment.
pub fn current_zone_offset_notation(zone: &str) -> Result<String> {
    zone_offset_notation(zone, Utc::now())
}

/// Parses the numeric offset reported by the OS (`date +%z`): `±HHMM`,
/// with or without a colon separator. Returns seconds east of UTC.
pub fn parse_numeric_offset(raw: &str) -> Result<i32> {
    let raw = raw.trim();
    let (sign, digits) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = raw.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(HarnessError::UnexpectedResponse(format!(
            "numeric offset `{raw}` has no sign"
        )));
    };
    let digits = digits.replace(':', "");
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HarnessError::UnexpectedResponse(format!(
            "numeric offset `{raw}` is not ±HHMM"
        )));
    }
    let hours: i32 = digits[..2].parse().map_err(|_| {
        HarnessError::UnexpectedResponse(format!("numeric offset `{raw}` is not ±HHMM"))
    })?;
    let minutes: i32 = digits[2..].parse().map_err(|_| {
        HarnessError::UnexpectedResponse(format!("numeric offset `{raw}` is not ±HHMM"))
    })?;
    Ok(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_time_instant() -> DateTime<Utc> {
        // mid-January, clear of daylight saving everywhere relevant
        DateTime::parse_from_rfc3339("2026-01-15T12:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn negative_half_hour_zone_keeps_minutes_and_sign() {
        let notation = zone_offset_notation("America/St_Johns", standard_time_instant())
            .expect("known zone");
        assert_eq!(notation, "-PT3H30M");
    }

    #[test]
    fn whole_hour_offset_omits_minutes() {
        let notation =
            zone_offset_notation("Asia/Karachi", standard_time_instant()).expect("known zone");
        assert_eq!(notation, "PT5H");
    }

    #[test]
    fn positive_offset_has_no_leading_sign() {
        let notation =
            zone_offset_notation("Asia/Kolkata", standard_time_instant()).expect("known zone");
        assert_eq!(notation, "PT5H30M");
    }

    #[test]
    fn utc_is_zero_hours() {
        assert_eq!(offset_notation(0), "PT0H");
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let err = zone_offset_notation("Mars/Olympus_Mons", standard_time_instant())
            .expect_err("not a zone");
        assert!(matches!(err, HarnessError::UnknownTimezone(_)));
    }

    #[test]
    fn numeric_offsets_parse_with_and_without_colon() {
        assert_eq!(parse_numeric_offset("+0530").expect("valid"), 5 * 3600 + 1800);
        assert_eq!(parse_numeric_offset("-03:30").expect("valid"), -(3 * 3600 + 1800));
        assert_eq!(
            offset_notation(parse_numeric_offset("-0330").expect("valid")),
            "-PT3H30M"
        );
        assert!(parse_numeric_offset("0530").is_err());
        assert!(parse_numeric_offset("+5:3").is_err());
    }
}
