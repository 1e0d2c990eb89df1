//! PDF date strings (`D:YYYYMMDDHHmmSSOHH'mm'`).
//!
//! Real-world producers truncate trailing fields, write `Z` offsets, or
//! drop the apostrophes, so parsing is tolerant; formatting is always
//! canonical.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, TimeZone};

/// Parse a PDF date string into a timezone-aware timestamp.
///
/// Returns `None` when the string is not a recognizable date. Missing
/// trailing fields default per the specification (month/day to 1, the
/// rest to 0, offset to UTC).
pub fn parse_date(raw: &[u8]) -> Option<DateTime<FixedOffset>> {
    let text = std::str::from_utf8(raw).ok()?;
    let text = text.strip_prefix("D:").unwrap_or(text);
    let bytes = text.as_bytes();

    let year: i32 = field(bytes, 0, 4)?.parse().ok()?;
    let month: u32 = opt_field(bytes, 4, 2, 1);
    let day: u32 = opt_field(bytes, 6, 2, 1);
    let hour: u32 = opt_field(bytes, 8, 2, 0);
    let minute: u32 = opt_field(bytes, 10, 2, 0);
    let second: u32 = opt_field(bytes, 12, 2, 0);

    let offset_seconds = parse_offset(&bytes[bytes.len().min(14)..]).unwrap_or(0);
    let offset = FixedOffset::east_opt(offset_seconds)?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&naive).single()
}

fn field(bytes: &[u8], start: usize, len: usize) -> Option<&str> {
    if bytes.len() < start + len {
        return None;
    }
    std::str::from_utf8(&bytes[start..start + len]).ok()
}

fn opt_field(bytes: &[u8], start: usize, len: usize, default: u32) -> u32 {
    field(bytes, start, len)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse the timezone part: `Z`, or `±HH'mm'` with optional minutes and
/// optional apostrophes.
fn parse_offset(bytes: &[u8]) -> Option<i32> {
    let sign = match bytes.first()? {
        b'Z' => return Some(0),
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: Vec<u8> = bytes[1..]
        .iter()
        .copied()
        .filter(|b| b.is_ascii_digit())
        .collect();
    let hours: i32 = field(&digits, 0, 2)?.parse().ok()?;
    let minutes: i32 = opt_field(&digits, 2, 2, 0) as i32;
    Some(sign * (hours * 3600 + minutes * 60))
}

/// Format a timestamp as a canonical PDF date string.
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().local_minus_utc();
    let tz = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let abs = offset.abs();
        format!("{}{:02}'{:02}'", sign, abs / 3600, (abs % 3600) / 60)
    };
    format!("D:{}{}", date.format("%Y%m%d%H%M%S"), tz)
}

/// The current local time as a canonical PDF date string.
pub fn now() -> String {
    format_date(&Local::now().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_date() {
        let date = parse_date(b"D:20230415123045+02'00'").unwrap();
        assert_eq!(format_date(&date), "D:20230415123045+02'00'");
    }

    #[test]
    fn test_truncated_date() {
        let date = parse_date(b"D:2023").unwrap();
        assert_eq!(format_date(&date), "D:20230101000000Z");
    }

    #[test]
    fn test_z_offset() {
        let date = parse_date(b"D:20230415123045Z").unwrap();
        assert_eq!(date.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_missing_apostrophes() {
        let date = parse_date(b"D:20230415123045-0500").unwrap();
        assert_eq!(date.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_date(b"April 15, 2023").is_none());
        assert!(parse_date(b"D:20231350").is_none());
    }
}
