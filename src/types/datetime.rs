//! `INTERNALDATE` formatting/parsing: `"dd-Mon-yyyy HH:MM:SS +ZZZZ"`.

use chrono::{DateTime, FixedOffset, TimeZone};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub fn format_internal_date(date: &DateTime<FixedOffset>) -> String {
    use chrono::Datelike;
    use chrono::Timelike;

    let offset_secs = date.offset().local_minus_utc();
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let offset_secs = offset_secs.abs();
    let offset_hh = offset_secs / 3600;
    let offset_mm = (offset_secs % 3600) / 60;

    format!(
        "{:02}-{}-{:04} {:02}:{:02}:{:02} {}{:02}{:02}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year(),
        date.hour(),
        date.minute(),
        date.second(),
        sign,
        offset_hh,
        offset_mm
    )
}

/// Parses the `date-time` literal used by `APPEND` and by `BEFORE`/`ON`/
/// `SINCE` search keys (date-only form is also accepted for search).
pub fn parse_internal_date(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim_matches('"');
    chrono::DateTime::parse_from_str(input, "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .or_else(|| parse_date_only(input))
}

fn parse_date_only(input: &str) -> Option<DateTime<FixedOffset>> {
    let date = chrono::NaiveDate::parse_from_str(input, "%d-%b-%Y").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    FixedOffset::east_opt(0)
        .unwrap()
        .from_local_datetime(&naive)
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_per_rfc3501() {
        let date = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 9, 30, 0)
            .unwrap();
        assert_eq!(format_internal_date(&date), "05-Mar-2024 09:30:00 +0000");
    }

    #[test]
    fn round_trips_through_parse() {
        let formatted = "05-Mar-2024 09:30:00 +0000";
        let parsed = parse_internal_date(formatted).unwrap();
        assert_eq!(format_internal_date(&parsed), formatted);
    }

    #[test]
    fn accepts_date_only_form_for_search() {
        assert!(parse_internal_date("05-Mar-2024").is_some());
    }
}
