use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly – no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Naive date-time layouts accepted in input files, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts; the reading is placed at local midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A parsed timestamp: the local wall-clock time plus, when the input carried
/// an offset, the absolute instant it named.
///
/// Two inputs an hour apart can share `local` when a clock falls back; their
/// `instant`s still differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ParsedTimestamp {
    pub local: NaiveDateTime,
    pub instant: Option<DateTime<Utc>>,
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Turns timestamp strings from input files into local wall-clock times.
///
/// Strings carrying a UTC offset are converted into the handler's timezone
/// before the offset is dropped, so every reading of a run shares one notion
/// of "calendar day". Strings without an offset are already local.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneHandler {
    default_tz: Tz,
}

impl Default for TimezoneHandler {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

impl TimezoneHandler {
    /// Create a handler with the given IANA timezone name as the default.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    /// Parse a timestamp string into a local [`NaiveDateTime`].
    ///
    /// Returns `None` for empty strings or unrecognised layouts. Day/month
    /// slash layouts such as `01/02/2023` are rejected as ambiguous.
    pub fn parse_timestamp(&self, s: &str) -> Option<NaiveDateTime> {
        self.parse(s).map(|p| p.local)
    }

    /// Like [`parse_timestamp`](Self::parse_timestamp), but keeps the UTC
    /// instant of offset-carrying inputs.
    pub fn parse(&self, s: &str) -> Option<ParsedTimestamp> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        // Replace trailing 'Z' with '+00:00'.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        let offset = DateTime::parse_from_rfc3339(&normalised)
            .or_else(|_| DateTime::parse_from_str(&normalised, "%Y-%m-%d %H:%M:%S%.f%:z"));
        if let Ok(dt) = offset {
            return Some(ParsedTimestamp {
                local: dt.with_timezone(&self.default_tz).naive_local(),
                instant: Some(dt.with_timezone(&Utc)),
            });
        }

        let naive = DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            });
        if let Some(local) = naive {
            return Some(ParsedTimestamp { local, instant: None });
        }

        debug!("TimezoneHandler: could not parse timestamp \"{}\"", s);
        None
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    /// Expose the configured default timezone.
    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn utc() -> TimezoneHandler {
        TimezoneHandler::new("UTC")
    }

    #[test]
    fn test_validate_timezone_valid() {
        assert!(TimezoneHandler::validate_timezone("UTC"));
        assert!(TimezoneHandler::validate_timezone("Europe/London"));
        assert!(TimezoneHandler::validate_timezone("Asia/Kolkata"));
    }

    #[test]
    fn test_validate_timezone_invalid() {
        assert!(!TimezoneHandler::validate_timezone("Not/AZone"));
        assert!(!TimezoneHandler::validate_timezone(""));
    }

    #[test]
    fn test_new_invalid_timezone_falls_back_to_utc() {
        let handler = TimezoneHandler::new("Mars/Olympus");
        assert_eq!(handler.default_tz(), Tz::UTC);
    }

    #[test]
    fn test_parse_naive_iso() {
        let dt = utc().parse_timestamp("2023-01-01T12:30:00").unwrap();
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_pandas_style_space_separator() {
        let dt = utc().parse_timestamp("2023-03-05 07:00:00").unwrap();
        assert_eq!((dt.month(), dt.day(), dt.hour()), (3, 5, 7));
    }

    #[test]
    fn test_parse_minutes_only() {
        let dt = utc().parse_timestamp("2023-01-01T06:00").unwrap();
        assert_eq!(dt.hour(), 6);
    }

    #[test]
    fn test_parse_fractional_seconds() {
        let dt = utc().parse_timestamp("2023-01-01 00:00:01.250").unwrap();
        assert_eq!(dt.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_parse_date_only_is_midnight() {
        let dt = utc().parse_timestamp("2023-12-31").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 12, 31));
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_z_suffix_in_utc() {
        let dt = utc().parse_timestamp("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_offset_converted_to_handler_zone() {
        let handler = TimezoneHandler::new("Asia/Kolkata");
        // 20:00 UTC is 01:30 the next day in Kolkata.
        let dt = handler.parse_timestamp("2024-01-15T20:00:00+00:00").unwrap();
        assert_eq!((dt.day(), dt.hour(), dt.minute()), (16, 1, 30));
    }

    #[test]
    fn test_parse_fall_back_hour_keeps_distinct_instants() {
        let handler = TimezoneHandler::new("America/New_York");
        // Both are 01:30 local on the day clocks go back, an hour apart.
        let first = handler.parse("2023-11-05T05:30:00Z").unwrap();
        let second = handler.parse("2023-11-05T06:30:00Z").unwrap();

        assert_eq!(first.local, second.local);
        assert_eq!((first.local.hour(), first.local.minute()), (1, 30));
        assert!(first.instant < second.instant);
        assert!(first < second);
    }

    #[test]
    fn test_parse_naive_has_no_instant() {
        let parsed = utc().parse("2023-01-01 06:00:00").unwrap();
        assert_eq!(parsed.instant, None);
        assert_eq!(parsed.local.hour(), 6);
    }

    #[test]
    fn test_parse_naive_is_not_shifted() {
        let handler = TimezoneHandler::new("America/New_York");
        let dt = handler.parse_timestamp("2024-01-15 20:00:00").unwrap();
        assert_eq!((dt.day(), dt.hour()), (15, 20));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert!(utc().parse_timestamp("  2023-01-01  ").is_some());
    }

    #[test]
    fn test_parse_empty_returns_none() {
        assert!(utc().parse_timestamp("").is_none());
        assert!(utc().parse_timestamp("   ").is_none());
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(utc().parse_timestamp("timestamp").is_none());
        assert!(utc().parse_timestamp("01/02/2023 10:00:00").is_none());
    }

    #[test]
    fn test_get_system_timezone_returns_nonempty_string() {
        assert!(!get_system_timezone().is_empty());
    }
}
