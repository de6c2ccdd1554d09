//! Schedule descriptor parser.
//!
//! Agents store their schedule in three loosely-typed fields: `frequency`
//! (`Daily`/`Weekly`/`Monthly`), `schedule_time` (`"HH:mm"`, legacy bare
//! hour), and `day_time` (weekday or day-of-month, optionally prefixed:
//! `W-3`, `M-15`, or a bare number). These functions normalize them into
//! comparable values. Parsing never panics — unparseable input yields a
//! determinate fallback (`ScheduleTime` zero) or `None`.

/// Supported trigger frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Parse the stored frequency string. Anything else is unsupported.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Daily" => Some(Frequency::Daily),
            "Weekly" => Some(Frequency::Weekly),
            "Monthly" => Some(Frequency::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized local wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleTime {
    pub hour: u32,
    pub minute: u32,
}

/// Parse a `schedule_time` field into hour/minute.
///
/// Accepts `"HH:mm"` and the legacy bare-number form (hour only). Missing or
/// unparseable components fall back to 0 — whether an absent value is a hard
/// skip is the caller's decision, not the parser's.
pub fn parse_schedule_time(raw: Option<&str>) -> ScheduleTime {
    let Some(raw) = raw else {
        return ScheduleTime::default();
    };
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((h, m)) => ScheduleTime {
            hour: h.trim().parse().unwrap_or(0),
            minute: m.trim().parse().unwrap_or(0),
        },
        None => ScheduleTime {
            hour: raw.parse().unwrap_or(0),
            minute: 0,
        },
    }
}

/// Parse a `day_time` field into its numeric day value.
///
/// If the string contains a `-` separator, everything after the first
/// separator is the value (`"W-3"` → 3, `"M-15"` → 15); bare numbers parse
/// directly. Returns `None` for anything non-numeric — the caller must skip
/// the agent with an "invalid dayTime" reason.
pub fn parse_day_time(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    let value = match raw.split_once('-') {
        Some((_, rest)) => rest.trim(),
        None => raw,
    };
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_time_hh_mm() {
        assert_eq!(
            parse_schedule_time(Some("05:30")),
            ScheduleTime { hour: 5, minute: 30 }
        );
        assert_eq!(
            parse_schedule_time(Some("23:00")),
            ScheduleTime { hour: 23, minute: 0 }
        );
    }

    #[test]
    fn test_schedule_time_legacy_bare_number() {
        assert_eq!(
            parse_schedule_time(Some("9")),
            ScheduleTime { hour: 9, minute: 0 }
        );
    }

    #[test]
    fn test_schedule_time_fallback() {
        assert_eq!(parse_schedule_time(None), ScheduleTime::default());
        assert_eq!(parse_schedule_time(Some("")), ScheduleTime::default());
        assert_eq!(parse_schedule_time(Some("garbage")), ScheduleTime::default());
        // Partial garbage: minute survives
        assert_eq!(
            parse_schedule_time(Some("x:45")),
            ScheduleTime { hour: 0, minute: 45 }
        );
    }

    #[test]
    fn test_schedule_time_is_deterministic() {
        let a = parse_schedule_time(Some("07:15"));
        let b = parse_schedule_time(Some("07:15"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_day_time_prefixed() {
        assert_eq!(parse_day_time(Some("W-3")), Some(3));
        assert_eq!(parse_day_time(Some("M-15")), Some(15));
        assert_eq!(parse_day_time(Some("M-31")), Some(31));
    }

    #[test]
    fn test_day_time_bare_number() {
        assert_eq!(parse_day_time(Some("5")), Some(5));
    }

    #[test]
    fn test_day_time_invalid() {
        // No numeric suffix after the separator
        assert_eq!(parse_day_time(Some("W-")), None);
        assert_eq!(parse_day_time(Some("weekday")), None);
        assert_eq!(parse_day_time(Some("")), None);
        assert_eq!(parse_day_time(None), None);
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!(Frequency::parse("Daily"), Some(Frequency::Daily));
        assert_eq!(Frequency::parse("Weekly"), Some(Frequency::Weekly));
        assert_eq!(Frequency::parse("Monthly"), Some(Frequency::Monthly));
        // Case-exact to the stored strings
        assert_eq!(Frequency::parse("daily"), None);
        assert_eq!(Frequency::parse("Hourly"), None);
    }
}
