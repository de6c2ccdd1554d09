//! Dispatch window calculator.
//!
//! Windows are computed relative to "now minus window length", not aligned
//! to fixed clock boundaries, so the tick cadence and the window length must
//! stay equal — otherwise consecutive windows leave gaps or overlap. That
//! coupling is an operational invariant, not enforced here.

use chrono::{NaiveDateTime, Timelike};

/// The rolling interval an agent's scheduled hour is compared against.
///
/// `start_hour` may wrap past midnight relative to `end_hour` (e.g. 22 → 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl DispatchWindow {
    /// Compute the window ending at `now`'s hour, `window_hours` long.
    pub fn ending_at(now: NaiveDateTime, window_hours: u32) -> Self {
        let end_hour = now.hour();
        let start_hour = (end_hour + 24 - (window_hours % 24)) % 24;
        Self { start_hour, end_hour }
    }

    /// Whether `target` falls inside this window.
    ///
    /// The start boundary is exclusive: an agent scheduled exactly at the
    /// window's opening hour was already eligible in the previous window and
    /// must not retrigger.
    pub fn contains_hour(&self, target: u32) -> bool {
        if self.start_hour < self.end_hour {
            target > self.start_hour && target <= self.end_hour
        } else {
            // Wraparound past midnight (e.g. 22 → 1)
            target > self.start_hour || target <= self.end_hour
        }
    }
}

impl std::fmt::Display for DispatchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(hour, 12, 0)
            .unwrap()
    }

    #[test]
    fn test_ending_at() {
        let w = DispatchWindow::ending_at(at(6), 3);
        assert_eq!(w, DispatchWindow { start_hour: 3, end_hour: 6 });
    }

    #[test]
    fn test_ending_at_wraps_past_midnight() {
        let w = DispatchWindow::ending_at(at(1), 3);
        assert_eq!(w, DispatchWindow { start_hour: 22, end_hour: 1 });
        let w = DispatchWindow::ending_at(at(0), 3);
        assert_eq!(w, DispatchWindow { start_hour: 21, end_hour: 0 });
    }

    #[test]
    fn test_same_day_window_bounds() {
        let w = DispatchWindow { start_hour: 3, end_hour: 6 };
        assert!(!w.contains_hour(3)); // start is exclusive
        assert!(w.contains_hour(4));
        assert!(w.contains_hour(5));
        assert!(w.contains_hour(6)); // end is inclusive
        assert!(!w.contains_hour(7));
        assert!(!w.contains_hour(0));
    }

    #[test]
    fn test_same_day_window_exhaustive() {
        // start < end: in-window iff start < h <= end, for every hour
        for start in 0..23u32 {
            for end in (start + 1)..24u32 {
                let w = DispatchWindow { start_hour: start, end_hour: end };
                for h in 0..24u32 {
                    assert_eq!(w.contains_hour(h), h > start && h <= end, "h={h} w={w}");
                }
            }
        }
    }

    #[test]
    fn test_wraparound_window_exhaustive() {
        // start >= end: in-window iff h > start OR h <= end, for every hour
        for start in 0..24u32 {
            for end in 0..=start {
                let w = DispatchWindow { start_hour: start, end_hour: end };
                for h in 0..24u32 {
                    assert_eq!(w.contains_hour(h), h > start || h <= end, "h={h} w={w}");
                }
            }
        }
    }

    #[test]
    fn test_wraparound_window_bounds() {
        let w = DispatchWindow { start_hour: 22, end_hour: 1 };
        assert!(!w.contains_hour(22)); // start exclusive
        assert!(w.contains_hour(23));
        assert!(w.contains_hour(0));
        assert!(w.contains_hour(1)); // end inclusive
        assert!(!w.contains_hour(2));
        assert!(!w.contains_hour(12));
    }

    #[test]
    fn test_display() {
        let w = DispatchWindow { start_hour: 3, end_hour: 6 };
        assert_eq!(w.to_string(), "03:00-06:00");
        let w = DispatchWindow { start_hour: 22, end_hour: 1 };
        assert_eq!(w.to_string(), "22:00-01:00");
    }
}
