//! Trigger decision engine.
//!
//! Evaluated fresh for every agent on every tick — no intermediate state
//! beyond the agent's `last_triggered_at`. Every non-trigger branch returns a
//! precise reason so operators can diagnose from the run log alone why an
//! agent did or did not fire, without re-deriving this logic.

use chrono::{Datelike, NaiveDateTime};

use pulsedesk_store::Agent;

use crate::schedule::{Frequency, parse_day_time, parse_schedule_time};
use crate::window::DispatchWindow;

/// Outcome of evaluating one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Trigger,
    Skip(String),
}

impl Decision {
    pub fn should_trigger(&self) -> bool {
        matches!(self, Decision::Trigger)
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Decision::Trigger => None,
            Decision::Skip(reason) => Some(reason),
        }
    }
}

/// Decide whether `agent` should trigger in the current window.
///
/// `now` and `last_triggered` are local wall-clock times; the caller converts
/// from stored UTC. This function never mutates state and never panics —
/// the `last_triggered_at` update belongs to the dispatch executor, after the
/// external call is confirmed successful.
pub fn decide(
    agent: &Agent,
    now: NaiveDateTime,
    window: &DispatchWindow,
    last_triggered: Option<NaiveDateTime>,
) -> Decision {
    let raw_frequency = agent.frequency.as_deref().unwrap_or("");
    let Some(frequency) = Frequency::parse(raw_frequency) else {
        return Decision::Skip(format!("unsupported frequency '{raw_frequency}'"));
    };

    match frequency {
        Frequency::Daily => {
            if agent.schedule_time.as_deref().unwrap_or("").trim().is_empty() {
                return Decision::Skip("Daily agent has no scheduleTime".into());
            }
            if let Some(last) = last_triggered
                && last.date() == now.date()
            {
                return Decision::Skip(format!(
                    "already triggered today at {}",
                    last.format("%H:%M")
                ));
            }
            hour_in_window(agent, window)
        }
        Frequency::Weekly => {
            let Some(target_day) = parse_day_time(agent.day_time.as_deref()) else {
                return Decision::Skip(format!(
                    "invalid dayTime '{}'",
                    agent.day_time.as_deref().unwrap_or("")
                ));
            };
            if let Some(last) = last_triggered
                && last.iso_week() == now.iso_week()
            {
                return Decision::Skip(format!(
                    "already triggered this week on {}",
                    last.format("%Y-%m-%d")
                ));
            }
            let today = now.weekday().number_from_monday();
            if today != target_day {
                return Decision::Skip(format!(
                    "scheduled for weekday {target_day}, today is weekday {today}"
                ));
            }
            hour_in_window(agent, window)
        }
        Frequency::Monthly => {
            let Some(target_day) = parse_day_time(agent.day_time.as_deref()) else {
                return Decision::Skip(format!(
                    "invalid dayTime '{}'",
                    agent.day_time.as_deref().unwrap_or("")
                ));
            };
            if let Some(last) = last_triggered
                && last.year() == now.year()
                && last.month() == now.month()
            {
                return Decision::Skip(format!(
                    "already triggered this month on {}",
                    last.format("%Y-%m-%d")
                ));
            }
            if now.day() != target_day {
                return Decision::Skip(format!(
                    "scheduled for day {target_day} of the month, today is day {}",
                    now.day()
                ));
            }
            hour_in_window(agent, window)
        }
    }
}

/// Shared final check: the parsed schedule hour must fall in the window.
fn hour_in_window(agent: &Agent, window: &DispatchWindow) -> Decision {
    let time = parse_schedule_time(agent.schedule_time.as_deref());
    if window.contains_hour(time.hour) {
        Decision::Trigger
    } else {
        Decision::Skip(format!(
            "scheduled hour {:02}:00 not in window {window}",
            time.hour
        ))
    }
}
