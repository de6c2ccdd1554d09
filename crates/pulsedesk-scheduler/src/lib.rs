//! # PulseDesk Scheduler
//!
//! Windowed, idempotent, multi-tenant dispatcher for recurring task agents.
//! Once per tick it decides which configured agents are due, fires the
//! external AI agent-execution service for each, and records every decision
//! in an append-only run log.
//!
//! ## Architecture
//! ```text
//! Tick (tokio interval, cadence = window length)
//!   └── DispatchExecutor::run_tick
//!         ├── for each organization → eligible agents
//!         │     ├── schedule::parse_*        (descriptor → hour/minute/day)
//!         │     ├── DispatchWindow           (rolling window, exclusive start)
//!         │     ├── decision::decide         (trigger / skip + reason)
//!         │     └── trigger  → spawned task  (fire-and-forget HTTP call;
//!         │                                   success updates last_triggered_at)
//!         └── run log: cron_started → selected → triggered/skipped
//!                        → success/failure → cron_completed
//! ```
//!
//! The window's start boundary is exclusive: an agent scheduled exactly at
//! the opening hour was already eligible in the previous window and must not
//! retrigger. Idempotence across ticks comes from `last_triggered_at` alone —
//! at most one trigger per day/week/month per agent.

pub mod decision;
pub mod executor;
pub mod schedule;
pub mod trigger;
pub mod window;

pub use decision::{Decision, decide};
pub use executor::{DispatchExecutor, TickSummary};
pub use schedule::{Frequency, ScheduleTime, parse_day_time, parse_schedule_time};
pub use trigger::TriggerClient;
pub use window::DispatchWindow;
