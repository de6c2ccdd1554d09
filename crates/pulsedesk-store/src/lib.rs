//! PulseDesk persistence — SQLite schema for tenant organizations, their
//! task agents, and the append-only dispatch run log.
//!
//! The scheduler's contract with this store is deliberately narrow:
//! - read: `list_organizations`, `eligible_agents`
//! - write: `set_last_triggered` (the single agent mutation) and `append_run`
//!
//! Run log rows are immutable once written; the store exposes no update or
//! delete for them.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

use pulsedesk_core::error::{PulseDeskError, Result};

/// Persistence layer for scheduler data.
pub struct SchedulerStore {
    conn: Connection,
}

/// Tenant organization record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// Schedulable task agent, owned by one organization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Agent {
    pub id: String,
    pub org_id: String,
    pub name: String,
    /// `Daily`, `Weekly`, or `Monthly`.
    pub frequency: Option<String>,
    /// Weekday 1-7 (ISO, 1 = Monday) for Weekly, day-of-month 1-31 for
    /// Monthly. Stored raw, optionally prefixed (`W-3`, `M-15`).
    pub day_time: Option<String>,
    /// Local wall-clock time, `"HH:mm"` (legacy bare hour accepted).
    pub schedule_time: Option<String>,
    /// Scheduler eligibility gate.
    pub is_agent: bool,
    /// Set only by the dispatch executor after a confirmed successful
    /// external call.
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Status of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunStatus {
    CronStarted,
    Selected,
    Triggered,
    Success,
    Failure,
    Skipped,
    CronCompleted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::CronStarted => "cron_started",
            RunStatus::Selected => "selected",
            RunStatus::Triggered => "triggered",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
            RunStatus::Skipped => "skipped",
            RunStatus::CronCompleted => "cron_completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cron_started" => Some(RunStatus::CronStarted),
            "selected" => Some(RunStatus::Selected),
            "triggered" => Some(RunStatus::Triggered),
            "success" => Some(RunStatus::Success),
            "failure" => Some(RunStatus::Failure),
            "skipped" => Some(RunStatus::Skipped),
            "cron_completed" => Some(RunStatus::CronCompleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run log event to append. Most fields are optional — decision events
/// carry agent snapshots, start/completion events carry counters.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub status: RunStatus,
    pub org_id: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub frequency: Option<String>,
    pub day_time: Option<String>,
    pub schedule_time: Option<String>,
    pub window: Option<String>,
    pub skip_reason: Option<String>,
    pub api_url: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub checked: Option<u32>,
    pub triggered: Option<u32>,
    pub skipped: Option<u32>,
}

impl RunEvent {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            org_id: None,
            agent_id: None,
            agent_name: None,
            frequency: None,
            day_time: None,
            schedule_time: None,
            window: None,
            skip_reason: None,
            api_url: None,
            session_id: None,
            message: None,
            checked: None,
            triggered: None,
            skipped: None,
        }
    }
}

/// A persisted run log row.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunLogRow {
    pub id: i64,
    pub status: String,
    pub org_id: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub frequency: Option<String>,
    pub day_time: Option<String>,
    pub schedule_time: Option<String>,
    pub window: Option<String>,
    pub skip_reason: Option<String>,
    pub api_url: Option<String>,
    pub session_id: Option<String>,
    pub message: Option<String>,
    pub checked: Option<u32>,
    pub triggered: Option<u32>,
    pub skipped: Option<u32>,
    pub created_at: String,
}

/// Filter for run log queries. All fields are AND-combined; `None` matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub org_id: Option<String>,
    pub agent_id: Option<String>,
    pub status: Option<RunStatus>,
}

/// Shared SELECT column list for agent queries — single source of truth.
const AGENT_SELECT: &str = "SELECT id,org_id,name,frequency,day_time,schedule_time,is_agent,last_triggered_at,created_at,updated_at FROM agents";

const RUN_SELECT: &str = "SELECT id,status,org_id,agent_id,agent_name,frequency,day_time,schedule_time,window,skip_reason,api_url,session_id,message,checked,triggered,skipped,created_at FROM run_log";

/// Map a database row to an Agent struct.
fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<Agent> {
    let last_triggered: Option<String> = row.get(7)?;
    Ok(Agent {
        id: row.get(0)?,
        org_id: row.get(1)?,
        name: row.get(2)?,
        frequency: row.get(3)?,
        day_time: row.get(4)?,
        schedule_time: row.get(5)?,
        is_agent: row.get::<_, i32>(6)? != 0,
        last_triggered_at: last_triggered
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunLogRow> {
    Ok(RunLogRow {
        id: row.get(0)?,
        status: row.get(1)?,
        org_id: row.get(2)?,
        agent_id: row.get(3)?,
        agent_name: row.get(4)?,
        frequency: row.get(5)?,
        day_time: row.get(6)?,
        schedule_time: row.get(7)?,
        window: row.get(8)?,
        skip_reason: row.get(9)?,
        api_url: row.get(10)?,
        session_id: row.get(11)?,
        message: row.get(12)?,
        checked: row.get(13)?,
        triggered: row.get(14)?,
        skipped: row.get(15)?,
        created_at: row.get(16)?,
    })
}

impl SchedulerStore {
    /// Open or create the scheduler database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| PulseDeskError::Store(format!("DB open error: {e}")))?;

        // WAL mode allows concurrent readers/writers and prevents
        // "database is locked" errors.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| PulseDeskError::Store(format!("DB pragma error: {e}")))?;

        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PulseDeskError::Store(format!("DB open error: {e}")))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                created_at TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                name TEXT NOT NULL,
                frequency TEXT,
                day_time TEXT,
                schedule_time TEXT,
                is_agent INTEGER NOT NULL DEFAULT 1,
                last_triggered_at TEXT,
                created_at TEXT DEFAULT (datetime('now')),
                updated_at TEXT DEFAULT (datetime('now')),
                UNIQUE(org_id, name)
            );

            -- Append-only dispatch audit trail
            CREATE TABLE IF NOT EXISTS run_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status TEXT NOT NULL,
                org_id TEXT,
                agent_id TEXT,
                agent_name TEXT,
                frequency TEXT,
                day_time TEXT,
                schedule_time TEXT,
                window TEXT,
                skip_reason TEXT,
                api_url TEXT,
                session_id TEXT,
                message TEXT,
                checked INTEGER,
                triggered INTEGER,
                skipped INTEGER,
                created_at TEXT DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_run_log_org ON run_log(org_id);
            CREATE INDEX IF NOT EXISTS idx_run_log_agent ON run_log(agent_id);
            CREATE INDEX IF NOT EXISTS idx_run_log_status ON run_log(status);
        ",
            )
            .map_err(|e| PulseDeskError::Store(format!("Migration error: {e}")))?;
        Ok(())
    }

    // ── Organizations ────────────────────────────────────

    /// Create a new organization.
    pub fn create_organization(&self, name: &str) -> Result<Organization> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO organizations (id, name) VALUES (?1, ?2)",
                params![id, name],
            )
            .map_err(|e| PulseDeskError::Store(format!("Insert organization: {e}")))?;
        self.get_organization(&id)
    }

    /// Get an organization by ID.
    pub fn get_organization(&self, id: &str) -> Result<Organization> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM organizations WHERE id=?1",
                params![id],
                |row| {
                    Ok(Organization {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .map_err(|e| PulseDeskError::Store(format!("Get organization: {e}")))
    }

    /// List all organizations.
    pub fn list_organizations(&self) -> Result<Vec<Organization>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM organizations ORDER BY name")
            .map_err(|e| PulseDeskError::Store(format!("Prepare: {e}")))?;

        let orgs = stmt
            .query_map([], |row| {
                Ok(Organization {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(|e| PulseDeskError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(orgs)
    }

    // ── Agents ────────────────────────────────────

    /// Create or update an agent for an organization.
    pub fn upsert_agent(
        &self,
        org_id: &str,
        name: &str,
        frequency: Option<&str>,
        day_time: Option<&str>,
        schedule_time: Option<&str>,
        is_agent: bool,
    ) -> Result<Agent> {
        let id = format!("{}-{}", org_id, name);
        self.conn
            .execute(
                "INSERT INTO agents (id, org_id, name, frequency, day_time, schedule_time, is_agent, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
                 ON CONFLICT(org_id, name) DO UPDATE SET
                   frequency=?4, day_time=?5, schedule_time=?6, is_agent=?7, updated_at=datetime('now')",
                params![id, org_id, name, frequency, day_time, schedule_time, is_agent as i32],
            )
            .map_err(|e| PulseDeskError::Store(format!("Upsert agent: {e}")))?;
        self.get_agent(&id)
    }

    /// Get a single agent by ID.
    pub fn get_agent(&self, id: &str) -> Result<Agent> {
        self.conn
            .query_row(
                &format!("{} WHERE id=?1", AGENT_SELECT),
                params![id],
                row_to_agent,
            )
            .map_err(|e| PulseDeskError::Store(format!("Get agent: {e}")))
    }

    /// List all agents for an organization.
    pub fn list_agents(&self, org_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE org_id=?1 ORDER BY name", AGENT_SELECT))
            .map_err(|e| PulseDeskError::Store(format!("Prepare: {e}")))?;

        let agents = stmt
            .query_map(params![org_id], row_to_agent)
            .map_err(|e| PulseDeskError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(agents)
    }

    /// The scheduler eligibility query: agents gated in, with a supported
    /// frequency and the frequency-appropriate schedule field populated.
    pub fn eligible_agents(&self, org_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE org_id=?1 AND is_agent=1
                   AND frequency IN ('Daily','Weekly','Monthly')
                   AND ((frequency='Daily' AND schedule_time IS NOT NULL)
                     OR (frequency IN ('Weekly','Monthly') AND day_time IS NOT NULL))
                 ORDER BY name",
                AGENT_SELECT
            ))
            .map_err(|e| PulseDeskError::Store(format!("Prepare: {e}")))?;

        let agents = stmt
            .query_map(params![org_id], row_to_agent)
            .map_err(|e| PulseDeskError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(agents)
    }

    /// Record a confirmed successful trigger. The only agent mutation the
    /// scheduler performs.
    pub fn set_last_triggered(&self, agent_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE agents SET last_triggered_at=?1, updated_at=datetime('now') WHERE id=?2",
                params![at.to_rfc3339(), agent_id],
            )
            .map_err(|e| PulseDeskError::Store(format!("Set last triggered: {e}")))?;
        Ok(())
    }

    /// Delete an agent by organization + name.
    pub fn delete_agent(&self, org_id: &str, name: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM agents WHERE org_id=?1 AND name=?2",
                params![org_id, name],
            )
            .map_err(|e| PulseDeskError::Store(format!("Delete agent: {e}")))?;
        Ok(deleted > 0)
    }

    // ── Run Log ────────────────────────────────────

    /// Append one run log entry. Entries are immutable once written.
    pub fn append_run(&self, event: &RunEvent) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO run_log
                 (status, org_id, agent_id, agent_name, frequency, day_time, schedule_time,
                  window, skip_reason, api_url, session_id, message, checked, triggered, skipped)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
                params![
                    event.status.as_str(),
                    event.org_id,
                    event.agent_id,
                    event.agent_name,
                    event.frequency,
                    event.day_time,
                    event.schedule_time,
                    event.window,
                    event.skip_reason,
                    event.api_url,
                    event.session_id,
                    event.message,
                    event.checked,
                    event.triggered,
                    event.skipped,
                ],
            )
            .map_err(|e| PulseDeskError::Store(format!("Append run: {e}")))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get recent run log entries, newest first, optionally filtered by
    /// organization, agent, and status.
    pub fn recent_runs(&self, filter: &RunFilter, limit: usize) -> Result<Vec<RunLogRow>> {
        let mut sql = String::from(RUN_SELECT);
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(org_id) = &filter.org_id {
            clauses.push("org_id=?");
            args.push(Box::new(org_id.clone()));
        }
        if let Some(agent_id) = &filter.agent_id {
            clauses.push("agent_id=?");
            args.push(Box::new(agent_id.clone()));
        }
        if let Some(status) = &filter.status {
            clauses.push("status=?");
            args.push(Box::new(status.as_str()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| PulseDeskError::Store(format!("Prepare: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_run)
            .map_err(|e| PulseDeskError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
