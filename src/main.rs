//! # PulseDesk — Recurring Task-Agent Scheduler
//!
//! Windowed, idempotent dispatcher for tenant-configured task agents.
//! On each tick it decides which agents are due, fires the external AI
//! agent-execution service, and records every decision in the run log.
//!
//! Usage:
//!   pulsedesk run                        # Scheduler loop (tick = window length)
//!   pulsedesk tick                       # Single dispatch pass
//!   pulsedesk org add "Acme Corp"        # Create a tenant organization
//!   pulsedesk agent add <org-id> report --frequency Daily --schedule-time 05:00
//!   pulsedesk logs --status skipped      # Inspect the audit trail

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use pulsedesk_core::PulseDeskConfig;
use pulsedesk_scheduler::{DispatchExecutor, Frequency, TriggerClient};
use pulsedesk_store::{RunFilter, RunStatus, SchedulerStore};

#[derive(Parser)]
#[command(
    name = "pulsedesk",
    version,
    about = "📇 PulseDesk — recurring task-agent scheduler"
)]
struct Cli {
    /// Config file path (default: ~/.pulsedesk/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop (tick cadence follows the window length)
    Run,
    /// Run a single dispatch pass and exit
    Tick,
    /// Manage tenant organizations
    Org {
        #[command(subcommand)]
        command: OrgCommand,
    },
    /// Manage task agents
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Inspect the dispatch run log
    Logs {
        /// Filter by status (cron_started, selected, triggered, success,
        /// failure, skipped, cron_completed)
        #[arg(long)]
        status: Option<String>,
        /// Filter by organization id
        #[arg(long)]
        org: Option<String>,
        /// Filter by agent id
        #[arg(long)]
        agent: Option<String>,
        /// Max entries to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum OrgCommand {
    /// Create an organization
    Add { name: String },
    /// List all organizations
    List,
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Create or update an agent
    Add {
        /// Organization id
        org: String,
        /// Agent name
        name: String,
        /// Daily, Weekly, or Monthly
        #[arg(long)]
        frequency: String,
        /// Weekday 1-7 (Weekly) or day-of-month 1-31 (Monthly), e.g. W-3, M-15
        #[arg(long)]
        day_time: Option<String>,
        /// Local wall-clock time, HH:mm
        #[arg(long)]
        schedule_time: Option<String>,
        /// Create without scheduler eligibility
        #[arg(long)]
        disabled: bool,
    },
    /// List an organization's agents
    List {
        /// Organization id
        org: String,
    },
    /// Remove an agent
    Remove {
        /// Organization id
        org: String,
        /// Agent name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "pulsedesk=debug,pulsedesk_scheduler=debug,pulsedesk_store=debug"
    } else {
        "pulsedesk=info,pulsedesk_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => {
            let expanded = shellexpand::tilde(path).to_string();
            PulseDeskConfig::load_from(Path::new(&expanded))?
        }
        None => PulseDeskConfig::load()?,
    };

    // Open database
    let db_path = shellexpand::tilde(&config.store.db_path).to_string();
    if let Some(parent) = Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SchedulerStore::open(Path::new(&db_path))?;

    match cli.command {
        Command::Run => run_scheduler(store, &config, &db_path, true).await,
        Command::Tick => run_scheduler(store, &config, &db_path, false).await,
        Command::Org { command } => handle_org(&store, command),
        Command::Agent { command } => handle_agent(&store, command),
        Command::Logs {
            status,
            org,
            agent,
            limit,
        } => handle_logs(&store, status, org, agent, limit),
    }
}

/// Start the dispatch loop, or run a single pass when `forever` is false.
async fn run_scheduler(
    store: SchedulerStore,
    config: &PulseDeskConfig,
    db_path: &str,
    forever: bool,
) -> Result<()> {
    let window_hours = config.scheduler.window_hours.max(1);
    if window_hours != config.scheduler.window_hours {
        tracing::warn!("⚠️ window_hours must be at least 1 — clamped");
    }

    println!("📇 PulseDesk v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Database:     {db_path}");
    println!("   🌐 Agent server: {}", config.scheduler.agent_server_url);
    println!("   ⏱  Window:       {window_hours}h (tick cadence follows)");
    println!();

    let store = Arc::new(Mutex::new(store));
    let trigger = TriggerClient::new(
        &config.scheduler.agent_server_url,
        config.scheduler.request_timeout_secs,
    );
    let mut executor = DispatchExecutor::new(store, trigger, window_hours);

    if !forever {
        let summary = executor.run_tick().await;
        executor.drain().await;
        println!(
            "Checked {}, triggered {}, skipped {}.",
            summary.checked, summary.triggered, summary.skipped
        );
        return Ok(());
    }

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(window_hours as u64 * 3600));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                executor.run_tick().await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("⏹ Shutting down — draining in-flight trigger calls");
                executor.drain().await;
                break;
            }
        }
    }
    Ok(())
}

fn handle_org(store: &SchedulerStore, command: OrgCommand) -> Result<()> {
    match command {
        OrgCommand::Add { name } => {
            let org = store.create_organization(&name)?;
            println!("✅ Organization created: {} ({})", org.name, org.id);
        }
        OrgCommand::List => {
            let orgs = store.list_organizations()?;
            if orgs.is_empty() {
                println!("No organizations.");
            }
            for org in orgs {
                println!("{}  {}  (created {})", org.id, org.name, org.created_at);
            }
        }
    }
    Ok(())
}

fn handle_agent(store: &SchedulerStore, command: AgentCommand) -> Result<()> {
    match command {
        AgentCommand::Add {
            org,
            name,
            frequency,
            day_time,
            schedule_time,
            disabled,
        } => {
            if Frequency::parse(&frequency).is_none() {
                anyhow::bail!("frequency must be Daily, Weekly, or Monthly (got '{frequency}')");
            }
            // Fail early with a readable error if the org doesn't exist
            let org = store.get_organization(&org)?;

            let agent = store.upsert_agent(
                &org.id,
                &name,
                Some(&frequency),
                day_time.as_deref(),
                schedule_time.as_deref(),
                !disabled,
            )?;
            println!(
                "✅ Agent saved: {} ({} {} {})",
                agent.id,
                frequency,
                agent.day_time.as_deref().unwrap_or("-"),
                agent.schedule_time.as_deref().unwrap_or("-"),
            );
        }
        AgentCommand::Remove { org, name } => {
            if store.delete_agent(&org, &name)? {
                println!("✅ Agent removed: {name}");
            } else {
                println!("No agent '{name}' in organization {org}.");
            }
        }
        AgentCommand::List { org } => {
            let agents = store.list_agents(&org)?;
            if agents.is_empty() {
                println!("No agents.");
            }
            for agent in agents {
                let last = agent
                    .last_triggered_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{:32}  {:8}  day={:6}  time={:6}  eligible={}  last={}",
                    agent.name,
                    agent.frequency.as_deref().unwrap_or("-"),
                    agent.day_time.as_deref().unwrap_or("-"),
                    agent.schedule_time.as_deref().unwrap_or("-"),
                    agent.is_agent,
                    last,
                );
            }
        }
    }
    Ok(())
}

fn handle_logs(
    store: &SchedulerStore,
    status: Option<String>,
    org: Option<String>,
    agent: Option<String>,
    limit: usize,
) -> Result<()> {
    let status = match status {
        Some(s) => Some(
            RunStatus::parse(&s)
                .ok_or_else(|| anyhow::anyhow!("unknown status '{s}'"))?,
        ),
        None => None,
    };
    let filter = RunFilter {
        org_id: org,
        agent_id: agent,
        status,
    };

    let rows = store.recent_runs(&filter, limit)?;
    if rows.is_empty() {
        println!("No run log entries.");
    }
    for row in rows {
        let detail = row
            .skip_reason
            .or(row.message)
            .unwrap_or_default();
        println!(
            "{:19}  {:14}  {:24}  {}",
            row.created_at,
            row.status,
            row.agent_name.as_deref().unwrap_or("-"),
            detail,
        );
    }
    Ok(())
}
