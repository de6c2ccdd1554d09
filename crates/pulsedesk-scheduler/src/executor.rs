//! Dispatch executor — the per-tick loop that checks and triggers agents.
//!
//! Organizations and their agents are processed sequentially; trigger calls
//! are fired as detached tasks so the loop never waits on the agent server.
//! `last_triggered_at` is updated only after a confirmed successful call,
//! so a crash between "decided to trigger" and "confirmed success" re-triggers
//! on the next tick (accepted at-least-once semantics).
//!
//! One agent's failure never aborts the batch, and a whole-run failure is
//! recorded and swallowed — the scheduler must stay live for the next tick.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use pulsedesk_store::{Agent, RunEvent, RunStatus, SchedulerStore};

use crate::decision::{Decision, decide};
use crate::trigger::TriggerClient;
use crate::window::DispatchWindow;

/// Aggregate counters for one tick, written to the `cron_completed` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub checked: u32,
    pub triggered: u32,
    pub skipped: u32,
}

/// Runs one dispatch pass per tick and tracks in-flight trigger calls.
pub struct DispatchExecutor {
    store: Arc<Mutex<SchedulerStore>>,
    trigger: Arc<TriggerClient>,
    window_hours: u32,
    inflight: JoinSet<()>,
}

impl DispatchExecutor {
    pub fn new(
        store: Arc<Mutex<SchedulerStore>>,
        trigger: TriggerClient,
        window_hours: u32,
    ) -> Self {
        Self {
            store,
            trigger: Arc::new(trigger),
            window_hours,
            inflight: JoinSet::new(),
        }
    }

    /// Run one dispatch pass against the current local wall-clock time.
    pub async fn run_tick(&mut self) -> TickSummary {
        self.run_tick_at(Local::now().naive_local()).await
    }

    /// Run one dispatch pass as of `now`. Never propagates an error —
    /// failures are recorded in the run log and the tick ends early.
    pub async fn run_tick_at(&mut self, now: NaiveDateTime) -> TickSummary {
        let window = DispatchWindow::ending_at(now, self.window_hours);
        let mut summary = TickSummary::default();

        tracing::info!("⏰ Dispatch tick started (window {window})");
        self.log(RunEvent {
            window: Some(window.to_string()),
            message: Some("dispatch tick started".into()),
            ..RunEvent::new(RunStatus::CronStarted)
        })
        .await;

        let orgs = match self.store.lock().await.list_organizations() {
            Ok(orgs) => orgs,
            Err(e) => {
                tracing::error!("⚠️ Tick aborted: failed to load organizations: {e}");
                self.log(RunEvent {
                    window: Some(window.to_string()),
                    message: Some(format!("tick aborted: failed to load organizations: {e}")),
                    ..RunEvent::new(RunStatus::Failure)
                })
                .await;
                return summary;
            }
        };

        for org in orgs {
            let agents = match self.store.lock().await.eligible_agents(&org.id) {
                Ok(agents) => agents,
                Err(e) => {
                    tracing::warn!("⚠️ Skipping organization '{}': {e}", org.name);
                    self.log(RunEvent {
                        org_id: Some(org.id.clone()),
                        window: Some(window.to_string()),
                        message: Some(format!("failed to load agents: {e}")),
                        ..RunEvent::new(RunStatus::Failure)
                    })
                    .await;
                    continue;
                }
            };

            for agent in agents {
                summary.checked += 1;
                self.log(agent_event(RunStatus::Selected, &agent, &window)).await;

                let last_local = agent
                    .last_triggered_at
                    .map(|t| t.with_timezone(&Local).naive_local());

                match decide(&agent, now, &window, last_local) {
                    Decision::Trigger => {
                        summary.triggered += 1;
                        self.spawn_trigger(&agent, &window).await;
                    }
                    Decision::Skip(reason) => {
                        summary.skipped += 1;
                        tracing::debug!("⏭ '{}' skipped: {reason}", agent.name);
                        let mut event = agent_event(RunStatus::Skipped, &agent, &window);
                        event.skip_reason = Some(reason);
                        self.log(event).await;
                    }
                }
            }
        }

        tracing::info!(
            "✅ Dispatch tick complete: {} checked, {} triggered, {} skipped",
            summary.checked,
            summary.triggered,
            summary.skipped
        );
        // Marks "decision phase done" — success/failure entries for in-flight
        // trigger calls may land after this row.
        self.log(RunEvent {
            window: Some(window.to_string()),
            checked: Some(summary.checked),
            triggered: Some(summary.triggered),
            skipped: Some(summary.skipped),
            message: Some("dispatch tick complete".into()),
            ..RunEvent::new(RunStatus::CronCompleted)
        })
        .await;

        summary
    }

    /// Fire the external call for one agent as a detached task. The
    /// completion handler records success/failure and, only on success,
    /// updates `last_triggered_at`.
    async fn spawn_trigger(&mut self, agent: &Agent, window: &DispatchWindow) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let url = self.trigger.run_url(&agent.name, &agent.org_id, &session_id);
        tracing::info!("🔔 Triggering '{}' (session {})", agent.name, session_id);

        let mut event = agent_event(RunStatus::Triggered, agent, window);
        event.api_url = Some(url.clone());
        event.session_id = Some(session_id.clone());
        self.log(event).await;

        let store = Arc::clone(&self.store);
        let trigger = Arc::clone(&self.trigger);
        let agent = agent.clone();
        let window = *window;

        self.inflight.spawn(async move {
            match trigger.fire(&url).await {
                Ok(()) => {
                    tracing::info!("✅ Trigger succeeded for '{}'", agent.name);
                    let mut event = agent_event(RunStatus::Success, &agent, &window);
                    event.api_url = Some(url);
                    event.session_id = Some(session_id);

                    let db = store.lock().await;
                    if let Err(e) = db.set_last_triggered(&agent.id, Utc::now()) {
                        tracing::warn!(
                            "⚠️ Failed to record last trigger for '{}': {e}",
                            agent.name
                        );
                    }
                    if let Err(e) = db.append_run(&event) {
                        tracing::warn!("⚠️ Failed to write success entry: {e}");
                    }
                }
                Err(err) => {
                    // last_triggered_at stays untouched — the agent is
                    // naturally retried on the next in-window tick.
                    tracing::warn!("⚠️ Trigger failed for '{}': {err}", agent.name);
                    let mut event = agent_event(RunStatus::Failure, &agent, &window);
                    event.api_url = Some(url);
                    event.session_id = Some(session_id);
                    event.message = Some(err);
                    if let Err(e) = store.lock().await.append_run(&event) {
                        tracing::warn!("⚠️ Failed to write failure entry: {e}");
                    }
                }
            }
        });
    }

    /// Await all outstanding fire-and-forget trigger calls (shutdown drain).
    pub async fn drain(&mut self) {
        while let Some(result) = self.inflight.join_next().await {
            if let Err(e) = result {
                tracing::warn!("⚠️ Trigger task aborted: {e}");
            }
        }
    }

    async fn log(&self, event: RunEvent) {
        if let Err(e) = self.store.lock().await.append_run(&event) {
            tracing::warn!("⚠️ Failed to write run log entry: {e}");
        }
    }
}

/// Run log entry carrying an agent's schedule snapshot.
fn agent_event(status: RunStatus, agent: &Agent, window: &DispatchWindow) -> RunEvent {
    RunEvent {
        org_id: Some(agent.org_id.clone()),
        agent_id: Some(agent.id.clone()),
        agent_name: Some(agent.name.clone()),
        frequency: agent.frequency.clone(),
        day_time: agent.day_time.clone(),
        schedule_time: agent.schedule_time.clone(),
        window: Some(window.to_string()),
        ..RunEvent::new(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pulsedesk_store::RunFilter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn store() -> Arc<Mutex<SchedulerStore>> {
        Arc::new(Mutex::new(SchedulerStore::open_in_memory().unwrap()))
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    async fn count(store: &Arc<Mutex<SchedulerStore>>, status: RunStatus) -> usize {
        store
            .lock()
            .await
            .recent_runs(
                &RunFilter {
                    status: Some(status),
                    ..RunFilter::default()
                },
                100,
            )
            .unwrap()
            .len()
    }

    /// Minimal HTTP responder: accepts connections and answers 200 `{}`.
    async fn spawn_ok_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = sock.read(&mut buf).await;
                    let _ = sock
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
                        )
                        .await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_tick_on_empty_store() {
        let store = store();
        let trigger = TriggerClient::new("http://127.0.0.1:9", 1);
        let mut executor = DispatchExecutor::new(Arc::clone(&store), trigger, 3);

        let summary = executor.run_tick_at(at(2026, 3, 5, 6)).await;
        assert_eq!(summary, TickSummary::default());

        // Start and completion entries still bracket the (empty) run
        assert_eq!(count(&store, RunStatus::CronStarted).await, 1);
        assert_eq!(count(&store, RunStatus::CronCompleted).await, 1);
    }

    #[tokio::test]
    async fn test_failed_trigger_does_not_abort_the_batch() {
        let store = store();
        let (org_id, bad_id) = {
            let db = store.lock().await;
            let org = db.create_organization("Acme").unwrap();
            // Two due agents, one out-of-window, one with a broken dayTime
            db.upsert_agent(&org.id, "due-a", Some("Daily"), None, Some("05:00"), true)
                .unwrap();
            db.upsert_agent(&org.id, "due-b", Some("Daily"), None, Some("04:00"), true)
                .unwrap();
            db.upsert_agent(&org.id, "later", Some("Daily"), None, Some("10:00"), true)
                .unwrap();
            let bad = db
                .upsert_agent(&org.id, "broken", Some("Weekly"), Some("W-"), Some("05:00"), true)
                .unwrap();
            (org.id, bad.id)
        };

        // Nothing listens on port 9 — every fired call fails fast
        let trigger = TriggerClient::new("http://127.0.0.1:9", 1);
        let mut executor = DispatchExecutor::new(Arc::clone(&store), trigger, 3);

        // Window 03:00-06:00
        let summary = executor.run_tick_at(at(2026, 3, 5, 6)).await;
        executor.drain().await;

        assert_eq!(summary.checked, 4);
        assert_eq!(summary.triggered, 2);
        assert_eq!(summary.skipped, 2);

        // Every agent got a selected entry and exactly one terminal entry
        assert_eq!(count(&store, RunStatus::Selected).await, 4);
        assert_eq!(count(&store, RunStatus::Triggered).await, 2);
        assert_eq!(count(&store, RunStatus::Failure).await, 2);
        assert_eq!(count(&store, RunStatus::Skipped).await, 2);
        assert_eq!(count(&store, RunStatus::Success).await, 0);

        // The broken agent's skip cites the reason
        let db = store.lock().await;
        let skipped = db
            .recent_runs(
                &RunFilter {
                    agent_id: Some(bad_id),
                    status: Some(RunStatus::Skipped),
                    ..RunFilter::default()
                },
                10,
            )
            .unwrap();
        assert!(skipped[0].skip_reason.as_deref().unwrap().contains("invalid dayTime"));

        // Failed calls leave last_triggered_at untouched → natural retry
        for agent in db.list_agents(&org_id).unwrap() {
            assert!(agent.last_triggered_at.is_none(), "{}", agent.name);
        }
    }

    #[tokio::test]
    async fn test_successful_trigger_updates_last_triggered() {
        let store = store();
        let agent_id = {
            let db = store.lock().await;
            let org = db.create_organization("Acme").unwrap();
            let agent = db
                .upsert_agent(&org.id, "report", Some("Daily"), None, Some("05:00"), true)
                .unwrap();
            agent.id
        };

        let base_url = spawn_ok_server().await;
        let trigger = TriggerClient::new(&base_url, 5);
        let mut executor = DispatchExecutor::new(Arc::clone(&store), trigger, 3);

        let summary = executor.run_tick_at(at(2026, 3, 5, 6)).await;
        executor.drain().await;

        assert_eq!(summary.triggered, 1);
        assert_eq!(count(&store, RunStatus::Success).await, 1);
        assert_eq!(count(&store, RunStatus::Failure).await, 0);

        let db = store.lock().await;
        let agent = db.get_agent(&agent_id).unwrap();
        assert!(agent.last_triggered_at.is_some());

        // The triggered entry records the exact URL and session id
        let triggered = db
            .recent_runs(
                &RunFilter {
                    status: Some(RunStatus::Triggered),
                    ..RunFilter::default()
                },
                10,
            )
            .unwrap();
        let url = triggered[0].api_url.as_deref().unwrap();
        assert!(url.contains("agent_name=report"));
        assert!(triggered[0].session_id.is_some());
    }

    #[tokio::test]
    async fn test_already_triggered_today_skips_next_tick() {
        use chrono::TimeZone;

        let store = store();
        let agent_id = {
            let db = store.lock().await;
            let org = db.create_organization("Acme").unwrap();
            let agent = db
                .upsert_agent(&org.id, "report", Some("Daily"), None, Some("05:00"), true)
                .unwrap();
            agent.id
        };

        // An earlier window this local day already triggered the agent
        let earlier = Local
            .with_ymd_and_hms(2026, 3, 5, 5, 30, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        store
            .lock()
            .await
            .set_last_triggered(&agent_id, earlier)
            .unwrap();

        // A wide window keeps 05:00 eligible — only the guard can skip it
        let trigger = TriggerClient::new("http://127.0.0.1:9", 1);
        let mut executor = DispatchExecutor::new(Arc::clone(&store), trigger, 24);
        let summary = executor.run_tick_at(at(2026, 3, 5, 9)).await;
        executor.drain().await;

        assert_eq!(summary.triggered, 0);
        assert_eq!(summary.skipped, 1);

        let db = store.lock().await;
        let skipped = db
            .recent_runs(
                &RunFilter {
                    status: Some(RunStatus::Skipped),
                    ..RunFilter::default()
                },
                10,
            )
            .unwrap();
        assert!(skipped[0].skip_reason.as_deref().unwrap().contains("already triggered"));
    }
}
