//! External trigger call — fires the AI agent-execution service.
//!
//! Success is a 2xx response whose JSON body carries no `error` member.
//! Anything else (transport error, non-2xx, application-level error payload)
//! is a failure the executor records; no retry happens here — the next
//! tick's idempotence check is the retry mechanism.

use std::time::Duration;

/// HTTP client for the agent-execution service.
#[derive(Debug, Clone)]
pub struct TriggerClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl TriggerClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Build the full run URL for an agent. Also used verbatim in the
    /// `triggered` log entry so the audit trail shows exactly what was
    /// called.
    pub fn run_url(&self, agent_name: &str, org_id: &str, session_id: &str) -> String {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/agent/run", self.base_url),
            &[
                ("agent_name", agent_name),
                ("organization_id", org_id),
                ("query", "run"),
                ("session_id", session_id),
            ],
        );
        match url {
            Ok(u) => u.to_string(),
            // Unparseable base URL — keep a best-effort string for the log;
            // the actual request will fail and be recorded.
            Err(_) => format!(
                "{}/agent/run?agent_name={agent_name}&organization_id={org_id}&query=run&session_id={session_id}",
                self.base_url
            ),
        }
    }

    /// Fire a single trigger call.
    pub async fn fire(&self, url: &str) -> Result<(), String> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Trigger request failed: {e}"))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(format!("Agent server returned {status}: {body}"));
        }

        // 2xx can still carry an application-level error payload
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body)
            && let Some(err) = json.get("error")
            && !err.is_null()
        {
            return Err(format!("Agent server reported error: {err}"));
        }

        Ok(())
    }
}
