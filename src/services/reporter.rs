use crate::constants::network::USER_AGENT;
use crate::constants::retry::HEALTH_ATTEMPTS;
use crate::errors::AgentError;
use crate::services::command_executor::CommandOutcome;
use crate::services::logger::Logger;
use crate::services::plan::{Command, ExecutionPlan};
use crate::utils::feature_flags::resolve_health_retry_delay_ms;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Executing,
    Failed,
    Success,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Executing => crate::constants::task_status::EXECUTING,
            TaskStatus::Failed => crate::constants::task_status::FAILED,
            TaskStatus::Success => crate::constants::task_status::SUCCESS,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The orchestrator's answer to a command callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContinueDecision {
    pub status: bool,
    pub detail: String,
}

/// HTTP client for the orchestrator's execution callbacks.
#[derive(Clone)]
pub struct TaskReporter {
    logger: Logger,
    client: Client,
    base_url: String,
    headers: HeaderMap,
    health_delay: Duration,
}

impl TaskReporter {
    pub fn new(logger: Logger, base_url: &str, token: &str, org_id: &str) -> Result<Self, AgentError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| AgentError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            logger: logger.child("reporter"),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: build_headers(token, org_id)?,
            health_delay: Duration::from_millis(resolve_health_retry_delay_ms()),
        })
    }

    pub fn from_plan(logger: Logger, plan: &ExecutionPlan) -> Result<Self, AgentError> {
        Self::new(logger, &plan.host, &plan.token, &plan.org_id)
    }

    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    fn execution_url(&self, task_id: &str) -> String {
        format!("{}/api/v1/behemoth/executions/{}/", self.base_url, task_id)
    }

    async fn send(&self, method: Method, url: &str, body: &Value) -> Result<String, AgentError> {
        let response = self
            .client
            .request(method.clone(), url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| AgentError::reporting(format!("Request to {} failed: {}", url, err)))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        self.logger.debug(
            "Callback answered",
            Some(&serde_json::json!({
                "method": method.as_str(),
                "url": url,
                "status": status.as_u16(),
            })),
        );
        if status != StatusCode::OK {
            return Err(AgentError::reporting(format!(
                "Orchestrator answered {}: {}",
                status.as_u16(),
                text
            ))
            .with_details(serde_json::json!({"url": url, "status": status.as_u16()})));
        }
        Ok(text)
    }

    pub async fn report_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        reason: Option<&str>,
    ) -> Result<(), AgentError> {
        let reason = reason.filter(|r| !r.is_empty()).unwrap_or("-");
        let body = serde_json::json!({"status": status.as_str(), "reason": reason});
        self.send(Method::PATCH, &self.execution_url(task_id), &body)
            .await?;
        self.logger.info(
            "Task status reported",
            Some(&serde_json::json!({"status": status.as_str()})),
        );
        Ok(())
    }

    pub async fn report_command(
        &self,
        task_id: &str,
        command: &Command,
        outcome: &CommandOutcome,
    ) -> Result<ContinueDecision, AgentError> {
        let status = if outcome.success {
            TaskStatus::Success
        } else {
            TaskStatus::Failed
        };
        let body = serde_json::json!({
            "command_id": command.id,
            "timestamp": chrono::Utc::now().timestamp(),
            "output": outcome.output,
            "status": status.as_str(),
        });
        let url = format!("{}command/", self.execution_url(task_id));
        let text = self.send(Method::PATCH, &url, &body).await?;
        serde_json::from_str::<ContinueDecision>(&text).map_err(|err| {
            AgentError::reporting(format!("Unparseable command callback response: {}", err))
                .with_details(serde_json::json!({"body": text}))
        })
    }

    /// Best effort; failures are only logged.
    pub async fn health_feedback(&self, task_id: &str) {
        let url = format!("{}?type=health", self.execution_url(task_id));
        let body = serde_json::json!({"action": "health"});
        for attempt in 1..=HEALTH_ATTEMPTS {
            match self.send(Method::POST, &url, &body).await {
                Ok(_) => return,
                Err(err) => {
                    self.logger.debug(
                        "Health ping failed",
                        Some(&serde_json::json!({"attempt": attempt, "error": err.message})),
                    );
                }
            }
            if attempt < HEALTH_ATTEMPTS {
                tokio::time::sleep(self.health_delay).await;
            }
        }
        self.logger
            .warn("Health ping gave up", Some(&serde_json::json!({"attempts": HEALTH_ATTEMPTS})));
    }
}

fn build_headers(token: &str, org_id: &str) -> Result<HeaderMap, AgentError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| AgentError::config("token contains characters not allowed in a header"))?;
    headers.insert(AUTHORIZATION, bearer);
    let org = HeaderValue::from_str(org_id)
        .map_err(|_| AgentError::config("org_id contains characters not allowed in a header"))?;
    headers.insert("X-JMS-ORG", org);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_token_and_org() {
        let headers = build_headers("abc", "00000000-0000-0000-0000-000000000002").expect("headers");
        assert_eq!(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()), Some("Bearer abc"));
        assert_eq!(
            headers.get("X-JMS-ORG").and_then(|v| v.to_str().ok()),
            Some("00000000-0000-0000-0000-000000000002")
        );
        assert!(build_headers("bad\ntoken", "org").is_err());
    }

    #[test]
    fn decision_tolerates_missing_detail() {
        let decision: ContinueDecision = serde_json::from_str(r#"{"status": true}"#).expect("parse");
        assert!(decision.status);
        assert!(decision.detail.is_empty());
    }
}
