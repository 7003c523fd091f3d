use async_trait::async_trait;
use std::sync::Arc;

use crate::constants::limits::LOG_OUTPUT_PREVIEW_BYTES;
use crate::errors::AgentError;
use crate::managers::interactive::{InteractiveHandler, InteractiveOptions};
use crate::managers::local::{LocalCliHandler, LocalCliOptions};
use crate::managers::mysql::MysqlHandler;
use crate::managers::oracle::OracleHandler;
use crate::services::error_codes::ErrorCodeSet;
use crate::services::logger::Logger;
use crate::services::plan::{BackendType, Command, ExecutionPlan};
use crate::utils::redact::redact_text;
use crate::utils::text::output_preview;

/// Result of one submitted command, as reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub output: String,
    pub success: bool,
}

impl CommandOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

impl From<AgentError> for CommandOutcome {
    fn from(err: AgentError) -> Self {
        CommandOutcome::failure(err.message)
    }
}

/// Contract shared by every backend.
///
/// `connect` either leaves the handler ready or fails without partial state.
/// `submit` never aborts the run by itself: backend errors come back as a
/// failed outcome and the orchestrator decides whether to continue.
#[async_trait]
pub trait CommandHandler: Send {
    fn backend(&self) -> BackendType;

    async fn connect(&mut self) -> Result<(), AgentError>;

    async fn submit(&mut self, command: &Command) -> CommandOutcome;

    async fn close(&mut self);
}

pub fn build_handler(
    plan: &ExecutionPlan,
    error_codes: Arc<ErrorCodeSet>,
    logger: &Logger,
) -> Box<dyn CommandHandler> {
    match plan.backend {
        BackendType::Mysql => Box::new(MysqlHandler::new(logger.clone(), plan.auth.clone())),
        BackendType::Oracle => Box::new(OracleHandler::new(logger.clone(), plan.auth.clone())),
        BackendType::Script => Box::new(InteractiveHandler::new(
            logger.clone(),
            InteractiveOptions::from_plan(plan),
        )),
        BackendType::LocalScript => Box::new(LocalCliHandler::new(
            logger.clone(),
            LocalCliOptions::from_plan(plan),
            error_codes,
        )),
    }
}

/// Wraps a handler with per-command logging.
pub struct CommandExecutor {
    logger: Logger,
    handler: Box<dyn CommandHandler>,
    secrets: Vec<String>,
}

impl CommandExecutor {
    pub fn new(logger: Logger, handler: Box<dyn CommandHandler>, secrets: Vec<String>) -> Self {
        Self {
            logger: logger.child("executor"),
            handler,
            secrets,
        }
    }

    pub fn backend(&self) -> BackendType {
        self.handler.backend()
    }

    pub async fn connect(&mut self) -> Result<(), AgentError> {
        let started_at = chrono::Utc::now().timestamp_millis();
        let result = self.handler.connect().await;
        let duration_ms = chrono::Utc::now().timestamp_millis() - started_at;
        match &result {
            Ok(()) => self.logger.info(
                "Backend connected",
                Some(&serde_json::json!({
                    "backend": self.backend().as_str(),
                    "duration_ms": duration_ms,
                })),
            ),
            Err(err) => self.logger.error(
                "Backend connect failed",
                Some(&serde_json::json!({
                    "backend": self.backend().as_str(),
                    "error": self.redact(&err.message),
                    "hint": err.hint,
                    "details": err.details.as_ref().map(|d| self.redact(&d.to_string())),
                })),
            ),
        }
        result
    }

    pub async fn execute(&mut self, command: &Command) -> CommandOutcome {
        let started_at = chrono::Utc::now().timestamp_millis();
        self.logger.info(
            "Executing command",
            Some(&serde_json::json!({
                "command_id": command.id,
                "index": command.index,
                "input": self.redact(&command.input),
            })),
        );
        let outcome = self.handler.submit(command).await;
        let duration_ms = chrono::Utc::now().timestamp_millis() - started_at;
        let meta = serde_json::json!({
            "command_id": command.id,
            "success": outcome.success,
            "duration_ms": duration_ms,
            "output": self.redact(&output_preview(&outcome.output, LOG_OUTPUT_PREVIEW_BYTES)),
        });
        if outcome.success {
            self.logger.info("Command finished", Some(&meta));
        } else {
            self.logger.warn("Command failed", Some(&meta));
        }
        outcome
    }

    pub async fn close(&mut self) {
        self.handler.close().await;
        self.logger.debug("Backend closed", None);
    }

    fn redact(&self, text: &str) -> String {
        let secrets: Vec<&str> = self.secrets.iter().map(String::as_str).collect();
        redact_text(text, usize::MAX, &secrets)
    }
}
