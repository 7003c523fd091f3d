use crate::constants::limits::LOG_ERROR_MAX_BYTES;
use crate::errors::AgentError;
use crate::services::command_executor::{build_handler, CommandExecutor, CommandHandler};
use crate::services::error_codes::ErrorCodeSet;
use crate::services::logger::Logger;
use crate::services::plan::{ExecutionPlan, PlanLoader};
use crate::services::reporter::{TaskReporter, TaskStatus};
use crate::services::validation::Validation;
use crate::utils::feature_flags::is_log_stderr_enabled;
use crate::utils::redact::redact_object;
use crate::utils::paths::{resolve_error_code_path, resolve_task_log_path};
use std::process::Stdio;
use std::sync::Arc;

/// Log metadata for an error: hint and details included, sensitive keys masked.
pub fn error_meta(err: &AgentError) -> serde_json::Value {
    redact_object(&err.to_log_value(), LOG_ERROR_MAX_BYTES)
}

/// How a task run ended, when it did not end in an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { submitted: usize },
    Halted { command_id: String, detail: String, submitted: usize },
}

impl RunOutcome {
    pub fn submitted(&self) -> usize {
        match self {
            RunOutcome::Completed { submitted } | RunOutcome::Halted { submitted, .. } => *submitted,
        }
    }
}

pub struct App {
    pub logger: Logger,
    pub plan: ExecutionPlan,
    pub reporter: TaskReporter,
    pub error_codes: Arc<ErrorCodeSet>,
}

impl App {
    /// Decodes the plan and wires the reporter, log file and error codes.
    /// Nothing is contacted yet.
    pub fn initialize(encoded: &str) -> Result<Self, AgentError> {
        let logger = Logger::new("behemoth");
        let plan = PlanLoader::new(logger.clone(), Validation::new()).load(encoded)?;

        let log_path = resolve_task_log_path(&plan.task_id);
        if let Err(err) = logger.attach_file(&log_path, is_log_stderr_enabled()) {
            logger.warn(
                "Task log file unavailable, logging to stderr",
                Some(&serde_json::json!({"path": log_path, "error": err.to_string()})),
            );
        }

        let error_codes = Arc::new(ErrorCodeSet::load_or_empty(
            &resolve_error_code_path(),
            &logger,
        ));
        let reporter = TaskReporter::from_plan(logger.clone(), &plan)?;
        Ok(Self::from_parts(logger, plan, reporter, error_codes))
    }

    pub fn from_parts(
        logger: Logger,
        plan: ExecutionPlan,
        reporter: TaskReporter,
        error_codes: Arc<ErrorCodeSet>,
    ) -> Self {
        Self {
            logger,
            plan,
            reporter,
            error_codes,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, AgentError> {
        let handler = build_handler(&self.plan, self.error_codes.clone(), &self.logger);
        self.run_with_handler(handler).await
    }

    /// Connect, then submit every command in order. The orchestrator's answer
    /// to each callback decides whether the next command is sent.
    pub async fn run_with_handler(
        &self,
        handler: Box<dyn CommandHandler>,
    ) -> Result<RunOutcome, AgentError> {
        let task_id = self.plan.task_id.as_str();
        let mut executor = CommandExecutor::new(self.logger.clone(), handler, self.secrets());
        self.logger.info(
            "Start executing the task",
            Some(&serde_json::json!({"task_id": task_id, "backend": executor.backend().as_str()})),
        );

        if let Err(err) = executor.connect().await {
            if let Err(report_err) = self
                .reporter
                .report_status(task_id, TaskStatus::Failed, Some(&err.message))
                .await
            {
                self.logger.error(
                    "Failure report rejected",
                    Some(&error_meta(&report_err)),
                );
            }
            return Err(err);
        }

        if let Err(err) = self
            .reporter
            .report_status(task_id, TaskStatus::Executing, None)
            .await
        {
            self.logger.warn(
                "Start report rejected",
                Some(&serde_json::json!({"error": err.message})),
            );
        }
        let health_reporter = self.reporter.clone();
        let health_task = task_id.to_string();
        tokio::spawn(async move {
            health_reporter.health_feedback(&health_task).await;
        });

        let mut submitted = 0usize;
        for command in &self.plan.commands {
            let outcome = executor.execute(command).await;
            submitted += 1;
            let decision = match self.reporter.report_command(task_id, command, &outcome).await {
                Ok(decision) => decision,
                Err(err) => {
                    self.logger.error(
                        "Command callback failed",
                        Some(&serde_json::json!({
                            "command_id": command.id,
                            "error": error_meta(&err),
                        })),
                    );
                    executor.close().await;
                    return Err(err);
                }
            };
            if !decision.status {
                self.logger.warn(
                    "Not allowed to continue executing commands",
                    Some(&serde_json::json!({
                        "command_id": command.id,
                        "detail": decision.detail,
                    })),
                );
                executor.close().await;
                return Ok(RunOutcome::Halted {
                    command_id: command.id.clone(),
                    detail: decision.detail,
                    submitted,
                });
            }
        }

        executor.close().await;
        if let Err(err) = self
            .reporter
            .report_status(task_id, TaskStatus::Success, None)
            .await
        {
            self.logger.warn(
                "Success report rejected",
                Some(&serde_json::json!({"error": err.message})),
            );
        }
        self.logger.info(
            "Task finished successfully",
            Some(&serde_json::json!({"submitted": submitted})),
        );
        Ok(RunOutcome::Completed { submitted })
    }

    /// Runs this same binary again with the plan's `envs` overlaid on the
    /// current environment and returns the child's exit code.
    pub async fn relaunch_with_env(&self, encoded: &str) -> Result<i32, AgentError> {
        let exe = std::env::current_exe()
            .map_err(|err| AgentError::internal(format!("Cannot locate own executable: {}", err)))?;
        let overlay = self.plan.env_overlay();
        for (key, _) in &overlay {
            self.logger.info(
                "Set environment variable",
                Some(&serde_json::json!({"key": key})),
            );
        }
        let status = tokio::process::Command::new(&exe)
            .arg("--command")
            .arg(encoded)
            .envs(overlay)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|err| AgentError::internal(format!("Failed to relaunch: {}", err)))?;
        Ok(status.code().unwrap_or(1))
    }

    fn secrets(&self) -> Vec<String> {
        vec![self.plan.auth.password.clone(), self.plan.token.clone()]
    }
}
