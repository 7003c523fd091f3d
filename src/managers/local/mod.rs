use crate::errors::AgentError;
use crate::services::command_executor::{CommandHandler, CommandOutcome};
use crate::services::error_codes::ErrorCodeSet;
use crate::services::logger::Logger;
use crate::services::plan::{Auth, BackendType, Command, ExecutionPlan};
use crate::utils::redact::redact_args;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub mod bundle;
pub mod exec;

use exec::{build_invocation, classify, clean_output, run_invocation, CliFlavor};

#[derive(Debug, Clone)]
pub struct LocalCliOptions {
    pub program: String,
    pub args: Vec<String>,
    pub auth: Auth,
    pub cmd_file: PathBuf,
}

impl LocalCliOptions {
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        Self {
            program: plan.script.clone(),
            args: plan.script_args.clone(),
            auth: plan.auth.clone(),
            cmd_file: plan.cmd_file.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct BatchRun {
    command_id: String,
    success: bool,
}

/// Runs the whole command file through a local interpreter in one process.
///
/// The file is executed once, on the first submitted command. Every later
/// command reports the cached result of that run.
pub struct LocalCliHandler {
    logger: Logger,
    options: LocalCliOptions,
    error_codes: Arc<ErrorCodeSet>,
    resolved_program: Option<PathBuf>,
    batch: Option<BatchRun>,
}

impl LocalCliHandler {
    pub fn new(logger: Logger, options: LocalCliOptions, error_codes: Arc<ErrorCodeSet>) -> Self {
        Self {
            logger: logger.child("local"),
            options,
            error_codes,
            resolved_program: None,
            batch: None,
        }
    }

    async fn run_batch(&self) -> Result<CommandOutcome, AgentError> {
        let program = self
            .resolved_program
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .ok_or_else(|| AgentError::command("Local interpreter is not connected"))?;
        let flavor = CliFlavor::detect(&self.options.program);
        let entry = bundle::resolve_entry(&self.options.cmd_file).await?;
        let invocation = build_invocation(&program, &self.options.args, &self.options.auth, &entry)?;

        self.logger.info(
            "Running command file",
            Some(&serde_json::json!({
                "program": invocation.program,
                "args": redact_args(&invocation.args),
                "cwd": invocation.cwd,
                "entry": entry.entry,
            })),
        );

        let started = chrono::Utc::now().timestamp_millis();
        let result = run_invocation(&invocation).await?;
        let cleaned = clean_output(flavor, &result.output);
        let success = classify(result.exit_code, &result.output, &cleaned, &self.error_codes);
        self.logger.info(
            "Command file finished",
            Some(&serde_json::json!({
                "exit_code": result.exit_code,
                "success": success,
                "duration_ms": chrono::Utc::now().timestamp_millis() - started,
            })),
        );
        Ok(CommandOutcome {
            output: cleaned,
            success,
        })
    }
}

#[async_trait]
impl CommandHandler for LocalCliHandler {
    fn backend(&self) -> BackendType {
        BackendType::LocalScript
    }

    async fn connect(&mut self) -> Result<(), AgentError> {
        let program = self.options.program.trim();
        let resolved = which::which(program).map_err(|err| {
            AgentError::connection(format!("{} command does not exist", program))
                .with_hint("Install the interpreter on the worker or configure its full path.")
                .with_details(serde_json::json!({"reason": err.to_string()}))
        })?;
        self.logger.debug(
            "Interpreter resolved",
            Some(&serde_json::json!({
                "program": program,
                "path": resolved,
                "error_codes": self.error_codes.len(),
            })),
        );
        self.resolved_program = Some(resolved);
        Ok(())
    }

    async fn submit(&mut self, command: &Command) -> CommandOutcome {
        if let Some(batch) = self.batch.as_ref() {
            return CommandOutcome {
                output: format!("Included in the batch run of command {}", batch.command_id),
                success: batch.success,
            };
        }
        let outcome = match self.run_batch().await {
            Ok(outcome) => outcome,
            Err(err) => err.into(),
        };
        self.batch = Some(BatchRun {
            command_id: command.id.clone(),
            success: outcome.success,
        });
        outcome
    }

    async fn close(&mut self) {
        self.resolved_program = None;
    }
}
