use async_trait::async_trait;

use crate::errors::AgentError;
use crate::services::command_executor::{CommandHandler, CommandOutcome};
use crate::services::logger::Logger;
use crate::services::plan::{BackendType, Command, ExecutionPlan};
use crate::services::terminal::TerminalSession;
use crate::utils::text::find_bytes;

#[derive(Debug, Clone)]
pub struct InteractiveOptions {
    pub program: String,
    pub args: Vec<String>,
    pub prompt: String,
    pub cols: u16,
    pub rows: u16,
}

impl InteractiveOptions {
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        Self {
            program: plan.script.clone(),
            args: plan.script_args.clone(),
            prompt: plan.prompt.clone(),
            cols: plan.pty_cols,
            rows: plan.pty_rows,
        }
    }
}

/// Drives a prompt-based CLI (a database shell) through a pseudo-terminal.
///
/// Output is accumulated across reads and the prompt marker is searched in
/// the whole accumulation, so a marker split between two pty reads is still
/// recognized. Everything before the marker is the command's output; the
/// marker itself is never returned.
pub struct InteractiveHandler {
    logger: Logger,
    options: InteractiveOptions,
    session: Option<TerminalSession>,
}

impl InteractiveHandler {
    pub fn new(logger: Logger, options: InteractiveOptions) -> Self {
        Self {
            logger: logger.child("interactive"),
            options,
            session: None,
        }
    }

    /// Reads until the prompt marker shows up. On end of stream the partial
    /// output is returned as the error payload.
    async fn read_until_prompt(&mut self) -> Result<Vec<u8>, Vec<u8>> {
        let marker = self.options.prompt.as_bytes().to_vec();
        let Some(session) = self.session.as_mut() else {
            return Err(Vec::new());
        };
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let Some(chunk) = session.read().await else {
                return Err(pending);
            };
            // Only the tail that could still complete a marker needs rescanning.
            let scan_from = pending.len().saturating_sub(marker.len().saturating_sub(1));
            pending.extend_from_slice(&chunk);
            if let Some(pos) = find_bytes(&pending[scan_from..], &marker) {
                let end = scan_from + pos;
                let trailing = pending.len() - end - marker.len();
                if trailing > 0 {
                    self.logger.debug(
                        "Discarding output after prompt",
                        Some(&serde_json::json!({"bytes": trailing})),
                    );
                }
                pending.truncate(end);
                return Ok(pending);
            }
        }
    }
}

#[async_trait]
impl CommandHandler for InteractiveHandler {
    fn backend(&self) -> BackendType {
        BackendType::Script
    }

    async fn connect(&mut self) -> Result<(), AgentError> {
        let session = TerminalSession::open(
            &self.options.program,
            &self.options.args,
            self.options.cols,
            self.options.rows,
        )?;
        self.logger.debug(
            "Terminal session opened",
            Some(&serde_json::json!({
                "program": session.program(),
                "cols": self.options.cols,
                "rows": self.options.rows,
            })),
        );
        self.session = Some(session);

        match self.read_until_prompt().await {
            Ok(banner) => {
                self.logger.debug(
                    "Interpreter ready",
                    Some(&serde_json::json!({"banner_bytes": banner.len()})),
                );
                Ok(())
            }
            Err(partial) => {
                self.close().await;
                Err(AgentError::connection(format!(
                    "{} exited before printing its prompt",
                    self.options.program
                ))
                .with_details(serde_json::json!({
                    "prompt": self.options.prompt,
                    "output": String::from_utf8_lossy(&partial),
                })))
            }
        }
    }

    async fn submit(&mut self, command: &Command) -> CommandOutcome {
        let Some(session) = self.session.as_ref() else {
            return CommandOutcome::failure("Interactive session is not connected");
        };
        let line = format!("{}\n", command.input);
        if let Err(err) = session.write(line.as_bytes()).await {
            return AgentError::from(err).into();
        }
        match self.read_until_prompt().await {
            Ok(output) => CommandOutcome::success(String::from_utf8_lossy(&output)),
            Err(partial) => {
                let mut output = String::from_utf8_lossy(&partial).to_string();
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&format!("{} exited before the command completed", self.options.program));
                CommandOutcome::failure(output)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
    }
}
