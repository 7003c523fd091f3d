use crate::constants::buffers::{PTY_DEFAULT_COLS, PTY_DEFAULT_ROWS};
use crate::constants::prompt::MYSQL_PROMPT;
use crate::errors::AgentError;
use crate::services::logger::Logger;
use crate::services::security::CommandSetCipher;
use crate::services::validation::Validation;
use crate::utils::merge::{merge_deep, strip_nulls};
use crate::utils::redact::redact_object;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    Mysql,
    Oracle,
    Script,
    LocalScript,
}

impl BackendType {
    pub const ALL: [BackendType; 4] = [
        BackendType::Mysql,
        BackendType::Oracle,
        BackendType::Script,
        BackendType::LocalScript,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendType::Mysql => "mysql",
            BackendType::Oracle => "oracle",
            BackendType::Script => "script",
            BackendType::LocalScript => "local_script",
        }
    }

    pub fn is_native(self) -> bool {
        matches!(self, BackendType::Mysql | BackendType::Oracle)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = AgentError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim();
        BackendType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == normalized)
            .ok_or_else(|| {
                AgentError::config(format!("Unsupported command type: {}", normalized))
                    .with_details(serde_json::json!({
                        "allowed": BackendType::ALL.iter().map(|b| b.as_str()).collect::<Vec<_>>()
                    }))
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Auth {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub db_name: String,
    pub privileged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Command {
    pub id: String,
    pub input: String,
    pub index: i64,
    pub category: String,
}

/// Wire shape shared by the envelope and the command-set file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PlanDocument {
    task_id: String,
    host: String,
    token: String,
    org_id: String,
    script: String,
    script_args: Vec<String>,
    auth: Auth,
    cmd_type: String,
    cmd_file: String,
    cmd_set_filepath: String,
    command_set: Vec<Command>,
    encrypted_data: bool,
    envs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pty_cols: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pty_rows: Option<u16>,
}

/// Validated task description. Built once by [`PlanLoader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub task_id: String,
    pub host: String,
    pub token: String,
    pub org_id: String,
    pub backend: BackendType,
    pub script: String,
    pub script_args: Vec<String>,
    pub auth: Auth,
    pub cmd_file: PathBuf,
    pub cmd_set_filepath: PathBuf,
    pub commands: Vec<Command>,
    pub encrypted: bool,
    pub envs: String,
    pub prompt: String,
    pub pty_cols: u16,
    pub pty_rows: u16,
}

impl ExecutionPlan {
    /// `KEY=VALUE` pairs from the `;`-delimited `envs` field.
    pub fn env_overlay(&self) -> Vec<(String, String)> {
        parse_env_overlay(&self.envs)
    }

    /// Serializes the plan back into the command-set document shape.
    pub fn to_document(&self) -> Result<Value, AgentError> {
        let doc = PlanDocument {
            task_id: self.task_id.clone(),
            host: self.host.clone(),
            token: self.token.clone(),
            org_id: self.org_id.clone(),
            script: self.script.clone(),
            script_args: self.script_args.clone(),
            auth: self.auth.clone(),
            cmd_type: self.backend.as_str().to_string(),
            cmd_file: self.cmd_file.to_string_lossy().to_string(),
            cmd_set_filepath: self.cmd_set_filepath.to_string_lossy().to_string(),
            command_set: self.commands.clone(),
            encrypted_data: self.encrypted,
            envs: self.envs.clone(),
            prompt: Some(self.prompt.clone()),
            pty_cols: Some(self.pty_cols),
            pty_rows: Some(self.pty_rows),
        };
        serde_json::to_value(doc)
            .map_err(|err| AgentError::internal(format!("Failed to serialize plan: {}", err)))
    }

    pub fn summary(&self) -> Value {
        serde_json::json!({
            "task_id": self.task_id,
            "backend": self.backend.as_str(),
            "script": self.script,
            "commands": self.commands.len(),
            "encrypted": self.encrypted,
            "target": format!("{}:{}", self.auth.address, self.auth.port),
        })
    }
}

pub fn parse_env_overlay(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (key, value) = part.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

pub fn decode_envelope(encoded: &str) -> Result<Value, AgentError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|err| AgentError::config(format!("Envelope is not valid base64: {}", err)))?;
    let value: Value = serde_json::from_slice(&raw)
        .map_err(|err| AgentError::config(format!("Envelope is not valid JSON: {}", err)))?;
    if !value.is_object() {
        return Err(AgentError::config("Envelope must be a JSON object"));
    }
    Ok(value)
}

#[derive(Clone)]
pub struct PlanLoader {
    logger: Logger,
    validation: Validation,
}

impl PlanLoader {
    pub fn new(logger: Logger, validation: Validation) -> Self {
        Self {
            logger: logger.child("plan"),
            validation,
        }
    }

    pub fn load(&self, encoded: &str) -> Result<ExecutionPlan, AgentError> {
        let envelope = decode_envelope(encoded)?;
        self.logger.debug(
            "Decoded envelope",
            Some(&redact_object(&envelope, 256)),
        );

        let cmd_set_raw = envelope
            .get("cmd_set_filepath")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let cmd_file_raw = envelope.get("cmd_file").and_then(|v| v.as_str()).unwrap_or("");
        let cmd_set_path = self
            .validation
            .ensure_existing_file(cmd_set_raw, "Command set file (cmd_set_filepath)")?;
        self.validation
            .ensure_existing_file(cmd_file_raw, "Command file (cmd_file)")?;

        let mut payload = std::fs::read(&cmd_set_path).map_err(|err| {
            AgentError::config(format!(
                "Failed to read command set file {}: {}",
                cmd_set_path.display(),
                err
            ))
        })?;

        let encrypted = envelope
            .get("encrypted_data")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if encrypted {
            let token = envelope.get("token").and_then(|v| v.as_str()).unwrap_or("");
            payload = CommandSetCipher::from_token(token)?.decrypt(&payload)?;
        }

        let overlay: Value = serde_json::from_slice(&payload).map_err(|err| {
            let hint = if encrypted {
                "The command set was decrypted but is not JSON; the token may not match the key it was encrypted with."
            } else {
                "The command set file must contain a JSON object."
            };
            AgentError::config(format!("Failed to parse command set: {}", err)).with_hint(hint)
        })?;
        if !overlay.is_object() {
            return Err(AgentError::config("Command set must be a JSON object"));
        }

        let merged = strip_nulls(merge_deep(&envelope, &overlay));
        let doc: PlanDocument = serde_json::from_value(merged)
            .map_err(|err| AgentError::config(format!("Invalid execution plan: {}", err)))?;
        let plan = self.build(doc)?;
        self.logger.info("Execution plan loaded", Some(&plan.summary()));
        Ok(plan)
    }

    fn build(&self, doc: PlanDocument) -> Result<ExecutionPlan, AgentError> {
        let backend: BackendType = doc.cmd_type.parse()?;
        let task_id = self.validation.ensure_identifier(&doc.task_id, "task_id")?;
        let host = self.validation.ensure_base_url(&doc.host, "host")?;

        if backend.is_native() {
            self.validation
                .ensure_identifier(&doc.auth.address, "auth.address")?;
            self.validation.ensure_port(doc.auth.port, "auth.port")?;
        } else {
            self.validation.ensure_identifier(&doc.script, "script")?;
        }

        let prompt = doc
            .prompt
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| MYSQL_PROMPT.to_string());

        Ok(ExecutionPlan {
            task_id,
            host,
            token: doc.token,
            org_id: doc.org_id,
            backend,
            script: doc.script.trim().to_string(),
            script_args: doc.script_args,
            auth: doc.auth,
            cmd_file: crate::utils::user_paths::expand_home_path(&doc.cmd_file),
            cmd_set_filepath: crate::utils::user_paths::expand_home_path(&doc.cmd_set_filepath),
            commands: doc.command_set,
            encrypted: doc.encrypted_data,
            envs: doc.envs,
            prompt,
            pty_cols: doc.pty_cols.filter(|c| *c > 0).unwrap_or(PTY_DEFAULT_COLS),
            pty_rows: doc.pty_rows.filter(|r| *r > 0).unwrap_or(PTY_DEFAULT_ROWS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_type_parses_closed_set() {
        assert_eq!("mysql".parse::<BackendType>().expect("mysql"), BackendType::Mysql);
        assert_eq!(
            "local_script".parse::<BackendType>().expect("local"),
            BackendType::LocalScript
        );
        let err = "postgres".parse::<BackendType>().err().expect("rejected");
        assert!(err.message.contains("postgres"));
    }

    #[test]
    fn env_overlay_skips_blank_and_malformed_entries() {
        let pairs = parse_env_overlay("ORACLE_HOME=/opt/oracle;;NLS_LANG=AMERICAN_AMERICA.UTF8;broken; =x");
        assert_eq!(
            pairs,
            vec![
                ("ORACLE_HOME".to_string(), "/opt/oracle".to_string()),
                ("NLS_LANG".to_string(), "AMERICAN_AMERICA.UTF8".to_string()),
            ]
        );
    }

    #[test]
    fn envelope_round_trips_through_base64() {
        let value = serde_json::json!({"task_id": "t1", "cmd_type": "mysql"});
        let encoded = base64::engine::general_purpose::STANDARD.encode(value.to_string());
        let decoded = decode_envelope(&encoded).expect("decode");
        assert_eq!(decoded, value);
    }

    #[test]
    fn envelope_must_be_an_object() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("[1,2]");
        assert!(decode_envelope(&encoded).is_err());
        assert!(decode_envelope("!!!not-base64").is_err());
    }
}
