use crate::constants::limits::{MAX_PORT, MIN_PORT};
use crate::errors::AgentError;
use crate::utils::user_paths::expand_home_path;
use std::path::PathBuf;
use url::Url;

#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_identifier(&self, value: &str, label: &str) -> Result<String, AgentError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AgentError::config(format!(
                "{} must be a non-empty string",
                label
            )));
        }
        if trimmed.contains('\0') {
            return Err(AgentError::config(format!(
                "{} must not contain null bytes",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn ensure_port(&self, value: u16, label: &str) -> Result<u16, AgentError> {
        if value < MIN_PORT {
            return Err(AgentError::config(format!(
                "{} must be an integer between {} and {}",
                label, MIN_PORT, MAX_PORT
            )));
        }
        Ok(value)
    }

    pub fn ensure_existing_file(&self, value: &str, label: &str) -> Result<PathBuf, AgentError> {
        let raw = self.ensure_identifier(value, label)?;
        let path = expand_home_path(raw);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(AgentError::config(format!(
                "{} is not a regular file: {}",
                label,
                path.display()
            ))),
            Err(err) => Err(AgentError::config(format!(
                "{} does not exist: {} ({})",
                label,
                path.display(),
                err
            ))),
        }
    }

    /// Orchestrator base URL, without a trailing slash.
    pub fn ensure_base_url(&self, value: &str, label: &str) -> Result<String, AgentError> {
        let raw = self.ensure_identifier(value, label)?;
        let parsed = Url::parse(&raw)
            .map_err(|err| AgentError::config(format!("{} must be a valid URL: {}", label, err)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AgentError::config(format!(
                "{} must use http or https",
                label
            )));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
