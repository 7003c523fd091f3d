use crate::errors::AgentError;
use crate::services::logger::Logger;
use std::path::Path;

/// Output prefixes that mark a CLI run as failed even when it exited zero.
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeSet {
    prefixes: Vec<String>,
}

impl ErrorCodeSet {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Strict load: a JSON array of strings.
    pub fn from_file(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read(path).map_err(|err| {
            AgentError::config(format!(
                "Failed to read error code file {}: {}",
                path.display(),
                err
            ))
        })?;
        let prefixes: Vec<String> = serde_json::from_slice(&raw).map_err(|err| {
            AgentError::config(format!(
                "Error code file {} must be a JSON array of strings: {}",
                path.display(),
                err
            ))
        })?;
        Ok(Self::new(prefixes))
    }

    /// Lenient load used at startup: a missing or malformed file yields an empty set.
    pub fn load_or_empty(path: &Path, logger: &Logger) -> Self {
        match Self::from_file(path) {
            Ok(set) => {
                logger.debug(
                    "Loaded error codes",
                    Some(&serde_json::json!({"path": path, "count": set.len()})),
                );
                set
            }
            Err(err) => {
                logger.warn(
                    "Error code file unavailable, output classification uses exit codes only",
                    Some(&serde_json::json!({"path": path, "error": err.message})),
                );
                Self::empty()
            }
        }
    }

    pub fn matches(&self, output: &str) -> bool {
        self.prefixes.iter().any(|code| output.starts_with(code.as_str()))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
