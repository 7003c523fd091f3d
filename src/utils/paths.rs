use crate::constants::paths::{DEFAULT_ERROR_CODE_PATH, DEFAULT_LOG_DIR};
use std::env;
use std::path::{Path, PathBuf};

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

pub fn resolve_error_code_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("BEHEMOTH_ERROR_CODE_PATH").ok()) {
        return path;
    }
    PathBuf::from(DEFAULT_ERROR_CODE_PATH)
}

pub fn resolve_log_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("BEHEMOTH_LOG_DIR").ok()) {
        return path;
    }
    PathBuf::from(DEFAULT_LOG_DIR)
}

pub fn resolve_task_log_path(task_id: &str) -> PathBuf {
    let safe: String = task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    resolve_log_dir().join(format!("{}-bs.log", safe))
}

pub fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_log_path_sanitizes_task_id() {
        let path = resolve_task_log_path("../evil id");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert_eq!(name, "___evil_id-bs.log");
    }
}
