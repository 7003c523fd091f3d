use crate::constants::retry::HEALTH_DELAY_MS;

pub fn is_truthy(value: impl AsRef<str>) -> bool {
    matches!(
        value.as_ref().trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn is_truthy_any_env(keys: &[&str]) -> bool {
    keys.iter()
        .any(|key| std::env::var(key).ok().map(is_truthy).unwrap_or(false))
}

/// Echo the per-task log to stderr in addition to the log file.
pub fn is_log_stderr_enabled() -> bool {
    is_truthy_any_env(&["BEHEMOTH_LOG_STDERR"])
}

pub fn resolve_health_retry_delay_ms() -> u64 {
    std::env::var("BEHEMOTH_HEALTH_RETRY_DELAY_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(HEALTH_DELAY_MS)
}
