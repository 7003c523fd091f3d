use std::path::{Path, PathBuf};

/// Expands a leading `~` in paths handed over by the orchestrator.
pub fn expand_home_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Some(str_path) = path.to_str() {
        let trimmed = str_path.trim();
        if let Some(rest) = trimmed.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        if trimmed == "~" {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home);
            }
        }
        return PathBuf::from(trimmed);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::expand_home_path;
    use std::path::PathBuf;

    #[test]
    fn absolute_paths_are_only_trimmed() {
        assert_eq!(
            expand_home_path(" /tmp/behemoth/commands/t1.bs "),
            PathBuf::from("/tmp/behemoth/commands/t1.bs")
        );
    }
}
