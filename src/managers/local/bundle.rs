use crate::constants::local_cli::{BUNDLE_ENTRY_FILE, ZIP_MAGIC};
use crate::errors::AgentError;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where the interpreter should run and which file it should be handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    pub working_dir: Option<PathBuf>,
    pub entry: String,
}

pub fn is_zip_file(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => &magic == ZIP_MAGIC,
        Err(_) => false,
    }
}

fn extraction_dir(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "bundle".to_string());
    let parent = archive
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    parent.join(format!("{}-{}", stem, uuid::Uuid::new_v4().simple()))
}

fn extract(archive: &Path) -> Result<PathBuf, AgentError> {
    let file = std::fs::File::open(archive).map_err(|err| {
        AgentError::command(format!(
            "Failed to open bundle {}: {}",
            archive.display(),
            err
        ))
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|err| AgentError::command(format!("Invalid zip bundle: {}", err)))?;
    let dest = extraction_dir(archive);
    std::fs::create_dir_all(&dest)?;
    zip.extract(&dest)
        .map_err(|err| AgentError::command(format!("Failed to extract bundle: {}", err)))?;
    Ok(dest)
}

/// `entry.bs` names the file to run, relative to the archive root. A leading
/// directory component becomes the working directory.
fn read_entry(dest: &Path) -> Result<ScriptEntry, AgentError> {
    let marker = dest.join(BUNDLE_ENTRY_FILE);
    let raw = std::fs::read_to_string(&marker).map_err(|err| {
        AgentError::command(format!(
            "Bundle is missing {}: {}",
            BUNDLE_ENTRY_FILE, err
        ))
    })?;
    let entry = raw.trim().trim_start_matches("./");
    if entry.is_empty() {
        return Err(AgentError::command(format!("{} is empty", BUNDLE_ENTRY_FILE)));
    }

    match entry.split_once('/') {
        Some((dir, rest)) if !dir.is_empty() && !rest.is_empty() => Ok(ScriptEntry {
            working_dir: Some(dest.join(dir)),
            entry: rest.to_string(),
        }),
        _ => Ok(ScriptEntry {
            working_dir: Some(dest.to_path_buf()),
            entry: entry.to_string(),
        }),
    }
}

/// Plain command files pass through untouched; zip bundles are extracted
/// next to the archive and resolved through their entry marker.
pub async fn resolve_entry(cmd_file: &Path) -> Result<ScriptEntry, AgentError> {
    let path = cmd_file.to_path_buf();
    tokio::task::spawn_blocking(move || {
        if !is_zip_file(&path) {
            return Ok(ScriptEntry {
                working_dir: None,
                entry: path.to_string_lossy().to_string(),
            });
        }
        let dest = extract(&path)?;
        read_entry(&dest)
    })
    .await
    .map_err(|err| AgentError::internal(format!("Bundle task failed: {}", err)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("behemoth-bundle-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = std::fs::File::create(path).expect("create zip");
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start file");
            writer.write_all(body.as_bytes()).expect("write file");
        }
        writer.finish().expect("finish zip");
    }

    #[tokio::test]
    async fn plain_file_is_its_own_entry() {
        let dir = temp_dir();
        let path = dir.join("commands.sql");
        std::fs::write(&path, "select 1;").expect("write");
        let entry = resolve_entry(&path).await.expect("resolve");
        assert_eq!(entry.working_dir, None);
        assert_eq!(entry.entry, path.to_string_lossy());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn bundle_entry_sets_working_directory() {
        let dir = temp_dir();
        let archive = dir.join("bundle.zip");
        write_zip(
            &archive,
            &[
                ("entry.bs", "scripts/main.sql\n"),
                ("scripts/main.sql", "@part.sql;"),
                ("scripts/part.sql", "select 1;"),
            ],
        );
        assert!(is_zip_file(&archive));

        let entry = resolve_entry(&archive).await.expect("resolve");
        let working_dir = entry.working_dir.expect("working dir");
        assert!(working_dir.ends_with("scripts"));
        assert_eq!(entry.entry, "main.sql");
        assert!(working_dir.join("part.sql").is_file());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn bundle_without_entry_marker_fails() {
        let dir = temp_dir();
        let archive = dir.join("bundle.zip");
        write_zip(&archive, &[("main.sql", "select 1;")]);
        let err = resolve_entry(&archive).await.err().expect("must fail");
        assert!(err.message.contains("entry.bs"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
