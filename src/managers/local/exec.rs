use crate::constants::local_cli::{MYSQL_BANNER_PATTERN, SQLPLUS_CONTROL_TEMPLATE};
use crate::errors::AgentError;
use crate::services::error_codes::ErrorCodeSet;
use crate::services::plan::Auth;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use super::bundle::ScriptEntry;

static MYSQL_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(MYSQL_BANNER_PATTERN).expect("mysql banner regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliFlavor {
    Mysql,
    Sqlplus,
    Generic,
}

impl CliFlavor {
    pub fn detect(program: &str) -> Self {
        let name = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match name.as_str() {
            "mysql" => CliFlavor::Mysql,
            "sqlplus" => CliFlavor::Sqlplus,
            _ => CliFlavor::Generic,
        }
    }
}

/// A fully resolved process launch.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Temporary file owned by this run, removed afterwards.
    pub scratch: Option<PathBuf>,
}

pub fn sqlplus_connect_string(auth: &Auth) -> String {
    let mut conn = format!(
        "{}/\"{}\"@{}:{}/{}",
        auth.username, auth.password, auth.address, auth.port, auth.db_name
    );
    if auth.privileged {
        conn.push_str(" as sysdba");
    }
    conn
}

pub fn build_invocation(
    program: &str,
    extra_args: &[String],
    auth: &Auth,
    entry: &ScriptEntry,
) -> Result<Invocation, AgentError> {
    let mut invocation = Invocation {
        program: program.to_string(),
        cwd: entry.working_dir.clone(),
        ..Invocation::default()
    };
    match CliFlavor::detect(program) {
        CliFlavor::Mysql => {
            invocation.args = vec![
                format!("-u{}", auth.username),
                format!("-h{}", auth.address),
                format!("-P{}", auth.port),
            ];
            if !auth.db_name.is_empty() {
                invocation.args.push(format!("-D{}", auth.db_name));
            }
            invocation.args.extend(extra_args.iter().cloned());
            invocation.args.extend([
                "-t".to_string(),
                "-vvv".to_string(),
                "-e".to_string(),
                format!("source {}", entry.entry),
            ]);
            invocation
                .env
                .push(("MYSQL_PWD".to_string(), auth.password.clone()));
        }
        CliFlavor::Sqlplus => {
            let control = std::env::temp_dir().join(format!(
                "behemoth-entry-{}.sql",
                uuid::Uuid::new_v4().simple()
            ));
            let body = SQLPLUS_CONTROL_TEMPLATE.replace("{entry}", &entry.entry);
            std::fs::write(&control, body).map_err(|err| {
                AgentError::command(format!("Failed to write sqlplus control file: {}", err))
            })?;
            invocation.args = vec!["-L".to_string(), "-S".to_string()];
            invocation.args.extend(extra_args.iter().cloned());
            invocation.args.push(sqlplus_connect_string(auth));
            invocation
                .args
                .push(format!("@{}", control.to_string_lossy()));
            invocation.scratch = Some(control);
        }
        CliFlavor::Generic => {
            invocation.args = extra_args.to_vec();
            invocation.args.push(entry.entry.clone());
        }
    }
    Ok(invocation)
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub output: String,
}

fn build_temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("behemoth-local-{}", std::process::id()))
}

/// Runs the invocation with stdout and stderr sharing one file so the
/// captured text keeps the interleaving the interpreter produced.
pub async fn run_invocation(invocation: &Invocation) -> Result<ProcessOutput, AgentError> {
    let temp_dir = build_temp_dir();
    tokio::fs::create_dir_all(&temp_dir).await?;
    let capture_path = temp_dir.join(format!("output-{}.log", uuid::Uuid::new_v4().simple()));
    let capture = std::fs::File::create(&capture_path)?;
    let capture_err = capture.try_clone()?;

    let mut cmd = tokio::process::Command::new(&invocation.program);
    cmd.args(&invocation.args);
    if let Some(cwd) = invocation.cwd.as_ref() {
        cmd.current_dir(cwd);
    }
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(capture));
    cmd.stderr(Stdio::from(capture_err));

    let result = async {
        let mut child = cmd.spawn().map_err(|err| {
            AgentError::command(format!("Failed to spawn {}: {}", invocation.program, err))
        })?;
        let status = child.wait().await.map_err(|err| {
            AgentError::command(format!("Failed to wait for {}: {}", invocation.program, err))
        })?;
        let raw = tokio::fs::read(&capture_path).await?;
        Ok::<_, AgentError>(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            output: String::from_utf8_lossy(&raw).to_string(),
        })
    }
    .await;

    let _ = tokio::fs::remove_file(&capture_path).await;
    if let Some(scratch) = invocation.scratch.as_ref() {
        let _ = tokio::fs::remove_file(scratch).await;
    }
    result
}

/// With `-vvv`, mysql echoes the sourced statement between dashed rules and
/// ends with `Bye`; only the part after the echo is kept.
pub fn strip_mysql_banner(output: &str) -> String {
    match MYSQL_BANNER.captures(output.trim_end()) {
        Some(caps) => caps
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        None => output.to_string(),
    }
}

pub fn clean_output(flavor: CliFlavor, raw: &str) -> String {
    let text = match flavor {
        CliFlavor::Mysql => strip_mysql_banner(raw),
        CliFlavor::Sqlplus | CliFlavor::Generic => raw.to_string(),
    };
    text.trim().to_string()
}

/// A run fails on a non-zero exit, or when the output starts with a known
/// error code even though the interpreter exited cleanly.
pub fn classify(exit_code: i32, raw: &str, cleaned: &str, error_codes: &ErrorCodeSet) -> bool {
    if exit_code != 0 {
        return false;
    }
    !(error_codes.matches(cleaned) || error_codes.matches(raw.trim_start()))
}
