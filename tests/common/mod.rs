#![allow(dead_code)]

use base64::Engine;
use behemoth_agent::services::security::CommandSetCipher;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TOKEN: &str = "0123456789abcdef0123456789abcdef-tail";

pub fn tmp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Files a task envelope points at.
pub struct PlanFixture {
    pub dir: PathBuf,
    pub cmd_file: PathBuf,
    pub cmd_set: PathBuf,
}

impl PlanFixture {
    pub fn new(prefix: &str, cmd_file_body: &[u8]) -> Self {
        let dir = tmp_dir(prefix);
        let cmd_file = dir.join("commands.sql");
        std::fs::write(&cmd_file, cmd_file_body).expect("write cmd file");
        let cmd_set = dir.join("command_set.json");
        Self {
            dir,
            cmd_file,
            cmd_set,
        }
    }

    pub fn write_command_set(&self, command_set: &Value) {
        std::fs::write(&self.cmd_set, command_set.to_string()).expect("write command set");
    }

    pub fn write_encrypted_command_set(&self, command_set: &Value, token: &str) {
        let cipher = CommandSetCipher::from_token(token).expect("cipher");
        let payload = cipher.encrypt(command_set.to_string().as_bytes());
        std::fs::write(&self.cmd_set, payload).expect("write encrypted command set");
    }

    /// Base64 envelope with the file paths filled in; `extra` keys win.
    pub fn envelope(&self, host: &str, cmd_type: &str, extra: Value) -> String {
        let mut envelope = serde_json::json!({
            "task_id": "task-1",
            "host": host,
            "token": TOKEN,
            "org_id": "00000000-0000-0000-0000-000000000002",
            "cmd_type": cmd_type,
            "cmd_file": path_str(&self.cmd_file),
            "cmd_set_filepath": path_str(&self.cmd_set),
            "encrypted_data": false,
        });
        if let (Some(base), Some(overlay)) = (envelope.as_object_mut(), extra.as_object()) {
            for (key, value) in overlay {
                base.insert(key.clone(), value.clone());
            }
        }
        base64::engine::general_purpose::STANDARD.encode(envelope.to_string())
    }
}

impl Drop for PlanFixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub fn mysql_command_set() -> Value {
    serde_json::json!({
        "auth": {
            "address": "127.0.0.1",
            "port": 3306,
            "username": "root",
            "password": "s3cret-pw",
            "db_name": "inventory",
            "privileged": false
        },
        "command_set": [
            {"id": "c1", "input": "SELECT 1", "index": 0, "category": "sql"},
            {"id": "c2", "input": "SELECT 2", "index": 1, "category": "sql"}
        ]
    })
}

/// Writes an executable shell script and returns its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}
