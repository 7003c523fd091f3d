pub mod network {
    pub const USER_AGENT: &str = "behemoth-agent/1.0";
}

pub mod limits {
    pub const MAX_PORT: u16 = 65_535;
    pub const MIN_PORT: u16 = 1;
    pub const LOG_OUTPUT_PREVIEW_BYTES: usize = 512;
    pub const LOG_ERROR_MAX_BYTES: usize = 2048;
}

pub mod retry {
    pub const HEALTH_ATTEMPTS: usize = 3;
    pub const HEALTH_DELAY_MS: u64 = 10_000;
}

pub mod buffers {
    pub const PTY_READ_CHUNK: usize = 1024;
    pub const PTY_CHANNEL_DEPTH: usize = 256;
    pub const PTY_DEFAULT_COLS: u16 = 80;
    pub const PTY_DEFAULT_ROWS: u16 = 24;
}

pub mod crypto {
    pub const AES_KEY_SIZE: usize = 32;
    pub const AES_BLOCK_SIZE: usize = 16;
}

pub mod prompt {
    pub const MYSQL_PROMPT: &str = "mysql> ";
}

pub mod task_status {
    pub const EXECUTING: &str = "executing";
    pub const FAILED: &str = "failed";
    pub const SUCCESS: &str = "success";
}

pub mod local_cli {
    pub const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
    pub const BUNDLE_ENTRY_FILE: &str = "entry.bs";
    pub const SQLPLUS_CONTROL_TEMPLATE: &str = "SET ECHO ON;
SET TIMING OFF;
SET SERVEROUTPUT ON;
WHENEVER SQLERROR EXIT SQL.SQLCODE;
WHENEVER OSERROR EXIT FAILURE;
@{entry};
EXIT;";
    pub const MYSQL_BANNER_PATTERN: &str = r"(?s)--------------\n(.*?)\n--------------\n(.*)Bye?$";
}

pub mod paths {
    pub const DEFAULT_ERROR_CODE_PATH: &str = "/opt/behemoth/data/error_code.json";
    pub const DEFAULT_LOG_DIR: &str = "/tmp/behemoth/logs";
}
