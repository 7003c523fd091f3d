pub mod app;
pub mod constants;
pub mod errors;

pub mod managers {
    pub mod interactive;
    pub mod local;
    pub mod mysql;
    pub mod oracle;
}

pub mod services {
    pub mod command_executor;
    pub mod error_codes;
    pub mod logger;
    pub mod plan;
    pub mod reporter;
    pub mod security;
    pub mod terminal;
    pub mod validation;
}

pub mod utils {
    pub mod feature_flags;
    pub mod merge;
    pub mod paths;
    pub mod redact;
    pub mod text;
    pub mod user_paths;
}
