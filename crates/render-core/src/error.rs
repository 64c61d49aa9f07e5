//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid variable '{input}': {reason}")]
    MalformedVariable { input: String, reason: String },

    #[error("Cannot set '{path}': '{blocked_at}' already holds a {found}, not a mapping")]
    MergeConflict {
        path: String,
        blocked_at: String,
        found: &'static str,
    },

    #[error("Configuration must be a mapping at the top level, found {found}")]
    NotAMapping { found: &'static str },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
