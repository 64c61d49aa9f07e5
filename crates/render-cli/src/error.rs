//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use render_core::CoreError;
use render_engine::EngineError;
use thiserror::Error;

use crate::exit_codes;

/// Message shown when no template source was given
pub const NO_INPUT: &str = "expected either stdin, --indir or --in parameter, for usage use --help";

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Template parsing or evaluation failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    /// No usable template input
    #[error("{message}")]
    #[diagnostic(code(render::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A configuration file did not parse or is not a mapping
    #[error("Invalid configuration file {}: {source}", path.display())]
    #[diagnostic(code(render::cli::config))]
    Config {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    /// A `--var` could not be applied
    #[error("{0}")]
    #[diagnostic(
        code(render::cli::variable),
        help("Variables take the form --var path.to.key=value")
    )]
    Variable(#[source] CoreError),

    /// IO error (file not found, permissions, etc.)
    #[error("IO error on {}: {source}", path.display())]
    #[diagnostic(code(render::cli::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(_) => exit_codes::ERROR,
            CliError::Input { .. } => exit_codes::ERROR,
            CliError::Config { .. } => exit_codes::ERROR,
            CliError::Variable(_) => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    /// The error for a run with no template source
    pub fn no_input() -> Self {
        Self::Input {
            message: NO_INPUT.to_string(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a configuration error for `path`
    pub fn config(path: &Path, source: CoreError) -> Self {
        Self::Config {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create an IO error for `path`
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
