//! CLI error types with exit code handling
//!
//! Library errors are mapped onto a small set of diagnostics, each with its
//! own exit code.

use invar_core::CoreError;
use invar_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Loading, merging or importing the inventory failed
    #[error("Inventory error: {message}")]
    #[diagnostic(code(invar::cli::inventory))]
    Inventory {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Containers could not be collected or rendered
    #[error("Container error: {message}")]
    #[diagnostic(code(invar::cli::containers))]
    Container { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(invar::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(invar::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Inventory { .. } => exit_codes::INVENTORY_ERROR,
            CliError::Container { .. } => exit_codes::CONTAINER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

fn inventory_help(err: &CoreError) -> Option<String> {
    match err {
        CoreError::GroupsSyntax { .. } => {
            Some("every entry of the groups file must follow a [section] header".to_string())
        }
        CoreError::ImportFetch { .. } => {
            Some("check the @import source, or remove the import cache directory".to_string())
        }
        CoreError::InvalidExtraVar { .. } => Some(
            "extra variables are key=value, a YAML/JSON mapping, or @file".to_string(),
        ),
        _ => None,
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::Inventory {
                help: inventory_help(&other),
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Core(core) => core.into(),
            KubeError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::Container {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
