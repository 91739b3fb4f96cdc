//! Core error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid groups file {path}: line {line}: {message}")]
    GroupsSyntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid INI document {path}: line {line}: {message}")]
    IniSyntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to retrieve import {source_ref}: {message}")]
    ImportFetch { source_ref: String, message: String },

    #[error("Imported path does not exist: {path}")]
    ImportTargetMissing { path: PathBuf },

    #[error("Variables in {path} must be a mapping, found {found}")]
    NotAMapping { path: PathBuf, found: String },

    #[error("Invalid symlink: {path}")]
    BrokenSymlink { path: PathBuf },

    #[error("Invalid extra variable '{arg}': {message}")]
    InvalidExtraVar { arg: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the pipeline does when a stage reports a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The configuration is broken; no output can be trusted
    Abort,
    /// Log the failure and continue with the remaining groups
    SkipAndWarn,
}

impl CoreError {
    /// Policy table mapping failure kinds to pipeline behavior
    pub fn policy(&self) -> FailurePolicy {
        match self {
            CoreError::BrokenSymlink { .. }
            | CoreError::IniSyntax { .. }
            | CoreError::NotAMapping { .. }
            | CoreError::YamlParse(_)
            | CoreError::JsonParse(_) => FailurePolicy::SkipAndWarn,
            CoreError::GroupsSyntax { .. }
            | CoreError::ImportFetch { .. }
            | CoreError::ImportTargetMissing { .. }
            | CoreError::InvalidExtraVar { .. }
            | CoreError::Io(_) => FailurePolicy::Abort,
        }
    }

    /// Apply the policy: recoverable failures are logged and swallowed
    pub fn recover(self) -> Result<()> {
        match self.policy() {
            FailurePolicy::SkipAndWarn => {
                tracing::warn!("{}", self);
                Ok(())
            }
            FailurePolicy::Abort => Err(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
