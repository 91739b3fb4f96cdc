//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error")]
    Template(#[from] TemplateError),

    #[error("Lookups are not supported: {expression}")]
    UnsupportedLookup { expression: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    SyntaxError,
    InvalidOperation,
    Other,
}

/// Template error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(invar::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    pub fn from_minijinja(err: minijinja::Error, name: &str, source: &str) -> Self {
        let kind = match err.kind() {
            minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
            minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
            minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
            minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
            _ => TemplateErrorKind::Other,
        };
        let span = err.line().and_then(|line| calculate_span(source, line));
        let suggestion = match kind {
            TemplateErrorKind::UnknownFilter => Some(format!(
                "available filters besides the builtins: {}",
                crate::filters::FILTER_NAMES.join(", ")
            )),
            TemplateErrorKind::SyntaxError if source.contains("lookup(") => {
                Some("lookups are not supported".to_string())
            }
            _ => None,
        };

        Self {
            message: err.to_string(),
            kind,
            src: NamedSource::new(name, source.to_string()),
            span,
            suggestion,
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Span covering a 1-based line of `source`
fn calculate_span(source: &str, line: usize) -> Option<SourceSpan> {
    let mut offset = 0;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let len = text.trim_end_matches('\n').len();
            return Some(SourceSpan::new(offset.into(), len));
        }
        offset += text.len();
    }
    None
}

pub type Result<T> = std::result::Result<T, EngineError>;
