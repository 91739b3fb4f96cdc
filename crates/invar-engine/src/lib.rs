//! Invar Engine - Jinja2 interpolation of inventory variables
//!
//! This crate provides a MiniJinja-based interpolator with:
//! - Ansible-flavoured filters (basename, to_yaml, regex_replace, ...)
//! - Rewriting of colon-argument filter calls into Jinja2 call syntax
//! - Two-pass evaluation of every group's variables

pub mod engine;
pub mod error;
pub mod filters;
pub mod syntax;

pub use engine::{INTERPOLATION_PASSES, Interpolator, is_template};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use syntax::adapt_filter_syntax;
