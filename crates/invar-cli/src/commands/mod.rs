//! CLI commands

pub mod containers;
pub mod list;
