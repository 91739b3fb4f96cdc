//! Invar Core - inventory model and variable resolution
//!
//! This crate loads inventories (groups, hosts and their variable files),
//! follows `@import` directives and merges group variables along the hierarchy.

pub mod config;
pub mod error;
pub mod fetch;
pub mod ini;
pub mod inventory;
pub mod loader;
pub mod merge;
pub mod values;

pub use config::ResolveOptions;
pub use error::{CoreError, FailurePolicy, Result};
pub use fetch::{DefaultFetcher, SourceFetcher};
pub use inventory::{ALL_GROUP, Group, Host, Inventory};
pub use loader::{VarsLoader, load_inventory};
pub use merge::{apply_limit, merge_groups};
pub use values::{ValueExt, VarMap};
