//! Resolution options
//!
//! Everything a resolution run depends on is carried here instead of being read
//! from process state, so runs are independent of each other.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::values::{VarMap, parse_extra_vars};

/// Options for one resolution run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Inventory directory, or a comma separated host list
    pub inventory: String,

    /// Raw `--extra-vars` arguments
    #[serde(default)]
    pub extra_vars: Vec<String>,

    /// Colon separated list of groups to keep (empty keeps everything)
    #[serde(default)]
    pub limit: String,

    /// Base directory for relative import sources and `@file` extra vars
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Where imported sources are materialized
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// YAML or JSON file mapping image names to tags
    #[serde(default)]
    pub image_versions: Option<PathBuf>,

    /// Maximum number of container cascades in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_concurrency() -> usize {
    8
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            inventory: String::new(),
            extra_vars: Vec::new(),
            limit: String::new(),
            working_dir: default_working_dir(),
            cache_dir: None,
            image_versions: None,
            concurrency: default_concurrency(),
        }
    }
}

impl ResolveOptions {
    /// Options for an inventory, everything else defaulted
    pub fn new(inventory: impl Into<String>) -> Self {
        Self {
            inventory: inventory.into(),
            ..Self::default()
        }
    }

    pub fn with_extra_vars(mut self, extra_vars: Vec<String>) -> Self {
        self.extra_vars = extra_vars;
        self
    }

    pub fn with_limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = limit.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_image_versions(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_versions = Some(path.into());
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Directory holding fetched import sources
    pub fn import_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.join(".invar-cache"))
    }

    /// Resolve a possibly relative path against the working directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Parse the extra-vars arguments
    pub fn parsed_extra_vars(&self) -> Result<VarMap> {
        parse_extra_vars(&self.extra_vars, &self.working_dir)
    }
}
