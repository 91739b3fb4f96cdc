//! Image version pins
//!
//! A versions file maps image names to tags, in the same `name: tag` format
//! `invar containers versions` prints. Pins are exposed to the cascade through
//! the `image_versions` variable.

use invar_core::{ValueExt, VarMap, loader::parse_vars};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{KubeError, Result};

/// Variable holding image name -> tag pins
pub const IMAGE_VERSIONS_VAR: &str = "image_versions";

/// Read a YAML or JSON versions file
pub fn load_image_versions(path: &Path) -> Result<VarMap> {
    let content = std::fs::read_to_string(path).map_err(|e| KubeError::ImageVersions {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let pins = parse_vars(&content, path).map_err(|e| KubeError::ImageVersions {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // unquoted numeric tags are stored as strings
    Ok(pins
        .into_iter()
        .map(|(name, tag)| (name, JsonValue::String(tag.coerce_string())))
        .collect())
}

/// Pinned tag for an image, if any
pub fn pinned_tag(vars: &VarMap, image_name: &str) -> Option<String> {
    vars.get(IMAGE_VERSIONS_VAR)?
        .as_object()?
        .get(image_name)
        .filter(|tag| !tag.is_zero())
        .map(ValueExt::coerce_string)
}
