//! Kubernetes resource quantities

use invar_core::ValueExt;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::{KubeError, Result};

static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+|Ki|Mi|Gi|Ti|Pi|Ei|[numkMGTPE])?$")
        .expect("valid regex")
});

/// Normalize a CPU value (integer, float or quantity string)
pub fn cpu_quantity(value: &JsonValue) -> Result<Quantity> {
    let missing = || KubeError::MissingQuantity {
        field: "cpu".to_string(),
        value: value.to_string(),
    };

    let raw = value.coerce_quantity().ok_or_else(missing)?;
    if !QUANTITY_RE.is_match(&raw) {
        return Err(missing());
    }
    Ok(Quantity(raw))
}

/// Memory limit in mebibytes
pub fn mem_quantity(megabytes: u64) -> Quantity {
    Quantity(format!("{}Mi", megabytes))
}
