//! Group-level container defaults

use invar_core::VarMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::container::{ProbeTiming, lenient};

/// Variable holding a group's container defaults
pub const DEFAULTS_VAR: &str = "container_defaults";

/// Defaults applied to every container of a group
///
/// ```yaml
/// container_defaults:
///   mem: 512
///   cpu: 0.5
///   replicas: 2
///   service_type: ClusterIP
///   ingress_domain: apps.example.com
///   env:
///     TZ: UTC
///   readiness:
///     initial_delay_seconds: 10
///     period_seconds: 15
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDefaults {
    #[serde(deserialize_with = "lenient::string_map")]
    pub env: BTreeMap<String, String>,

    #[serde(deserialize_with = "lenient::megabytes")]
    pub mem: u64,

    pub cpu: JsonValue,

    #[serde(deserialize_with = "lenient::opt_i32")]
    pub replicas: Option<i32>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub service_type: Option<String>,

    pub readiness: ProbeTiming,

    pub liveness: ProbeTiming,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub ingress_domain: Option<String>,
}

impl ContainerDefaults {
    /// Decode the `container_defaults` variable of a group
    ///
    /// A missing variable yields empty defaults; one that does not decode is
    /// logged and ignored.
    pub fn from_vars(group: &str, vars: &VarMap) -> Self {
        let Some(raw) = vars.get(DEFAULTS_VAR) else {
            return Self::default();
        };
        if raw.is_null() {
            return Self::default();
        }

        match serde_json::from_value(raw.clone()) {
            Ok(defaults) => defaults,
            Err(e) => {
                tracing::warn!(group, error = %e, "ignoring invalid container defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: JsonValue) -> VarMap {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected a mapping"),
        }
    }

    #[test]
    fn test_decode_defaults() {
        let defaults = ContainerDefaults::from_vars(
            "web",
            &vars(json!({
                "container_defaults": {
                    "mem": 512,
                    "cpu": "500m",
                    "replicas": 2,
                    "service_type": "NodePort",
                    "ingress_domain": "apps.example.com",
                    "env": {"TZ": "UTC"},
                    "readiness": {"initial_delay_seconds": 10, "period_seconds": 15},
                }
            })),
        );

        assert_eq!(defaults.mem, 512);
        assert_eq!(defaults.cpu, json!("500m"));
        assert_eq!(defaults.replicas, Some(2));
        assert_eq!(defaults.service_type.as_deref(), Some("NodePort"));
        assert_eq!(defaults.ingress_domain.as_deref(), Some("apps.example.com"));
        assert_eq!(defaults.env["TZ"], "UTC");
        assert_eq!(defaults.readiness.initial_delay_seconds, 10);
        assert_eq!(defaults.liveness, ProbeTiming::default());
    }

    #[test]
    fn test_missing_or_invalid_defaults() {
        assert_eq!(
            ContainerDefaults::from_vars("web", &VarMap::new()),
            ContainerDefaults::default()
        );
        assert_eq!(
            ContainerDefaults::from_vars("web", &vars(json!({"container_defaults": "nope"}))),
            ContainerDefaults::default()
        );
    }
}
