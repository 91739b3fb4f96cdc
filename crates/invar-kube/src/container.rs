//! Container declarations and resolved containers

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// A container as declared in an inventory or compose file
///
/// Every field is optional; unset fields are filled from the group's
/// container defaults by the cascade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDeclaration {
    pub image: String,

    #[serde(deserialize_with = "lenient::string_list")]
    pub args: Vec<String>,

    #[serde(deserialize_with = "lenient::string_list")]
    pub command: Vec<String>,

    #[serde(deserialize_with = "lenient::string_list")]
    pub entrypoint: Vec<String>,

    /// Post-start commands
    #[serde(deserialize_with = "lenient::string_list")]
    pub commands: Vec<String>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub working_dir: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub hostname: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub user: Option<String>,

    #[serde(deserialize_with = "lenient::flag")]
    pub privileged: bool,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub service: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub container_name: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub service_type: Option<String>,

    /// Memory limit in megabytes, 0 when unset
    #[serde(deserialize_with = "lenient::megabytes")]
    pub mem: u64,

    /// CPU limit: integer, float or quantity string
    pub cpu: JsonValue,

    #[serde(deserialize_with = "lenient::opt_i32")]
    pub replicas: Option<i32>,

    #[serde(deserialize_with = "lenient::string_map")]
    pub env: BTreeMap<String, String>,

    /// Mount path -> file under `<inventory>/files/`
    #[serde(deserialize_with = "lenient::string_map")]
    pub files: BTreeMap<String, String>,

    /// Mount path -> template under `<inventory>/files/`
    #[serde(deserialize_with = "lenient::string_map")]
    pub templates: BTreeMap<String, String>,

    #[serde(deserialize_with = "lenient::string_map")]
    pub labels: BTreeMap<String, String>,

    #[serde(deserialize_with = "lenient::string_map")]
    pub annotations: BTreeMap<String, String>,

    pub ports: Vec<ContainerPort>,

    #[serde(deserialize_with = "lenient::opt_string")]
    pub ingress: Option<String>,

    pub readiness: Option<Probe>,

    pub liveness: Option<Probe>,
}

/// Probe timing; zero means unset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeTiming {
    pub initial_delay_seconds: i32,
    pub timeout_seconds: i32,
    pub period_seconds: i32,
}

impl ProbeTiming {
    /// Fill zero fields from `defaults`, keeping everything already set
    pub fn fill_from(&mut self, defaults: &ProbeTiming) {
        if self.initial_delay_seconds == 0 {
            self.initial_delay_seconds = defaults.initial_delay_seconds;
        }
        if self.timeout_seconds == 0 {
            self.timeout_seconds = defaults.timeout_seconds;
        }
        if self.period_seconds == 0 {
            self.period_seconds = defaults.period_seconds;
        }
    }
}

/// Health check
///
/// `command` selects an exec probe, `path` an HTTP probe on `port`,
/// otherwise a TCP probe on `port`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub port: Option<u16>,
    pub path: Option<String>,
    pub command: Vec<String>,
    #[serde(flatten)]
    pub timing: ProbeTiming,
}

impl Probe {
    /// TCP probe on a port
    pub fn tcp(port: u16, timing: ProbeTiming) -> Self {
        Self {
            port: Some(port),
            timing,
            ..Self::default()
        }
    }
}

/// An exposed port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PortRepr")]
pub struct ContainerPort {
    pub published: u16,
    pub target: u16,
    pub protocol: String,
    pub name: Option<String>,
}

impl ContainerPort {
    pub fn new(published: u16, target: u16) -> Self {
        Self {
            published,
            target,
            protocol: "tcp".to_string(),
            name: None,
        }
    }

    /// Parse `8080`, `8080:80`, `127.0.0.1:8080:80` or `53:53/udp`
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (ports, protocol) = match spec.split_once('/') {
            Some((ports, proto)) => (ports, proto.to_ascii_lowercase()),
            None => (spec, "tcp".to_string()),
        };

        let parts: Vec<&str> = ports.split(':').collect();
        let parse = |s: &str| {
            s.trim()
                .parse::<u16>()
                .map_err(|_| format!("invalid port '{}'", spec))
        };

        let (published, target) = match parts.as_slice() {
            [single] => {
                let port = parse(*single)?;
                (port, port)
            }
            [published, target] | [_, published, target] => {
                (parse(*published)?, parse(*target)?)
            }
            _ => return Err(format!("invalid port '{}'", spec)),
        };

        Ok(Self {
            published,
            target,
            protocol,
            name: None,
        })
    }
}

impl fmt::Display for ContainerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.published, self.target)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u16),
    Text(String),
    Full {
        #[serde(default)]
        published: Option<u16>,
        target: u16,
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl TryFrom<PortRepr> for ContainerPort {
    type Error = String;

    fn try_from(repr: PortRepr) -> Result<Self, Self::Error> {
        match repr {
            PortRepr::Number(port) => Ok(ContainerPort::new(port, port)),
            PortRepr::Text(spec) => ContainerPort::parse(&spec),
            PortRepr::Full {
                published,
                target,
                protocol,
                name,
            } => Ok(ContainerPort {
                published: published.unwrap_or(target),
                target,
                protocol: protocol
                    .map(|p| p.to_ascii_lowercase())
                    .unwrap_or_else(|| "tcp".to_string()),
                name,
            }),
        }
    }
}

/// Files mounted from one directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigMapMount {
    /// ConfigMap (and volume) name
    pub name: String,
    pub mount_dir: String,
    pub files: Vec<ConfigFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigFile {
    /// Key in the ConfigMap: the file name of the mount path
    pub key: String,
    /// Path relative to `<inventory>/files/`
    pub source: String,
    /// Render through the template engine before mounting
    pub template: bool,
}

/// A container after the defaults cascade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    /// Owning group
    pub group: String,
    pub image_name: String,
    pub image_tag: String,
    pub service: String,
    pub container_name: String,
    pub service_type: Option<String>,
    pub args: Vec<String>,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub commands: Vec<String>,
    pub working_dir: Option<String>,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub privileged: bool,
    pub env: BTreeMap<String, String>,
    /// Megabytes, 0 when neither the declaration nor the defaults set it
    pub mem: u64,
    /// Normalized CPU quantity; `None` omits the limit
    pub cpu: Option<String>,
    pub replicas: i32,
    pub ports: Vec<ContainerPort>,
    pub ingress: Option<String>,
    pub readiness: Option<Probe>,
    pub liveness: Option<Probe>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Keyed by mount directory
    pub config_maps: BTreeMap<String, ConfigMapMount>,
    /// Registry host (and project) prefixed to the image in manifests
    pub registry: Option<String>,
}

impl Container {
    /// `name:tag`
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    /// Image reference including the registry prefix
    pub fn qualified_image(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry.trim_end_matches('/'), self.image()),
            None => self.image(),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ports: Vec<String> = self.ports.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{}/{}[{}, {}Mb] ports: [{}]",
            self.service,
            self.image(),
            self.cpu.as_deref().unwrap_or("-"),
            self.mem,
            ports.join(", ")
        )
    }
}

/// Deserializers that accept the loose typing found in inventories
pub(crate) mod lenient {
    use invar_core::ValueExt;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value as JsonValue;
    use std::collections::BTreeMap;

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::Null => Vec::new(),
            JsonValue::Array(items) => items.iter().map(ValueExt::coerce_string).collect(),
            JsonValue::String(s) if s.trim().is_empty() => Vec::new(),
            other => vec![other.coerce_string()],
        })
    }

    pub fn string_map<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        match JsonValue::deserialize(d)? {
            JsonValue::Null => Ok(BTreeMap::new()),
            JsonValue::Object(map) => Ok(map
                .iter()
                .map(|(k, v)| (k.clone(), v.coerce_string()))
                .collect()),
            // `["KEY=value", ...]`
            JsonValue::Array(items) => items
                .iter()
                .map(|item| {
                    let entry = item.coerce_string();
                    match entry.split_once('=') {
                        Some((k, v)) => Ok((k.to_string(), v.to_string())),
                        None => Err(D::Error::custom(format!("expected KEY=value, got '{}'", entry))),
                    }
                })
                .collect(),
            other => Err(D::Error::custom(format!("expected a mapping, got {}", other))),
        }
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match JsonValue::deserialize(d)? {
            JsonValue::Null => None,
            JsonValue::String(s) if s.is_empty() => None,
            other => Some(other.coerce_string()),
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(JsonValue::deserialize(d)?.coerce_bool())
    }

    pub fn megabytes<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        let value = JsonValue::deserialize(d)?;
        match &value {
            JsonValue::Null => Ok(0),
            JsonValue::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| D::Error::custom(format!("invalid memory value {}", n))),
            JsonValue::String(s) if s.trim().is_empty() => Ok(0),
            JsonValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid memory value '{}'", s))),
            other => Err(D::Error::custom(format!("invalid memory value {}", other))),
        }
    }

    pub fn opt_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
        let value = JsonValue::deserialize(d)?;
        match &value {
            JsonValue::Null => Ok(None),
            JsonValue::String(s) if s.trim().is_empty() => Ok(None),
            _ => super::as_i32(&value)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("expected an integer, got {}", value))),
        }
    }
}

/// Integer value of a number or numeric string
pub(crate) fn as_i32(value: &JsonValue) -> Option<i32> {
    match value {
        JsonValue::Number(n) => n.as_i64().and_then(|i| i32::try_from(i).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
