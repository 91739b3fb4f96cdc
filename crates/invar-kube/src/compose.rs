//! Compose files as a container source

use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;

use crate::container::{ContainerDeclaration, ContainerPort, lenient};
use crate::error::{KubeError, Result};

/// A service read from a compose file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeService {
    pub name: String,
    pub image: String,
    pub container_name: Option<String>,
    pub command: Vec<String>,
    pub entrypoint: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<ContainerPort>,
    pub memory_limit_bytes: Option<u64>,
    pub cpus: Option<JsonValue>,
    pub replicas: Option<i32>,
    pub endpoint_mode: Option<String>,
    pub privileged: bool,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub hostname: Option<String>,
}

impl ComposeService {
    /// Map the service field for field onto a container declaration
    pub fn into_declaration(self) -> ContainerDeclaration {
        let ports = self
            .ports
            .into_iter()
            .map(|mut port| {
                port.name.get_or_insert_with(|| port.published.to_string());
                port
            })
            .collect();

        ContainerDeclaration {
            image: self.image,
            service: Some(self.name),
            container_name: self.container_name,
            command: self.command,
            entrypoint: self.entrypoint,
            env: self.environment,
            labels: self.labels,
            ports,
            mem: self.memory_limit_bytes.map(|b| b / 1024 / 1024).unwrap_or(0),
            cpu: self.cpus.unwrap_or(JsonValue::Null),
            replicas: self.replicas,
            service_type: self.endpoint_mode,
            privileged: self.privileged,
            user: self.user,
            working_dir: self.working_dir,
            hostname: self.hostname,
            ..ContainerDeclaration::default()
        }
    }
}

/// Loads the services of a compose file
pub trait ComposeLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<ComposeService>>;
}

/// Reads compose files with serde_yaml
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlComposeLoader;

#[derive(Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ServiceDef>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ServiceDef {
    #[serde(deserialize_with = "lenient::opt_string")]
    image: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    container_name: Option<String>,
    command: Option<CommandLine>,
    entrypoint: Option<CommandLine>,
    #[serde(deserialize_with = "lenient::string_map")]
    environment: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient::string_map")]
    labels: BTreeMap<String, String>,
    ports: Vec<ContainerPort>,
    deploy: DeployDef,
    mem_limit: Option<JsonValue>,
    cpus: Option<JsonValue>,
    #[serde(deserialize_with = "lenient::flag")]
    privileged: bool,
    #[serde(deserialize_with = "lenient::opt_string")]
    user: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    working_dir: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    hostname: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DeployDef {
    #[serde(deserialize_with = "lenient::opt_i32")]
    replicas: Option<i32>,
    #[serde(deserialize_with = "lenient::opt_string")]
    endpoint_mode: Option<String>,
    resources: ResourcesDef,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ResourcesDef {
    limits: LimitsDef,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LimitsDef {
    memory: Option<JsonValue>,
    cpus: Option<JsonValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandLine {
    Shell(String),
    Exec(Vec<String>),
}

impl CommandLine {
    fn into_args(self) -> Vec<String> {
        match self {
            CommandLine::Shell(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandLine::Exec(args) => args,
        }
    }
}

/// Parse `512m`, `1g`, `1.5GB` or a plain byte count
pub fn parse_memory_bytes(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            let split = s
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(s.len());
            let (number, unit) = s.split_at(split);
            let number: f64 = number.parse().ok()?;
            let factor: u64 = match unit.trim() {
                "" | "b" => 1,
                "k" | "kb" => 1024,
                "m" | "mb" => 1024 * 1024,
                "g" | "gb" => 1024 * 1024 * 1024,
                _ => return None,
            };
            Some((number * factor as f64) as u64)
        }
        _ => None,
    }
}

impl ComposeLoader for YamlComposeLoader {
    fn load(&self, path: &Path) -> Result<Vec<ComposeService>> {
        let compose_error = |message: String| KubeError::Compose {
            path: path.to_path_buf(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| compose_error(e.to_string()))?;
        let file: ComposeFile =
            serde_yaml::from_str(&content).map_err(|e| compose_error(e.to_string()))?;

        let services = file
            .services
            .into_iter()
            .map(|(name, def)| {
                let memory = def.deploy.resources.limits.memory.or(def.mem_limit);
                ComposeService {
                    name,
                    image: def.image.unwrap_or_default(),
                    container_name: def.container_name,
                    command: def.command.map(CommandLine::into_args).unwrap_or_default(),
                    entrypoint: def.entrypoint.map(CommandLine::into_args).unwrap_or_default(),
                    environment: def.environment,
                    labels: def.labels,
                    ports: def.ports,
                    memory_limit_bytes: memory.as_ref().and_then(parse_memory_bytes),
                    cpus: def.deploy.resources.limits.cpus.or(def.cpus),
                    replicas: def.deploy.replicas,
                    endpoint_mode: def.deploy.endpoint_mode,
                    privileged: def.privileged,
                    user: def.user,
                    working_dir: def.working_dir,
                    hostname: def.hostname,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(path = %path.display(), count = services.len(), "loaded compose services");
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COMPOSE: &str = r#"
version: "3.7"
services:
  api:
    image: registry.local/team/api:1.4
    command: serve --port 8080
    environment:
      LOG_LEVEL: debug
      WORKERS: 4
    labels:
      - "tier=backend"
    ports:
      - "80:8080"
      - target: 9090
        published: 9091
    deploy:
      replicas: 3
      endpoint_mode: vip
      resources:
        limits:
          memory: 512M
          cpus: "0.5"
  cache:
    image: redis
    mem_limit: 1g
    user: "999"
"#;

    #[test]
    fn test_load_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, COMPOSE).unwrap();

        let services = YamlComposeLoader.load(&path).unwrap();
        assert_eq!(services.len(), 2);

        let api = &services[0];
        assert_eq!(api.name, "api");
        assert_eq!(api.command, vec!["serve", "--port", "8080"]);
        assert_eq!(api.environment["WORKERS"], "4");
        assert_eq!(api.labels["tier"], "backend");
        assert_eq!(api.ports[1], ContainerPort::new(9091, 9090));
        assert_eq!(api.memory_limit_bytes, Some(512 * 1024 * 1024));
        assert_eq!(api.replicas, Some(3));

        let cache = &services[1];
        assert_eq!(cache.memory_limit_bytes, Some(1024 * 1024 * 1024));
        assert_eq!(cache.user.as_deref(), Some("999"));
    }

    #[test]
    fn test_into_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, COMPOSE).unwrap();

        let mut services = YamlComposeLoader.load(&path).unwrap();
        let decl = services.remove(0).into_declaration();

        assert_eq!(decl.service.as_deref(), Some("api"));
        assert_eq!(decl.image, "registry.local/team/api:1.4");
        assert_eq!(decl.mem, 512);
        assert_eq!(decl.cpu, json!("0.5"));
        assert_eq!(decl.replicas, Some(3));
        assert_eq!(decl.service_type.as_deref(), Some("vip"));
        assert_eq!(decl.ports[0].name.as_deref(), Some("80"));
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory_bytes(&json!("256m")), Some(256 * 1024 * 1024));
        assert_eq!(parse_memory_bytes(&json!("1.5GB")), Some(1610612736));
        assert_eq!(parse_memory_bytes(&json!(2048)), Some(2048));
        assert_eq!(parse_memory_bytes(&json!("lots")), None);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = YamlComposeLoader.load(Path::new("/nonexistent/compose.yml")).unwrap_err();
        assert!(matches!(err, KubeError::Compose { .. }));
    }
}
