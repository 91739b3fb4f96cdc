//! Kubernetes manifests for resolved containers
//!
//! Every container yields its ConfigMaps, a Deployment, a Service when it
//! exposes ports and an Ingress when it has an ingress host.

use invar_core::VarMap;
use invar_engine::Interpolator;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container as PodContainer, ContainerPort as PodPort, EnvVar,
    ExecAction, HTTPGetAction, Lifecycle, LifecycleHandler, PodSpec, PodTemplateSpec,
    Probe as PodProbe, ResourceRequirements, SecurityContext, Service, ServicePort, ServiceSpec,
    TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::container::{ConfigMapMount, Container, Probe};
use crate::error::Result;
use crate::pipeline::Resolution;
use crate::quantity::mem_quantity;

/// Label selecting a container's pods
pub const APP_LABEL: &str = "app";

/// Service types Kubernetes accepts
const SERVICE_TYPES: &[&str] = &["ClusterIP", "NodePort", "LoadBalancer", "ExternalName"];

/// Manifests of one container
#[derive(Debug, Clone)]
pub struct Manifests {
    pub config_maps: Vec<ConfigMap>,
    pub deployment: Deployment,
    pub service: Option<Service>,
    pub ingress: Option<Ingress>,
}

impl Manifests {
    /// Multi-document YAML
    pub fn to_yaml(&self) -> Result<String> {
        let mut documents = Vec::new();
        for config_map in &self.config_maps {
            documents.push(to_document(config_map)?);
        }
        documents.push(to_document(&self.deployment)?);
        if let Some(service) = &self.service {
            documents.push(to_document(service)?);
        }
        if let Some(ingress) = &self.ingress {
            documents.push(to_document(ingress)?);
        }
        Ok(join_documents(documents))
    }
}

fn to_document<T: Serialize>(resource: &T) -> Result<String> {
    Ok(serde_yaml::to_string(resource)?)
}

/// Join YAML documents with `---` separators
pub fn join_documents(documents: impl IntoIterator<Item = String>) -> String {
    documents
        .into_iter()
        .map(|doc| format!("---\n{}", doc))
        .collect::<Vec<_>>()
        .join("")
}

/// Renders containers into Kubernetes objects
pub struct ManifestRenderer<'a> {
    interpolator: &'a Interpolator,
    files_dir: PathBuf,
}

impl<'a> ManifestRenderer<'a> {
    /// `files_dir` holds the sources of `files` and `templates` entries
    pub fn new(interpolator: &'a Interpolator, files_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpolator,
            files_dir: files_dir.into(),
        }
    }

    /// Build the manifests of a container
    ///
    /// `vars` is the owning group's final map; templates render against it.
    pub fn render(&self, container: &Container, vars: &VarMap) -> Result<Manifests> {
        let config_maps = container
            .config_maps
            .values()
            .map(|mount| self.config_map(mount, vars))
            .collect();

        Ok(Manifests {
            config_maps,
            deployment: deployment(container),
            service: service(container),
            ingress: ingress(container),
        })
    }

    fn config_map(&self, mount: &ConfigMapMount, vars: &VarMap) -> ConfigMap {
        let mut data = BTreeMap::new();

        for file in &mount.files {
            let path = self.files_dir.join(&file.source);
            let Some(content) = read_source(&path) else {
                continue;
            };

            let content = if file.template {
                match self.interpolator.render_str(&content, vars, &file.source) {
                    Ok(rendered) => rendered,
                    Err(e) => {
                        tracing::warn!(
                            template = %path.display(),
                            error = %e,
                            "template failed, mounting raw content"
                        );
                        content
                    }
                }
            } else {
                content
            };
            data.insert(file.key.clone(), content);
        }

        ConfigMap {
            metadata: ObjectMeta {
                name: Some(mount.name.clone()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }
}

fn read_source(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "skipping unreadable config file");
            None
        }
    }
}

fn app_labels(container: &Container) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), container.service.clone())])
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn non_empty_map(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then(|| map.clone())
}

fn probe(probe: &Probe) -> PodProbe {
    let port = probe.port.map(|p| IntOrString::Int(p.into()));

    let mut result = PodProbe {
        initial_delay_seconds: Some(probe.timing.initial_delay_seconds).filter(|s| *s > 0),
        timeout_seconds: Some(probe.timing.timeout_seconds).filter(|s| *s > 0),
        period_seconds: Some(probe.timing.period_seconds).filter(|s| *s > 0),
        ..Default::default()
    };

    if !probe.command.is_empty() {
        result.exec = Some(ExecAction {
            command: Some(probe.command.clone()),
        });
    } else if let (Some(path), Some(port)) = (&probe.path, &port) {
        result.http_get = Some(HTTPGetAction {
            path: Some(path.clone()),
            port: port.clone(),
            ..Default::default()
        });
    } else if let Some(port) = port {
        result.tcp_socket = Some(TCPSocketAction {
            port,
            ..Default::default()
        });
    }

    result
}

fn resources(container: &Container) -> ResourceRequirements {
    let mut limits = BTreeMap::new();
    if container.mem > 0 {
        limits.insert("memory".to_string(), mem_quantity(container.mem));
    }
    if let Some(cpu) = &container.cpu {
        limits.insert(
            "cpu".to_string(),
            k8s_openapi::apimachinery::pkg::api::resource::Quantity(cpu.clone()),
        );
    }

    ResourceRequirements {
        limits: (!limits.is_empty()).then_some(limits),
        ..Default::default()
    }
}

fn security_context(container: &Container) -> Option<SecurityContext> {
    let run_as_user = container.user.as_deref().and_then(|u| u.parse::<i64>().ok());
    if !container.privileged && run_as_user.is_none() {
        return None;
    }
    Some(SecurityContext {
        privileged: container.privileged.then_some(true),
        run_as_user,
        ..Default::default()
    })
}

/// Pod container of a resolved container
///
/// An entrypoint becomes the Kubernetes command; the declared command then
/// leads the arguments.
pub fn pod_container(container: &Container) -> PodContainer {
    let (command, args) = if container.entrypoint.is_empty() {
        (container.command.clone(), container.args.clone())
    } else {
        let mut args = container.command.clone();
        args.extend(container.args.iter().cloned());
        (container.entrypoint.clone(), args)
    };

    let env = container
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    let ports = container
        .ports
        .iter()
        .map(|port| PodPort {
            container_port: port.target.into(),
            protocol: Some(port.protocol.to_ascii_uppercase()),
            ..Default::default()
        })
        .collect();

    let volume_mounts = container
        .config_maps
        .values()
        .map(|mount| VolumeMount {
            name: mount.name.clone(),
            mount_path: mount.mount_dir.clone(),
            ..Default::default()
        })
        .collect();

    let lifecycle = (!container.commands.is_empty()).then(|| Lifecycle {
        post_start: Some(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(container.commands.clone()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    });

    PodContainer {
        name: container.container_name.clone(),
        image: Some(container.qualified_image()),
        command: non_empty(command),
        args: non_empty(args),
        env: non_empty(env),
        ports: non_empty(ports),
        resources: Some(resources(container)),
        readiness_probe: container.readiness.as_ref().map(probe),
        liveness_probe: container.liveness.as_ref().map(probe),
        lifecycle,
        volume_mounts: non_empty(volume_mounts),
        working_dir: container.working_dir.clone(),
        security_context: security_context(container),
        ..Default::default()
    }
}

/// `apps/v1` Deployment selecting pods by the `app` label
pub fn deployment(container: &Container) -> Deployment {
    let selector = app_labels(container);
    let mut pod_labels = container.labels.clone();
    pod_labels.extend(selector.clone());

    let volumes = container
        .config_maps
        .values()
        .map(|mount| Volume {
            name: mount.name.clone(),
            config_map: Some(ConfigMapVolumeSource {
                name: mount.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: ObjectMeta {
            name: Some(container.service.clone()),
            labels: Some(pod_labels.clone()),
            annotations: non_empty_map(&container.annotations),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: (container.replicas > 0).then_some(container.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: non_empty_map(&container.annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![pod_container(container)],
                    volumes: non_empty(volumes),
                    hostname: container.hostname.clone(),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Service over the published ports, `None` without ports
pub fn service(container: &Container) -> Option<Service> {
    if container.ports.is_empty() {
        return None;
    }

    let ports = container
        .ports
        .iter()
        .map(|port| ServicePort {
            name: Some(
                port.name
                    .clone()
                    .unwrap_or_else(|| port.published.to_string()),
            ),
            port: port.published.into(),
            target_port: Some(IntOrString::Int(port.target.into())),
            protocol: Some(port.protocol.to_ascii_uppercase()),
            ..Default::default()
        })
        .collect();

    let type_ = match container.service_type.as_deref() {
        Some(t) if SERVICE_TYPES.contains(&t) => Some(t.to_string()),
        Some(t) => {
            tracing::debug!(service = %container.service, service_type = t, "ignoring unknown service type");
            None
        }
        None => None,
    };

    Some(Service {
        metadata: ObjectMeta {
            name: Some(container.service.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(app_labels(container)),
            ports: Some(ports),
            type_,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Ingress routing the host to the first published port
pub fn ingress(container: &Container) -> Option<Ingress> {
    let host = container.ingress.as_ref()?;
    let Some(port) = container.ports.first() else {
        tracing::warn!(service = %container.service, host = %host, "ingress host without ports, skipping ingress");
        return None;
    };

    Some(Ingress {
        metadata: ObjectMeta {
            name: Some(container.service.clone()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: container.service.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port.published.into()),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Render every container of a resolution into one YAML stream
pub fn render_resolution(resolution: &Resolution, interpolator: &Interpolator) -> Result<String> {
    let files_dir = resolution
        .root
        .as_deref()
        .unwrap_or_else(|| Path::new("."))
        .join("files");
    let renderer = ManifestRenderer::new(interpolator, files_dir);

    let mut documents = Vec::new();
    for group in &resolution.groups {
        for container in &group.containers {
            documents.push(renderer.render(container, &group.vars)?.to_yaml()?);
        }
    }
    Ok(documents.concat())
}
