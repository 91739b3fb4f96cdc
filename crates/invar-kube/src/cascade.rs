//! Container defaults cascade
//!
//! Turns a declaration plus its group's finalized variables into a fully
//! specified [`Container`]. Every container is resolved independently.

use invar_core::{ValueExt, VarMap};
use std::collections::BTreeMap;
use std::path::Path;

use crate::container::{
    ConfigFile, ConfigMapMount, Container, ContainerDeclaration, Probe, as_i32,
};
use crate::defaults::ContainerDefaults;
use crate::error::{KubeError, Result};
use crate::image::{ImageRef, derive_name};
use crate::quantity::cpu_quantity;
use crate::registry::{RegistryTags, TagLookup, pick_latest_tag};
use crate::versions::pinned_tag;

/// Variable enabling registry lookups for `latest` tags (`true` or `all`)
pub const LATEST_TO_TAG_VAR: &str = "latest_to_tag_harbor";

/// Registry prefix (`host[/project]`)
pub const REGISTRY_VAR: &str = "docker_registry";

/// Replica count overriding every declaration
pub const REPLICAS_VAR: &str = "replicas";

/// What the cascade knows about the group a container belongs to
#[derive(Debug, Clone, Default)]
pub struct GroupContext {
    pub name: String,
    /// Merged and interpolated variables
    pub vars: VarMap,
    pub defaults: ContainerDefaults,
    pub replicas_override: Option<i32>,
}

impl GroupContext {
    /// Build the context from a group's final variables
    ///
    /// Extra variables are consulted first for the replica override.
    pub fn new(name: impl Into<String>, vars: VarMap, extra_vars: &VarMap) -> Self {
        let name = name.into();
        let defaults = ContainerDefaults::from_vars(&name, &vars);
        let replicas_override = extra_vars
            .get(REPLICAS_VAR)
            .or_else(|| vars.get(REPLICAS_VAR))
            .and_then(as_i32);

        Self {
            name,
            vars,
            defaults,
            replicas_override,
        }
    }

    fn var_string(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|v| !v.is_zero())
            .map(ValueExt::coerce_string)
    }
}

/// How `latest` tags are rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatestMode {
    Off,
    /// Only images tagged `latest`
    Latest,
    /// Every image
    All,
}

impl LatestMode {
    fn from_vars(vars: &VarMap) -> Self {
        match vars
            .get(LATEST_TO_TAG_VAR)
            .map(|v| v.coerce_string().to_ascii_lowercase())
            .as_deref()
        {
            Some("true") => LatestMode::Latest,
            Some("all") => LatestMode::All,
            _ => LatestMode::Off,
        }
    }
}

/// ConfigMap name for a mount directory
///
/// Slashes are dropped and dots become dashes: `/etc/app.d` -> `etcapp-d`.
pub fn config_map_name(dir: &str) -> String {
    dir.replace('/', "").replace('.', "-").to_lowercase()
}

fn config_maps(
    service: &str,
    files: &BTreeMap<String, String>,
    templates: &BTreeMap<String, String>,
) -> BTreeMap<String, ConfigMapMount> {
    let mut mounts: BTreeMap<String, ConfigMapMount> = BTreeMap::new();

    let entries = files
        .iter()
        .map(|(mount, source)| (mount, source, false))
        .chain(templates.iter().map(|(mount, source)| (mount, source, true)));

    for (mount, source, template) in entries {
        let path = Path::new(mount);
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "/".to_string());
        let key = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| mount.clone());

        let suffix = config_map_name(&dir);
        let name = if suffix.is_empty() {
            service.to_string()
        } else {
            format!("{}-{}", service, suffix)
        };

        mounts
            .entry(dir.clone())
            .or_insert_with(|| ConfigMapMount {
                name,
                mount_dir: dir,
                files: Vec::new(),
            })
            .files
            .push(ConfigFile {
                key,
                source: source.clone(),
                template,
            });
    }

    mounts
}

/// Fill a declaration from its group's defaults
///
/// Registry lookups are left to [`resolve_image`].
pub fn apply_defaults(decl: &ContainerDeclaration, group: &GroupContext) -> Result<Container> {
    let defaults = &group.defaults;

    if decl.image.trim().is_empty() {
        return Err(KubeError::InvalidDeclaration {
            group: group.name.clone(),
            message: format!(
                "container '{}' has no image",
                decl.service.as_deref().unwrap_or("<unnamed>")
            ),
        });
    }
    let image = ImageRef::parse(decl.image.trim());

    let derived = derive_name(&image.name);
    let service = decl.service.clone().unwrap_or_else(|| derived.clone());
    let container_name = decl.container_name.clone().unwrap_or(derived);

    let mut env = defaults.env.clone();
    env.extend(decl.env.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mem = if decl.mem == 0 { defaults.mem } else { decl.mem };

    let raw_cpu = if decl.cpu.is_zero() {
        &defaults.cpu
    } else {
        &decl.cpu
    };
    let cpu = match cpu_quantity(raw_cpu) {
        Ok(quantity) => Some(quantity.0),
        Err(e) => {
            if !raw_cpu.is_zero() {
                tracing::debug!(service = %service, error = %e, "omitting cpu limit");
            }
            None
        }
    };

    let replicas = group
        .replicas_override
        .or(decl.replicas.filter(|r| *r != 0))
        .or(defaults.replicas)
        .unwrap_or(0);

    let service_type = decl
        .service_type
        .clone()
        .or_else(|| defaults.service_type.clone());

    let ingress = decl.ingress.clone().or_else(|| {
        defaults
            .ingress_domain
            .as_ref()
            .map(|domain| format!("{}.{}", service, domain))
    });

    let readiness = match &decl.readiness {
        Some(probe) => {
            let mut probe = probe.clone();
            probe.timing.fill_from(&defaults.readiness);
            Some(probe)
        }
        None => decl
            .ports
            .first()
            .map(|port| Probe::tcp(port.target, defaults.readiness)),
    };

    let liveness = match &decl.liveness {
        Some(probe) => {
            let mut probe = probe.clone();
            probe.timing.fill_from(&defaults.liveness);
            Some(probe)
        }
        // a copy; later changes to one probe never show through the other
        None => readiness.clone(),
    };

    let config_maps = config_maps(&service, &decl.files, &decl.templates);

    Ok(Container {
        group: group.name.clone(),
        image_name: image.name,
        image_tag: image.tag,
        service,
        container_name,
        service_type,
        args: decl.args.clone(),
        command: decl.command.clone(),
        entrypoint: decl.entrypoint.clone(),
        commands: decl.commands.clone(),
        working_dir: decl.working_dir.clone(),
        hostname: decl.hostname.clone(),
        user: decl.user.clone(),
        privileged: decl.privileged,
        env,
        mem,
        cpu,
        replicas,
        ports: decl.ports.clone(),
        ingress,
        readiness,
        liveness,
        labels: decl.labels.clone(),
        annotations: decl.annotations.clone(),
        config_maps,
        registry: group.var_string(REGISTRY_VAR),
    })
}

/// Apply version pins and registry lookups to the image tag
///
/// A pinned version wins and skips the lookup. Lookup failures leave the
/// image unchanged.
pub async fn resolve_image(
    container: &mut Container,
    group: &GroupContext,
    registry: &dyn RegistryTags,
) {
    if let Some(tag) = pinned_tag(&group.vars, &container.image_name) {
        tracing::info!(image = %container.image_name, %tag, "using tag from versions file");
        container.image_tag = tag;
        return;
    }

    let mode = LatestMode::from_vars(&group.vars);
    if mode == LatestMode::Off {
        return;
    }
    if mode == LatestMode::Latest && container.image_tag != crate::image::LATEST {
        tracing::debug!(image = %container.image_name, tag = %container.image_tag, "skipping non-latest tag");
        return;
    }

    let registry_var = group.var_string(REGISTRY_VAR).unwrap_or_default();
    let Some(lookup) = TagLookup::new(&registry_var, &container.image_name) else {
        tracing::error!(image = %container.image(), "missing project in registry or image path");
        return;
    };

    match registry
        .list_tags(&lookup.host, &lookup.project, &lookup.image)
        .await
    {
        Ok(tags) => match pick_latest_tag(tags) {
            Some(tag) => {
                tracing::info!(
                    image = %container.image_name,
                    tag = %tag.name,
                    created = %tag.created,
                    "found tag"
                );
                container.image_tag = tag.name;
            }
            None => tracing::error!(image = %container.image(), "no tags found"),
        },
        Err(e) => tracing::error!(image = %container.image(), error = %e, "tag lookup failed"),
    }
}

/// Run the whole cascade for one declaration
pub async fn resolve_container(
    decl: &ContainerDeclaration,
    group: &GroupContext,
    registry: &dyn RegistryTags,
) -> Result<Container> {
    let mut container = apply_defaults(decl, group)?;
    resolve_image(&mut container, group, registry).await;
    tracing::debug!(group = %group.name, container = %container, "resolved container");
    Ok(container)
}
