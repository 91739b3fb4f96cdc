//! End-to-end resolution
//!
//! ```text
//! load -> merge -> interpolate -> cascade -> limit
//! ```
//!
//! [`prepare`] covers the synchronous stages up to interpolation and collects
//! container declarations. [`cascade`] resolves those declarations on the
//! async runtime with bounded concurrency and applies the limit.

use futures::stream::{self, StreamExt};
use invar_core::{
    Host, Inventory, ResolveOptions, SourceFetcher, VarMap, apply_limit, load_inventory,
    merge_groups,
};
use invar_engine::Interpolator;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::cascade::{GroupContext, resolve_container};
use crate::compose::ComposeLoader;
use crate::container::{Container, ContainerDeclaration};
use crate::defaults::ContainerDefaults;
use crate::error::{KubeError, Result};
use crate::registry::RegistryTags;
use crate::versions::{IMAGE_VERSIONS_VAR, load_image_versions};

/// Inline container declarations of a group
pub const CONTAINERS_VAR: &str = "containers";

/// Compose files (relative to the inventory) declaring a group's containers
pub const COMPOSE_FILES_VAR: &str = "compose_files";

/// State after load, merge and interpolation
#[derive(Debug)]
pub struct Prepared {
    pub inventory: Inventory,
    pub groups: Vec<GroupContext>,
    /// Declarations with the index of their group in `groups`
    pub declarations: Vec<(usize, ContainerDeclaration)>,
}

/// A group after the whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedGroup {
    pub name: String,
    pub vars: VarMap,
    #[serde(skip)]
    pub defaults: ContainerDefaults,
    pub containers: Vec<Container>,
}

/// Result of a resolution run
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Groups in name order
    pub groups: Vec<ResolvedGroup>,
    pub hosts: BTreeMap<String, Host>,
    /// Inventory directory, if the inventory was loaded from one
    pub root: Option<PathBuf>,
}

impl Resolution {
    pub fn group(&self, name: &str) -> Option<&ResolvedGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every resolved container, group by group
    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.groups.iter().flat_map(|g| g.containers.iter())
    }

    /// Group name -> variables
    pub fn group_vars(&self) -> BTreeMap<&str, &VarMap> {
        self.groups
            .iter()
            .map(|g| (g.name.as_str(), &g.vars))
            .collect()
    }
}

/// Groups that declare containers themselves, as opposed to inheriting the variables
fn container_owners(inventory: &Inventory) -> BTreeSet<String> {
    inventory
        .groups
        .values()
        .filter(|g| g.vars.contains_key(CONTAINERS_VAR) || g.vars.contains_key(COMPOSE_FILES_VAR))
        .map(|g| g.name.clone())
        .collect()
}

fn inline_declarations(group: &str, value: Option<&JsonValue>) -> Vec<ContainerDeclaration> {
    let items = match value {
        None | Some(JsonValue::Null) => return Vec::new(),
        Some(JsonValue::Array(items)) => items,
        Some(other) => {
            tracing::warn!(group, found = %other, "'containers' is not a sequence, ignoring");
            return Vec::new();
        }
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            match serde_json::from_value::<ContainerDeclaration>(item.clone()) {
                Ok(decl) => Some(decl),
                Err(e) => {
                    let err = KubeError::InvalidDeclaration {
                        group: group.to_string(),
                        message: format!("container #{}: {}", index, e),
                    };
                    tracing::warn!(error = %err, "skipping container");
                    None
                }
            }
        })
        .collect()
}

fn compose_paths(group: &str, value: Option<&JsonValue>) -> Vec<String> {
    match value {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::String(path)) if path.trim().is_empty() => Vec::new(),
        Some(JsonValue::String(path)) => vec![path.clone()],
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(other) => {
            tracing::warn!(group, found = %other, "'compose_files' is not a path list, ignoring");
            Vec::new()
        }
    }
}

/// Run load, merge and interpolation, then collect container declarations
pub fn prepare(
    options: &ResolveOptions,
    fetcher: &dyn SourceFetcher,
    compose: &dyn ComposeLoader,
) -> Result<Prepared> {
    let mut inventory = load_inventory(options, fetcher)?;

    if let Some(path) = &options.image_versions {
        let pins = load_image_versions(&options.resolve_path(path))?;
        tracing::info!(count = pins.len(), "loaded image versions");
        inventory
            .extra_vars
            .insert(IMAGE_VERSIONS_VAR.to_string(), JsonValue::Object(pins));
    }

    let owners = container_owners(&inventory);

    tracing::info!(groups = inventory.groups.len(), "merging groups");
    merge_groups(&mut inventory);

    tracing::info!("interpolating variables");
    Interpolator::new().interpolate_inventory(&mut inventory);

    let base_dir = inventory
        .root
        .clone()
        .unwrap_or_else(|| options.working_dir.clone());

    let mut groups = Vec::with_capacity(inventory.groups.len());
    let mut declarations = Vec::new();

    for (name, group) in &inventory.groups {
        let index = groups.len();
        groups.push(GroupContext::new(
            name.clone(),
            group.vars.clone(),
            &inventory.extra_vars,
        ));

        if !owners.contains(name) {
            continue;
        }

        for decl in inline_declarations(name, group.vars.get(CONTAINERS_VAR)) {
            declarations.push((index, decl));
        }

        for path in compose_paths(name, group.vars.get(COMPOSE_FILES_VAR)) {
            let path = resolve_relative(&base_dir, &path);
            for service in compose.load(&path)? {
                declarations.push((index, service.into_declaration()));
            }
        }
    }

    tracing::info!(containers = declarations.len(), "collected container declarations");
    Ok(Prepared {
        inventory,
        groups,
        declarations,
    })
}

fn resolve_relative(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Resolve every declaration, then apply the limit
///
/// At most `concurrency` containers are in flight; results keep declaration
/// order. Invalid declarations are logged and left out.
pub async fn cascade(
    prepared: Prepared,
    registry: &dyn RegistryTags,
    concurrency: usize,
) -> Result<Resolution> {
    let Prepared {
        mut inventory,
        groups,
        declarations,
    } = prepared;

    tracing::info!(containers = declarations.len(), concurrency, "resolving containers");

    let groups_ref = &groups;
    let mut results: Vec<(usize, usize, Result<Container>)> =
        stream::iter(declarations.iter().enumerate())
            .map(|(order, (index, decl))| async move {
                let result = resolve_container(decl, &groups_ref[*index], registry).await;
                (order, *index, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(order, _, _)| *order);

    let mut containers: Vec<Vec<Container>> = vec![Vec::new(); groups.len()];
    for (_, index, result) in results {
        match result {
            Ok(container) => containers[index].push(container),
            Err(e) => tracing::warn!(group = %groups[index].name, error = %e, "skipping container"),
        }
    }

    apply_limit(&mut inventory);

    let resolved = groups
        .into_iter()
        .zip(containers)
        .filter(|(group, _)| inventory.groups.contains_key(&group.name))
        .map(|(group, containers)| ResolvedGroup {
            name: group.name,
            vars: group.vars,
            defaults: group.defaults,
            containers,
        })
        .collect();

    Ok(Resolution {
        groups: resolved,
        hosts: inventory.hosts,
        root: inventory.root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::YamlComposeLoader;
    use crate::registry::TagInfo;
    use async_trait::async_trait;
    use invar_core::DefaultFetcher;
    use tempfile::TempDir;

    /// Registry with no tags
    struct EmptyRegistry;

    #[async_trait]
    impl RegistryTags for EmptyRegistry {
        async fn list_tags(&self, _: &str, _: &str, _: &str) -> Result<Vec<TagInfo>> {
            Ok(Vec::new())
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn inventory() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "group_vars/all.yml",
            "nginx_version: \"1.25\"\ncontainer_defaults:\n  mem: 256\n",
        );
        write(
            dir.path(),
            "group_vars/web.yml",
            "replicas: 2\ncontainers:\n  - image: \"nginx:{{ nginx_version }}\"\n    ports: [80]\n",
        );
        write(dir.path(), "group_vars/web_eu.yml", "region: eu\n");
        write(
            dir.path(),
            "group_vars/db.yml",
            "compose_files: compose/db.yml\n",
        );
        write(
            dir.path(),
            "compose/db.yml",
            "services:\n  postgres:\n    image: postgres:16\n    mem_limit: 1g\n",
        );
        write(dir.path(), "groups", "[web]\nweb01\n\n[web:children]\nweb_eu\n");
        dir
    }

    fn options(dir: &TempDir) -> ResolveOptions {
        ResolveOptions::new(dir.path().display().to_string())
            .with_working_dir(dir.path())
            .with_cache_dir(dir.path().join(".cache"))
    }

    fn run(options: &ResolveOptions) -> Resolution {
        let fetcher = DefaultFetcher::new(&options.working_dir);
        let prepared = prepare(options, &fetcher, &YamlComposeLoader).unwrap();
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(cascade(prepared, &EmptyRegistry, options.concurrency))
            .unwrap()
    }

    #[test]
    fn test_defaults_from_all_and_replicas_from_group() {
        let dir = inventory();
        let resolution = run(&options(&dir));

        let web = resolution.group("web").unwrap();
        assert_eq!(web.containers.len(), 1);
        let nginx = &web.containers[0];
        assert_eq!(nginx.image(), "nginx:1.25");
        assert_eq!(nginx.mem, 256);
        assert_eq!(nginx.replicas, 2);
        assert_eq!(nginx.group, "web");
    }

    #[test]
    fn test_inherited_containers_are_not_duplicated() {
        let dir = inventory();
        let resolution = run(&options(&dir));

        let web_eu = resolution.group("web_eu").unwrap();
        assert!(web_eu.vars.contains_key("containers"));
        assert!(web_eu.containers.is_empty());
        assert_eq!(resolution.containers().count(), 2);
    }

    #[test]
    fn test_compose_files() {
        let dir = inventory();
        let resolution = run(&options(&dir));

        let postgres = &resolution.group("db").unwrap().containers[0];
        assert_eq!(postgres.service, "postgres");
        assert_eq!(postgres.image_tag, "16");
        assert_eq!(postgres.mem, 1024);
    }

    #[test]
    fn test_limit_applies_after_cascade() {
        let dir = inventory();
        let resolution = run(&options(&dir).with_limit("db"));

        let names: Vec<&str> = resolution.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["db"]);
        assert_eq!(resolution.containers().count(), 1);
    }

    #[test]
    fn test_extra_vars_and_versions_file() {
        let dir = inventory();
        write(dir.path(), "versions.yml", "nginx: \"1.27\"\n");

        let options = options(&dir)
            .with_extra_vars(vec!["replicas=4".to_string()])
            .with_image_versions("versions.yml");
        let resolution = run(&options);

        let nginx = &resolution.group("web").unwrap().containers[0];
        assert_eq!(nginx.replicas, 4);
        assert_eq!(nginx.image_tag, "1.27");
        assert_eq!(resolution.group("all").unwrap().vars["replicas"], 4);
    }

    #[test]
    fn test_invalid_declaration_is_skipped() {
        let dir = inventory();
        write(
            dir.path(),
            "group_vars/web.yml",
            "containers:\n  - service: noimage\n  - image: redis\n",
        );
        let resolution = run(&options(&dir));

        let web = resolution.group("web").unwrap();
        assert_eq!(web.containers.len(), 1);
        assert_eq!(web.containers[0].service, "redis");
    }
}
