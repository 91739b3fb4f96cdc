//! Groups, hosts and the inventory that owns them

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::ini::IniDocument;
use crate::values::{VarMap, overlay};

/// Name of the group every inventory contains
pub const ALL_GROUP: &str = "all";

/// A named group of variables
#[derive(Debug, Clone, Default, Serialize)]
pub struct Group {
    pub name: String,

    /// Parent group names in declaration order
    pub parents: Vec<String>,

    pub vars: VarMap,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_vars(mut self, vars: VarMap) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.add_parent(parent);
        self
    }

    /// Add a parent link, ignoring duplicates
    pub fn add_parent(&mut self, parent: impl Into<String>) {
        let parent = parent.into();
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }
}

/// A host and the groups it belongs to
///
/// Host variables are kept as declared; they are never merged with group variables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Host {
    pub name: String,
    pub groups: Vec<String>,
    pub vars: VarMap,
}

impl Host {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// The full set of groups and hosts
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub groups: BTreeMap<String, Group>,
    pub hosts: BTreeMap<String, Host>,

    /// Inventory-level variables (metadata), visible through `all`
    pub vars: VarMap,

    /// Extra variables, applied last on every group
    pub extra_vars: VarMap,

    /// Colon separated group names to keep; empty keeps everything
    pub limit: String,

    /// Directory the inventory was loaded from, if any
    pub root: Option<PathBuf>,

    /// child -> parents declared before the child was registered
    pending_parents: BTreeMap<String, Vec<String>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `inventory_name`, `inventory_dir` and `inventory_file`
    pub fn set_metadata(&mut self, dir: &Path) {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| dir.display().to_string());
        self.vars.insert("inventory_name".to_string(), name.into());
        self.vars
            .insert("inventory_dir".to_string(), dir.display().to_string().into());
        self.vars.insert(
            "inventory_file".to_string(),
            dir.join("hosts").display().to_string().into(),
        );
        self.root = Some(dir.to_path_buf());
    }

    /// Register a group
    ///
    /// Parent links recorded for this name before it existed are applied now.
    /// Registering a name twice overlays the new variables onto the existing group.
    pub fn add_group(&mut self, mut group: Group) {
        if let Some(pending) = self.pending_parents.remove(&group.name) {
            for parent in pending {
                group.add_parent(parent);
            }
        }

        match self.groups.get_mut(&group.name) {
            Some(existing) => {
                tracing::debug!(group = %group.name, "group registered again, overlaying variables");
                overlay(&mut existing.vars, &group.vars);
                for parent in group.parents {
                    existing.add_parent(parent);
                }
            }
            None => {
                self.groups.insert(group.name.clone(), group);
            }
        }
    }

    /// Make `parent` a parent of `child`, deferring the link if `child` is unknown
    pub fn link_parent(&mut self, child: &str, parent: &str) {
        match self.groups.get_mut(child) {
            Some(group) => group.add_parent(parent),
            None => {
                let pending = self.pending_parents.entry(child.to_string()).or_default();
                if !pending.iter().any(|p| p == parent) {
                    pending.push(parent.to_string());
                }
            }
        }
    }

    /// Parent links whose child group was never registered
    pub fn pending_links(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.pending_parents
            .iter()
            .map(|(child, parents)| (child.as_str(), parents.as_slice()))
    }

    /// Register a host, merging memberships if it already exists
    pub fn add_host(&mut self, host: Host) {
        match self.hosts.get_mut(&host.name) {
            Some(existing) => {
                for group in host.groups {
                    if !existing.groups.contains(&group) {
                        existing.groups.push(group);
                    }
                }
                overlay(&mut existing.vars, &host.vars);
            }
            None => {
                self.hosts.insert(host.name.clone(), host);
            }
        }
    }

    /// Look a variable up for a group: extra variables first, then the group's map
    pub fn lookup(&self, group: &str, key: &str) -> Option<&serde_json::Value> {
        self.extra_vars
            .get(key)
            .or_else(|| self.groups.get(group).and_then(|g| g.vars.get(key)))
    }

    /// Create `all` if no source declared it
    pub fn ensure_all(&mut self) {
        if !self.groups.contains_key(ALL_GROUP) {
            self.add_group(Group::new(ALL_GROUP));
        }
    }

    /// Build hosts from a comma separated list (`web01,web02`)
    pub fn add_host_list(&mut self, list: &str) {
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            self.add_host(Host::new(name));
        }
    }

    /// Apply the INI `groups` control file
    ///
    /// `[name:children]` sections link every listed child to `name`; other
    /// sections list hosts that become members of the section's group.
    pub fn apply_groups_file(&mut self, content: &str, origin: &Path) -> Result<()> {
        let doc = IniDocument::parse(content, origin).map_err(|e| match e {
            CoreError::IniSyntax {
                path,
                line,
                message,
            } => CoreError::GroupsSyntax {
                path,
                line,
                message,
            },
            other => other,
        })?;

        for section in &doc.sections {
            if section.name.is_empty() {
                if let Some(entry) = section.entries.first() {
                    return Err(CoreError::GroupsSyntax {
                        path: origin.to_path_buf(),
                        line: entry.line,
                        message: format!("'{}' is outside of any section", entry.key),
                    });
                }
                continue;
            }

            if let Some(parent) = section.name.strip_suffix(":children") {
                for entry in &section.entries {
                    self.link_parent(&entry.key, parent);
                }
                continue;
            }

            if section.name.contains(':') {
                // `[x:vars]` and friends carry no group structure
                tracing::debug!(section = %section.name, "ignoring groups file section");
                continue;
            }

            for entry in &section.entries {
                let mut host = Host::new(entry.key.clone());
                host.groups.push(section.name.clone());
                self.add_host(host);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: serde_json::Value) -> VarMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected a mapping"),
        }
    }

    #[test]
    fn test_pending_parent_applied_on_registration() {
        let mut inv = Inventory::new();
        inv.link_parent("web", "prod");
        assert_eq!(inv.pending_links().count(), 1);

        inv.add_group(Group::new("web"));
        assert_eq!(inv.groups["web"].parents, vec!["prod"]);
        assert_eq!(inv.pending_links().count(), 0);
    }

    #[test]
    fn test_groups_file_links_children_and_hosts() {
        let mut inv = Inventory::new();
        inv.add_group(Group::new("web"));
        inv.apply_groups_file(
            "[prod:children]\nweb\ndb\n\n[web]\nweb01 ansible_host=10.0.0.1\nweb02\n",
            Path::new("groups"),
        )
        .unwrap();

        assert_eq!(inv.groups["web"].parents, vec!["prod"]);
        let pending: Vec<_> = inv.pending_links().map(|(c, _)| c).collect();
        assert_eq!(pending, vec!["db"]);

        assert_eq!(inv.hosts.len(), 2);
        assert_eq!(inv.hosts["web01"].groups, vec!["web"]);
    }

    #[test]
    fn test_groups_file_syntax_error_is_fatal() {
        let mut inv = Inventory::new();
        let err = inv
            .apply_groups_file("[prod:children\nweb\n", Path::new("groups"))
            .unwrap_err();
        assert!(matches!(err, CoreError::GroupsSyntax { line: 1, .. }));

        let err = inv
            .apply_groups_file("web\n[prod]\n", Path::new("groups"))
            .unwrap_err();
        assert!(matches!(err, CoreError::GroupsSyntax { .. }));
    }

    #[test]
    fn test_re_registration_overlays() {
        let mut inv = Inventory::new();
        inv.add_group(Group::new("web").with_vars(vars(json!({"a": 1, "b": 1}))));
        inv.add_group(
            Group::new("web")
                .with_vars(vars(json!({"b": 2})))
                .with_parent("prod"),
        );

        let web = &inv.groups["web"];
        assert_eq!(web.vars["a"], 1);
        assert_eq!(web.vars["b"], 2);
        assert_eq!(web.parents, vec!["prod"]);
    }

    #[test]
    fn test_host_list_and_all() {
        let mut inv = Inventory::new();
        inv.add_host_list("web01, web02,,db01");
        inv.ensure_all();

        assert_eq!(inv.hosts.len(), 3);
        assert!(inv.groups.contains_key(ALL_GROUP));
    }

    #[test]
    fn test_metadata() {
        let mut inv = Inventory::new();
        inv.set_metadata(Path::new("/srv/inventories/staging"));

        assert_eq!(inv.vars["inventory_name"], "staging");
        assert_eq!(inv.vars["inventory_dir"], "/srv/inventories/staging");
        assert_eq!(inv.vars["inventory_file"], "/srv/inventories/staging/hosts");
    }
}
