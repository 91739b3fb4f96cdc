//! Loading inventories and variable files from disk
//!
//! An inventory root contains a `group_vars/` directory (one group per child)
//! and an optional INI `groups` file describing the hierarchy. Any variable file
//! may pull in external sources with `# @import <source>[#<subpath>]` lines.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::config::ResolveOptions;
use std::borrow::Cow;

use crate::error::{CoreError, FailurePolicy, Result};
use crate::fetch::{SourceFetcher, cache_path};
use crate::ini::IniDocument;
use crate::inventory::{Group, Inventory};
use crate::values::{VarMap, from_json, from_yaml, overlay};

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)# @import[ \t]+(\S+)").expect("valid regex"));

/// Extensions stripped from group names
const VAR_FILE_EXTENSIONS: &[&str] = &["yml", "yaml", "json", "ini", "properties"];

/// Parse variable file content, choosing the format from the file extension
pub fn parse_vars(content: &str, path: &Path) -> Result<VarMap> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json(content, path),
        Some("ini") | Some("properties") => Ok(IniDocument::parse(content, path)?.to_flat_map()),
        _ => from_yaml(content, path),
    }
}

/// Remove import directives so the remaining text parses in its own format
pub fn strip_imports(content: &str) -> Cow<'_, str> {
    IMPORT_RE.replace_all(content, "")
}

/// Group name for an entry of `group_vars/`
pub fn group_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if path.is_file() && VAR_FILE_EXTENSIONS.contains(&ext) => path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or(file_name),
        _ => file_name,
    }
}

/// Split an import reference into source and subpath
pub fn split_import(reference: &str) -> (&str, Option<&str>) {
    match reference.split_once('#') {
        Some((source, sub)) if !sub.is_empty() => (source, Some(sub)),
        Some((source, _)) => (source, None),
        None => (reference, None),
    }
}

/// Reads variable files into an [`Inventory`], following imports
pub struct VarsLoader<'a> {
    fetcher: &'a dyn SourceFetcher,
    cache_dir: PathBuf,
    /// Import sources currently being resolved
    importing: Vec<String>,
}

impl<'a> VarsLoader<'a> {
    pub fn new(fetcher: &'a dyn SourceFetcher, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            cache_dir: cache_dir.into(),
            importing: Vec::new(),
        }
    }

    /// Load an inventory root: `group_vars/` then the `groups` file
    pub fn load_root(&mut self, dir: &Path, inventory: &mut Inventory) -> Result<()> {
        tracing::info!(dir = %dir.display(), "parsing inventory");

        self.load_group_vars(&dir.join("group_vars"), inventory)?;

        let groups_file = dir.join("groups");
        if groups_file.is_file() {
            let content = std::fs::read_to_string(&groups_file)?;
            inventory.apply_groups_file(&content, &groups_file)?;
        }

        Ok(())
    }

    /// Load an INI inventory file: `group_vars/` next to it, then the file as the `groups` file
    pub fn load_file(&mut self, file: &Path, inventory: &mut Inventory) -> Result<()> {
        tracing::info!(file = %file.display(), "parsing inventory file");

        if let Some(dir) = file.parent() {
            self.load_group_vars(&dir.join("group_vars"), inventory)?;
        }

        let content = std::fs::read_to_string(file)?;
        inventory.apply_groups_file(&content, file)
    }

    /// Register one group per entry of a `group_vars` directory
    pub fn load_group_vars(&mut self, dir: &Path, inventory: &mut Inventory) -> Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        tracing::debug!(dir = %dir.display(), "parsing groups");

        for path in sorted_entries(dir)? {
            // metadata() follows symlinks, so a dangling link fails here
            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(_) => {
                    CoreError::BrokenSymlink { path }.recover()?;
                    continue;
                }
            };

            let name = group_name(&path);
            let vars = if metadata.is_dir() {
                let mut vars = VarMap::new();
                for file in sorted_entries(&path)? {
                    if !file.is_file() {
                        if file.is_symlink() {
                            CoreError::BrokenSymlink { path: file }.recover()?;
                        } else {
                            tracing::debug!(path = %file.display(), "skipping nested directory");
                        }
                        continue;
                    }
                    let parsed = self.parse_file(&file, inventory)?;
                    overlay(&mut vars, &parsed);
                }
                vars
            } else {
                self.parse_file(&path, inventory)?
            };

            inventory.add_group(Group::new(name).with_vars(vars));
        }

        Ok(())
    }

    /// Parse a variable file
    ///
    /// Imported variables come first, so the file's own declarations win.
    /// A file that does not parse contributes only its imports.
    pub fn parse_file(&mut self, path: &Path, inventory: &mut Inventory) -> Result<VarMap> {
        tracing::debug!(path = %path.display(), "parsing variables");

        let content = std::fs::read_to_string(path)?;
        let mut vars = self.resolve_imports(&content, inventory)?;
        let own = match parse_vars(&strip_imports(&content), path) {
            Ok(own) => own,
            Err(err) if err.policy() == FailurePolicy::SkipAndWarn => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unparsable variables");
                VarMap::new()
            }
            Err(err) => return Err(err),
        };
        overlay(&mut vars, &own);
        Ok(vars)
    }

    fn resolve_imports(&mut self, content: &str, inventory: &mut Inventory) -> Result<VarMap> {
        let mut vars = VarMap::new();

        for caps in IMPORT_RE.captures_iter(content) {
            let reference = &caps[1];
            let (source, subpath) = split_import(reference);

            if self.importing.iter().any(|s| s == source) {
                tracing::warn!(source, "import cycle detected, skipping");
                continue;
            }
            tracing::info!(source, subpath = subpath.unwrap_or(""), "import");

            let dest = cache_path(&self.cache_dir, source);
            if !dest.exists() {
                std::fs::create_dir_all(&self.cache_dir)?;
                self.fetcher.fetch(source, &dest)?;
            } else {
                tracing::debug!(source, dest = %dest.display(), "import already cached");
            }

            let target = match subpath {
                Some(sub) => dest.join(sub.trim_start_matches('/')),
                None => dest,
            };

            self.importing.push(source.to_string());
            let result = if target.is_dir() {
                self.load_root(&target, inventory).map(|_| None)
            } else if target.is_file() {
                self.parse_file(&target, inventory).map(Some)
            } else {
                Err(CoreError::ImportTargetMissing { path: target })
            };
            self.importing.pop();

            if let Some(imported) = result? {
                overlay(&mut vars, &imported);
            }
        }

        Ok(vars)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Build an inventory from the options
///
/// An existing directory is loaded as an inventory root and an existing file as
/// an INI inventory file; anything else is read as a comma separated host list.
/// The `all` group always exists afterwards.
pub fn load_inventory(options: &ResolveOptions, fetcher: &dyn SourceFetcher) -> Result<Inventory> {
    let mut inventory = Inventory::new();
    inventory.extra_vars = options.parsed_extra_vars()?;
    inventory.limit = options.limit.clone();

    let path = options.resolve_path(Path::new(&options.inventory));
    if !options.inventory.is_empty() && path.is_dir() {
        inventory.set_metadata(&path);
        let mut loader = VarsLoader::new(fetcher, options.import_cache_dir());
        loader.load_root(&path, &mut inventory)?;
    } else if !options.inventory.is_empty() && path.is_file() {
        let dir = path.parent().unwrap_or(options.working_dir.as_path());
        inventory.set_metadata(dir);
        inventory
            .vars
            .insert("inventory_file".to_string(), path.display().to_string().into());
        let mut loader = VarsLoader::new(fetcher, options.import_cache_dir());
        loader.load_file(&path, &mut inventory)?;
    } else {
        inventory.add_host_list(&options.inventory);
    }

    inventory.ensure_all();
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DefaultFetcher;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Records fetched sources and copies from a fixture directory
    struct RecordingFetcher {
        fixtures: PathBuf,
        calls: Mutex<Vec<String>>,
    }

    impl SourceFetcher for RecordingFetcher {
        fn fetch(&self, source: &str, dest: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(source.to_string());
            DefaultFetcher::new(&self.fixtures).fetch(source, dest)
        }
    }

    #[test]
    fn test_parse_vars_by_extension() {
        let json = parse_vars(r#"{"a": 1}"#, Path::new("x.json")).unwrap();
        assert_eq!(json["a"], 1);

        let ini = parse_vars("[db]\nhost=x\n", Path::new("x.properties")).unwrap();
        assert_eq!(ini["db.host"], "x");

        let yaml = parse_vars("a: [1, 2]\n", Path::new("x.yml")).unwrap();
        assert_eq!(yaml["a"][1], 2);

        let no_ext = parse_vars("a: b\n", Path::new("vars")).unwrap();
        assert_eq!(no_ext["a"], "b");
    }

    #[test]
    fn test_split_import() {
        assert_eq!(split_import("git::x.git#sub/dir"), ("git::x.git", Some("sub/dir")));
        assert_eq!(split_import("shared"), ("shared", None));
        assert_eq!(split_import("shared#"), ("shared", None));
    }

    #[test]
    fn test_load_group_vars_dir_and_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("inv");
        write(&root, "group_vars/all.yml", "env: prod\n");
        write(&root, "group_vars/web/10-base.yml", "port: 80\nname: base\n");
        write(&root, "group_vars/web/20-override.yml", "name: web\n");
        write(&root, "group_vars/db.json", r#"{"port": 5432}"#);
        write(&root, "groups", "[prod:children]\nweb\ndb\n");

        let options = ResolveOptions::new(root.display().to_string()).with_working_dir(tmp.path());
        let inv = load_inventory(&options, &DefaultFetcher::new(tmp.path())).unwrap();

        assert_eq!(inv.groups.len(), 3);
        assert_eq!(inv.groups["all"].vars["env"], "prod");
        assert_eq!(inv.groups["web"].vars["port"], 80);
        assert_eq!(inv.groups["web"].vars["name"], "web");
        assert_eq!(inv.groups["db"].vars["port"], 5432);
        assert_eq!(inv.groups["web"].parents, vec!["prod"]);
        assert_eq!(inv.vars["inventory_name"], "inv");
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("inv");
        write(&root, "group_vars/web.yml", "a: 1\n");
        std::os::unix::fs::symlink(
            tmp.path().join("does-not-exist.yml"),
            root.join("group_vars/broken.yml"),
        )
        .unwrap();

        let options = ResolveOptions::new(root.display().to_string());
        let inv = load_inventory(&options, &DefaultFetcher::new(tmp.path())).unwrap();

        assert!(inv.groups.contains_key("web"));
        assert!(!inv.groups.contains_key("broken"));
    }

    #[test]
    fn test_host_list_when_not_a_path() {
        let tmp = TempDir::new().unwrap();
        let options = ResolveOptions::new("web01,web02").with_working_dir(tmp.path());
        let inv = load_inventory(&options, &DefaultFetcher::new(tmp.path())).unwrap();

        assert_eq!(inv.hosts.len(), 2);
        assert_eq!(inv.groups.len(), 1);
        assert!(inv.groups.contains_key("all"));
    }

    #[test]
    fn test_file_import_is_overridden_locally() {
        let tmp = TempDir::new().unwrap();
        let fixtures = tmp.path().join("fixtures");
        write(&fixtures, "shared/common.yml", "region: eu\nreplicas: 1\n");

        let root = tmp.path().join("inv");
        write(
            &root,
            "group_vars/all.yml",
            "# @import shared#common.yml\nreplicas: 3\n",
        );

        let fetcher = RecordingFetcher {
            fixtures: fixtures.clone(),
            calls: Mutex::new(Vec::new()),
        };
        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));

        let inv = load_inventory(&options, &fetcher).unwrap();
        assert_eq!(inv.groups["all"].vars["region"], "eu");
        assert_eq!(inv.groups["all"].vars["replicas"], 3);

        // second load hits the cache
        load_inventory(&options, &fetcher).unwrap();
        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_json_file_with_import() {
        let tmp = TempDir::new().unwrap();
        let fixtures = tmp.path().join("fixtures");
        write(&fixtures, "shared/common.yml", "region: eu\na: 0\n");

        let root = tmp.path().join("inv");
        write(
            &root,
            "group_vars/all.json",
            "# @import shared#common.yml\n{\"a\": 1}\n",
        );

        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));
        let inv = load_inventory(&options, &DefaultFetcher::new(&fixtures)).unwrap();

        assert_eq!(inv.groups["all"].vars["region"], "eu");
        assert_eq!(inv.groups["all"].vars["a"], 1);
    }

    #[test]
    fn test_unparsable_file_keeps_only_imports() {
        let tmp = TempDir::new().unwrap();
        let fixtures = tmp.path().join("fixtures");
        write(&fixtures, "shared/common.yml", "region: eu\n");

        let root = tmp.path().join("inv");
        write(&root, "group_vars/all.yml", "env: prod\n");
        write(&root, "group_vars/web.yml", "key: [unclosed\n");
        write(
            &root,
            "group_vars/db.yml",
            "# @import shared#common.yml\nkey: [unclosed\n",
        );

        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));
        let inv = load_inventory(&options, &DefaultFetcher::new(&fixtures)).unwrap();

        assert_eq!(inv.groups["all"].vars["env"], "prod");
        assert!(inv.groups["web"].vars.is_empty());
        assert_eq!(inv.groups["db"].vars["region"], "eu");
        assert!(!inv.groups["db"].vars.contains_key("key"));
    }

    #[test]
    fn test_strip_imports() {
        let stripped = strip_imports("# @import shared#x.yml\n{\"a\": 1}\n");
        assert_eq!(stripped, "\n{\"a\": 1}\n");
        assert!(matches!(strip_imports("a: 1\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_inventory_file_is_read_as_groups_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("inv");
        write(&root, "group_vars/web.yml", "port: 80\n");
        write(&root, "group_vars/db.yml", "port: 5432\n");
        write(&root, "hosts.ini", "[prod:children]\nweb\n\n[db]\ndb01\n");

        let file = root.join("hosts.ini");
        let options = ResolveOptions::new(file.display().to_string()).with_working_dir(tmp.path());
        let inv = load_inventory(&options, &DefaultFetcher::new(tmp.path())).unwrap();

        assert!(!inv.hosts.contains_key(&file.display().to_string()));
        assert!(inv.hosts.contains_key("db01"));
        assert_eq!(inv.groups["web"].vars["port"], 80);
        assert_eq!(inv.groups["web"].parents, vec!["prod"]);
        assert_eq!(inv.vars["inventory_name"], "inv");
        assert_eq!(inv.vars["inventory_file"], file.display().to_string());
        assert_eq!(inv.root.as_deref(), Some(root.as_path()));
    }

    #[test]
    fn test_directory_import_adds_groups() {
        let tmp = TempDir::new().unwrap();
        let fixtures = tmp.path().join("fixtures");
        write(&fixtures, "platform/group_vars/monitoring.yml", "scrape: 30s\n");
        write(&fixtures, "platform/groups", "[infra:children]\nmonitoring\n");

        let root = tmp.path().join("inv");
        write(&root, "group_vars/all.yml", "# @import platform\nenv: prod\n");

        let fetcher = DefaultFetcher::new(&fixtures);
        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));

        let inv = load_inventory(&options, &fetcher).unwrap();
        assert_eq!(inv.groups["monitoring"].vars["scrape"], "30s");
        assert_eq!(inv.groups["monitoring"].parents, vec!["infra"]);
        assert_eq!(inv.groups["all"].vars["env"], "prod");
    }

    #[test]
    fn test_missing_import_target_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let fixtures = tmp.path().join("fixtures");
        write(&fixtures, "shared/common.yml", "a: 1\n");

        let root = tmp.path().join("inv");
        write(&root, "group_vars/all.yml", "# @import shared#missing.yml\n");

        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));
        let err = load_inventory(&options, &DefaultFetcher::new(&fixtures)).unwrap_err();
        assert!(matches!(err, CoreError::ImportTargetMissing { .. }));
    }

    #[test]
    fn test_failed_fetch_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("inv");
        write(&root, "group_vars/all.yml", "# @import nowhere\n");

        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));
        let err = load_inventory(&options, &DefaultFetcher::new(tmp.path())).unwrap_err();
        assert!(matches!(err, CoreError::ImportFetch { .. }));
    }

    #[test]
    fn test_self_import_cycle_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let fixtures = tmp.path().join("fixtures");
        write(&fixtures, "loop.yml", "# @import loop.yml\nlooped: true\n");

        let root = tmp.path().join("inv");
        write(&root, "group_vars/all.yml", "# @import loop.yml\n");

        let options = ResolveOptions::new(root.display().to_string())
            .with_cache_dir(tmp.path().join("cache"));
        let inv = load_inventory(&options, &DefaultFetcher::new(&fixtures)).unwrap();
        assert_eq!(inv.groups["all"].vars["looped"], true);
    }
}
