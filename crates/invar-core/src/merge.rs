//! Hierarchy merge and limit filtering
//!
//! Precedence, lowest first:
//! inventory metadata, `all`, inherited parents (later parents win),
//! the group's own variables, extra variables.

use std::collections::{BTreeMap, BTreeSet};

use crate::inventory::{ALL_GROUP, Inventory};
use crate::values::{VarMap, overlay};

/// Declared state of one group, captured before anything is written back
struct Declared {
    parents: Vec<String>,
    vars: VarMap,
}

/// Replace every group's variables with its effective variables
///
/// Inheritance is transitive and computed from a snapshot of the declared
/// maps, so the result does not depend on the order groups are visited in.
/// Running the merge twice yields the same maps.
pub fn merge_groups(inventory: &mut Inventory) {
    for (child, parents) in inventory.pending_links() {
        tracing::warn!(
            group = child,
            parents = ?parents,
            "children link to a group that was never declared"
        );
    }

    let snapshot: BTreeMap<String, Declared> = inventory
        .groups
        .iter()
        .map(|(name, group)| {
            (
                name.clone(),
                Declared {
                    parents: group.parents.clone(),
                    vars: group.vars.clone(),
                },
            )
        })
        .collect();

    let mut base = inventory.vars.clone();
    if let Some(all) = snapshot.get(ALL_GROUP) {
        overlay(&mut base, &all.vars);
    }

    let mut memo: BTreeMap<String, VarMap> = BTreeMap::new();
    let mut warned: BTreeSet<String> = BTreeSet::new();

    for (name, group) in inventory.groups.iter_mut() {
        let mut vars = base.clone();
        let inherited = inherited_vars(name, &snapshot, &mut Vec::new(), &mut memo, &mut warned);
        overlay(&mut vars, &inherited);
        if let Some(declared) = snapshot.get(name) {
            overlay(&mut vars, &declared.vars);
        }
        overlay(&mut vars, &inventory.extra_vars);
        group.vars = vars;
    }
}

/// Variables a group receives from its ancestors
fn inherited_vars(
    name: &str,
    snapshot: &BTreeMap<String, Declared>,
    stack: &mut Vec<String>,
    memo: &mut BTreeMap<String, VarMap>,
    warned: &mut BTreeSet<String>,
) -> VarMap {
    if let Some(cached) = memo.get(name) {
        return cached.clone();
    }

    let mut vars = VarMap::new();
    let Some(declared) = snapshot.get(name) else {
        return vars;
    };

    stack.push(name.to_string());
    let mut complete = true;
    for parent in &declared.parents {
        let Some(parent_decl) = snapshot.get(parent) else {
            if warned.insert(format!("{}->{}", name, parent)) {
                tracing::warn!(group = name, parent = %parent, "missing parent group, ignoring link");
            }
            continue;
        };
        if stack.iter().any(|s| s == parent) {
            if warned.insert(format!("cycle:{}->{}", name, parent)) {
                tracing::warn!(group = name, parent = %parent, "parent cycle, ignoring link");
            }
            complete = false;
            continue;
        }

        let ancestors = inherited_vars(parent, snapshot, stack, memo, warned);
        overlay(&mut vars, &ancestors);
        overlay(&mut vars, &parent_decl.vars);
    }
    stack.pop();

    // results computed while a cycle was being cut depend on the entry point
    if complete && stack.is_empty() {
        memo.insert(name.to_string(), vars.clone());
    }
    vars
}

/// Names kept by a colon separated limit, `None` when nothing is filtered
pub fn limit_names(limit: &str) -> Option<BTreeSet<&str>> {
    let names: BTreeSet<&str> = limit
        .split(':')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() { None } else { Some(names) }
}

/// Delete every group not named by the inventory's limit
pub fn apply_limit(inventory: &mut Inventory) {
    let Some(keep) = limit_names(&inventory.limit) else {
        return;
    };

    inventory.groups.retain(|name, _| {
        let kept = keep.contains(name.as_str());
        if !kept {
            tracing::info!(group = %name, "excluding");
        }
        kept
    });
}
