//! List command - every group's variables as JSON

use invar_core::{
    DefaultFetcher, ResolveOptions, VarMap, apply_limit, load_inventory, merge_groups,
};
use invar_engine::Interpolator;
use std::collections::BTreeMap;

use crate::error::{CliError, Result};

/// Run the list command
///
/// Same shape as `ansible-inventory --list`: group name -> variables.
pub fn run(options: &ResolveOptions) -> Result<()> {
    tracing::info!(inventory = %options.inventory, limit = %options.limit, "listing groups");

    let fetcher = DefaultFetcher::new(&options.working_dir);
    let mut inventory = load_inventory(options, &fetcher)?;
    merge_groups(&mut inventory);
    Interpolator::new().interpolate_inventory(&mut inventory);
    apply_limit(&mut inventory);

    let groups: BTreeMap<&str, &VarMap> = inventory
        .groups
        .iter()
        .map(|(name, group)| (name.as_str(), &group.vars))
        .collect();

    let json = serde_json::to_string(&groups)
        .map_err(|e| CliError::internal(format!("failed to serialize groups: {}", e)))?;
    println!("{}", json);

    Ok(())
}
