//! Containers commands - resolved images and Kubernetes manifests

use invar_core::{DefaultFetcher, ResolveOptions};
use invar_engine::Interpolator;
use invar_kube::{HarborClient, Resolution, YamlComposeLoader, cascade, prepare, render_resolution};

use crate::error::{CliError, Result};

/// Run the whole pipeline
///
/// Loading may download imports with a blocking client, so only the cascade
/// runs on the async runtime.
fn resolve(options: &ResolveOptions) -> Result<Resolution> {
    tracing::info!(inventory = %options.inventory, limit = %options.limit, "resolving containers");

    let fetcher = DefaultFetcher::new(&options.working_dir);
    let prepared = prepare(options, &fetcher, &YamlComposeLoader)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("failed to start runtime: {}", e)))?;

    let resolution: invar_kube::Result<Resolution> = runtime.block_on(async {
        let registry = HarborClient::new()?;
        cascade(prepared, &registry, options.concurrency).await
    });
    Ok(resolution?)
}

/// Print `name: tag` for every container
pub fn versions(options: &ResolveOptions) -> Result<()> {
    let resolution = resolve(options)?;
    for container in resolution.containers() {
        println!("{}: {}", container.image_name, container.image_tag);
    }
    Ok(())
}

/// Print the manifests of every container
pub fn spec(options: &ResolveOptions) -> Result<()> {
    let resolution = resolve(options)?;
    let manifests = render_resolution(&resolution, &Interpolator::new())?;
    print!("{}", manifests);
    Ok(())
}
