//! Invar Kube - containers and Kubernetes manifests from inventories
//!
//! This crate provides:
//! - **Declarations**: inline `containers` and compose files as container sources
//! - **Defaults Cascade**: fills every container from its group's `container_defaults`
//! - **Tag Resolution**: version pins and Harbor lookups for `latest` images
//! - **Pipeline**: load, merge, interpolate, cascade and limit in one run
//! - **Manifests**: ConfigMaps, Deployments, Services and Ingresses

pub mod cascade;
pub mod compose;
pub mod container;
pub mod defaults;
pub mod error;
pub mod image;
pub mod manifest;
pub mod pipeline;
pub mod quantity;
pub mod registry;
pub mod versions;

pub use cascade::{GroupContext, apply_defaults, resolve_container, resolve_image};
pub use compose::{ComposeLoader, ComposeService, YamlComposeLoader};
pub use container::{Container, ContainerDeclaration, ContainerPort, Probe, ProbeTiming};
pub use defaults::ContainerDefaults;
pub use error::{KubeError, Result};
pub use image::{ImageRef, derive_name};
pub use manifest::{ManifestRenderer, Manifests, render_resolution};
pub use pipeline::{Prepared, Resolution, ResolvedGroup, cascade, prepare};
pub use registry::{HarborClient, RegistryTags, TagInfo, TagLookup, pick_latest_tag};
pub use versions::{load_image_versions, pinned_tag};
