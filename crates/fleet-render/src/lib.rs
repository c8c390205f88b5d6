//! Control-plane manifest rendering for hosted clusters
//!
//! Renders a fixed table of control-plane component templates with
//! [`minijinja`] into manifest files, wrapping in-cluster manifests and
//! ignition configs into ConfigMaps.

#![deny(missing_docs)]

pub mod components;
pub mod error;
pub mod functions;
pub mod renderer;
pub mod source;

pub use error::RenderError;
pub use renderer::{render_cluster_manifests, ReleaseInfo, RenderedManifests};
pub use source::TemplateSource;
