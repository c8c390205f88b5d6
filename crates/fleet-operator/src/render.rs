//! `render` subcommand

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use fleet_render::{render_cluster_manifests, ReleaseInfo, TemplateSource};

use crate::cli::RenderArgs;

/// Render manifests from files on disk into the output directory
pub fn run_render(args: &RenderArgs) -> anyhow::Result<()> {
    let templates = TemplateSource::from_dir(&args.templates)?;
    let params: serde_yaml::Value = read_document(&args.params)?;
    let release: ReleaseInfo = read_document(&args.release)?;

    let manifests = render_cluster_manifests(
        &params,
        &release,
        &args.pki_dir,
        &args.pull_secret,
        &templates,
    )?;
    let written = manifests.write_to(&args.output)?;

    tracing::info!(
        output = %args.output.display(),
        count = written.len(),
        "Rendered control-plane manifests"
    );
    Ok(())
}

/// Read a YAML (or JSON, which is YAML) document
fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    serde_yaml::from_str(&text)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))
}
