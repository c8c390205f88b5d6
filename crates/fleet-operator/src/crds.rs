//! CRD installation and printing
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! the stored schema always matches the running binary. The Infrastructure
//! singleton belongs to the platform and is only read.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use fleet_common::crd::{HostedCluster, HostedControlPlane, NodePool};
use fleet_common::FIELD_MANAGER;

/// CRD definition with name and resource
struct CrdDef {
    name: String,
    crd: CustomResourceDefinition,
}

impl CrdDef {
    fn of<K: CustomResourceExt>() -> Self {
        Self {
            name: K::crd_name().to_string(),
            crd: K::crd(),
        }
    }
}

fn owned_crds() -> Vec<CrdDef> {
    vec![
        CrdDef::of::<NodePool>(),
        CrdDef::of::<HostedCluster>(),
        CrdDef::of::<HostedControlPlane>(),
    ]
}

/// Install or update every owned CRD
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for def in owned_crds() {
        tracing::info!(crd = %def.name, "Installing CRD");
        crds.patch(&def.name, &params, &Patch::Apply(&def.crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    tracing::info!("All fleet CRDs installed/updated");
    Ok(())
}

/// Owned CRDs as a multi-document YAML stream
pub fn crds_yaml() -> anyhow::Result<String> {
    let docs = owned_crds()
        .into_iter()
        .map(|def| {
            serde_yaml::to_string(&def.crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize {} CRD: {}", def.name, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}
