//! Store access for the NodePool controller
//!
//! Two traits keep the reconciler independent of the API server: one for the
//! NodePool and the objects it reads, one for the generated CAPI resources.
//! Not-found reads map to `Ok(None)`.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use fleet_capi::constants::{IMAGE_SOURCE_API_VERSION, MACHINE_SET_KIND};
use fleet_capi::{build_api_resource, CAPIManifest};
use fleet_common::crd::{
    HostedCluster, Infrastructure, NodePool, NodePoolStatus, INFRASTRUCTURE_SINGLETON_NAME,
};
use fleet_common::error::is_not_found;
use fleet_common::{Error, FIELD_MANAGER};

/// Access to NodePools and the objects they depend on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodePoolClient: Send + Sync {
    /// Get a NodePool
    async fn get_node_pool(&self, namespace: &str, name: &str)
        -> Result<Option<NodePool>, Error>;

    /// Get the HostedCluster a NodePool belongs to
    async fn get_hosted_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HostedCluster>, Error>;

    /// Get the platform Infrastructure singleton
    async fn get_infrastructure(&self) -> Result<Option<Infrastructure>, Error>;

    /// Add a finalizer to a NodePool (no-op if present)
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a NodePool (no-op if absent)
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Merge-patch the NodePool object (not its status)
    ///
    /// Only the fields present in `patch` are written.
    async fn patch_node_pool(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error>;

    /// Write the NodePool status subresource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NodePoolStatus,
    ) -> Result<(), Error>;
}

/// Access to generated CAPI resources and the image sources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CapiClient: Send + Sync {
    /// List machine sets whose AMI seeds new pools, in list order
    async fn list_image_sources(&self, namespace: &str) -> Result<Vec<DynamicObject>, Error>;

    /// Get a generated resource
    async fn get_manifest(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CAPIManifest>, Error>;

    /// Create a resource, returning the stored object
    async fn create_manifest(&self, manifest: &CAPIManifest) -> Result<CAPIManifest, Error>;

    /// Merge-patch the resource `manifest` names, returning the stored object
    async fn patch_manifest(
        &self,
        manifest: &CAPIManifest,
        patch: &serde_json::Value,
    ) -> Result<CAPIManifest, Error>;

    /// Delete a resource; `Ok(false)` when it was already absent
    async fn delete_manifest(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<bool, Error>;
}

/// Real NodePool client backed by the API server
pub struct NodePoolClientImpl {
    client: Client,
}

impl NodePoolClientImpl {
    /// Create a new NodePoolClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn node_pools(&self, namespace: &str) -> Api<NodePool> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        edit: impl FnOnce(&mut Vec<String>) -> bool + Send,
    ) -> Result<(), Error> {
        let api = self.node_pools(namespace);
        let node_pool = api.get(name).await?;
        let mut finalizers = node_pool.metadata.finalizers.unwrap_or_default();
        if !edit(&mut finalizers) {
            return Ok(());
        }

        // resourceVersion makes the patch fail on a concurrent finalizer edit
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": node_pool.metadata.resource_version,
            }
        });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NodePoolClient for NodePoolClientImpl {
    async fn get_node_pool(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<NodePool>, Error> {
        match self.node_pools(namespace).get(name).await {
            Ok(np) => Ok(Some(np)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_hosted_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<HostedCluster>, Error> {
        let api: Api<HostedCluster> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(hc) => Ok(Some(hc)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_infrastructure(&self) -> Result<Option<Infrastructure>, Error> {
        let api: Api<Infrastructure> = Api::all(self.client.clone());
        match api.get(INFRASTRUCTURE_SINGLETON_NAME).await {
            Ok(infra) => Ok(Some(infra)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        self.patch_finalizers(namespace, name, |finalizers| {
            if finalizers.iter().any(|f| f == finalizer) {
                return false;
            }
            finalizers.push(finalizer.to_string());
            true
        })
        .await
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        self.patch_finalizers(namespace, name, |finalizers| {
            let before = finalizers.len();
            finalizers.retain(|f| f != finalizer);
            finalizers.len() != before
        })
        .await
    }

    async fn patch_node_pool(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), Error> {
        self.node_pools(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &NodePoolStatus,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "status": status });
        self.node_pools(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Real CAPI client using DynamicObject for untyped resources
pub struct CapiClientImpl {
    client: Client,
}

impl CapiClientImpl {
    /// Create a new CapiClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, api_version: &str, kind: &str, namespace: &str) -> Api<DynamicObject> {
        let ar = build_api_resource(api_version, kind);
        Api::namespaced_with(self.client.clone(), namespace, &ar)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CapiClient for CapiClientImpl {
    async fn list_image_sources(&self, namespace: &str) -> Result<Vec<DynamicObject>, Error> {
        let list = self
            .api(IMAGE_SOURCE_API_VERSION, MACHINE_SET_KIND, namespace)
            .list(&ListParams::default())
            .await?;
        debug!(namespace = %namespace, count = list.items.len(), "Listed image sources");
        Ok(list.items)
    }

    async fn get_manifest(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CAPIManifest>, Error> {
        match self.api(api_version, kind, namespace).get(name).await {
            Ok(obj) => CAPIManifest::from_dynamic_object(obj).map(Some),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_manifest(&self, manifest: &CAPIManifest) -> Result<CAPIManifest, Error> {
        let obj = manifest.to_dynamic_object()?;
        let created = self
            .api(&manifest.api_version, &manifest.kind, manifest.namespace())
            .create(&Self::post_params(), &obj)
            .await?;
        info!(kind = %manifest.kind, name = %manifest.metadata.name, "Created CAPI resource");
        CAPIManifest::from_dynamic_object(created)
    }

    async fn patch_manifest(
        &self,
        manifest: &CAPIManifest,
        patch: &serde_json::Value,
    ) -> Result<CAPIManifest, Error> {
        let patched = self
            .api(&manifest.api_version, &manifest.kind, manifest.namespace())
            .patch(
                &manifest.metadata.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await?;
        info!(kind = %manifest.kind, name = %manifest.metadata.name, "Updated CAPI resource");
        CAPIManifest::from_dynamic_object(patched)
    }

    async fn delete_manifest(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<bool, Error> {
        match self
            .api(api_version, kind, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => {
                debug!(kind = %kind, name = %name, "Already deleted");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
