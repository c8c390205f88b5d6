//! NodePool controller implementation
//!
//! Each pass re-derives everything from the NodePool as currently stored and
//! the generated resources as currently stored, then converges the latter:
//!
//! `load -> resolve_context -> (handle_deletion | ensure_finalizer) -> converge -> persist`
//!
//! where `converge` resolves the scaling mode, compiles the machine
//! resources, upserts them and updates status. Spec and status changes made
//! on the working copy are written once at the end of the pass, including
//! after a failed pass so status shows the latest known condition.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use fleet_capi::constants::{
    AWS_API_VERSION, AWS_MACHINE_TEMPLATE_KIND, CAPI_CLUSTER_API_VERSION, MACHINE_SET_KIND,
};
use fleet_capi::{compile, machine_set_name, resolve_image, ClusterContext, GeneratedResourceSet};
use fleet_common::backoff::{BackoffConfig, FailureTracker};
use fleet_common::crd::{HostedCluster, NodePool};
use fleet_common::events::{EventPublisher, KubeEventPublisher, NodePoolEvent};
use fleet_common::{Error, Result, DEFAULT_IMAGE_SOURCE_NAMESPACE, NODEPOOL_FINALIZER};

use crate::client::{CapiClient, CapiClientImpl, NodePoolClient, NodePoolClientImpl};
use crate::mode::{resolve_mode, ScalingMode};
use crate::status::{autoscaling_condition, set_condition, validation_failed_condition};
use crate::upsert::{create_or_update, machine_set_patch, template_patch, UpsertOutcome};

/// Reporting component name for Events
pub const CONTROLLER_NAME: &str = "fleet-nodepool-controller";

/// Requeue interval while a fixed-size pool waits for its nodes
pub const DEFAULT_CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shared context for the NodePool controller
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client)
///     .image_source_namespace("openshift-machine-api")
///     .build();
/// ```
pub struct Context {
    /// NodePool store access (trait object for testability)
    pub node_pools: Arc<dyn NodePoolClient>,
    /// Generated resource store access
    pub capi: Arc<dyn CapiClient>,
    /// Event publisher for NodePool events
    pub events: Arc<dyn EventPublisher>,
    /// Consecutive failure counts driving the error backoff
    pub backoff: FailureTracker,
    /// Namespace scanned for image-source machine sets
    pub image_source_namespace: String,
    /// Requeue interval while a fixed-size pool converges
    pub convergence_poll_interval: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(node_pools: Arc<dyn NodePoolClient>, capi: Arc<dyn CapiClient>) -> Self {
        Self {
            node_pools,
            capi,
            events: Arc::new(fleet_common::events::NoopEventPublisher),
            backoff: FailureTracker::new(BackoffConfig::default()),
            image_source_namespace: DEFAULT_IMAGE_SOURCE_NAMESPACE.to_string(),
            convergence_poll_interval: DEFAULT_CONVERGENCE_POLL_INTERVAL,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    node_pools: Option<Arc<dyn NodePoolClient>>,
    capi: Option<Arc<dyn CapiClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    backoff: BackoffConfig,
    image_source_namespace: String,
    convergence_poll_interval: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            node_pools: None,
            capi: None,
            events: None,
            backoff: BackoffConfig::default(),
            image_source_namespace: DEFAULT_IMAGE_SOURCE_NAMESPACE.to_string(),
            convergence_poll_interval: DEFAULT_CONVERGENCE_POLL_INTERVAL,
        }
    }

    /// Override the NodePool client
    pub fn node_pool_client(mut self, node_pools: Arc<dyn NodePoolClient>) -> Self {
        self.node_pools = Some(node_pools);
        self
    }

    /// Override the CAPI client
    pub fn capi_client(mut self, capi: Arc<dyn CapiClient>) -> Self {
        self.capi = Some(capi);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the error backoff bounds
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the namespace scanned for image sources
    pub fn image_source_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.image_source_namespace = namespace.into();
        self
    }

    /// Set the requeue interval for converging fixed-size pools
    pub fn convergence_poll_interval(mut self, interval: Duration) -> Self {
        self.convergence_poll_interval = interval;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            node_pools: self
                .node_pools
                .unwrap_or_else(|| Arc::new(NodePoolClientImpl::new(self.client.clone()))),
            capi: self
                .capi
                .unwrap_or_else(|| Arc::new(CapiClientImpl::new(self.client.clone()))),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            backoff: FailureTracker::new(self.backoff),
            image_source_namespace: self.image_source_namespace,
            convergence_poll_interval: self.convergence_poll_interval,
        }
    }
}

/// Identity of a NodePool for logging and backoff (`namespace/name`)
pub fn identity(node_pool: &NodePool) -> String {
    format!(
        "{}/{}",
        node_pool.namespace().unwrap_or_default(),
        node_pool.name_any()
    )
}

/// Reconcile a NodePool
///
/// Returns `await_change` when there is nothing left to do, a requeue while
/// a fixed-size pool waits for its nodes, or an error for [`error_policy`].
#[instrument(skip(node_pool, ctx), fields(node_pool = %identity(&node_pool)))]
pub async fn reconcile(node_pool: Arc<NodePool>, ctx: Arc<Context>) -> Result<Action> {
    info!(
        autoscaling = node_pool.spec.is_autoscaling_enabled(),
        "reconciling node pool"
    );

    match reconcile_pass(&node_pool, &ctx).await {
        Ok(action) => {
            ctx.backoff.reset(&identity(&node_pool));
            Ok(action)
        }
        Err(e) => {
            let event = match &e {
                Error::Validation { message, .. } => NodePoolEvent::ValidationFailed {
                    message: message.clone(),
                },
                other => NodePoolEvent::ReconcileFailed {
                    message: other.to_string(),
                },
            };
            ctx.events.publish(&node_pool.object_ref(&()), event).await;
            Err(e)
        }
    }
}

/// Decide when to retry a failed pass
///
/// Errors that need a spec change wait for one. Everything else backs off
/// exponentially per NodePool.
pub fn error_policy(node_pool: Arc<NodePool>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = identity(&node_pool);

    if !error.is_retryable() {
        warn!(?error, node_pool = %key, "reconciliation failed, waiting for spec change");
        return Action::await_change();
    }

    let delay = ctx.backoff.record_failure(&key);
    error!(
        ?error,
        node_pool = %key,
        retry_in_ms = delay.as_millis() as u64,
        "reconciliation failed"
    );
    Action::requeue(delay)
}

async fn reconcile_pass(trigger: &NodePool, ctx: &Context) -> Result<Action> {
    let loaded = match load(trigger, ctx).await? {
        ControlFlow::Continue(node_pool) => node_pool,
        ControlFlow::Break(action) => return Ok(action),
    };

    let pool_ctx = resolve_context(&loaded, ctx).await?;

    if let ControlFlow::Break(action) = branch_on_deletion(&loaded, &pool_ctx, ctx).await? {
        return Ok(action);
    }

    ensure_finalizer(&loaded, ctx).await?;

    let mut working = loaded.clone();
    let converged = converge(&mut working, &pool_ctx, ctx).await;
    if converged.is_ok() {
        working
            .status
            .get_or_insert_with(Default::default)
            .observed_generation = loaded.metadata.generation;
    }

    match (converged, persist(&loaded, &working, ctx).await) {
        (Ok(action), Ok(())) => Ok(action),
        (Ok(_), Err(persist_err)) => Err(persist_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(persist_err)) => {
            warn!(error = %persist_err, "failed to persist node pool after reconcile error");
            Err(e)
        }
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Fetch the NodePool as currently stored; a vanished pool ends the pass
async fn load(trigger: &NodePool, ctx: &Context) -> Result<ControlFlow<Action, NodePool>> {
    let namespace = trigger.namespace().unwrap_or_default();
    let name = trigger.name_any();

    match ctx.node_pools.get_node_pool(&namespace, &name).await? {
        Some(node_pool) => Ok(ControlFlow::Continue(node_pool)),
        None => {
            debug!("node pool not found, nothing to do");
            Ok(ControlFlow::Break(Action::await_change()))
        }
    }
}

/// Owning cluster and infrastructure facts for one pass
struct PoolContext {
    hosted_cluster: Option<HostedCluster>,
    infra_name: String,
    region: Option<String>,
    target_namespace: String,
}

impl PoolContext {
    fn resource_name(&self, node_pool: &NodePool) -> String {
        machine_set_name(
            &self.infra_name,
            &node_pool.spec.cluster_name,
            &node_pool.name_any(),
        )
    }
}

/// Read the owning HostedCluster and the Infrastructure singleton
///
/// A missing HostedCluster is tolerated here so a pool can still be cleaned
/// up after its cluster is gone; [`converge`] requires it.
async fn resolve_context(node_pool: &NodePool, ctx: &Context) -> Result<PoolContext> {
    let key = identity(node_pool);
    let namespace = node_pool.namespace().unwrap_or_default();
    let cluster_name = &node_pool.spec.cluster_name;

    let hosted_cluster = ctx
        .node_pools
        .get_hosted_cluster(&namespace, cluster_name)
        .await
        .map_err(|e| {
            Error::context_resolution(&key, format!("failed to get hosted cluster {cluster_name}: {e}"))
        })?;

    let infra = ctx
        .node_pools
        .get_infrastructure()
        .await
        .map_err(|e| Error::context_resolution(&key, format!("failed to get infrastructure: {e}")))?
        .ok_or_else(|| Error::context_resolution(&key, "infrastructure singleton not found"))?;

    let infra_name = infra
        .infrastructure_name()
        .ok_or_else(|| Error::context_resolution(&key, "infrastructure has no infrastructureName"))?
        .to_string();

    // The HostedCluster's name is the namespace of its machine resources
    let target_namespace = hosted_cluster
        .as_ref()
        .map(|hc| hc.name_any())
        .unwrap_or_else(|| cluster_name.clone());

    Ok(PoolContext {
        region: infra.aws_region().map(str::to_string),
        hosted_cluster,
        infra_name,
        target_namespace,
    })
}

async fn branch_on_deletion(
    node_pool: &NodePool,
    pool_ctx: &PoolContext,
    ctx: &Context,
) -> Result<ControlFlow<Action>> {
    if node_pool.metadata.deletion_timestamp.is_none() {
        return Ok(ControlFlow::Continue(()));
    }
    handle_deletion(node_pool, pool_ctx, ctx)
        .await
        .map(ControlFlow::Break)
}

/// Delete the machine set, then its template, then release the finalizer
///
/// Already-absent resources count as deleted. The finalizer stays until both
/// deletes succeed.
async fn handle_deletion(
    node_pool: &NodePool,
    pool_ctx: &PoolContext,
    ctx: &Context,
) -> Result<Action> {
    let name = pool_ctx.resource_name(node_pool);
    let namespace = &pool_ctx.target_namespace;

    for (api_version, kind) in [
        (CAPI_CLUSTER_API_VERSION, MACHINE_SET_KIND),
        (AWS_API_VERSION, AWS_MACHINE_TEMPLATE_KIND),
    ] {
        let deleted = ctx
            .capi
            .delete_manifest(api_version, kind, namespace, &name)
            .await
            .map_err(|e| Error::deletion(kind, &name, e))?;
        if deleted {
            info!(kind, name = %name, namespace = %namespace, "Deleted owned resource");
        }
    }

    if has_finalizer(node_pool) {
        ctx.node_pools
            .remove_finalizer(
                &node_pool.namespace().unwrap_or_default(),
                &node_pool.name_any(),
                NODEPOOL_FINALIZER,
            )
            .await?;
        ctx.events
            .publish(
                &node_pool.object_ref(&()),
                NodePoolEvent::Deleted {
                    namespace: namespace.clone(),
                    name: name.clone(),
                },
            )
            .await;
    }

    info!(machine_set = %name, "node pool cleanup complete");
    Ok(Action::await_change())
}

/// Add the finalizer before anything is created
async fn ensure_finalizer(node_pool: &NodePool, ctx: &Context) -> Result<()> {
    if has_finalizer(node_pool) {
        return Ok(());
    }
    info!("adding finalizer");
    ctx.node_pools
        .add_finalizer(
            &node_pool.namespace().unwrap_or_default(),
            &node_pool.name_any(),
            NODEPOOL_FINALIZER,
        )
        .await
}

/// Resolve mode, compile, upsert and update status on the working copy
async fn converge(
    working: &mut NodePool,
    pool_ctx: &PoolContext,
    ctx: &Context,
) -> Result<Action> {
    let key = identity(working);

    let hosted_cluster = pool_ctx.hosted_cluster.as_ref().ok_or_else(|| {
        Error::context_resolution(
            &key,
            format!("hosted cluster {} not found", working.spec.cluster_name),
        )
    })?;
    ensure_owner_reference(working, hosted_cluster);

    let mode = match resolve_mode(&key, &mut working.spec) {
        Ok(mode) => mode,
        Err(e) => {
            let message = match &e {
                Error::Validation { message, .. } => message.clone(),
                other => other.to_string(),
            };
            warn!(error = %message, "autoscaling validation failed");
            let status = working.status.get_or_insert_with(Default::default);
            set_condition(&mut status.conditions, validation_failed_condition(message));
            return Err(e);
        }
    };

    let region = pool_ctx.region.clone().ok_or_else(|| {
        Error::context_resolution(&key, "infrastructure has no AWS region")
    })?;

    let sources = ctx
        .capi
        .list_image_sources(&ctx.image_source_namespace)
        .await
        .map_err(|e| {
            Error::image_resolution(
                &ctx.image_source_namespace,
                format!("failed to list machinesets: {e}"),
            )
        })?;
    let image_id = resolve_image(&sources, &ctx.image_source_namespace)?;

    let cluster_ctx = ClusterContext {
        infra_name: pool_ctx.infra_name.clone(),
        region,
        image_id,
        target_namespace: pool_ctx.target_namespace.clone(),
    };

    let replicas = mode.initial_replicas();
    debug!(
        autoscaling = mode.is_autoscaling(),
        replicas,
        image = %cluster_ctx.image_id,
        "compiling machine resources"
    );
    let GeneratedResourceSet { template, group } = compile(working, &cluster_ctx, replicas)?;

    create_or_update(ctx.capi.as_ref(), &template, &template_patch(&template)).await?;
    let (outcome, stored_group) =
        create_or_update(ctx.capi.as_ref(), &group, &machine_set_patch(&group, &mode)).await?;

    if outcome == UpsertOutcome::Created {
        ctx.events
            .publish(
                &working.object_ref(&()),
                NodePoolEvent::ComputeGroupCreated {
                    namespace: cluster_ctx.target_namespace.clone(),
                    name: group.metadata.name.clone(),
                    replicas,
                },
            )
            .await;
    }

    Ok(update_status(working, &mode, &stored_group, ctx))
}

/// Record observed replicas and the autoscaling condition, decide requeue
fn update_status(
    working: &mut NodePool,
    mode: &ScalingMode,
    stored_group: &fleet_capi::CAPIManifest,
    ctx: &Context,
) -> Action {
    let observed = stored_group.available_replicas();
    let status = working.status.get_or_insert_with(Default::default);
    status.node_count = observed;
    set_condition(&mut status.conditions, autoscaling_condition(mode));

    match mode {
        ScalingMode::Fixed { replicas } if observed != *replicas => {
            info!(
                expected = *replicas,
                available = observed,
                "waiting for machine set to converge"
            );
            Action::requeue(ctx.convergence_poll_interval)
        }
        _ => {
            debug!(available = observed, "node pool converged");
            Action::await_change()
        }
    }
}

/// Write spec and status changes made during the pass
async fn persist(loaded: &NodePool, working: &NodePool, ctx: &Context) -> Result<()> {
    if let Some(patch) = changed_fields_patch(loaded, working) {
        debug!(%patch, "persisting node pool fields");
        ctx.node_pools
            .patch_node_pool(
                &working.namespace().unwrap_or_default(),
                &working.name_any(),
                &patch,
            )
            .await?;
    }

    if loaded.status != working.status {
        debug!("persisting node pool status");
        let status = working.status.clone().unwrap_or_default();
        ctx.node_pools
            .patch_status(
                &working.namespace().unwrap_or_default(),
                &working.name_any(),
                &status,
            )
            .await?;
    }

    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Merge patch holding only the NodePool fields a pass changes
///
/// A pass clears `spec.nodeCount` and maintains the owner reference. Nothing
/// else is sent, so edits made to the pool during the pass survive.
fn changed_fields_patch(loaded: &NodePool, working: &NodePool) -> Option<serde_json::Value> {
    let mut patch = serde_json::Map::new();
    if loaded.spec.node_count != working.spec.node_count {
        patch.insert(
            "spec".to_string(),
            serde_json::json!({ "nodeCount": working.spec.node_count }),
        );
    }
    if loaded.metadata.owner_references != working.metadata.owner_references {
        patch.insert(
            "metadata".to_string(),
            serde_json::json!({ "ownerReferences": working.metadata.owner_references }),
        );
    }
    (!patch.is_empty()).then_some(serde_json::Value::Object(patch))
}

fn has_finalizer(node_pool: &NodePool) -> bool {
    node_pool.finalizers().iter().any(|f| f == NODEPOOL_FINALIZER)
}

/// Point the NodePool at its HostedCluster so it is collected with it
fn ensure_owner_reference(node_pool: &mut NodePool, hosted_cluster: &HostedCluster) {
    let owner = OwnerReference {
        api_version: HostedCluster::api_version(&()).into_owned(),
        kind: HostedCluster::kind(&()).into_owned(),
        name: hosted_cluster.name_any(),
        uid: hosted_cluster.uid().unwrap_or_default(),
        ..Default::default()
    };

    let refs = node_pool
        .metadata
        .owner_references
        .get_or_insert_with(Vec::new);
    match refs
        .iter_mut()
        .find(|r| r.kind == owner.kind && r.name == owner.name && same_group(r, &owner))
    {
        Some(existing) => {
            if existing.uid != owner.uid || existing.api_version != owner.api_version {
                existing.uid = owner.uid;
                existing.api_version = owner.api_version;
            }
        }
        None => refs.push(owner),
    }
}

fn same_group(a: &OwnerReference, b: &OwnerReference) -> bool {
    let group = |r: &OwnerReference| r.api_version.split('/').next().map(str::to_string);
    group(a) == group(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fleet_capi::constants::{
        AUTOSCALER_MAX_SIZE_ANNOTATION, AUTOSCALER_MIN_SIZE_ANNOTATION,
        EXCLUDE_NODE_DRAINING_ANNOTATION,
    };
    use fleet_capi::CAPIManifest;
    use fleet_common::crd::{
        AwsNodePoolPlatform, ConditionStatus, HostedClusterSpec, Infrastructure,
        LocalObjectReference, NodePoolAutoScaling, NodePoolPlatform, NodePoolSpec, NodePoolStatus,
        AS_EXPECTED_REASON, AUTOSCALING_ENABLED_CONDITION, VALIDATION_FAILED_REASON,
    };
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::DynamicObject;
    use serde_json::{json, Value};

    use crate::client::MockNodePoolClient;
    use crate::upsert::apply_merge_patch;

    // =========================================================================
    // In-memory stores
    // =========================================================================

    /// CAPI store holding manifests in memory and logging every write
    #[derive(Default)]
    struct FakeCapi {
        objects: Mutex<BTreeMap<(String, String, String), CAPIManifest>>,
        image_sources: Vec<DynamicObject>,
        writes: Mutex<Vec<String>>,
        fail_deletes: bool,
    }

    impl FakeCapi {
        fn with_image(ami: &str) -> Self {
            Self {
                image_sources: vec![image_source(ami)],
                ..Default::default()
            }
        }

        fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<CAPIManifest> {
            self.objects
                .lock()
                .expect("mutex should not be poisoned")
                .get(&key(kind, namespace, name))
                .cloned()
        }

        fn insert(&self, manifest: CAPIManifest) {
            self.objects.lock().expect("mutex should not be poisoned").insert(
                key(&manifest.kind, manifest.namespace(), &manifest.metadata.name),
                manifest,
            );
        }

        fn set_available(&self, namespace: &str, name: &str, available: u32) {
            let mut objects = self.objects.lock().expect("mutex should not be poisoned");
            if let Some(group) = objects.get_mut(&key(MACHINE_SET_KIND, namespace, name)) {
                group.status = Some(serde_json::json!({ "availableReplicas": available }));
            }
        }

        fn writes(&self) -> Vec<String> {
            self.writes.lock().expect("mutex should not be poisoned").clone()
        }

        fn clear_writes(&self) {
            self.writes.lock().expect("mutex should not be poisoned").clear();
        }

        fn log(&self, entry: String) {
            self.writes.lock().expect("mutex should not be poisoned").push(entry);
        }
    }

    fn key(kind: &str, namespace: &str, name: &str) -> (String, String, String) {
        (kind.to_string(), namespace.to_string(), name.to_string())
    }

    #[async_trait]
    impl CapiClient for FakeCapi {
        async fn list_image_sources(&self, _namespace: &str) -> Result<Vec<DynamicObject>> {
            Ok(self.image_sources.clone())
        }

        async fn get_manifest(
            &self,
            _api_version: &str,
            kind: &str,
            namespace: &str,
            name: &str,
        ) -> Result<Option<CAPIManifest>> {
            Ok(self.get(kind, namespace, name))
        }

        async fn create_manifest(&self, manifest: &CAPIManifest) -> Result<CAPIManifest> {
            if self
                .get(&manifest.kind, manifest.namespace(), &manifest.metadata.name)
                .is_some()
            {
                return Err(Error::internal("already exists"));
            }
            let mut stored = manifest.clone();
            stored.metadata.resource_version = Some("1".to_string());
            self.insert(stored.clone());
            self.log(format!("create {}", manifest.kind));
            Ok(stored)
        }

        async fn patch_manifest(
            &self,
            manifest: &CAPIManifest,
            patch: &Value,
        ) -> Result<CAPIManifest> {
            let current = self
                .get(&manifest.kind, manifest.namespace(), &manifest.metadata.name)
                .ok_or_else(|| Error::internal("not found"))?;
            let version: u64 = current
                .metadata
                .resource_version
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let mut value = serde_json::to_value(&current).expect("manifest serializes");
            apply_merge_patch(&mut value, patch);
            let mut stored: CAPIManifest =
                serde_json::from_value(value).expect("patched manifest deserializes");
            stored.metadata.resource_version = Some((version + 1).to_string());
            self.insert(stored.clone());
            self.log(format!("patch {}", manifest.kind));
            Ok(stored)
        }

        async fn delete_manifest(
            &self,
            _api_version: &str,
            kind: &str,
            namespace: &str,
            name: &str,
        ) -> Result<bool> {
            if self.fail_deletes {
                return Err(Error::internal("connection reset"));
            }
            self.log(format!("delete {kind}"));
            Ok(self
                .objects
                .lock()
                .expect("mutex should not be poisoned")
                .remove(&key(kind, namespace, name))
                .is_some())
        }
    }

    type PoolEdit = Box<dyn FnOnce(&mut NodePool) + Send>;

    /// NodePool as the API server would hold it, updated by the mock's patches
    #[derive(Clone, Default)]
    struct PoolStore {
        pool: Arc<Mutex<Option<NodePool>>>,
        spec_patches: Arc<Mutex<Vec<Value>>>,
        status_patches: Arc<Mutex<Vec<NodePoolStatus>>>,
        edit_during_pass: Arc<Mutex<Option<PoolEdit>>>,
    }

    impl PoolStore {
        fn new(pool: NodePool) -> Self {
            let store = Self::default();
            *store.pool.lock().expect("mutex should not be poisoned") = Some(pool);
            store
        }

        fn current(&self) -> Option<NodePool> {
            self.pool.lock().expect("mutex should not be poisoned").clone()
        }

        fn edit(&self, f: impl FnOnce(&mut NodePool)) {
            if let Some(pool) = self.pool.lock().expect("mutex should not be poisoned").as_mut() {
                f(pool);
            }
        }

        /// Apply `f` to the stored pool once the next pass has loaded it
        fn edit_during_next_pass(&self, f: impl FnOnce(&mut NodePool) + Send + 'static) {
            *self
                .edit_during_pass
                .lock()
                .expect("mutex should not be poisoned") = Some(Box::new(f));
        }

        fn run_pending_edit(&self) {
            let pending = self
                .edit_during_pass
                .lock()
                .expect("mutex should not be poisoned")
                .take();
            if let Some(f) = pending {
                self.edit(f);
            }
        }

        fn spec_patches(&self) -> Vec<Value> {
            self.spec_patches.lock().expect("mutex should not be poisoned").clone()
        }

        fn status_patches(&self) -> Vec<NodePoolStatus> {
            self.status_patches.lock().expect("mutex should not be poisoned").clone()
        }

        fn last_status(&self) -> Option<NodePoolStatus> {
            self.status_patches().last().cloned()
        }
    }

    fn mock_node_pools(
        store: &PoolStore,
        hosted_cluster: Option<HostedCluster>,
        infra: Option<Infrastructure>,
    ) -> MockNodePoolClient {
        let mut mock = MockNodePoolClient::new();

        let s = store.clone();
        mock.expect_get_node_pool()
            .returning(move |_, _| Ok(s.current()));
        let s = store.clone();
        mock.expect_get_hosted_cluster().returning(move |_, _| {
            // Context is read right after the pool is loaded
            s.run_pending_edit();
            Ok(hosted_cluster.clone())
        });
        mock.expect_get_infrastructure()
            .returning(move || Ok(infra.clone()));

        let s = store.clone();
        mock.expect_add_finalizer().returning(move |_, _, finalizer| {
            let finalizer = finalizer.to_string();
            s.edit(|np| np.metadata.finalizers.get_or_insert_with(Vec::new).push(finalizer));
            Ok(())
        });
        let s = store.clone();
        mock.expect_remove_finalizer().returning(move |_, _, finalizer| {
            let finalizer = finalizer.to_string();
            s.edit(|np| {
                if let Some(f) = np.metadata.finalizers.as_mut() {
                    f.retain(|x| *x != finalizer);
                }
            });
            Ok(())
        });
        let s = store.clone();
        mock.expect_patch_node_pool().returning(move |_, _, patch| {
            s.spec_patches
                .lock()
                .expect("mutex should not be poisoned")
                .push(patch.clone());
            let patch = patch.clone();
            s.edit(|stored| {
                let mut value = serde_json::to_value(&*stored).expect("pool serializes");
                apply_merge_patch(&mut value, &patch);
                *stored = serde_json::from_value(value).expect("patched pool deserializes");
            });
            Ok(())
        });
        let s = store.clone();
        mock.expect_patch_status().returning(move |_, _, status| {
            s.status_patches
                .lock()
                .expect("mutex should not be poisoned")
                .push(status.clone());
            let status = status.clone();
            s.edit(|stored| stored.status = Some(status));
            Ok(())
        });

        mock
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn node_pool(node_count: Option<u32>, auto_scaling: Option<NodePoolAutoScaling>) -> NodePool {
        let mut np = NodePool::new(
            "p1",
            NodePoolSpec {
                cluster_name: "c1".to_string(),
                node_count,
                auto_scaling,
                platform: NodePoolPlatform {
                    aws: AwsNodePoolPlatform {
                        instance_type: "m5.large".to_string(),
                        ..Default::default()
                    },
                },
            },
        );
        np.metadata.namespace = Some("clusters".to_string());
        np.metadata.generation = Some(1);
        np
    }

    fn bounds(min: u32, max: u32) -> Option<NodePoolAutoScaling> {
        Some(NodePoolAutoScaling {
            min: Some(min),
            max: Some(max),
        })
    }

    fn hosted_cluster() -> HostedCluster {
        let mut hc = HostedCluster::new(
            "c1",
            HostedClusterSpec {
                release_image: "quay.io/release:4.8".to_string(),
                pull_secret: LocalObjectReference {
                    name: "pull-secret".to_string(),
                },
                service_cidr: None,
                pod_cidr: None,
                ssh_key: None,
                provider_creds: None,
            },
        );
        hc.metadata.namespace = Some("clusters".to_string());
        hc.metadata.uid = Some("hc-uid".to_string());
        hc
    }

    fn infrastructure() -> Infrastructure {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "config.openshift.io/v1",
            "kind": "Infrastructure",
            "metadata": { "name": "cluster" },
            "spec": {},
            "status": {
                "infrastructureName": "infra-x",
                "platformStatus": { "type": "AWS", "aws": { "region": "us-east-1" } }
            }
        }))
        .expect("valid infrastructure")
    }

    fn image_source(ami: &str) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "machine.openshift.io/v1beta1",
            "kind": "MachineSet",
            "metadata": { "name": "infra-x-worker-us-east-1a", "namespace": "openshift-machine-api" },
            "spec": { "template": { "spec": { "providerSpec": { "value": { "ami": { "id": ami } } } } } }
        }))
        .expect("valid image source")
    }

    const GROUP_NAME: &str = "infra-x-c1-p1";

    /// Publisher keeping every event for assertions
    #[derive(Default)]
    struct RecordingEvents(Mutex<Vec<NodePoolEvent>>);

    impl RecordingEvents {
        fn all(&self) -> Vec<NodePoolEvent> {
            self.0.lock().expect("mutex should not be poisoned").clone()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingEvents {
        async fn publish(&self, _node_pool: &ObjectReference, event: NodePoolEvent) {
            self.0.lock().expect("mutex should not be poisoned").push(event);
        }
    }

    struct Harness {
        store: PoolStore,
        capi: Arc<FakeCapi>,
        events: Arc<RecordingEvents>,
        ctx: Arc<Context>,
    }

    impl Harness {
        fn new(pool: NodePool) -> Self {
            Self::with(pool, Some(hosted_cluster()), FakeCapi::with_image("ami-123"))
        }

        fn with(pool: NodePool, hc: Option<HostedCluster>, capi: FakeCapi) -> Self {
            let store = PoolStore::new(pool);
            let capi = Arc::new(capi);
            let node_pools = Arc::new(mock_node_pools(&store, hc, Some(infrastructure())));
            let events = Arc::new(RecordingEvents::default());
            let mut ctx = Context::for_testing(node_pools, capi.clone());
            ctx.events = events.clone();
            Self {
                store,
                capi,
                events,
                ctx: Arc::new(ctx),
            }
        }

        async fn reconcile(&self) -> Result<Action> {
            let pool = self.store.current().expect("pool should exist");
            reconcile(Arc::new(pool), self.ctx.clone()).await
        }

        fn group(&self) -> CAPIManifest {
            self.capi
                .get(MACHINE_SET_KIND, "c1", GROUP_NAME)
                .expect("machine set should exist")
        }
    }

    // =========================================================================
    // Stories
    // =========================================================================

    mod fixed_count_pools {
        use super::*;

        /// Story: a new pool with nodeCount 2 gets a finalizer, a template and
        /// a two-replica machine set, then polls until the nodes show up
        #[tokio::test]
        async fn story_new_fixed_pool_converges() {
            let h = Harness::new(node_pool(Some(2), None));

            let action = h.reconcile().await.expect("first pass should succeed");
            assert_eq!(action, Action::requeue(DEFAULT_CONVERGENCE_POLL_INTERVAL));

            let pool = h.store.current().expect("pool");
            assert!(pool.finalizers().contains(&NODEPOOL_FINALIZER.to_string()));

            let group = h.group();
            assert_eq!(group.replicas(), Some(2));
            assert_eq!(group.metadata.annotations[EXCLUDE_NODE_DRAINING_ANNOTATION], "true");
            assert!(!group.metadata.annotations.contains_key(AUTOSCALER_MIN_SIZE_ANNOTATION));
            assert!(!group.metadata.annotations.contains_key(AUTOSCALER_MAX_SIZE_ANNOTATION));

            let template = h
                .capi
                .get(AWS_MACHINE_TEMPLATE_KIND, "c1", GROUP_NAME)
                .expect("template should exist");
            assert_eq!(
                template.spec.as_ref().expect("spec")["template"]["spec"]["ami"]["id"],
                "ami-123"
            );

            let status = h.store.last_status().expect("status written");
            assert_eq!(status.node_count, 0);
            assert_eq!(status.observed_generation, Some(1));
            let condition = status
                .condition(AUTOSCALING_ENABLED_CONDITION)
                .expect("condition set");
            assert_eq!(condition.status, ConditionStatus::False);
            assert_eq!(condition.reason, AS_EXPECTED_REASON);

            // Nodes come up
            h.capi.set_available("c1", GROUP_NAME, 2);
            let action = h.reconcile().await.expect("second pass should succeed");
            assert_eq!(action, Action::await_change());
            assert_eq!(h.store.last_status().expect("status").node_count, 2);
        }

        #[tokio::test]
        async fn mismatch_requeues_with_positive_delay() {
            let h = Harness::new(node_pool(Some(3), None));
            h.reconcile().await.expect("first pass");
            h.capi.set_available("c1", GROUP_NAME, 1);

            let action = h.reconcile().await.expect("second pass");
            assert_eq!(action, Action::requeue(DEFAULT_CONVERGENCE_POLL_INTERVAL));
            assert!(DEFAULT_CONVERGENCE_POLL_INTERVAL > Duration::ZERO);
        }

        /// Story: replaying a converged pass writes nothing
        #[tokio::test]
        async fn story_second_pass_is_idempotent() {
            let h = Harness::new(node_pool(Some(2), None));
            h.reconcile().await.expect("first pass");
            assert_eq!(
                h.capi.writes(),
                vec!["create AWSMachineTemplate", "create MachineSet"]
            );
            let first_group = h.group();
            let status_writes = h.store.status_patches().len();
            let spec_writes = h.store.spec_patches().len();

            h.capi.clear_writes();
            h.reconcile().await.expect("second pass");

            assert!(h.capi.writes().is_empty(), "unexpected writes: {:?}", h.capi.writes());
            assert_eq!(h.group(), first_group);
            assert_eq!(h.store.status_patches().len(), status_writes);
            assert_eq!(h.store.spec_patches().len(), spec_writes);
        }

        #[tokio::test]
        async fn scaling_updates_replicas_in_place() {
            let h = Harness::new(node_pool(Some(2), None));
            h.reconcile().await.expect("first pass");

            h.store.edit(|np| np.spec.node_count = Some(5));
            h.capi.clear_writes();
            h.reconcile().await.expect("second pass");

            assert_eq!(h.capi.writes(), vec!["patch MachineSet"]);
            assert_eq!(h.group().replicas(), Some(5));
        }

        /// Story: once CAPI has adopted the machine set (owner reference,
        /// finalizer, defaulted fields) a resize keeps all of it and a
        /// replayed pass writes nothing
        #[tokio::test]
        async fn story_adopted_machine_set_keeps_capi_metadata() {
            let h = Harness::new(node_pool(Some(2), None));
            h.reconcile().await.expect("first pass");

            let mut adopted = h.group();
            adopted.metadata.other.insert(
                "ownerReferences".to_string(),
                json!([{
                    "apiVersion": "cluster.x-k8s.io/v1beta1",
                    "kind": "Cluster",
                    "name": "infra-x",
                    "uid": "cluster-uid"
                }]),
            );
            adopted
                .metadata
                .other
                .insert("finalizers".to_string(), json!(["cluster.x-k8s.io/machineset"]));
            if let Some(spec) = adopted.spec.as_mut().and_then(Value::as_object_mut) {
                spec.insert("deletePolicy".to_string(), json!("Random"));
            }
            h.capi.insert(adopted);

            h.capi.clear_writes();
            h.reconcile().await.expect("replayed pass");
            assert!(h.capi.writes().is_empty(), "unexpected writes: {:?}", h.capi.writes());

            h.store.edit(|np| np.spec.node_count = Some(4));
            h.reconcile().await.expect("resize pass");

            let group = h.group();
            assert_eq!(group.replicas(), Some(4));
            assert_eq!(group.metadata.other["finalizers"], json!(["cluster.x-k8s.io/machineset"]));
            assert_eq!(group.metadata.other["ownerReferences"][0]["kind"], "Cluster");
            assert_eq!(group.spec.as_ref().expect("spec")["deletePolicy"], "Random");
        }

        #[tokio::test]
        async fn creation_is_reported_as_event() {
            let h = Harness::new(node_pool(Some(2), None));
            h.reconcile().await.expect("first pass");
            h.reconcile().await.expect("second pass");

            assert_eq!(
                h.events.all(),
                vec![NodePoolEvent::ComputeGroupCreated {
                    namespace: "c1".to_string(),
                    name: GROUP_NAME.to_string(),
                    replicas: 2,
                }]
            );
        }
    }

    mod autoscaled_pools {
        use super::*;

        /// Story: enabling autoscaling clears nodeCount, bootstraps one
        /// replica and never requeues on a count mismatch
        #[tokio::test]
        async fn story_new_autoscaled_pool_bootstraps_one_replica() {
            let h = Harness::new(node_pool(Some(4), bounds(1, 5)));

            let action = h.reconcile().await.expect("pass should succeed");
            assert_eq!(action, Action::await_change());

            let group = h.group();
            assert_eq!(group.replicas(), Some(1));
            assert_eq!(group.metadata.annotations[AUTOSCALER_MIN_SIZE_ANNOTATION], "1");
            assert_eq!(group.metadata.annotations[AUTOSCALER_MAX_SIZE_ANNOTATION], "5");

            let pool = h.store.current().expect("pool");
            assert_eq!(pool.spec.node_count, None);
            assert_eq!(pool.spec.auto_scaling, bounds(1, 5));
            let spec_patch = h
                .store
                .spec_patches()
                .into_iter()
                .find(|p| p.get("spec").is_some())
                .expect("nodeCount cleared");
            assert_eq!(spec_patch["spec"], json!({ "nodeCount": null }));

            let condition = h
                .store
                .last_status()
                .and_then(|s| s.condition(AUTOSCALING_ENABLED_CONDITION).cloned())
                .expect("condition set");
            assert_eq!(condition.status, ConditionStatus::True);
            assert_eq!(condition.message, "Ignoring nodeCount");
        }

        #[tokio::test]
        async fn autoscaler_replica_count_is_preserved() {
            let h = Harness::new(node_pool(None, bounds(1, 5)));
            h.reconcile().await.expect("first pass");

            // The autoscaler scales the group up
            let mut scaled = h.group();
            scaled.set_replicas(4);
            h.capi.insert(scaled);

            // Bounds change
            h.store.edit(|np| np.spec.auto_scaling = bounds(2, 8));
            h.reconcile().await.expect("second pass");

            let group = h.group();
            assert_eq!(group.replicas(), Some(4));
            assert_eq!(group.metadata.annotations[AUTOSCALER_MIN_SIZE_ANNOTATION], "2");
            assert_eq!(group.metadata.annotations[AUTOSCALER_MAX_SIZE_ANNOTATION], "8");
        }

        /// Story: switching back to a fixed count removes the bounds and
        /// pins the declared replica count after one pass
        #[tokio::test]
        async fn story_switch_to_fixed_is_reversible() {
            let h = Harness::new(node_pool(None, bounds(1, 5)));
            h.reconcile().await.expect("autoscaled pass");

            h.store.edit(|np| {
                np.spec.auto_scaling = None;
                np.spec.node_count = Some(3);
            });
            h.reconcile().await.expect("fixed pass");

            let group = h.group();
            assert_eq!(group.replicas(), Some(3));
            assert!(!group.metadata.annotations.contains_key(AUTOSCALER_MIN_SIZE_ANNOTATION));
            assert!(!group.metadata.annotations.contains_key(AUTOSCALER_MAX_SIZE_ANNOTATION));
            assert_eq!(group.metadata.annotations[EXCLUDE_NODE_DRAINING_ANNOTATION], "true");

            let condition = h
                .store
                .last_status()
                .and_then(|s| s.condition(AUTOSCALING_ENABLED_CONDITION).cloned())
                .expect("condition set");
            assert_eq!(condition.status, ConditionStatus::False);
        }

        /// Story: invalid bounds are reported on status and wait for a spec
        /// change without touching any machine resources
        #[tokio::test]
        async fn story_invalid_bounds_fail_without_side_effects() {
            let h = Harness::new(node_pool(None, bounds(5, 3)));

            let err = h.reconcile().await.unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
            assert!(h.capi.writes().is_empty());

            let condition = h
                .store
                .last_status()
                .and_then(|s| s.condition(AUTOSCALING_ENABLED_CONDITION).cloned())
                .expect("condition persisted on failure");
            assert_eq!(condition.status, ConditionStatus::False);
            assert_eq!(condition.reason, VALIDATION_FAILED_REASON);
            assert!(condition.message.contains("max must be equal or greater than min"));

            let pool = Arc::new(h.store.current().expect("pool"));
            assert_eq!(error_policy(pool, &err, h.ctx.clone()), Action::await_change());

            let events = h.events.all();
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                NodePoolEvent::ValidationFailed { message }
                    if message.contains("max must be equal or greater than min")
            ));
        }

        #[tokio::test]
        async fn zero_bounds_fail_validation() {
            let h = Harness::new(node_pool(None, bounds(0, 0)));
            let err = h.reconcile().await.unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        }
    }

    mod deletion {
        use super::*;

        fn deleting(mut np: NodePool) -> NodePool {
            np.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
            np.metadata.finalizers = Some(vec![NODEPOOL_FINALIZER.to_string()]);
            np
        }

        /// Story: a pool deleted before its first successful pass is released
        #[tokio::test]
        async fn story_delete_before_resources_exist() {
            let h = Harness::new(deleting(node_pool(Some(2), None)));

            let action = h.reconcile().await.expect("deletion should succeed");
            assert_eq!(action, Action::await_change());
            assert!(h.store.current().expect("pool").finalizers().is_empty());
            assert!(h.store.status_patches().is_empty());
        }

        #[tokio::test]
        async fn deletes_machine_set_before_template() {
            let h = Harness::new(node_pool(Some(2), None));
            h.reconcile().await.expect("create pass");

            h.store.edit(|np| {
                np.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
            });
            h.capi.clear_writes();
            h.reconcile().await.expect("delete pass");

            assert_eq!(
                h.capi.writes(),
                vec!["delete MachineSet", "delete AWSMachineTemplate"]
            );
            assert!(h.capi.get(MACHINE_SET_KIND, "c1", GROUP_NAME).is_none());
            assert!(h.store.current().expect("pool").finalizers().is_empty());
        }

        #[tokio::test]
        async fn failed_delete_keeps_finalizer() {
            let capi = FakeCapi {
                fail_deletes: true,
                ..FakeCapi::with_image("ami-123")
            };
            let h = Harness::with(deleting(node_pool(Some(2), None)), Some(hosted_cluster()), capi);

            let err = h.reconcile().await.unwrap_err();
            assert!(matches!(err, Error::Deletion { .. }));
            assert!(err.is_retryable());
            assert_eq!(
                h.store.current().expect("pool").finalizers(),
                &[NODEPOOL_FINALIZER.to_string()]
            );
        }

        #[tokio::test]
        async fn cleanup_proceeds_without_hosted_cluster() {
            let h = Harness::with(
                deleting(node_pool(Some(2), None)),
                None,
                FakeCapi::with_image("ami-123"),
            );
            h.reconcile().await.expect("deletion should succeed");
            assert!(h.store.current().expect("pool").finalizers().is_empty());
        }
    }

    mod context_and_errors {
        use super::*;

        #[tokio::test]
        async fn vanished_pool_is_done() {
            let mut mock = MockNodePoolClient::new();
            mock.expect_get_node_pool().returning(|_, _| Ok(None));
            mock.expect_get_hosted_cluster().never();
            let ctx = Arc::new(Context::for_testing(
                Arc::new(mock),
                Arc::new(FakeCapi::default()),
            ));

            let action = reconcile(Arc::new(node_pool(Some(1), None)), ctx)
                .await
                .expect("missing pool is not an error");
            assert_eq!(action, Action::await_change());
        }

        #[tokio::test]
        async fn missing_infrastructure_is_retryable() {
            let store = PoolStore::new(node_pool(Some(1), None));
            let ctx = Arc::new(Context::for_testing(
                Arc::new(mock_node_pools(&store, Some(hosted_cluster()), None)),
                Arc::new(FakeCapi::with_image("ami-123")),
            ));

            let err = reconcile(Arc::new(node_pool(Some(1), None)), ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::ContextResolution { .. }));
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn missing_hosted_cluster_blocks_convergence() {
            let h = Harness::with(node_pool(Some(1), None), None, FakeCapi::with_image("ami-123"));
            let err = h.reconcile().await.unwrap_err();
            assert!(matches!(err, Error::ContextResolution { .. }));
            assert!(h.capi.writes().is_empty());
        }

        #[tokio::test]
        async fn missing_image_source_is_retryable() {
            let h = Harness::with(
                node_pool(Some(1), None),
                Some(hosted_cluster()),
                FakeCapi::default(),
            );
            let err = h.reconcile().await.unwrap_err();
            assert!(matches!(err, Error::ImageResolution { .. }));
            assert!(err.is_retryable());
            assert!(matches!(
                h.events.all().as_slice(),
                [NodePoolEvent::ReconcileFailed { .. }]
            ));
        }

        /// Story: a user edit that lands while a pass runs is not reverted by
        /// the pass clearing nodeCount
        #[tokio::test]
        async fn story_edit_during_pass_survives() {
            let h = Harness::new(node_pool(Some(4), bounds(1, 5)));
            h.store.edit_during_next_pass(|np| {
                np.spec.platform.aws.instance_type = "m5.xlarge".to_string();
            });

            h.reconcile().await.expect("pass should succeed");

            let pool = h.store.current().expect("pool");
            assert_eq!(pool.spec.platform.aws.instance_type, "m5.xlarge");
            assert_eq!(pool.spec.node_count, None);
            for patch in h.store.spec_patches() {
                assert!(patch["spec"].get("platform").is_none(), "patch sent {patch}");
            }
        }

        /// Story: repeated failures back off and a successful pass resets
        #[tokio::test]
        async fn story_error_backoff_escalates_and_resets() {
            let h = Harness::new(node_pool(Some(1), None));
            let pool = Arc::new(h.store.current().expect("pool"));
            let err = Error::upsert("MachineSet", GROUP_NAME, "conflict");

            assert_eq!(
                error_policy(pool.clone(), &err, h.ctx.clone()),
                Action::requeue(Duration::from_secs(1))
            );
            assert_eq!(
                error_policy(pool.clone(), &err, h.ctx.clone()),
                Action::requeue(Duration::from_secs(2))
            );

            h.reconcile().await.expect("successful pass");
            assert_eq!(h.ctx.backoff.failures(&identity(&pool)), 0);
            assert_eq!(
                error_policy(pool, &err, h.ctx.clone()),
                Action::requeue(Duration::from_secs(1))
            );
        }
    }

    mod ownership {
        use super::*;

        #[tokio::test]
        async fn owner_reference_added_once() {
            let h = Harness::new(node_pool(Some(1), None));
            h.reconcile().await.expect("first pass");
            h.reconcile().await.expect("second pass");

            let owners = h
                .store
                .current()
                .and_then(|np| np.metadata.owner_references)
                .expect("owner references set");
            assert_eq!(owners.len(), 1);
            assert_eq!(owners[0].kind, "HostedCluster");
            assert_eq!(owners[0].api_version, "fleet.dev/v1alpha1");
            assert_eq!(owners[0].name, "c1");
            assert_eq!(owners[0].uid, "hc-uid");
            assert_eq!(h.store.spec_patches().len(), 1);
        }

        #[test]
        fn recreated_cluster_updates_uid_in_place() {
            let mut np = node_pool(Some(1), None);
            let mut hc = hosted_cluster();
            ensure_owner_reference(&mut np, &hc);

            hc.metadata.uid = Some("new-uid".to_string());
            ensure_owner_reference(&mut np, &hc);

            let owners = np.metadata.owner_references.expect("owners");
            assert_eq!(owners.len(), 1);
            assert_eq!(owners[0].uid, "new-uid");
        }
    }
}
