//! Kubernetes Events for NodePools.
//!
//! The controller reports what happened to a pool as a [`NodePoolEvent`].
//! Each event knows its type, reason and action, so `kubectl describe
//! nodepool` shows a failed pass, rejected autoscaling bounds, the first
//! machine set and the final cleanup without call sites repeating the
//! mapping.
//!
//! Publishing never fails a pass. Errors from the events API are logged.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Something worth telling the owner of a NodePool
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodePoolEvent {
    /// A pass failed and will be retried with backoff
    ReconcileFailed {
        /// Error text
        message: String,
    },
    /// Autoscaling bounds were rejected; nothing happens until the spec changes
    ValidationFailed {
        /// Why the bounds were rejected
        message: String,
    },
    /// The pool's machine set was created
    ComputeGroupCreated {
        /// Namespace of the machine set
        namespace: String,
        /// Name of the machine set
        name: String,
        /// Replicas it was created with
        replicas: u32,
    },
    /// The machine set and template are gone and the finalizer was released
    Deleted {
        /// Namespace of the removed machine set
        namespace: String,
        /// Name of the removed machine set
        name: String,
    },
}

impl NodePoolEvent {
    /// Warning for failures, Normal otherwise
    pub fn type_(&self) -> EventType {
        match self {
            Self::ReconcileFailed { .. } | Self::ValidationFailed { .. } => EventType::Warning,
            Self::ComputeGroupCreated { .. } | Self::Deleted { .. } => EventType::Normal,
        }
    }

    /// Value for the REASON column
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ReconcileFailed { .. } => reasons::RECONCILE_ERROR,
            Self::ValidationFailed { .. } => reasons::VALIDATION_FAILED,
            Self::ComputeGroupCreated { .. } => reasons::COMPUTE_GROUP_CREATED,
            Self::Deleted { .. } => reasons::NODE_POOL_DELETED,
        }
    }

    /// Value for the ACTION column
    pub fn action(&self) -> &'static str {
        match self {
            Self::ReconcileFailed { .. } | Self::ValidationFailed { .. } => actions::RECONCILE,
            Self::ComputeGroupCreated { .. } => actions::APPLY,
            Self::Deleted { .. } => actions::DELETE,
        }
    }

    /// Human-readable message
    pub fn note(&self) -> String {
        match self {
            Self::ReconcileFailed { message } | Self::ValidationFailed { message } => {
                message.clone()
            }
            Self::ComputeGroupCreated {
                namespace,
                name,
                replicas,
            } => format!("Created machine set {namespace}/{name} with {replicas} replicas"),
            Self::Deleted { namespace, name } => {
                format!("Deleted machine set {namespace}/{name}")
            }
        }
    }
}

/// Sink for NodePool events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `event` on the NodePool `node_pool` points at
    async fn publish(&self, node_pool: &ObjectReference, event: NodePoolEvent);
}

/// Publisher backed by the events API.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    /// (the "reportingComponent", e.g. "fleet-nodepool-controller").
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, node_pool: &ObjectReference, event: NodePoolEvent) {
        let reason = event.reason();
        let recorded = Event {
            type_: event.type_(),
            reason: reason.to_string(),
            note: Some(event.note()),
            action: event.action().to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&recorded, node_pool).await {
            warn!(
                reason,
                node_pool = node_pool.name.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to publish NodePool event"
            );
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _node_pool: &ObjectReference, _event: NodePoolEvent) {}
}

/// Event reasons.
pub mod reasons {
    /// A reconcile pass failed
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    /// Autoscaling bounds were rejected
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    /// A machine set was created for the first time
    pub const COMPUTE_GROUP_CREATED: &str = "ComputeGroupCreated";
    /// Owned resources were cleaned up and the finalizer released
    pub const NODE_POOL_DELETED: &str = "NodePoolDeleted";
}

/// Event actions.
pub mod actions {
    /// Reconciling the pool
    pub const RECONCILE: &str = "Reconcile";
    /// Creating or patching the machine resources
    pub const APPLY: &str = "Apply";
    /// Deleting the machine resources
    pub const DELETE: &str = "Delete";
}
