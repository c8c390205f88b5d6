//! Common types for fleet: CRDs, errors, events, backoff and telemetry

#![deny(missing_docs)]

pub mod backoff;
pub mod crd;
pub mod error;
pub mod events;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Finalizer placed on NodePools before any owned resource is created
pub const NODEPOOL_FINALIZER: &str = "fleet.dev/finalizer";

/// Field manager used for server-side apply and patches
pub const FIELD_MANAGER: &str = "fleet-controller";

/// Namespace scanned for pre-existing machine sets to discover the node image
pub const DEFAULT_IMAGE_SOURCE_NAMESPACE: &str = "openshift-machine-api";
