//! Error types for the fleet operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant names the operation that failed and the object it failed on,
//! so a reconcile error read from the logs is self-describing.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for fleet operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The owning cluster or the infrastructure singleton could not be read
    #[error("failed to resolve context for {node_pool}: {message}")]
    ContextResolution {
        /// NodePool being reconciled (namespace/name)
        node_pool: String,
        /// Description of what could not be resolved
        message: String,
    },

    /// Validation error for a NodePool spec
    #[error("validation error for {node_pool}: {message}")]
    Validation {
        /// NodePool with invalid configuration
        node_pool: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.autoScaling.max")
        field: Option<String>,
    },

    /// The machine image could not be discovered from existing scalable resources
    #[error("image resolution error in namespace {namespace}: {message}")]
    ImageResolution {
        /// Namespace that was scanned for image sources
        namespace: String,
        /// Description of what failed
        message: String,
    },

    /// Desired-state compilation failed
    #[error("compilation error for {node_pool}: {message}")]
    Compilation {
        /// NodePool being compiled
        node_pool: String,
        /// Description of what failed
        message: String,
    },

    /// The store rejected a create or update of a generated resource
    #[error("failed to upsert {kind} {name}: {message}")]
    Upsert {
        /// Kind of the generated resource
        kind: String,
        /// Name of the generated resource
        name: String,
        /// Underlying failure
        message: String,
    },

    /// Deleting an owned resource failed for a reason other than absence
    #[error("failed to delete {kind} {name}: {message}")]
    Deletion {
        /// Kind of the owned resource
        kind: String,
        /// Name of the owned resource
        name: String,
        /// Underlying failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "persist", "controller")
        context: String,
    },
}

impl Error {
    /// Create a context resolution error for a NodePool
    pub fn context_resolution(node_pool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ContextResolution {
            node_pool: node_pool.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without NodePool context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            node_pool: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with NodePool context
    pub fn validation_for(node_pool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            node_pool: node_pool.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with NodePool context and field path
    pub fn validation_for_field(
        node_pool: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            node_pool: node_pool.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an image resolution error
    pub fn image_resolution(namespace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ImageResolution {
            namespace: namespace.into(),
            message: msg.into(),
        }
    }

    /// Create a compilation error for a NodePool
    pub fn compilation(node_pool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Compilation {
            node_pool: node_pool.into(),
            message: msg.into(),
        }
    }

    /// Wrap a failed create/update of a generated resource
    pub fn upsert(
        kind: impl Into<String>,
        name: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Upsert {
            kind: kind.into(),
            name: name.into(),
            message: cause.to_string(),
        }
    }

    /// Wrap a failed delete of an owned resource
    pub fn deletion(
        kind: impl Into<String>,
        name: impl Into<String>,
        cause: impl std::fmt::Display,
    ) -> Self {
        Self::Deletion {
            kind: kind.into(),
            name: name.into(),
            message: cause.to_string(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors are not retryable: running the same
    /// pass again against the same spec reproduces them. Everything that depends
    /// on the store or on listing races is retried with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Kube { .. }
            | Error::ContextResolution { .. }
            | Error::ImageResolution { .. }
            | Error::Compilation { .. }
            | Error::Upsert { .. }
            | Error::Deletion { .. }
            | Error::Internal { .. } => true,
        }
    }

    /// Get the NodePool name if this error is associated with one
    pub fn node_pool(&self) -> Option<&str> {
        match self {
            Error::ContextResolution { node_pool, .. } => Some(node_pool),
            Error::Validation { node_pool, .. } => Some(node_pool),
            Error::Compilation { node_pool, .. } => Some(node_pool),
            _ => None,
        }
    }
}

/// Returns true if the kube error is a 404 from the API server
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}
