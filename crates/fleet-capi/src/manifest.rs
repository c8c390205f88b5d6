//! Untyped CAPI manifests
//!
//! Generated resources are kept as plain JSON specs rather than typed
//! structs so the controller does not depend on a particular CAPI provider
//! crate. A manifest converts to and from a kube [`DynamicObject`] at the
//! API boundary.

use std::collections::BTreeMap;

use kube::api::{ApiResource, DynamicObject};
use serde::{Deserialize, Serialize};

use fleet_common::{Error, Result};

/// A CAPI manifest represented as an untyped Kubernetes resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CAPIManifest {
    /// API version (e.g., "cluster.x-k8s.io/v1beta1")
    pub api_version: String,
    /// Kind of resource (e.g., "MachineSet")
    pub kind: String,
    /// Resource metadata
    pub metadata: ManifestMetadata,
    /// Resource spec (untyped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
    /// Observed status, only present on manifests read back from the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
}

/// Metadata for a CAPI manifest
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    /// Name of the resource
    pub name: String,
    /// Namespace (optional for cluster-scoped resources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Version token of the stored object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Everything else the server keeps (ownerReferences, finalizers, uid, ...)
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl CAPIManifest {
    /// Create a new namespaced manifest with empty spec
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ManifestMetadata {
                name: name.into(),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            spec: None,
            status: None,
        }
    }

    /// Set the spec for this manifest
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Replace the labels of this manifest
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.metadata.labels = labels;
        self
    }

    /// Replace the annotations of this manifest
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.metadata.annotations = annotations;
        self
    }

    /// Namespace, or the empty string for cluster-scoped manifests
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    /// `spec.replicas`, if set and representable
    pub fn replicas(&self) -> Option<u32> {
        self.spec
            .as_ref()
            .and_then(|s| s.get("replicas"))
            .and_then(|r| r.as_u64())
            .and_then(|r| u32::try_from(r).ok())
    }

    /// Set `spec.replicas`, creating the spec object if needed
    pub fn set_replicas(&mut self, replicas: u32) {
        let spec = self
            .spec
            .get_or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let Some(obj) = spec.as_object_mut() {
            obj.insert("replicas".to_string(), serde_json::json!(replicas));
        }
    }

    /// `status.availableReplicas`, zero when absent
    pub fn available_replicas(&self) -> u32 {
        self.status
            .as_ref()
            .and_then(|s| s.get("availableReplicas"))
            .and_then(|r| r.as_u64())
            .and_then(|r| u32::try_from(r).ok())
            .unwrap_or(0)
    }

    /// API resource description used to build `Api<DynamicObject>`
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(&self.api_version, &self.kind)
    }

    /// Convert to a dynamic object for the kube API
    pub fn to_dynamic_object(&self) -> Result<DynamicObject> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::serialization_for_kind(&self.kind, e.to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| Error::serialization_for_kind(&self.kind, e.to_string()))
    }

    /// Read a manifest back from a dynamic object returned by the API
    pub fn from_dynamic_object(obj: DynamicObject) -> Result<Self> {
        let kind = obj
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default();
        let value =
            serde_json::to_value(obj).map_err(|e| Error::serialization_for_kind(&kind, e.to_string()))?;
        serde_json::from_value(value).map_err(|e| Error::serialization_for_kind(&kind, e.to_string()))
    }
}

/// Build an ApiResource from a known apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    ApiResource {
        group,
        version,
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Lowercase plural resource name for a kind
fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{lower}es")
    } else {
        format!("{lower}s")
    }
}
