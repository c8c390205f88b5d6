//! HostedCluster and HostedControlPlane Custom Resource Definitions
//!
//! A HostedCluster owns NodePools in its namespace. Its name doubles as the
//! namespace that holds the generated machine resources for its pools.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Reference to an object in the same namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LocalObjectReference {
    /// Name of the referenced object
    pub name: String,
}

/// Specification for a HostedCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleet.dev",
    version = "v1alpha1",
    kind = "HostedCluster",
    plural = "hostedclusters",
    shortname = "hc",
    namespaced,
    printcolumn = r#"{"name":"Release","type":"string","jsonPath":".spec.releaseImage"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterSpec {
    /// Release image the control plane runs
    pub release_image: String,

    /// Secret holding the image pull secret
    pub pull_secret: LocalObjectReference,

    /// Service network CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,

    /// Pod network CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,

    /// Secret holding the SSH public key for nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<LocalObjectReference>,

    /// Secret holding cloud provider credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_creds: Option<LocalObjectReference>,
}

/// Specification for a HostedControlPlane
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleet.dev",
    version = "v1alpha1",
    kind = "HostedControlPlane",
    plural = "hostedcontrolplanes",
    shortname = "hcp",
    status = "HostedControlPlaneStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneSpec {
    /// Release image the control plane runs
    pub release_image: String,
    /// Secret holding the image pull secret
    pub pull_secret: LocalObjectReference,
    /// Service network CIDR
    #[serde(rename = "serviceCIDR")]
    pub service_cidr: String,
    /// Pod network CIDR
    #[serde(rename = "podCIDR")]
    pub pod_cidr: String,
    /// Secret holding the SSH public key for nodes
    pub ssh_key: LocalObjectReference,
    /// Secret holding cloud provider credentials
    pub provider_creds: LocalObjectReference,
}

/// Endpoint of a hosted API server
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ApiEndpoint {
    /// Hostname or IP
    pub host: String,
    /// Port
    pub port: i32,
}

/// Status for a HostedControlPlane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneStatus {
    /// Whether the API server is ready to receive requests
    #[serde(default)]
    pub ready: bool,

    /// Endpoint clients use to reach the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Release version applied by the control plane operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Secret holding the admin kubeconfig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<LocalObjectReference>,

    /// Conditions; currently only "Available"
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
