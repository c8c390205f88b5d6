//! NodePool Custom Resource Definition
//!
//! A NodePool declares a group of worker nodes attached to a HostedCluster.
//! The controller turns each NodePool into a machine template plus a
//! replica-counted machine group and keeps the two converged with the spec.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Condition type reporting whether the pool is managed by the autoscaler
pub const AUTOSCALING_ENABLED_CONDITION: &str = "AutoscalingEnabled";

/// Reason used when a condition reflects the declared intent
pub const AS_EXPECTED_REASON: &str = "AsExpected";

/// Reason used when the spec failed validation
pub const VALIDATION_FAILED_REASON: &str = "ValidationFailed";

/// Specification for a NodePool
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fleet.dev",
    version = "v1alpha1",
    kind = "NodePool",
    plural = "nodepools",
    shortname = "np",
    status = "NodePoolStatus",
    namespaced,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.nodeCount"}"#,
    printcolumn = r#"{"name":"Current","type":"integer","jsonPath":".status.nodeCount"}"#,
    printcolumn = r#"{"name":"Autoscaling","type":"string","jsonPath":".status.conditions[?(@.type==\"AutoscalingEnabled\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Name of the HostedCluster (in the same namespace) this pool belongs to
    pub cluster_name: String,

    /// Fixed number of nodes
    ///
    /// Ignored, and cleared by the controller, while `autoScaling` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,

    /// Autoscaler bounds
    ///
    /// Presence of this field switches the pool to autoscaling mode,
    /// regardless of its contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaling: Option<NodePoolAutoScaling>,

    /// Infrastructure platform configuration
    pub platform: NodePoolPlatform,
}

impl NodePoolSpec {
    /// Returns true when the autoscaler owns the replica count of this pool
    pub fn is_autoscaling_enabled(&self) -> bool {
        self.auto_scaling.is_some()
    }
}

/// Autoscaler bounds for a NodePool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolAutoScaling {
    /// Minimum number of nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    /// Maximum number of nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

/// Platform-specific node configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolPlatform {
    /// AWS machine configuration
    pub aws: AwsNodePoolPlatform,
}

/// AWS machine configuration for a NodePool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsNodePoolPlatform {
    /// EC2 instance type (e.g., "m5.large")
    pub instance_type: String,

    /// IAM instance profile; defaults to `<infraName>-worker-profile`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_profile: Option<String>,

    /// Subnet to place machines in; defaults to the private subnet of zone `a`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<AwsResourceReference>,
}

/// Reference to an AWS resource by ID, ARN or filters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsResourceReference {
    /// Resource ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Resource ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,

    /// Filters matching the resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<AwsFilter>,
}

/// Name/values filter for AWS resource lookups
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AwsFilter {
    /// Filter name (e.g., "tag:Name")
    pub name: String,
    /// Accepted values
    pub values: Vec<String>,
}

/// Status for a NodePool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatus {
    /// Number of available nodes reported by the machine group
    #[serde(default)]
    pub node_count: u32,

    /// Conditions representing the pool state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// The generation of the spec that was last processed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl NodePoolStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
