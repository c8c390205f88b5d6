//! Centralized constants for the fleet-capi crate
//!
//! API versions, kinds, label and annotation keys shared by the compiler and
//! the controller. Changing any of these changes what the controller writes
//! to the cluster.

// =============================================================================
// API Versions and Kinds
// =============================================================================

/// Core CAPI API version for MachineSets
pub const CAPI_CLUSTER_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";

/// AWS infrastructure API version for AWSMachineTemplates
pub const AWS_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta2";

/// Kind of the compute-group resource
pub const MACHINE_SET_KIND: &str = "MachineSet";

/// Kind of the compute-template resource
pub const AWS_MACHINE_TEMPLATE_KIND: &str = "AWSMachineTemplate";

/// API version of the platform MachineSets scanned for the node image
pub const IMAGE_SOURCE_API_VERSION: &str = "machine.openshift.io/v1beta1";

/// Field path of the AMI ID inside an image-source MachineSet
pub const IMAGE_SOURCE_AMI_PATH: &[&str] = &[
    "spec",
    "template",
    "spec",
    "providerSpec",
    "value",
    "ami",
    "id",
];

// =============================================================================
// Labels and Annotations
// =============================================================================

/// Label binding CAPI resources to their cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Annotation excluding a MachineSet's nodes from drain automation
pub const EXCLUDE_NODE_DRAINING_ANNOTATION: &str = "machine.cluster.x-k8s.io/exclude-node-draining";

/// Cluster autoscaler lower bound annotation
pub const AUTOSCALER_MIN_SIZE_ANNOTATION: &str =
    "cluster.x-k8s.io/cluster-api-autoscaler-node-group-min-size";

/// Cluster autoscaler upper bound annotation
pub const AUTOSCALER_MAX_SIZE_ANNOTATION: &str =
    "cluster.x-k8s.io/cluster-api-autoscaler-node-group-max-size";

// =============================================================================
// Defaults
// =============================================================================

/// Longest name accepted for generated machine resources
pub const MAX_MACHINE_RESOURCE_NAME_LENGTH: usize = 43;

/// Zone suffix used for the default subnet filter
///
/// Only one availability zone is targeted when no subnet is declared.
pub const DEFAULT_SUBNET_ZONE_SUFFIX: &str = "a";

/// AWS filter name matching the Name tag
pub const TAG_NAME_FILTER: &str = "tag:Name";

/// Backend used for cloud-init user data
pub const SECURE_SECRETS_BACKEND: &str = "secrets-manager";
