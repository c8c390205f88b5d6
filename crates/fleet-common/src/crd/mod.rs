//! Custom Resource Definitions consumed and served by the fleet operator

mod hosted_cluster;
mod infrastructure;
mod node_pool;
mod types;

pub use hosted_cluster::{
    ApiEndpoint, HostedCluster, HostedClusterSpec, HostedControlPlane, HostedControlPlaneSpec,
    HostedControlPlaneStatus, LocalObjectReference,
};
pub use infrastructure::{
    AwsPlatformStatus, Infrastructure, InfrastructureSpec, InfrastructureStatus, PlatformStatus,
    INFRASTRUCTURE_SINGLETON_NAME,
};
pub use node_pool::{
    AwsFilter, AwsNodePoolPlatform, AwsResourceReference, NodePool, NodePoolAutoScaling,
    NodePoolPlatform, NodePoolSpec, NodePoolStatus, AS_EXPECTED_REASON,
    AUTOSCALING_ENABLED_CONDITION, VALIDATION_FAILED_REASON,
};
pub use types::{Condition, ConditionStatus};
