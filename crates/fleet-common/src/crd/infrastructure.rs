//! Platform Infrastructure singleton
//!
//! The platform publishes one cluster-scoped `Infrastructure` object named
//! `cluster`. The controller only reads its status to learn the
//! infrastructure name and the AWS region.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the Infrastructure singleton
pub const INFRASTRUCTURE_SINGLETON_NAME: &str = "cluster";

/// Specification for the Infrastructure singleton (unused by the controller)
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "Infrastructure",
    plural = "infrastructures",
    status = "InfrastructureStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureSpec {
    /// Cloud configuration reference, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_config: Option<serde_json::Value>,
}

/// Observed state of the platform infrastructure
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    /// Unique name of the infrastructure, used as a prefix for cloud resources
    #[serde(default)]
    pub infrastructure_name: String,

    /// Platform specific status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_status: Option<PlatformStatus>,
}

/// Platform specific status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatus {
    /// Platform type (e.g., "AWS")
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// AWS status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsPlatformStatus>,
}

/// AWS platform status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AwsPlatformStatus {
    /// AWS region
    pub region: String,
}

impl Infrastructure {
    /// Infrastructure name, if the platform has published one
    pub fn infrastructure_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.infrastructure_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// AWS region, if the platform is AWS
    pub fn aws_region(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.platform_status.as_ref())
            .and_then(|p| p.aws.as_ref())
            .map(|aws| aws.region.as_str())
            .filter(|region| !region.is_empty())
    }
}
