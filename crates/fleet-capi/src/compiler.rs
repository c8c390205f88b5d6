//! Desired-state compiler for NodePools on AWS (CAPA)
//!
//! Turns a NodePool plus the resolved [`ClusterContext`] into the pair of
//! resources that back it: an immutable `AWSMachineTemplate` and a
//! replica-counted `MachineSet` referencing it. Compilation is pure; all
//! lookups happen before it is called.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::debug;

use fleet_common::crd::{AwsFilter, AwsNodePoolPlatform, AwsResourceReference, NodePool};
use fleet_common::{Error, Result};

use crate::constants::{
    AUTOSCALER_MAX_SIZE_ANNOTATION, AUTOSCALER_MIN_SIZE_ANNOTATION, AWS_API_VERSION,
    AWS_MACHINE_TEMPLATE_KIND, CAPI_CLUSTER_API_VERSION, CLUSTER_NAME_LABEL,
    DEFAULT_SUBNET_ZONE_SUFFIX, EXCLUDE_NODE_DRAINING_ANNOTATION, IMAGE_SOURCE_AMI_PATH,
    MACHINE_SET_KIND, SECURE_SECRETS_BACKEND, TAG_NAME_FILTER,
};
use crate::manifest::CAPIManifest;
use crate::naming::machine_set_name;

/// Read-only context resolved once per reconcile pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterContext {
    /// Infrastructure name from the platform singleton
    pub infra_name: String,
    /// AWS region
    pub region: String,
    /// AMI ID discovered from existing machine sets
    pub image_id: String,
    /// Namespace the generated resources live in (the HostedCluster name)
    pub target_namespace: String,
}

/// The resources generated for one NodePool
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedResourceSet {
    /// `AWSMachineTemplate`
    pub template: CAPIManifest,
    /// `MachineSet`
    pub group: CAPIManifest,
}

/// Extract the AMI ID from the first image source
///
/// `sources` is the machine set listing in `namespace`, in list order.
pub fn resolve_image(sources: &[DynamicObject], namespace: &str) -> Result<String> {
    let first = sources
        .first()
        .ok_or_else(|| Error::image_resolution(namespace, "no machinesets found"))?;

    let mut value = &first.data;
    for segment in IMAGE_SOURCE_AMI_PATH {
        value = value.get(segment).ok_or_else(|| {
            Error::image_resolution(
                namespace,
                format!(
                    "machineset {} has no {}",
                    first.name_any(),
                    IMAGE_SOURCE_AMI_PATH.join(".")
                ),
            )
        })?;
    }

    match value.as_str() {
        Some(ami) if !ami.is_empty() => Ok(ami.to_string()),
        _ => Err(Error::image_resolution(
            namespace,
            format!("machineset {} has a malformed AMI ID: {value}", first.name_any()),
        )),
    }
}

/// Subnet reference for the machine template
///
/// A declared subnet is copied verbatim. Otherwise the private subnet of
/// zone `a` in the region is selected by its Name tag.
pub fn resolve_subnet(
    platform: &AwsNodePoolPlatform,
    infra_name: &str,
    region: &str,
) -> AwsResourceReference {
    match &platform.subnet {
        Some(subnet) => subnet.clone(),
        None => AwsResourceReference {
            filters: vec![AwsFilter {
                name: TAG_NAME_FILTER.to_string(),
                values: vec![format!(
                    "{infra_name}-private-{region}{DEFAULT_SUBNET_ZONE_SUFFIX}"
                )],
            }],
            ..Default::default()
        },
    }
}

/// IAM instance profile: the declared override, else `<infra>-worker-profile`
pub fn resolve_instance_profile(platform: &AwsNodePoolPlatform, infra_name: &str) -> String {
    platform
        .instance_profile
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{infra_name}-worker-profile"))
}

/// Autoscaler annotations for a pool
///
/// Empty unless autoscaling is enabled with a positive maximum; absence of
/// the annotations tells the autoscaler to leave the group alone.
pub fn autoscaler_annotations(pool: &NodePool) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if let Some(bounds) = &pool.spec.auto_scaling {
        if let Some(max) = bounds.max.filter(|max| *max > 0) {
            annotations.insert(
                AUTOSCALER_MIN_SIZE_ANNOTATION.to_string(),
                bounds.min.unwrap_or(0).to_string(),
            );
            annotations.insert(AUTOSCALER_MAX_SIZE_ANNOTATION.to_string(), max.to_string());
        }
    }
    annotations
}

/// Compile the desired resources for `pool`
pub fn compile(
    pool: &NodePool,
    ctx: &ClusterContext,
    target_replicas: u32,
) -> Result<GeneratedResourceSet> {
    let pool_name = pool
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::compilation(pool.name_any(), "NodePool has no name"))?;
    let cluster_name = &pool.spec.cluster_name;
    let platform = &pool.spec.platform.aws;

    let name = machine_set_name(&ctx.infra_name, cluster_name, pool_name);
    let template = generate_machine_template(&name, platform, ctx);
    let group = generate_machine_set(&name, pool, ctx, target_replicas);

    debug!(
        node_pool = %pool_name,
        name = %name,
        replicas = target_replicas,
        "Compiled machine resources"
    );

    Ok(GeneratedResourceSet { template, group })
}

fn generate_machine_template(
    name: &str,
    platform: &AwsNodePoolPlatform,
    ctx: &ClusterContext,
) -> CAPIManifest {
    let subnet = resolve_subnet(platform, &ctx.infra_name, &ctx.region);
    let spec = serde_json::json!({
        "template": {
            "spec": {
                "uncompressedUserData": true,
                "cloudInit": {
                    "insecureSkipSecretsManager": true,
                    "secureSecretsBackend": SECURE_SECRETS_BACKEND
                },
                "iamInstanceProfile": resolve_instance_profile(platform, &ctx.infra_name),
                "instanceType": platform.instance_type,
                "ami": { "id": ctx.image_id },
                "subnet": subnet
            }
        }
    });

    CAPIManifest::new(
        AWS_API_VERSION,
        AWS_MACHINE_TEMPLATE_KIND,
        name,
        &ctx.target_namespace,
    )
    .with_spec(spec)
}

fn generate_machine_set(
    name: &str,
    pool: &NodePool,
    ctx: &ClusterContext,
    replicas: u32,
) -> CAPIManifest {
    let cluster_name = &pool.spec.cluster_name;
    let data_secret_name = format!("{cluster_name}-user-data");

    let spec = serde_json::json!({
        "clusterName": cluster_name,
        "replicas": replicas,
        "selector": {
            "matchLabels": { name: name }
        },
        "template": {
            "metadata": {
                "labels": {
                    name: name,
                    CLUSTER_NAME_LABEL: ctx.infra_name
                }
            },
            "spec": {
                "clusterName": cluster_name,
                "bootstrap": { "dataSecretName": data_secret_name },
                "infrastructureRef": {
                    "apiVersion": AWS_API_VERSION,
                    "kind": AWS_MACHINE_TEMPLATE_KIND,
                    "name": name,
                    "namespace": ctx.target_namespace
                }
            }
        }
    });

    let labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), ctx.infra_name.clone())]);
    let mut annotations = BTreeMap::from([(
        EXCLUDE_NODE_DRAINING_ANNOTATION.to_string(),
        "true".to_string(),
    )]);
    annotations.extend(autoscaler_annotations(pool));

    CAPIManifest::new(
        CAPI_CLUSTER_API_VERSION,
        MACHINE_SET_KIND,
        name,
        &ctx.target_namespace,
    )
    .with_labels(labels)
    .with_annotations(annotations)
    .with_spec(spec)
}
