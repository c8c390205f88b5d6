//! Create-or-update of generated resources
//!
//! The stored object is read fresh on every call. A missing object is
//! created from the compiled manifest. An existing one only receives the
//! fields this controller owns, as a JSON merge patch, and only when the
//! stored object does not carry them yet. Owner references, finalizers and
//! server defaults stay untouched, so replaying a pass writes nothing.

use serde_json::{json, Map, Value};
use tracing::debug;

use fleet_capi::constants::{AUTOSCALER_MAX_SIZE_ANNOTATION, AUTOSCALER_MIN_SIZE_ANNOTATION};
use fleet_capi::CAPIManifest;
use fleet_common::{Error, Result};

use crate::client::CapiClient;
use crate::mode::ScalingMode;

/// What a create-or-update call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The object did not exist and was created
    Created,
    /// The object existed and was patched
    Updated,
    /// The object already carried the owned fields
    Unchanged,
}

/// Create `desired`, or merge-patch `patch` into the stored object
///
/// Returns the outcome and the object as stored afterwards. Store failures
/// are wrapped with the kind and name of the object.
pub async fn create_or_update(
    capi: &dyn CapiClient,
    desired: &CAPIManifest,
    patch: &Value,
) -> Result<(UpsertOutcome, CAPIManifest)> {
    let kind = desired.kind.as_str();
    let name = desired.metadata.name.as_str();
    let wrap = |e: Error| match e {
        Error::Kube { source } => Error::upsert(kind, name, source),
        other => other,
    };

    let current = capi
        .get_manifest(&desired.api_version, kind, desired.namespace(), name)
        .await
        .map_err(wrap)?;

    let Some(current) = current else {
        let created = capi.create_manifest(desired).await.map_err(wrap)?;
        return Ok((UpsertOutcome::Created, created));
    };

    let stored = serde_json::to_value(&current)
        .map_err(|e| Error::serialization_for_kind(kind, e.to_string()))?;
    if is_applied(Some(&stored), patch) {
        debug!(kind = %kind, name = %name, "Already up to date");
        return Ok((UpsertOutcome::Unchanged, current));
    }

    let updated = capi.patch_manifest(desired, patch).await.map_err(wrap)?;
    Ok((UpsertOutcome::Updated, updated))
}

/// Owned fields of the machine template: its labels, annotations and spec
pub fn template_patch(desired: &CAPIManifest) -> Value {
    json!({
        "metadata": metadata_patch(desired),
        "spec": desired.spec.clone().unwrap_or_else(|| json!({})),
    })
}

/// Owned fields of the machine set, depending on the scaling mode
///
/// Fixed mode sets the replica count and removes the autoscaler bounds.
/// Autoscaling mode leaves the replica count to the autoscaler and sets the
/// bounds.
pub fn machine_set_patch(desired: &CAPIManifest, mode: &ScalingMode) -> Value {
    let mut metadata = metadata_patch(desired);
    let mut spec = desired.spec.clone().unwrap_or_else(|| json!({}));

    match mode {
        ScalingMode::Fixed { replicas } => {
            if let Some(spec) = spec.as_object_mut() {
                spec.insert("replicas".to_string(), json!(replicas));
            }
            if let Some(annotations) = metadata
                .get_mut("annotations")
                .and_then(Value::as_object_mut)
            {
                annotations.insert(AUTOSCALER_MIN_SIZE_ANNOTATION.to_string(), Value::Null);
                annotations.insert(AUTOSCALER_MAX_SIZE_ANNOTATION.to_string(), Value::Null);
            }
        }
        ScalingMode::Autoscaling { .. } => {
            if let Some(spec) = spec.as_object_mut() {
                spec.remove("replicas");
            }
        }
    }

    json!({ "metadata": metadata, "spec": spec })
}

/// Labels and annotations as merge-patch objects; keys set by others survive
fn metadata_patch(desired: &CAPIManifest) -> Map<String, Value> {
    let strings = |map: &std::collections::BTreeMap<String, String>| {
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<String, Value>>()
    };
    let mut metadata = Map::new();
    metadata.insert("labels".to_string(), Value::Object(strings(&desired.metadata.labels)));
    metadata.insert(
        "annotations".to_string(),
        Value::Object(strings(&desired.metadata.annotations)),
    );
    metadata
}

/// True when applying `patch` as a JSON merge patch would not change `target`
///
/// A null in the patch requires the key to be absent. Objects are compared
/// key by key, so fields only the server sets are ignored. Arrays are
/// replaced by a merge patch, so they must have the same length with each
/// element already carrying the patched content.
pub fn is_applied(target: Option<&Value>, patch: &Value) -> bool {
    match patch {
        Value::Null => target.map_or(true, Value::is_null),
        Value::Object(fields) => {
            let target = match target {
                Some(Value::Object(t)) => Some(t),
                None | Some(Value::Null) => None,
                Some(_) => return false,
            };
            fields
                .iter()
                .all(|(k, v)| is_applied(target.and_then(|t| t.get(k)), v))
        }
        Value::Array(items) => match target {
            Some(Value::Array(t)) => {
                t.len() == items.len()
                    && items.iter().zip(t).all(|(p, t)| is_applied(Some(t), p))
            }
            _ => false,
        },
        scalar => target == Some(scalar),
    }
}

/// Apply a JSON merge patch the way the API server does
#[cfg(test)]
pub(crate) fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(t) = target {
        for (k, v) in fields {
            if v.is_null() {
                t.remove(k);
            } else {
                apply_merge_patch(t.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockCapiClient;
    use std::collections::BTreeMap;

    fn machine_set(replicas: u32, annotations: &[(&str, &str)]) -> CAPIManifest {
        CAPIManifest::new("cluster.x-k8s.io/v1beta1", "MachineSet", "infra-x-c1-p1", "c1")
            .with_spec(json!({
                "replicas": replicas,
                "clusterName": "c1",
                "template": { "spec": { "clusterName": "c1" } }
            }))
            .with_annotations(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            )
    }

    /// The machine set as an API server returns it: defaults, owner
    /// references, a finalizer and a status on top of what was created
    fn as_stored(manifest: &CAPIManifest) -> CAPIManifest {
        let mut stored = manifest.clone();
        stored.metadata.resource_version = Some("7".to_string());
        stored.metadata.other.insert(
            "ownerReferences".to_string(),
            json!([{ "apiVersion": "cluster.x-k8s.io/v1beta1", "kind": "Cluster", "name": "infra-x", "uid": "u1" }]),
        );
        stored
            .metadata
            .other
            .insert("finalizers".to_string(), json!(["cluster.x-k8s.io/machineset"]));
        if let Some(spec) = stored.spec.as_mut().and_then(Value::as_object_mut) {
            spec.insert("deletePolicy".to_string(), json!("Random"));
            spec.insert("minReadySeconds".to_string(), json!(0));
        }
        stored.status = Some(json!({ "availableReplicas": 2 }));
        stored
    }

    fn apply(stored: &CAPIManifest, patch: &Value) -> CAPIManifest {
        let mut value = serde_json::to_value(stored).expect("serializable");
        apply_merge_patch(&mut value, patch);
        serde_json::from_value(value).expect("still a manifest")
    }

    mod patches {
        use super::*;

        #[test]
        fn fixed_mode_sets_replicas_and_removes_bounds() {
            let stored = as_stored(&machine_set(
                4,
                &[
                    (AUTOSCALER_MIN_SIZE_ANNOTATION, "1"),
                    (AUTOSCALER_MAX_SIZE_ANNOTATION, "5"),
                    ("example.com/other", "kept"),
                ],
            ));
            let patch = machine_set_patch(&machine_set(2, &[]), &ScalingMode::Fixed { replicas: 2 });

            let patched = apply(&stored, &patch);
            assert_eq!(patched.replicas(), Some(2));
            assert!(!patched.metadata.annotations.contains_key(AUTOSCALER_MIN_SIZE_ANNOTATION));
            assert!(!patched.metadata.annotations.contains_key(AUTOSCALER_MAX_SIZE_ANNOTATION));
            assert_eq!(patched.metadata.annotations["example.com/other"], "kept");
        }

        #[test]
        fn autoscaling_mode_leaves_replicas_and_sets_bounds() {
            let stored = as_stored(&machine_set(
                4,
                &[
                    (AUTOSCALER_MIN_SIZE_ANNOTATION, "1"),
                    (AUTOSCALER_MAX_SIZE_ANNOTATION, "5"),
                ],
            ));
            let desired = machine_set(
                1,
                &[
                    (AUTOSCALER_MIN_SIZE_ANNOTATION, "2"),
                    (AUTOSCALER_MAX_SIZE_ANNOTATION, "8"),
                ],
            );
            let patch = machine_set_patch(&desired, &ScalingMode::Autoscaling { min: 2, max: 8 });
            assert!(patch["spec"].get("replicas").is_none());

            let patched = apply(&stored, &patch);
            assert_eq!(patched.replicas(), Some(4));
            assert_eq!(patched.metadata.annotations[AUTOSCALER_MIN_SIZE_ANNOTATION], "2");
            assert_eq!(patched.metadata.annotations[AUTOSCALER_MAX_SIZE_ANNOTATION], "8");
        }

        /// Story: patching a machine set CAPI has adopted keeps CAPI's owner
        /// reference, its finalizer and the server defaults
        #[test]
        fn story_patch_keeps_metadata_owned_by_others() {
            let stored = as_stored(&machine_set(1, &[]));
            let patch = machine_set_patch(&machine_set(3, &[]), &ScalingMode::Fixed { replicas: 3 });

            assert!(patch["metadata"].get("ownerReferences").is_none());
            assert!(patch["metadata"].get("finalizers").is_none());
            assert!(patch["metadata"].get("resourceVersion").is_none());

            let patched = apply(&stored, &patch);
            assert_eq!(patched.replicas(), Some(3));
            assert_eq!(patched.metadata.other["finalizers"], json!(["cluster.x-k8s.io/machineset"]));
            assert_eq!(patched.metadata.other["ownerReferences"][0]["kind"], "Cluster");
            assert_eq!(patched.spec.as_ref().expect("spec")["deletePolicy"], "Random");
        }

        #[test]
        fn template_spec_fields_are_overwritten() {
            let stored = CAPIManifest::new(
                "infrastructure.cluster.x-k8s.io/v1beta2",
                "AWSMachineTemplate",
                "t",
                "c1",
            )
            .with_spec(json!({ "template": { "spec": { "instanceType": "m5.large" } } }));
            let desired = stored
                .clone()
                .with_spec(json!({ "template": { "spec": { "instanceType": "m5.xlarge" } } }));

            let patched = apply(&stored, &template_patch(&desired));
            assert_eq!(patched.spec, desired.spec);
        }
    }

    mod applied_check {
        use super::*;

        #[test]
        fn null_requires_absence() {
            let target = json!({ "a": 1 });
            assert!(is_applied(Some(&target), &json!({ "b": null })));
            assert!(!is_applied(Some(&target), &json!({ "a": null })));
            assert!(is_applied(None, &json!({ "annotations": { "x": null } })));
        }

        #[test]
        fn extra_target_fields_are_ignored() {
            let target = json!({ "spec": { "replicas": 2, "deletePolicy": "Random" } });
            assert!(is_applied(Some(&target), &json!({ "spec": { "replicas": 2 } })));
            assert!(!is_applied(Some(&target), &json!({ "spec": { "replicas": 3 } })));
        }

        #[test]
        fn arrays_compare_element_by_element() {
            let target = json!({ "filters": [{ "name": "tag:Name", "values": ["a"], "defaulted": true }] });
            assert!(is_applied(
                Some(&target),
                &json!({ "filters": [{ "name": "tag:Name", "values": ["a"] }] })
            ));
            assert!(!is_applied(
                Some(&target),
                &json!({ "filters": [{ "name": "tag:Name", "values": ["a", "b"] }] })
            ));
            assert!(!is_applied(Some(&target), &json!({ "filters": [] })));
        }

        #[test]
        fn applied_patch_is_recognized() {
            let stored = as_stored(&machine_set(4, &[(AUTOSCALER_MIN_SIZE_ANNOTATION, "1")]));
            let patch = machine_set_patch(&machine_set(2, &[]), &ScalingMode::Fixed { replicas: 2 });
            let before = serde_json::to_value(&stored).expect("serializable");
            assert!(!is_applied(Some(&before), &patch));

            let after = serde_json::to_value(apply(&stored, &patch)).expect("serializable");
            assert!(is_applied(Some(&after), &patch));
        }
    }

    mod create_or_update_flow {
        use super::*;

        #[tokio::test]
        async fn creates_when_absent() {
            let mut capi = MockCapiClient::new();
            capi.expect_get_manifest().returning(|_, _, _, _| Ok(None));
            capi.expect_create_manifest()
                .times(1)
                .returning(|m| Ok(m.clone()));
            capi.expect_patch_manifest().never();

            let desired = machine_set(2, &[]);
            let (outcome, stored) =
                create_or_update(&capi, &desired, &template_patch(&desired))
                    .await
                    .expect("should create");

            assert_eq!(outcome, UpsertOutcome::Created);
            assert_eq!(stored, desired);
        }

        /// Story: a stored object carrying server defaults and foreign
        /// metadata is not written again
        #[tokio::test]
        async fn story_server_defaults_do_not_trigger_writes() {
            let stored = as_stored(&machine_set(2, &[]));

            let mut capi = MockCapiClient::new();
            let returned = stored.clone();
            capi.expect_get_manifest()
                .returning(move |_, _, _, _| Ok(Some(returned.clone())));
            capi.expect_create_manifest().never();
            capi.expect_patch_manifest().never();

            let desired = machine_set(2, &[]);
            let patch = machine_set_patch(&desired, &ScalingMode::Fixed { replicas: 2 });
            let (outcome, current) = create_or_update(&capi, &desired, &patch)
                .await
                .expect("should succeed");

            assert_eq!(outcome, UpsertOutcome::Unchanged);
            assert_eq!(current.available_replicas(), 2);
        }

        #[tokio::test]
        async fn changed_fields_are_patched() {
            let stored = as_stored(&machine_set(1, &[]));

            let mut capi = MockCapiClient::new();
            capi.expect_get_manifest()
                .returning(move |_, _, _, _| Ok(Some(stored.clone())));
            capi.expect_patch_manifest()
                .withf(|m, patch| m.metadata.name == "infra-x-c1-p1" && patch["spec"]["replicas"] == 3)
                .times(1)
                .returning(|m, _| Ok(m.clone()));

            let desired = machine_set(3, &[]);
            let patch = machine_set_patch(&desired, &ScalingMode::Fixed { replicas: 3 });
            let (outcome, _) = create_or_update(&capi, &desired, &patch)
                .await
                .expect("should update");

            assert_eq!(outcome, UpsertOutcome::Updated);
        }

        #[tokio::test]
        async fn store_failures_name_the_object() {
            let mut capi = MockCapiClient::new();
            capi.expect_get_manifest().returning(|_, _, _, _| Ok(None));
            capi.expect_create_manifest().returning(|_| {
                Err(Error::Kube {
                    source: kube::Error::Api(kube::error::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "admission webhook denied".to_string(),
                        reason: "Forbidden".to_string(),
                        code: 403,
                    }),
                })
            });

            let desired = machine_set(1, &[]);
            let err = create_or_update(&capi, &desired, &template_patch(&desired))
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Upsert { .. }));
            assert!(err.to_string().contains("MachineSet infra-x-c1-p1"));
            assert!(err.is_retryable());
        }
    }
}
