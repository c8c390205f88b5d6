//! Control-plane component table
//!
//! Order matters only for the output listing; every file is written under
//! its base name.

/// One control-plane component and its templates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Component {
    /// Component name used in errors and logs
    pub name: &'static str,
    /// Templates rendered straight into the output directory
    pub manifests: &'static [&'static str],
    /// Templates applied inside the hosted cluster via user-manifest ConfigMaps
    pub user_manifests: &'static [&'static str],
}

const fn component(
    name: &'static str,
    manifests: &'static [&'static str],
    user_manifests: &'static [&'static str],
) -> Component {
    Component {
        name,
        manifests,
        user_manifests,
    }
}

/// Template rendered once per etcd TLS secret
pub const ETCD_SECRET_TEMPLATE: &str = "etcd/etcd-secret-template.yaml";

/// etcd TLS secrets, as `(secret, file)` template parameters
pub const ETCD_SECRETS: &[(&str, &str)] = &[
    ("etcd-client", "etcd-client"),
    ("server", "etcd-server"),
    ("peer", "etcd-peer"),
];

/// Template rendered once per aggregated OpenShift API group
pub const API_SERVICE_TEMPLATE: &str = "openshift-apiserver/service-template.yaml";

/// Output name of the concatenated APIService user manifest
pub const API_SERVICES_MANIFEST: &str = "openshift-apiserver-apiservices.yaml";

/// Aggregated OpenShift API groups served by the hosted apiserver
pub const API_SERVICES: &[&str] = &[
    "v1.apps.openshift.io",
    "v1.authorization.openshift.io",
    "v1.build.openshift.io",
    "v1.image.openshift.io",
    "v1.oauth.openshift.io",
    "v1.project.openshift.io",
    "v1.quota.openshift.io",
    "v1.route.openshift.io",
    "v1.security.openshift.io",
    "v1.template.openshift.io",
    "v1.user.openshift.io",
];

/// Directory whose every template is a user manifest
pub const CLUSTER_BOOTSTRAP_DIR: &str = "cluster-bootstrap";

/// Directory whose every template becomes an ignition ConfigMap
pub const IGNITION_CONFIGS_DIR: &str = "ignition-configs";

/// Wrapper template for user manifests
pub const USER_MANIFEST_TEMPLATE: &str = "user-manifests-bootstrapper/user-manifest-template.yaml";

/// Wrapper for ignition configs
pub const IGNITION_CONFIG_TEMPLATE: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ name }}
  labels:
    ignition-config: "true"
data:
  data: |-
{{ indent(4, content) }}
"#;

/// Components in render order
pub const COMPONENTS: &[Component] = &[
    component(
        "service-admin-kubeconfig",
        &["common/service-network-admin-kubeconfig-secret.yaml"],
        &[],
    ),
    component(
        "etcd",
        &[
            "etcd/etcd-cluster-crd.yaml",
            "etcd/etcd-cluster.yaml",
            "etcd/etcd-operator-cluster-role-binding.yaml",
            "etcd/etcd-operator-cluster-role.yaml",
            "etcd/etcd-operator-serviceaccount.yaml",
            "etcd/etcd-operator.yaml",
        ],
        &[],
    ),
    component(
        "kube-apiserver",
        &[
            "kube-apiserver/kube-apiserver-deployment.yaml",
            "kube-apiserver/kube-apiserver-service.yaml",
            "kube-apiserver/kube-apiserver-config-configmap.yaml",
            "kube-apiserver/kube-apiserver-oauth-metadata-configmap.yaml",
            "kube-apiserver/kube-apiserver-vpnclient-config.yaml",
            "kube-apiserver/kube-apiserver-secret.yaml",
            "kube-apiserver/kube-apiserver-configmap.yaml",
            "kube-apiserver/kube-apiserver-vpnclient-secret.yaml",
        ],
        &[],
    ),
    component(
        "kube-controller-manager",
        &[
            "kube-controller-manager/kube-controller-manager-deployment.yaml",
            "kube-controller-manager/kube-controller-manager-config-configmap.yaml",
            "kube-controller-manager/kube-controller-manager-secret.yaml",
            "kube-controller-manager/kube-controller-manager-configmap.yaml",
        ],
        &[],
    ),
    component(
        "kube-scheduler",
        &[
            "kube-scheduler/kube-scheduler-deployment.yaml",
            "kube-scheduler/kube-scheduler-config-configmap.yaml",
            "kube-scheduler/kube-scheduler-secret.yaml",
        ],
        &[],
    ),
    component(
        "cluster-version-operator",
        &["cluster-version-operator/cluster-version-operator-deployment.yaml"],
        &[],
    ),
    component(
        "openshift-apiserver",
        &[
            "openshift-apiserver/openshift-apiserver-deployment.yaml",
            "openshift-apiserver/openshift-apiserver-service.yaml",
            "openshift-apiserver/openshift-apiserver-config-configmap.yaml",
            "openshift-apiserver/openshift-apiserver-secret.yaml",
            "openshift-apiserver/openshift-apiserver-configmap.yaml",
        ],
        &[
            "openshift-apiserver/openshift-apiserver-user-service.yaml",
            "openshift-apiserver/openshift-apiserver-user-endpoint.yaml",
        ],
    ),
    component(
        "openshift-controller-manager",
        &[
            "openshift-controller-manager/openshift-controller-manager-deployment.yaml",
            "openshift-controller-manager/openshift-controller-manager-config-configmap.yaml",
            "openshift-controller-manager/cluster-policy-controller-deployment.yaml",
            "openshift-controller-manager/openshift-controller-manager-secret.yaml",
            "openshift-controller-manager/openshift-controller-manager-configmap.yaml",
        ],
        &[
            "openshift-controller-manager/00-openshift-controller-manager-namespace.yaml",
            "openshift-controller-manager/openshift-controller-manager-service-ca.yaml",
        ],
    ),
    component(
        "control-plane-operator",
        &[
            "control-plane-operator/cp-operator-serviceaccount.yaml",
            "control-plane-operator/cp-operator-role.yaml",
            "control-plane-operator/cp-operator-rolebinding.yaml",
            "control-plane-operator/cp-operator-deployment.yaml",
            "control-plane-operator/cp-operator-configmap.yaml",
        ],
        &[],
    ),
    component(
        "oauth-openshift",
        &[
            "oauth-openshift/oauth-browser-client.yaml",
            "oauth-openshift/oauth-challenging-client.yaml",
            "oauth-openshift/oauth-server-config-configmap.yaml",
            "oauth-openshift/oauth-server-deployment.yaml",
            "oauth-openshift/oauth-server-service.yaml",
            "oauth-openshift/v4-0-config-system-branding.yaml",
            "oauth-openshift/oauth-server-sessionsecret-secret.yaml",
            "oauth-openshift/oauth-server-secret.yaml",
            "oauth-openshift/oauth-server-configmap.yaml",
        ],
        &["oauth-openshift/ingress-certs-secret.yaml"],
    ),
    component(
        "openvpn",
        &[
            "openvpn/openvpn-serviceaccount.yaml",
            "openvpn/openvpn-server-deployment.yaml",
            "openvpn/openvpn-ccd-configmap.yaml",
            "openvpn/openvpn-server-configmap.yaml",
            "openvpn/openvpn-server-secret.yaml",
            "openvpn/openvpn-client-secret.yaml",
        ],
        &[
            "openvpn/openvpn-client-deployment.yaml",
            "openvpn/openvpn-client-configmap.yaml",
        ],
    ),
    component("registry", &[], &["registry/cluster-imageregistry-config.yaml"]),
    component(
        "user-manifests-bootstrapper",
        &[
            "user-manifests-bootstrapper/user-manifests-bootstrapper-serviceaccount.yaml",
            "user-manifests-bootstrapper/user-manifests-bootstrapper-rolebinding.yaml",
            "user-manifests-bootstrapper/user-manifests-bootstrapper-pod.yaml",
        ],
        &[],
    ),
    component(
        "router-proxy",
        &[
            "router-proxy/router-proxy-deployment.yaml",
            "router-proxy/router-proxy-configmap.yaml",
            "router-proxy/router-proxy-vpnclient-configmap.yaml",
            "router-proxy/router-proxy-http-service.yaml",
            "router-proxy/router-proxy-https-service.yaml",
            "router-proxy/router-proxy-vpnclient-secret.yaml",
        ],
        &[],
    ),
    component(
        "machine-config-server",
        &[
            "machine-config-server/machine-config-server-configmap.yaml",
            "machine-config-server/machine-config-server-serviceaccount.yaml",
            "machine-config-server/machine-config-server-rolebinding.yaml",
            "machine-config-server/machine-config-server-deployment.yaml",
            "machine-config-server/machine-config-server-service.yaml",
            "machine-config-server/machine-config-server-secret.yaml",
            "machine-config-server/machine-config-server-kubeconfig-secret.yaml",
        ],
        &[],
    ),
];

/// Every template the fixed table requires, with its component
pub fn required_templates() -> impl Iterator<Item = (&'static str, &'static str)> {
    let fixed = COMPONENTS.iter().flat_map(|c| {
        c.manifests
            .iter()
            .chain(c.user_manifests.iter())
            .map(move |t| (c.name, *t))
    });
    fixed.chain([
        ("etcd", ETCD_SECRET_TEMPLATE),
        ("openshift-apiserver", API_SERVICE_TEMPLATE),
        ("user-manifests-bootstrapper", USER_MANIFEST_TEMPLATE),
    ])
}

/// Base file name of a template path
pub fn base_name(template: &str) -> &str {
    template.rsplit('/').next().unwrap_or(template)
}

/// ConfigMap name wrapping a user manifest file
///
/// `cluster_bootstrap_x.yaml` becomes `user-manifest-cluster-bootstrap-x`.
pub fn user_config_map_name(file: &str) -> String {
    let stem = file.split('.').next().unwrap_or(file);
    format!("user-manifest-{}", stem.replace('_', "-"))
}
