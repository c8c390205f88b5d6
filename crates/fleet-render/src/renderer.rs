//! Hosted control-plane manifest rendering
//!
//! Renders the component table against cluster parameters and release
//! metadata. Control-plane manifests land directly in the output; manifests
//! meant for the hosted cluster itself are wrapped into user-manifest
//! ConfigMaps, and ignition configs into labelled ConfigMaps.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::{
    base_name, required_templates, user_config_map_name, API_SERVICES, API_SERVICES_MANIFEST,
    API_SERVICE_TEMPLATE, CLUSTER_BOOTSTRAP_DIR, COMPONENTS, ETCD_SECRETS, ETCD_SECRET_TEMPLATE,
    IGNITION_CONFIGS_DIR, IGNITION_CONFIG_TEMPLATE, USER_MANIFEST_TEMPLATE,
};
use crate::error::RenderError;
use crate::functions::{self, FunctionContext};
use crate::source::TemplateSource;

/// Parameter holding the CA bundle for aggregated API services
pub const CA_BUNDLE_PARAM: &str = "OpenshiftAPIServerCABundle";

/// Component images and versions of a release payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReleaseInfo {
    /// Component name to image pull spec
    pub images: BTreeMap<String, String>,
    /// Component name to version, including `release`
    pub versions: BTreeMap<String, String>,
}

/// Rendered manifests keyed by output file name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedManifests {
    manifests: BTreeMap<String, String>,
}

impl RenderedManifests {
    /// Content of one output file
    pub fn get(&self, name: &str) -> Option<&str> {
        self.manifests.get(name).map(String::as_str)
    }

    /// Output file names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.manifests.keys().map(String::as_str)
    }

    /// Number of output files
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// True if nothing was rendered
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Write every manifest into `dir`, creating it if needed
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, RenderError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| RenderError::io(dir, e))?;

        let mut written = Vec::with_capacity(self.manifests.len());
        for (name, content) in &self.manifests {
            let path = dir.join(name);
            fs::write(&path, content).map_err(|e| RenderError::io(&path, e))?;
            written.push(path);
        }
        info!(dir = %dir.display(), count = written.len(), "Wrote manifests");
        Ok(written)
    }

    fn add(&mut self, name: impl Into<String>, content: String) {
        let name = name.into();
        debug!(manifest = %name, "Rendered manifest");
        self.manifests.insert(name, content);
    }
}

/// Render all control-plane manifests for one hosted cluster
///
/// `params` is the template context for component templates. Every template
/// the component table names must be present in `templates`.
pub fn render_cluster_manifests<P: Serialize>(
    params: &P,
    release: &ReleaseInfo,
    pki_dir: &Path,
    pull_secret_file: &Path,
    templates: &TemplateSource,
) -> Result<RenderedManifests, RenderError> {
    let params = serde_json::to_value(params).map_err(|e| RenderError::Params(e.to_string()))?;
    if !params.is_object() {
        return Err(RenderError::Params(
            "parameters must serialize to a map".to_string(),
        ));
    }

    for (component, template) in required_templates() {
        if !templates.contains(template) {
            return Err(RenderError::MissingTemplate {
                component: component.to_string(),
                template: template.to_string(),
            });
        }
    }

    let ctx = Value::from_serialize(&params);
    let env = build_environment(
        templates,
        FunctionContext {
            images: release.images.clone(),
            versions: release.versions.clone(),
            pki_dir: pki_dir.to_path_buf(),
            pull_secret_file: pull_secret_file.to_path_buf(),
            params: ctx.clone(),
        },
    )?;

    let mut out = RenderedManifests::default();
    let mut user_files: Vec<String> = Vec::new();
    let mut user_inline: BTreeMap<String, String> = BTreeMap::new();

    for component in COMPONENTS {
        for template in component.manifests {
            out.add(base_name(template), render(&env, template, &ctx)?);
        }
        user_files.extend(component.user_manifests.iter().map(|t| t.to_string()));

        match component.name {
            "etcd" => render_etcd_secrets(&env, &mut out)?,
            "openshift-apiserver" => {
                let ca_bundle = params
                    .get(CA_BUNDLE_PARAM)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                user_inline.insert(
                    API_SERVICES_MANIFEST.to_string(),
                    render_api_services(&env, ca_bundle)?,
                );
            }
            "openshift-controller-manager" => user_files.extend(
                templates
                    .list_dir(CLUSTER_BOOTSTRAP_DIR)
                    .into_iter()
                    .map(|f| format!("{CLUSTER_BOOTSTRAP_DIR}/{f}")),
            ),
            _ => {}
        }
    }

    for file in &user_files {
        let data = render(&env, file, &ctx)?;
        wrap_user_manifest(&env, &mut out, base_name(file), data)?;
    }
    for (name, data) in user_inline {
        wrap_user_manifest(&env, &mut out, &name, data)?;
    }

    render_ignition_configs(&env, templates, &ctx, &mut out)?;

    info!(count = out.len(), "Rendered cluster manifests");
    Ok(out)
}

fn build_environment(
    templates: &TemplateSource,
    functions: FunctionContext,
) -> Result<Environment<'static>, RenderError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);

    for (name, text) in templates.iter() {
        env.add_template_owned(name.to_string(), text.to_string())
            .map_err(|e| RenderError::template(name, e))?;
    }
    functions::register(&mut env, functions);
    Ok(env)
}

fn render<S: Serialize>(env: &Environment<'_>, template: &str, ctx: S) -> Result<String, RenderError> {
    env.get_template(template)
        .and_then(|t| t.render(ctx))
        .map_err(|e| RenderError::template(template, e))
}

fn render_etcd_secrets(env: &Environment<'_>, out: &mut RenderedManifests) -> Result<(), RenderError> {
    for (secret, file) in ETCD_SECRETS {
        let ctx = minijinja::context! { secret => secret, file => file };
        out.add(
            format!("{file}-tls-secret.yaml"),
            render(env, ETCD_SECRET_TEMPLATE, ctx)?,
        );
    }
    Ok(())
}

fn render_api_services(env: &Environment<'_>, ca_bundle: &str) -> Result<String, RenderError> {
    let mut rendered = String::new();
    for api_service in API_SERVICES {
        let group = api_service.split_once('.').map(|(_, g)| g).unwrap_or_default();
        let ctx = minijinja::context! {
            APIService => api_service,
            APIServiceGroup => group,
            OpenshiftAPIServerCABundle => ca_bundle,
        };
        rendered.push_str(&render(env, API_SERVICE_TEMPLATE, ctx)?);
    }
    Ok(rendered)
}

fn wrap_user_manifest(
    env: &Environment<'_>,
    out: &mut RenderedManifests,
    file: &str,
    data: String,
) -> Result<(), RenderError> {
    let ctx = minijinja::context! { data => data, name => user_config_map_name(file) };
    out.add(
        format!("user-manifest-{file}"),
        render(env, USER_MANIFEST_TEMPLATE, ctx)?,
    );
    Ok(())
}

fn render_ignition_configs(
    env: &Environment<'_>,
    templates: &TemplateSource,
    ctx: &Value,
    out: &mut RenderedManifests,
) -> Result<(), RenderError> {
    for file in templates.list_dir(IGNITION_CONFIGS_DIR) {
        let template = format!("{IGNITION_CONFIGS_DIR}/{file}");
        let content = render(env, &template, ctx)?;
        let name = format!(
            "ignition-config-{}",
            file.strip_suffix(".yaml").unwrap_or(&file)
        );
        let wrapped = env
            .render_str(
                IGNITION_CONFIG_TEMPLATE,
                minijinja::context! { name => &name, content => content },
            )
            .map_err(|e| RenderError::template(&template, e))?;
        out.add(format!("{name}.yaml"), wrapped);
    }
    Ok(())
}
