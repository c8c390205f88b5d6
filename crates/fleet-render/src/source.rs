//! Template sources
//!
//! Templates are addressed by their path relative to the asset root, using
//! `/` separators (`etcd/etcd-cluster.yaml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::RenderError;

/// Named template texts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateSource {
    templates: BTreeMap<String, String>,
}

impl TemplateSource {
    /// Build a source from in-memory `(name, text)` pairs
    pub fn in_memory<I, K, V>(templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load every file below `root`, named by its relative path
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self, RenderError> {
        let root = root.as_ref();
        let mut templates = BTreeMap::new();
        load_dir(root, root, &mut templates)?;
        debug!(root = %root.display(), count = templates.len(), "Loaded templates");
        Ok(Self { templates })
    }

    /// Add or replace one template
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    /// Text of a template
    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Whether a template exists
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Names of the templates directly inside `dir`, sorted
    pub fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.templates
            .keys()
            .filter_map(|name| name.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }

    /// Iterate `(name, text)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.templates
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True if there are no templates
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn load_dir(
    root: &Path,
    dir: &Path,
    templates: &mut BTreeMap<String, String>,
) -> Result<(), RenderError> {
    let entries = fs::read_dir(dir).map_err(|e| RenderError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| RenderError::io(dir, e))?.path();
        if path.is_dir() {
            load_dir(root, &path, templates)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let text = fs::read_to_string(&path).map_err(|e| RenderError::io(&path, e))?;
        templates.insert(name, text);
    }
    Ok(())
}
