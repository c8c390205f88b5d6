//! Renderer error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while rendering control-plane manifests
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to parse or render
    #[error("failed to render {template}: {source}")]
    Template {
        /// Template name
        template: String,
        /// Underlying minijinja error
        #[source]
        source: minijinja::Error,
    },

    /// A component lists a template that is not in the source
    #[error("component {component} references missing template {template}")]
    MissingTemplate {
        /// Component the template belongs to
        component: String,
        /// Missing template name
        template: String,
    },

    /// Render parameters could not be turned into a template context
    #[error("invalid render parameters: {0}")]
    Params(String),

    /// Reading a template or writing a manifest failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File the operation was on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Wrap a minijinja error with the template it came from
    pub fn template(template: impl Into<String>, source: minijinja::Error) -> Self {
        Self::Template {
            template: template.into(),
            source,
        }
    }

    /// Wrap an I/O error with the path it came from
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
