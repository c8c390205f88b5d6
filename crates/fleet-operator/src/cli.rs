//! Command-line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use fleet_common::backoff::BackoffConfig;
use fleet_common::telemetry::LogFormat;
use fleet_common::DEFAULT_IMAGE_SOURCE_NAMESPACE;

/// Fleet - reconciles NodePools into Cluster API machine sets
#[derive(Parser, Debug)]
#[command(name = "fleet-operator", version, about, long_about = None)]
pub struct Cli {
    /// Log output format (json or text)
    #[arg(long, env = "FLEET_LOG_FORMAT", default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub controller: ControllerArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operator subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the NodePool controller (default)
    Controller,
    /// Print the CRDs this operator owns as YAML and exit
    Crd,
    /// Render hosted control-plane manifests into a directory
    Render(RenderArgs),
}

/// Controller tuning
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Namespace scanned for machine sets whose AMI seeds new pools
    #[arg(long, env = "FLEET_IMAGE_SOURCE_NAMESPACE", default_value = DEFAULT_IMAGE_SOURCE_NAMESPACE)]
    pub image_source_namespace: String,

    /// Delay after the first failed pass, in milliseconds
    #[arg(long, env = "FLEET_BACKOFF_FLOOR_MS", default_value_t = 1000)]
    pub backoff_floor_ms: u64,

    /// Upper bound on the failure backoff, in milliseconds
    #[arg(long, env = "FLEET_BACKOFF_CEILING_MS", default_value_t = 10_000)]
    pub backoff_ceiling_ms: u64,

    /// Requeue interval while a fixed-size pool waits for its nodes
    #[arg(long, env = "FLEET_CONVERGENCE_POLL_SECS", default_value_t = 5)]
    pub convergence_poll_secs: u64,

    /// Only watch NodePools in this namespace (all namespaces when unset)
    #[arg(long, env = "FLEET_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,
}

impl ControllerArgs {
    /// Backoff bounds, rejecting a zero floor or a ceiling below it
    pub fn backoff(&self) -> anyhow::Result<BackoffConfig> {
        if self.backoff_floor_ms == 0 {
            anyhow::bail!("--backoff-floor-ms must be greater than zero");
        }
        if self.backoff_ceiling_ms < self.backoff_floor_ms {
            anyhow::bail!(
                "--backoff-ceiling-ms ({}) must not be below --backoff-floor-ms ({})",
                self.backoff_ceiling_ms,
                self.backoff_floor_ms
            );
        }
        Ok(BackoffConfig::from_millis(
            self.backoff_floor_ms,
            self.backoff_ceiling_ms,
        ))
    }

    /// Convergence requeue interval, rejecting zero
    pub fn convergence_poll_interval(&self) -> anyhow::Result<Duration> {
        if self.convergence_poll_secs == 0 {
            anyhow::bail!("--convergence-poll-secs must be greater than zero");
        }
        Ok(Duration::from_secs(self.convergence_poll_secs))
    }
}

/// Inputs for the manifest renderer
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Directory holding the component templates
    #[arg(long)]
    pub templates: PathBuf,

    /// YAML or JSON file with the cluster parameters
    #[arg(long)]
    pub params: PathBuf,

    /// YAML or JSON file with release `images` and `versions`
    #[arg(long)]
    pub release: PathBuf,

    /// Directory holding PKI material
    #[arg(long)]
    pub pki_dir: PathBuf,

    /// File holding the pull secret
    #[arg(long)]
    pub pull_secret: PathBuf,

    /// Directory the manifests are written to
    #[arg(long, short)]
    pub output: PathBuf,
}
