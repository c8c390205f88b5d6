//! NodePool controller wiring

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use fleet_common::crd::NodePool;
use fleet_nodepool::{error_policy, reconcile, Context};

use crate::cli::ControllerArgs;
use crate::crds::ensure_crds_installed;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so idle watches are closed by the API server first.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Install CRDs and run the NodePool controller until a shutdown signal
pub async fn run_controller(args: &ControllerArgs) -> anyhow::Result<()> {
    let backoff = args.backoff()?;
    let poll_interval = args.convergence_poll_interval()?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create kube client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let ctx = Arc::new(
        Context::builder(client.clone())
            .image_source_namespace(args.image_source_namespace.clone())
            .backoff(backoff)
            .convergence_poll_interval(poll_interval)
            .build(),
    );

    let node_pools: Api<NodePool> = match &args.watch_namespace {
        Some(ns) => {
            tracing::info!(namespace = %ns, "Watching NodePools in one namespace");
            Api::namespaced(client, ns)
        }
        None => Api::all(client),
    };

    tracing::info!(
        image_source_namespace = %args.image_source_namespace,
        "Starting NodePool controller"
    );

    Controller::new(node_pools, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("NodePool"))
        .await;

    tracing::info!("NodePool controller stopped");
    Ok(())
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
