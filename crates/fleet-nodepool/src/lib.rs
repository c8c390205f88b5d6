//! NodePool reconciliation for fleet
//!
//! Turns each NodePool into an AWS machine template plus a machine set in
//! its hosted cluster's namespace, keeps the two in line with the pool's
//! scaling mode and removes them again when the pool is deleted.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod mode;
pub mod status;
pub mod upsert;

pub use client::{CapiClient, CapiClientImpl, NodePoolClient, NodePoolClientImpl};
pub use controller::{error_policy, reconcile, Context, ContextBuilder, CONTROLLER_NAME};
pub use mode::{resolve_mode, ScalingMode};
