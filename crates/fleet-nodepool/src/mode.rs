//! Autoscaling mode resolution
//!
//! A NodePool is either sized by `nodeCount` or handed to the cluster
//! autoscaler through `autoScaling` bounds. The presence of `autoScaling`
//! always wins, and `nodeCount` is cleared while it is set so only one of
//! the two is ever consulted in a pass.

use fleet_common::crd::{NodePoolAutoScaling, NodePoolSpec};
use fleet_common::{Error, Result};

/// Replicas a new autoscaled group starts with
///
/// The autoscaler cannot scale a group up from zero.
pub const AUTOSCALING_BOOTSTRAP_REPLICAS: u32 = 1;

/// How the replica count of a pool is decided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalingMode {
    /// The declared node count is authoritative
    Fixed {
        /// Declared node count (unset means zero)
        replicas: u32,
    },
    /// The cluster autoscaler owns the replica count within these bounds
    Autoscaling {
        /// Lower bound
        min: u32,
        /// Upper bound
        max: u32,
    },
}

impl ScalingMode {
    /// Whether the autoscaler owns the replica count
    pub fn is_autoscaling(&self) -> bool {
        matches!(self, ScalingMode::Autoscaling { .. })
    }

    /// Replica count compiled into the group
    ///
    /// An autoscaled group only gets it when created. Afterwards its count is
    /// never written.
    pub fn initial_replicas(&self) -> u32 {
        match self {
            ScalingMode::Fixed { replicas } => *replicas,
            ScalingMode::Autoscaling { .. } => AUTOSCALING_BOOTSTRAP_REPLICAS,
        }
    }
}

/// Resolve the scaling mode of a pool
///
/// Clears `spec.nodeCount` whenever autoscaling is requested. Malformed
/// bounds fail with a validation error naming `node_pool`.
pub fn resolve_mode(node_pool: &str, spec: &mut NodePoolSpec) -> Result<ScalingMode> {
    let Some(bounds) = spec.auto_scaling.clone() else {
        return Ok(ScalingMode::Fixed {
            replicas: spec.node_count.unwrap_or(0),
        });
    };

    spec.node_count = None;
    let (min, max) = validate_bounds(&bounds)
        .map_err(|msg| Error::validation_for_field(node_pool, "spec.autoScaling", msg))?;
    Ok(ScalingMode::Autoscaling { min, max })
}

/// Check autoscaling bounds, returning `(min, max)`
pub fn validate_bounds(bounds: &NodePoolAutoScaling) -> std::result::Result<(u32, u32), String> {
    let (Some(min), Some(max)) = (bounds.min, bounds.max) else {
        return Err(format!(
            "max and min must be not nil. Max: {:?}, Min: {:?}",
            bounds.max, bounds.min
        ));
    };
    if max < min {
        return Err(format!(
            "max must be equal or greater than min. Max: {max}, Min: {min}"
        ));
    }
    if max == 0 && min == 0 {
        return Err(format!("max and min must be not zero. Max: {max}, Min: {min}"));
    }
    Ok((min, max))
}
