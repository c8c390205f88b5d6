//! CAPI resource generation for fleet NodePools
//!
//! Deterministic naming, the untyped manifest model, and the compiler that
//! turns a NodePool into an `AWSMachineTemplate` and a `MachineSet`.

#![deny(missing_docs)]

pub mod compiler;
pub mod constants;
pub mod manifest;
pub mod naming;

pub use compiler::{compile, resolve_image, ClusterContext, GeneratedResourceSet};
pub use manifest::{build_api_resource, CAPIManifest, ManifestMetadata};
pub use naming::{derive_name, machine_set_name};
