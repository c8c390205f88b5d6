//! Deterministic, length-bounded names for generated resources.
//!
//! Cloud providers cap resource names well below
//! `infraName-clusterName-poolName`, and plain truncation would let two
//! pools with a shared prefix collide. Names that do not fit therefore embed
//! an 8 character FNV-1a digest, which keeps them unique with high
//! probability and identical across reconciliations.

use crate::constants::MAX_MACHINE_RESOURCE_NAME_LENGTH;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Length of `"-" + digest + "-"`
const DIGEST_SEPARATOR_LEN: usize = 10;

/// Length of `"-" + digest`
const DIGEST_SUFFIX_LEN: usize = 9;

/// 32-bit FNV-1a digest of `s` as 8 lowercase hex characters
pub fn short_hash(s: &str) -> String {
    let digest = s.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    });
    format!("{digest:08x}")
}

/// Derive a name from `base` and `suffix` that fits in `max_length` bytes.
///
/// Returns `base-suffix` when it fits. Otherwise the base is truncated and
/// a digest of the base is spliced in: `base[..n]-<digest>-suffix`. When the
/// suffix alone leaves no room for that, the digest covers the whole
/// `base-suffix` candidate and the suffix is dropped.
pub fn derive_name(base: &str, suffix: &str, max_length: usize) -> String {
    if max_length == 0 {
        return String::new();
    }

    let candidate = format!("{base}-{suffix}");
    if candidate.len() <= max_length {
        return candidate;
    }

    match max_length.checked_sub(DIGEST_SEPARATOR_LEN + suffix.len()) {
        Some(budget) => format!("{}-{}-{}", truncate(base, budget), short_hash(base), suffix),
        None => {
            let prefix = truncate(base, max_length.saturating_sub(DIGEST_SUFFIX_LEN));
            let short = format!("{}-{}", prefix, short_hash(&candidate));
            truncate(&short, max_length).to_string()
        }
    }
}

/// Name of the MachineSet and AWSMachineTemplate generated for a pool
pub fn machine_set_name(infra_name: &str, cluster_name: &str, pool_name: &str) -> String {
    derive_name(
        &format!("{infra_name}-{cluster_name}"),
        pool_name,
        MAX_MACHINE_RESOURCE_NAME_LENGTH,
    )
}

/// Longest prefix of `s` no longer than `max` bytes, ending on a char boundary
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
