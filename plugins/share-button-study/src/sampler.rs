//! Deterministic weighted sampling.
//!
//! A client is bucketed by hashing `study_name + client_identity` into a
//! fraction in `[0, 1)` and walking the weighted list until the fraction falls
//! inside a bucket. The same identity always lands in the same bucket, on any
//! machine, across restarts.

use sha2::{Digest, Sha256};

use crate::config::Variant;
use crate::error::{Result, StudyError};

/// Hex digits of the digest used for the fraction (48 bits).
const FRACTION_HEX_DIGITS: usize = 12;

/// Map `seed` to a fraction in `[0, 1)`.
///
/// Takes the first 48 bits of the SHA-256 digest and divides by `2^48`.
pub fn hash_fraction(seed: &str) -> f64 {
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    let prefix = &digest[..FRACTION_HEX_DIGITS];
    // 12 hex digits always parse into a u64
    let value = u64::from_str_radix(prefix, 16).unwrap_or(0);
    value as f64 / (1u64 << 48) as f64
}

/// Pick the variant whose bucket contains `fraction`.
///
/// Buckets are laid out in list order, each sized `weight / total`, and are
/// half-open: a fraction exactly on a boundary belongs to the later bucket.
/// Rounding residue at the top end falls into the last bucket.
pub fn choose_weighted(variants: &[Variant], fraction: f64) -> Result<&Variant> {
    if !(0.0..1.0).contains(&fraction) {
        return Err(StudyError::config(format!(
            "fraction {fraction} is outside [0, 1)"
        )));
    }
    let Some(last) = variants.last() else {
        return Err(StudyError::config("no variants to choose from"));
    };
    if let Some(bad) = variants
        .iter()
        .find(|v| !v.weight.is_finite() || v.weight <= 0.0)
    {
        return Err(StudyError::config(format!(
            "variant {} has invalid weight {}",
            bad.name, bad.weight
        )));
    }

    let total: f64 = variants.iter().map(|v| v.weight).sum();
    let mut upper = 0.0;
    for variant in variants {
        upper += variant.weight / total;
        if fraction < upper {
            return Ok(variant);
        }
    }
    Ok(last)
}
