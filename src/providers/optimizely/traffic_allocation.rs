use crate::error::{Result, WatchError};

use super::types::Variant;

/// Total traffic in basis points that Optimizely distributes across variations.
pub const DEFAULT_TOTAL_ALLOCATION: i64 = 10_000;

/// Checks whether variation weights represent an equal traffic split.
///
/// Integer division leaves a remainder when the total is not divisible by the
/// number of variations; Optimizely assigns that remainder to one variation, so
/// the accepted weights are the per-variation share and the share that absorbs
/// the remainder.
///
/// # Errors
///
/// Returns [`WatchError::Validation`] when `variants` is empty, since there is
/// no split to judge.
pub fn is_equal_split(total_allocation: i64, variants: &[Variant]) -> Result<bool> {
    let count = i64::try_from(variants.len())
        .map_err(|_| WatchError::Validation("too many variations".to_string()))?;
    if count == 0 {
        return Err(WatchError::Validation(
            "experiment has no variations".to_string(),
        ));
    }

    let per_variant = total_allocation / count;
    let remainder_share = if per_variant * count == total_allocation {
        None
    } else {
        Some(total_allocation - per_variant * (count - 1))
    };

    Ok(variants.iter().all(|variant| match variant.weight {
        Some(weight) => weight == per_variant || Some(weight) == remainder_share,
        None => false,
    }))
}
