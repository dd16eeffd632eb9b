//! Weighted, missing-aware distance between feature vectors.
//!
//! The metric is a weighted L1 (Manhattan) sum with no normalisation:
//!
//! ```text
//! d(q, c) = Σ_{i ∈ P(q), c[i] ≠ MISSING} w[i] · |q[i] - c[i]|
//! ```
//!
//! ## Important nuance
//!
//! Missing features are handled **asymmetrically**. The index set `P(q)` is
//! computed once per query ([`present_features`]) and shared by every
//! candidate of a fan-out; the candidate side is checked per index while
//! summing. The resulting value still skips exactly the indices where either
//! side is missing.

/// Sentinel value for a feature that was not observed for an instance.
pub const MISSING: f64 = -1.0;

/// Whether a feature value is the [`MISSING`] sentinel.
#[inline]
#[must_use]
pub fn is_missing(value: f64) -> bool {
    value == MISSING
}

/// Indices of the features of `vector` that are not [`MISSING`].
#[must_use]
pub fn present_features(vector: &[f64]) -> Vec<usize> {
    vector
        .iter()
        .enumerate()
        .filter(|&(_, &v)| !is_missing(v))
        .map(|(i, _)| i)
        .collect()
}

/// Weighted L1 distance from `query` to `candidate` over `present`.
///
/// `present` must come from [`present_features`] of `query`. Indices where the
/// candidate is [`MISSING`] contribute nothing.
#[inline]
#[must_use]
pub fn weighted_distance(query: &[f64], candidate: &[f64], weights: &[f64], present: &[usize]) -> f64 {
    let mut d = 0.0;
    for &i in present {
        let c = candidate[i];
        if !is_missing(c) {
            d += weights[i] * (query[i] - c).abs();
        }
    }
    d
}

/// Absolute per-feature difference, or `0.0` when either side is [`MISSING`].
///
/// Used by the weight learner to compare single features of neighbours.
#[inline]
#[must_use]
pub fn feature_difference(a: f64, b: f64) -> f64 {
    if is_missing(a) || is_missing(b) {
        0.0
    } else {
        (a - b).abs()
    }
}
