//! Per-feature weight vector of the learned metric.

use rand::Rng;

use crate::error::{KnnError, Result};

/// Factor applied to weights in the persisted text record.
pub const RECORD_SCALE: f64 = 1000.0;

/// Per-feature weights used by [`crate::distance::weighted_distance`].
///
/// Created once, mutated in place by [`crate::WeightLearner`], then read-only
/// during classification. The length never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    values: Vec<f64>,
}

impl WeightVector {
    /// Random weights drawn uniformly from `[0.5, 1.5)`.
    pub fn random<R: Rng>(feat_num: usize, rng: &mut R) -> Self {
        let values = (0..feat_num).map(|_| rng.random::<f64>() + 0.5).collect();
        Self { values }
    }

    /// All weights equal to `value`.
    #[must_use]
    pub fn uniform(feat_num: usize, value: f64) -> Self {
        Self {
            values: vec![value; feat_num],
        }
    }

    /// Wrap existing weights; every weight must be finite and strictly positive.
    pub fn from_values(values: Vec<f64>) -> Result<Self> {
        let weights = Self { values };
        weights.check_positive()?;
        Ok(weights)
    }

    /// Number of features.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Sum of all weights.
    pub fn total_mass(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Multiply every positive weight by an independent factor in `[0.9, 1.1)`.
    pub fn perturb<R: Rng>(&mut self, rng: &mut R) {
        for w in self.values.iter_mut().filter(|w| **w > 0.0) {
            *w *= 0.9 + rng.random::<f64>() * 0.2;
        }
    }

    /// Fail with [`KnnError::InvariantViolation`] on the first weight that is
    /// not finite and strictly positive.
    pub fn check_positive(&self) -> Result<()> {
        match self
            .values
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w > 0.0))
        {
            Some((feature, &weight)) => Err(KnnError::InvariantViolation { feature, weight }),
            None => Ok(()),
        }
    }

    /// Fail with [`KnnError::InvariantViolation`] on the first weight that is
    /// negative or not finite. Zero is allowed: it only switches a feature off.
    pub fn check_usable(&self) -> Result<()> {
        match self
            .values
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            Some((feature, &weight)) => Err(KnnError::InvariantViolation { feature, weight }),
            None => Ok(()),
        }
    }

    /// Flat text record: weights scaled by [`RECORD_SCALE`], space separated.
    ///
    /// Values are written in shortest round-trip form, so weights that learning
    /// drove towards zero survive a reload.
    pub fn to_record(&self) -> String {
        let mut out = String::with_capacity(self.values.len() * 24);
        for w in &self.values {
            out.push_str(&format!("{} ", w * RECORD_SCALE));
        }
        out
    }

    /// Parse a record written by [`WeightVector::to_record`].
    ///
    /// The result is meant for classification, so weights only have to be
    /// finite and non-negative. Learning from it again re-checks positivity.
    pub fn from_record(record: &str, feat_num: usize) -> Result<Self> {
        let values = record
            .split_whitespace()
            .enumerate()
            .map(|(position, token)| {
                token
                    .parse::<f64>()
                    .map(|v| v / RECORD_SCALE)
                    .map_err(|e| KnnError::Parse {
                        token: token.to_string(),
                        position,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.len() != feat_num {
            return Err(KnnError::DimensionMismatch {
                expected: feat_num,
                actual: values.len(),
            });
        }
        let weights = Self { values };
        weights.check_usable()?;
        Ok(weights)
    }
}
