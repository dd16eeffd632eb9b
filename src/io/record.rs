//! Learned weight records on disk.

use std::path::Path;

use crate::error::Result;
use crate::weights::WeightVector;

/// Write `weights` as a single scaled line (see [`WeightVector::to_record`]).
pub fn write_weights(path: impl AsRef<Path>, weights: &WeightVector) -> Result<()> {
    std::fs::write(path, weights.to_record())?;
    Ok(())
}

/// Read a record written by [`write_weights`].
pub fn read_weights(path: impl AsRef<Path>, feat_num: usize) -> Result<WeightVector> {
    let text = std::fs::read_to_string(path)?;
    WeightVector::from_record(&text, feat_num)
}
