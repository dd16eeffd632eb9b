//! Parallel distance fan-out and neighbour extraction.
//!
//! One query is compared against every vector of a pool on a bounded rayon
//! worker pool. Each candidate writes one slot of the output, and the call
//! returns only after every slot is computed, so callers never see partial
//! results. The weights are borrowed immutably for the whole call.

use std::ops::Range;

use rayon::prelude::*;

use crate::distance::weighted_distance;
use crate::error::{KnnError, Result};
use crate::weights::WeightVector;

/// Bounded worker pool computing one-to-many distances.
pub struct DistanceFanOut {
    pool: rayon::ThreadPool,
}

impl DistanceFanOut {
    /// Create a fan-out with `workers` threads (0 = one per core).
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("wknn-dist-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Distances from `query` to every vector in `candidates`, in pool order.
    ///
    /// `present` is the present-feature set of `query`. A candidate of the
    /// wrong length fails the whole fan-out.
    pub fn distances<V>(
        &self,
        query: &[f64],
        candidates: &[V],
        weights: &WeightVector,
        present: &[usize],
    ) -> Result<DistanceList>
    where
        V: AsRef<[f64]> + Sync,
    {
        let dim = weights.len();
        if query.len() != dim {
            return Err(KnnError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        let w = weights.as_slice();
        let values = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| {
                    let candidate = candidate.as_ref();
                    if candidate.len() != dim {
                        return Err(KnnError::DimensionMismatch {
                            expected: dim,
                            actual: candidate.len(),
                        });
                    }
                    Ok(weighted_distance(query, candidate, w, present))
                })
                .collect::<Result<Vec<f64>>>()
        })?;
        Ok(DistanceList::new(values))
    }
}

impl std::fmt::Debug for DistanceFanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceFanOut")
            .field("workers", &self.workers())
            .finish()
    }
}

/// Distances from one query to a pool, with slots that can be excluded.
///
/// Excluded slots hold `f64::INFINITY` and are never returned by
/// [`DistanceList::extract_min`] while a finite slot remains in range.
/// Ties resolve to the lowest index.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceList {
    values: Vec<f64>,
}

impl DistanceList {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Distance at `index` (`INFINITY` once excluded).
    pub fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Make `index` unselectable.
    pub fn exclude(&mut self, index: usize) {
        self.values[index] = f64::INFINITY;
    }

    /// Make every slot in `range` unselectable.
    pub fn exclude_range(&mut self, range: Range<usize>) {
        for v in &mut self.values[range] {
            *v = f64::INFINITY;
        }
    }

    /// Lowest-index minimum within `range`, without excluding it.
    pub fn min_in(&self, range: Range<usize>) -> Option<(usize, f64)> {
        let start = range.start;
        let slice = &self.values[range];
        let mut best: Option<(usize, f64)> = None;
        for (offset, &d) in slice.iter().enumerate() {
            match best {
                Some((_, b)) if d >= b => {}
                _ => best = Some((start + offset, d)),
            }
        }
        best.filter(|(_, d)| d.is_finite())
    }

    /// Remove and return the nearest selectable slot within `range`.
    pub fn extract_min_in(&mut self, range: Range<usize>) -> Option<(usize, f64)> {
        let found = self.min_in(range)?;
        self.exclude(found.0);
        Some(found)
    }

    /// Remove and return the nearest selectable slot of the whole list.
    pub fn extract_min(&mut self) -> Option<(usize, f64)> {
        self.extract_min_in(0..self.values.len())
    }
}
