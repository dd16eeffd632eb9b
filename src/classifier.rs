//! k-NN classification with consensus voting and open-world rejection.
//!
//! A query is labelled with a site only if **all** `k` nearest reference
//! vectors agree on it. Any disagreement turns the prediction into the
//! open-world class, so the classifier prefers "unknown" over a guess.
//!
//! Accuracy is split in two rates:
//!
//! | Rate | Numerator | Denominator |
//! |------|-----------|-------------|
//! | `tp` | credit on closed-world queries | `site_num * test_num` |
//! | `tn` | credit on open-world queries | `open_test_num` (rate is 1 when 0) |
//!
//! A query earns `1 / t` credit when its true class is among the `t` classes
//! tied for the most votes, and nothing otherwise.

use tracing::info;

use crate::config::Config;
use crate::dataset::EvalPool;
use crate::distance::present_features;
use crate::error::{KnnError, Result};
use crate::fanout::DistanceFanOut;
use crate::io::TraceSink;
use crate::weights::WeightVector;

/// Result of classifying one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// Position of the query in the query pool.
    pub index: usize,
    /// Reference positions of the neighbours, nearest first.
    pub neighbours: Vec<usize>,
    /// Class of each neighbour.
    pub guessed: Vec<usize>,
    /// Classes tied for the most votes after the consensus rule.
    pub predicted: Vec<usize>,
    pub true_class: usize,
    /// Accuracy credit in `[0, 1]`.
    pub credit: f64,
}

impl QueryOutcome {
    pub fn is_correct(&self) -> bool {
        self.credit > 0.0
    }
}

/// True-positive and true-negative rates of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accuracy {
    pub tp: f64,
    pub tn: f64,
}

/// Apply the consensus rule to neighbour classes.
///
/// Returns the vote count per class (`open_class + 1` entries). If no class
/// holds every vote, closed-world votes are cleared and the open class gets a
/// single vote.
pub fn consensus_votes(neighbour_classes: &[usize], open_class: usize) -> Vec<usize> {
    let mut votes = vec![0_usize; open_class + 1];
    for &class in neighbour_classes {
        votes[class] += 1;
    }
    let k = neighbour_classes.len();
    if !votes.iter().any(|&v| v == k) {
        votes[..open_class].fill(0);
        votes[open_class] = 1;
    }
    votes
}

/// Classes holding the maximum vote count.
pub fn top_classes(votes: &[usize]) -> Vec<usize> {
    let max = votes.iter().copied().max().unwrap_or(0);
    votes
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v == max)
        .map(|(class, _)| class)
        .collect()
}

/// `1 / |predicted|` if `true_class` is predicted, else 0.
pub fn tie_credit(predicted: &[usize], true_class: usize) -> f64 {
    if predicted.contains(&true_class) {
        1.0 / predicted.len() as f64
    } else {
        0.0
    }
}

/// Weighted k-NN classifier over a fixed reference pool.
#[derive(Debug)]
pub struct Classifier<'a> {
    reference: &'a EvalPool,
    fanout: &'a DistanceFanOut,
    k: usize,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &Config, reference: &'a EvalPool, fanout: &'a DistanceFanOut) -> Result<Self> {
        config.validate_classification()?;
        if reference.len() != config.eval_len() || reference.closed_len() != config.closed_len() {
            return Err(KnnError::InvalidConfig(format!(
                "reference pool has {} vectors ({} closed), config expects {} ({} closed)",
                reference.len(),
                reference.closed_len(),
                config.eval_len(),
                config.closed_len()
            )));
        }
        Ok(Self {
            reference,
            fanout,
            k: config.neighbour_num,
        })
    }

    /// Classify the query at `index` of `queries`.
    ///
    /// The reference slot with the same index is never a neighbour.
    pub fn classify(&self, queries: &EvalPool, index: usize, weights: &WeightVector) -> Result<QueryOutcome> {
        self.check_layout(queries)?;
        if index >= queries.len() {
            return Err(KnnError::InvalidConfig(format!(
                "query {index} outside pool of {}",
                queries.len()
            )));
        }
        self.classify_unchecked(queries, index, weights)
    }

    fn classify_unchecked(&self, queries: &EvalPool, index: usize, weights: &WeightVector) -> Result<QueryOutcome> {
        let query = queries.get(index);
        let present = present_features(query);
        let mut distances = self
            .fanout
            .distances(query, self.reference.vectors(), weights, &present)?;
        distances.exclude(index);

        let mut neighbours = Vec::with_capacity(self.k);
        let mut guessed = Vec::with_capacity(self.k);
        for _ in 0..self.k {
            let (position, _) = distances.extract_min().ok_or_else(|| {
                KnnError::InvalidConfig(format!("fewer than {} reference candidates", self.k))
            })?;
            neighbours.push(position);
            guessed.push(self.reference.class_of(position));
        }

        let votes = consensus_votes(&guessed, self.reference.open_class());
        let predicted = top_classes(&votes);
        let true_class = queries.class_of(index);
        let credit = tie_credit(&predicted, true_class);

        Ok(QueryOutcome {
            index,
            neighbours,
            guessed,
            predicted,
            true_class,
            credit,
        })
    }

    /// Classify every query and compute the true-positive / true-negative rates.
    pub fn evaluate(
        &self,
        queries: &EvalPool,
        weights: &WeightVector,
        sink: &mut dyn TraceSink,
    ) -> Result<Accuracy> {
        self.check_layout(queries)?;

        info!(queries = queries.len(), k = self.k, "started computing accuracy");
        let open_class = queries.open_class();
        let mut tp = 0.0;
        let mut tn = 0.0;
        for index in 0..queries.len() {
            let outcome = self.classify_unchecked(queries, index, weights)?;
            sink.record(&outcome)?;
            if outcome.true_class == open_class {
                tn += outcome.credit;
            } else {
                tp += outcome.credit;
            }
        }
        sink.flush()?;

        let tp = tp / queries.closed_len() as f64;
        let tn = if queries.open_len() == 0 {
            1.0
        } else {
            tn / queries.open_len() as f64
        };
        info!(tp, tn, "finished computing accuracy");
        Ok(Accuracy { tp, tn })
    }

    /// Query position `p` is excluded as reference slot `p`, so both pools
    /// must share one layout.
    fn check_layout(&self, queries: &EvalPool) -> Result<()> {
        if queries.len() != self.reference.len() || queries.closed_len() != self.reference.closed_len() {
            return Err(KnnError::InvalidConfig(format!(
                "query pool layout ({} vectors, {} closed) differs from reference pool ({}, {})",
                queries.len(),
                queries.closed_len(),
                self.reference.len(),
                self.reference.closed_len()
            )));
        }
        Ok(())
    }
}
