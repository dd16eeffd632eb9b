//! End-to-end batch runs over a loaded [`Dataset`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::classifier::{Accuracy, Classifier};
use crate::config::Config;
use crate::dataset::{Dataset, EvalSet};
use crate::error::{KnnError, Result};
use crate::fanout::DistanceFanOut;
use crate::io::TraceSink;
use crate::learner::WeightLearner;
use crate::weights::WeightVector;

/// Outcome of a learn-then-classify run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Seed that drove weight initialisation and perturbation.
    pub seed: u64,
    pub weights: WeightVector,
    pub accuracy: Accuracy,
}

/// Learn weights on the training pool, then classify the query pool.
pub fn learn_and_evaluate(config: &Config, dataset: &Dataset, sink: &mut dyn TraceSink) -> Result<RunReport> {
    config.validate()?;
    let fanout = DistanceFanOut::new(config.workers)?;
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    info!(seed, workers = fanout.workers(), "starting run");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut weights = WeightVector::random(config.feat_num, &mut rng);
    WeightLearner::new(config, &dataset.training, &fanout)?.learn(&mut weights, &mut rng)?;

    let accuracy = Classifier::new(config, &dataset.reference, &fanout)?.evaluate(&dataset.query, &weights, sink)?;
    info!(tp = accuracy.tp, tn = accuracy.tn, "run finished");
    Ok(RunReport {
        seed,
        weights,
        accuracy,
    })
}

/// Classify the query pool with previously learned weights.
///
/// Only the classification constraints of `config` are checked; the weights
/// may contain zeros (switched-off features) but nothing negative.
pub fn evaluate_with(
    config: &Config,
    eval: &EvalSet,
    weights: &WeightVector,
    sink: &mut dyn TraceSink,
) -> Result<Accuracy> {
    config.validate_classification()?;
    if weights.len() != config.feat_num {
        return Err(KnnError::DimensionMismatch {
            expected: config.feat_num,
            actual: weights.len(),
        });
    }
    weights.check_usable()?;
    let fanout = DistanceFanOut::new(config.workers)?;
    Classifier::new(config, &eval.reference, &fanout)?.evaluate(&eval.query, weights, sink)
}
