//! In-memory dataset partitions.
//!
//! | Partition | Layout | Used by |
//! |-----------|--------|---------|
//! | [`TrainingPool`] | `site_num` blocks of `train_num` | weight learning |
//! | [`EvalPool`] (reference) | `site_num` blocks of `test_num`, then open | classification candidates |
//! | [`EvalPool`] (query) | same layout as the reference pool | classification queries |
//!
//! Pools are loaded once and read-only afterwards. Open-world vectors are
//! shared between the reference and query pools rather than copied.

use std::ops::Range;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Config;
use crate::distance::MISSING;
use crate::error::{KnnError, Result};

/// One trace, `feat_num` values, [`MISSING`] for unobserved features.
pub type FeatureVector = Vec<f64>;

fn check_dims<V: AsRef<[f64]>>(vectors: &[V], feat_num: usize) -> Result<()> {
    match vectors.iter().find(|v| v.as_ref().len() != feat_num) {
        Some(v) => Err(KnnError::DimensionMismatch {
            expected: feat_num,
            actual: v.as_ref().len(),
        }),
        None => Ok(()),
    }
}

/// Labelled vectors for weight learning, grouped by site in equal blocks.
#[derive(Debug, Clone)]
pub struct TrainingPool {
    vectors: Vec<FeatureVector>,
    per_site: usize,
}

impl TrainingPool {
    /// `vectors` must hold `site_num * train_num` vectors of `feat_num` features.
    pub fn new(vectors: Vec<FeatureVector>, config: &Config) -> Result<Self> {
        if vectors.len() != config.training_len() {
            return Err(KnnError::InvalidConfig(format!(
                "training pool has {} vectors, expected {} sites x {} instances",
                vectors.len(),
                config.site_num,
                config.train_num
            )));
        }
        check_dims(&vectors, config.feat_num)?;
        Ok(Self {
            vectors,
            per_site: config.train_num,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn get(&self, index: usize) -> &[f64] {
        &self.vectors[index]
    }

    /// Site owning the instance at `index`.
    pub fn site_of(&self, index: usize) -> usize {
        index / self.per_site
    }

    /// Pool indices of `site`'s block.
    pub fn site_block(&self, site: usize) -> Range<usize> {
        site * self.per_site..(site + 1) * self.per_site
    }
}

/// Closed-world vectors followed by open-world vectors.
///
/// Position `p < site_num * test_num` belongs to site `p / test_num`; every
/// later position belongs to the open-world class, whose id is `site_num`.
#[derive(Debug, Clone)]
pub struct EvalPool {
    vectors: Vec<Arc<[f64]>>,
    sites: usize,
    per_site: usize,
}

impl EvalPool {
    /// Build a pool from `site_num * test_num` closed vectors and `open_test_num` open vectors.
    pub fn new(closed: Vec<FeatureVector>, open: Vec<FeatureVector>, config: &Config) -> Result<Self> {
        let open: Vec<Arc<[f64]>> = open.into_iter().map(Arc::from).collect();
        Self::with_shared_open(closed, &open, config)
    }

    pub(crate) fn with_shared_open(
        closed: Vec<FeatureVector>,
        open: &[Arc<[f64]>],
        config: &Config,
    ) -> Result<Self> {
        if closed.len() != config.closed_len() {
            return Err(KnnError::InvalidConfig(format!(
                "closed pool has {} vectors, expected {} sites x {} instances",
                closed.len(),
                config.site_num,
                config.test_num
            )));
        }
        if open.len() != config.open_test_num {
            return Err(KnnError::InvalidConfig(format!(
                "open pool has {} vectors, expected {}",
                open.len(),
                config.open_test_num
            )));
        }
        check_dims(&closed, config.feat_num)?;
        check_dims(open, config.feat_num)?;

        let mut vectors: Vec<Arc<[f64]>> = Vec::with_capacity(closed.len() + open.len());
        vectors.extend(closed.into_iter().map(Arc::from));
        vectors.extend(open.iter().cloned());
        Ok(Self {
            vectors,
            sites: config.site_num,
            per_site: config.test_num,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Arc<[f64]>] {
        &self.vectors
    }

    pub fn get(&self, index: usize) -> &[f64] {
        &self.vectors[index]
    }

    /// Number of closed-world positions.
    pub fn closed_len(&self) -> usize {
        self.sites * self.per_site
    }

    /// Number of open-world positions.
    pub fn open_len(&self) -> usize {
        self.vectors.len() - self.closed_len()
    }

    /// Class id of the open-world population.
    pub fn open_class(&self) -> usize {
        self.sites
    }

    /// Class of the vector at `position`.
    pub fn class_of(&self, position: usize) -> usize {
        if position < self.closed_len() {
            position / self.per_site
        } else {
            self.open_class()
        }
    }
}

/// Reference and query pools of a classification-only run.
#[derive(Debug, Clone)]
pub struct EvalSet {
    pub reference: EvalPool,
    pub query: EvalPool,
}

impl EvalSet {
    /// Build both pools around one shared open-world block.
    pub fn new(
        config: &Config,
        closed_reference: Vec<FeatureVector>,
        closed_query: Vec<FeatureVector>,
        open: Vec<FeatureVector>,
    ) -> Result<Self> {
        let open: Vec<Arc<[f64]>> = open.into_iter().map(Arc::from).collect();
        Ok(Self {
            reference: EvalPool::with_shared_open(closed_reference, &open, config)?,
            query: EvalPool::with_shared_open(closed_query, &open, config)?,
        })
    }
}

/// All partitions of one batch run.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub training: TrainingPool,
    pub reference: EvalPool,
    pub query: EvalPool,
}

impl Dataset {
    /// Assemble the partitions, checking every size against `config`.
    pub fn new(
        config: &Config,
        training: Vec<FeatureVector>,
        closed_reference: Vec<FeatureVector>,
        closed_query: Vec<FeatureVector>,
        open: Vec<FeatureVector>,
    ) -> Result<Self> {
        let eval = EvalSet::new(config, closed_reference, closed_query, open)?;
        Self::with_eval(config, training, eval)
    }

    /// Add a weight-learning pool to already loaded evaluation pools.
    pub fn with_eval(config: &Config, training: Vec<FeatureVector>, eval: EvalSet) -> Result<Self> {
        Ok(Self {
            training: TrainingPool::new(training, config)?,
            reference: eval.reference,
            query: eval.query,
        })
    }

    /// The evaluation pools, sharing vector storage with `self`.
    pub fn eval_set(&self) -> EvalSet {
        EvalSet {
            reference: self.reference.clone(),
            query: self.query.clone(),
        }
    }
}

/// Parameters of [`generate_clustered_dataset`].
#[derive(Debug, Clone, Copy)]
pub struct SyntheticParams {
    /// Standard deviation of instances around their site's centre.
    pub spread: f64,
    /// Probability that a feature is [`MISSING`].
    pub missing_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            spread: 0.5,
            missing_rate: 0.05,
            seed: 42,
        }
    }
}

/// Generate a clustered dataset sized by `config`.
///
/// Each site gets a random centre in `[0, 10)^d`; its training and test
/// instances are Gaussian samples around it. Open-world instances each get a
/// fresh centre, so they resemble no site. Reference and query closed pools
/// are identical, as in a standard run.
pub fn generate_clustered_dataset(config: &Config, params: SyntheticParams) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let dim = config.feat_num;

    let random_centre = |rng: &mut StdRng| -> Vec<f64> {
        (0..dim).map(|_| rng.random::<f64>() * 10.0).collect()
    };
    let sample_near = |rng: &mut StdRng, centre: &[f64]| -> FeatureVector {
        centre
            .iter()
            .map(|&c| {
                if rng.random::<f64>() < params.missing_rate {
                    return MISSING;
                }
                // Box-Muller
                let u1: f64 = 1.0 - rng.random::<f64>();
                let u2: f64 = rng.random();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                (c + z * params.spread).max(0.0)
            })
            .collect()
    };

    let centres: Vec<Vec<f64>> = (0..config.site_num).map(|_| random_centre(&mut rng)).collect();

    let mut training = Vec::with_capacity(config.training_len());
    let mut closed = Vec::with_capacity(config.closed_len());
    for centre in &centres {
        for _ in 0..config.train_num {
            training.push(sample_near(&mut rng, centre));
        }
        for _ in 0..config.test_num {
            closed.push(sample_near(&mut rng, centre));
        }
    }

    let open: Vec<FeatureVector> = (0..config.open_test_num)
        .map(|_| {
            let centre = random_centre(&mut rng);
            sample_near(&mut rng, &centre)
        })
        .collect();

    Dataset::new(config, training, closed.clone(), closed, open)
}
