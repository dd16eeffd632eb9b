//! Iterative metric learning for the weighted distance.
//!
//! # Intuition
//!
//! For each training instance the learner looks at its nearest same-site
//! instances ("good" neighbours) and its nearest other-site instances ("bad"
//! neighbours). A feature on which the bad neighbours look as close as the
//! good ones does not separate this instance from the other sites, so its
//! weight shrinks. The mass taken from those features is handed to the
//! features that do separate them.
//!
//! # One step
//!
//! ```text
//! good      = R nearest in own site block (self excluded)
//! bad       = R nearest outside own site block
//! badness   = |{b ∈ bad : d(b) <= max d(good)}| / R + 0.2
//! maxGood_j = max_g |x_j - g_j|
//! featDist_j = Σ_b |x_j - b_j|
//! countBad_j = |{b : |x_j - b_j| <= maxGood_j}|
//! minBad    = min_j countBad_j
//!
//! countBad_j != minBad:  Δ_j = w_j · 0.01 · countBad_j / R · badness
//!                        w_j -= Δ_j,  c1 += Δ_j · featDist_j
//! countBad_j == minBad:  w_j += c1 · featDist_j / Σ featDist (over that set)
//! ```
//!
//! `R` is `reco_points_num`. Missing values count as a zero difference.
//! Each instance gets `rounds` steps, then every positive weight is
//! multiplied by a random factor in `[0.9, 1.1)`.
//!
//! # Positivity
//!
//! A step removes at most `0.01 · 1.2` of a weight and only ever adds
//! non-negative amounts, so weights that start positive stay positive. A
//! non-positive or non-finite weight met during a step is reported as
//! [`KnnError::InvariantViolation`].

use std::ops::Range;

use rand::Rng;
use tracing::{debug, info};

use crate::config::Config;
use crate::dataset::TrainingPool;
use crate::distance::{feature_difference, present_features};
use crate::error::{KnnError, Result};
use crate::fanout::{DistanceFanOut, DistanceList};
use crate::weights::WeightVector;

/// Fixed offset added to the confusion ratio so updates never stall at zero.
pub const BADNESS_BASELINE: f64 = 0.2;

/// Fraction of a weight a fully confused feature can lose per step.
pub const SHRINK_RATE: f64 = 0.01;

/// Good and bad reference neighbours of one training instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbourhood {
    /// Same-site neighbours, nearest first.
    pub good: Vec<usize>,
    /// Other-site neighbours, nearest first.
    pub bad: Vec<usize>,
    /// Largest distance among the good neighbours.
    pub max_good_dist: f64,
    /// Bad neighbours no farther than `max_good_dist`.
    pub confusable: usize,
}

/// What one learning step did to the weights.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub index: usize,
    pub point_badness: f64,
    pub min_bad: usize,
    /// Features whose weight shrank.
    pub penalized: usize,
    /// Features that received part of the compensation pool.
    pub boosted: usize,
    /// Total weight removed from penalised features.
    pub removed: f64,
    /// Compensation pool `c1`.
    pub compensation: f64,
    /// Total weight added to boosted features.
    pub redistributed: f64,
}

/// Learns per-feature weights from a labelled training pool.
#[derive(Debug)]
pub struct WeightLearner<'a> {
    pool: &'a TrainingPool,
    fanout: &'a DistanceFanOut,
    rounds: usize,
    reco_points: usize,
}

impl<'a> WeightLearner<'a> {
    pub fn new(config: &Config, pool: &'a TrainingPool, fanout: &'a DistanceFanOut) -> Result<Self> {
        config.validate_learning()?;
        if pool.len() != config.training_len() {
            return Err(KnnError::InvalidConfig(format!(
                "training pool has {} vectors, config expects {}",
                pool.len(),
                config.training_len()
            )));
        }
        Ok(Self {
            pool,
            fanout,
            rounds: config.rounds,
            reco_points: config.reco_points_num,
        })
    }

    /// Run every training instance through `rounds` steps, in pool order.
    pub fn learn<R: Rng>(&self, weights: &mut WeightVector, rng: &mut R) -> Result<()> {
        self.learn_range(0..self.pool.len(), weights, rng)
    }

    /// Like [`WeightLearner::learn`], restricted to the instances in `range`.
    pub fn learn_range<R: Rng>(
        &self,
        range: Range<usize>,
        weights: &mut WeightVector,
        rng: &mut R,
    ) -> Result<()> {
        if range.end > self.pool.len() || range.start > range.end {
            return Err(KnnError::InvalidConfig(format!(
                "learning range {range:?} outside pool of {}",
                self.pool.len()
            )));
        }
        let dim = self.pool.get(0).len();
        if weights.len() != dim {
            return Err(KnnError::DimensionMismatch {
                expected: dim,
                actual: weights.len(),
            });
        }
        weights.check_positive()?;

        info!(
            start = range.start,
            end = range.end,
            rounds = self.rounds,
            reco_points = self.reco_points,
            "starting to learn distance"
        );
        for index in range.clone() {
            for round in 0..self.rounds {
                let report = self.step(index, weights)?;
                debug!(
                    index,
                    round,
                    badness = report.point_badness,
                    min_bad = report.min_bad,
                    penalized = report.penalized,
                    boosted = report.boosted,
                    "learning step"
                );
            }
            weights.perturb(rng);

            let site = self.pool.site_of(index);
            if index + 1 == self.pool.site_block(site).end {
                info!(site, instance = index, "site learned");
            }
        }
        info!(mass = weights.total_mass(), "finished learning distance");
        Ok(())
    }

    /// Find the good and bad neighbours of instance `index` under `weights`.
    pub fn neighbourhood(&self, index: usize, weights: &WeightVector) -> Result<Neighbourhood> {
        let query = self.pool.get(index);
        let present = present_features(query);
        let mut distances = self
            .fanout
            .distances(query, self.pool.vectors(), weights, &present)?;
        distances.exclude(index);
        self.select(index, &mut distances)
    }

    fn select(&self, index: usize, distances: &mut DistanceList) -> Result<Neighbourhood> {
        let block = self.pool.site_block(self.pool.site_of(index));

        let mut good = Vec::with_capacity(self.reco_points);
        let mut max_good_dist = 0.0_f64;
        for _ in 0..self.reco_points {
            let (g, d) = distances.extract_min_in(block.clone()).ok_or_else(|| {
                KnnError::InvalidConfig(format!("instance {index} has too few same-site neighbours"))
            })?;
            max_good_dist = max_good_dist.max(d);
            good.push(g);
        }

        distances.exclude_range(block);

        let mut bad = Vec::with_capacity(self.reco_points);
        let mut confusable = 0;
        for _ in 0..self.reco_points {
            let (b, d) = distances.extract_min().ok_or_else(|| {
                KnnError::InvalidConfig(format!("instance {index} has too few other-site neighbours"))
            })?;
            if d <= max_good_dist {
                confusable += 1;
            }
            bad.push(b);
        }

        Ok(Neighbourhood {
            good,
            bad,
            max_good_dist,
            confusable,
        })
    }

    /// One learning step for instance `index`, updating `weights` in place.
    pub fn step(&self, index: usize, weights: &mut WeightVector) -> Result<StepReport> {
        let hood = self.neighbourhood(index, weights)?;
        self.update(index, &hood, weights)
    }

    fn update(&self, index: usize, hood: &Neighbourhood, weights: &mut WeightVector) -> Result<StepReport> {
        let reco = self.reco_points as f64;
        let point_badness = hood.confusable as f64 / reco + BADNESS_BASELINE;

        let x = self.pool.get(index);
        let dim = weights.len();
        let mut feat_dist = vec![0.0_f64; dim];
        let mut count_bad = vec![0_usize; dim];

        for (j, &w) in weights.as_slice().iter().enumerate() {
            if !(w.is_finite() && w > 0.0) {
                return Err(KnnError::InvariantViolation { feature: j, weight: w });
            }

            let max_good = hood
                .good
                .iter()
                .map(|&g| feature_difference(x[j], self.pool.get(g)[j]))
                .fold(0.0_f64, f64::max);

            for &b in &hood.bad {
                let n = feature_difference(x[j], self.pool.get(b)[j]);
                feat_dist[j] += n;
                if n <= max_good {
                    count_bad[j] += 1;
                }
            }
        }

        let min_bad = count_bad.iter().copied().min().unwrap_or(0);

        let w = weights.as_mut_slice();
        let mut penalized = 0;
        let mut removed = 0.0;
        let mut compensation = 0.0;
        for j in 0..dim {
            if count_bad[j] != min_bad {
                let change = w[j] * SHRINK_RATE * count_bad[j] as f64 / reco * point_badness;
                compensation += change * feat_dist[j];
                removed += change;
                w[j] -= change;
                penalized += 1;
            }
        }

        let strong = |j: usize, w: &[f64]| count_bad[j] == min_bad && w[j] > 0.0;
        let total_fd: f64 = (0..dim).filter(|&j| strong(j, w)).map(|j| feat_dist[j]).sum();

        let mut boosted = 0;
        let mut redistributed = 0.0;
        if total_fd > 0.0 {
            for j in 0..dim {
                if strong(j, w) {
                    let gain = compensation * feat_dist[j] / total_fd;
                    w[j] += gain;
                    redistributed += gain;
                    boosted += 1;
                }
            }
        }

        Ok(StepReport {
            index,
            point_badness,
            min_bad,
            penalized,
            boosted,
            removed,
            compensation,
            redistributed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_config() -> Config {
        Config {
            site_num: 2,
            train_num: 2,
            test_num: 1,
            open_test_num: 0,
            feat_num: 3,
            rounds: 1,
            neighbour_num: 2,
            reco_points_num: 1,
            ..Config::default()
        }
    }

    fn tiny_pool(config: &Config) -> TrainingPool {
        TrainingPool::new(
            vec![
                vec![0.0, 0.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![5.0, 5.0, 5.0],
                vec![5.0, 5.0, 4.0],
            ],
            config,
        )
        .unwrap()
    }

    #[test]
    fn neighbourhood_of_first_instance() {
        let config = tiny_config();
        let pool = tiny_pool(&config);
        let fanout = DistanceFanOut::new(2).unwrap();
        let learner = WeightLearner::new(&config, &pool, &fanout).unwrap();
        let weights = WeightVector::uniform(3, 1.0);

        let hood = learner.neighbourhood(0, &weights).unwrap();
        assert_eq!(hood.good, vec![1]);
        assert_eq!(hood.bad, vec![3]);
        assert_eq!(hood.max_good_dist, 1.0);
        assert_eq!(hood.confusable, 0);
    }

    #[test]
    fn separable_step_leaves_weights_unchanged() {
        let config = tiny_config();
        let pool = tiny_pool(&config);
        let fanout = DistanceFanOut::new(2).unwrap();
        let learner = WeightLearner::new(&config, &pool, &fanout).unwrap();
        let mut weights = WeightVector::uniform(3, 1.0);

        let report = learner.step(0, &mut weights).unwrap();
        assert!((report.point_badness - 0.2).abs() < 1e-12);
        assert_eq!(report.min_bad, 0);
        assert_eq!(report.penalized, 0);
        assert_eq!(report.compensation, 0.0);
        assert_eq!(weights.as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn confused_feature_loses_weight_to_discriminative_one() {
        // Feature 0 separates the sites, feature 1 is noise shared by both.
        let config = Config {
            site_num: 2,
            train_num: 3,
            feat_num: 2,
            reco_points_num: 2,
            rounds: 1,
            ..tiny_config()
        };
        let pool = TrainingPool::new(
            vec![
                vec![0.0, 0.0],
                vec![0.1, 3.0],
                vec![0.2, 1.0],
                vec![9.0, 0.5],
                vec![9.1, 2.0],
                vec![9.2, 0.0],
            ],
            &config,
        )
        .unwrap();
        let fanout = DistanceFanOut::new(2).unwrap();
        let learner = WeightLearner::new(&config, &pool, &fanout).unwrap();
        let mut weights = WeightVector::uniform(2, 1.0);

        let report = learner.step(0, &mut weights).unwrap();
        assert_eq!(report.min_bad, 0);
        assert_eq!(report.penalized, 1);
        assert_eq!(report.boosted, 1);
        assert!(weights.as_slice()[1] < 1.0);
        assert!(weights.as_slice()[0] > 1.0);
        assert!((report.redistributed - report.compensation).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_is_an_invariant_violation() {
        let config = tiny_config();
        let pool = tiny_pool(&config);
        let fanout = DistanceFanOut::new(1).unwrap();
        let learner = WeightLearner::new(&config, &pool, &fanout).unwrap();
        let mut weights = WeightVector::uniform(3, 1.0);
        weights.as_mut_slice()[2] = 0.0;

        let err = learner.step(0, &mut weights).unwrap_err();
        assert!(matches!(err, KnnError::InvariantViolation { feature: 2, .. }));

        let mut rng = StdRng::seed_from_u64(0);
        assert!(learner.learn(&mut weights, &mut rng).is_err());
    }

    #[test]
    fn learn_range_rejects_out_of_bounds() {
        let config = tiny_config();
        let pool = tiny_pool(&config);
        let fanout = DistanceFanOut::new(1).unwrap();
        let learner = WeightLearner::new(&config, &pool, &fanout).unwrap();
        let mut weights = WeightVector::uniform(3, 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(learner.learn_range(2..5, &mut weights, &mut rng).is_err());
    }

    #[test]
    fn learn_is_deterministic_for_a_seed() {
        let config = tiny_config();
        let pool = tiny_pool(&config);
        let fanout = DistanceFanOut::new(2).unwrap();
        let learner = WeightLearner::new(&config, &pool, &fanout).unwrap();

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut weights = WeightVector::random(3, &mut rng);
            learner.learn(&mut weights, &mut rng).unwrap();
            weights
        };
        assert_eq!(run(11), run(11));
        assert_eq!(run(11).len(), 3);
    }
}
