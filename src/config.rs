//! Run configuration.
//!
//! All dataset sizing and learning constants live here and are passed
//! explicitly to the learner and the classifier. Defaults reproduce the
//! reference setup: 100 monitored sites with 60 weight-learning and 30 test
//! traces each, 9000 open-world traces, 1225 features.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KnnError, Result};

/// Batch run configuration.
///
/// Deserialised with `#[serde(default)]`, so a JSON file only needs the fields
/// it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of closed-world sites (classes).
    pub site_num: usize,
    /// Weight-learning instances per site.
    pub train_num: usize,
    /// Test instances per site.
    pub test_num: usize,
    /// Open-world instances; zero makes the true-negative rate vacuously 1.
    pub open_test_num: usize,
    /// Features per vector.
    pub feat_num: usize,
    /// Learning rounds per training instance.
    pub rounds: usize,
    /// `k` of the classifier.
    pub neighbour_num: usize,
    /// Good and bad reference neighbours per learning step.
    pub reco_points_num: usize,
    /// Missing instance files tolerated per site before giving up.
    pub missing_budget: usize,
    /// Distance worker threads; 0 lets rayon pick one per core.
    pub workers: usize,
    /// Seed for weight initialisation and perturbation.
    pub seed: Option<u64>,
    /// Directory with the weight-learning traces.
    pub weight_dir: PathBuf,
    /// Directory with the closed-world reference traces.
    pub train_dir: PathBuf,
    /// Directory with the closed-world query traces.
    pub test_dir: PathBuf,
    /// Directory with the open-world traces.
    pub open_dir: PathBuf,
    /// Suffix of feature files.
    pub feature_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_num: 100,
            train_num: 60,
            test_num: 30,
            open_test_num: 9000,
            feat_num: 1225,
            rounds: 10,
            neighbour_num: 2,
            reco_points_num: 5,
            missing_budget: 1000,
            workers: 0,
            seed: None,
            weight_dir: PathBuf::from("batch/"),
            train_dir: PathBuf::from("batch/"),
            test_dir: PathBuf::from("batch/"),
            open_dir: PathBuf::from("batch/"),
            feature_suffix: "s".to_string(),
        }
    }
}

impl Config {
    /// Load a (partial) configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(config)
    }

    /// Instances stored per site on disk (test block followed by training block).
    pub fn inst_num(&self) -> usize {
        self.train_num + self.test_num
    }

    /// Size of the weight-learning pool.
    pub fn training_len(&self) -> usize {
        self.site_num * self.train_num
    }

    /// Size of the closed-world part of the evaluation pools.
    pub fn closed_len(&self) -> usize {
        self.site_num * self.test_num
    }

    /// Size of the evaluation pools (closed followed by open).
    pub fn eval_len(&self) -> usize {
        self.closed_len() + self.open_test_num
    }

    /// Check that the derived pool sizes can support learning and classification.
    pub fn validate(&self) -> Result<()> {
        self.validate_learning()?;
        self.validate_classification()
    }

    /// Checks needed by [`crate::WeightLearner`].
    pub fn validate_learning(&self) -> Result<()> {
        self.require_nonzero(&[
            ("site_num", self.site_num),
            ("train_num", self.train_num),
            ("feat_num", self.feat_num),
            ("reco_points_num", self.reco_points_num),
        ])?;
        if self.site_num < 2 {
            return Err(KnnError::InvalidConfig(
                "site_num must be at least 2 to have bad neighbours".into(),
            ));
        }
        if self.reco_points_num >= self.train_num {
            return Err(KnnError::InvalidConfig(format!(
                "reco_points_num ({}) must be below train_num ({}): an instance has only {} same-site neighbours",
                self.reco_points_num,
                self.train_num,
                self.train_num - 1
            )));
        }
        let other_sites = (self.site_num - 1) * self.train_num;
        if self.reco_points_num > other_sites {
            return Err(KnnError::InvalidConfig(format!(
                "reco_points_num ({}) exceeds the {other_sites} instances of other sites",
                self.reco_points_num
            )));
        }
        Ok(())
    }

    /// Checks needed by [`crate::Classifier`].
    pub fn validate_classification(&self) -> Result<()> {
        self.require_nonzero(&[
            ("site_num", self.site_num),
            ("test_num", self.test_num),
            ("feat_num", self.feat_num),
            ("neighbour_num", self.neighbour_num),
        ])?;
        // The query's own slot is never a candidate.
        if self.neighbour_num >= self.eval_len() {
            return Err(KnnError::InvalidConfig(format!(
                "neighbour_num ({}) must be below the reference pool size ({})",
                self.neighbour_num,
                self.eval_len()
            )));
        }
        Ok(())
    }

    fn require_nonzero(&self, fields: &[(&str, usize)]) -> Result<()> {
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(KnnError::InvalidConfig(format!(
                "{name} must be greater than 0"
            ))),
            None => Ok(()),
        }
    }
}
