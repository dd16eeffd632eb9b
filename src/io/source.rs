//! Loading feature vectors from instance records.
//!
//! Each instance is one text record of whitespace-separated tokens, one per
//! feature. The token `'X'` marks a [`MISSING`] feature.
//!
//! On disk, closed-world instances live in `{site}-{instance}{suffix}` and
//! open-world instances in `{index}{suffix}`. Collections have holes, so a
//! missing record is replaced by the next instance number: the reader keeps a
//! skip counter (per site for closed-world data, one for the whole open-world
//! block) and gives up with [`KnnError::DataUnavailable`] once it exceeds the
//! configured budget.

use std::ops::Range;
use std::path::PathBuf;

use tracing::{info, trace, warn};

use crate::config::Config;
use crate::dataset::{Dataset, EvalSet, FeatureVector};
use crate::distance::MISSING;
use crate::error::{KnnError, Result};

/// Token that marks a missing feature.
pub const MISSING_TOKEN: &str = "'X'";

/// Which partition a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Weight-learning traces.
    Weight,
    /// Closed-world reference traces.
    Train,
    /// Closed-world query traces.
    Test,
    /// Open-world traces.
    Open,
}

/// Address of one instance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    Closed { site: usize, instance: usize },
    Open { index: usize },
}

/// Provider of raw instance records.
pub trait FeatureSource {
    /// The record text, or `None` if the instance does not exist.
    fn fetch(&self, partition: Partition, key: InstanceKey) -> Result<Option<String>>;

    /// Human-readable location of a record, for diagnostics.
    fn describe(&self, partition: Partition, key: InstanceKey) -> String {
        format!("{partition:?} {key:?}")
    }
}

/// Records stored as one file per instance under per-partition directories.
#[derive(Debug, Clone)]
pub struct DirSource {
    weight_dir: PathBuf,
    train_dir: PathBuf,
    test_dir: PathBuf,
    open_dir: PathBuf,
    suffix: String,
}

impl DirSource {
    pub fn from_config(config: &Config) -> Self {
        Self {
            weight_dir: config.weight_dir.clone(),
            train_dir: config.train_dir.clone(),
            test_dir: config.test_dir.clone(),
            open_dir: config.open_dir.clone(),
            suffix: config.feature_suffix.clone(),
        }
    }

    /// Path of the file holding `key`.
    pub fn path(&self, partition: Partition, key: InstanceKey) -> PathBuf {
        let dir = match partition {
            Partition::Weight => &self.weight_dir,
            Partition::Train => &self.train_dir,
            Partition::Test => &self.test_dir,
            Partition::Open => &self.open_dir,
        };
        let name = match key {
            InstanceKey::Closed { site, instance } => format!("{site}-{instance}{}", self.suffix),
            InstanceKey::Open { index } => format!("{index}{}", self.suffix),
        };
        dir.join(name)
    }
}

impl FeatureSource for DirSource {
    fn fetch(&self, partition: Partition, key: InstanceKey) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(partition, key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self, partition: Partition, key: InstanceKey) -> String {
        self.path(partition, key).display().to_string()
    }
}

/// Parse one record into a vector of `feat_num` features.
///
/// Shorter records leave the trailing features at `0.0`; longer records are a
/// [`KnnError::DimensionMismatch`].
pub fn parse_record(text: &str, feat_num: usize) -> Result<FeatureVector> {
    let mut vector = vec![0.0; feat_num];
    let mut count = 0;
    for (position, token) in text.split_whitespace().enumerate() {
        if position >= feat_num {
            return Err(KnnError::DimensionMismatch {
                expected: feat_num,
                actual: text.split_whitespace().count(),
            });
        }
        vector[position] = parse_token(token, position)?;
        count += 1;
    }
    if count < feat_num {
        trace!(count, feat_num, "short record padded with zeros");
    }
    Ok(vector)
}

fn parse_token(token: &str, position: usize) -> Result<f64> {
    if token == MISSING_TOKEN {
        return Ok(MISSING);
    }
    let value: f64 = token.parse().map_err(|e: std::num::ParseFloatError| KnnError::Parse {
        token: token.to_string(),
        position,
        reason: e.to_string(),
    })?;
    if !value.is_finite() {
        return Err(KnnError::Parse {
            token: token.to_string(),
            position,
            reason: "feature values must be finite".into(),
        });
    }
    Ok(value)
}

/// Block loader with the missing-record budget.
///
/// `budget` is the number of missing records tolerated per skip counter: with
/// a budget of `n`, `n` misses are skipped and miss `n + 1` is
/// [`KnnError::DataUnavailable`]. A budget of 0 requires every record.
pub struct Loader<'a, S: FeatureSource + ?Sized> {
    source: &'a S,
    feat_num: usize,
    budget: usize,
}

impl<'a, S: FeatureSource + ?Sized> Loader<'a, S> {
    pub fn new(source: &'a S, feat_num: usize, budget: usize) -> Self {
        Self {
            source,
            feat_num,
            budget,
        }
    }

    /// Instances `instances` of every site in `0..sites`, site-major.
    pub fn load_closed(
        &self,
        partition: Partition,
        sites: usize,
        instances: Range<usize>,
    ) -> Result<Vec<FeatureVector>> {
        let mut out = Vec::with_capacity(sites * instances.len());
        for site in 0..sites {
            let mut skips = 0;
            for instance in instances.clone() {
                let text = self.fetch_with_skips(partition, &mut skips, |skips| InstanceKey::Closed {
                    site,
                    instance: instance + skips,
                })?;
                out.push(parse_record(&text, self.feat_num)?);
            }
        }
        Ok(out)
    }

    /// `count` single-instance open-world records.
    pub fn load_open(&self, partition: Partition, count: usize) -> Result<Vec<FeatureVector>> {
        let mut out = Vec::with_capacity(count);
        let mut skips = 0;
        for index in 0..count {
            let text = self.fetch_with_skips(partition, &mut skips, |skips| InstanceKey::Open {
                index: index + skips,
            })?;
            out.push(parse_record(&text, self.feat_num)?);
        }
        Ok(out)
    }

    fn fetch_with_skips(
        &self,
        partition: Partition,
        skips: &mut usize,
        key_at: impl Fn(usize) -> InstanceKey,
    ) -> Result<String> {
        loop {
            let key = key_at(*skips);
            if let Some(text) = self.source.fetch(partition, key)? {
                return Ok(text);
            }
            *skips += 1;
            if *skips > self.budget {
                return Err(KnnError::DataUnavailable {
                    key: self.source.describe(partition, key),
                    budget: self.budget,
                });
            }
            warn!(record = %self.source.describe(partition, key), "missing instance, trying next");
        }
    }
}

/// Load every partition of a batch run as sized by `config`.
pub fn load_dataset<S: FeatureSource + ?Sized>(source: &S, config: &Config) -> Result<Dataset> {
    let loader = Loader::new(source, config.feat_num, config.missing_budget);

    let training = loader.load_closed(Partition::Weight, config.site_num, config.test_num..config.inst_num())?;
    info!(instances = training.len(), "loaded instances: main");

    Dataset::with_eval(config, training, load_eval_with(&loader, config)?)
}

/// Load only what a classification-only run reads: reference, query and
/// open-world records. The weight-learning partition is never touched.
pub fn load_eval<S: FeatureSource + ?Sized>(source: &S, config: &Config) -> Result<EvalSet> {
    let loader = Loader::new(source, config.feat_num, config.missing_budget);
    load_eval_with(&loader, config)
}

fn load_eval_with<S: FeatureSource + ?Sized>(loader: &Loader<'_, S>, config: &Config) -> Result<EvalSet> {
    let closed_reference = loader.load_closed(Partition::Train, config.site_num, 0..config.test_num)?;
    info!(instances = closed_reference.len(), "loaded instances: training");
    let closed_query = loader.load_closed(Partition::Test, config.site_num, 0..config.test_num)?;
    info!(instances = closed_query.len(), "loaded instances: testing");
    let open = loader.load_open(Partition::Open, config.open_test_num)?;
    info!(instances = open.len(), "loaded instances: open");

    EvalSet::new(config, closed_reference, closed_query, open)
}
