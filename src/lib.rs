//! wknn: weighted k-nearest-neighbour classification of traffic traces.
//!
//! Traces are fixed-length feature vectors. A run has two phases:
//!
//! 1. [`WeightLearner`] learns one weight per feature from a labelled pool,
//!    pulling each instance's same-site neighbours closer than its other-site
//!    neighbours under a weighted L1 distance.
//! 2. [`Classifier`] labels queries with k-NN under the frozen weights. A site
//!    is predicted only when all `k` neighbours agree; anything else is
//!    rejected as open-world ("unknown").
//!
//! Both phases compare one vector against a whole pool at a time. That
//! fan-out runs on a bounded rayon pool ([`DistanceFanOut`]); everything else
//! is sequential.
//!
//! # Critical Nuances
//!
//! ## Missing features
//!
//! A feature value of [`distance::MISSING`] (`-1`) means "not observed". The
//! distance skips such features on either side, and the learner treats them
//! as a zero difference. Legitimate feature values must never equal `-1`.
//!
//! ## Self-matches
//!
//! The learner never picks an instance as its own neighbour, and the
//! classifier never lets a query match the reference slot at its own
//! position, even when all distances are equal.
//!
//! ## Open-world accounting
//!
//! The true-negative rate is the mean credit over open-world queries, and is
//! defined as 1 when there are none.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod fanout;
pub mod io;
pub mod learner;
pub mod pipeline;
pub mod weights;

// Re-exports
pub use classifier::{Accuracy, Classifier, QueryOutcome};
pub use config::Config;
pub use dataset::{
    generate_clustered_dataset, Dataset, EvalPool, EvalSet, FeatureVector, SyntheticParams, TrainingPool,
};
pub use error::{KnnError, Result};
pub use fanout::{DistanceFanOut, DistanceList};
pub use learner::{StepReport, WeightLearner};
pub use pipeline::{evaluate_with, learn_and_evaluate, RunReport};
pub use weights::WeightVector;
