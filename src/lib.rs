//! Training driver for Tubelet Proposal Networks.
//!
//! Candidate boxes seed tracks that a feature net propagates through a
//! video. The tracked boxes are matched against ground truth, turned into
//! per-step class and regression targets, and packed into time-major
//! tensors for a recurrent solver.

pub mod config;
pub mod dataset;
pub mod error;
pub mod stats;
pub mod target;
pub mod tracker;
pub mod training;

#[cfg(feature = "burn-backend")]
pub mod integration;

pub use config::{RcnnConfig, RcnnTrainConfig, SolverParameter, TrainConfig};
pub use dataset::{Dataset, VideoRecord};
pub use error::{Error, Result};
pub use stats::BBoxNormalizationStats;
pub use target::{BatchAssembler, BatchTensors, IouTargetAssigner, TargetAssigner};
pub use tracker::{FeatureNet, FrameResult, GeometryFeatureNet, Rect, RoiPropagator};
pub use training::{DryRunSolver, RecurrentSolver, TrainingDriver};
