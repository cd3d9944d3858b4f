//! Error type shared by every stage of the training pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{key} folder does not exist: {}", path.display())]
    MissingFolder { key: &'static str, path: PathBuf },
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("yaml parse error at {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid bbox normalization stats: {0}")]
    Stats(String),
    #[error("no usable videos left after filtering the video list")]
    EmptyDataset,
    #[error("frame {frame} carries {got} tracks, expected {expected}")]
    TrackCount {
        frame: i32,
        expected: usize,
        got: usize,
    },
    #[error("frame {frame} carries ROIs with {got} coordinates, expected 4")]
    RoiShape { frame: i32, got: usize },
    #[error("frame {frame} carries features of shape {got:?}, expected ({expected_rows}, {expected_dim})")]
    FeatureShape {
        frame: i32,
        expected_rows: usize,
        expected_dim: usize,
        got: (usize, usize),
    },
    #[error("tracking result contains no frame before the sentinel")]
    EmptyTrack,
    #[error("bbox target must have exactly 4 elements, got {0}")]
    TargetShape(usize),
    #[error("class label {label} is out of range for {num_classes} classes")]
    ClassOutOfRange { label: i32, num_classes: usize },
    #[error("sequence of length {len} exceeds the track length {track_length}")]
    SequenceTooLong { len: usize, track_length: usize },
    #[error("target assignment returned {got} targets for a track of {expected} steps")]
    TargetCount { expected: usize, got: usize },
    #[error("video '{0}' is not part of the loaded dataset")]
    UnknownVideo(String),
    #[error("video '{0}' has no candidate boxes to seed tracks")]
    NoSeedBoxes(String),
    #[error("feature net failure: {0}")]
    FeatureNet(String),
    #[error("solver failure: {0}")]
    Solver(String),
}
