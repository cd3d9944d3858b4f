mod feature_net;
mod matching;
mod propagate;
mod rect;
mod track;

pub use feature_net::{BBoxPredLayer, FeatureNet, FeatureNetOutput, GeometryFeatureNet};
pub use matching::linear_assignment;
pub use propagate::{PropagationConfig, RoiPropagator};
pub use rect::Rect;
pub use track::{FrameResult, SENTINEL_FRAME, TrackRecord, TrackStep, TrackTarget};
