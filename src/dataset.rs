//! Per-video protocol records and the training video set.

mod loader;
mod protocol;

pub use loader::{DEBUG_VIDEO_LIMIT, Dataset, VideoRecord};
pub use protocol::{
    AnnotatedBox, AnnotationProtocol, BoxProtocol, CandidateBox, FrameInfo, ObjectAnnotation,
    VideoInfo, VideoProtocol, load_protocol,
};
