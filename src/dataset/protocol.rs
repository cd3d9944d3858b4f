//! Video, candidate-box and annotation protocol records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};
use crate::tracker::Rect;

/// Parse a JSON protocol file.
pub fn load_protocol<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| Error::Json {
        path: path.to_owned(),
        source,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub name: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame: i32,
    pub path: PathBuf,
}

/// Ordered frame descriptors of one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProtocol {
    pub video: VideoInfo,
    pub frames: Vec<FrameInfo>,
    #[serde(default)]
    pub root_path: Option<PathBuf>,
}

impl VideoProtocol {
    pub fn name(&self) -> &str {
        &self.video.name
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Position of `frame` in the frame list.
    pub fn frame_position(&self, frame: i32) -> Option<usize> {
        self.frames.iter().position(|info| info.frame == frame)
    }

    pub fn frame_path_at(&self, frame: i32) -> Option<PathBuf> {
        let info = &self.frames[self.frame_position(frame)?];
        Some(match &self.root_path {
            Some(root) => root.join(&info.path),
            None => info.path.clone(),
        })
    }

    /// Frame size in pixels when the protocol records it.
    pub fn frame_size(&self) -> Option<(f32, f32)> {
        Some((self.video.width? as f32, self.video.height? as f32))
    }
}

/// A precomputed detection box used to seed tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateBox {
    pub frame: i32,
    pub bbox: [f32; 4],
    #[serde(default)]
    pub positive: bool,
}

impl CandidateBox {
    pub fn rect(&self) -> Rect {
        Rect::from_array(self.bbox)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxProtocol {
    pub video: String,
    #[serde(default)]
    pub method: Option<String>,
    pub boxes: Vec<CandidateBox>,
}

impl BoxProtocol {
    pub fn boxes_at(&self, frame: i32) -> impl Iterator<Item = &CandidateBox> {
        self.boxes.iter().filter(move |candidate| candidate.frame == frame)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedBox {
    pub frame: i32,
    pub bbox: [f32; 4],
    #[serde(default)]
    pub class: Option<String>,
    pub class_index: i32,
}

impl AnnotatedBox {
    pub fn rect(&self) -> Rect {
        Rect::from_array(self.bbox)
    }
}

/// Ground-truth trajectory of one object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectAnnotation {
    pub id: String,
    pub track: Vec<AnnotatedBox>,
}

impl ObjectAnnotation {
    pub fn box_at(&self, frame: i32) -> Option<&AnnotatedBox> {
        self.track.iter().find(|annotated| annotated.frame == frame)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationProtocol {
    pub video: String,
    #[serde(default)]
    pub annotations: Vec<ObjectAnnotation>,
}
