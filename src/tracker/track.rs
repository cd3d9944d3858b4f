//! Track data model: raw per-frame tracking output and per-track records.

use ndarray::Array2;

use crate::tracker::rect::Rect;

/// Frame index marking the end of real tracking data in a raw feed.
pub const SENTINEL_FRAME: i32 = -1;

/// One track's state at one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackStep {
    pub frame: i32,
    pub roi: Rect,
}

/// Ordered steps of one track across its lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackRecord {
    pub track_id: usize,
    pub steps: Vec<TrackStep>,
}

impl TrackRecord {
    pub fn new(track_id: usize) -> Self {
        Self {
            track_id,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: i32, roi: Rect) {
        self.steps.push(TrackStep { frame, roi });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Supervision attached to a single track step.
///
/// `class_label` is 0 for background, -1 for ignore, and the class index for
/// foreground steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackTarget {
    pub class_label: i32,
    pub bbox_target: [f32; 4],
    pub bbox_weight: [f32; 4],
}

impl TrackTarget {
    pub const IGNORE_LABEL: i32 = -1;
    pub const BACKGROUND_LABEL: i32 = 0;

    pub fn background() -> Self {
        Self {
            class_label: Self::BACKGROUND_LABEL,
            bbox_target: [0.0; 4],
            bbox_weight: [0.0; 4],
        }
    }

    pub fn ignore() -> Self {
        Self {
            class_label: Self::IGNORE_LABEL,
            ..Self::background()
        }
    }

    pub fn foreground(class_label: i32, bbox_target: [f32; 4]) -> Self {
        Self {
            class_label,
            bbox_target,
            bbox_weight: [1.0; 4],
        }
    }
}

/// One entry of the raw tracking feed.
///
/// Row `i` of `rois` and `features` belongs to track `i` in every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    pub frame: i32,
    /// (num_tracks, 4) boxes in TLBR format
    pub rois: Array2<f32>,
    /// (num_tracks, feature_dim)
    pub features: Array2<f32>,
}

impl FrameResult {
    pub fn sentinel() -> Self {
        Self {
            frame: SENTINEL_FRAME,
            rois: Array2::zeros((0, 4)),
            features: Array2::zeros((0, 0)),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.frame == SENTINEL_FRAME
    }

    pub fn num_tracks(&self) -> usize {
        self.rois.nrows()
    }

    pub fn roi(&self, track: usize) -> Rect {
        let row = self.rois.row(track);
        Rect::new(row[0], row[1], row[2], row[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_frame_result_roi() {
        let res = FrameResult {
            frame: 3,
            rois: array![[0.0, 1.0, 2.0, 3.0], [4.0, 5.0, 6.0, 7.0]],
            features: Array2::zeros((2, 8)),
        };
        assert_eq!(res.num_tracks(), 2);
        assert_eq!(res.roi(1), Rect::new(4.0, 5.0, 6.0, 7.0));
        assert!(!res.is_sentinel());
        assert!(FrameResult::sentinel().is_sentinel());
    }

    #[test]
    fn test_target_kinds() {
        assert_eq!(TrackTarget::background().class_label, 0);
        assert_eq!(TrackTarget::ignore().class_label, -1);
        let fg = TrackTarget::foreground(3, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(fg.class_label, 3);
        assert_eq!(fg.bbox_weight, [1.0; 4]);
    }
}
