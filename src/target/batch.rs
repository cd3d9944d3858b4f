//! Assembly of raw tracking output into fixed-shape recurrent training batches.

use log::debug;
use ndarray::{Array2, Array3, ArrayView2, Axis, s, stack};

use crate::dataset::AnnotationProtocol;
use crate::error::{Error, Result};
use crate::stats::BBoxNormalizationStats;
use crate::target::assign::TargetAssigner;
use crate::target::expand::{expand_bbox_target, expand_bbox_weight};
use crate::target::pad::pad_leading;
use crate::tracker::{FrameResult, TrackRecord, TrackTarget};

/// Tensors fed to the recurrent net for one iteration.
///
/// All arrays share the leading shape (track_length, num_tracks).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTensors {
    /// (T, N, feature_dim)
    pub data: Array3<f32>,
    /// (T, N), 0 at the first step and past the observed steps, 1 elsewhere
    pub cont: Array2<f32>,
    /// (T, N), -1 past the observed steps
    pub labels: Array2<i32>,
    /// (T, N, num_classes * 4)
    pub bbox_targets: Array3<f32>,
    /// (T, N, num_classes * 4)
    pub bbox_weights: Array3<f32>,
}

impl BatchTensors {
    pub const DATA: &'static str = "data";
    pub const CONT: &'static str = "cont";
    pub const LABELS: &'static str = "labels";
    pub const BBOX_TARGETS: &'static str = "bbox_targets";
    pub const BBOX_WEIGHTS: &'static str = "bbox_weights";

    pub fn track_length(&self) -> usize {
        self.labels.nrows()
    }

    pub fn num_tracks(&self) -> usize {
        self.labels.ncols()
    }

    pub fn feature_dim(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Shapes of every named input, in the order the recurrent net declares them.
    pub fn shapes(&self) -> [(&'static str, Vec<usize>); 5] {
        [
            (Self::DATA, self.data.shape().to_vec()),
            (Self::CONT, self.cont.shape().to_vec()),
            (Self::LABELS, self.labels.shape().to_vec()),
            (Self::BBOX_TARGETS, self.bbox_targets.shape().to_vec()),
            (Self::BBOX_WEIGHTS, self.bbox_weights.shape().to_vec()),
        ]
    }

    /// Number of (step, track) positions with a foreground label.
    pub fn num_foreground(&self) -> usize {
        self.labels.iter().filter(|&&label| label > 0).count()
    }

    /// Number of (step, track) positions that contribute to the loss.
    pub fn num_valid(&self) -> usize {
        self.labels.iter().filter(|&&label| label >= 0).count()
    }
}

/// Turns the raw feed of one video into [`BatchTensors`].
pub struct BatchAssembler<'a, A: ?Sized> {
    stats: &'a BBoxNormalizationStats,
    assigner: &'a A,
    num_tracks: usize,
    track_length: usize,
}

impl<'a, A> BatchAssembler<'a, A>
where
    A: TargetAssigner + ?Sized,
{
    pub fn new(
        stats: &'a BBoxNormalizationStats,
        assigner: &'a A,
        num_tracks: usize,
        track_length: usize,
    ) -> Self {
        Self {
            stats,
            assigner,
            num_tracks,
            track_length,
        }
    }

    /// Walk `frames` up to the sentinel, label the collected tracks and
    /// build padded, time-major tensors.
    pub fn assemble(
        &self,
        frames: &[FrameResult],
        annot: &AnnotationProtocol,
    ) -> Result<BatchTensors> {
        let (tracks, features) = self.collect_tracks(frames)?;
        let observed = features.len();

        let targets = self.assigner.assign(&tracks, annot)?;
        if targets.len() != tracks.len() {
            return Err(Error::TargetCount {
                expected: tracks.len(),
                got: targets.len(),
            });
        }
        for (track, track_targets) in tracks.iter().zip(&targets) {
            if track_targets.len() != track.len() {
                return Err(Error::TargetCount {
                    expected: track.len(),
                    got: track_targets.len(),
                });
            }
        }

        // data: t * (n * c) -> t * n * c
        let data = stack(Axis(0), features.as_slice())
            .map_err(|err| Error::FeatureNet(err.to_string()))?;
        let data = pad_leading(data, self.track_length, 0.0)?;

        // cont: t * n
        let mut cont = Array2::ones((observed, self.num_tracks));
        cont.row_mut(0).fill(0.0);
        let cont = pad_leading(cont, self.track_length, 0.0)?;

        let labels = Array2::from_shape_fn((observed, self.num_tracks), |(step, track)| {
            targets[track][step].class_label
        });
        let labels = pad_leading(labels, self.track_length, TrackTarget::IGNORE_LABEL)?;

        let (bbox_targets, bbox_weights) = self.expand_targets(&targets, observed)?;
        let bbox_targets = pad_leading(bbox_targets, self.track_length, 0.0)?;
        let bbox_weights = pad_leading(bbox_weights, self.track_length, 0.0)?;

        let batch = BatchTensors {
            data,
            cont,
            labels,
            bbox_targets,
            bbox_weights,
        };
        debug!(
            "assembled {} observed steps x {} tracks: {} foreground, {} valid",
            observed,
            self.num_tracks,
            batch.num_foreground(),
            batch.num_valid()
        );
        Ok(batch)
    }

    fn collect_tracks<'f>(
        &self,
        frames: &'f [FrameResult],
    ) -> Result<(Vec<TrackRecord>, Vec<ArrayView2<'f, f32>>)> {
        let mut tracks: Vec<TrackRecord> = (0..self.num_tracks).map(TrackRecord::new).collect();
        let mut features = vec![];
        let mut feature_dim = None;

        for res in frames.iter().take_while(|res| !res.is_sentinel()) {
            if res.num_tracks() != self.num_tracks {
                return Err(Error::TrackCount {
                    frame: res.frame,
                    expected: self.num_tracks,
                    got: res.num_tracks(),
                });
            }
            if res.rois.ncols() != 4 {
                return Err(Error::RoiShape {
                    frame: res.frame,
                    got: res.rois.ncols(),
                });
            }
            let dim = *feature_dim.get_or_insert(res.features.ncols());
            if res.features.dim() != (self.num_tracks, dim) {
                return Err(Error::FeatureShape {
                    frame: res.frame,
                    expected_rows: self.num_tracks,
                    expected_dim: dim,
                    got: res.features.dim(),
                });
            }

            for (index, track) in tracks.iter_mut().enumerate() {
                track.push(res.frame, res.roi(index));
            }
            features.push(res.features.view());
        }

        if features.is_empty() {
            return Err(Error::EmptyTrack);
        }
        if features.len() > self.track_length {
            return Err(Error::SequenceTooLong {
                len: features.len(),
                track_length: self.track_length,
            });
        }
        Ok((tracks, features))
    }

    fn expand_targets(
        &self,
        targets: &[Vec<TrackTarget>],
        observed: usize,
    ) -> Result<(Array3<f32>, Array3<f32>)> {
        let num_classes = self.stats.num_classes();
        let shape = (observed, self.num_tracks, num_classes * 4);
        let mut bbox_targets = Array3::zeros(shape);
        let mut bbox_weights = Array3::zeros(shape);

        for (track, track_targets) in targets.iter().enumerate() {
            for (step, target) in track_targets.iter().enumerate() {
                let expanded =
                    expand_bbox_target(&target.bbox_target, target.class_label, self.stats)?;
                bbox_targets
                    .slice_mut(s![step, track, ..])
                    .assign(&expanded);

                let expanded =
                    expand_bbox_weight(&target.bbox_weight, target.class_label, num_classes)?;
                bbox_weights
                    .slice_mut(s![step, track, ..])
                    .assign(&expanded);
            }
        }
        Ok((bbox_targets, bbox_weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Rect;
    use ndarray::array;

    /// Hands out labels from a fixed table, indexed by track then step.
    struct TableAssigner(Vec<Vec<i32>>);

    impl TargetAssigner for TableAssigner {
        fn assign(
            &self,
            tracks: &[TrackRecord],
            _annot: &AnnotationProtocol,
        ) -> Result<Vec<Vec<TrackTarget>>> {
            Ok(tracks
                .iter()
                .zip(&self.0)
                .map(|(track, labels)| {
                    track
                        .steps
                        .iter()
                        .zip(labels)
                        .map(|(_, &label)| match label {
                            -1 => TrackTarget::ignore(),
                            0 => TrackTarget::background(),
                            k => TrackTarget::foreground(k, [0.5, -0.5, 0.25, 0.0]),
                        })
                        .collect()
                })
                .collect())
        }
    }

    fn annotation() -> AnnotationProtocol {
        serde_json::from_str(r#"{"video": "v", "annotations": []}"#).unwrap()
    }

    fn frame(frame: i32, num_tracks: usize, dim: usize) -> FrameResult {
        let mut rois = Array2::zeros((num_tracks, 4));
        for (i, mut row) in rois.outer_iter_mut().enumerate() {
            row.assign(&array![0.0, 0.0, 9.0 + i as f32, 9.0]);
        }
        FrameResult {
            frame,
            rois,
            features: Array2::from_elem((num_tracks, dim), frame as f32),
        }
    }

    #[test]
    fn test_assemble_pads_to_track_length() {
        let stats = BBoxNormalizationStats::identity(3).unwrap();
        let assigner = TableAssigner(vec![vec![1, 2], vec![0, -1]]);
        let assembler = BatchAssembler::new(&stats, &assigner, 2, 4);
        let frames = vec![frame(5, 2, 3), frame(6, 2, 3), FrameResult::sentinel()];

        let batch = assembler.assemble(&frames, &annotation()).unwrap();

        assert_eq!(batch.data.dim(), (4, 2, 3));
        assert_eq!(batch.bbox_targets.dim(), (4, 2, 12));
        assert_eq!(batch.bbox_weights.dim(), (4, 2, 12));
        assert_eq!(batch.labels, array![[1, 0], [2, -1], [-1, -1], [-1, -1]]);
        assert_eq!(
            batch.cont,
            array![[0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [0.0, 0.0]]
        );
        assert!(batch.data.slice(s![1, .., ..]).iter().all(|&v| v == 6.0));
        assert!(batch.data.slice(s![2.., .., ..]).iter().all(|&v| v == 0.0));

        // track 0, step 1 is class 2: slots 8..12
        assert_eq!(
            batch.bbox_targets.slice(s![1, 0, 8..12]).to_vec(),
            vec![0.5, -0.5, 0.25, 0.0]
        );
        assert_eq!(batch.bbox_weights.slice(s![1, 0, ..]).iter().sum::<f32>(), 4.0);
        assert!(batch.bbox_weights.slice(s![.., 1, ..]).iter().all(|&v| v == 0.0));
        assert_eq!(batch.num_foreground(), 2);
        assert_eq!(batch.num_valid(), 3);
    }

    #[test]
    fn test_track_count_mismatch_is_fatal() {
        let stats = BBoxNormalizationStats::identity(3).unwrap();
        let assigner = TableAssigner(vec![vec![0]; 3]);
        let assembler = BatchAssembler::new(&stats, &assigner, 3, 4);
        let frames = vec![frame(1, 3, 2), frame(2, 2, 2)];
        assert!(matches!(
            assembler.assemble(&frames, &annotation()),
            Err(Error::TrackCount {
                frame: 2,
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_malformed_rois_are_rejected() {
        let stats = BBoxNormalizationStats::identity(3).unwrap();
        let assigner = TableAssigner(vec![vec![0, 0]; 2]);
        let assembler = BatchAssembler::new(&stats, &assigner, 2, 4);
        let mut bad = frame(2, 2, 3);
        bad.rois = Array2::zeros((2, 3));
        let frames = vec![frame(1, 2, 3), bad];
        assert!(matches!(
            assembler.assemble(&frames, &annotation()),
            Err(Error::RoiShape { frame: 2, got: 3 })
        ));
    }

    #[test]
    fn test_feature_dim_change_is_rejected() {
        let stats = BBoxNormalizationStats::identity(3).unwrap();
        let assigner = TableAssigner(vec![vec![0, 0]; 2]);
        let assembler = BatchAssembler::new(&stats, &assigner, 2, 4);
        let frames = vec![frame(1, 2, 3), frame(2, 2, 4)];
        assert!(matches!(
            assembler.assemble(&frames, &annotation()),
            Err(Error::FeatureShape { frame: 2, .. })
        ));
    }

    #[test]
    fn test_sentinel_first_is_empty() {
        let stats = BBoxNormalizationStats::identity(3).unwrap();
        let assigner = TableAssigner(vec![]);
        let assembler = BatchAssembler::new(&stats, &assigner, 2, 4);
        assert!(matches!(
            assembler.assemble(&[FrameResult::sentinel()], &annotation()),
            Err(Error::EmptyTrack)
        ));
    }

    #[test]
    fn test_collect_tracks_aligns_rows() {
        let stats = BBoxNormalizationStats::identity(2).unwrap();
        let assigner = TableAssigner(vec![]);
        let assembler = BatchAssembler::new(&stats, &assigner, 2, 4);
        let frames = vec![frame(3, 2, 1), frame(4, 2, 1)];
        let (tracks, features) = assembler.collect_tracks(&frames).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(tracks[1].steps[0].frame, 3);
        assert_eq!(tracks[1].steps[1].roi, Rect::new(0.0, 0.0, 10.0, 9.0));
    }
}
