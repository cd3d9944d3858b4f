//! Supervision for tracked boxes from ground-truth trajectories.

use ndarray::Array2;

use crate::config::RcnnTrainConfig;
use crate::dataset::{AnnotationProtocol, ObjectAnnotation};
use crate::error::Result;
use crate::tracker::{TrackRecord, TrackStep, TrackTarget, linear_assignment};

/// Labels every step of every track.
///
/// The returned outer vector is aligned with `tracks` and each inner vector
/// with the steps of that track.
pub trait TargetAssigner {
    fn assign(
        &self,
        tracks: &[TrackRecord],
        annot: &AnnotationProtocol,
    ) -> Result<Vec<Vec<TrackTarget>>>;
}

/// Associates each track with at most one ground-truth trajectory by mean
/// IoU, then labels each step by its overlap with that trajectory.
#[derive(Debug, Clone, Default)]
pub struct IouTargetAssigner {
    config: RcnnTrainConfig,
}

impl IouTargetAssigner {
    pub fn new(config: RcnnTrainConfig) -> Self {
        Self { config }
    }

    fn step_iou(step: &TrackStep, object: &ObjectAnnotation) -> f32 {
        object
            .box_at(step.frame)
            .map_or(0.0, |gt| step.roi.iou(&gt.rect()))
    }

    fn mean_iou(track: &TrackRecord, object: &ObjectAnnotation) -> f32 {
        if track.is_empty() {
            return 0.0;
        }
        let total: f32 = track.steps.iter().map(|step| Self::step_iou(step, object)).sum();
        total / track.len() as f32
    }

    fn label_step(
        &self,
        step: &TrackStep,
        matched: Option<&ObjectAnnotation>,
        annot: &AnnotationProtocol,
    ) -> TrackTarget {
        let RcnnTrainConfig {
            fg_thresh,
            bg_thresh_hi,
            bg_thresh_lo,
            ..
        } = self.config;

        if let Some(gt) = matched.and_then(|object| object.box_at(step.frame)) {
            let iou = step.roi.iou(&gt.rect());
            if iou >= fg_thresh && gt.class_index > 0 {
                return TrackTarget::foreground(gt.class_index, step.roi.deltas_to(&gt.rect()));
            }
        }

        // unassociated steps only become background when clear of every object
        let max_iou = annot
            .annotations
            .iter()
            .map(|object| Self::step_iou(step, object))
            .fold(0.0, f32::max);
        if max_iou >= bg_thresh_lo && max_iou < bg_thresh_hi {
            TrackTarget::background()
        } else {
            TrackTarget::ignore()
        }
    }
}

impl TargetAssigner for IouTargetAssigner {
    fn assign(
        &self,
        tracks: &[TrackRecord],
        annot: &AnnotationProtocol,
    ) -> Result<Vec<Vec<TrackTarget>>> {
        let objects = &annot.annotations;

        let mut cost = Array2::zeros((tracks.len(), objects.len()));
        for (t, track) in tracks.iter().enumerate() {
            for (o, object) in objects.iter().enumerate() {
                cost[[t, o]] = 1.0 - Self::mean_iou(track, object);
            }
        }
        let mut matched = vec![None; tracks.len()];
        for (t, o) in linear_assignment(&cost, self.config.track_match_thresh) {
            matched[t] = Some(&objects[o]);
        }

        Ok(tracks
            .iter()
            .zip(matched)
            .map(|(track, object)| {
                track
                    .steps
                    .iter()
                    .map(|step| self.label_step(step, object, annot))
                    .collect()
            })
            .collect())
    }
}
