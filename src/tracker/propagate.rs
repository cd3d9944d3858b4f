//! ROI propagation: seed tracks from candidate boxes and follow them through
//! the feature net's box regression, frame by frame.

use log::debug;
use ndarray::{Array2, ArrayView1, Axis, concatenate, s};
use rand::{Rng, seq::IndexedRandom};

use crate::dataset::{BoxProtocol, CandidateBox, VideoProtocol};
use crate::error::{Error, Result};
use crate::tracker::feature_net::{FeatureNet, FeatureNetOutput};
use crate::tracker::rect::Rect;
use crate::tracker::track::FrameResult;

/// Configuration for a propagation pass.
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    pub num_tracks: usize,
    pub track_length: usize,
    pub fg_ratio: f64,
    /// Maximum number of ROIs per feature net call.
    pub batch_size: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            num_tracks: 32,
            track_length: 20,
            fg_ratio: 0.5,
            batch_size: 32,
        }
    }
}

pub struct RoiPropagator {
    config: PropagationConfig,
}

impl RoiPropagator {
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Run one propagation pass over a window of `vid`.
    ///
    /// Returns one [`FrameResult`] per visited frame, followed by a sentinel
    /// when the video ends before the window is full.
    pub fn propagate<F, R>(
        &self,
        vid: &VideoProtocol,
        boxes: &BoxProtocol,
        net: &mut F,
        rng: &mut R,
    ) -> Result<Vec<FrameResult>>
    where
        F: FeatureNet + ?Sized,
        R: Rng + ?Sized,
    {
        let PropagationConfig {
            num_tracks,
            track_length,
            ..
        } = self.config;

        let start = self.pick_start(vid, boxes, rng)?;
        let start_frame = vid.frames[start].frame;
        let mut rois = self.sample_seeds(boxes, start_frame, rng);
        debug!(
            "propagate {} tracks in '{}' from frame {}",
            rois.len(),
            vid.name(),
            start_frame
        );

        let end = (start + track_length).min(vid.num_frames());
        let mut results = Vec::with_capacity(track_length + 1);
        for position in start..end {
            let frame = vid.frames[position].frame;
            let output = self.forward_chunked(net, vid, frame, &rois)?;

            results.push(FrameResult {
                frame,
                rois: rois_to_array(&rois),
                features: output.features.clone(),
            });

            rois = rois
                .iter()
                .enumerate()
                .map(|(i, roi)| {
                    let scores = output.scores.as_ref().map(|scores| scores.row(i));
                    let deltas = regression_for(output.bbox_deltas.row(i), scores);
                    let moved = roi.apply_deltas(deltas);
                    match vid.frame_size() {
                        Some((width, height)) => moved.clip(width, height),
                        None => moved,
                    }
                })
                .collect();
        }

        if results.len() < track_length {
            results.push(FrameResult::sentinel());
        }
        debug_assert!(
            results
                .iter()
                .all(|res| res.is_sentinel() || res.num_tracks() == num_tracks)
        );
        Ok(results)
    }

    fn pick_start<R>(&self, vid: &VideoProtocol, boxes: &BoxProtocol, rng: &mut R) -> Result<usize>
    where
        R: Rng + ?Sized,
    {
        let seedable: Vec<usize> = vid
            .frames
            .iter()
            .enumerate()
            .filter(|(_, info)| boxes.boxes_at(info.frame).next().is_some())
            .map(|(position, _)| position)
            .collect();
        let full_window: Vec<usize> = seedable
            .iter()
            .copied()
            .filter(|&position| position + self.config.track_length <= vid.num_frames())
            .collect();

        let pool = if full_window.is_empty() {
            &seedable
        } else {
            &full_window
        };
        pool.choose(rng)
            .copied()
            .ok_or_else(|| Error::NoSeedBoxes(vid.name().to_owned()))
    }

    fn sample_seeds<R>(&self, boxes: &BoxProtocol, frame: i32, rng: &mut R) -> Vec<Rect>
    where
        R: Rng + ?Sized,
    {
        let num_tracks = self.config.num_tracks;
        let (positives, negatives): (Vec<&CandidateBox>, Vec<&CandidateBox>) =
            boxes.boxes_at(frame).partition(|candidate| candidate.positive);

        let num_fg = if positives.is_empty() {
            0
        } else if negatives.is_empty() {
            num_tracks
        } else {
            ((self.config.fg_ratio * num_tracks as f64).round() as usize).min(num_tracks)
        };

        let mut seeds = sample_boxes(&positives, num_fg, rng);
        seeds.extend(sample_boxes(&negatives, num_tracks - num_fg, rng));
        seeds
    }

    fn forward_chunked<F>(
        &self,
        net: &mut F,
        vid: &VideoProtocol,
        frame: i32,
        rois: &[Rect],
    ) -> Result<FeatureNetOutput>
    where
        F: FeatureNet + ?Sized,
    {
        let mut outputs = vec![];
        for chunk in rois.chunks(self.config.batch_size.max(1)) {
            let output = net.forward(vid, frame, chunk)?;
            if output.features.nrows() != chunk.len() || output.bbox_deltas.nrows() != chunk.len() {
                return Err(Error::FeatureNet(format!(
                    "frame {frame}: {} rois in, {} features and {} regressions out",
                    chunk.len(),
                    output.features.nrows(),
                    output.bbox_deltas.nrows()
                )));
            }
            if output.bbox_deltas.ncols() % 4 != 0 {
                return Err(Error::FeatureNet(format!(
                    "frame {frame}: {} regression outputs is not a multiple of 4",
                    output.bbox_deltas.ncols()
                )));
            }
            outputs.push(output);
        }
        if outputs.len() == 1 {
            return Ok(outputs.remove(0));
        }

        let cat = |arrays: Vec<_>| {
            concatenate(Axis(0), arrays.as_slice())
                .map_err(|err| Error::FeatureNet(err.to_string()))
        };
        let features = cat(outputs.iter().map(|out| out.features.view()).collect())?;
        let bbox_deltas = cat(outputs.iter().map(|out| out.bbox_deltas.view()).collect())?;
        let scores = if outputs.iter().all(|out| out.scores.is_some()) {
            let views = outputs
                .iter()
                .filter_map(|out| out.scores.as_ref().map(|scores| scores.view()))
                .collect();
            Some(cat(views)?)
        } else {
            None
        };

        Ok(FeatureNetOutput {
            features,
            scores,
            bbox_deltas,
        })
    }
}

fn sample_boxes<R>(pool: &[&CandidateBox], count: usize, rng: &mut R) -> Vec<Rect>
where
    R: Rng + ?Sized,
{
    if pool.len() >= count {
        pool.choose_multiple(rng, count)
            .map(|candidate| candidate.rect())
            .collect()
    } else {
        (0..count)
            .filter_map(|_| pool.choose(rng))
            .map(|candidate| candidate.rect())
            .collect()
    }
}

/// Deltas of the highest-scoring foreground class, or the mean over
/// foreground classes when the net gives no scores.
fn regression_for(deltas: ArrayView1<'_, f32>, scores: Option<ArrayView1<'_, f32>>) -> [f32; 4] {
    let num_classes = deltas.len() / 4;
    let class_deltas = |k: usize| {
        let slot = deltas.slice(s![4 * k..4 * k + 4]);
        [slot[0], slot[1], slot[2], slot[3]]
    };
    if num_classes <= 1 {
        return if num_classes == 1 { class_deltas(0) } else { [0.0; 4] };
    }

    match scores {
        Some(scores) => {
            let best = (1..num_classes.min(scores.len()))
                .max_by(|&a, &b| scores[a].total_cmp(&scores[b]))
                .unwrap_or(1);
            class_deltas(best)
        }
        None => {
            let mut mean = [0.0; 4];
            for k in 1..num_classes {
                for (acc, value) in mean.iter_mut().zip(class_deltas(k)) {
                    *acc += value;
                }
            }
            mean.map(|sum| sum / (num_classes - 1) as f32)
        }
    }
}

fn rois_to_array(rois: &[Rect]) -> Array2<f32> {
    let mut array = Array2::zeros((rois.len(), 4));
    for (mut row, roi) in array.outer_iter_mut().zip(rois) {
        row.assign(&ArrayView1::from(&roi.to_array()));
    }
    array
}
