//! Training loop: pull a video, propagate ROIs through the feature net,
//! assemble a recurrent batch and step the solver once.

use log::info;
use rand::{SeedableRng, rngs::StdRng};

use crate::dataset::{Dataset, VideoProtocol};
use crate::error::{Error, Result};
use crate::stats::BBoxNormalizationStats;
use crate::target::{BatchAssembler, TargetAssigner};
use crate::tracker::{FeatureNet, FrameResult, RoiPropagator};
use crate::training::cursor::VideoCursor;
use crate::training::solver::RecurrentSolver;

/// Knobs of the training loop that are not part of the propagation config.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub max_iter: usize,
    /// Worker rank; also the cursor start position.
    pub rank: usize,
    pub reshuffle_on_wrap: bool,
    /// Log every propagated box of every step.
    pub vis_debug: bool,
    /// Log a progress line every this many steps.
    pub display: usize,
    pub seed: u64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_iter: 0,
            rank: 0,
            reshuffle_on_wrap: false,
            vis_debug: false,
            display: 20,
            seed: 0,
        }
    }
}

/// What a single training step consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary {
    pub iter: usize,
    pub video: String,
    pub observed_frames: usize,
    pub num_foreground: usize,
    pub num_valid: usize,
}

/// Pulls videos round-robin, propagates ROIs through the feature net,
/// builds recurrent batches and steps the solver.
pub struct TrainingDriver<F, S, A> {
    dataset: Dataset,
    cursor: VideoCursor,
    propagator: RoiPropagator,
    assigner: A,
    stats: BBoxNormalizationStats,
    net: F,
    solver: S,
    rng: StdRng,
    options: DriverOptions,
}

impl<F, S, A> TrainingDriver<F, S, A>
where
    F: FeatureNet,
    S: RecurrentSolver,
    A: TargetAssigner,
{
    /// Folds `stats` into the feature net's regression layer; the same stats
    /// then normalize every regression target.
    pub fn new(
        dataset: Dataset,
        propagator: RoiPropagator,
        assigner: A,
        stats: BBoxNormalizationStats,
        mut net: F,
        solver: S,
        options: DriverOptions,
    ) -> Result<Self> {
        if dataset.is_empty() {
            return Err(Error::EmptyDataset);
        }
        net.fold_bbox_normalization(&stats)?;

        let cursor = VideoCursor::new(
            dataset.names().to_vec(),
            options.rank,
            options.reshuffle_on_wrap,
            options.seed ^ options.rank as u64,
        );
        let rng = StdRng::seed_from_u64(options.seed.wrapping_add(options.rank as u64));
        Ok(Self {
            dataset,
            cursor,
            propagator,
            assigner,
            stats,
            net,
            solver,
            rng,
            options,
        })
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn net(&self) -> &F {
        &self.net
    }

    pub fn cursor(&self) -> &VideoCursor {
        &self.cursor
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    /// Train until the solver's counter reaches `max_iter`.
    ///
    /// A restored solver resumes from its own counter, so only the remaining
    /// steps run.
    pub fn run(&mut self) -> Result<Vec<StepSummary>> {
        let start_iter = self.solver.iter();
        let remaining = self.options.max_iter.saturating_sub(start_iter);
        info!(
            "rank {}: training from iteration {} to {}",
            self.options.rank, start_iter, self.options.max_iter
        );

        let mut summaries = Vec::with_capacity(remaining);
        for _ in 0..remaining {
            let summary = self.step()?;
            if self.options.display > 0 && summary.iter % self.options.display == 0 {
                info!(
                    "rank {}: iter {}, video '{}', {} frames, {} foreground / {} valid labels",
                    self.options.rank,
                    summary.iter,
                    summary.video,
                    summary.observed_frames,
                    summary.num_foreground,
                    summary.num_valid
                );
            }
            summaries.push(summary);
        }
        info!("rank {}: optimization done", self.options.rank);
        Ok(summaries)
    }

    /// One video in, one solver step out.
    pub fn step(&mut self) -> Result<StepSummary> {
        let video = self.cursor.next_video().ok_or(Error::EmptyDataset)?;
        let record = self
            .dataset
            .get(&video)
            .ok_or_else(|| Error::UnknownVideo(video.clone()))?;
        if self.options.vis_debug {
            info!("rank {}: vid_name {}", self.options.rank, video);
        }

        let frames =
            self.propagator
                .propagate(&record.vid, &record.boxes, &mut self.net, &mut self.rng)?;
        if self.options.vis_debug {
            log_tracks(&record.vid, &frames);
        }

        let config = self.propagator.config();
        let batch = BatchAssembler::new(
            &self.stats,
            &self.assigner,
            config.num_tracks,
            config.track_length,
        )
        .assemble(&frames, &record.annot)?;

        self.solver.set_inputs(&batch)?;
        self.solver.step(1)?;

        Ok(StepSummary {
            iter: self.solver.iter(),
            video,
            observed_frames: frames.iter().filter(|res| !res.is_sentinel()).count(),
            num_foreground: batch.num_foreground(),
            num_valid: batch.num_valid(),
        })
    }
}

fn log_tracks(vid: &VideoProtocol, frames: &[FrameResult]) {
    for res in frames.iter().take_while(|res| !res.is_sentinel()) {
        let path = vid
            .frame_path_at(res.frame)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| format!("frame {}", res.frame));
        for track in 0..res.num_tracks() {
            let roi = res.roi(track);
            info!(
                "{} {path} track {track}: [{:.1}, {:.1}, {:.1}, {:.1}]",
                vid.name(),
                roi.x1,
                roi.y1,
                roi.x2,
                roi.y2
            );
        }
    }
}
