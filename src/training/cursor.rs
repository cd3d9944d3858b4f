//! Per-worker position in the shuffled video list.

use log::info;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// Round-robin cursor over a worker's video order.
///
/// Wraps to the front after the last video. Whether the order is reshuffled
/// on wraparound is an explicit switch; without it every pass repeats the
/// first order.
#[derive(Debug, Clone)]
pub struct VideoCursor {
    order: Vec<String>,
    position: usize,
    reshuffle_on_wrap: bool,
    epoch: usize,
    rng: StdRng,
}

impl VideoCursor {
    /// Start at `start % order.len()`; workers pass their rank.
    pub fn new(order: Vec<String>, start: usize, reshuffle_on_wrap: bool, seed: u64) -> Self {
        let position = if order.is_empty() {
            0
        } else {
            start % order.len()
        };
        Self {
            order,
            position,
            reshuffle_on_wrap,
            epoch: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of completed passes over the order.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Return the current video and advance, wrapping at the end.
    pub fn next_video(&mut self) -> Option<String> {
        let name = self.order.get(self.position)?.clone();
        self.position += 1;

        if self.position >= self.order.len() {
            info!("reach end of data, start over");
            self.position = 0;
            self.epoch += 1;
            if self.reshuffle_on_wrap {
                self.order.shuffle(&mut self.rng);
            }
        }
        Some(name)
    }
}
