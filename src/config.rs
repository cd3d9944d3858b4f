//! Training program configuration formats.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

fn read_yaml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| Error::Yaml {
        path: path.to_owned(),
        source,
    })
}

/// The training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// File listing one video per line; only the basename of each line is used.
    pub vid_list: PathBuf,
    pub vid_dir: PathBuf,
    pub box_dir: PathBuf,
    pub annot_dir: PathBuf,
    /// Optional file of video names to exclude.
    #[serde(default)]
    pub blacklist: Option<PathBuf>,
    /// Number of time steps per training sequence.
    pub track_length: usize,
    /// Number of tracks sampled per video and iteration.
    pub track_per_vid: usize,
    /// Fraction of seed boxes drawn from positive candidates.
    pub fg_ratio: f64,
    /// Reshuffle the video order each time the cursor wraps around.
    #[serde(default)]
    pub reshuffle_on_wrap: bool,
    /// Seed for shuffling and track sampling. Drawn from the OS if unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TrainConfig {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let config: Self = read_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.track_length == 0 {
            return Err(Error::Config("track_length must be positive".into()));
        }
        if self.track_per_vid == 0 {
            return Err(Error::Config("track_per_vid must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.fg_ratio) {
            return Err(Error::Config(format!(
                "fg_ratio must lie in [0, 1], got {}",
                self.fg_ratio
            )));
        }
        Ok(())
    }

    /// Dataset folders keyed by their configuration name.
    pub fn folders(&self) -> [(&'static str, &Path); 3] {
        [
            ("vid_dir", self.vid_dir.as_path()),
            ("box_dir", self.box_dir.as_path()),
            ("annot_dir", self.annot_dir.as_path()),
        ]
    }
}

/// The subset of solver parameters the driver reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverParameter {
    pub max_iter: usize,
    /// GPU ids, indexed by worker rank.
    #[serde(default)]
    pub device_id: Vec<usize>,
    /// Snapshot interval in iterations.
    #[serde(default)]
    pub snapshot: Option<usize>,
    #[serde(default)]
    pub snapshot_prefix: Option<PathBuf>,
    #[serde(default)]
    pub base_lr: Option<f64>,
}

impl SolverParameter {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        read_yaml(path)
    }

    /// The device assigned to `rank` in a pool of `pool_size` workers.
    pub fn device_for(&self, rank: usize, pool_size: usize) -> Result<usize> {
        if self.device_id.len() < pool_size {
            return Err(Error::Config(format!(
                "{} devices listed for a pool of {} workers",
                self.device_id.len(),
                pool_size
            )));
        }
        self.device_id
            .get(rank)
            .copied()
            .ok_or_else(|| Error::Config(format!("no device listed for rank {rank}")))
    }
}

/// Region-proposal framework options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RcnnConfig {
    #[serde(default)]
    pub train: RcnnTrainConfig,
}

impl RcnnConfig {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let config: Self = read_yaml(path)?;
        config.train.validate()?;
        Ok(config)
    }
}

/// Overlap thresholds used when labeling tracked boxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct RcnnTrainConfig {
    /// Minimum IoU with the associated object for a foreground step.
    pub fg_thresh: f32,
    /// Background steps have IoU in `[bg_thresh_lo, bg_thresh_hi)`.
    pub bg_thresh_hi: f32,
    pub bg_thresh_lo: f32,
    /// Maximum `1 - mean IoU` for associating a track with an object.
    pub track_match_thresh: f32,
}

impl Default for RcnnTrainConfig {
    fn default() -> Self {
        Self {
            fg_thresh: 0.5,
            bg_thresh_hi: 0.5,
            bg_thresh_lo: 0.0,
            track_match_thresh: 0.7,
        }
    }
}

impl RcnnTrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bg_thresh_lo > self.bg_thresh_hi {
            return Err(Error::Config(
                "BG_THRESH_LO must not exceed BG_THRESH_HI".into(),
            ));
        }
        if self.bg_thresh_hi > self.fg_thresh {
            return Err(Error::Config("BG_THRESH_HI must not exceed FG_THRESH".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN_YAML: &str = "
vid_list: lists/train.txt
vid_dir: data/vid
box_dir: data/box
annot_dir: data/annot
blacklist: null
track_length: 20
track_per_vid: 32
fg_ratio: 0.5
";

    #[test]
    fn test_parse_train_config() {
        let config: TrainConfig = serde_yaml::from_str(TRAIN_YAML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.track_length, 20);
        assert_eq!(config.track_per_vid, 32);
        assert!(config.blacklist.is_none());
        assert!(!config.reshuffle_on_wrap);
        assert!(config.seed.is_none());
        assert_eq!(config.folders()[1].0, "box_dir");
    }

    #[test]
    fn test_invalid_fg_ratio() {
        let mut config: TrainConfig = serde_yaml::from_str(TRAIN_YAML).unwrap();
        config.fg_ratio = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_device_for_rank() {
        let solver: SolverParameter =
            serde_yaml::from_str("max_iter: 100\ndevice_id: [2, 3]\n").unwrap();
        assert_eq!(solver.device_for(1, 2).unwrap(), 3);
        assert!(solver.device_for(0, 3).is_err());
    }

    #[test]
    fn test_rcnn_defaults() {
        let config: RcnnConfig = serde_yaml::from_str("TRAIN:\n  FG_THRESH: 0.6\n").unwrap();
        assert_eq!(config.train.fg_thresh, 0.6);
        assert_eq!(config.train.bg_thresh_hi, 0.5);
        config.train.validate().unwrap();
    }
}
