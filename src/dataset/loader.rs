//! Video list filtering and in-memory dataset loading.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::{debug, info};
use rand::{Rng, seq::SliceRandom};

use crate::config::TrainConfig;
use crate::dataset::protocol::{AnnotationProtocol, BoxProtocol, VideoProtocol, load_protocol};
use crate::error::{Error, Result};

/// Videos kept when running with `--debug`.
pub const DEBUG_VIDEO_LIMIT: usize = 500;

const LOG_EVERY_SAMPLES: usize = 500;

/// The three protocols of one video.
#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub vid: VideoProtocol,
    pub boxes: BoxProtocol,
    pub annot: AnnotationProtocol,
}

/// All training videos, loaded once and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Dataset {
    videos: HashMap<String, VideoRecord>,
    names: Vec<String>,
}

impl Dataset {
    /// Validate folders, filter the video list and load every remaining video.
    ///
    /// Names come back in shuffled order.
    pub fn load<R>(config: &TrainConfig, debug_subset: bool, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let blacklist = match &config.blacklist {
            Some(path) => read_lines(path)?.into_iter().collect(),
            None => HashSet::new(),
        };

        for (key, path) in config.folders() {
            if !path.is_dir() {
                return Err(Error::MissingFolder {
                    key,
                    path: path.to_owned(),
                });
            }
        }

        let mut names: Vec<String> = read_lines(&config.vid_list)?
            .into_iter()
            .map(|line| video_basename(&line).to_owned())
            .filter(|name| video_is_valid(name, config, &blacklist))
            .collect();
        names.shuffle(rng);

        if debug_subset {
            names.truncate(DEBUG_VIDEO_LIMIT);
        }
        if names.is_empty() {
            return Err(Error::EmptyDataset);
        }

        info!("loading data...");
        let mut videos = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            let record = VideoRecord {
                vid: load_protocol(config.vid_dir.join(format!("{name}.vid")))?,
                boxes: load_protocol(config.box_dir.join(format!("{name}.box")))?,
                annot: load_protocol(config.annot_dir.join(format!("{name}.annot")))?,
            };
            videos.insert(name.clone(), record);

            if (idx + 1) % LOG_EVERY_SAMPLES == 0 {
                info!("{} samples processed.", idx + 1);
            }
        }
        if names.len() % LOG_EVERY_SAMPLES != 0 {
            info!("{} samples processed.", names.len());
        }

        Ok(Self { videos, names })
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, VideoRecord)>,
    {
        let mut names = vec![];
        let mut videos = HashMap::new();
        for (name, record) in records {
            if videos.insert(name.clone(), record).is_none() {
                names.push(name);
            }
        }
        Self { videos, names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&VideoRecord> {
        self.videos.get(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

fn video_basename(line: &str) -> &str {
    line.rsplit('/').next().unwrap_or(line)
}

fn video_is_valid(name: &str, config: &TrainConfig, blacklist: &HashSet<String>) -> bool {
    if blacklist.contains(name) {
        debug!("skip blacklisted video '{name}'");
        return false;
    }
    let complete = config.vid_dir.join(format!("{name}.vid")).is_file()
        && config.box_dir.join(format!("{name}.box")).is_file()
        && config.annot_dir.join(format!("{name}.annot")).is_file();
    if !complete {
        debug!("skip video '{name}' with missing protocol files");
    }
    complete
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_basename() {
        assert_eq!(video_basename("train/ILSVRC2015_train_00001000"), "ILSVRC2015_train_00001000");
        assert_eq!(video_basename("plain"), "plain");
    }
}
