//! Recurrent net + optimizer interface and a backend-free stand-in.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::SolverParameter;
use crate::dataset::load_protocol;
use crate::error::{Error, Result};
use crate::target::BatchTensors;

/// Trait for the trainable recurrent net and its optimizer.
///
/// Implement this trait to connect any learning framework. The solver owns
/// its iteration counter so a restored snapshot resumes where it stopped.
pub trait RecurrentSolver {
    /// Number of optimizer steps taken so far.
    fn iter(&self) -> usize;

    /// Reshape the named inputs (`data`, `cont`, `labels`, `bbox_targets`,
    /// `bbox_weights`) and copy the batch into them.
    fn set_inputs(&mut self, batch: &BatchTensors) -> Result<()>;

    /// Run `steps` forward/backward/update passes on the current inputs.
    fn step(&mut self, steps: usize) -> Result<()>;

    /// Restore weights and optimizer history, including the iteration counter.
    fn restore(&mut self, snapshot: &Path) -> Result<()>;

    /// Initialize weights from a trained model, keeping the iteration counter.
    fn copy_weights(&mut self, weights: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverState {
    pub iter: usize,
}

/// Solver that validates the input contract and counts steps without
/// updating any weights.
#[derive(Debug)]
pub struct DryRunSolver {
    param: SolverParameter,
    iter: usize,
    inputs: Option<BatchTensors>,
    num_classes: Option<usize>,
}

impl DryRunSolver {
    pub fn new(param: SolverParameter) -> Self {
        Self {
            param,
            iter: 0,
            inputs: None,
            num_classes: None,
        }
    }

    /// Require `bbox_targets` / `bbox_weights` to carry `num_classes * 4` slots.
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = Some(num_classes);
        self
    }

    pub fn inputs(&self) -> Option<&BatchTensors> {
        self.inputs.as_ref()
    }

    fn snapshot_path(&self) -> Option<PathBuf> {
        let prefix = self.param.snapshot_prefix.as_ref()?;
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!("_iter_{}.solverstate.json", self.iter));
        Some(PathBuf::from(name))
    }

    fn snapshot(&self) -> Result<()> {
        let Some(path) = self.snapshot_path() else {
            warn!("snapshot requested but snapshot_prefix is not set");
            return Ok(());
        };
        let text = serde_json::to_string(&SolverState { iter: self.iter }).map_err(|source| {
            Error::Json {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, text).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        info!("snapshotting solver state to {}", path.display());
        Ok(())
    }
}

impl RecurrentSolver for DryRunSolver {
    fn iter(&self) -> usize {
        self.iter
    }

    fn set_inputs(&mut self, batch: &BatchTensors) -> Result<()> {
        let (time, tracks) = batch.labels.dim();
        let leading_ok = batch.data.shape()[..2] == [time, tracks]
            && batch.cont.dim() == (time, tracks)
            && batch.bbox_targets.shape()[..2] == [time, tracks]
            && batch.bbox_weights.dim() == batch.bbox_targets.dim();
        if !leading_ok {
            return Err(Error::Solver(format!(
                "inconsistent input shapes: {:?}",
                batch.shapes()
            )));
        }
        if let Some(num_classes) = self.num_classes {
            let slots = batch.bbox_targets.shape()[2];
            if slots != num_classes * 4 {
                return Err(Error::Solver(format!(
                    "bbox_targets carry {slots} slots, net expects {}",
                    num_classes * 4
                )));
            }
        }
        self.inputs = Some(batch.clone());
        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        if self.inputs.is_none() {
            return Err(Error::Solver("step called before inputs were set".into()));
        }
        for _ in 0..steps {
            self.iter += 1;
            if let Some(every) = self.param.snapshot.filter(|&every| every > 0) {
                if self.iter % every == 0 {
                    self.snapshot()?;
                }
            }
        }
        Ok(())
    }

    fn restore(&mut self, snapshot: &Path) -> Result<()> {
        let SolverState { iter } = load_protocol(snapshot)?;
        info!("restoring history from {} at iteration {iter}", snapshot.display());
        self.iter = iter;
        Ok(())
    }

    fn copy_weights(&mut self, weights: &Path) -> Result<()> {
        if !weights.is_file() {
            return Err(Error::Io {
                path: weights.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "weights file not found"),
            });
        }
        info!("dry run solver ignores weights from {}", weights.display());
        Ok(())
    }
}
