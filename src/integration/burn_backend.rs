//! Burn training backend for the recurrent net.
//!
//! This module provides a `BurnSolver` that implements `RecurrentSolver`
//! for recurrent models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use burn::backend::{Autodiff, NdArray};
//! use burn::optim::AdamConfig;
//! use tpn_train::integration::{BurnRecurrentModel, BurnSolver, RecurrentInputs};
//!
//! // Implement BurnRecurrentModel for your recurrent net
//! impl BurnRecurrentModel<Autodiff<NdArray>> for MyLstm<Autodiff<NdArray>> {
//!     fn loss(&self, inputs: RecurrentInputs<Autodiff<NdArray>>) -> Tensor<Autodiff<NdArray>, 1> {
//!         // Unroll over time, mask with `cont`, sum the class and box losses
//!     }
//! }
//!
//! let model = MyLstm::new(&device);
//! let solver = BurnSolver::new(model, AdamConfig::new().init(), device, param);
//! ```

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use log::info;

use super::RecurrentInputs;
use crate::config::SolverParameter;
use crate::dataset::load_protocol;
use crate::error::{Error, Result};
use crate::target::BatchTensors;
use crate::training::{RecurrentSolver, SolverState};

const DEFAULT_LR: f64 = 1e-3;
const STATE_SUFFIX: &str = ".solverstate.json";

fn state_path_for(stem: &Path) -> PathBuf {
    let mut name = stem.as_os_str().to_owned();
    name.push(STATE_SUFFIX);
    PathBuf::from(name)
}

/// Trait for Burn-based recurrent models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnRecurrentModel<B: AutodiffBackend>: AutodiffModule<B> {
    /// Unroll the net over the inputs and return the scalar training loss.
    fn loss(&self, inputs: RecurrentInputs<B>) -> Tensor<B, 1>;
}

/// Burn-based solver implementing `RecurrentSolver`.
pub struct BurnSolver<B, M, O>
where
    B: AutodiffBackend,
    M: BurnRecurrentModel<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optim: O,
    device: B::Device,
    param: SolverParameter,
    inputs: Option<RecurrentInputs<B>>,
    iter: usize,
    _backend: PhantomData<B>,
}

impl<B, M, O> BurnSolver<B, M, O>
where
    B: AutodiffBackend,
    M: BurnRecurrentModel<B>,
    O: Optimizer<M, B>,
{
    pub fn new(model: M, optim: O, device: B::Device, param: SolverParameter) -> Self {
        Self {
            model,
            optim,
            device,
            param,
            inputs: None,
            iter: 0,
            _backend: PhantomData,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    fn learning_rate(&self) -> f64 {
        self.param.base_lr.unwrap_or(DEFAULT_LR)
    }

    fn snapshot_stem(&self) -> Option<PathBuf> {
        let prefix = self.param.snapshot_prefix.as_ref()?;
        let mut name = prefix.as_os_str().to_owned();
        name.push(format!("_iter_{}", self.iter));
        Some(PathBuf::from(name))
    }

    fn snapshot(&self) -> Result<()> {
        let Some(stem) = self.snapshot_stem() else {
            return Ok(());
        };
        self.model
            .clone()
            .save_file(stem.clone(), &CompactRecorder::new())
            .map_err(|err| Error::Solver(err.to_string()))?;

        let state_path = state_path_for(&stem);
        let text = serde_json::to_string(&SolverState { iter: self.iter }).map_err(|source| {
            Error::Json {
                path: state_path.clone(),
                source,
            }
        })?;
        std::fs::write(&state_path, text).map_err(|source| Error::Io {
            path: state_path.clone(),
            source,
        })?;
        info!("snapshotting to {}", stem.display());
        Ok(())
    }

    fn load_weights(&mut self, weights: &Path) -> Result<()> {
        let model = self
            .model
            .clone()
            .load_file(weights.to_owned(), &CompactRecorder::new(), &self.device)
            .map_err(|err| Error::Solver(err.to_string()))?;
        self.model = model;
        Ok(())
    }
}

impl<B, M, O> RecurrentSolver for BurnSolver<B, M, O>
where
    B: AutodiffBackend,
    M: BurnRecurrentModel<B>,
    O: Optimizer<M, B>,
{
    fn iter(&self) -> usize {
        self.iter
    }

    fn set_inputs(&mut self, batch: &BatchTensors) -> Result<()> {
        self.inputs = Some(RecurrentInputs::from_batch(batch, &self.device));
        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        let inputs = self
            .inputs
            .clone()
            .ok_or_else(|| Error::Solver("step called before inputs were set".into()))?;
        let lr = self.learning_rate();
        for _ in 0..steps {
            let loss = self.model.loss(inputs.clone());
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optim.step(lr, self.model.clone(), grads);
            self.iter += 1;
            if let Some(every) = self.param.snapshot.filter(|&every| every > 0) {
                if self.iter % every == 0 {
                    self.snapshot()?;
                }
            }
        }
        Ok(())
    }

    /// Expects `<stem>.solverstate.json` next to the model record `<stem>`.
    fn restore(&mut self, snapshot: &Path) -> Result<()> {
        let stem = snapshot
            .to_str()
            .and_then(|path| path.strip_suffix(STATE_SUFFIX))
            .map(PathBuf::from)
            .ok_or_else(|| {
                Error::Solver(format!(
                    "snapshot {} does not end in {STATE_SUFFIX}",
                    snapshot.display()
                ))
            })?;
        let SolverState { iter } = load_protocol(snapshot)?;
        self.load_weights(&stem)?;
        info!("restored {} at iteration {iter}", stem.display());
        self.iter = iter;
        Ok(())
    }

    fn copy_weights(&mut self, weights: &Path) -> Result<()> {
        self.load_weights(weights)?;
        info!("copied weights from {}", weights.display());
        Ok(())
    }
}
