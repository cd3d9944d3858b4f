//! Integration module for training the recurrent net with a Burn backend.
//!
//! [`BurnSolver`] implements [`RecurrentSolver`](crate::training::RecurrentSolver)
//! for any model that implements [`BurnRecurrentModel`].

mod burn_backend;
mod inputs;

pub use burn_backend::{BurnRecurrentModel, BurnSolver};
pub use inputs::RecurrentInputs;
