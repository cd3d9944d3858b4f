//! The training loop: video scheduling, the solver seam and the driver.

mod cursor;
mod driver;
mod solver;

pub use cursor::VideoCursor;
pub use driver::{DriverOptions, StepSummary, TrainingDriver};
pub use solver::{DryRunSolver, RecurrentSolver, SolverState};
