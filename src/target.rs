//! Conversion of tracked boxes into recurrent training targets.

mod assign;
mod batch;
mod expand;
mod pad;

pub use assign::{IouTargetAssigner, TargetAssigner};
pub use batch::{BatchAssembler, BatchTensors};
pub use expand::{collapse_bbox_target, expand_bbox_target, expand_bbox_weight};
pub use pad::pad_leading;
