//! Padding of the leading (time) axis to a fixed track length.

use ndarray::{Array, Axis, Dimension, Slice};

use crate::error::{Error, Result};

/// Pad the first axis of `array` to `target_length`, filling the new rows
/// with `fill`. An array already at `target_length` is returned as is.
pub fn pad_leading<A, D>(array: Array<A, D>, target_length: usize, fill: A) -> Result<Array<A, D>>
where
    A: Clone,
    D: Dimension,
{
    let len = array.len_of(Axis(0));
    if len == target_length {
        return Ok(array);
    }
    if len > target_length {
        return Err(Error::SequenceTooLong {
            len,
            track_length: target_length,
        });
    }

    let mut shape = array.raw_dim();
    shape[0] = target_length;
    let mut padded = Array::from_elem(shape, fill);
    padded
        .slice_axis_mut(Axis(0), Slice::from(0..len))
        .assign(&array);
    Ok(padded)
}
