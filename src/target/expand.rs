//! Per-class expansion of box regression targets and weights.
//!
//! A class-expanded vector has `num_classes * 4` slots; class `k` owns slots
//! `[4k, 4k + 4)`. Only foreground labels place anything in it.

use ndarray::{Array1, s};

use crate::error::{Error, Result};
use crate::stats::BBoxNormalizationStats;

fn foreground_class(class_label: i32, num_classes: usize) -> Result<Option<usize>> {
    match class_label {
        -1 | 0 => Ok(None),
        label if label > 0 && (label as usize) < num_classes => Ok(Some(label as usize)),
        label => Err(Error::ClassOutOfRange { label, num_classes }),
    }
}

fn check_shape(values: &[f32]) -> Result<()> {
    if values.len() != 4 {
        return Err(Error::TargetShape(values.len()));
    }
    Ok(())
}

/// Place `(delta - mean[k]) / std[k]` into the slots of class `k`.
///
/// Background (0) and ignore (-1) labels give an all-zero vector.
pub fn expand_bbox_target(
    delta: &[f32],
    class_label: i32,
    stats: &BBoxNormalizationStats,
) -> Result<Array1<f32>> {
    check_shape(delta)?;
    let num_classes = stats.num_classes();
    let mut expanded = Array1::zeros(num_classes * 4);
    if let Some(k) = foreground_class(class_label, num_classes)? {
        let mean = stats.class_mean(k);
        let std = stats.class_std(k);
        let mut slot = expanded.slice_mut(s![4 * k..4 * k + 4]);
        for i in 0..4 {
            slot[i] = (delta[i] - mean[i]) / std[i];
        }
    }
    Ok(expanded)
}

/// Place the raw `weight` into the slots of class `k`, zero elsewhere.
pub fn expand_bbox_weight(
    weight: &[f32],
    class_label: i32,
    num_classes: usize,
) -> Result<Array1<f32>> {
    check_shape(weight)?;
    let mut expanded = Array1::zeros(num_classes * 4);
    if let Some(k) = foreground_class(class_label, num_classes)? {
        expanded
            .slice_mut(s![4 * k..4 * k + 4])
            .assign(&Array1::from(weight.to_vec()));
    }
    Ok(expanded)
}

/// Recover the raw delta from a class-expanded, normalized target row.
///
/// Returns `None` for non-foreground labels.
pub fn collapse_bbox_target(
    expanded: &[f32],
    class_label: i32,
    stats: &BBoxNormalizationStats,
) -> Result<Option<[f32; 4]>> {
    let num_classes = stats.num_classes();
    if expanded.len() != num_classes * 4 {
        return Err(Error::TargetShape(expanded.len()));
    }
    let Some(k) = foreground_class(class_label, num_classes)? else {
        return Ok(None);
    };
    let mean = stats.class_mean(k);
    let std = stats.class_std(k);
    let mut delta = [0.0; 4];
    for (i, value) in delta.iter_mut().enumerate() {
        *value = expanded[4 * k + i] * std[i] + mean[i];
    }
    Ok(Some(delta))
}
