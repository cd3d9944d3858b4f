//! Feature / box-regression network interface used by track propagation.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::dataset::{VideoProtocol, load_protocol};
use crate::error::{Error, Result};
use crate::stats::BBoxNormalizationStats;
use crate::tracker::rect::Rect;

/// Output of one feature net forward pass over `n` ROIs.
#[derive(Debug, Clone)]
pub struct FeatureNetOutput {
    /// (n, feature_dim)
    pub features: Array2<f32>,
    /// (n, num_classes) class scores, when the net predicts them
    pub scores: Option<Array2<f32>>,
    /// (n, num_classes * 4) class-specific regression deltas
    pub bbox_deltas: Array2<f32>,
}

/// Trait for the detection / feature network driving track propagation.
///
/// Implement this trait to connect any region-based detector.
pub trait FeatureNet {
    /// Run the network on `rois` of `frame` in `vid`.
    fn forward(&mut self, vid: &VideoProtocol, frame: i32, rois: &[Rect])
    -> Result<FeatureNetOutput>;

    /// Fold target normalization into the regression output layer so that
    /// predicted deltas come out un-normalized.
    fn fold_bbox_normalization(&mut self, stats: &BBoxNormalizationStats) -> Result<()>;
}

/// Linear class-specific box regression layer: `y = x W^T + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBoxPredLayer {
    /// (num_classes * 4, input_dim)
    pub weight: Array2<f32>,
    /// (num_classes * 4)
    pub bias: Array1<f32>,
}

impl BBoxPredLayer {
    pub fn num_outputs(&self) -> usize {
        self.weight.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        input.dot(&self.weight.t()) + &self.bias
    }

    /// Scale every output row by its std and shift the bias by the mean:
    /// `W <- W * std`, `b <- b * std + mean`.
    pub fn fold_normalization(&mut self, stats: &BBoxNormalizationStats) -> Result<()> {
        let stds = stats.flat_stds();
        let means = stats.flat_means();
        if stds.len() != self.num_outputs() || self.bias.len() != self.num_outputs() {
            return Err(Error::Stats(format!(
                "stats cover {} outputs, bbox_pred layer has {}",
                stds.len(),
                self.num_outputs()
            )));
        }
        self.weight *= &stds.view().insert_axis(Axis(1));
        self.bias = &self.bias * &stds + &means;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeometryNetDef {
    num_classes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeometryNetParams {
    bbox_pred: BBoxPredLayer,
}

/// A feature net whose features are the ROI geometry and whose regression
/// head is a single linear layer. Used when no image backbone is wired in.
#[derive(Debug, Clone)]
pub struct GeometryFeatureNet {
    bbox_pred: BBoxPredLayer,
}

impl GeometryFeatureNet {
    /// x1, y1, x2, y2, width, height, center x, center y
    pub const FEATURE_DIM: usize = 8;

    pub fn new(bbox_pred: BBoxPredLayer) -> Result<Self> {
        if bbox_pred.input_dim() != Self::FEATURE_DIM {
            return Err(Error::FeatureNet(format!(
                "bbox_pred expects {} inputs, geometry features have {}",
                bbox_pred.input_dim(),
                Self::FEATURE_DIM
            )));
        }
        if bbox_pred.num_outputs() % 4 != 0 || bbox_pred.bias.len() != bbox_pred.num_outputs() {
            return Err(Error::FeatureNet(format!(
                "bbox_pred has {} outputs and {} biases",
                bbox_pred.num_outputs(),
                bbox_pred.bias.len()
            )));
        }
        Ok(Self { bbox_pred })
    }

    /// Load the net from a YAML definition and JSON parameters.
    pub fn open<P, Q>(def_path: P, param_path: Q) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let def_path = def_path.as_ref();
        let text = std::fs::read_to_string(def_path).map_err(|source| Error::Io {
            path: def_path.to_owned(),
            source,
        })?;
        let def: GeometryNetDef = serde_yaml::from_str(&text).map_err(|source| Error::Yaml {
            path: def_path.to_owned(),
            source,
        })?;
        let GeometryNetParams { bbox_pred } = load_protocol(param_path)?;
        if bbox_pred.num_outputs() != def.num_classes * 4 {
            return Err(Error::FeatureNet(format!(
                "definition declares {} classes, bbox_pred has {} outputs",
                def.num_classes,
                bbox_pred.num_outputs()
            )));
        }
        Self::new(bbox_pred)
    }

    pub fn num_classes(&self) -> usize {
        self.bbox_pred.num_outputs() / 4
    }

    pub fn bbox_pred(&self) -> &BBoxPredLayer {
        &self.bbox_pred
    }

    fn geometry(rois: &[Rect], frame_size: Option<(f32, f32)>) -> Array2<f32> {
        let (scale_x, scale_y) = frame_size.unwrap_or((1.0, 1.0));
        let mut features = Array2::zeros((rois.len(), Self::FEATURE_DIM));
        for (mut row, roi) in features.outer_iter_mut().zip(rois) {
            let (cx, cy) = roi.center();
            let values = [
                roi.x1 / scale_x,
                roi.y1 / scale_y,
                roi.x2 / scale_x,
                roi.y2 / scale_y,
                roi.width() / scale_x,
                roi.height() / scale_y,
                cx / scale_x,
                cy / scale_y,
            ];
            for (dst, value) in row.iter_mut().zip(values) {
                *dst = value;
            }
        }
        features
    }
}

impl FeatureNet for GeometryFeatureNet {
    fn forward(
        &mut self,
        vid: &VideoProtocol,
        _frame: i32,
        rois: &[Rect],
    ) -> Result<FeatureNetOutput> {
        let features = Self::geometry(rois, vid.frame_size());
        let bbox_deltas = self.bbox_pred.forward(features.view());
        Ok(FeatureNetOutput {
            features,
            scores: None,
            bbox_deltas,
        })
    }

    fn fold_bbox_normalization(&mut self, stats: &BBoxNormalizationStats) -> Result<()> {
        self.bbox_pred.fold_normalization(stats)
    }
}
