//! Bounding-box regression normalization statistics.
//!
//! The same [`BBoxNormalizationStats`] value must be handed to the feature
//! net when folding its regression layer and to batch assembly when
//! normalizing targets; otherwise targets and predictions disagree in scale.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, s};
use serde::Deserialize;

use crate::dataset::load_protocol;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatsFile {
    Flat(Vec<f32>),
    Rows(Vec<[f32; 4]>),
}

impl StatsFile {
    fn into_array(self) -> Result<Array2<f32>> {
        match self {
            StatsFile::Flat(values) => {
                if values.len() % 4 != 0 {
                    return Err(Error::Stats(format!(
                        "{} values is not a multiple of 4",
                        values.len()
                    )));
                }
                let rows = values.len() / 4;
                Array2::from_shape_vec((rows, 4), values)
                    .map_err(|err| Error::Stats(err.to_string()))
            }
            StatsFile::Rows(rows) => {
                let num = rows.len();
                let flat: Vec<f32> = rows.into_iter().flatten().collect();
                Array2::from_shape_vec((num, 4), flat).map_err(|err| Error::Stats(err.to_string()))
            }
        }
    }
}

/// Per-class means and standard deviations of regression deltas, (K, 4) each.
#[derive(Debug, Clone, PartialEq)]
pub struct BBoxNormalizationStats {
    means: Array2<f32>,
    stds: Array2<f32>,
}

impl BBoxNormalizationStats {
    pub fn new(means: Array2<f32>, stds: Array2<f32>) -> Result<Self> {
        if means.dim() != stds.dim() {
            return Err(Error::Stats(format!(
                "means of shape {:?} and stds of shape {:?} differ",
                means.dim(),
                stds.dim()
            )));
        }
        if means.ncols() != 4 || means.nrows() == 0 {
            return Err(Error::Stats(format!(
                "expected (num_classes, 4), got {:?}",
                means.dim()
            )));
        }
        if means.iter().any(|mean| !mean.is_finite()) {
            return Err(Error::Stats("means must be finite".into()));
        }
        // the background row never normalizes a target and is often all zero
        let background = stds.row(0);
        if background.iter().any(|&std| !std.is_finite() || std < 0.0) {
            return Err(Error::Stats(
                "background stds must be finite and non-negative".into(),
            ));
        }
        let foreground = stds.slice(s![1.., ..]);
        if foreground.iter().any(|&std| !std.is_finite() || std <= 0.0) {
            return Err(Error::Stats(
                "foreground stds must be finite and positive".into(),
            ));
        }
        Ok(Self { means, stds })
    }

    /// Identity normalization: zero means and unit stds.
    pub fn identity(num_classes: usize) -> Result<Self> {
        Self::new(
            Array2::zeros((num_classes, 4)),
            Array2::ones((num_classes, 4)),
        )
    }

    /// Load means and stds from JSON arrays of `K * 4` values or `K` rows of 4.
    pub fn open<P, Q>(mean_path: P, std_path: Q) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let means = load_protocol::<StatsFile, _>(mean_path)?.into_array()?;
        let stds = load_protocol::<StatsFile, _>(std_path)?.into_array()?;
        Self::new(means, stds)
    }

    pub fn num_classes(&self) -> usize {
        self.means.nrows()
    }

    pub fn means(&self) -> &Array2<f32> {
        &self.means
    }

    pub fn stds(&self) -> &Array2<f32> {
        &self.stds
    }

    pub fn class_mean(&self, class: usize) -> ArrayView1<'_, f32> {
        self.means.row(class)
    }

    pub fn class_std(&self, class: usize) -> ArrayView1<'_, f32> {
        self.stds.row(class)
    }

    /// Means laid out like a class-expanded regression vector.
    pub fn flat_means(&self) -> Array1<f32> {
        self.means.iter().copied().collect()
    }

    /// Stds laid out like a class-expanded regression vector.
    pub fn flat_stds(&self) -> Array1<f32> {
        self.stds.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_stats_file_layouts() {
        let flat: StatsFile = serde_json::from_str("[0, 0, 0, 0, 0.1, 0.1, 0.2, 0.2]").unwrap();
        let rows: StatsFile = serde_json::from_str("[[0, 0, 0, 0], [0.1, 0.1, 0.2, 0.2]]").unwrap();
        assert_eq!(flat.into_array().unwrap(), rows.into_array().unwrap());
    }

    #[test]
    fn test_stats_rejects_bad_shapes() {
        let odd: StatsFile = serde_json::from_str("[1, 2, 3]").unwrap();
        assert!(odd.into_array().is_err());

        let means = Array2::zeros((2, 4));
        let stds = Array2::ones((3, 4));
        assert!(BBoxNormalizationStats::new(means, stds).is_err());
    }

    #[test]
    fn test_stats_rejects_zero_foreground_std() {
        let means = Array2::zeros((2, 4));
        let stds = array![[1.0, 1.0, 1.0, 1.0], [0.1, 0.1, 0.0, 0.2]];
        assert!(matches!(
            BBoxNormalizationStats::new(means, stds),
            Err(Error::Stats(_))
        ));
    }

    #[test]
    fn test_stats_accept_zero_background_std() {
        // stats computed over foreground classes only leave row 0 at zero
        let means = array![[0.0, 0.0, 0.0, 0.0], [0.01, 0.02, 0.0, 0.0]];
        let stds = array![[0.0, 0.0, 0.0, 0.0], [0.1, 0.1, 0.2, 0.2]];
        let stats = BBoxNormalizationStats::new(means, stds).unwrap();
        assert_eq!(stats.num_classes(), 2);
        assert_eq!(stats.class_std(0).to_vec(), vec![0.0; 4]);

        let negative = array![[-1.0, 0.0, 0.0, 0.0], [0.1, 0.1, 0.2, 0.2]];
        assert!(BBoxNormalizationStats::new(Array2::zeros((2, 4)), negative).is_err());
    }

    #[test]
    fn test_identity_needs_a_class() {
        assert!(matches!(
            BBoxNormalizationStats::identity(0),
            Err(Error::Stats(_))
        ));
        let stats = BBoxNormalizationStats::identity(3).unwrap();
        assert_eq!(stats.stds(), &Array2::<f32>::ones((3, 4)));
    }

    #[test]
    fn test_flat_layout_is_class_major() {
        let means = array![[0.0, 0.0, 0.0, 0.0], [1.0, 2.0, 3.0, 4.0]];
        let stats = BBoxNormalizationStats::new(means, Array2::ones((2, 4))).unwrap();
        assert_eq!(stats.num_classes(), 2);
        assert_eq!(
            stats.flat_means().to_vec(),
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(stats.class_mean(1).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
