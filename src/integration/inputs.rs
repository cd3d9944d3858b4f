use burn::prelude::*;
use burn::tensor::TensorData;

use crate::target::BatchTensors;

/// The five named solver inputs as backend tensors, time-major.
#[derive(Debug, Clone)]
pub struct RecurrentInputs<B: Backend> {
    /// `[T, N, C]`
    pub data: Tensor<B, 3>,
    /// `[T, N]`
    pub cont: Tensor<B, 2>,
    /// `[T, N]`, `-1` marks ignored steps.
    pub labels: Tensor<B, 2, Int>,
    /// `[T, N, K * 4]`
    pub bbox_targets: Tensor<B, 3>,
    /// `[T, N, K * 4]`
    pub bbox_weights: Tensor<B, 3>,
}

impl<B: Backend> RecurrentInputs<B> {
    pub fn from_batch(batch: &BatchTensors, device: &B::Device) -> Self {
        Self {
            data: float3(&batch.data, device),
            cont: float2(&batch.cont, device),
            labels: Tensor::from_data(
                TensorData::new(
                    batch.labels.iter().copied().collect::<Vec<i32>>(),
                    batch.labels.shape().to_vec(),
                ),
                device,
            ),
            bbox_targets: float3(&batch.bbox_targets, device),
            bbox_weights: float3(&batch.bbox_weights, device),
        }
    }
}

// `iter()` walks in logical order, so non-standard layouts copy correctly.
fn float2<B: Backend>(array: &ndarray::Array2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(array.iter().copied().collect::<Vec<f32>>(), array.shape().to_vec());
    Tensor::from_data(data, device)
}

fn float3<B: Backend>(array: &ndarray::Array3<f32>, device: &B::Device) -> Tensor<B, 3> {
    let data = TensorData::new(array.iter().copied().collect::<Vec<f32>>(), array.shape().to_vec());
    Tensor::from_data(data, device)
}
