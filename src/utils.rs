use burn::tensor::backend::Backend;
use burn::tensor::{Data, Int, Shape, Tensor};
use num_traits::ToPrimitive;

use crate::error::{DiffusionError, Result};

/// Gathers one coefficient per batch element from a 1-D `table` and reshapes the
/// result to `[B, 1, ..., 1]` so it broadcasts against a rank-`D` sample.
///
/// `table` and `timesteps` must already live on the same device.
pub fn extract<B: Backend, const D: usize>(
    table: Tensor<B, 1>,
    timesteps: Tensor<B, 1, Int>,
) -> Tensor<B, D> {
    let [batch_size] = timesteps.dims();
    let mut dims = [1; D];
    dims[0] = batch_size;

    table.select(0, timesteps).reshape(Shape::new(dims))
}

/// Replicates a scalar timestep across a batch.
pub fn full_timesteps<B: Backend>(
    batch_size: usize,
    timestep: usize,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let data = Data::new(vec![timestep as i64; batch_size], Shape::new([batch_size]));
    Tensor::from_data(data.convert::<B::IntElem>(), device)
}

/// Checks that `timesteps` holds exactly `batch_size` values, all in `[0, num_timesteps)`.
pub(crate) fn check_timesteps<B: Backend>(
    timesteps: &Tensor<B, 1, Int>,
    batch_size: usize,
    num_timesteps: usize,
) -> Result<()> {
    let [len] = timesteps.dims();
    if len != batch_size {
        return Err(DiffusionError::shape_mismatch(&[batch_size], &[len]));
    }

    let values: Vec<B::IntElem> = timesteps.clone().into_data().value;
    for value in values {
        let timestep = value.to_i64().unwrap_or(i64::MIN);
        if timestep < 0 || timestep >= num_timesteps as i64 {
            return Err(DiffusionError::InvalidTimestep {
                timestep,
                num_timesteps,
            });
        }
    }

    Ok(())
}

pub(crate) fn check_same_shape<B: Backend, const D: usize>(
    expected: &Tensor<B, D>,
    found: &Tensor<B, D>,
) -> Result<()> {
    let (expected, found) = (expected.dims(), found.dims());
    if expected != found {
        return Err(DiffusionError::shape_mismatch(&expected, &found));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn test_extract_broadcast_shape() {
        let device = Default::default();
        let table = Tensor::<TestBackend, 1>::from_floats([0.1, 0.2, 0.3, 0.4], &device);
        let timesteps = Tensor::<TestBackend, 1, Int>::from_ints([3, 0, 2], &device);

        let coeffs: Tensor<TestBackend, 4> = extract(table, timesteps);

        assert_eq!(coeffs.shape(), Shape::new([3, 1, 1, 1]));
        coeffs
            .to_data()
            .assert_approx_eq(&Data::from([[[[0.4]]], [[[0.1]]], [[[0.3]]]]), 5);
    }

    #[test]
    fn test_extract_broadcasts_over_trailing_dims() {
        let device = Default::default();
        let table = Tensor::<TestBackend, 1>::from_floats([2.0, 3.0], &device);
        let timesteps = Tensor::<TestBackend, 1, Int>::from_ints([1, 0], &device);
        let xs = Tensor::<TestBackend, 3>::ones([2, 2, 3], &device);

        let scaled = xs * extract::<TestBackend, 3>(table, timesteps);

        scaled.to_data().assert_approx_eq(
            &Data::from([
                [[3.0, 3.0, 3.0], [3.0, 3.0, 3.0]],
                [[2.0, 2.0, 2.0], [2.0, 2.0, 2.0]],
            ]),
            5,
        );
    }

    #[test]
    fn test_full_timesteps() {
        let device = Default::default();
        let timesteps = full_timesteps::<TestBackend>(4, 7, &device);

        assert_eq!(timesteps.dims(), [4]);
        let values: Vec<i64> = timesteps
            .into_data()
            .value
            .into_iter()
            .map(|v| v.to_i64().unwrap())
            .collect();
        assert_eq!(values, vec![7; 4]);
    }

    #[test]
    fn test_check_timesteps_rejects_out_of_range() {
        let device = Default::default();
        let timesteps = Tensor::<TestBackend, 1, Int>::from_ints([0, 10], &device);

        assert_eq!(
            check_timesteps(&timesteps, 2, 10),
            Err(DiffusionError::InvalidTimestep {
                timestep: 10,
                num_timesteps: 10
            })
        );

        let negative = Tensor::<TestBackend, 1, Int>::from_ints([-1], &device);
        assert!(matches!(
            check_timesteps(&negative, 1, 10),
            Err(DiffusionError::InvalidTimestep { timestep: -1, .. })
        ));
    }

    #[test]
    fn test_check_timesteps_rejects_wrong_batch() {
        let device = Default::default();
        let timesteps = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 2], &device);

        assert_eq!(
            check_timesteps(&timesteps, 2, 10),
            Err(DiffusionError::ShapeMismatch {
                expected: vec![2],
                found: vec![3]
            })
        );
    }
}
