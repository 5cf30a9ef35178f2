//! # Models
//!
//! The contract a noise-prediction network must satisfy to be driven by the
//! diffusion loop. No architecture is provided here; any Burn module (a UNet,
//! a super-resolution UNet taking a low-resolution image, ...) plugs in by
//! implementing [`Decoder`].

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// A learned residual-noise predictor `eps_theta(x_t, t, cond)`.
pub trait Decoder<B: Backend, const D: usize> {
    /// Predicts the noise in `x_t`.
    ///
    /// # Shapes
    ///
    /// - xs: `[batch, ...]`
    /// - timesteps: `[batch]`, identical values while sampling, per-sample values
    ///   while training
    /// - conditioning: optional auxiliary sample such as a low-resolution image,
    ///   forwarded untouched
    /// - output: same shape as `xs`
    fn decode(
        &self,
        xs: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        conditioning: Option<Tensor<B, D>>,
    ) -> Tensor<B, D>;
}

impl<B, F, const D: usize> Decoder<B, D> for F
where
    B: Backend,
    F: Fn(Tensor<B, D>, Tensor<B, 1, Int>, Option<Tensor<B, D>>) -> Tensor<B, D>,
{
    fn decode(
        &self,
        xs: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        conditioning: Option<Tensor<B, D>>,
    ) -> Tensor<B, D> {
        self(xs, timesteps, conditioning)
    }
}
