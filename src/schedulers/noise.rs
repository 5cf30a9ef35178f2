//! Closed-form forward noising and the reverse-step posterior.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::schedule::ScheduleTensors;
use crate::error::Result;
use crate::utils::{check_same_shape, check_timesteps, extract};

/// Parameters of the Gaussian `q(x_{t-1} | x_t, x_0)` used as one reverse step.
#[derive(Debug, Clone)]
pub struct Posterior<B: Backend, const D: usize> {
    /// The reconstruction `x_0` the mean was computed from, clipped if requested.
    pub x_start: Tensor<B, D>,
    pub mean: Tensor<B, D>,
    /// Broadcastable as `[batch, 1, ..., 1]`.
    pub variance: Tensor<B, D>,
    /// Broadcastable as `[batch, 1, ..., 1]`.
    pub log_variance: Tensor<B, D>,
}

impl<B: Backend> ScheduleTensors<B> {
    /// Samples `x_t ~ q(x_t | x_0)` given the noise `eps`:
    /// `x_t = sqrt(alpha_bar_t) * x_0 + sqrt(1 - alpha_bar_t) * eps`.
    ///
    /// `timesteps` holds one timestep per sample.
    pub fn noisy<const D: usize>(
        &self,
        x_start: Tensor<B, D>,
        eps: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
    ) -> Result<Tensor<B, D>> {
        check_same_shape(&x_start, &eps)?;
        check_timesteps(&timesteps, x_start.dims()[0], self.num_timesteps())?;

        let sqrt_alpha_bar = extract::<B, D>(self.sqrt_alpha_bar.clone(), timesteps.clone());
        let sqrt_one_minus_alpha_bar =
            extract::<B, D>(self.sqrt_one_minus_alpha_bar.clone(), timesteps);

        Ok(x_start * sqrt_alpha_bar + eps * sqrt_one_minus_alpha_bar)
    }

    /// Inverts [`noisy`](Self::noisy) for a known (or predicted) `eps`.
    pub fn predict_start_from_eps<const D: usize>(
        &self,
        x_t: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        eps: Tensor<B, D>,
    ) -> Result<Tensor<B, D>> {
        check_same_shape(&x_t, &eps)?;
        check_timesteps(&timesteps, x_t.dims()[0], self.num_timesteps())?;

        Ok(self.start_from_eps(x_t, timesteps, eps))
    }

    /// Computes the reverse-step posterior at `x_t` from the predicted noise.
    ///
    /// With `clip_denoised` the reconstruction is clamped to `[-1, 1]` before it
    /// enters the mean.
    pub fn posterior_mean_variance<const D: usize>(
        &self,
        x_t: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        predicted_eps: Tensor<B, D>,
        clip_denoised: bool,
    ) -> Result<Posterior<B, D>> {
        check_same_shape(&x_t, &predicted_eps)?;
        check_timesteps(&timesteps, x_t.dims()[0], self.num_timesteps())?;

        Ok(self.posterior(x_t, timesteps, predicted_eps, clip_denoised))
    }

    /// [`posterior_mean_variance`](Self::posterior_mean_variance) for inputs the
    /// caller has already validated.
    pub(crate) fn posterior<const D: usize>(
        &self,
        x_t: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        predicted_eps: Tensor<B, D>,
        clip_denoised: bool,
    ) -> Posterior<B, D> {
        let x_start = self.start_from_eps(x_t.clone(), timesteps.clone(), predicted_eps);
        let x_start = if clip_denoised {
            x_start.clamp(-1.0, 1.0)
        } else {
            x_start
        };

        let coeff_1 = extract::<B, D>(self.posterior_coeff_1.clone(), timesteps.clone());
        let coeff_2 = extract::<B, D>(self.posterior_coeff_2.clone(), timesteps.clone());
        let mean = x_start.clone() * coeff_1 + x_t * coeff_2;

        Posterior {
            x_start,
            mean,
            variance: extract(self.p_variance.clone(), timesteps.clone()),
            log_variance: extract(self.p_log_variance.clone(), timesteps),
        }
    }

    fn start_from_eps<const D: usize>(
        &self,
        x_t: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        eps: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let recip = extract::<B, D>(self.sqrt_recip_alpha_bar.clone(), timesteps.clone());
        let recip_m1 = extract::<B, D>(self.sqrt_recip_m1_alpha_bar.clone(), timesteps);

        x_t * recip - eps * recip_m1
    }
}
