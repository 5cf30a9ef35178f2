use burn::tensor::backend::Backend;
use burn::tensor::{Data, Shape, Tensor};

use super::VarianceType;
use crate::error::{DiffusionError, Result};

/// The precomputed constants of a linear-beta DDPM, computed on the host in `f64`.
///
/// Every sequence has exactly `num_timesteps` entries. Once built the schedule is
/// immutable; use [`NoiseSchedule::to_device`] to get tensors for a given device.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    variance_type: VarianceType,
    betas: Vec<f64>,
    alphas: Vec<f64>,
    alpha_bar: Vec<f64>,
    alpha_bar_shifted: Vec<f64>,
    sqrt_alpha_bar: Vec<f64>,
    sqrt_one_minus_alpha_bar: Vec<f64>,
    sqrt_recip_alpha_bar: Vec<f64>,
    sqrt_recip_m1_alpha_bar: Vec<f64>,
    posterior_variance: Vec<f64>,
    posterior_log_variance_clipped: Vec<f64>,
    posterior_coeff_1: Vec<f64>,
    posterior_coeff_2: Vec<f64>,
    p_variance: Vec<f64>,
    p_log_variance: Vec<f64>,
}

impl NoiseSchedule {
    /// Builds the schedule for `betas = linspace(beta_1, beta_2, num_timesteps)`.
    ///
    /// # Errors
    /// Returns [`DiffusionError::Configuration`] unless `0 < beta_1 < beta_2 < 1`
    /// and `num_timesteps >= 1`, or when `alpha_bar` underflows so that some
    /// constant is not finite.
    pub fn new(
        beta_1: f64,
        beta_2: f64,
        num_timesteps: usize,
        variance_type: VarianceType,
    ) -> Result<Self> {
        if num_timesteps == 0 {
            return Err(DiffusionError::Configuration(
                "num_timesteps must be at least 1".into(),
            ));
        }
        if !beta_1.is_finite() || !beta_2.is_finite() {
            return Err(DiffusionError::Configuration(format!(
                "beta_1 ({beta_1}) and beta_2 ({beta_2}) must be finite"
            )));
        }
        if !(0.0 < beta_1 && beta_1 < beta_2 && beta_2 < 1.0) {
            return Err(DiffusionError::Configuration(format!(
                "expected 0 < beta_1 < beta_2 < 1, got beta_1 = {beta_1}, beta_2 = {beta_2}"
            )));
        }

        let betas = linspace(beta_1, beta_2, num_timesteps);
        let alphas: Vec<f64> = betas.iter().map(|beta| 1.0 - beta).collect();

        let alpha_bar: Vec<f64> = alphas
            .iter()
            .scan(1.0, |prod, alpha| {
                *prod *= alpha;
                Some(*prod)
            })
            .collect();
        let alpha_bar_last = alpha_bar[num_timesteps - 1];
        if !(alpha_bar_last > 0.0) {
            return Err(DiffusionError::Configuration(format!(
                "alpha_bar underflows to {alpha_bar_last} after {num_timesteps} steps of \
                 beta in [{beta_1}, {beta_2}]"
            )));
        }

        let mut alpha_bar_shifted = Vec::with_capacity(num_timesteps);
        alpha_bar_shifted.push(1.0);
        alpha_bar_shifted.extend_from_slice(&alpha_bar[..num_timesteps - 1]);

        let sqrt_alpha_bar = alpha_bar.iter().map(|a| a.sqrt()).collect();
        let sqrt_one_minus_alpha_bar = alpha_bar.iter().map(|a| (1.0 - a).sqrt()).collect();
        let sqrt_recip_alpha_bar = alpha_bar.iter().map(|a| (1.0 / a).sqrt()).collect();
        let sqrt_recip_m1_alpha_bar = alpha_bar.iter().map(|a| (1.0 / a - 1.0).sqrt()).collect();

        // Variance of q(x_{t-1} | x_t, x_0).
        let posterior_variance: Vec<f64> = (0..num_timesteps)
            .map(|i| betas[i] * (1.0 - alpha_bar_shifted[i]) / (1.0 - alpha_bar[i]))
            .collect();

        // posterior_variance[0] is 0 since the chain starts there, so the log is
        // clipped by reusing index 1.
        let log_with_head = |head: f64, values: &[f64]| -> Vec<f64> {
            core::iter::once(head)
                .chain(values.iter().skip(1).copied())
                .map(f64::ln)
                .collect()
        };
        let head = posterior_variance.get(1).copied().unwrap_or(betas[0]);
        let posterior_log_variance_clipped = log_with_head(head, &posterior_variance);

        let (p_variance, p_log_variance) = match variance_type {
            VarianceType::FixedLarge => (betas.clone(), log_with_head(head, &betas)),
            VarianceType::FixedSmall => (
                posterior_variance.clone(),
                posterior_log_variance_clipped.clone(),
            ),
        };

        // Mean coefficients of q(x_{t-1} | x_t, x_0).
        let posterior_coeff_1 = (0..num_timesteps)
            .map(|i| betas[i] * alpha_bar_shifted[i].sqrt() / (1.0 - alpha_bar[i]))
            .collect();
        let posterior_coeff_2 = (0..num_timesteps)
            .map(|i| alphas[i].sqrt() * (1.0 - alpha_bar_shifted[i]) / (1.0 - alpha_bar[i]))
            .collect();

        let schedule = Self {
            variance_type,
            betas,
            alphas,
            alpha_bar,
            alpha_bar_shifted,
            sqrt_alpha_bar,
            sqrt_one_minus_alpha_bar,
            sqrt_recip_alpha_bar,
            sqrt_recip_m1_alpha_bar,
            posterior_variance,
            posterior_log_variance_clipped,
            posterior_coeff_1,
            posterior_coeff_2,
            p_variance,
            p_log_variance,
        };
        if let Some(name) = schedule.first_non_finite() {
            return Err(DiffusionError::Configuration(format!(
                "`{name}` is not finite for beta in [{beta_1}, {beta_2}] over {num_timesteps} steps"
            )));
        }

        Ok(schedule)
    }

    fn first_non_finite(&self) -> Option<&'static str> {
        let sequences: [(&'static str, &[f64]); 12] = [
            ("alpha_bar", &self.alpha_bar),
            ("sqrt_alpha_bar", &self.sqrt_alpha_bar),
            ("sqrt_one_minus_alpha_bar", &self.sqrt_one_minus_alpha_bar),
            ("sqrt_recip_alpha_bar", &self.sqrt_recip_alpha_bar),
            ("sqrt_recip_m1_alpha_bar", &self.sqrt_recip_m1_alpha_bar),
            ("posterior_variance", &self.posterior_variance),
            ("posterior_log_variance_clipped", &self.posterior_log_variance_clipped),
            ("posterior_coeff_1", &self.posterior_coeff_1),
            ("posterior_coeff_2", &self.posterior_coeff_2),
            ("p_variance", &self.p_variance),
            ("p_log_variance", &self.p_log_variance),
            ("alpha_bar_shifted", &self.alpha_bar_shifted),
        ];
        sequences
            .into_iter()
            .find(|(_, values)| values.iter().any(|v| !v.is_finite()))
            .map(|(name, _)| name)
    }

    /// Uploads the constants used by the forward and reverse processes to `device`.
    pub fn to_device<B: Backend>(&self, device: &B::Device) -> ScheduleTensors<B> {
        ScheduleTensors {
            device: device.clone(),
            num_timesteps: self.num_timesteps(),
            sqrt_alpha_bar: upload(&self.sqrt_alpha_bar, device),
            sqrt_one_minus_alpha_bar: upload(&self.sqrt_one_minus_alpha_bar, device),
            sqrt_recip_alpha_bar: upload(&self.sqrt_recip_alpha_bar, device),
            sqrt_recip_m1_alpha_bar: upload(&self.sqrt_recip_m1_alpha_bar, device),
            posterior_coeff_1: upload(&self.posterior_coeff_1, device),
            posterior_coeff_2: upload(&self.posterior_coeff_2, device),
            p_variance: upload(&self.p_variance, device),
            p_log_variance: upload(&self.p_log_variance, device),
        }
    }

    pub fn num_timesteps(&self) -> usize {
        self.betas.len()
    }

    pub fn variance_type(&self) -> VarianceType {
        self.variance_type
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Cumulative product of `alphas`.
    pub fn alpha_bar(&self) -> &[f64] {
        &self.alpha_bar
    }

    /// `alpha_bar` shifted right by one step, starting at `1.0`.
    pub fn alpha_bar_shifted(&self) -> &[f64] {
        &self.alpha_bar_shifted
    }

    pub fn sqrt_alpha_bar(&self) -> &[f64] {
        &self.sqrt_alpha_bar
    }

    pub fn sqrt_one_minus_alpha_bar(&self) -> &[f64] {
        &self.sqrt_one_minus_alpha_bar
    }

    pub fn sqrt_recip_alpha_bar(&self) -> &[f64] {
        &self.sqrt_recip_alpha_bar
    }

    pub fn sqrt_recip_m1_alpha_bar(&self) -> &[f64] {
        &self.sqrt_recip_m1_alpha_bar
    }

    pub fn posterior_variance(&self) -> &[f64] {
        &self.posterior_variance
    }

    pub fn posterior_log_variance_clipped(&self) -> &[f64] {
        &self.posterior_log_variance_clipped
    }

    pub fn posterior_coeff_1(&self) -> &[f64] {
        &self.posterior_coeff_1
    }

    pub fn posterior_coeff_2(&self) -> &[f64] {
        &self.posterior_coeff_2
    }

    /// Reverse-process variance selected by the [`VarianceType`].
    pub fn p_variance(&self) -> &[f64] {
        &self.p_variance
    }

    /// Log of the reverse-process variance, with index 0 clipped.
    pub fn p_log_variance(&self) -> &[f64] {
        &self.p_log_variance
    }
}

/// The device-resident subset of a [`NoiseSchedule`].
#[derive(Debug, Clone)]
pub struct ScheduleTensors<B: Backend> {
    device: B::Device,
    num_timesteps: usize,
    pub(crate) sqrt_alpha_bar: Tensor<B, 1>,
    pub(crate) sqrt_one_minus_alpha_bar: Tensor<B, 1>,
    pub(crate) sqrt_recip_alpha_bar: Tensor<B, 1>,
    pub(crate) sqrt_recip_m1_alpha_bar: Tensor<B, 1>,
    pub(crate) posterior_coeff_1: Tensor<B, 1>,
    pub(crate) posterior_coeff_2: Tensor<B, 1>,
    pub(crate) p_variance: Tensor<B, 1>,
    pub(crate) p_log_variance: Tensor<B, 1>,
}

impl<B: Backend> ScheduleTensors<B> {
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn num_timesteps(&self) -> usize {
        self.num_timesteps
    }
}

/// `num_steps` values evenly spaced over `[start, end]`, both ends included.
fn linspace(start: f64, end: f64, num_steps: usize) -> Vec<f64> {
    if num_steps == 1 {
        return vec![start];
    }
    let step_size = (end - start) / (num_steps - 1) as f64;
    (0..num_steps)
        .map(|i| start + i as f64 * step_size)
        .collect()
}

fn upload<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 1> {
    let data = Data::new(values.to_vec(), Shape::new([values.len()]));
    Tensor::from_data(data.convert::<B::FloatElem>(), device)
}
