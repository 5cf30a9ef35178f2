use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Int, Shape, Tensor};

use crate::error::{self, DiffusionError};
use crate::models::Decoder;
use crate::schedulers::noise::Posterior;
use crate::schedulers::schedule::{NoiseSchedule, ScheduleTensors};
use crate::schedulers::VarianceType;
use crate::utils::{check_same_shape, full_timesteps};

/// The configuration for the [`Ddpm`] model.
#[derive(Config, Debug)]
pub struct DdpmConfig {
    /// The value of beta at the first timestep.
    #[config(default = 1e-4)]
    pub beta_1: f64,
    /// The value of beta at the last timestep.
    #[config(default = 0.02)]
    pub beta_2: f64,
    /// Number of diffusion steps `T`.
    #[config(default = 1000)]
    pub num_timesteps: usize,
    /// Variance of the reverse process.
    #[config(default = "VarianceType::FixedLarge")]
    pub variance_type: VarianceType,
    /// Clamp the reconstructed `x_0` to `[-1, 1]` at every sampling step.
    #[config(default = true)]
    pub clip_denoised: bool,
}

impl DdpmConfig {
    /// Wraps `decoder` into a [`Ddpm`].
    ///
    /// # Errors
    /// Returns [`DiffusionError::Configuration`] when the beta range or the number
    /// of timesteps is invalid.
    pub fn init<B: Backend, M>(&self, decoder: M) -> error::Result<Ddpm<B, M>> {
        let schedule = NoiseSchedule::new(
            self.beta_1,
            self.beta_2,
            self.num_timesteps,
            self.variance_type,
        )?;

        Ok(Ddpm {
            decoder,
            schedule,
            clip_denoised: self.clip_denoised,
            tensors: Mutex::new(None),
        })
    }
}

/// Source of the Gaussian noise `z` injected at each reverse step.
pub trait NoiseSource<B: Backend, const D: usize> {
    fn sample(&mut self, shape: Shape<D>, device: &B::Device) -> Tensor<B, D>;
}

/// Draws `z ~ N(0, I)` from the backend RNG, see [`Backend::seed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNormal;

impl<B: Backend, const D: usize> NoiseSource<B, D> for StandardNormal {
    fn sample(&mut self, shape: Shape<D>, device: &B::Device) -> Tensor<B, D> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), device)
    }
}

impl<B, F, const D: usize> NoiseSource<B, D> for F
where
    B: Backend,
    F: FnMut(Shape<D>, &B::Device) -> Tensor<B, D>,
{
    fn sample(&mut self, shape: Shape<D>, device: &B::Device) -> Tensor<B, D> {
        self(shape, device)
    }
}

/// [Denoising diffusion probabilistic model][ddpm] wrapped around a noise-predicting
/// [`Decoder`].
///
/// The schedule constants are computed once on the host and uploaded lazily to
/// the device of the first tensor seen; they are uploaded again if a later call
/// uses another device.
///
/// [ddpm]: https://arxiv.org/abs/2006.11239
pub struct Ddpm<B: Backend, M> {
    decoder: M,
    schedule: NoiseSchedule,
    clip_denoised: bool,
    tensors: Mutex<Option<Arc<ScheduleTensors<B>>>>,
}

impl<B: Backend, M> Ddpm<B, M> {
    pub fn decoder(&self) -> &M {
        &self.decoder
    }

    pub fn into_decoder(self) -> M {
        self.decoder
    }

    /// Replaces the decoder, keeping the schedule and its uploaded tensors.
    ///
    /// `Ddpm` itself is not a Burn `Module`; after an optimizer step on the decoder
    /// put it back with `ddpm.map_decoder(|decoder| optim.step(lr, decoder, grads))`.
    pub fn map_decoder<M2>(self, f: impl FnOnce(M) -> M2) -> Ddpm<B, M2> {
        Ddpm {
            decoder: f(self.decoder),
            schedule: self.schedule,
            clip_denoised: self.clip_denoised,
            tensors: self.tensors,
        }
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    pub fn num_timesteps(&self) -> usize {
        self.schedule.num_timesteps()
    }

    /// The schedule tensors living on `device`, uploaded on first use.
    pub fn schedule_tensors(&self, device: &B::Device) -> Arc<ScheduleTensors<B>> {
        let mut cached = self.tensors.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tensors) = cached.as_ref() {
            if tensors.device() == device {
                return Arc::clone(tensors);
            }
        }

        log::debug!(
            "uploading {} step noise schedule to {:?}",
            self.num_timesteps(),
            device
        );
        let tensors = Arc::new(self.schedule.to_device(device));
        *cached = Some(Arc::clone(&tensors));
        tensors
    }

    /// Draws one training timestep per sample, uniformly in `[0, T)`.
    pub fn random_timesteps(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 1, Int> {
        let num_timesteps = self.num_timesteps();
        Tensor::<B, 1>::random(
            [batch_size],
            Distribution::Uniform(0.0, num_timesteps as f64),
            device,
        )
        .int()
        .clamp(0, num_timesteps as i64 - 1)
    }

    /// Training pass: noises `x_start` to `x_t` with `eps` and returns the decoder's
    /// prediction of `eps`. Comparing it with `eps` is left to the caller.
    ///
    /// Gradients flow into the decoder when `B` is an autodiff backend; see
    /// [`map_decoder`](Self::map_decoder) for swapping in the updated decoder.
    pub fn forward<const D: usize>(
        &self,
        x_start: Tensor<B, D>,
        eps: Tensor<B, D>,
        timesteps: Tensor<B, 1, Int>,
        conditioning: Option<Tensor<B, D>>,
    ) -> error::Result<Tensor<B, D>>
    where
        M: Decoder<B, D>,
    {
        let schedule = self.schedule_tensors(&x_start.device());
        let x_t = schedule.noisy(x_start, eps, timesteps.clone())?;

        let predicted = self.decoder.decode(x_t.clone(), timesteps, conditioning);
        check_same_shape(&x_t, &predicted)?;
        Ok(predicted)
    }

    /// Runs the decoder at `(x_t, timestep)` and returns the reverse-step posterior.
    pub fn posterior_mean_variance<const D: usize>(
        &self,
        x_t: Tensor<B, D>,
        timestep: usize,
        conditioning: Option<Tensor<B, D>>,
    ) -> error::Result<Posterior<B, D>>
    where
        M: Decoder<B, D>,
    {
        let schedule = self.schedule_tensors(&x_t.device());
        self.posterior(&schedule, x_t, timestep, conditioning)
    }

    /// Ancestral sampling from `x_t` down to `x_0`, drawing noise from the backend RNG.
    ///
    /// See [`sample_with_noise`](Self::sample_with_noise).
    pub fn sample<const D: usize>(
        &self,
        x_t: Tensor<B, D>,
        conditioning: Option<Tensor<B, D>>,
        n_steps: Option<usize>,
        checkpoints: &[usize],
    ) -> error::Result<BTreeMap<usize, Tensor<B, D>>>
    where
        M: Decoder<B, D>,
    {
        self.sample_with_noise(x_t, conditioning, n_steps, checkpoints, StandardNormal)
    }

    /// Ancestral sampling with an explicit noise source.
    ///
    /// Runs `t = n_steps - 1, ..., 0` (`n_steps` defaults to `T`), one decoder call
    /// per step. The state after the `k`-th step is returned under key `k` for every
    /// `k` in `checkpoints`; an empty `checkpoints` means `[n_steps]`, i.e. only the
    /// final sample. The last step adds no noise.
    ///
    /// # Errors
    /// - [`DiffusionError::InvalidStepCount`] unless `1 <= n_steps <= T`.
    /// - [`DiffusionError::InvalidCheckpoint`] unless every checkpoint is in `[1, n_steps]`.
    /// - [`DiffusionError::ShapeMismatch`] if the decoder or the noise source returns
    ///   a tensor shaped differently from `x_t`.
    pub fn sample_with_noise<const D: usize, N>(
        &self,
        x_t: Tensor<B, D>,
        conditioning: Option<Tensor<B, D>>,
        n_steps: Option<usize>,
        checkpoints: &[usize],
        mut noise: N,
    ) -> error::Result<BTreeMap<usize, Tensor<B, D>>>
    where
        M: Decoder<B, D>,
        N: NoiseSource<B, D>,
    {
        let num_timesteps = self.num_timesteps();
        let n_steps = n_steps.unwrap_or(num_timesteps);
        if n_steps == 0 || n_steps > num_timesteps {
            return Err(DiffusionError::InvalidStepCount {
                n_steps,
                num_timesteps,
            });
        }

        let checkpoints: BTreeSet<usize> = if checkpoints.is_empty() {
            BTreeSet::from([n_steps])
        } else {
            checkpoints.iter().copied().collect()
        };
        if let Some(&checkpoint) = checkpoints.iter().find(|&&c| c == 0 || c > n_steps) {
            return Err(DiffusionError::InvalidCheckpoint {
                checkpoint,
                n_steps,
            });
        }

        let device = x_t.device();
        let schedule = self.schedule_tensors(&device);

        let mut xs = x_t;
        let mut samples = BTreeMap::new();
        for (idx, t) in (0..n_steps).rev().enumerate() {
            let z = noise.sample(xs.shape(), &device);
            check_same_shape(&xs, &z)?;

            let posterior = self.posterior(&schedule, xs, t, conditioning.clone())?;
            xs = if t > 0 {
                posterior.mean + z * (posterior.log_variance * 0.5).exp()
            } else {
                posterior.mean
            };

            let step = idx + 1;
            log::trace!("denoising step {step}/{n_steps} (t = {t})");
            if checkpoints.contains(&step) {
                log::debug!("captured checkpoint at step {step}");
                samples.insert(step, xs.clone());
            }
        }

        Ok(samples)
    }

    fn posterior<const D: usize>(
        &self,
        schedule: &ScheduleTensors<B>,
        x_t: Tensor<B, D>,
        timestep: usize,
        conditioning: Option<Tensor<B, D>>,
    ) -> error::Result<Posterior<B, D>>
    where
        M: Decoder<B, D>,
    {
        let num_timesteps = self.num_timesteps();
        if timestep >= num_timesteps {
            return Err(DiffusionError::InvalidTimestep {
                timestep: timestep as i64,
                num_timesteps,
            });
        }

        let timesteps = full_timesteps::<B>(x_t.dims()[0], timestep, &x_t.device());
        let predicted = self
            .decoder
            .decode(x_t.clone(), timesteps.clone(), conditioning);
        check_same_shape(&x_t, &predicted)?;

        Ok(schedule.posterior(x_t, timesteps, predicted, self.clip_denoised))
    }
}
