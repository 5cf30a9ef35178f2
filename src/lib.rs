//! # Denoising diffusion probabilistic models
//!
//! The diffusion core of a [DDPM](https://arxiv.org/abs/2006.11239) on top of
//! [Burn](https://github.com/burn-rs/burn): the linear noise schedule, the
//! closed-form forward process and ancestral sampling of the reverse chain.
//! The noise-predicting network is supplied by the caller through [`Decoder`].
//!
//! ```ignore
//! let ddpm = DdpmConfig::new().init::<Backend, _>(unet)?;
//!
//! // Training: predict the noise that was added to `x`.
//! let timesteps = ddpm.random_timesteps(batch_size, &device);
//! let predicted = ddpm.forward(x, eps.clone(), timesteps, None)?;
//!
//! // Sampling: keep the state after steps 500 and 1000.
//! let samples = ddpm.sample(x_t, None, None, &[500, 1000])?;
//! ```

pub mod error;
pub mod models;
pub mod pipelines;
pub mod schedulers;
pub mod utils;

pub use error::{DiffusionError, Result};
pub use models::Decoder;
pub use pipelines::ddpm::{Ddpm, DdpmConfig, NoiseSource, StandardNormal};
pub use schedulers::noise::Posterior;
pub use schedulers::schedule::{NoiseSchedule, ScheduleTensors};
pub use schedulers::VarianceType;

#[cfg(all(test, feature = "torch"))]
use burn::backend::libtorch;

#[cfg(all(test, feature = "wgpu"))]
use burn::backend::wgpu;

#[cfg(all(test, not(any(feature = "torch", feature = "wgpu"))))]
pub type TestBackend = burn::backend::NdArray<f32>;

#[cfg(all(test, feature = "torch"))]
pub type TestBackend = libtorch::LibTorch<f32>;

#[cfg(all(test, feature = "wgpu", not(feature = "torch"), not(target_os = "macos")))]
pub type TestBackend = wgpu::Wgpu<wgpu::Vulkan, f32, i32>;

#[cfg(all(test, feature = "wgpu", not(feature = "torch"), target_os = "macos"))]
pub type TestBackend = wgpu::Wgpu<wgpu::Metal, f32, i32>;
