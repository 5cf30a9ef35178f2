use thiserror::Error;

/// Errors raised by the diffusion core.
///
/// Every variant is a caller contract violation; nothing here is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffusionError {
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("timestep {timestep} is outside [0, {num_timesteps})")]
    InvalidTimestep { timestep: i64, num_timesteps: usize },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("n_steps must be in [1, {num_timesteps}], got {n_steps}")]
    InvalidStepCount { n_steps: usize, num_timesteps: usize },

    #[error("checkpoint {checkpoint} is outside [1, {n_steps}]")]
    InvalidCheckpoint { checkpoint: usize, n_steps: usize },
}

impl DiffusionError {
    pub(crate) fn shape_mismatch(expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

pub type Result<T> = core::result::Result<T, DiffusionError>;
