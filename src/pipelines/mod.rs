//! # Pipelines
//!
//! Models that drive a [`Decoder`](crate::models::Decoder) through the diffusion
//! process, for training and for sampling.

pub mod ddpm;
