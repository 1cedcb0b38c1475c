//! Random-walk Metropolis–Hastings over energy-based targets, with the diagnostics used
//! to check a sampler against known moments: pooled mean and standard deviation,
//! acceptance rate, effective sample size and Gelman-Rubin R-hat.
//!
//! ```rust
//! use normal_mcmc::distributions::{GaussianPrior, IsotropicGaussian};
//! use normal_mcmc::evaluation::obtain_statistics;
//! use normal_mcmc::metropolis_hastings::{RandomWalkSampler, SamplerConfig};
//! use ndarray::arr1;
//!
//! let sampler = RandomWalkSampler::new(
//!     IsotropicGaussian::<f64>::standard(2),
//!     GaussianPrior::new(arr1(&[0.0, 0.0]), 2.0),
//!     SamplerConfig::default().with_seed(1),
//! )
//! .unwrap();
//! let diagnostics = obtain_statistics(&sampler, 200, 50, 4).unwrap();
//! assert_eq!(diagnostics.r_hat.len(), 2);
//! ```

pub mod core;
mod dev_tools;
pub mod distributions;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod metropolis_hastings;
pub mod stats;

pub use crate::error::{McmcError, Result};
