//! Estimates the moments of a 2D standard normal with random-walk Metropolis-Hastings
//! and prints the diagnostics. Set `RUST_LOG` to control the log output.

use env_logger::Env;
use ndarray::arr1;
use normal_mcmc::distributions::{GaussianPrior, IsotropicGaussian};
use normal_mcmc::evaluation::obtain_statistics;
use normal_mcmc::metropolis_hastings::{RandomWalkSampler, SamplerConfig};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    const STEPS: usize = 1_000;
    const BURNIN: usize = 200;
    const N_CHAINS: usize = 32;
    const SEED: u64 = 42;

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let target = IsotropicGaussian::<f64>::standard(2);
    let prior = GaussianPrior::new(arr1(&[0.0, 0.0]), 2.0);
    let sampler = RandomWalkSampler::new(
        target,
        prior,
        SamplerConfig::default().with_std(1.0).with_seed(SEED),
    )?;

    let diagnostics = obtain_statistics(&sampler, STEPS, BURNIN, N_CHAINS)?;
    println!("{diagnostics}");
    println!("ESS: {} / {}", diagnostics.ess, diagnostics.n_kept);
    println!("R-hat: {}", diagnostics.r_hat);
    Ok(())
}
