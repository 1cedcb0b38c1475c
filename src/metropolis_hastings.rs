/*!
# Random-Walk Metropolis–Hastings Sampler

This module implements a batched Metropolis–Hastings sampler whose proposal is an
isotropic Gaussian perturbation of the current state. All chains advance in lockstep:
each step proposes `z' = z + N(0, std^2 I)` for every chain at once, evaluates the
energies of the whole batch, and accepts per chain iff `ln(U) < E(z) - E(z')`.

## Overview

- **Energy model (`E`)**: evaluates one energy per chain via the [`EnergyModel`] trait.
- **Prior (`P`)**: draws the initial batch via the [`Prior`] trait, afresh on every call.
- **Reproducibility**: every call starts a `SmallRng` from the sampler's seed, so two calls
  with the same arguments return the same [`Trajectory`]. All random draws happen on one
  thread, so the result does not depend on the thread count either.
- **Parallelism**: the per-chain select runs as a rayon parallel `Zip`, inside a dedicated
  pool when [`SamplerConfig::n_threads`] is set.

Non-finite energies are not special-cased. A `NaN` comparison is false, so a proposal with
`NaN` energy is always rejected, while a chain whose current energy is `+inf` accepts any
proposal with finite energy.

## Example Usage

```rust
use normal_mcmc::distributions::{GaussianPrior, IsotropicGaussian};
use normal_mcmc::metropolis_hastings::{RandomWalkSampler, SamplerConfig};
use ndarray::arr1;

let target = IsotropicGaussian::<f64>::standard(2);
let prior = GaussianPrior::new(arr1(&[0.0, 0.0]), 2.0);
let sampler = RandomWalkSampler::new(target, prior, SamplerConfig::default())
    .unwrap()
    .set_seed(42);

let trajectory = sampler.sample(100, 4).unwrap();
assert_eq!(trajectory.states().dim(), (4, 100, 2));
```
*/

use std::collections::VecDeque;

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Zip};
use num_traits::Float;
use rand::prelude::*;
use rand_distr::{Normal, StandardNormal};

use crate::core::Trajectory;
use crate::dev_tools::Timer;
use crate::distributions::{EnergyModel, Prior};
use crate::error::{McmcError, Result};
use crate::logging::{self, SharedLogger};
use crate::stats::RhatMulti;

/// Tuning knobs for [`RandomWalkSampler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Standard deviation of the Gaussian proposal, shared by all chains and dimensions.
    pub std: f64,
    /// Size of a dedicated rayon pool; `None` uses the global pool.
    pub n_threads: Option<usize>,
    /// Seed for every call; `None` draws one when the sampler is built.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            std: 1.0,
            n_threads: None,
            seed: None,
        }
    }
}

impl SamplerConfig {
    pub fn with_std(mut self, std: f64) -> Self {
        self.std = std;
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/**
Batched random-walk Metropolis–Hastings over an energy model.

# Type Parameters
- `T`: the floating-point type of the chain states (`f32` or `f64`).
- `E`: the energy model. Must implement [`EnergyModel`].
- `P`: the prior for initial states. Must implement [`Prior`].
*/
pub struct RandomWalkSampler<T, E, P> {
    /// The target, seen only through its energy.
    pub energy_fn: E,
    /// Source of the initial batch.
    pub prior: P,
    /// Proposal standard deviation.
    pub std: T,
    /// Seed used to start the RNG on every call.
    pub seed: u64,
    pool: Option<rayon::ThreadPool>,
    logger: SharedLogger,
}

impl<T, E, P> RandomWalkSampler<T, E, P>
where
    T: Float + Send + Sync,
    E: EnergyModel<T>,
    P: Prior<T>,
    StandardNormal: Distribution<T>,
    rand_distr::Standard: Distribution<T>,
{
    /**
    Builds a sampler, validating the configuration.

    Fails with [`McmcError::InvalidArgument`] if `std` is not a positive finite number or
    the thread count is zero.
    */
    pub fn new(energy_fn: E, prior: P, config: SamplerConfig) -> Result<Self> {
        if !(config.std.is_finite() && config.std > 0.0) {
            return Err(McmcError::InvalidArgument(format!(
                "proposal std must be positive and finite, got {}",
                config.std
            )));
        }
        let std = T::from(config.std).ok_or_else(|| {
            McmcError::InvalidArgument(format!("proposal std {} not representable", config.std))
        })?;
        let pool = match config.n_threads {
            Some(0) => {
                return Err(McmcError::InvalidArgument(
                    "thread count must be positive".into(),
                ))
            }
            Some(n) => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };
        let seed = config.seed.unwrap_or_else(|| thread_rng().gen::<u64>());

        Ok(Self {
            energy_fn,
            prior,
            std,
            seed,
            pool,
            logger: logging::default_logger(),
        })
    }

    /// Replaces the seed used by subsequent calls.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Routes the timing report (and the statistics report) to `logger`.
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /**
    Runs `batch_size` chains for `steps` steps each, starting from a fresh prior draw.

    Returns the states shaped `[chain, time, dim]` together with the per-step acceptance
    decisions. Fails if either argument is zero, if the prior or the energy model return
    arrays of the wrong shape, or if the energy model fails; no partial result is kept.
    */
    pub fn sample(&self, steps: usize, batch_size: usize) -> Result<Trajectory<T>> {
        self.run(steps, batch_size, |_, _| Ok(()))
    }

    /**
    Same as [`RandomWalkSampler::sample`], and displays a progress bar with the acceptance
    rate over a sliding window of 100 steps and the running maximum R-hat across chains.
    */
    pub fn sample_progress(&self, steps: usize, batch_size: usize) -> Result<Trajectory<T>> {
        let pb = ProgressBar::new(steps as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_prefix("RWMH");

        let window_size = 100;
        let mut accept_window: VecDeque<f64> = VecDeque::with_capacity(window_size);
        let mut psr = RhatMulti::new(batch_size, self.energy_fn.dim());

        let trajectory = self.run(steps, batch_size, |z, accepted| {
            let iter_accept_rate =
                accepted.iter().filter(|&&a| a).count() as f64 / accepted.len() as f64;
            accept_window.push_front(iter_accept_rate);
            if accept_window.len() > window_size {
                accept_window.pop_back();
            }
            psr.step(z)?;
            let maxrhat = psr
                .max()
                .map(|r| format!("{r:.2}"))
                .unwrap_or_else(|_| "-".into());

            let avg_accept_rate = accept_window.iter().sum::<f64>() / accept_window.len() as f64;
            pb.inc(1);
            pb.set_message(format!(
                "p(accept)≈{:.2} max(rhat)≈{}",
                avg_accept_rate, maxrhat
            ));
            Ok(())
        });
        pb.finish_with_message("Done!");
        trajectory
    }

    fn run<F>(&self, steps: usize, batch_size: usize, mut on_step: F) -> Result<Trajectory<T>>
    where
        F: FnMut(ArrayView2<T>, ArrayView1<bool>) -> Result<()>,
    {
        if steps == 0 {
            return Err(McmcError::InvalidArgument("steps must be positive".into()));
        }
        if batch_size == 0 {
            return Err(McmcError::InvalidArgument(
                "batch size must be positive".into(),
            ));
        }
        let timer = Timer::new();
        let dim = self.energy_fn.dim();
        let mut rng = SmallRng::seed_from_u64(self.seed);

        let mut z = self.prior.sample(batch_size, &mut rng);
        if z.dim() != (batch_size, dim) {
            return Err(McmcError::shape("prior sample", &[batch_size, dim], z.shape()));
        }
        let mut energy = self.evaluate(z.view())?;

        let normal = Normal::new(T::zero(), self.std)
            .map_err(|e| McmcError::InvalidArgument(e.to_string()))?;
        let mut states = Array3::<T>::zeros((batch_size, steps, dim));
        let mut accepted = Array2::from_elem((batch_size, steps), false);

        for t in 0..steps {
            let noise = Array2::from_shape_fn((batch_size, dim), |_| normal.sample(&mut rng));
            let proposal = &z + &noise;
            let proposal_energy = self.evaluate(proposal.view())?;

            let accept: Array1<bool> =
                Zip::from(&energy)
                    .and(&proposal_energy)
                    .map_collect(|&current, &proposed| {
                        let u: T = rng.gen();
                        u.ln() < current - proposed
                    });

            self.install(|| {
                Zip::from(z.rows_mut())
                    .and(proposal.rows())
                    .and(&accept)
                    .par_for_each(|mut row, new_row, &ok| {
                        if ok {
                            row.assign(&new_row);
                        }
                    });
                Zip::from(&mut energy)
                    .and(&proposal_energy)
                    .and(&accept)
                    .par_for_each(|e, &new_e, &ok| {
                        if ok {
                            *e = new_e;
                        }
                    });
            });

            states.slice_mut(s![.., t, ..]).assign(&z);
            accepted.column_mut(t).assign(&accept);
            on_step(z.view(), accept.view())?;
        }

        let elapsed = timer.elapsed();
        logging::info(
            self.logger.as_ref(),
            format_args!(
                "batches [{}] steps [{}] time [{:5.4}] steps/s [{:5.4}]",
                batch_size,
                steps,
                elapsed.as_secs_f64(),
                Timer::throughput(steps * batch_size, elapsed)
            ),
        );
        Ok(Trajectory::new(states, accepted))
    }

    fn evaluate(&self, z: ArrayView2<T>) -> Result<Array1<T>> {
        let n = z.nrows();
        let energy = self.energy_fn.energy(z)?;
        if energy.len() != n {
            return Err(McmcError::shape("energy output", &[n], energy.shape()));
        }
        Ok(energy)
    }

    fn install<OP: FnOnce() + Send>(&self, op: OP) {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
