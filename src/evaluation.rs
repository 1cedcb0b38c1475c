//! End-to-end evaluation of a sampler against the known moments of its target.

use std::fmt;

use ndarray::{Array1, Array2, Array3, ArrayView3};
use ndarray_stats::QuantileExt;
use num_traits::Float;
use rand_distr::{Distribution, StandardNormal};

use crate::distributions::{EnergyModel, Prior};
use crate::error::{McmcError, Result};
use crate::logging;
use crate::metropolis_hastings::RandomWalkSampler;
use crate::stats;

/// Everything [`obtain_statistics`] measures, in `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    /// Name of the energy model.
    pub name: String,
    /// Pooled mean of the observable over all chains and steps.
    pub mean: Array1<f64>,
    /// Pooled population standard deviation of the observable.
    pub std: Array1<f64>,
    /// Share of consecutive observable values that changed.
    pub acceptance_rate: f64,
    /// Share of proposals the sampler actually accepted.
    pub true_acceptance_rate: f64,
    /// Effective sample size per observable dimension, after burn-in.
    pub ess: Array1<f64>,
    /// Draws per chain the ESS refers to.
    pub n_kept: usize,
    /// Gelman-Rubin R-hat per observable dimension, after burn-in.
    pub r_hat: Array1<f64>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: ", self.name)?;
        writeln!(f, " mean {}", self.mean)?;
        writeln!(f, " std {}", self.std)?;
        write!(
            f,
            " acceptance rate: {} (recorded: {})",
            self.acceptance_rate, self.true_acceptance_rate
        )
    }
}

/// Runs the model's `statistics` transform over `x` (`[chain, time, dim]`), returning the
/// observable both pooled (`[chain * time, k]`) and per chain (`[chain, time, k]`).
fn observe<T, E>(model: &E, x: ArrayView3<T>) -> Result<(Array2<f64>, Array3<f64>)>
where
    T: Float,
    E: EnergyModel<T>,
{
    let (c, t, d) = x.dim();
    let flat = x
        .to_shape((c * t, d))
        .map_err(|_| McmcError::shape("trajectory pooling", &[c * t, d], x.shape()))?;
    let pooled = model.statistics(flat.view());
    if pooled.nrows() != c * t {
        return Err(McmcError::shape(
            "statistics output",
            &[c * t, pooled.ncols()],
            pooled.shape(),
        ));
    }
    let k = pooled.ncols();
    let by_chain = pooled
        .to_shape((c, t, k))
        .map_err(|_| McmcError::shape("statistics output", &[c, t, k], pooled.shape()))?
        .into_owned();
    Ok((pooled, by_chain))
}

/**
Samples `steps + burn_in` iterations of `batch_size` chains and measures them.

Mean, standard deviation and acceptance rate use the whole run; ESS and R-hat use the
draws after `burn_in`. ESS is normalized by the model's reference variance and R-hat is
centred on its reference mean. The report is logged through the sampler's logger under
the model's name and returned.

Fails with [`McmcError::InvalidArgument`] if `steps` or `batch_size` is zero, if
`burn_in >= steps`, or if there are fewer than two chains for R-hat.
*/
pub fn obtain_statistics<T, E, P>(
    sampler: &RandomWalkSampler<T, E, P>,
    steps: usize,
    burn_in: usize,
    batch_size: usize,
) -> Result<Diagnostics>
where
    T: Float + Send + Sync,
    E: EnergyModel<T>,
    P: Prior<T>,
    StandardNormal: Distribution<T>,
    rand_distr::Standard: Distribution<T>,
{
    if steps == 0 || batch_size == 0 {
        return Err(McmcError::InvalidArgument(format!(
            "steps and batch size must be positive, got steps={steps} batch_size={batch_size}"
        )));
    }
    if burn_in >= steps {
        return Err(McmcError::InvalidArgument(format!(
            "burn-in ({burn_in}) must be shorter than steps ({steps})"
        )));
    }

    let trajectory = sampler.sample(steps + burn_in, batch_size)?;
    let energy_fn = &sampler.energy_fn;
    let logger: &dyn log::Log = sampler.logger().as_ref();

    let (_, kept) = observe(energy_fn, trajectory.burn_in(burn_in))?;
    let (pooled, full) = observe(energy_fn, trajectory.states())?;

    let (mean, std) = stats::pooled_moments(pooled.view())?;
    let acceptance_rate = stats::acceptance_rate(full.view())?;

    let reference_mean = energy_fn.mean();
    let reference_var = energy_fn.std().mapv(|s| s * s);
    let ess = stats::effective_sample_size(kept.view(), reference_mean.view(), reference_var.view())?;
    let r_hat = stats::gelman_rubin(kept.view(), Some(reference_mean.view()))?;

    let diagnostics = Diagnostics {
        name: energy_fn.name().to_string(),
        mean,
        std,
        acceptance_rate,
        true_acceptance_rate: trajectory.acceptance_rate(),
        ess,
        n_kept: steps,
        r_hat,
    };

    logging::info(logger, format_args!("{diagnostics}"));
    logging::info(
        logger,
        format_args!(
            "ESS: max [{}] min [{}] / [{}]",
            diagnostics.ess.max_skipnan(),
            diagnostics.ess.min_skipnan(),
            steps
        ),
    );
    logging::info(
        logger,
        format_args!(
            "R: max [{}] min [{}]",
            diagnostics.r_hat.max_skipnan(),
            diagnostics.r_hat.min_skipnan()
        ),
    );
    Ok(diagnostics)
}
