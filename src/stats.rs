//! Convergence and efficiency diagnostics for batched chains.
//!
//! The batch functions take observables in `f64`, shaped `[chain, time, dim]`.
//! [`RhatMulti`] is the streaming counterpart used while a run is in progress.

use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_stats::QuantileExt;
use num_traits::Float;

use crate::distributions::to_f64;
use crate::error::{McmcError, Result};

/// Autocorrelations at or below this value end the ESS summation.
pub const AUTOCORRELATION_CUTOFF: f64 = 0.05;

/// Running potential scale reduction factor over `n_chains` chains, updated one
/// batch of states at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct RhatMulti {
    n: usize,
    mean: Array2<f64>,    // n_chains x n_params
    mean_sq: Array2<f64>, // n_chains x n_params
    n_chains: usize,
    n_params: usize,
}

impl RhatMulti {
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        let mean_sq = Array2::<f64>::zeros((n_chains, n_params));
        Self {
            n: 0,
            mean: Array2::<f64>::zeros((n_chains, n_params)),
            mean_sq,
            n_chains,
            n_params,
        }
    }

    /// Folds in one state per chain, `x` shaped `[n_chains, n_params]`.
    pub fn step<T: Float>(&mut self, x: ArrayView2<T>) -> Result<()> {
        if x.dim() != (self.n_chains, self.n_params) {
            return Err(McmcError::shape(
                "rhat tracker step",
                &[self.n_chains, self.n_params],
                x.shape(),
            ));
        }
        self.n += 1;

        let n = self.n as f64;
        let x_arr = x.mapv(to_f64);

        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        if self.n == 1 {
            self.mean_sq = x_arr.mapv(|v| v * v);
        } else {
            self.mean_sq = (&self.mean_sq * (n - 1.0) + x_arr.mapv(|v| v * v)) / n;
        };
        Ok(())
    }

    /// R-hat per parameter over the draws seen so far, the same estimator as
    /// [`gelman_rubin`] with the chains centred on their own grand mean.
    pub fn all(&self) -> Result<Array1<f64>> {
        if self.n < 2 || self.n_chains < 2 {
            return Err(McmcError::InvalidArgument(format!(
                "rhat needs two chains and two draws, have {} chains and {} draws",
                self.n_chains, self.n
            )));
        }
        let mean_chain = self
            .mean
            .mean_axis(Axis(0))
            .ok_or_else(|| McmcError::InvalidArgument("no chains to reduce".into()))?;
        let sigma = (&self.mean_sq - &self.mean.mapv(|v| v * v)).mapv(|v| v.max(0.0));
        potential_scale_reduction(self.mean.view(), sigma.view(), mean_chain.view(), self.n)
    }

    pub fn max(&self) -> Result<f64> {
        Ok(*self.all()?.max_skipnan())
    }
}

fn check_width(context: &'static str, x: &ArrayView3<f64>, v: &ArrayView1<f64>) -> Result<()> {
    if v.len() != x.shape()[2] {
        return Err(McmcError::shape(context, &[x.shape()[2]], v.shape()));
    }
    Ok(())
}

/// Mean and population standard deviation of pooled samples `[n, dim]`.
pub fn pooled_moments(x: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    let mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| McmcError::InvalidArgument("no samples to pool".into()))?;
    Ok((mean, x.std_axis(Axis(0), 0.0)))
}

/// Fraction of consecutive draws within a chain whose value changed in any coordinate.
///
/// This infers acceptance from the observable, so a non-injective `statistics`
/// transform under-reports it. [`crate::core::Trajectory::acceptance_rate`] reads the
/// recorded decisions instead.
pub fn acceptance_rate(x: ArrayView3<f64>) -> Result<f64> {
    let (m, n, _) = x.dim();
    if m == 0 || n < 2 {
        return Err(McmcError::InvalidArgument(format!(
            "acceptance rate needs at least one chain of two draws, got {m} x {n}"
        )));
    }
    let moved: usize = x
        .outer_iter()
        .map(|chain| (1..n).filter(|&t| chain.row(t) != chain.row(t - 1)).count())
        .sum();
    Ok(moved as f64 / (m * (n - 1)) as f64)
}

/// Lag-`lag` autocorrelation per dimension, centred on the known mean `mu` and
/// normalized by the known variance `var`, averaged over chains.
pub fn autocorrelation(
    x: ArrayView3<f64>,
    lag: usize,
    mu: ArrayView1<f64>,
    var: ArrayView1<f64>,
) -> Result<Array1<f64>> {
    check_width("autocorrelation mean", &x, &mu)?;
    check_width("autocorrelation variance", &x, &var)?;
    let (m, n, d) = x.dim();
    if m == 0 || lag >= n {
        return Err(McmcError::InvalidArgument(format!(
            "lag {lag} out of range for {m} chains of {n} draws"
        )));
    }
    let mut acc = Array1::<f64>::zeros(d);
    for chain in x.outer_iter() {
        let y = &chain - &mu;
        let prod = &y.slice(s![..n - lag, ..]) * &y.slice(s![lag.., ..]);
        let cov = prod
            .mean_axis(Axis(0))
            .ok_or_else(|| McmcError::InvalidArgument("empty lag window".into()))?;
        acc += &(cov / &var);
    }
    Ok(acc / m as f64)
}

/**
Effective sample size per dimension for `x` shaped `[chain, time, dim]`.

Uses the known mean and variance of the target rather than estimates from the chains.
The integrated autocorrelation time starts at 1 and, lag by lag, gains
`2 rho_s (1 - s / N)` in every dimension whose autocorrelation exceeds
[`AUTOCORRELATION_CUTOFF`]; summation stops at the first lag where no dimension does.
The result `N / tau` therefore lies in `(0, N]`.

# Examples

```rust
use normal_mcmc::stats::effective_sample_size;
use ndarray::{arr1, Array3};

// Alternating +1/-1 has negative autocorrelation at lag 1: nothing is added.
let x = Array3::from_shape_fn((2, 10, 1), |(_, t, _)| if t % 2 == 0 { 1.0 } else { -1.0 });
let ess = effective_sample_size(x.view(), arr1(&[0.0]).view(), arr1(&[1.0]).view()).unwrap();
assert_eq!(ess[0], 10.0);
```
*/
pub fn effective_sample_size(
    x: ArrayView3<f64>,
    mu: ArrayView1<f64>,
    var: ArrayView1<f64>,
) -> Result<Array1<f64>> {
    check_width("ess mean", &x, &mu)?;
    check_width("ess variance", &x, &var)?;
    let (m, n, d) = x.dim();
    if m == 0 || n == 0 {
        return Err(McmcError::InvalidArgument(format!(
            "ess needs at least one draw, got {m} x {n}"
        )));
    }
    let n_f = n as f64;
    let mut tau = Array1::<f64>::ones(d);
    for lag in 1..n {
        let rho = autocorrelation(x, lag, mu, var)?;
        if !rho.iter().any(|&p| p > AUTOCORRELATION_CUTOFF) {
            break;
        }
        let decay = 1.0 - lag as f64 / n_f;
        Zip::from(&mut tau).and(&rho).for_each(|t, &p| {
            if p > AUTOCORRELATION_CUTOFF {
                *t += 2.0 * p * decay;
            }
        });
    }
    Ok(tau.mapv(|t| n_f / t))
}

/**
Gelman-Rubin potential scale reduction per dimension, chains as replicates.

With `theta_j` the chain means, `sigma_j^2` the chain (population) variances and
`theta_bar` either the supplied reference mean or the mean of `theta_j`:

`B = n / (m - 1) * sum_j (theta_j - theta_bar)^2`, `W = mean_j sigma_j^2`,
`V = W + (m + 1) / (m n) * B`, `R = sqrt(V / W)`.

Chains with identical draws give `R = 1`; spreading the chains apart raises it.
A dimension with no variance at all (`V == W == 0`) also reports 1.

# Examples

```rust
use normal_mcmc::stats::gelman_rubin;
use ndarray::Array3;

let x = Array3::from_shape_fn((4, 50, 1), |(_, t, _)| (t as f64).sin());
let r = gelman_rubin(x.view(), None).unwrap();
assert!((r[0] - 1.0).abs() < 1e-12);
```
*/
pub fn gelman_rubin(x: ArrayView3<f64>, mu: Option<ArrayView1<f64>>) -> Result<Array1<f64>> {
    let (m, n, _) = x.dim();
    if m < 2 || n == 0 {
        return Err(McmcError::InvalidArgument(format!(
            "gelman-rubin needs at least two chains with one draw each, got {m} x {n}"
        )));
    }
    let theta = x
        .mean_axis(Axis(1))
        .ok_or_else(|| McmcError::InvalidArgument("empty chains".into()))?;
    let sigma = x.var_axis(Axis(1), 0.0);
    let theta_bar = match mu {
        Some(mu) => {
            check_width("gelman-rubin mean", &x, &mu)?;
            mu.to_owned()
        }
        None => theta
            .mean_axis(Axis(0))
            .ok_or_else(|| McmcError::InvalidArgument("no chains".into()))?,
    };
    potential_scale_reduction(theta.view(), sigma.view(), theta_bar.view(), n)
}

// theta and sigma are `[chain, dim]` means and population variances over n draws.
fn potential_scale_reduction(
    theta: ArrayView2<f64>,
    sigma: ArrayView2<f64>,
    theta_bar: ArrayView1<f64>,
    n: usize,
) -> Result<Array1<f64>> {
    let (m_f, n_f) = (theta.nrows() as f64, n as f64);
    let b = (&theta - &theta_bar).mapv(|v| v * v).sum_axis(Axis(0)) * (n_f / (m_f - 1.0));
    let w = sigma
        .mean_axis(Axis(0))
        .ok_or_else(|| McmcError::InvalidArgument("no chains".into()))?;
    let v = &w + &(b * ((m_f + 1.0) / (m_f * n_f)));
    Ok(Zip::from(&v)
        .and(&w)
        .map_collect(|&v, &w| if v == w { 1.0 } else { (v / w).sqrt() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    // Generic helper function to run the Rhat test.
    fn run_rhat_test_generic<T>(data0: Array2<T>, data1: Array2<T>, expected: Array1<f64>, tol: f64)
    where
        T: ndarray::NdFloat,
    {
        let mut psr = RhatMulti::new(3, 4);
        psr.step(data0.view()).unwrap();
        psr.step(data1.view()).unwrap();
        let rhat = psr.all().unwrap();
        let diff = *(rhat.clone() - expected.clone()).abs().max().unwrap();
        assert!(
            diff < tol,
            "Mismatch in Rhat. Got {:?}, expected {:?}, diff = {:?}",
            rhat,
            expected,
            diff
        );
    }

    fn iid_normal(m: usize, n: usize, d: usize, seed: u64) -> Array3<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        Array3::from_shape_fn((m, n, d), |_| rng.sample(StandardNormal))
    }

    #[test]
    fn test_rhat_f64_1() {
        // Step 0 data (chains x params)
        let data_step_0 = arr2(&[
            [0.0, 1.0, 0.0, 1.0], // chain 0
            [1.0, 2.0, 0.0, 2.0], // chain 1
            [0.0, 0.0, 0.0, 2.0], // chain 2
        ]);

        // Step 1 data (chains x params)
        let data_step_1 = arr2(&[
            [1.0, 2.0, 2.0, 0.0], // chain 0
            [1.0, 1.0, 1.0, 1.0], // chain 1
            [0.0, 1.0, 0.0, 0.0], // chain 2
        ]);
        let expected = array![5f64.sqrt(), 5.0 / 3.0, 1.8f64.sqrt(), (5.0f64 / 3.0).sqrt()];
        run_rhat_test_generic(data_step_0, data_step_1, expected, 1e-7);
    }

    #[test]
    fn test_rhat_f32_1() {
        let data_step_0 = arr2(&[
            [0.0f32, 1.0, 0.0, 1.0],
            [1.0, 2.0, 0.0, 2.0],
            [0.0, 0.0, 0.0, 2.0],
        ]);
        let data_step_1 = arr2(&[
            [1.0f32, 2.0, 2.0, 0.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.0, 1.0, 0.0, 0.0],
        ]);
        let expected = array![5f64.sqrt(), 5.0 / 3.0, 1.8f64.sqrt(), (5.0f64 / 3.0).sqrt()];
        run_rhat_test_generic(data_step_0, data_step_1, expected, 1e-6);
    }

    #[test]
    fn test_rhat_f64_data() {
        let data_step_0 = arr2(&[
            [1.0, 0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 2.0],
        ]);
        let data_step_1 = arr2(&[
            [1.0, 2.0, 0.0, 2.0],
            [1.0, 2.0, 0.0, 0.0],
            [2.0, 0.0, 1.0, 2.0],
        ]);
        let expected = array![
            1.0,
            (31.0f64 / 27.0).sqrt(),
            (7.0f64 / 3.0).sqrt(),
            (17.0f64 / 3.0).sqrt()
        ];
        run_rhat_test_generic(data_step_0, data_step_1, expected, 1e-7);
    }

    fn tracked_rhat(x: &Array3<f64>) -> Array1<f64> {
        let (m, n, d) = x.dim();
        let mut psr = RhatMulti::new(m, d);
        for t in 0..n {
            psr.step(x.slice(s![.., t, ..])).unwrap();
        }
        psr.all().unwrap()
    }

    #[test]
    fn rhat_tracker_matches_batch_on_identical_chains() {
        let x = Array3::from_shape_fn((4, 50, 1), |(_, t, _)| (t as f64).sin());
        let batch = gelman_rubin(x.view(), None).unwrap();
        let online = tracked_rhat(&x);
        assert_abs_diff_eq!(batch, arr1(&[1.0]), epsilon = 1e-12);
        assert_abs_diff_eq!(online, batch, epsilon = 1e-12);
    }

    #[test]
    fn rhat_tracker_matches_batch_on_separated_chains() {
        let base = iid_normal(4, 100, 2, 17);
        let x = Array3::from_shape_fn((4, 100, 2), |(c, t, d)| base[[c, t, d]] + c as f64);
        let batch = gelman_rubin(x.view(), None).unwrap();
        assert!(batch.iter().all(|&r| r > 1.5), "rhat {batch}");
        assert_abs_diff_eq!(tracked_rhat(&x), batch, epsilon = 1e-9);
    }

    #[test]
    fn rhat_tracker_needs_two_draws() {
        let mut psr = RhatMulti::new(2, 1);
        psr.step(arr2(&[[0.0], [1.0]]).view()).unwrap();
        assert!(psr.max().is_err());
        assert!(psr.step(arr2(&[[0.0, 1.0]]).view()).is_err());
    }

    #[test]
    fn pooled_moments_population_std() {
        let x = arr2(&[[1.0, 10.0], [3.0, 10.0]]);
        let (mean, std) = pooled_moments(x.view()).unwrap();
        assert_abs_diff_eq!(mean, arr1(&[2.0, 10.0]), epsilon = 1e-12);
        assert_abs_diff_eq!(std, arr1(&[1.0, 0.0]), epsilon = 1e-12);
    }

    #[test]
    fn acceptance_rate_counts_moves() {
        // chain 0 moves once out of three transitions, chain 1 every time
        let x = Array3::from_shape_vec(
            (2, 4, 1),
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 2.0, 3.0],
        )
        .unwrap();
        let rate = acceptance_rate(x.view()).unwrap();
        assert_abs_diff_eq!(rate, 4.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn acceptance_rate_any_coordinate() {
        let x = Array3::from_shape_vec((1, 2, 2), vec![0.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(acceptance_rate(x.view()).unwrap(), 1.0);
        assert!(acceptance_rate(x.slice(s![.., ..1, ..])).is_err());
    }

    #[test]
    fn ess_iid_is_close_to_n() {
        let x = iid_normal(8, 500, 2, 42);
        let ess = effective_sample_size(x.view(), arr1(&[0.0, 0.0]).view(), arr1(&[1.0, 1.0]).view())
            .unwrap();
        for &e in ess.iter() {
            assert!(e <= 500.0 && e > 400.0, "ess {e}");
        }
    }

    #[test]
    fn ess_shrinks_with_autocorrelation() {
        // AR(1) with phi = 0.9 and unit stationary variance.
        let phi: f64 = 0.9;
        let mut rng = SmallRng::seed_from_u64(3);
        let (m, n) = (8, 2_000);
        let mut x = Array3::<f64>::zeros((m, n, 1));
        for c in 0..m {
            let mut v: f64 = rng.sample(StandardNormal);
            for t in 0..n {
                let eps: f64 = rng.sample(StandardNormal);
                v = phi * v + (1.0 - phi * phi).sqrt() * eps;
                x[[c, t, 0]] = v;
            }
        }
        let ess = effective_sample_size(x.view(), arr1(&[0.0]).view(), arr1(&[1.0]).view()).unwrap();
        // tau = (1 + phi) / (1 - phi) = 19 for the full sum; the cutoff truncates it.
        assert!(ess[0] > 0.0 && ess[0] < n as f64 / 5.0, "ess {}", ess[0]);
    }

    #[test]
    fn ess_rejects_wrong_reference_width() {
        let x = iid_normal(2, 10, 2, 0);
        let err = effective_sample_size(x.view(), arr1(&[0.0]).view(), arr1(&[1.0, 1.0]).view())
            .unwrap_err();
        assert!(matches!(err, McmcError::ShapeMismatch { .. }));
    }

    #[test]
    fn autocorrelation_lag_bounds() {
        let x = iid_normal(2, 5, 1, 0);
        let (mu, var) = (arr1(&[0.0]), arr1(&[1.0]));
        assert!(autocorrelation(x.view(), 4, mu.view(), var.view()).is_ok());
        assert!(autocorrelation(x.view(), 5, mu.view(), var.view()).is_err());
    }

    #[test]
    fn rhat_identical_chains_is_one() {
        let one = iid_normal(1, 200, 3, 11);
        let x = Array3::from_shape_fn((5, 200, 3), |(_, t, d)| one[[0, t, d]]);
        let r = gelman_rubin(x.view(), None).unwrap();
        assert_abs_diff_eq!(r, Array1::ones(3), epsilon = 1e-12);
    }

    #[test]
    fn rhat_grows_with_separated_chains() {
        let base = iid_normal(4, 200, 1, 5);
        let mixed = gelman_rubin(base.view(), None).unwrap()[0];
        let shifted = Array3::from_shape_fn((4, 200, 1), |(c, t, d)| base[[c, t, d]] + 3.0 * c as f64);
        let split = gelman_rubin(shifted.view(), None).unwrap()[0];
        assert!(mixed < 1.05, "mixed rhat {mixed}");
        assert!(split > 2.0, "split rhat {split}");
    }

    #[test]
    fn rhat_reference_mean_penalizes_offset() {
        let one = iid_normal(1, 200, 1, 9);
        let x = Array3::from_shape_fn((3, 200, 1), |(_, t, d)| one[[0, t, d]] + 1.0);
        let r = gelman_rubin(x.view(), Some(arr1(&[0.0]).view())).unwrap();
        assert!(r[0] > 1.1, "rhat {}", r[0]);
    }

    #[test]
    fn rhat_constant_chains() {
        let x = Array3::<f64>::ones((3, 10, 2));
        assert_eq!(gelman_rubin(x.view(), None).unwrap(), arr1(&[1.0, 1.0]));
        assert!(gelman_rubin(x.slice(s![..1, .., ..]), None).is_err());
    }
}
