/*!
Capability traits for the collaborators of the sampler, plus the reference Gaussian
targets and priors used for validation.

An [`EnergyModel`] evaluates energies (negative log-densities up to a constant) for a
batch of states, names itself, and reports the known mean and standard deviation of its
`statistics` transform. A [`Prior`] draws the initial batch of chain states.

# Examples

```rust
use normal_mcmc::distributions::{EnergyModel, GaussianPrior, IsotropicGaussian, Prior};
use ndarray::arr2;
use rand::rngs::SmallRng;
use rand::SeedableRng;

let target = IsotropicGaussian::<f64>::standard(2);
let energies = target.energy(arr2(&[[0.0, 0.0], [1.0, 1.0]]).view()).unwrap();
assert_eq!(energies[0], 0.0);
assert_eq!(energies[1], 1.0);

let prior = GaussianPrior::new(ndarray::arr1(&[0.0, 0.0]), 2.0);
let mut rng = SmallRng::seed_from_u64(42);
let z0 = prior.sample(8, &mut rng);
assert_eq!(z0.dim(), (8, 2));
```
*/

use ndarray::{Array1, Array2, ArrayView2};
use num_traits::Float;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{McmcError, Result};

/// A target distribution expressed through its energy.
///
/// The reference `mean()` and `std()` describe the output of [`EnergyModel::statistics`],
/// not necessarily the raw state.
pub trait EnergyModel<T: Float> {
    /// Label used when logging diagnostics.
    fn name(&self) -> &str;

    /// Dimensionality of a single chain state.
    fn dim(&self) -> usize;

    /// Energy of every row of `z` (shape `[batch, dim]`), one value per chain.
    fn energy(&self, z: ArrayView2<T>) -> Result<Array1<T>>;

    /// Known mean of the observable.
    fn mean(&self) -> Array1<f64>;

    /// Known standard deviation of the observable.
    fn std(&self) -> Array1<f64>;

    /// Maps raw states `[n, dim]` to the observable of interest `[n, k]`.
    fn statistics(&self, z: ArrayView2<T>) -> Array2<f64> {
        z.mapv(to_f64)
    }
}

/// Source of initial chain states.
pub trait Prior<T> {
    /// Draws `batch_size` states, shape `[batch_size, dim]`.
    fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Array2<T>;
}

pub(crate) fn to_f64<T: Float>(x: T) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}

fn check_batch<T>(context: &'static str, dim: usize, z: &ArrayView2<T>) -> Result<()> {
    if z.ncols() != dim {
        return Err(McmcError::shape(context, &[z.nrows(), dim], z.shape()));
    }
    Ok(())
}

/**
An isotropic Gaussian target with energy `|z - mean|^2 / (2 std^2)`.

# Examples

```rust
use normal_mcmc::distributions::{EnergyModel, IsotropicGaussian};
use ndarray::arr1;

let target = IsotropicGaussian::new(arr1(&[1.0, -1.0]), 2.0);
assert_eq!(target.dim(), 2);
assert_eq!(target.std().to_vec(), vec![2.0, 2.0]);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct IsotropicGaussian<T: Float> {
    pub mean: Array1<T>,
    pub std: T,
}

impl<T: Float> IsotropicGaussian<T> {
    pub fn new(mean: Array1<T>, std: T) -> Self {
        Self { mean, std }
    }

    /// Zero mean, unit variance in `dim` dimensions.
    pub fn standard(dim: usize) -> Self {
        Self::new(Array1::zeros(dim), T::one())
    }
}

impl<T: Float> EnergyModel<T> for IsotropicGaussian<T> {
    fn name(&self) -> &str {
        "isotropic_gaussian"
    }

    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn energy(&self, z: ArrayView2<T>) -> Result<Array1<T>> {
        check_batch("isotropic gaussian energy", self.dim(), &z)?;
        let two_var = (T::one() + T::one()) * self.std * self.std;
        Ok(z.outer_iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter())
                    .fold(T::zero(), |acc, (&x, &m)| acc + (x - m) * (x - m))
                    / two_var
            })
            .collect())
    }

    fn mean(&self) -> Array1<f64> {
        self.mean.mapv(to_f64)
    }

    fn std(&self) -> Array1<f64> {
        Array1::from_elem(self.dim(), to_f64(self.std))
    }
}

/**
A 2D Gaussian target parameterized by a mean vector and a 2×2 covariance matrix.

# Examples

```rust
use normal_mcmc::distributions::{EnergyModel, Gaussian2D};
use ndarray::{arr1, arr2};

let target = Gaussian2D {
    mean: arr1(&[0.0, 1.0]),
    cov: arr2(&[[4.0, 2.0], [2.0, 3.0]]),
};
let e = target.energy(arr2(&[[0.0, 1.0]]).view()).unwrap();
assert_eq!(e[0], 0.0);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian2D<T: Float> {
    pub mean: Array1<T>,
    pub cov: Array2<T>,
}

impl<T: Float> EnergyModel<T> for Gaussian2D<T> {
    fn name(&self) -> &str {
        "gaussian_2d"
    }

    fn dim(&self) -> usize {
        2
    }

    fn energy(&self, z: ArrayView2<T>) -> Result<Array1<T>> {
        check_batch("gaussian 2d energy", 2, &z)?;
        let (a, b, c, d) = (
            self.cov[[0, 0]],
            self.cov[[0, 1]],
            self.cov[[1, 0]],
            self.cov[[1, 1]],
        );
        let det = a * d - b * c;
        let two = T::one() + T::one();
        Ok(z.outer_iter()
            .map(|row| {
                let (x, y) = (row[0] - self.mean[0], row[1] - self.mean[1]);
                // diff^T * inv(cov) * diff with inv(cov) = [[d, -b], [-c, a]] / det
                (x * (d * x - b * y) + y * (a * y - c * x)) / (det * two)
            })
            .collect())
    }

    fn mean(&self) -> Array1<f64> {
        self.mean.mapv(to_f64)
    }

    fn std(&self) -> Array1<f64> {
        self.cov.diag().mapv(|v| to_f64(v).sqrt())
    }
}

/// Independent Gaussian initial states, `N(mean, std^2 I)`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPrior<T: Float> {
    pub mean: Array1<T>,
    pub std: T,
}

impl<T: Float> GaussianPrior<T> {
    pub fn new(mean: Array1<T>, std: T) -> Self {
        Self { mean, std }
    }
}

impl<T> Prior<T> for GaussianPrior<T>
where
    T: Float,
    StandardNormal: rand_distr::Distribution<T>,
{
    fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Array2<T> {
        Array2::from_shape_fn((batch_size, self.mean.len()), |(_, j)| {
            let eps: T = rng.sample(StandardNormal);
            self.mean[j] + self.std * eps
        })
    }
}

/// A fixed initial batch, handed out as-is on every call.
///
/// Useful for pinning chains to known (e.g. widely separated) starting points. The
/// sampler rejects it if its row count differs from the requested batch size.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStart<T>(pub Array2<T>);

impl<T: Clone> FixedStart<T> {
    /// Every chain starts from `state`.
    pub fn repeated(state: &[T], batch_size: usize) -> Self {
        FixedStart(Array2::from_shape_fn((batch_size, state.len()), |(_, j)| {
            state[j].clone()
        }))
    }
}

impl<T: Clone> Prior<T> for FixedStart<T> {
    fn sample<R: Rng + ?Sized>(&self, _batch_size: usize, _rng: &mut R) -> Array2<T> {
        self.0.clone()
    }
}
