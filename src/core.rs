//! The trajectory produced by a sampler run: every state of every chain, plus the
//! accept/reject decision taken at each step.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};

/// Full history of a batched run.
///
/// `states` is indexed `[chain, time, dim]` and `accepted` is indexed `[chain, time]`.
/// The state at time `t` is the state *after* step `t`; the initial prior draw is not
/// recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<T> {
    states: Array3<T>,
    accepted: Array2<bool>,
}

impl<T: Clone> Trajectory<T> {
    pub(crate) fn new(states: Array3<T>, accepted: Array2<bool>) -> Self {
        debug_assert_eq!(states.shape()[..2], accepted.shape()[..]);
        Self { states, accepted }
    }

    pub fn states(&self) -> ArrayView3<'_, T> {
        self.states.view()
    }

    pub fn accepted(&self) -> ArrayView2<'_, bool> {
        self.accepted.view()
    }

    pub fn n_chains(&self) -> usize {
        self.states.shape()[0]
    }

    pub fn n_steps(&self) -> usize {
        self.states.shape()[1]
    }

    pub fn dim(&self) -> usize {
        self.states.shape()[2]
    }

    /// Fraction of proposals that were accepted, read from the recorded decisions.
    pub fn acceptance_rate(&self) -> f64 {
        if self.accepted.is_empty() {
            return 0.0;
        }
        self.accepted.iter().filter(|&&a| a).count() as f64 / self.accepted.len() as f64
    }

    /// States with the first `n` steps of every chain dropped.
    pub fn burn_in(&self, n: usize) -> ArrayView3<'_, T> {
        let n = n.min(self.n_steps());
        self.states.slice(s![.., n.., ..])
    }
}
