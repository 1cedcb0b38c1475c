//! Error type shared by the sampler and the statistics engine.

use thiserror::Error;

/// Errors surfaced by sampling and diagnostics. Every failure is returned
/// synchronously; nothing is retried.
#[derive(Debug, Error)]
pub enum McmcError {
    /// An array handed across a collaborator boundary has the wrong shape.
    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// A degenerate or out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The energy model failed to evaluate a batch.
    #[error("energy evaluation failed: {0}")]
    Energy(String),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, McmcError>;

impl McmcError {
    pub(crate) fn shape(context: &'static str, expected: &[usize], found: &[usize]) -> Self {
        McmcError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
