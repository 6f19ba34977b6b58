//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

/// Errors raised while building or running an ecological-inference chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EcoError {
    /// An observed proportion was non-finite or outside `[0, 1]`.
    #[error("{what} at index {index} must be a finite proportion in [0, 1], got {value}")]
    InvalidProportion {
        what: &'static str,
        index: usize,
        value: f64,
    },

    /// A regular unit whose tomography line is undefined (`X1` is exactly 0 or 1
    /// while `X2` lies strictly inside the unit interval).
    #[error("regular unit {index} has degenerate covariate X1 = {x1} for X2 = {x2}")]
    DegenerateCovariate { index: usize, x1: f64, x2: f64 },

    /// The prior hyperparameters are unusable.
    #[error("invalid prior: {0}")]
    InvalidPrior(String),

    /// The chain controls are inconsistent.
    #[error("invalid chain configuration: {0}")]
    InvalidConfig(String),

    /// A flat input buffer does not match the declared sample sizes.
    #[error("buffer `{name}` has length {actual}, expected {expected}")]
    BufferLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A covariance or precision matrix failed its positive-definiteness check.
    #[error("{0} is not positive definite")]
    NotPositiveDefinite(&'static str),

    /// The rejection step of a proposal never produced an admissible candidate.
    #[error("no admissible proposal after {attempts} attempts")]
    ProposalExhausted { attempts: usize },

    /// A log-density evaluated to a value that cannot be used.
    #[error("degenerate density: {0}")]
    DegenerateDensity(String),

    /// Vector and matrix arguments disagree on their dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
