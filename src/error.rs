//! Stage-tagged error taxonomy for the sensitivity pipeline.

use std::fmt;

use thiserror::Error;

/// Which phase of the pipeline a failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    Forward,
    Adjoint,
    IncrementalForward,
    IncrementalAdjoint,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Forward => "forward",
            Stage::Adjoint => "adjoint",
            Stage::IncrementalForward => "incremental-forward",
            Stage::IncrementalAdjoint => "incremental-adjoint",
        };
        f.write_str(name)
    }
}

/// Why a linear solve failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SolveFailure {
    #[error("matrix is singular to working precision")]
    Singular,
    #[error("iteration budget exhausted without reaching tolerance")]
    NotConverged,
}

/// Pipeline errors. Failures are never retried internally; callers see the
/// stage at which the pipeline stopped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{stage} solve did not converge after {iterations} iterations (residual {residual_norm:.3e})")]
    ConvergenceFailure {
        stage: Stage,
        iterations: usize,
        residual_norm: f64,
    },

    #[error("linear solve failed during {stage} stage: {source}")]
    LinearSolveFailure {
        stage: Stage,
        source: SolveFailure,
    },

    #[error("unsupported option: {0}")]
    UnsupportedOption(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_stage() {
        let err = Error::LinearSolveFailure {
            stage: Stage::Adjoint,
            source: SolveFailure::Singular,
        };
        let msg = err.to_string();
        assert!(msg.contains("adjoint"));
        assert!(msg.contains("singular"));
    }
}
