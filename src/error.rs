//! Error type shared by every stage of the sampling engine.

use thiserror::Error;

/// Errors reported by grid generation, reduction, neighbor search,
/// assignment and persistence.
///
/// Numeric stages never retry; a failed precondition aborts only the
/// operation that detected it.
#[derive(Error, Debug)]
pub enum SamplingError {
    /// A parameter is out of range (non-positive spacing, bad tilt range, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The symmetry descriptor does not name a supported point group.
    #[error("invalid input: unknown symmetry descriptor `{0}`")]
    UnknownSymmetry(String),

    /// A stage was called before the stage it depends on.
    #[error("inconsistent state: {0}")]
    InconsistentState(&'static str),

    /// A vector that should define a direction has zero or non-finite length.
    #[error("degenerate direction for {what} (norm {norm:e})")]
    Degenerate { what: String, norm: f64 },

    /// A sampling file could not be parsed; `line` is 1-based.
    #[error("malformed sampling file at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SamplingError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        SamplingError::Parse {
            line,
            message: message.into(),
        }
    }

    /// `true` for every error caused by caller-supplied data rather than
    /// call order or I/O.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            SamplingError::InvalidInput(_)
                | SamplingError::UnknownSymmetry(_)
                | SamplingError::Parse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SamplingError>;
