//! Unified error type for the excerpt pipeline.
//!
//! Every fatal condition in the pipeline falls into one of a few kinds:
//! configuration errors (unsupported parameter values), data-availability
//! errors (missing files, missing time steps), structural assertion
//! failures (dataset invariants that must hold for the reduction to be
//! valid), and solver failures. Recoverable conditions are not errors at
//! all; they are logged and execution continues.

use thiserror::Error;

/// Unified error type for all excerpt-pipeline operations.
#[derive(Error, Debug)]
pub enum SbxError {
    /// I/O errors (file access, directory handling)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unsupported parameter value; never retried
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing profile source, missing time step, missing file content
    #[error("Data error: {0}")]
    Data(String),

    /// Violated dataset invariant; aborting is the only correct outcome
    #[error("Structure error: {0}")]
    Structure(String),

    /// Power-flow solver failure (non-convergence, singular system)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using SbxError.
pub type SbxResult<T> = Result<T, SbxError>;

impl From<anyhow::Error> for SbxError {
    fn from(err: anyhow::Error) -> Self {
        SbxError::Other(err.to_string())
    }
}

impl From<String> for SbxError {
    fn from(s: String) -> Self {
        SbxError::Other(s)
    }
}

impl From<&str> for SbxError {
    fn from(s: &str) -> Self {
        SbxError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for SbxError {
    fn from(err: serde_json::Error) -> Self {
        SbxError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SbxError::Config("ehv_zones=3 is not supported".into());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("ehv_zones"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SbxError = io_err.into();
        assert!(matches!(err, SbxError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> SbxResult<()> {
            Err(SbxError::Data("time step 12 missing".into()))
        }

        fn outer() -> SbxResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
