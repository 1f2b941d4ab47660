//! Error taxonomy shared by every pipeline stage.
//!
//! Stage-level failures abort the stage and propagate; per-gene or per-set
//! failures are represented as `None` sentinels in the stage output instead
//! of an error. There are no retries anywhere in the pipeline.

use thiserror::Error;

/// Errors produced by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid parameters: k < 2, a filter that removes every gene,
    /// a zero-variance feature handed to scaling, a minority class smaller
    /// than the requested neighbor count, and similar.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid data: ID mismatches, duplicate IDs, zero-count samples,
    /// insufficient replicates. The message names the offending identifiers.
    #[error("data error: {0}")]
    Data(String),

    /// Numeric failure: singular matrix, divide-by-zero, NaN propagation,
    /// or an iteration cap reached without convergence.
    #[error("numeric error: {0}")]
    Numeric(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        PipelineError::Data(msg.into())
    }

    pub fn numeric(msg: impl Into<String>) -> Self {
        PipelineError::Numeric(msg.into())
    }
}
