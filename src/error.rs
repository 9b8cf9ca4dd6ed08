//! Error types for the analytics pipeline
//!
//! Only infrastructure failures are modelled as errors: an unreachable LLM
//! gateway, or a composition failure after a query already executed. Policy
//! outcomes (clarification sentinels, safety rejections, execution errors on
//! a validated statement, schema connectivity problems) are converted into
//! well-formed [`crate::pipeline::PipelineResult`]s by the orchestrator and
//! never surface as `Err`.

use thiserror::Error;

/// Request-fatal pipeline failures, mapped by the service layer to a
/// transport-level error response.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The generation gateway was unreachable or returned a malformed
    /// response. No SQL was produced for this request.
    #[error("SQL generation failed: {0}")]
    Generation(anyhow::Error),

    /// The composer gateway failed after a successful execution. A result
    /// without narration is not acceptable output, so the whole request
    /// fails.
    #[error("Response composition failed: {0}")]
    Composition(anyhow::Error),
}

/// Database-level failure while executing an already-validated statement.
///
/// Converted to a user-facing "Execution Error" message by the orchestrator;
/// never crashes the pipeline.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("query timed out after {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Database(String),
}
