//! Typed errors surfaced by the route pipeline.
//!
//! Per-item failures (one search tier, one page fetch) never show up here;
//! they are logged and degrade to "no result". Only the end-to-end outcomes
//! below reach the caller, always rendered into the status envelope.

use thiserror::Error;

use crate::normalize::NormalizeError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Both search tiers came back empty.
    #[error("No relevant threads found.")]
    NoCandidatesFound,

    /// Every candidate failed to scrape or yielded no usable text.
    #[error("Could not read any of the matching threads.")]
    ContentUnavailable,

    /// Transport, auth or provider error while calling the oracle.
    #[error("Oracle request failed: {0:#}")]
    OracleFailure(#[source] anyhow::Error),

    /// The recovery chain could not extract a structured document.
    #[error("Could not parse the model response: {0}")]
    MalformedResponse(#[from] NormalizeError),
}
