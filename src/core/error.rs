//! Error types for the sylva engine

use thiserror::Error;

/// Main error type for the engine
///
/// Only caller contract violations produce errors. Degenerate procedural
/// input (zero-length curves, NaN geometry) degrades to fallback values
/// instead of erroring.
#[derive(Debug, Error)]
pub enum Error {
    #[error("batch error: {0}")]
    Batch(String),

    #[error("vertex channel error: {0}")]
    Channel(String),

    #[error("curve registration error: {0}")]
    CurveSync(String),

    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),
}
