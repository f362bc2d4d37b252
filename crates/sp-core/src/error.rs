//! Engine error types.

use chrono::NaiveDate;
use thiserror::Error;

use crate::calendar::UnknownGranularity;
use crate::types::ProjectId;

/// Boxed backend error returned by the query traits.
///
/// Keeps `sp-core` independent of any particular storage crate.
#[derive(Debug, Error)]
#[error("data source error: {0}")]
pub struct SourceError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl SourceError {
    /// Wraps any backend error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

/// Errors raised by the engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested date range ends before it starts.
    #[error("invalid range: end date {end} is before start date {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// The requested granularity is not one of weekly, monthly, quarterly.
    #[error(transparent)]
    UnknownGranularity(#[from] UnknownGranularity),

    /// Classification bounds are not strictly increasing finite values.
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    /// The project to plan does not exist.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// A query or write against the data source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Rejects ranges whose end precedes their start.
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), EngineError> {
    if end < start {
        return Err(EngineError::InvalidRange { start, end });
    }
    Ok(())
}
