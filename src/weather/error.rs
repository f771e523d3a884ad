//! Error taxonomy for the weather enrichment pipeline.
//!
//! None of these abort a batch: invalid dates exclude a single row, and
//! fetch failures leave the affected key unenriched.

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// The date string matched none of the accepted formats.
    #[error("could not parse date {0:?}; expected DD-MM-YYYY, YYYY-MM-DD, or MM-DD-YYYY")]
    InvalidDateFormat(String),

    /// Rate-limit response, timeout, or connection error; retried with
    /// linear backoff before being downgraded to [`WeatherError::Permanent`].
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Non-retryable failure; the key gets a null result.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}
