//! Unified Error Type System
//!
//! Centralized error types for the normalization core.
//!
//! ## Design Principles
//!
//! - Single unified error type (QuoteError) for the crate boundary
//! - Repair failures never cross the boundary as errors; they are recovered
//!   into `ParseOutcome` values the caller branches on
//! - Upstream generation failures are surfaced verbatim, never retried here
//! - No panic/unwrap - all errors are recoverable

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Generation Error
// =============================================================================

/// Opaque failure from the caller-supplied generation function.
///
/// Covers invalid credentials, upstream quota exhaustion, content-safety
/// rejection and network failure alike; the core never inspects or retries
/// these, it hands them back untouched.
#[derive(Debug, Clone)]
pub struct GenerationError {
    /// Detailed error message from the upstream provider
    pub message: String,
    /// Provider that produced the error, when known
    pub provider: Option<String>,
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}] {}", provider, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for GenerationError {}

impl GenerationError {
    /// Create a new generation error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            provider: None,
        }
    }

    /// Add provider context
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

// =============================================================================
// Governance Error
// =============================================================================

/// Errors produced by the request governor.
#[derive(Debug, Error)]
pub enum GovernError {
    /// Local quota exhausted; caller should back off until the window resets
    #[error("rate limited: window resets in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The generation function failed; surfaced verbatim
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl GovernError {
    /// Check whether this error clears on its own after a delay
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Govern(#[from] GovernError),
}

impl From<GenerationError> for QuoteError {
    fn from(err: GenerationError) -> Self {
        QuoteError::Govern(GovernError::Generation(err))
    }
}

pub type Result<T> = std::result::Result<T, QuoteError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_display() {
        let err = GenerationError::new("quota exhausted").with_provider("openai");
        assert_eq!(err.to_string(), "[openai] quota exhausted");

        let bare = GenerationError::new("connection refused");
        assert_eq!(bare.to_string(), "connection refused");
    }

    #[test]
    fn test_govern_error_rate_limited() {
        let err = GovernError::RateLimited {
            retry_after: Duration::from_secs(12),
        };
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_govern_error_generation_passthrough() {
        let err: GovernError = GenerationError::new("safety rejection").into();
        assert!(!err.is_rate_limited());
        assert!(err.to_string().contains("safety rejection"));
    }

    #[test]
    fn test_quote_error_from_generation() {
        let err: QuoteError = GenerationError::new("boom").into();
        assert!(matches!(
            err,
            QuoteError::Govern(GovernError::Generation(_))
        ));
    }
}
