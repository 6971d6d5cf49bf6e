//! Error kinds shared across the acquisition pipeline.
//!
//! These are *kinds*, not a catch-all. Each crate layer (`registry`,
//! `scheduler`, ...) defines its own `thiserror` enum and converts into
//! these where a caller outside that layer needs a coarser view (e.g.
//! the Health Monitor only cares whether an outcome was transient,
//! rate-limited, or auth-failed).

use thiserror::Error;

/// Coarse error taxonomy, independent of which indexer kind or HTTP
/// status produced it: kinds, not types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("indexer unreachable: {0}")]
    IndexerUnreachable(String),

    #[error("indexer rate limited{}", retry_after_suffix(.retry_after_secs))]
    IndexerRateLimited { retry_after_secs: Option<u64> },

    #[error("indexer authentication failed: {0}")]
    IndexerAuthFailed(String),

    #[error("indexer returned a malformed response: {0}")]
    IndexerMalformedResponse(String),

    #[error("not found")]
    NotFound,

    #[error("gone")]
    Gone,

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("local resource error: {0}")]
    LocalResource(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn retry_after_suffix(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

impl DomainError {
    /// Whether the scheduler should retry a download that failed with
    /// this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::IndexerUnreachable(_) | DomainError::IndexerRateLimited { .. }
        )
    }
}
