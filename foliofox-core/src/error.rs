//! Crate-wide error type. Individual modules define narrower enums
//! (e.g. [`crate::registry::RegistryError`]) and convert into this one
//! at the boundary via `From` impls, so callers only ever match on a
//! single error type.

use foliofox_model::error::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
