use thiserror::Error;

use crate::config::LoadError;
use crate::content::ContentError;
use crate::infra::error::InfraError;
use crate::options::OptionsError;

/// Top-level error of a CLI run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("purge request failed: {0}")]
    PurgeFailed(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn purge_failed(message: impl Into<String>) -> Self {
        Self::PurgeFailed(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
