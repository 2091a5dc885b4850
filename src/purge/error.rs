use thiserror::Error;

use super::signer::SignerError;
use super::transport::TransportError;

/// Why a purge or credential check failed.
///
/// Callers only ever see the `Display` text, carried in
/// [`PurgeResponse::error`](super::client::PurgeResponse::error).
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("Bad client: API credentials are missing or invalid.")]
    BadClient,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to sign request: {0}")]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("AKAMAI_API_ERROR: {0}.")]
    Api(String),
    #[error("{status} – {reason}")]
    Status { status: u16, reason: String },
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

impl PurgeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn api(detail: &str) -> Self {
        Self::Api(detail.trim().trim_end_matches('.').to_string())
    }

    pub fn unexpected_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedShape(message.into())
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadClient => "bad_client",
            Self::Configuration(_) => "configuration",
            Self::Signer(_) => "signer",
            Self::Transport(_) => "transport",
            Self::Api(_) => "api",
            Self::Status { .. } => "status",
            Self::UnexpectedShape(_) => "unexpected_shape",
        }
    }
}
