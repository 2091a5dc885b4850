//! Request signing boundary.
//!
//! The upstream API authenticates every request with an `Authorization`
//! value derived from the client credentials. Computing it is left to a
//! [`Signer`] supplied by the embedding application.

use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::options::Credentials;

/// The parts of a request a signer may cover.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub body: Option<&'a str>,
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SignerError(pub String);

pub trait Signer: Send + Sync {
    /// Produce the `Authorization` header value for `request`.
    fn authorization(
        &self,
        credentials: &Credentials,
        request: &SignableRequest<'_>,
    ) -> Result<String, SignerError>;
}

/// Signer returning a pre-computed authorization value.
#[derive(Clone)]
pub struct StaticAuthorization {
    value: String,
}

impl StaticAuthorization {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl std::fmt::Debug for StaticAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticAuthorization").finish_non_exhaustive()
    }
}

impl Signer for StaticAuthorization {
    fn authorization(
        &self,
        _credentials: &Credentials,
        _request: &SignableRequest<'_>,
    ) -> Result<String, SignerError> {
        let value = self.value.trim();
        if value.is_empty() {
            return Err(SignerError("static authorization value is empty".into()));
        }
        Ok(value.to_string())
    }
}
