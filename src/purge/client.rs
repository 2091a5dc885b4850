//! Purge API client.
//!
//! Builds the purge and credential-check requests, signs them, hands them to
//! the [`Transport`] and folds whatever comes back into a [`PurgeResponse`].
//! Nothing here returns `Err` or panics: every failure is data.

use std::sync::Arc;
use std::time::Instant;

use edgepurge_ccu_types::{
    ACTIVE_GRANTS_PATH, ApiErrorBody, PurgeAccepted, PurgeMethod, PurgeRequestBody,
};
use metrics::{counter, histogram};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::options::Credentials;

use super::error::PurgeError;
use super::signer::{SignableRequest, Signer};
use super::tags::dedup_tags;
use super::transport::{OutboundRequest, RawResponse, Transport, TransportError};

const METRIC_PURGE_REQUESTS_TOTAL: &str = "edgepurge_purge_requests_total";
const METRIC_PURGE_REQUEST_MS: &str = "edgepurge_purge_request_ms";

/// Build the `User-Agent` value sent with every request.
pub fn user_agent(platform: &str, platform_version: &str) -> String {
    format!(
        "{}/{} {platform}/{platform_version} rust/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_RUST_VERSION"),
    )
}

/// Normalized outcome of a purge or credential check.
///
/// `success` is false exactly when `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeResponse {
    success: bool,
    raw_response: Option<RawResponse>,
    error: Option<String>,
}

impl PurgeResponse {
    pub fn ok(raw_response: Option<RawResponse>) -> Self {
        Self {
            success: true,
            raw_response,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, raw_response: Option<RawResponse>) -> Self {
        Self {
            success: false,
            raw_response,
            error: Some(error.into()),
        }
    }

    fn from_error(error: &PurgeError, raw_response: Option<RawResponse>) -> Self {
        Self::failed(error.to_string(), raw_response)
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn raw_response(&self) -> Option<&RawResponse> {
        self.raw_response.as_ref()
    }

    /// Parsed acceptance body of a successful purge, if present.
    pub fn accepted(&self) -> Option<PurgeAccepted> {
        let raw = self.raw_response.as_ref().filter(|_| self.success)?;
        serde_json::from_str(&raw.body).ok()
    }
}

/// Fold a transport result into a [`PurgeResponse`].
///
/// A transport error becomes a failure carrying its message. An absent
/// response returns the given `success`/`error` pair. Otherwise the status
/// code decides: 2xx succeeds, anything else fails with the API `detail` when
/// the body has one, else `"{code} – {reason}"`.
pub fn normalize_response(
    raw: Option<Result<RawResponse, TransportError>>,
    success: bool,
    error: Option<String>,
) -> PurgeResponse {
    match raw {
        Some(Err(err)) => PurgeResponse::from_error(&PurgeError::Transport(err), None),
        None => match error {
            Some(error) => PurgeResponse::failed(error, None),
            None if success => PurgeResponse::ok(None),
            None => PurgeResponse::from_error(
                &PurgeError::unexpected_shape("failure reported without a message"),
                None,
            ),
        },
        Some(Ok(raw)) => match classify(&raw) {
            Ok(()) => PurgeResponse::ok(Some(raw)),
            Err(err) => PurgeResponse::from_error(&err, Some(raw)),
        },
    }
}

fn classify(raw: &RawResponse) -> Result<(), PurgeError> {
    if !(100..=599).contains(&raw.status) {
        return Err(PurgeError::unexpected_shape(format!(
            "status code {} is out of range",
            raw.status
        )));
    }
    if (200..300).contains(&raw.status) {
        return Ok(());
    }

    if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&raw.body)
        && let Some(detail) = body.detail.as_deref().map(str::trim)
        && !detail.is_empty()
    {
        return Err(PurgeError::api(detail));
    }

    let reason = raw
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .or_else(|| {
            StatusCode::from_u16(raw.status)
                .ok()
                .and_then(|status| status.canonical_reason())
        })
        .ok_or_else(|| {
            PurgeError::unexpected_shape(format!("status {} has no reason phrase", raw.status))
        })?;

    Err(PurgeError::Status {
        status: raw.status,
        reason: reason.to_string(),
    })
}

/// Client for the purge API.
pub struct PurgeClient {
    credentials: Credentials,
    base: Option<Url>,
    signer: Option<Arc<dyn Signer>>,
    transport: Arc<dyn Transport>,
    user_agent: String,
    log_requests: bool,
}

impl PurgeClient {
    pub fn new(
        credentials: &Credentials,
        signer: Option<Arc<dyn Signer>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            credentials: credentials.clone(),
            base: base_url(&credentials.host),
            signer,
            transport,
            user_agent: user_agent("edgepurge", env!("CARGO_PKG_VERSION")),
            log_requests: false,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Log requests and responses verbatim.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// True when credentials are complete, the host parses and a signer is set.
    pub fn is_valid(&self) -> bool {
        self.credentials.is_complete() && self.base.is_some() && self.signer.is_some()
    }

    /// Send one purge request for `objects`.
    ///
    /// `hostname` is only sent for URL methods, which require one.
    pub async fn purge(
        &self,
        method: PurgeMethod,
        path: &str,
        objects: &[String],
        hostname: Option<&str>,
    ) -> PurgeResponse {
        match self.purge_request(method, path, objects, hostname) {
            Ok(request) => self.dispatch("purge", request).await,
            Err(err) => self.reject("purge", &err),
        }
    }

    /// Check the credentials against the introspection endpoint.
    pub async fn test_creds(&self) -> PurgeResponse {
        match self.request(Method::GET, ACTIVE_GRANTS_PATH, None) {
            Ok(request) => self.dispatch("test_creds", request).await,
            Err(err) => self.reject("test_creds", &err),
        }
    }

    fn purge_request(
        &self,
        method: PurgeMethod,
        path: &str,
        objects: &[String],
        hostname: Option<&str>,
    ) -> Result<OutboundRequest, PurgeError> {
        if !self.is_valid() {
            return Err(PurgeError::BadClient);
        }

        let hostname = if method.is_url() {
            let hostname = hostname
                .map(str::trim)
                .filter(|hostname| !hostname.is_empty())
                .ok_or_else(|| {
                    PurgeError::configuration("a hostname is required for URL purges")
                })?;
            Some(hostname.to_string())
        } else {
            None
        };

        let body = PurgeRequestBody {
            objects: dedup_tags(objects.iter().cloned()),
            hostname,
        };
        let body = serde_json::to_string(&body)
            .map_err(|err| PurgeError::configuration(format!("failed to encode body: {err}")))?;

        self.request(Method::POST, path, Some(body))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<OutboundRequest, PurgeError> {
        let (Some(base), Some(signer)) = (&self.base, &self.signer) else {
            return Err(PurgeError::BadClient);
        };
        if !self.credentials.is_complete() {
            return Err(PurgeError::BadClient);
        }

        let url = base
            .join(path)
            .map_err(|err| PurgeError::configuration(format!("invalid path `{path}`: {err}")))?;
        let authorization = signer.authorization(
            &self.credentials,
            &SignableRequest {
                method: &method,
                url: &url,
                body: body.as_deref(),
            },
        )?;

        let mut headers = vec![
            ("Authorization".to_string(), authorization),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(OutboundRequest {
            method,
            url,
            headers,
            body,
        })
    }

    async fn dispatch(&self, kind: &'static str, request: OutboundRequest) -> PurgeResponse {
        if self.log_requests {
            info!(
                kind,
                method = %request.method,
                url = %request.url,
                body = request.body.as_deref().unwrap_or(""),
                "Purge API request"
            );
        }

        let started_at = Instant::now();
        let result = self.transport.send(request).await;
        histogram!(METRIC_PURGE_REQUEST_MS, "kind" => kind)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        if self.log_requests {
            match &result {
                Ok(raw) => info!(kind, status = raw.status, body = %raw.body, "Purge API response"),
                Err(err) => info!(kind, error = %err, "Purge API transport failure"),
            }
        }

        let response = normalize_response(Some(result), true, None);
        record_result(kind, &response);
        match response.error() {
            None => debug!(kind, "Purge API call succeeded"),
            Some(error) => warn!(kind, error, "Purge API call failed"),
        }
        response
    }

    fn reject(&self, kind: &'static str, err: &PurgeError) -> PurgeResponse {
        warn!(kind, error = %err, error_kind = err.kind(), "Purge API call not attempted");
        let response = normalize_response(None, false, Some(err.to_string()));
        record_result(kind, &response);
        response
    }
}

impl std::fmt::Debug for PurgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeClient")
            .field("credentials", &self.credentials)
            .field("base", &self.base.as_ref().map(Url::as_str))
            .field("signer", &self.signer.is_some())
            .field("user_agent", &self.user_agent)
            .field("log_requests", &self.log_requests)
            .finish_non_exhaustive()
    }
}

fn record_result(kind: &'static str, response: &PurgeResponse) {
    let result = if response.success() {
        "success"
    } else {
        "failure"
    };
    counter!(METRIC_PURGE_REQUESTS_TOTAL, "kind" => kind, "result" => result).increment(1);
}

/// `https://{host}/`, or the host as given when it already has a scheme.
fn base_url(host: &str) -> Option<Url> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return None;
    }
    let candidate = if host.contains("://") {
        format!("{host}/")
    } else {
        format!("https://{host}/")
    };
    Url::parse(&candidate)
        .ok()
        .filter(|url| url.host_str().is_some())
}
