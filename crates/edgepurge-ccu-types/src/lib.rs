//! Request and response shapes for the Fast Purge (CCU v3) API.
//!
//! The enums here carry the user-facing values stored in settings and purge
//! contexts (`arl`, `all`, ...). Translation to the segments the API expects
//! happens only in [`purge_path`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the credential introspection endpoint.
pub const ACTIVE_GRANTS_PATH: &str = "/-/client-api/active-grants/implicit";

const PURGE_PATH_PREFIX: &str = "/ccu/v3";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseValueError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Whether cached content is marked stale or removed outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeType {
    Invalidate,
    Delete,
}

impl PurgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invalidate => "invalidate",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for PurgeType {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "invalidate" => Ok(Self::Invalidate),
            "delete" => Ok(Self::Delete),
            _ => Err(ParseValueError::new("purge type", value)),
        }
    }
}

impl fmt::Display for PurgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the purge objects identify.
///
/// `Arl` is the legacy name for URL purging and is kept as-is so stored
/// settings round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMethod {
    Tags,
    Url,
    Arl,
    Cpcode,
}

impl PurgeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Url => "url",
            Self::Arl => "arl",
            Self::Cpcode => "cpcode",
        }
    }

    /// Segment used in the request path.
    pub fn wire_segment(self) -> &'static str {
        match self {
            Self::Tags => "tag",
            Self::Url | Self::Arl => "url",
            Self::Cpcode => "cpcode",
        }
    }

    /// URL purges must carry the hostname in the request body.
    pub fn is_url(self) -> bool {
        matches!(self, Self::Url | Self::Arl)
    }
}

impl FromStr for PurgeMethod {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tags" | "tag" => Ok(Self::Tags),
            "url" => Ok(Self::Url),
            "arl" => Ok(Self::Arl),
            "cpcode" => Ok(Self::Cpcode),
            _ => Err(ParseValueError::new("purge method", value)),
        }
    }
}

impl fmt::Display for PurgeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target network. `All` purges staging and production together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeNetwork {
    All,
    Staging,
    Production,
}

impl PurgeNetwork {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Segment used in the request path; empty means both networks.
    pub fn wire_segment(self) -> &'static str {
        match self {
            Self::All => "",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl FromStr for PurgeNetwork {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            _ => Err(ParseValueError::new("purge network", value)),
        }
    }
}

impl fmt::Display for PurgeNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build `/ccu/v3/{type}/{method}/{network}`.
pub fn purge_path(purge_type: PurgeType, method: PurgeMethod, network: PurgeNetwork) -> String {
    format!(
        "{PURGE_PATH_PREFIX}/{}/{}/{}",
        purge_type.as_str(),
        method.wire_segment(),
        network.wire_segment()
    )
}

/// JSON body of a purge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRequestBody {
    pub objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// Problem-details body returned by the API on failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

/// Success body of a purge request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeAccepted {
    #[serde(default)]
    pub purge_id: Option<String>,
    #[serde(default)]
    pub estimated_seconds: Option<u64>,
    #[serde(default)]
    pub support_id: Option<String>,
}
