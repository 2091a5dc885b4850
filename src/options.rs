//! Purge options: a flat key/value namespace plus a `credentials` sub-namespace.
//!
//! Each key resolves independently with the precedence
//! explicit override → persisted store → built-in default, so
//! [`OptionsStore::get_settings`] always yields a value for every key.
//!
//! The persisted store is a TOML document using the option names verbatim:
//!
//! ```toml
//! unique-sitecode = "shop"
//! purge-method = "tags"
//! purge-network = "production"
//!
//! [credentials]
//! host = "akab-xxxx.purge.akamaiapis.net"
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;
use url::Url;

const DEFAULT_PURGE_NETWORK: &str = "all";
const DEFAULT_PURGE_TYPE: &str = "invalidate";
const DEFAULT_PURGE_METHOD: &str = "tags";
const DEFAULT_EMIT_TAG_LIMIT: u64 = 128;
const CREDENTIALS_KEY: &str = "credentials";

/// Fully-resolved purge options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PurgeOptions {
    /// Site code used as the tag prefix; the URL-encoded hostname when blank.
    pub unique_sitecode: String,
    /// Global switch for purging on content updates.
    pub purge_on_update: bool,
    /// `all`, `staging` or `production`. Blank falls back to `staging`.
    pub purge_network: String,
    /// `invalidate` or `delete`. Blank falls back to `invalidate`.
    pub purge_type: String,
    /// `tags`, `url`, `cpcode` or legacy `arl`. Blank falls back to `url`.
    pub purge_method: String,
    /// Include author, term and post relations in purge tag sets.
    pub cache_related_tags: bool,
    /// Hostname sent with URL purges; defaults to the site URL host.
    pub hostname: String,
    /// Log purge requests and responses verbatim.
    pub log_purge: bool,
    pub purgeable_statuses: Vec<String>,
    pub purgeable_post_types: Vec<String>,
    pub purgeable_taxonomies: Vec<String>,
    /// CP codes purged when the method is `cpcode`.
    pub cpcodes: Vec<String>,
    pub post_actions: Vec<String>,
    pub term_actions: Vec<String>,
    pub user_actions: Vec<String>,
    /// Upper bound on tags emitted in one response header.
    pub emit_tag_limit: u64,
    pub credentials: Credentials,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            unique_sitecode: String::new(),
            purge_on_update: true,
            purge_network: DEFAULT_PURGE_NETWORK.to_string(),
            purge_type: DEFAULT_PURGE_TYPE.to_string(),
            purge_method: DEFAULT_PURGE_METHOD.to_string(),
            cache_related_tags: true,
            hostname: String::new(),
            log_purge: false,
            purgeable_statuses: strings(&["publish", "trash"]),
            purgeable_post_types: strings(&["post", "page"]),
            purgeable_taxonomies: strings(&["category", "post_tag"]),
            cpcodes: Vec::new(),
            post_actions: strings(&["create", "update", "trash", "delete", "future-publish"]),
            term_actions: strings(&["edit", "delete"]),
            user_actions: strings(&["profile-update"]),
            emit_tag_limit: DEFAULT_EMIT_TAG_LIMIT,
            credentials: Credentials::default(),
        }
    }
}

/// API client credentials as stored in settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Credentials {
    pub host: String,
    pub access_token: String,
    pub client_token: String,
    pub client_secret: String,
}

impl Credentials {
    /// True when every field is non-blank.
    pub fn is_complete(&self) -> bool {
        [
            &self.host,
            &self.access_token,
            &self.client_token,
            &self.client_secret,
        ]
        .iter()
        .all(|value| !value.trim().is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("access_token", &redact(&self.access_token))
            .field("client_token", &redact(&self.client_token))
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read options store {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse options store: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid option override `{0}`: expected KEY=VALUE")]
    Override(String),
}

/// Layered option lookup.
#[derive(Debug, Clone, Default)]
pub struct OptionsStore {
    persisted: Map<String, Value>,
    overrides: Map<String, Value>,
    site_url: Option<Url>,
}

impl OptionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `site_url` for dynamically-defaulted keys.
    pub fn with_site_url(mut self, site_url: Option<Url>) -> Self {
        self.site_url = site_url;
        self
    }

    /// Replace the persisted layer with a TOML document.
    pub fn with_persisted_toml(mut self, input: &str) -> Result<Self, OptionsError> {
        let table: Map<String, Value> = toml::from_str(input)?;
        self.persisted = table;
        Ok(self)
    }

    pub fn with_persisted_path(self, path: &Path) -> Result<Self, OptionsError> {
        let input = std::fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.with_persisted_toml(&input)
    }

    /// Set an explicit override. `credentials.<field>` addresses the
    /// credentials sub-namespace.
    pub fn set_override(&mut self, key: &str, value: Value) {
        match key.split_once('.') {
            Some((CREDENTIALS_KEY, field)) => {
                let entry = self
                    .overrides
                    .entry(CREDENTIALS_KEY.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(credentials) = entry {
                    credentials.insert(field.to_string(), value);
                }
            }
            _ => {
                self.overrides.insert(key.to_string(), value);
            }
        }
    }

    /// Parse and apply a `KEY=VALUE` override.
    pub fn apply_override_str(&mut self, raw: &str) -> Result<(), OptionsError> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| OptionsError::Override(raw.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(OptionsError::Override(raw.to_string()));
        }
        self.set_override(key, Value::String(value.trim().to_string()));
        Ok(())
    }

    /// Resolve every option.
    pub fn get_settings(&self) -> PurgeOptions {
        let defaults = PurgeOptions::default();
        let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
            return defaults;
        };

        overlay(&mut merged, &self.persisted, "persisted");
        overlay(&mut merged, &self.overrides, "override");

        let mut options = match serde_json::from_value::<PurgeOptions>(Value::Object(merged)) {
            Ok(options) => options,
            Err(err) => {
                warn!(error = %err, "Option layers did not deserialize; using defaults");
                defaults
            }
        };

        if options.hostname.trim().is_empty()
            && let Some(host) = self.site_url.as_ref().and_then(Url::host_str)
        {
            options.hostname = host.to_string();
        }

        options
    }
}

/// Overlay `layer` onto `merged`, key by key. Values whose shape does not
/// match the default are ignored so a bad entry never removes a key.
fn overlay(merged: &mut Map<String, Value>, layer: &Map<String, Value>, source: &'static str) {
    for (key, candidate) in layer {
        let Some(current) = merged.get_mut(key) else {
            warn!(key = %key, source, "Ignoring unknown option");
            continue;
        };

        if key == CREDENTIALS_KEY {
            match (current, candidate) {
                (Value::Object(existing), Value::Object(fields)) => {
                    overlay(existing, fields, source);
                }
                _ => warn!(key = %key, source, "Ignoring non-table credentials"),
            }
            continue;
        }

        match coerce(current, candidate) {
            Some(value) => *current = value,
            None => warn!(key = %key, source, "Ignoring option with unexpected type"),
        }
    }
}

/// Convert `candidate` to the shape of `default`, accepting string spellings
/// for booleans, numbers and comma-separated lists.
fn coerce(default: &Value, candidate: &Value) -> Option<Value> {
    match (default, candidate) {
        (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_)) => Some(candidate.clone()),
        (Value::Number(_), Value::Number(number)) => number.as_u64().map(Value::from),
        (Value::Array(_), Value::Array(items)) => items
            .iter()
            .all(Value::is_string)
            .then(|| candidate.clone()),
        (Value::Bool(_), Value::String(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" | "" => Some(Value::Bool(false)),
            _ => None,
        },
        (Value::Number(_), Value::String(raw)) => {
            raw.trim().parse::<u64>().ok().map(Value::from)
        }
        (Value::String(_), Value::Number(number)) => Some(Value::String(number.to_string())),
        (Value::Array(_), Value::String(raw)) => Some(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        _ => None,
    }
}
