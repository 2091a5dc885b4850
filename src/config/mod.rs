//! Configuration layer: typed settings with layered precedence (file → env → CLI).
//!
//! Purge options live in their own store ([`crate::options`]); this module
//! only covers how the process runs.

mod cli;

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, EventArgs, EventCommand, Overrides, PurgeUrlArgs, TagsArgs, TagsObject,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepurge";
const ENV_PREFIX: &str = "EDGEPURGE";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PLATFORM: &str = "edgepurge-cli";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub http: HttpSettings,
    pub site: SiteSettings,
    pub store: StoreSettings,
    pub content: ContentSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub url: Option<Url>,
    pub tenant: Option<u64>,
    /// Platform name and version reported in the `User-Agent`.
    pub platform: String,
    pub platform_version: String,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub options_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    http: RawHttpSettings,
    site: RawSiteSettings,
    store: RawStoreSettings,
    content: RawContentSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.site_url.as_ref() {
            self.site.url = Some(url.clone());
        }
        if let Some(tenant) = overrides.tenant {
            self.site.tenant = Some(tenant);
        }
        if let Some(path) = overrides.content_file.as_ref() {
            self.content.fixture = Some(path.clone());
        }
        if let Some(path) = overrides.options_file.as_ref() {
            self.store.options_file = Some(path.clone());
        }
        if let Some(seconds) = overrides.http_timeout_seconds {
            self.http.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            http,
            site,
            store,
            content,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            http: build_http_settings(http)?,
            site: build_site_settings(site)?,
            store: StoreSettings {
                options_file: non_blank_path(store.options_file),
            },
            content: ContentSettings {
                fixture: non_blank_path(content.fixture),
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_http_settings(http: RawHttpSettings) -> Result<HttpSettings, LoadError> {
    let seconds = http.timeout_seconds.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
    if seconds == 0 {
        return Err(LoadError::invalid(
            "http.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(HttpSettings {
        timeout: Duration::from_secs(seconds),
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let url = match site.url.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => {
            let url = Url::parse(value)
                .map_err(|err| LoadError::invalid("site.url", format!("`{value}`: {err}")))?;
            if url.host_str().is_none() {
                return Err(LoadError::invalid("site.url", "URL must include a host"));
            }
            Some(url)
        }
        _ => None,
    };

    let platform = site
        .platform
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());
    if platform.contains(char::is_whitespace) || platform.contains('/') {
        return Err(LoadError::invalid(
            "site.platform",
            "must not contain whitespace or `/`",
        ));
    }
    let platform_version = site
        .platform_version
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    Ok(SiteSettings {
        url,
        tenant: site.tenant,
        platform,
        platform_version,
    })
}

fn non_blank_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|path| !path.as_os_str().is_empty())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHttpSettings {
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    url: Option<String>,
    tenant: Option<u64>,
    platform: Option<String>,
    platform_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    options_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    fixture: Option<PathBuf>,
}

#[cfg(test)]
mod tests;
