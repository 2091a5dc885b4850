use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the edgepurge binary.
#[derive(Debug, Parser)]
#[command(name = "edgepurge", version, about = "Cache-tag purge coordinator")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "EDGEPURGE_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    /// Option override applied on top of the options store; repeatable.
    #[arg(long = "option", value_name = "KEY=VALUE", global = true)]
    pub options: Vec<String>,

    /// Pre-computed `Authorization` header value for API requests.
    #[arg(
        long = "authorization",
        env = "EDGEPURGE_AUTHORIZATION",
        value_name = "VALUE",
        hide_env_values = true,
        global = true
    )]
    pub authorization: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for deployment settings; highest precedence.
#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the site URL used for permalinks and the default hostname.
    #[arg(long = "site-url", value_name = "URL", global = true)]
    pub site_url: Option<String>,

    /// Run in multi-tenant mode as this tenant.
    #[arg(long = "tenant", value_name = "ID", global = true)]
    pub tenant: Option<u64>,

    /// Override the content fixture path.
    #[arg(
        long = "content-file",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub content_file: Option<PathBuf>,

    /// Override the persisted options file path.
    #[arg(
        long = "options-file",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub options_file: Option<PathBuf>,

    /// Override the API request timeout.
    #[arg(long = "http-timeout-seconds", value_name = "SECONDS", global = true)]
    pub http_timeout_seconds: Option<u64>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print purge and emitted tags for an object.
    Tags(TagsArgs),
    /// Run one change event through the purge pipeline.
    Event(EventArgs),
    /// Purge every object of the site.
    #[command(name = "purge-all")]
    PurgeAll,
    /// Purge explicit URLs.
    #[command(name = "purge-url")]
    PurgeUrl(PurgeUrlArgs),
    /// Check that the configured credentials authenticate.
    #[command(name = "test-creds")]
    TestCreds,
}

#[derive(Debug, Args, Clone)]
pub struct TagsArgs {
    #[command(subcommand)]
    pub object: TagsObject,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TagsObject {
    Post {
        id: u64,
    },
    Term {
        id: u64,
        /// Taxonomy the term must belong to.
        #[arg(long)]
        taxonomy: Option<String>,
    },
    User {
        id: u64,
    },
}

#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    #[command(subcommand)]
    pub event: EventCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum EventCommand {
    Post {
        id: u64,
        action: String,
    },
    Term {
        id: u64,
        action: String,
        #[arg(long)]
        taxonomy: String,
        #[arg(long = "term-taxonomy-id", default_value_t = 0)]
        term_taxonomy_id: u64,
    },
    User {
        id: u64,
        action: String,
    },
}

#[derive(Debug, Args, Clone)]
pub struct PurgeUrlArgs {
    /// URLs to purge.
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,
}
