use std::io::Write;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.http.timeout_seconds = Some(10);
    raw.logging.level = Some("info".to_string());

    let overrides = Overrides {
        http_timeout_seconds: Some(3),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.http.timeout, Duration::from_secs(3));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_are_applied_when_nothing_is_configured() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(
        settings.http.timeout,
        Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
    );
    assert!(settings.site.url.is_none());
    assert!(settings.site.tenant.is_none());
    assert_eq!(settings.site.platform, DEFAULT_PLATFORM);
    assert_eq!(settings.site.platform_version, env!("CARGO_PKG_VERSION"));
    assert!(settings.store.options_file.is_none());
    assert!(settings.content.fixture.is_none());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = Overrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn invalid_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("level must parse");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}

#[test]
fn zero_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.http.timeout_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("timeout must be positive");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "http.timeout_seconds",
            ..
        }
    ));
}

#[test]
fn site_url_requires_a_host() {
    let mut raw = RawSettings::default();
    raw.site.url = Some("not a url".to_string());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.site.url = Some("https://blog.example.com/".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.site.url.as_ref().and_then(Url::host_str),
        Some("blog.example.com")
    );
}

#[test]
fn blank_site_url_is_treated_as_unset() {
    let mut raw = RawSettings::default();
    raw.site.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.site.url.is_none());
}

#[test]
fn platform_must_be_a_single_token() {
    let mut raw = RawSettings::default();
    raw.site.platform = Some("my platform".to_string());

    let err = Settings::from_raw(raw).expect_err("whitespace is rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "site.platform",
            ..
        }
    ));
}

#[test]
fn tenant_and_paths_flow_through_overrides() {
    let mut raw = RawSettings::default();
    let overrides = Overrides {
        tenant: Some(7),
        content_file: Some(PathBuf::from("fixtures/site.toml")),
        options_file: Some(PathBuf::from("state/options.toml")),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.site.tenant, Some(7));
    assert_eq!(
        settings.content.fixture.as_deref(),
        Some(std::path::Path::new("fixtures/site.toml"))
    );
    assert_eq!(
        settings.store.options_file.as_deref(),
        Some(std::path::Path::new("state/options.toml"))
    );
}

#[test]
fn config_file_is_layered_under_cli_overrides() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[http]\ntimeout_seconds = 5\n\n[site]\nurl = \"https://blog.example.com\"\ntenant = 3"
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from([
        "edgepurge",
        "--config-file",
        path.as_str(),
        "--tenant",
        "9",
        "purge-all",
    ]);

    let settings = load(&args).expect("settings load");
    assert_eq!(settings.http.timeout, Duration::from_secs(5));
    assert_eq!(settings.site.tenant, Some(9));
    assert!(settings.site.url.is_some());
}

#[test]
fn missing_config_file_fails_to_load() {
    let args = CliArgs::parse_from([
        "edgepurge",
        "--config-file",
        "/nonexistent/edgepurge-config.toml",
        "test-creds",
    ]);

    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}

#[test]
fn parses_tags_subcommands() {
    let args = CliArgs::parse_from(["edgepurge", "tags", "term", "5", "--taxonomy", "category"]);

    match args.command {
        Command::Tags(TagsArgs {
            object: TagsObject::Term { id, taxonomy },
        }) => {
            assert_eq!(id, 5);
            assert_eq!(taxonomy.as_deref(), Some("category"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_event_with_global_flags_after_subcommand() {
    let args = CliArgs::parse_from([
        "edgepurge",
        "event",
        "post",
        "42",
        "update",
        "--option",
        "purge_method=url",
        "--option",
        "hostname=www.example.com",
        "--log-json",
        "true",
    ]);

    assert_eq!(
        args.options,
        vec![
            "purge_method=url".to_string(),
            "hostname=www.example.com".to_string()
        ]
    );
    assert_eq!(args.overrides.log_json, Some(true));
    match args.command {
        Command::Event(EventArgs {
            event: EventCommand::Post { id, action },
        }) => {
            assert_eq!(id, 42);
            assert_eq!(action, "update");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn term_event_defaults_term_taxonomy_id() {
    let args = CliArgs::parse_from([
        "edgepurge",
        "event",
        "term",
        "5",
        "edit",
        "--taxonomy",
        "post_tag",
    ]);

    match args.command {
        Command::Event(EventArgs {
            event:
                EventCommand::Term {
                    id,
                    action,
                    taxonomy,
                    term_taxonomy_id,
                },
        }) => {
            assert_eq!(id, 5);
            assert_eq!(action, "edit");
            assert_eq!(taxonomy, "post_tag");
            assert_eq!(term_taxonomy_id, 0);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn purge_url_requires_at_least_one_url() {
    assert!(CliArgs::try_parse_from(["edgepurge", "purge-url"]).is_err());

    let args = CliArgs::parse_from([
        "edgepurge",
        "purge-url",
        "https://www.example.com/a/",
        "https://www.example.com/b/",
    ]);
    match args.command {
        Command::PurgeUrl(PurgeUrlArgs { urls }) => assert_eq!(urls.len(), 2),
        other => panic!("unexpected command: {other:?}"),
    }
}
