use std::{process, sync::Arc};

use edgepurge::{
    config::{self, CliArgs, Command, EventCommand, Settings, TagsObject},
    content::{ContentSource, InMemoryContent, ObjectRef},
    error::AppError,
    infra::{http::ReqwestTransport, telemetry},
    options::OptionsStore,
    purge::{
        CACHE_TAG_HEADER, PurgeClient, PurgeOutcome, PurgePipeline, PurgeResponse, RequestScope,
        Signer, StaticAuthorization, emit_header_value, user_agent,
    },
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let pipeline = build_pipeline(&cli_args, &settings)?;
    info!(
        tenant = ?settings.site.tenant,
        prefix = %pipeline.tags().site_prefix(),
        "Purge pipeline ready"
    );

    match cli_args.command {
        Command::Tags(args) => run_tags(&pipeline, args.object),
        Command::Event(args) => run_event(&pipeline, args.event).await,
        Command::PurgeAll => report_response(pipeline.purge_all().await),
        Command::PurgeUrl(args) => report_response(pipeline.purge_urls(&args.urls).await),
        Command::TestCreds => report_response(pipeline.test_creds().await),
    }
}

fn build_pipeline(cli_args: &CliArgs, settings: &Settings) -> Result<PurgePipeline, AppError> {
    let mut content = match settings.content.fixture.as_deref() {
        Some(path) => InMemoryContent::from_path(path)?,
        None => InMemoryContent::default(),
    };
    if let Some(url) = settings.site.url.clone() {
        content = content.with_site_url(url);
    }

    let mut store = OptionsStore::new().with_site_url(settings.site.url.clone());
    if let Some(path) = settings.store.options_file.as_deref() {
        store = store.with_persisted_path(path)?;
    }
    for raw in &cli_args.options {
        store.apply_override_str(raw)?;
    }
    let options = store.get_settings();

    let signer = cli_args
        .authorization
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Arc::new(StaticAuthorization::new(value)) as Arc<dyn Signer>);
    let transport = Arc::new(ReqwestTransport::new(&settings.http)?);
    let client = PurgeClient::new(&options.credentials, signer, transport).with_user_agent(
        user_agent(&settings.site.platform, &settings.site.platform_version),
    );

    let content: Arc<dyn ContentSource> = Arc::new(content);
    Ok(PurgePipeline::builder(options, content, client)
        .tenant(settings.site.tenant)
        .build())
}

#[derive(Debug, Serialize)]
struct TagsReport {
    object: ObjectRef,
    purge: Vec<String>,
    emit: Vec<String>,
    header: HeaderReport,
}

#[derive(Debug, Serialize)]
struct HeaderReport {
    name: &'static str,
    value: String,
}

fn run_tags(pipeline: &PurgePipeline, object: TagsObject) -> Result<(), AppError> {
    let tags = pipeline.tags();
    let content = tags.content();
    let related = pipeline.options().cache_related_tags;

    let (object, purge, emit) = match object {
        TagsObject::Post { id } => {
            let post = content
                .post(id)
                .ok_or_else(|| AppError::not_found(format!("post {id}")))?;
            (
                ObjectRef::post(id),
                tags.tags_for_purge_post(&post, related, true),
                tags.tags_for_emit_post(&post),
            )
        }
        TagsObject::Term { id, taxonomy } => {
            let term = content
                .term(id, taxonomy.as_deref())
                .ok_or_else(|| AppError::not_found(format!("term {id}")))?;
            (
                ObjectRef::term(id),
                tags.tags_for_purge_term(&term, taxonomy.as_deref(), related, true),
                tags.tags_for_emit_term(&term, taxonomy.as_deref()),
            )
        }
        TagsObject::User { id } => {
            let user = content
                .user(id)
                .ok_or_else(|| AppError::not_found(format!("user {id}")))?;
            (
                ObjectRef::user(id),
                tags.tags_for_purge_user(&user, related, true),
                tags.tags_for_emit_user(&user),
            )
        }
    };

    let header = HeaderReport {
        name: CACHE_TAG_HEADER,
        value: emit_header_value(&emit),
    };
    print_json(&TagsReport {
        object,
        purge,
        emit,
        header,
    })
}

async fn run_event(pipeline: &PurgePipeline, event: EventCommand) -> Result<(), AppError> {
    let mut scope = RequestScope::new();
    let outcome = match event {
        EventCommand::Post { id, action } => pipeline.post_changed(&mut scope, id, &action).await,
        EventCommand::Term {
            id,
            action,
            taxonomy,
            term_taxonomy_id,
        } => {
            pipeline
                .term_changed(&mut scope, id, &action, term_taxonomy_id, &taxonomy)
                .await
        }
        EventCommand::User { id, action } => pipeline.user_changed(&mut scope, id, &action).await,
    };

    print_json(&outcome)?;
    match &outcome {
        PurgeOutcome::Sent { response, .. } => ensure_success(response),
        _ => Ok(()),
    }
}

fn report_response(response: PurgeResponse) -> Result<(), AppError> {
    print_json(&response)?;
    ensure_success(&response)
}

fn ensure_success(response: &PurgeResponse) -> Result<(), AppError> {
    match response.error() {
        None => Ok(()),
        Some(error) => Err(AppError::purge_failed(error)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
