use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use edgepurge::{
    config::HttpSettings,
    content::{ContentSource, InMemoryContent},
    infra::http::ReqwestTransport,
    options::OptionsStore,
    purge::{PurgeClient, PurgePipeline, RequestScope, Signer, StaticAuthorization},
};
use httpmock::MockServer;
use metrics_util::debugging::DebuggingRecorder;

#[tokio::test]
async fn purge_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST");
            then.status(201).body("{}");
        })
        .await;

    let options = OptionsStore::new()
        .with_persisted_toml(&format!(
            "unique-sitecode = \"shop\"\n\n[credentials]\nhost = \"{}\"\naccess-token = \"a\"\nclient-token = \"c\"\nclient-secret = \"s\"\n",
            server.base_url()
        ))
        .expect("options parse")
        .get_settings();
    let content: Arc<dyn ContentSource> = Arc::new(
        InMemoryContent::from_toml_str("[[posts]]\nid = 42\nslug = \"hello\"\n")
            .expect("content parses"),
    );
    let transport = Arc::new(
        ReqwestTransport::new(&HttpSettings {
            timeout: Duration::from_secs(5),
        })
        .expect("transport builds"),
    );
    let signer: Arc<dyn Signer> = Arc::new(StaticAuthorization::new("EG1-HMAC-SHA256 metrics"));
    let client = PurgeClient::new(&options.credentials, Some(signer), transport);
    let pipeline = PurgePipeline::builder(options, content, client).build();

    // Sent, then skipped as already fired, then skipped as missing.
    let mut scope = RequestScope::new();
    let sent = pipeline.post_changed(&mut scope, 42, "update").await;
    assert!(sent.response().is_some_and(|response| response.success()));
    assert!(
        pipeline
            .post_changed(&mut scope, 42, "update")
            .await
            .skip_reason()
            .is_some()
    );
    assert!(
        pipeline
            .post_changed(&mut RequestScope::new(), 404, "update")
            .await
            .skip_reason()
            .is_some()
    );

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "edgepurge_purge_requests_total",
        "edgepurge_purge_request_ms",
        "edgepurge_purge_skipped_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
