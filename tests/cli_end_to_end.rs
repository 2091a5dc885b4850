use std::io::Write;

use assert_cmd::Command;
use httpmock::MockServer;
use predicates::str::contains;
use tempfile::NamedTempFile;

const CONTENT: &str = r#"
site_url = "https://www.example.com"

[[taxonomies]]
name = "category"
hierarchical = true
post_types = ["post"]

[[posts]]
id = 42
author_id = 7
slug = "hello-world"
terms = [3]

[[terms]]
id = 3
taxonomy = "category"
slug = "news"

[[users]]
id = 7
slug = "ada"
"#;

fn content_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tmp file");
    file.write_all(CONTENT.as_bytes()).expect("write content");
    file
}

fn edgepurge() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("edgepurge"));
    cmd.env_remove("EDGEPURGE_AUTHORIZATION")
        .env_remove("EDGEPURGE_CONFIG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn tags_for_post_are_printed_as_json() {
    let content = content_file();
    let assert = edgepurge()
        .arg("--content-file")
        .arg(content.path())
        .args(["--option", "unique-sitecode=shop"])
        .args(["tags", "post", "42"])
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    let report: serde_json::Value = serde_json::from_str(&output).expect("json output");
    let purge = report["purge"].as_array().expect("purge tags");
    assert!(purge.iter().any(|tag| tag == "shop-p-42"));
    assert!(purge.iter().any(|tag| tag == "shop-a-7"));
    assert!(purge.iter().any(|tag| tag == "shop-tm-home"));
    assert_eq!(report["emit"][0], "shop");
    assert_eq!(report["header"]["name"], "Edge-Cache-Tag");
}

#[test]
fn unknown_object_fails() {
    let content = content_file();
    edgepurge()
        .arg("--content-file")
        .arg(content.path())
        .args(["tags", "post", "999"])
        .assert()
        .failure()
        .stderr(contains("post 999 not found"));
}

#[test]
fn event_sends_purge_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/ccu/v3/invalidate/tag/staging")
            .header("authorization", "EG1-HMAC-SHA256 cli");
        then.status(201)
            .header("content-type", "application/json")
            .body(r#"{"httpStatus":201,"purgeId":"abc-123"}"#);
    });

    let content = content_file();
    let host = format!("credentials.host={}", server.base_url());
    let assert = edgepurge()
        .arg("--content-file")
        .arg(content.path())
        .args(["--authorization", "EG1-HMAC-SHA256 cli"])
        .args(["--option", host.as_str()])
        .args(["--option", "credentials.access-token=akab-access"])
        .args(["--option", "credentials.client-token=akab-client"])
        .args(["--option", "credentials.client-secret=secret"])
        .args(["--option", "purge-network=staging"])
        .args(["event", "post", "42", "update"])
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(output.contains("\"outcome\": \"sent\""), "{output}");
    mock.assert();
}

#[test]
fn missing_credentials_fail_fast() {
    edgepurge()
        .arg("test-creds")
        .assert()
        .failure()
        .stderr(contains("Bad client"));
}
