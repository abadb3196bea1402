use assert_cmd::prelude::*;
use serde_json::Value;
use std::io::Write;
use std::process::Command;

fn stonks() -> Command {
    let mut cmd = Command::cargo_bin("stonks").expect("stonks binary built");
    for key in [
        "STONKS_COLLECTOR_URL",
        "STONKS_TRACK_LOCALHOST_AS",
        "STONKS_HASH_ROUTING",
        "STONKS_AUTOCOLLECT",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(&stdout).expect("valid JSON output")
}

#[test]
fn compose_prints_envelope_and_image_url() {
    let payload = json_output(stonks().args([
        "--output",
        "json",
        "compose",
        "--url",
        "https://example.com/pricing/?utm_source=cli",
        "--prop",
        "plan:pro",
    ]));

    assert_eq!(payload["collector"], "https://collector.onedollarstats.com/events");
    assert_eq!(payload["envelope"]["u"], "https://example.com/pricing");
    assert_eq!(payload["envelope"]["e"][0]["t"], "PageView");
    assert_eq!(payload["envelope"]["e"][0]["p"]["plan"], "pro");
    assert_eq!(payload["envelope"]["qs"]["utm_source"], "cli");
    let image = payload["imageUrl"].as_str().expect("image url present");
    assert!(image.starts_with("https://collector.onedollarstats.com/events?data="));
}

#[test]
fn compose_custom_event_with_localhost_stand_in() {
    let payload = json_output(stonks().args([
        "--output",
        "json",
        "compose",
        "--url",
        "http://localhost:8080/signup",
        "--event",
        "signup",
        "--track-localhost-as",
        "staging.example",
    ]));

    assert_eq!(payload["envelope"]["u"], "http://staging.example:8080/signup");
    assert_eq!(payload["envelope"]["debug"], true);
    assert!(payload["envelope"].get("qs").is_none());
}

#[test]
fn compose_reports_suppressed_localhost() {
    let payload = json_output(stonks().args([
        "--output",
        "json",
        "compose",
        "--url",
        "http://127.0.0.1:3000/",
    ]));
    assert_eq!(payload["suppressed"], true);
}

#[test]
fn compose_reads_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"collectorUrl": "https://collector.example/e", "hashRouting": true}}"#
    )
    .unwrap();

    let payload = json_output(stonks().args([
        "--config",
        file.path().to_str().unwrap(),
        "--output",
        "json",
        "compose",
        "--url",
        "https://example.com/#/inbox",
    ]));
    assert_eq!(payload["collector"], "https://collector.example/e");
    assert_eq!(payload["envelope"]["e"][0]["h"], true);
}

#[test]
fn rejects_relative_url() {
    stonks()
        .args(["compose", "--url", "/just/a/path"])
        .assert()
        .failure();
}

#[test]
fn version_prints_build_info() {
    let assert = stonks().arg("version").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with(&format!("stonks {}", env!("CARGO_PKG_VERSION"))));
    assert!(stdout.contains("commit:"));
}
