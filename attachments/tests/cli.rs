use std::fs;
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

fn attachments() -> Command {
    let mut cmd = Command::cargo_bin("attachments").expect("Binary exists");
    for key in [
        "ATTACHMENTS_API_KEY",
        "ATTACHMENTS_PREFER",
        "ATTACHMENTS_SERVICE_URL",
        "ATTACHMENTS_CONCURRENCY",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn deps_prints_capability_report() {
    let output = attachments().arg("deps").assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&output).expect("deps prints JSON");
    assert_eq!(report["text"], true);
    assert_eq!(report["service"], true);
    assert!(report["pdf"].is_boolean());
}

#[test]
fn unpack_lists_names_and_sizes() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "abc").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/b.md"), "# title").unwrap();
    fs::create_dir(dir.path().join("__pycache__")).unwrap();
    fs::write(dir.path().join("__pycache__/skip.pyc"), "x").unwrap();

    attachments()
        .arg("unpack")
        .arg(dir.path())
        .assert()
        .success()
        .stdout("a.txt\t3\nsub/b.md\t7\n");
}

#[test]
fn att_prints_artifacts_as_json() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("hello.txt");
    fs::write(&file, "Hello world!\n").unwrap();

    let output = attachments()
        .args(["att", "--prefer", "local-only", "--compact"])
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let artifacts: Value = serde_json::from_slice(&output).expect("att prints JSON");
    assert_eq!(artifacts[0]["text"], "Hello world!\n");
    assert_eq!(artifacts[0]["flags"]["source"], "hello.txt");
    assert_eq!(artifacts[0]["images"], serde_json::json!([]));
}

#[test]
fn att_reports_unsupported_input_as_data() {
    attachments()
        .args(["att", "--prefer", "local-only", "/no/such/input.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unpack failed"));
}

#[test]
fn unpack_of_missing_input_fails() {
    attachments()
        .args(["unpack", "/no/such/input.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported or non-existent input"));
}

#[test]
fn malformed_option_is_rejected() {
    attachments()
        .args(["att", "whatever", "--option", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn invalid_prefer_is_a_usage_error() {
    attachments()
        .args(["att", "x", "--prefer", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid prefer value"));
}

/// Collects the `Debug` rendering of every event.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

#[tokio::test]
async fn run_emits_trace_initialised_event() {
    use attachments::cli::{run, Cli, Commands};

    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = Registry::default().with(EventCollector {
        events: events.clone(),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    run(Cli {
        command: Commands::Deps,
    })
    .await
    .expect("deps never fails");

    let events = events.lock().unwrap();
    assert!(
        events.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {events:?}"
    );
}
