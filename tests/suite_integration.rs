//! End-to-end Setup/Main/Teardown skip-on-failure propagation, exercised
//! through the real document loader (`json5` parse, `Suite` construction)
//! and `bash://` requests so the behavior is deterministic without a
//! network dependency.

use httpbench::loader;
use httpbench::registry;
use httpbench::suite::SuiteRunner;

fn write_doc(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn setup_failure_skips_main_but_still_runs_teardown() {
    registry::register_builtins();
    let dir = tempfile::tempdir().unwrap();

    let doc = r#"{
        Name: "skip-on-setup-failure",
        Setup: [
            { Test: { Name: "setup-pass", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
            { Test: { Name: "setup-fail", Request: { Url: "bash://exit 1" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
        ],
        Main: [
            { Test: { Name: "main-1", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
            { Test: { Name: "main-2", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
        ],
        Teardown: [
            { Test: { Name: "teardown-pass", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
            { Test: { Name: "teardown-fail", Request: { Url: "bash://exit 1" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
        ],
    }"#;
    let path = write_doc(dir.path(), "suite.json5", doc);

    let mut suite = loader::load_suite(&path).expect("suite should load");
    let result = SuiteRunner::new().run(&mut suite).await;

    assert_eq!(result.setup[0].test.status, httpbench::engine::model::Status::Pass);
    assert_eq!(result.setup[1].test.status, httpbench::engine::model::Status::Fail);

    // Main is entirely skipped once Setup produced a non-Pass result.
    assert_eq!(
        result.main[0].test.status,
        httpbench::engine::model::Status::Skipped
    );
    assert_eq!(
        result.main[1].test.status,
        httpbench::engine::model::Status::Skipped
    );

    // Teardown always runs regardless of what happened upstream.
    assert_eq!(
        result.teardown[0].test.status,
        httpbench::engine::model::Status::Pass
    );
    assert_eq!(
        result.teardown[1].test.status,
        httpbench::engine::model::Status::Fail
    );

    assert_eq!(result.status, httpbench::engine::model::Status::Fail);
}

#[tokio::test]
async fn all_phases_pass_when_every_element_passes() {
    registry::register_builtins();
    let dir = tempfile::tempdir().unwrap();

    let doc = r#"{
        Name: "all-green",
        Setup: [
            { Test: { Name: "setup", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
        ],
        Main: [
            { Test: { Name: "main", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
        ],
        Teardown: [
            { Test: { Name: "teardown", Request: { Url: "bash://exit 0" },
                      Checks: [{ type: "StatusCode", expected: 200 }] } },
        ],
    }"#;
    let path = write_doc(dir.path(), "suite.json5", doc);

    let mut suite = loader::load_suite(&path).expect("suite should load");
    let result = SuiteRunner::new().run(&mut suite).await;

    assert_eq!(result.status, httpbench::engine::model::Status::Pass);
}

#[tokio::test]
async fn suite_file_element_loads_from_a_separate_document() {
    registry::register_builtins();
    let dir = tempfile::tempdir().unwrap();

    write_doc(
        dir.path(),
        "ping.json5",
        r#"{ Name: "ping", Request: { Url: "bash://exit 0" },
             Checks: [{ type: "StatusCode", expected: 200 }] }"#,
    );

    let suite_doc = r#"{
        Name: "file-element-suite",
        Main: [ { File: "ping.json5" } ],
    }"#;
    let path = write_doc(dir.path(), "suite.json5", suite_doc);

    let mut suite = loader::load_suite(&path).expect("suite should load");
    let result = SuiteRunner::new().run(&mut suite).await;

    assert_eq!(result.main.len(), 1);
    assert_eq!(result.main[0].test.name, "ping");
    assert_eq!(result.status, httpbench::engine::model::Status::Pass);
}

/// A Setup element extracts a value into the global scope; a later Main
/// Check references it via `{{...}}` in one of its own string fields
/// (not the Request) and must see the interpolated value, not the
/// literal token.
#[tokio::test]
async fn check_string_fields_see_values_extracted_earlier_in_the_suite() {
    registry::register_builtins();
    let dir = tempfile::tempdir().unwrap();

    let doc = r#"{
        Name: "extractor-propagation",
        Setup: [
            { Test: { Name: "mint-token", Request: { Url: "bash://echo token-abc123" },
                      Checks: [{ type: "StatusCode", expected: 200 }],
                      DataExtraction: { token: { type: "Body", pattern: "token-(\\w+)", group: 1 } } } },
        ],
        Main: [
            { Test: { Name: "uses-token", Request: { Url: "bash://echo token-abc123" },
                      Checks: [{ type: "BodyContains", text: "{{token}}", count: 1 }] } },
        ],
    }"#;
    let path = write_doc(dir.path(), "suite.json5", doc);

    let mut suite = loader::load_suite(&path).expect("suite should load");
    let result = SuiteRunner::new().run(&mut suite).await;

    assert_eq!(result.setup[0].test.status, httpbench::engine::model::Status::Pass);
    assert_eq!(result.main[0].test.status, httpbench::engine::model::Status::Pass);
    assert_eq!(result.status, httpbench::engine::model::Status::Pass);
}
