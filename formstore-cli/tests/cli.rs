//! End-to-end tests of the CLI library entry points.

use std::io::Write;

use formstore_cli::{evaluate, render, run, CliArgs};
use serde_json::json;
use tempfile::NamedTempFile;

const SCHEMA: &str = r#"{
    "domains": [
        { "name": "DO_EMAIL", "validators": [{ "type": "email", "message": "Bad email" }] }
    ],
    "entities": [
        {
            "name": "Person",
            "fields": [
                { "type": "field", "name": "firstName", "required": true },
                { "type": "field", "name": "email", "domain": "DO_EMAIL" },
                { "type": "recursive-list", "name": "children" }
            ]
        }
    ]
}"#;

fn file_with(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

// ============================================================================
// evaluate
// ============================================================================

#[test]
fn test_valid_record() {
    let report = evaluate(SCHEMA, "Person", &json!({ "firstName": "Ada" }), true).expect("report");
    assert!(report.valid);
    assert!(report.errors.is_empty());
    assert_eq!(report.values, json!({ "firstName": "Ada", "children": [] }));
}

#[test]
fn test_invalid_record_in_edit_mode() {
    let record = json!({ "email": "nope", "children": [{ "firstName": "B" }] });
    let report = evaluate(SCHEMA, "Person", &record, true).expect("report");
    assert!(!report.valid);

    let rendered: serde_json::Value =
        serde_json::from_str(&render(&report, false).expect("render")).expect("json");
    assert_eq!(
        rendered["errors"],
        json!({ "firstName": "Field is required", "email": "Bad email" })
    );
}

#[test]
fn test_read_mode_reports_no_errors() {
    let report = evaluate(SCHEMA, "Person", &json!({}), false).expect("report");
    assert!(report.valid);
}

#[test]
fn test_unknown_entity_and_bad_record() {
    let err = evaluate(SCHEMA, "Robot", &json!({}), true).expect_err("unknown entity");
    assert!(err.to_string().contains("Robot"));

    assert!(evaluate(SCHEMA, "Person", &json!({ "children": "x" }), true).is_err());
}

#[test]
fn test_domain_required_rule_from_document() {
    let schema = r#"{
        "domains": [
            { "name": "DO_CODE", "validators": [{ "type": "required", "message": "Code needed" }] }
        ],
        "entities": [
            { "name": "Item", "fields": [{ "type": "field", "name": "code", "domain": "DO_CODE" }] }
        ]
    }"#;

    let report = evaluate(schema, "Item", &json!({ "code": "" }), true).expect("report");
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);

    let rendered: serde_json::Value =
        serde_json::from_str(&render(&report, false).expect("render")).expect("json");
    assert_eq!(rendered["errors"], json!({ "code": "Code needed" }));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn test_run_reads_files() {
    let schema = file_with(SCHEMA);
    let data = file_with(r#"{ "firstName": "Ada", "email": "ada@example.org" }"#);
    let args = CliArgs {
        schema: schema.path().to_path_buf(),
        entity: "Person".to_string(),
        data: Some(data.path().to_path_buf()),
        edit: true,
        pretty: true,
    };

    let report = run(&args).expect("report");
    assert!(report.valid);
    assert!(render(&report, true).expect("render").contains('\n'));
}

#[test]
fn test_run_missing_file() {
    let args = CliArgs {
        schema: "/nonexistent/schema.json".into(),
        entity: "Person".to_string(),
        data: None,
        edit: false,
        pretty: false,
    };
    let err = run(&args).expect_err("missing schema");
    assert!(err.to_string().contains("failed to read"));
}
