//! Schema validation over the on-disk fixture documents.

use std::path::PathBuf;

use scpigen::{SchemaValidator, Severity};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn valid_set_passes_with_no_diagnostics() {
    let report = SchemaValidator::new().validate_file(&fixture("valid_set.json"));
    assert!(report.passed(), "{:?}", report.diagnostics);
    assert!(report.diagnostics.is_empty());
}

#[test]
fn missing_commands_fails_with_a_single_root_error() {
    let report = SchemaValidator::new().validate_file(&fixture("missing_commands.json"));
    assert!(!report.passed());
    assert_eq!(report.error_count(), 1);
    let error = report
        .diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .expect("error diagnostic");
    assert_eq!(error.path, "$");
    assert!(error.message.contains("commands"));
}

#[test]
fn case_folded_duplicate_mnemonics_fail() {
    let report = SchemaValidator::new().validate_file(&fixture("duplicate_mnemonics.json"));
    assert!(!report.passed());
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error && d.message.contains("duplicate")));
    // The lowercase key also draws a non-canonical warning.
    assert!(report.warning_count() >= 1);
}

#[test]
fn unresolved_review_passes_with_warnings_only() {
    let report = SchemaValidator::new().validate_file(&fixture("needs_review.json"));
    assert!(report.passed(), "{:?}", report.diagnostics);
    assert!(report.warning_count() >= 1);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.message.contains("needs review")));
}

#[test]
fn unreadable_file_is_a_single_root_error() {
    let report = SchemaValidator::new().validate_file(&fixture("does_not_exist.json"));
    assert!(!report.passed());
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].path, "$");
}

#[test]
fn syntactically_invalid_json_is_a_single_root_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").expect("write");

    let report = SchemaValidator::new().validate_file(&path);
    assert!(!report.passed());
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].message.contains("invalid JSON"));
}
