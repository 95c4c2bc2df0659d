//! Unit tests for manifest types and validation.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;

#[fixture]
fn disk_check() -> Value {
    json!({
        "name": "disk-check",
        "version": "1.0.0",
        "displayName": "Disk Check",
        "author": "acme",
        "license": "open-source",
        "checkers": [{"name": "low-space", "file": "check.js", "type": "disk"}]
    })
}

fn with_field(mut manifest: Value, field: &str, value: Value) -> Value {
    if let Some(object) = manifest.as_object_mut() {
        object.insert(field.to_owned(), value);
    }
    manifest
}

fn without_field(mut manifest: Value, field: &str) -> Value {
    if let Some(object) = manifest.as_object_mut() {
        object.remove(field);
    }
    manifest
}

// ---------------------------------------------------------------------------
// Accepted manifests
// ---------------------------------------------------------------------------

#[rstest]
fn minimal_manifest_is_accepted(disk_check: Value) {
    let manifest = validate(&disk_check).expect("valid manifest");
    assert_eq!(manifest.name(), "disk-check");
    assert_eq!(manifest.version(), "1.0.0");
    assert_eq!(manifest.display_name(), "Disk Check");
    assert_eq!(manifest.author(), "acme");
    assert_eq!(manifest.license(), LicenseKind::OpenSource);
    assert_eq!(manifest.checkers().len(), 1);
    let checker = manifest.checker("low-space").expect("checker present");
    assert_eq!(checker.file(), "check.js");
    assert_eq!(checker.kind(), "disk");
    assert!(checker.data_needs().is_empty());
    assert_eq!(manifest.entrypoint(), DEFAULT_ENTRYPOINT);
    assert!(manifest.capabilities().is_none());
}

#[rstest]
fn full_manifest_is_accepted(disk_check: Value) {
    let raw = with_field(
        with_field(
            with_field(
                with_field(
                    disk_check,
                    "capabilities",
                    json!({"network": ["api.acme.io"], "storage": true, "cron": "*/5 * * * *"}),
                ),
                "settings",
                json!({
                    "threshold": {"type": "number", "label": "Threshold (%)", "default": 90},
                    "mode": {"type": "select", "label": "Mode", "options": ["fast", "deep"]}
                }),
            ),
            "remediations",
            json!([{"name": "clean-tmp", "file": "clean.js"}]),
        ),
        "minPlatformVersion",
        json!("0.1.0"),
    );

    let manifest = validate(&raw).expect("valid manifest");
    let capabilities = manifest.capabilities().expect("capabilities");
    assert_eq!(capabilities.network, vec![String::from("api.acme.io")]);
    assert!(capabilities.storage);
    assert_eq!(manifest.remediations().len(), 1);
    assert_eq!(manifest.settings().len(), 2);
    assert_eq!(manifest.default_settings().get("threshold"), Some(&json!(90)));
    assert!(manifest.default_settings().get("mode").is_none());
}

#[rstest]
#[case::network_only(
    PackageCapabilities { network: vec![String::from("api.acme.io")], ..PackageCapabilities::default() },
    r#"{"network":["api.acme.io"]}"#
)]
#[case::flags_set(
    PackageCapabilities { storage: true, remediation: true, ..PackageCapabilities::default() },
    r#"{"storage":true,"remediation":true}"#
)]
#[case::nothing_requested(PackageCapabilities::default(), "{}")]
fn capabilities_encode_only_what_was_requested(
    #[case] capabilities: PackageCapabilities,
    #[case] expected: &str,
) {
    let encoded = serde_json::to_string(&capabilities).expect("serialise");
    assert_eq!(encoded, expected);
}

#[rstest]
#[case::single_digit("1.0.0")]
#[case::multi_digit("10.20.300")]
fn versions_matching_the_grammar_are_accepted(disk_check: Value, #[case] version: &str) {
    let raw = with_field(disk_check, "version", json!(version));
    assert!(validate(&raw).is_ok(), "version {version} should be accepted");
}

// ---------------------------------------------------------------------------
// Rejected manifests
// ---------------------------------------------------------------------------

#[rstest]
#[case::name("name")]
#[case::version("version")]
#[case::display_name("displayName")]
#[case::author("author")]
#[case::license("license")]
#[case::checkers("checkers")]
fn missing_required_field_is_reported(disk_check: Value, #[case] field: &str) {
    let errors = validate(&without_field(disk_check, field)).expect_err("invalid manifest");
    assert!(errors.has_field(field), "expected error for {field}: {errors}");
}

#[rstest]
fn simultaneous_omissions_are_reported_together(disk_check: Value) {
    let raw = without_field(without_field(without_field(disk_check, "name"), "author"), "license");
    let errors = validate(&raw).expect_err("invalid manifest");
    assert!(errors.has_field("name"));
    assert!(errors.has_field("author"));
    assert!(errors.has_field("license"));
    assert_eq!(errors.len(), 3, "{errors}");
}

#[rstest]
#[case::uppercase("Disk-Check")]
#[case::space("disk check")]
#[case::underscore("disk_check")]
#[case::empty("")]
fn names_outside_the_grammar_are_rejected(disk_check: Value, #[case] name: &str) {
    let errors = validate(&with_field(disk_check, "name", json!(name))).expect_err("invalid");
    assert!(errors.has_field("name"), "{errors}");
}

#[rstest]
#[case::two_parts(json!("1.0"))]
#[case::prerelease(json!("1.0.0-beta"))]
#[case::prefix(json!("v1.0.0"))]
#[case::number(json!(1))]
fn versions_outside_the_grammar_are_rejected(disk_check: Value, #[case] version: Value) {
    let errors = validate(&with_field(disk_check, "version", version)).expect_err("invalid");
    assert!(errors.has_field("version"), "{errors}");
}

#[rstest]
fn unknown_license_is_rejected(disk_check: Value) {
    let errors =
        validate(&with_field(disk_check, "license", json!("mit"))).expect_err("invalid license");
    assert!(errors.has_field("license"));
}

#[rstest]
fn empty_checker_list_is_rejected(disk_check: Value) {
    let errors = validate(&with_field(disk_check, "checkers", json!([]))).expect_err("invalid");
    assert!(errors.has_field("checkers"));
}

#[rstest]
fn checker_fields_are_validated_individually(disk_check: Value) {
    let raw = with_field(
        disk_check,
        "checkers",
        json!([
            {"name": "ok", "file": "ok.js", "type": "disk"},
            {"name": "Bad", "file": "", "dataNeeds": ["diskMetrics", "gpu"]}
        ]),
    );
    let errors = validate(&raw).expect_err("invalid checkers");
    assert!(errors.has_field("checkers[1].name"));
    assert!(errors.has_field("checkers[1].file"));
    assert!(errors.has_field("checkers[1].type"));
    assert!(errors.has_field("checkers[1].dataNeeds[1]"));
    assert!(!errors.has_field("checkers[0].name"));
}

#[rstest]
fn duplicate_checker_names_are_rejected(disk_check: Value) {
    let raw = with_field(
        disk_check,
        "checkers",
        json!([
            {"name": "low-space", "file": "a.js", "type": "disk"},
            {"name": "low-space", "file": "b.js", "type": "disk"}
        ]),
    );
    let errors = validate(&raw).expect_err("duplicate checkers");
    assert!(errors.has_field("checkers[1].name"), "{errors}");
}

#[rstest]
fn malformed_settings_and_capabilities_are_reported(disk_check: Value) {
    let raw = with_field(
        with_field(disk_check, "settings", json!({"threshold": {"type": "percent"}})),
        "capabilities",
        json!({"network": "everything", "storage": "yes"}),
    );
    let errors = validate(&raw).expect_err("invalid optional sections");
    assert!(errors.has_field("settings.threshold.type"));
    assert!(errors.has_field("settings.threshold.label"));
    assert!(errors.has_field("capabilities.network"));
    assert!(errors.has_field("capabilities.storage"));
}

#[test]
fn non_object_manifest_is_rejected() {
    let errors = validate(&json!(["not", "an", "object"])).expect_err("invalid");
    assert!(errors.has_field("$"));
}

#[test]
fn invalid_json_text_is_rejected() {
    let errors = validate_str("{ not json").expect_err("invalid");
    assert!(errors.has_field("$"));
    assert_eq!(errors.len(), 1);
}

// ---------------------------------------------------------------------------
// Platform compatibility
// ---------------------------------------------------------------------------

#[rstest]
#[case::older_host("0.9.9", Some("1.2.0"))]
#[case::same_host("1.2.0", None)]
#[case::newer_host("1.10.0", None)]
#[case::prerelease_host("1.2.0-rc.1", None)]
fn platform_requirement_compares_numerically(
    disk_check: Value,
    #[case] host: &str,
    #[case] expected: Option<&str>,
) {
    let raw = with_field(disk_check, "minPlatformVersion", json!("1.2.0"));
    let manifest = validate(&raw).expect("valid manifest");
    assert_eq!(manifest.requires_newer_platform(host), expected);
}

#[rstest]
fn manifests_without_requirement_run_anywhere(disk_check: Value) {
    let manifest = validate(&disk_check).expect("valid manifest");
    assert_eq!(manifest.requires_newer_platform("0.0.1"), None);
}

#[rstest]
#[case::open_source("\"open-source\"", LicenseKind::OpenSource)]
#[case::commercial("\"commercial\"", LicenseKind::Commercial)]
fn license_kind_uses_manifest_spelling(#[case] json: &str, #[case] expected: LicenseKind) {
    let parsed: LicenseKind = serde_json::from_str(json).expect("deserialise");
    assert_eq!(parsed, expected);
    assert_eq!(serde_json::to_string(&parsed).expect("serialise"), json);
}
