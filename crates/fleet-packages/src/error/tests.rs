//! Unit tests for package error types.

use std::path::PathBuf;
use std::time::Duration;

use rstest::rstest;

use super::*;

#[test]
fn manifest_errors_render_every_field() {
    let mut errors = ManifestErrors::single("name", "must not be empty");
    errors.push("checkers", "must contain at least one checker");

    let message = errors.to_string();
    assert!(message.contains("name: must not be empty"), "{message}");
    assert!(message.contains("checkers: must contain"), "{message}");
    assert_eq!(errors.len(), 2);
    assert!(errors.has_field("checkers"));
    assert!(!errors.has_field("version"));
}

#[test]
fn already_loaded_names_the_package() {
    let error = PackageError::AlreadyLoaded {
        name: String::from("disk-check"),
    };
    let message = error.to_string();
    assert!(message.contains("disk-check"), "{message}");
    assert!(message.contains("already loaded"), "{message}");
}

#[rstest]
#[case::signal(None, "signal")]
#[case::code(Some(137), "137")]
fn unexpected_exit_renders_status(#[case] status: Option<i32>, #[case] expected: &str) {
    let error = WorkerError::UnexpectedExit {
        package: String::from("acme"),
        status,
    };
    let message = error.to_string();
    assert!(message.contains(expected), "{message}");
    assert!(message.contains("acme"), "{message}");
}

#[test]
fn request_timeout_includes_method_and_id() {
    let error = WorkerError::RequestTimeout {
        package: String::from("acme"),
        method: String::from("analyze"),
        request_id: 7,
        timeout: Duration::from_secs(30),
    };
    let message = error.to_string();
    assert!(message.contains("analyze"), "{message}");
    assert!(message.contains("request 7"), "{message}");
    assert!(message.contains("30s"), "{message}");
}

#[test]
fn worker_errors_convert_into_package_errors() {
    let error: PackageError = WorkerError::NotRunning {
        package: String::from("acme"),
    }
    .into();
    assert!(matches!(error, PackageError::Worker(WorkerError::NotRunning { .. })));
    assert!(error.to_string().contains("not running"));
}

#[test]
fn manifest_error_mentions_directory() {
    let error = PackageError::Manifest {
        path: PathBuf::from("/var/lib/fleet/packages/broken"),
        errors: ManifestErrors::single("version", "must match x.y.z"),
    };
    let message = error.to_string();
    assert!(message.contains("/var/lib/fleet/packages/broken"), "{message}");
    assert!(message.contains("version: must match x.y.z"), "{message}");
}
