//! Manifest validation against the package grammar.
//!
//! Validation walks the raw JSON value rather than deserialising directly so
//! that every violation can be reported in one pass. Only once the grammar is
//! satisfied is the value deserialised into a [`PackageManifest`].

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::{DataNeed, LicenseKind, PackageManifest, SettingType};
use crate::error::ManifestErrors;

/// Validates a parsed manifest value.
///
/// # Errors
///
/// Returns every violation found, each tagged with its field path.
///
/// # Example
///
/// ```
/// use fleet_packages::manifest::validate;
/// use serde_json::json;
///
/// let errors = validate(&json!({"name": "Bad Name"})).expect_err("invalid");
/// assert!(errors.has_field("name"));
/// assert!(errors.has_field("version"));
/// assert!(errors.has_field("checkers"));
/// ```
pub fn validate(raw: &Value) -> Result<PackageManifest, ManifestErrors> {
    let mut errors = ManifestErrors::default();
    let Some(object) = raw.as_object() else {
        return Err(ManifestErrors::single("$", "manifest must be a JSON object"));
    };

    check_identifier(&mut errors, "name", object.get("name"));
    check_version(&mut errors, "version", object.get("version"), true);
    check_text(&mut errors, "displayName", object.get("displayName"));
    check_text(&mut errors, "author", object.get("author"));
    check_license(&mut errors, object.get("license"));
    check_optional_text(&mut errors, "description", object.get("description"));
    check_version(
        &mut errors,
        "minPlatformVersion",
        object.get("minPlatformVersion"),
        false,
    );
    if object.contains_key("entrypoint") {
        check_text(&mut errors, "entrypoint", object.get("entrypoint"));
    }
    check_capabilities(&mut errors, object.get("capabilities"));
    check_checkers(&mut errors, object.get("checkers"));
    check_remediations(&mut errors, object.get("remediations"));
    check_settings(&mut errors, object.get("settings"));

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value(raw.clone())
        .map_err(|error| ManifestErrors::single("$", error.to_string()))
}

/// Parses and validates manifest text.
///
/// # Errors
///
/// Returns a single `$` violation when the text is not JSON, otherwise the
/// violations reported by [`validate`].
pub fn validate_str(text: &str) -> Result<PackageManifest, ManifestErrors> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|error| ManifestErrors::single("$", format!("invalid JSON: {error}")))?;
    validate(&raw)
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-')
}

fn is_version(value: &str) -> bool {
    let mut parts = value.split('.');
    let well_formed = (0..3).all(|_| {
        parts
            .next()
            .is_some_and(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    });
    well_formed && parts.next().is_none()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
}

fn check_identifier(errors: &mut ManifestErrors, field: &str, value: Option<&Value>) {
    match value.and_then(Value::as_str) {
        None => errors.push(field, "is required and must be a string"),
        Some(text) if !is_identifier(text) => errors.push(
            field,
            format!("'{text}' must contain only lowercase letters, digits and dashes"),
        ),
        Some(_) => {}
    }
}

fn check_version(errors: &mut ManifestErrors, field: &str, value: Option<&Value>, required: bool) {
    match value {
        None | Some(Value::Null) if !required => {}
        None => errors.push(field, "is required and must be a string"),
        Some(value) => match value.as_str() {
            Some(text) if is_version(text) => {}
            Some(text) => errors.push(field, format!("'{text}' must match MAJOR.MINOR.PATCH")),
            None => errors.push(field, "must be a string"),
        },
    }
}

fn check_text(errors: &mut ManifestErrors, field: &str, value: Option<&Value>) {
    if non_empty_str(value).is_none() {
        errors.push(field, "is required and must be a non-empty string");
    }
}

fn check_optional_text(errors: &mut ManifestErrors, field: &str, value: Option<&Value>) {
    if matches!(value, Some(v) if !v.is_null() && !v.is_string()) {
        errors.push(field, "must be a string");
    }
}

fn check_license(errors: &mut ManifestErrors, value: Option<&Value>) {
    let accepted = value
        .and_then(Value::as_str)
        .and_then(LicenseKind::parse)
        .is_some();
    if !accepted {
        errors.push("license", "must be either 'open-source' or 'commercial'");
    }
}

fn check_capabilities(errors: &mut ManifestErrors, value: Option<&Value>) {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return;
    };
    let Some(object) = value.as_object() else {
        errors.push("capabilities", "must be an object");
        return;
    };
    if let Some(network) = object.get("network") {
        let domains_ok = network
            .as_array()
            .is_some_and(|items| items.iter().all(|item| non_empty_str(Some(item)).is_some()));
        if !domains_ok {
            errors.push("capabilities.network", "must be a list of domain names");
        }
    }
    for flag in ["storage", "remediation"] {
        if object.get(flag).is_some_and(|v| !v.is_boolean()) {
            errors.push(format!("capabilities.{flag}"), "must be a boolean");
        }
    }
    if object.get("cron").is_some_and(|v| !v.is_null() && !v.is_string()) {
        errors.push("capabilities.cron", "must be a cron expression string");
    }
}

fn check_checkers(errors: &mut ManifestErrors, value: Option<&Value>) {
    let Some(entries) = value.and_then(Value::as_array) else {
        errors.push("checkers", "is required and must be an array");
        return;
    };
    if entries.is_empty() {
        errors.push("checkers", "must declare at least one checker");
        return;
    }

    let mut seen = BTreeSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let prefix = format!("checkers[{index}]");
        let Some(object) = entry.as_object() else {
            errors.push(prefix, "must be an object");
            continue;
        };
        check_identifier(errors, &format!("{prefix}.name"), object.get("name"));
        check_text(errors, &format!("{prefix}.file"), object.get("file"));
        check_text(errors, &format!("{prefix}.type"), object.get("type"));
        check_data_needs(errors, &prefix, object);

        if let Some(name) = object.get("name").and_then(Value::as_str) {
            if !seen.insert(name) {
                errors.push(
                    format!("{prefix}.name"),
                    format!("checker '{name}' is declared more than once"),
                );
            }
        }
    }
}

fn check_data_needs(errors: &mut ManifestErrors, prefix: &str, checker: &Map<String, Value>) {
    let Some(value) = checker.get("dataNeeds") else {
        return;
    };
    let Some(items) = value.as_array() else {
        errors.push(format!("{prefix}.dataNeeds"), "must be an array");
        return;
    };
    for (index, item) in items.iter().enumerate() {
        if item.as_str().and_then(DataNeed::parse).is_none() {
            let known = DataNeed::ALL.map(DataNeed::as_str).join(", ");
            errors.push(
                format!("{prefix}.dataNeeds[{index}]"),
                format!("must be one of: {known}"),
            );
        }
    }
}

fn check_remediations(errors: &mut ManifestErrors, value: Option<&Value>) {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return;
    };
    let Some(entries) = value.as_array() else {
        errors.push("remediations", "must be an array");
        return;
    };
    for (index, entry) in entries.iter().enumerate() {
        let prefix = format!("remediations[{index}]");
        if !entry.is_object() {
            errors.push(prefix, "must be an object");
            continue;
        }
        check_text(errors, &format!("{prefix}.name"), entry.get("name"));
        check_text(errors, &format!("{prefix}.file"), entry.get("file"));
    }
}

fn check_settings(errors: &mut ManifestErrors, value: Option<&Value>) {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return;
    };
    let Some(entries) = value.as_object() else {
        errors.push("settings", "must be an object keyed by setting name");
        return;
    };
    for (key, entry) in entries {
        let prefix = format!("settings.{key}");
        if !entry.is_object() {
            errors.push(prefix, "must be an object");
            continue;
        }
        let known_type = entry
            .get("type")
            .and_then(Value::as_str)
            .and_then(SettingType::parse);
        if known_type.is_none() {
            errors.push(
                format!("{prefix}.type"),
                "must be one of: string, number, boolean, select",
            );
        }
        check_text(errors, &format!("{prefix}.label"), entry.get("label"));
    }
}
