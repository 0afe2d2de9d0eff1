use serde_json::Value;
use std::collections::HashSet;

use crate::safety::{is_safe_relative_path, lint_mcfunction};
use crate::wire::{Candidate, ValidationResult};

pub const MAX_FILES: usize = 400;
pub const MAX_FILE_CHARS: usize = 250_000;

pub const MANIFEST_PATH: &str = "pack.mcmeta";
pub const DATA_PREFIX: &str = "data/";
pub const FUNCTION_EXT: &str = ".mcfunction";

const REQUIRED_STRINGS: &[&str] = &["pack_name", "description", "installation_instructions"];

/// Check an untrusted candidate against the datapack rules.
///
/// Never fails: malformed input is reported as errors. Errors are listed in
/// discovery order, so identical input yields an identical result.
pub fn validate(candidate: &Candidate) -> ValidationResult {
    validate_value(candidate.value())
}

pub fn validate_value(spec: &Value) -> ValidationResult {
    let mut errors = Vec::new();

    let obj = match spec.as_object() {
        Some(o) => o,
        None => return ValidationResult::Invalid(vec!["Response is not an object.".into()]),
    };

    for field in REQUIRED_STRINGS {
        let present = obj
            .get(*field)
            .and_then(Value::as_str)
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !present {
            errors.push(format!("Missing required field: {field} (string)."));
        }
    }

    let files = match obj.get("files").and_then(Value::as_array) {
        Some(f) => f,
        None => {
            errors.push("Missing required field: files (array).".into());
            return ValidationResult::Invalid(errors);
        }
    };

    if files.is_empty() {
        errors.push("files must contain at least one file.".into());
    }
    if files.len() > MAX_FILES {
        errors.push(format!("Too many files ({}); max is {MAX_FILES}.", files.len()));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut has_manifest = false;
    let mut has_data_file = false;
    let mut has_function = false;

    for file in files {
        let entry = match file.as_object() {
            Some(e) => e,
            None => {
                errors.push("Each item in files must be an object with path/content.".into());
                continue;
            }
        };

        let path = match entry.get("path") {
            Some(Value::String(p)) if is_safe_relative_path(p) => p.as_str(),
            Some(Value::String(p)) => {
                errors.push(format!("Invalid file path: {p}"));
                continue;
            }
            Some(other) => {
                errors.push(format!("Invalid file path: {other}"));
                continue;
            }
            None => {
                errors.push("Invalid file path: <missing>".into());
                continue;
            }
        };

        if !seen.insert(path) {
            errors.push(format!("Duplicate file path: {path}"));
            continue;
        }

        let content = entry.get("content").and_then(Value::as_str);
        if content.map(|c| c.trim().is_empty()).unwrap_or(true) {
            errors.push(format!("Empty or missing content for: {path}"));
        }
        if let Some(c) = content {
            let chars = c.chars().count();
            if chars > MAX_FILE_CHARS {
                errors.push(format!("File too large ({chars} chars): {path}"));
            }
        }

        if path == MANIFEST_PATH {
            has_manifest = true;
        }
        if path.starts_with(DATA_PREFIX) {
            has_data_file = true;
            if path.ends_with(FUNCTION_EXT) {
                has_function = true;
            }
        }

        if let (true, Some(c)) = (path.ends_with(FUNCTION_EXT), content) {
            lint_mcfunction(path, c, &mut errors);
        }
    }

    if !has_manifest {
        errors.push(format!("Missing required file: {MANIFEST_PATH}"));
    }
    if !has_data_file {
        errors.push("Datapack must include at least one file under data/...".into());
    }
    if !has_function {
        errors.push("Datapack must include at least one .mcfunction under data/<namespace>/functions/".into());
    }

    ValidationResult::from_errors(errors)
}
