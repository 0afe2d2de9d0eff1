use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipelineError;

/// ========================================
/// Datapack wire types
/// ========================================

/// One text file inside a datapack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

/// The file-list-shaped artifact the backend is asked to produce.
///
/// Field names on the wire follow the JSON schema embedded in the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatapackSpec {
    #[serde(rename = "pack_name")]
    pub name: String,
    pub description: String,
    pub files: Vec<FileEntry>,
    #[serde(rename = "installation_instructions")]
    pub install_instructions: String,
}

impl DatapackSpec {
    /// Typed view of an untrusted candidate. Fields of the wrong type become
    /// empty strings and file entries without string `path`/`content` are
    /// dropped; run the validator first to learn what was wrong.
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let obj = candidate.value().as_object();
        let text = |key: &str| {
            obj.and_then(|o| o.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let files = obj
            .and_then(|o| o.get("files"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let path = item.get("path")?.as_str()?;
                        let content = item.get("content")?.as_str()?;
                        Some(FileEntry { path: path.to_string(), content: content.to_string() })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: text("pack_name"),
            description: text("description"),
            files,
            install_instructions: text("installation_instructions"),
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// Parsed backend output that has not been validated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate(Value);

impl Candidate {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

impl From<&DatapackSpec> for Candidate {
    fn from(spec: &DatapackSpec) -> Self {
        Self(serde_json::to_value(spec).unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "errors", rename_all = "lowercase")]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(errors) => errors,
        }
    }
}

/// Final validation status reported alongside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Ok => "ok",
            ValidationStatus::Failed => "failed",
        }
    }
}

/// Body of a generation request, as accepted by the HTTP endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default, deserialize_with = "string_or_none")]
    pub idea: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub version: Option<String>,
    #[serde(default, rename = "ownerId", alias = "uid", deserialize_with = "string_or_none")]
    pub owner_id: Option<String>,
}

/// Non-string values read as absent, so a numeric version falls back to the default.
fn string_or_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(de)?.and_then(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
    }))
}

/// A request with blanks resolved: idea trimmed and non-empty, version defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub idea: String,
    pub version: String,
    pub owner_id: Option<String>,
}

impl GenerateRequest {
    pub fn normalize(self, default_version: &str) -> Result<NormalizedRequest, PipelineError> {
        let idea = self.idea.as_deref().map(str::trim).unwrap_or_default();
        if idea.is_empty() {
            return Err(PipelineError::Input("idea is required.".into()));
        }
        let version = self
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default_version);
        let owner_id = self
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string);

        Ok(NormalizedRequest { idea: idea.to_string(), version: version.to_string(), owner_id })
    }
}
