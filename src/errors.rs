use thiserror::Error;

/// Who can act on a failure: the caller, the generation side, or us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Client,
    Generation,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Client => "client",
            ErrorCategory::Generation => "generation",
            ErrorCategory::Internal => "internal",
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("input error: {0}")] Input(String),
    #[error("configuration error: {0}")] Configuration(String),
    #[error("model did not return a JSON object")] Extraction,
    #[error("failed to parse JSON from model: {0}")] Parse(String),
    #[error("backend error: {0}")] Backend(String),
    #[error("datapack validation failed after {attempts} repair attempt(s):\n{}", errors.join("\n"))]
    Validation { errors: Vec<String>, attempts: u32 },
    #[error("save failed: {0}")] Save(String),
    #[error("packaging failed: {0}")] Packaging(String),
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Input(_) => ErrorCategory::Client,
            PipelineError::Extraction
            | PipelineError::Parse(_)
            | PipelineError::Backend(_)
            | PipelineError::Validation { .. } => ErrorCategory::Generation,
            PipelineError::Configuration(_)
            | PipelineError::Save(_)
            | PipelineError::Packaging(_) => ErrorCategory::Internal,
        }
    }

    /// Extraction and parse failures are the only ones a repair attempt may absorb.
    pub fn is_malformed_output(&self) -> bool {
        matches!(self, PipelineError::Extraction | PipelineError::Parse(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Backend(e.to_string())
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Save(e.to_string())
    }
}

impl From<zip::result::ZipError> for PipelineError {
    fn from(e: zip::result::ZipError) -> Self {
        PipelineError::Packaging(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_separate_client_generation_and_internal() {
        assert_eq!(PipelineError::Input("idea is required.".into()).category(), ErrorCategory::Client);
        assert_eq!(PipelineError::Extraction.category(), ErrorCategory::Generation);
        assert_eq!(PipelineError::Backend("timeout".into()).category(), ErrorCategory::Generation);
        assert_eq!(PipelineError::Save("disk full".into()).category(), ErrorCategory::Internal);
        assert_eq!(PipelineError::Configuration("no key".into()).category(), ErrorCategory::Internal);
    }

    #[test]
    fn validation_message_lists_every_error() {
        let e = PipelineError::Validation {
            errors: vec!["Missing required file: pack.mcmeta".into(), "files must contain at least one file.".into()],
            attempts: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("after 2 repair attempt(s)"));
        assert!(msg.contains("pack.mcmeta"));
        assert!(msg.contains("at least one file"));
    }
}
