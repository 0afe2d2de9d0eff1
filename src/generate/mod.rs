use std::sync::Arc;

use crate::errors::PipelineError;
use crate::prompt::{build_prompt_with, build_repair_prompt, VersionRuleSet};
use crate::provider::{DynBackend, InvokeOptions};
use crate::wire::Candidate;

/// One backend round-trip: what was asked, what came back, and the parsed payload.
#[derive(Debug, Clone)]
pub struct Draft {
    pub candidate: Candidate,
    pub prompt: String,
    pub raw: String,
}

/// Outcome of a round-trip whose reply could not be turned into a candidate.
/// Keeps the exchange so it can still be written to the transcript.
#[derive(Debug)]
pub struct FailedDraft {
    pub error: PipelineError,
    pub prompt: String,
    pub raw: Option<String>,
}

pub struct SpecGenerator {
    backend: DynBackend,
    rules: Arc<VersionRuleSet>,
    temperature: f32,
    repair_temperature: f32,
}

impl SpecGenerator {
    pub fn new(backend: DynBackend, rules: Arc<VersionRuleSet>) -> Self {
        Self { backend, rules, temperature: 0.4, repair_temperature: 0.3 }
    }

    pub fn with_temperatures(mut self, generate: f32, repair: f32) -> Self {
        self.temperature = generate;
        self.repair_temperature = repair;
        self
    }

    /// First attempt for `idea`. The candidate is returned unvalidated.
    pub async fn generate_spec(&self, idea: &str, version: &str) -> Result<Draft, FailedDraft> {
        let prompt = build_prompt_with(&self.rules, idea, version);
        self.round_trip(prompt, InvokeOptions::structured(self.temperature)).await
    }

    /// Ask the backend to fix `candidate` given the validator's `errors`.
    /// Exactly one backend call per invocation.
    pub async fn repair_spec(
        &self,
        idea: &str,
        version: &str,
        candidate: &Candidate,
        errors: &[String],
    ) -> Result<Draft, FailedDraft> {
        let prompt = build_repair_prompt(idea, version, candidate, errors);
        self.round_trip(prompt, InvokeOptions::structured(self.repair_temperature)).await
    }

    async fn round_trip(&self, prompt: String, opts: InvokeOptions) -> Result<Draft, FailedDraft> {
        let raw = match self.backend.invoke(&prompt, &opts).await {
            Ok(r) => r,
            Err(error) => return Err(FailedDraft { error, prompt, raw: None }),
        };
        tracing::debug!(raw_chars = raw.len(), "backend replied");

        match parse_candidate(&raw) {
            Ok(candidate) => Ok(Draft { candidate, prompt, raw }),
            Err(error) => Err(FailedDraft { error, prompt, raw: Some(raw) }),
        }
    }
}

/// Substring from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Result<&str, PipelineError> {
    let start = text.find('{').ok_or(PipelineError::Extraction)?;
    let end = text.rfind('}').ok_or(PipelineError::Extraction)?;
    if end <= start {
        return Err(PipelineError::Extraction);
    }
    Ok(&text[start..=end])
}

pub fn parse_candidate(text: &str) -> Result<Candidate, PipelineError> {
    let json = extract_json_object(text)?;
    serde_json::from_str(json)
        .map(Candidate::new)
        .map_err(|e| PipelineError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Backend;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Canned {
        reply: Result<String, String>,
        seen: Mutex<Vec<(String, InvokeOptions)>>,
    }

    #[async_trait]
    impl Backend for Canned {
        async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, PipelineError> {
            self.seen.lock().push((prompt.to_string(), *opts));
            self.reply.clone().map_err(PipelineError::Backend)
        }
    }

    fn generator(reply: Result<&str, &str>) -> (SpecGenerator, Arc<Canned>) {
        let backend = Arc::new(Canned {
            reply: reply.map(str::to_string).map_err(str::to_string),
            seen: Mutex::new(Vec::new()),
        });
        let gen = SpecGenerator::new(backend.clone(), Arc::new(VersionRuleSet::builtin().clone()));
        (gen, backend)
    }

    #[test]
    fn extracts_between_first_and_last_brace() {
        let text = "Sure! ```json\n{\"a\": {\"b\": 1}}\n``` hope that helps }";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": {\"b\": 1}}\n``` hope that helps }");
        assert_eq!(extract_json_object("x{}y").unwrap(), "{}");
    }

    #[test]
    fn extraction_fails_without_ordered_braces() {
        assert!(matches!(extract_json_object("no json here"), Err(PipelineError::Extraction)));
        assert!(matches!(extract_json_object("} before {"), Err(PipelineError::Extraction)));
        assert!(matches!(extract_json_object("only {"), Err(PipelineError::Extraction)));
    }

    #[test]
    fn parse_error_carries_parser_message() {
        match parse_candidate("{ \"pack_name\": }") {
            Err(PipelineError::Parse(msg)) => assert!(msg.contains("line 1")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn parsed_candidate_is_not_validated() {
        let c = parse_candidate("noise {\"files\": 5} noise").unwrap();
        assert_eq!(c.value()["files"], 5);
    }

    #[tokio::test]
    async fn generate_uses_structured_low_temperature_call() {
        let (gen, backend) = generator(Ok("{\"pack_name\":\"Heal\"}"));
        let draft = gen.generate_spec("heal players", "1.20.1").await.unwrap();
        assert_eq!(draft.candidate.value()["pack_name"], "Heal");

        let seen = backend.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("heal players"));
        assert!(seen[0].1.structured_output);
        assert!((seen[0].1.temperature - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn repair_sends_errors_and_previous_output_once() {
        let (gen, backend) = generator(Ok("{\"pack_name\":\"Fixed\"}"));
        let previous = Candidate::new(serde_json::json!({ "pack_name": "Broken" }));
        let errors = vec!["Missing required file: pack.mcmeta".to_string()];
        let draft = gen.repair_spec("heal", "1.20.1", &previous, &errors).await.unwrap();
        assert_eq!(draft.candidate.value()["pack_name"], "Fixed");

        let seen = backend.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("1. Missing required file: pack.mcmeta"));
        assert!(seen[0].0.contains("\"pack_name\": \"Broken\""));
        assert!((seen[0].1.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn backend_failure_is_propagated_unchanged() {
        let (gen, _) = generator(Err("quota exceeded"));
        let failed = gen.generate_spec("heal", "1.20.1").await.unwrap_err();
        assert!(matches!(&failed.error, PipelineError::Backend(m) if m == "quota exceeded"));
        assert!(failed.raw.is_none());
    }

    #[tokio::test]
    async fn unparseable_reply_keeps_raw_text() {
        let (gen, _) = generator(Ok("I cannot help with that."));
        let failed = gen.generate_spec("heal", "1.20.1").await.unwrap_err();
        assert!(matches!(failed.error, PipelineError::Extraction));
        assert_eq!(failed.raw.as_deref(), Some("I cannot help with that."));
    }
}
