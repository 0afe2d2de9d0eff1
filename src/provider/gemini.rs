use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{http_client, require_key, Backend, InvokeOptions};
use crate::errors::PipelineError;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct Gemini {
    pub model: String,
    api_key: Option<String>,
    key_env: String,
    api_base: String,
    client: Client,
}

impl Gemini {
    pub fn new(
        model: String,
        api_key: Option<String>,
        key_env: String,
        api_base: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            model,
            api_key,
            key_env,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<PartIn<'a>>,
}

#[derive(Serialize)]
struct PartIn<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<CandidateOut>,
}

#[derive(Deserialize)]
struct CandidateOut {
    content: Option<ContentOut>,
}

#[derive(Deserialize)]
struct ContentOut {
    #[serde(default)]
    parts: Vec<PartOut>,
}

#[derive(Deserialize)]
struct PartOut {
    #[serde(default)]
    text: String,
}

/// Concatenated text parts of the first candidate.
fn response_text(body: &str) -> Result<String, PipelineError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Backend(format!("gemini response parse error: {e}")))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(PipelineError::Backend("gemini: empty content".into()));
    }
    Ok(text)
}

#[async_trait]
impl Backend for Gemini {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, PipelineError> {
        let key = require_key(&self.api_key, &self.key_env)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        );
        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts: vec![PartIn { text: prompt }] }],
            generation_config: GenerationConfig {
                temperature: opts.temperature,
                response_mime_type: opts.structured_output.then_some("application/json"),
            },
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "gemini: POST generateContent");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Backend(format!("Gemini API error ({status}): {text}")));
        }
        response_text(&text)
    }
}
