use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{http_client, require_key, Backend, InvokeOptions};
use crate::errors::PipelineError;

const DEFAULT_API_BASE: &str = "https://api.openai.com";

/// OpenAI chat-completions provider; the prompt goes out as a single user message.
pub struct OpenAIProvider {
    model: String,
    api_key: Option<String>,
    key_env: String,
    api_base: String,
    client: Client,
}

impl OpenAIProvider {
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

// Minimal structs to parse the chat response
#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

fn response_text(body: &str) -> Result<String, PipelineError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::Backend(format!("Failed to parse OpenAI response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PipelineError::Backend("openai: empty content".into()))
}

#[async_trait]
impl Backend for OpenAIProvider {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, PipelineError> {
        let api_key = require_key(&self.api_key, &self.key_env)?;

        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": opts.temperature,
        });
        if opts.structured_output {
            body["response_format"] = json!({ "type": "json_object" });
        }

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "openai: POST /v1/chat/completions");

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.api_base.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Backend(format!("OpenAI API error ({status}): {text}")));
        }
        response_text(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"pack_name\":\"x\"}"}}]}"#;
        assert_eq!(response_text(body).unwrap(), "{\"pack_name\":\"x\"}");
    }

    #[test]
    fn null_content_is_a_backend_error() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(matches!(response_text(body), Err(PipelineError::Backend(_))));
    }
}
