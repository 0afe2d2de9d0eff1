use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{http_client, Backend, InvokeOptions};
use crate::errors::PipelineError;

const DEFAULT_URL: &str = "http://localhost:11434";

/// Local Ollama server; needs no API key.
pub struct Ollama {
    pub model: String,
    pub url: String,
    client: Client,
}

impl Ollama {
    pub fn new(model: String, url: Option<String>, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            model,
            url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: String,
}

#[async_trait]
impl Backend for Ollama {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, PipelineError> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: vec![Msg { role: "user", content: prompt }],
            stream: false,
            format: opts.structured_output.then_some("json"),
            options: OllamaOptions { temperature: opts.temperature },
        };

        tracing::debug!(model = %self.model, %url, "ollama: POST /api/chat");

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(PipelineError::Backend(format!("ollama error ({status}): {text}")));
        }

        // Some proxies return the bare content; fall back to the raw body.
        match serde_json::from_str::<ChatResponse>(&text) {
            Ok(c) => Ok(c.message.content),
            Err(_) => Ok(text),
        }
    }
}
