use async_trait::async_trait;
use std::sync::Arc;

use crate::cli::ProviderKind;
use crate::config::Config;
use crate::errors::PipelineError;

pub mod gemini;
pub mod ollama;
pub mod openai;

/// Sampling knobs for one backend round-trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvokeOptions {
    pub temperature: f32,
    /// Ask the service for a JSON-only response when it supports that.
    pub structured_output: bool,
}

impl InvokeOptions {
    pub fn structured(temperature: f32) -> Self {
        Self { temperature, structured_output: true }
    }
}

/// The generative text service: prompt in, raw text out.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<String, PipelineError>;
}

pub type DynBackend = Arc<dyn Backend>;

/// Build the configured backend. The API key is taken from `cfg` as resolved
/// at startup; a missing key is reported by `invoke` before any request goes out.
pub fn make_backend(cfg: &Config) -> Result<DynBackend, PipelineError> {
    let timeout = std::time::Duration::from_secs(cfg.timeout_secs);
    match cfg.provider {
        ProviderKind::Gemini => Ok(Arc::new(gemini::Gemini::new(
            cfg.model.clone(),
            cfg.api_key.clone(),
            cfg.api_key_env.clone(),
            cfg.api_base.clone(),
            timeout,
        )?)),
        ProviderKind::OpenAI => Ok(Arc::new(openai::OpenAIProvider::new(
            cfg.model.clone(),
            cfg.api_key.clone(),
            cfg.api_key_env.clone(),
            cfg.api_base.clone(),
            timeout,
        )?)),
        ProviderKind::Ollama => Ok(Arc::new(ollama::Ollama::new(
            cfg.model.clone(),
            cfg.api_base.clone(),
            timeout,
        )?)),
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Configuration(format!("http client: {e}")))
}

pub(crate) fn require_key<'a>(key: &'a Option<String>, env_hint: &str) -> Result<&'a str, PipelineError> {
    match key.as_deref().map(str::trim) {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(PipelineError::Configuration(format!("missing API key ({env_hint} is not set)"))),
    }
}
