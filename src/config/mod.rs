use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ProviderKind;
use crate::errors::PipelineError;
use crate::pipeline::RepairPolicy;

pub const DEFAULT_VERSION: &str = "1.20.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    pub model: String,
    /// Environment variable holding the API key; read once at startup.
    pub api_key_env: String,
    /// Resolved key. Never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub repair_temperature: f32,
    pub max_repair_attempts: u32,
    pub repair_policy: RepairPolicy,
    pub default_version: String,
    /// Extra version rules merged over the built-in table.
    pub version_rules: Option<PathBuf>,
    /// SQLite file; `None` keeps saved datapacks in memory.
    pub db_path: Option<PathBuf>,
    pub artifacts_dir: PathBuf,
    pub save_request: bool,
    pub save_response: bool,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "gemini-1.5-flash".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            api_key: None,
            api_base: None,
            timeout_secs: 120,
            temperature: 0.4,
            repair_temperature: 0.3,
            max_repair_attempts: 2,
            repair_policy: RepairPolicy::Lenient,
            default_version: DEFAULT_VERSION.into(),
            version_rules: None,
            db_path: Some(PathBuf::from("datapacks.db")),
            artifacts_dir: PathBuf::from(".datapack_forge"),
            save_request: false,
            save_response: false,
            bind: "127.0.0.1:3000".into(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let text = fs_err::read_to_string(p)
                    .map_err(|e| PipelineError::Configuration(e.to_string()))?;
                Self::from_toml(&text)
            }
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Configuration(format!("invalid config: {e}")))
    }

    /// Switching provider also moves the model and key variable to that
    /// provider's defaults unless the config file set them explicitly.
    pub fn set_provider(&mut self, kind: ProviderKind) {
        let before = Self::provider_defaults(self.provider);
        let after = Self::provider_defaults(kind);
        if self.model == before.0 {
            self.model = after.0.into();
        }
        if self.api_key_env == before.1 {
            self.api_key_env = after.1.into();
        }
        self.provider = kind;
    }

    fn provider_defaults(kind: ProviderKind) -> (&'static str, &'static str) {
        match kind {
            ProviderKind::Gemini => ("gemini-1.5-flash", "GEMINI_API_KEY"),
            ProviderKind::OpenAI => ("gpt-4.1-mini", "OPENAI_API_KEY"),
            ProviderKind::Ollama => ("llama3.1", "OLLAMA_API_KEY"),
        }
    }

    /// Pick up the API key from the variable named by `api_key_env`, unless one is already set.
    pub fn resolve_api_key(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup(&self.api_key_env).filter(|k| !k.trim().is_empty());
        }
    }
}
