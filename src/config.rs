//! Configuration for the assistant.
//!
//! Backend selection and the retry budget are explicit values threaded in at
//! construction time; there is no process-wide "currently selected model".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote OpenAI-compatible chat-completions API.
    OpenAi,
    /// Local Ollama inference server.
    Ollama,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::OpenAi => write!(f, "openai"),
            BackendKind::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Model identifier. `None` lets the gateway pick from the probe result.
    pub model: Option<String>,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f64,
}

impl BackendConfig {
    pub fn openai(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            kind: BackendKind::OpenAi,
            model: Some("gpt-4o-mini".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: Some(api_key.into()),
            temperature: 0.7,
        }
    }

    pub fn ollama(base_url: Option<String>) -> Self {
        Self {
            kind: BackendKind::Ollama,
            model: None,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            api_key: None,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub backend: BackendConfig,
    /// Hard cap on generate/extract/execute attempts per question.
    pub max_attempts: u8,
    /// Rows included in the schema snapshot sent to the model.
    pub sample_rows: usize,
}

impl AssistantConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            max_attempts: 3,
            sample_rows: 5,
        }
    }

    /// Build a backend config from the environment, preferring a local
    /// Ollama server when no OpenAI key is present.
    pub fn backend_from_env(kind: Option<BackendKind>) -> crate::error::Result<BackendConfig> {
        let openai_key = std::env::var("OPENAI_API_KEY").ok().map(|k| k.trim().to_string());
        let openai_base = std::env::var("OPENAI_BASE_URL").ok();
        let ollama_base = std::env::var("OLLAMA_BASE_URL").ok();

        match kind {
            Some(BackendKind::OpenAi) => {
                let key = openai_key.ok_or_else(|| {
                    crate::error::AssistantError::Config(
                        "OPENAI_API_KEY is not set; cannot use the openai backend".to_string(),
                    )
                })?;
                Ok(BackendConfig::openai(key, openai_base))
            }
            Some(BackendKind::Ollama) => Ok(BackendConfig::ollama(ollama_base)),
            None => match openai_key {
                Some(key) => Ok(BackendConfig::openai(key, openai_base)),
                None => Ok(BackendConfig::ollama(ollama_base)),
            },
        }
    }
}
