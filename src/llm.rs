//! Model Gateway
//!
//! Uniform `prompt in, text out` interface over the configured completion
//! backend (remote OpenAI-compatible API or a local Ollama server). Failures
//! are classified into [`BackendError`]; the gateway itself never retries —
//! retry policy lives in the synthesis loop and covers execution failures
//! only.

use crate::config::{BackendConfig, BackendKind};
use crate::error::BackendError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Models tried in order when an Ollama backend has no configured model.
const PREFERRED_OLLAMA_MODELS: &[&str] = &[
    "qwen2.5:3b",
    "qwen2.5:7b",
    "qwen2.5:1.5b",
    "qwen3:latest",
    "llama3.2:3b",
    "llama3.1:latest",
    "llama3.1:8b",
];

/// Text-completion capability consumed by the synthesis loop and the answer
/// composer. The trait seam keeps the retry machine testable without a live
/// backend.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Result of the capability probe used to pick a backend before a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProbe {
    pub reachable: bool,
    pub models: Vec<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    config: BackendConfig,
}

impl LlmClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Check whether the backend is reachable and which models it serves.
    pub async fn probe(&self) -> Result<BackendProbe, BackendError> {
        match self.config.kind {
            BackendKind::Ollama => self.probe_ollama().await,
            BackendKind::OpenAi => self.probe_openai().await,
        }
    }

    /// Resolve the model for this round: the configured one if set, else the
    /// first preferred model the backend actually serves, else the first
    /// served model.
    pub async fn resolve_model(&self) -> Result<String, BackendError> {
        if let Some(model) = &self.config.model {
            return Ok(model.clone());
        }
        let probe = self.probe().await?;
        if probe.models.is_empty() {
            return Err(BackendError::UnexpectedResponse(
                "backend reports no installed models".to_string(),
            ));
        }
        for preferred in PREFERRED_OLLAMA_MODELS {
            if probe.models.iter().any(|m| m == preferred) {
                info!("auto-selected model {}", preferred);
                return Ok(preferred.to_string());
            }
        }
        Ok(probe.models[0].clone())
    }

    async fn probe_ollama(&self) -> Result<BackendProbe, BackendError> {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));
        let response = match self.http.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(r) => r,
            Err(_) => {
                return Ok(BackendProbe {
                    reachable: false,
                    models: vec![],
                })
            }
        };
        if !response.status().is_success() {
            return Ok(BackendProbe {
                reachable: false,
                models: vec![],
            });
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::UnexpectedResponse(e.to_string()))?;
        let models = body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(BackendProbe {
            reachable: true,
            models,
        })
    }

    async fn probe_openai(&self) -> Result<BackendProbe, BackendError> {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut request = self.http.get(&url).timeout(Duration::from_secs(10));
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let response = match request.send().await {
            Ok(r) => r,
            Err(_) => {
                return Ok(BackendProbe {
                    reachable: false,
                    models: vec![],
                })
            }
        };
        if !response.status().is_success() {
            return Ok(BackendProbe {
                reachable: false,
                models: vec![],
            });
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::UnexpectedResponse(e.to_string()))?;
        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(BackendProbe {
            reachable: true,
            models,
        })
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String, BackendError> {
        let model = self.resolve_model().await?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Authentication("no API key configured".to_string()))?;

        debug!("calling {} with model {}", url, model);
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
        });

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::UnexpectedResponse(e.to_string()))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                BackendError::UnexpectedResponse("no content in completion response".to_string())
            })?;

        info!("completion succeeded, {} chars", content.len());
        Ok(content.to_string())
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String, BackendError> {
        let model = self.resolve_model().await?;
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));

        debug!("calling {} with model {}", url, model);
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "top_p": 0.9,
                "num_predict": 2048,
            }
        });

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::UnexpectedResponse(e.to_string()))?;

        let text = response_json["response"].as_str().ok_or_else(|| {
            BackendError::UnexpectedResponse(format!(
                "no 'response' field in generate payload: {}",
                response_json
            ))
        })?;

        let cleaned = strip_think_tags(text);
        info!(
            "completion succeeded, {} chars ({} after think-tag strip)",
            text.len(),
            cleaned.len()
        );
        Ok(cleaned)
    }
}

#[async_trait]
impl TextCompletion for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        match self.config.kind {
            BackendKind::OpenAi => self.complete_openai(prompt).await,
            BackendKind::Ollama => self.complete_ollama(prompt).await,
        }
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> BackendError {
    let detail = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };
    match status.as_u16() {
        401 | 403 => BackendError::Authentication(detail),
        429 => BackendError::RateLimited(detail),
        400 => BackendError::BadRequest(detail),
        500..=599 => BackendError::Server(detail),
        _ => BackendError::UnexpectedResponse(detail),
    }
}

fn classify_transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else if e.is_connect() {
        BackendError::Connection(e.to_string())
    } else {
        // Request-build and body errors are not transport failures.
        BackendError::UnexpectedResponse(e.to_string())
    }
}

lazy_static! {
    static ref THINK_BLOCK: Regex = Regex::new(r"(?is)<think>.*?</think>").unwrap();
    static ref THINK_TAIL: Regex = Regex::new(r"(?is)<think>.*").unwrap();
    static ref BLANK_RUNS: Regex = Regex::new(r"\n\s*\n").unwrap();
}

/// Remove `<think>…</think>` reasoning blocks some local models emit,
/// including an unclosed trailing block.
pub fn strip_think_tags(text: &str) -> String {
    let cleaned = THINK_BLOCK.replace_all(text, "");
    let cleaned = THINK_TAIL.replace_all(&cleaned, "");
    let cleaned = BLANK_RUNS.replace_all(&cleaned, "\n");
    cleaned.trim().to_string()
}
