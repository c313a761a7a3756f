//! HTTP-backed LLM providers.
//!
//! Grounded on `src/agent/provider.rs`'s `OpenAICompatibleProvider` (reqwest POST +
//! `bearer_auth`). The teacher also carries `CandleProvider`/`RemoteNexusProvider` for local
//! inference; this crate treats every LLM as a remote service (spec §1), so only the HTTP
//! adapters are kept, generalised to cover the three providers named in SPEC_FULL.md §4.1
//! (`openai`, `google`, `groq` — all OpenAI-compatible chat-completions endpoints in practice).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{OrchestrationError, Result};

/// A single LLM backend. The Router (C1) holds a pool of these behind an ordered fallback chain.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Provider name used for quota keys and error messages (`"openai"`, `"google"`, `"groq"`).
    fn name(&self) -> &str;

    /// One-shot, non-streaming chat completion. The router never inspects the returned text's
    /// semantic content — structured extraction is the caller's concern (spec §4.1).
    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String>;
}

/// An OpenAI-compatible chat-completions HTTP endpoint. Used for the `openai` and `groq`
/// providers (and `google` when fronted by an OpenAI-compatible gateway); providers with a
/// genuinely different wire format would get their own adapter, not a branch in this one.
pub struct OpenAICompatibleProvider {
    client: Client,
    name: String,
    base_url: String,
    api_key: String,
}

impl OpenAICompatibleProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { client: Client::new(), name: name.into(), base_url: base_url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, model: &str, prompt: &str, system: Option<&str>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.7,
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&self.name, &e))?;

        if response.status().as_u16() == 429 || response.status().is_server_error() {
            return Err(OrchestrationError::transient(
                &self.name,
                format!("HTTP {}", response.status()),
            ));
        }
        if response.status().is_client_error() {
            return Err(OrchestrationError::permanent_config(
                &self.name,
                format!("HTTP {}", response.status()),
            ));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OrchestrationError::transient(&self.name, e))?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| OrchestrationError::transient(&self.name, "empty completion"))
    }
}

fn classify_reqwest_error(provider: &str, err: &reqwest::Error) -> OrchestrationError {
    if err.is_timeout() || err.is_connect() {
        OrchestrationError::transient(provider, err)
    } else {
        OrchestrationError::transient(provider, err)
    }
}
