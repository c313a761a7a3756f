//! LLM Router (C1).
//!
//! Contract (spec §4.1): `invoke(task_label, messages, temperature) -> response`. Grounded on
//! `src/orchestrator/router.rs`'s builder-style routing struct and on
//! `original_source/backend/app/core/llm_router.py`'s `MODEL_CONFIGS`/`FALLBACK_CHAIN`/
//! `get_llm` chain-resolution logic, which supplies the concrete provider/model pool this crate
//! models (`openai`, `google`, `groq`).

pub mod provider;

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::{OrchestrationError, Result};
use crate::quota::QuotaLedger;
use provider::LLMProvider;

/// One entry in the model pool: a provider/model pair plus the daily-request-count limit used
/// by the Quota Ledger.
#[derive(Clone)]
pub struct ModelEntry {
    pub provider_name: &'static str,
    pub model_id: &'static str,
    pub rpd_limit: u64,
}

/// The fixed fallback chain named in spec §4.1. Concrete values grounded on `llm_router.py`'s
/// `FALLBACK_CHAIN`; exact model ids are illustrative since the real catalog changes faster than
/// this crate does — what matters structurally is the ordering and the per-provider credential
/// gate, not these specific strings.
pub const FALLBACK_CHAIN: &[ModelEntry] = &[
    ModelEntry { provider_name: "openai", model_id: "gpt-4o-mini", rpd_limit: 10_000 },
    ModelEntry { provider_name: "google", model_id: "gemini-1.5-flash", rpd_limit: 1_500 },
    ModelEntry { provider_name: "groq", model_id: "llama-3.1-70b-versatile", rpd_limit: 14_400 },
];

/// Router for directing LLM calls across a credential-gated, quota-aware fallback chain.
pub struct Router {
    providers: Vec<(&'static str, Arc<dyn LLMProvider>)>,
    quota: Arc<QuotaLedger>,
}

impl Router {
    pub fn new(quota: Arc<QuotaLedger>) -> Self {
        Self { providers: Vec::new(), quota }
    }

    /// Register a concrete provider implementation under a provider name matching one of the
    /// `ModelEntry::provider_name` values in `FALLBACK_CHAIN`.
    pub fn with_provider(mut self, name: &'static str, provider: Arc<dyn LLMProvider>) -> Self {
        self.providers.push((name, provider));
        self
    }

    fn provider_for(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.iter().find(|(n, _)| *n == name).map(|(_, p)| p.clone())
    }

    /// Resolve the effective chain for a preferred model: the preferred model first (if it
    /// names a configured provider), then the rest of `FALLBACK_CHAIN` in declared order, with
    /// duplicates removed. `"auto"` resolves to the chain head (spec §9 Open Question — a
    /// static alias, see DESIGN.md).
    fn resolve_chain(&self, preferred_model: Option<&str>) -> Vec<&'static ModelEntry> {
        let mut ordered: Vec<&'static ModelEntry> = Vec::new();

        if let Some(preferred) = preferred_model {
            if preferred != "auto" {
                if let Some(entry) = FALLBACK_CHAIN.iter().find(|e| e.model_id == preferred) {
                    ordered.push(entry);
                }
            }
        }
        for entry in FALLBACK_CHAIN {
            if !ordered.iter().any(|e| e.model_id == entry.model_id) {
                ordered.push(entry);
            }
        }

        // Filter out models whose provider has no credential configured and models whose daily
        // counter has already reached its limit (spec §4.1 step 1).
        ordered
            .into_iter()
            .filter(|entry| self.provider_for(entry.provider_name).is_some())
            .filter(|entry| !self.quota.rpd_exhausted(entry.provider_name, entry.model_id, entry.rpd_limit))
            .collect()
    }

    /// Invoke the chain for a single prompt. `task_label` is used only for logging and
    /// preferred-model selection, never for semantic branching (spec §4.1).
    #[instrument(skip(self, prompt, system), fields(task = task_label))]
    pub async fn invoke(
        &self,
        task_label: &str,
        prompt: &str,
        system: Option<&str>,
        preferred_model: Option<&str>,
    ) -> Result<String> {
        let chain = self.resolve_chain(preferred_model);
        if chain.is_empty() {
            return Err(OrchestrationError::quota_exhausted(
                "no configured model is available (all providers disabled or quota-exhausted)",
            ));
        }

        let mut last_err: Option<OrchestrationError> = None;
        for entry in chain {
            let provider = match self.provider_for(entry.provider_name) {
                Some(p) => p,
                None => continue,
            };

            let timeout = std::time::Duration::from_secs(60);
            let attempt = tokio::time::timeout(timeout, provider.generate(entry.model_id, prompt, system)).await;

            let result = match attempt {
                Ok(r) => r,
                Err(_) => Err(OrchestrationError::transient(entry.provider_name, "request timed out")),
            };

            match result {
                Ok(response) => {
                    self.quota.increment_rpd(entry.provider_name, entry.model_id);
                    return Ok(response);
                }
                Err(e) if e.is_retryable_in_chain() => {
                    warn!(provider = entry.provider_name, model = entry.model_id, task = task_label, "transient LLM failure, trying next in chain");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => {
                    // Non-transient error aborts the chain immediately (spec §4.1).
                    return Err(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| OrchestrationError::quota_exhausted("fallback chain exhausted")))
    }
}
