//! HR Contact Resolver (C5).
//!
//! Given (company, role, optional domain), try an ordered list of lookup providers, each gated
//! by its credential, and accept the first response passing spec §4.5's acceptance rule. This is
//! built directly from the spec §4.5 contract rather than ported from
//! `original_source/backend/app/agents/hr_finder.py`, whose LLM-guess-with-constructed-email
//! fallback (tagged `source: "heuristic_fallback"`) is exactly the fabrication anti-pattern spec
//! §4.5 prohibits — it is cited here as the weaker analog this component intentionally does not
//! reproduce (see DESIGN.md).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::model::HRContact;

/// A single HR-lookup provider adapter (e.g. Hunter.io, Apollo.io — the APIs themselves are out
/// of scope per spec §1; this trait is the seam).
#[async_trait]
pub trait HRLookupProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn lookup(&self, company: &str, role: &str, domain: Option<&str>) -> anyhow::Result<Option<HRContact>>;
}

pub struct HRContactResolver {
    providers: Vec<Arc<dyn HRLookupProvider>>,
}

impl HRContactResolver {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    pub fn with_provider(mut self, provider: Arc<dyn HRLookupProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Try each configured provider in order; accept the first contact satisfying
    /// `HRContact::is_acceptable` (spec §4.5's acceptance rule). Returns `None` ("not_found") if
    /// no provider returns an acceptable contact — a normal, non-exceptional outcome. The
    /// resolver never fabricates an email itself.
    pub async fn resolve(&self, company: &str, role: &str, domain: Option<&str>) -> Option<HRContact> {
        let mut errors = Vec::new();

        for provider in &self.providers {
            match provider.lookup(company, role, domain).await {
                Ok(Some(contact)) if contact.is_acceptable() => return Some(contact),
                Ok(Some(_)) => {
                    // Provider returned something, but it fails the acceptance rule (e.g. a
                    // guessed or low-confidence contact) — keep trying the next provider rather
                    // than accepting a fabricated address.
                    continue;
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "HR lookup provider failed");
                    errors.push(format!("{}: {}", provider.name(), e));
                    continue;
                }
            }
        }

        if !errors.is_empty() {
            warn!(company, role, errors = ?errors, "HR resolution exhausted all providers");
        }
        None
    }
}

impl Default for HRContactResolver {
    fn default() -> Self {
        Self::new()
    }
}
