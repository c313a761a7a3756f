//! Autonomous job-application orchestration layer — process entry point.
//!
//! Wires the Quota Ledger, LLM Router, Job Search Aggregator, HR Contact Resolver, Pipeline
//! Controller, Event Bus, Session Store, Reply Watcher, and Supervisor together, then starts the
//! HTTP/WebSocket server (spec §6).

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use rust_agency::config::Config;
use rust_agency::events::EventBus;
use rust_agency::hr::HRContactResolver;
use rust_agency::jobs::JobSearchAggregator;
use rust_agency::llm::{provider::OpenAICompatibleProvider, Router as LlmRouter};
use rust_agency::pipeline::PipelineController;
use rust_agency::quota::QuotaLedger;
use rust_agency::reply_watcher::{ReplyWatcher, StubMailboxPoller};
use rust_agency::server::{run_server, AppState};
use rust_agency::session::SessionStore;
use rust_agency::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let config = Arc::new(Config::load()?);
    info!(
        llm_providers = config.llm_credentials.len(),
        job_providers = config.job_provider_credentials.len(),
        hr_providers = config.hr_provider_credentials.len(),
        "configuration loaded"
    );

    let quota = Arc::new(QuotaLedger::new());

    let mut llm_router = LlmRouter::new(quota.clone());
    if let Some(key) = config.llm_credentials.get("openai") {
        llm_router = llm_router.with_provider(
            "openai",
            Arc::new(OpenAICompatibleProvider::new("openai", "https://api.openai.com/v1", key.clone())),
        );
    }
    if let Some(key) = config.llm_credentials.get("groq") {
        llm_router = llm_router.with_provider(
            "groq",
            Arc::new(OpenAICompatibleProvider::new("groq", "https://api.groq.com/openai/v1", key.clone())),
        );
    }
    let llm_router = Arc::new(llm_router);

    let hr_resolver = Arc::new(HRContactResolver::new());
    let job_aggregator = Arc::new(JobSearchAggregator::new(llm_router.clone(), hr_resolver.clone()));

    let events = Arc::new(EventBus::new());
    let pipeline = Arc::new(PipelineController::new(llm_router.clone(), hr_resolver.clone(), events.clone()));
    let sessions = Arc::new(SessionStore::new(format!("{}/sessions", config.upload_dir)));

    let supervisor = Arc::new(Supervisor::new(
        llm_router.clone(),
        sessions.clone(),
        job_aggregator.clone(),
        pipeline.clone(),
        events.clone(),
    ));

    let reply_watcher = Arc::new(ReplyWatcher::new(events.clone(), Arc::new(StubMailboxPoller)));
    reply_watcher.start().await;

    let state = AppState {
        config,
        supervisor,
        sessions,
        pipeline,
        quota,
        events,
        reply_watcher: reply_watcher.clone(),
    };

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8002".to_string());
    let result = run_server(state, &addr).await;

    reply_watcher.stop().await;
    result
}
