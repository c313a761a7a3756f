//! Natural-language dispatch for the four closed-set intents that carry no pipeline state
//! (`cv_upload`, `interview_prep`, `cv_analysis`, `status`) and the `__SELECT_CV__` base64
//! context round-trip (spec §4.9).

use std::sync::Arc;

use async_trait::async_trait;
use rust_agency::cv_tailor::{CvSections, ParsedCv};
use rust_agency::error::Result;
use rust_agency::events::EventBus;
use rust_agency::hr::HRContactResolver;
use rust_agency::jobs::JobSearchAggregator;
use rust_agency::llm::provider::LLMProvider;
use rust_agency::llm::Router as LlmRouter;
use rust_agency::model::{CvId, SessionId, UserId};
use rust_agency::pipeline::PipelineController;
use rust_agency::quota::QuotaLedger;
use rust_agency::session::SessionStore;
use rust_agency::supervisor::Supervisor;

/// Returns a fixed classification label for every call — fine here since none of these four
/// intents issue a second LLM call downstream of classification.
struct FixedIntentProvider(&'static str);

#[async_trait]
impl LLMProvider for FixedIntentProvider {
    fn name(&self) -> &str {
        "openai"
    }
    async fn generate(&self, _model: &str, _prompt: &str, _system: Option<&str>) -> Result<String> {
        Ok(format!("{{\"intent\": \"{}\"}}", self.0))
    }
}

fn harness(intent_label: &'static str) -> (Arc<Supervisor>, tempfile::TempDir) {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(LlmRouter::new(quota).with_provider("openai", Arc::new(FixedIntentProvider(intent_label))));
    let hr = Arc::new(HRContactResolver::new());
    let jobs = Arc::new(JobSearchAggregator::new(llm.clone(), hr.clone()));
    let events = Arc::new(EventBus::new());
    let pipeline = Arc::new(PipelineController::new(llm.clone(), hr.clone(), events.clone()));
    let dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionStore::new(dir.path()));
    let supervisor = Arc::new(Supervisor::new(llm, sessions, jobs, pipeline, events));
    (supervisor, dir)
}

#[tokio::test]
async fn cv_upload_intent_returns_static_guidance() {
    let (supervisor, _dir) = harness("cv_upload");
    let (reply, metadata) = supervisor
        .handle_turn(&UserId::from("u1"), &SessionId::from("s1"), "can you help with my resume file")
        .await
        .unwrap();
    assert!(reply.contains("upload button"));
    assert!(metadata.is_none());
}

#[tokio::test]
async fn interview_prep_intent_returns_static_guidance() {
    let (supervisor, _dir) = harness("interview_prep");
    let (reply, _) = supervisor
        .handle_turn(&UserId::from("u1"), &SessionId::from("s1"), "help me get ready for my interview")
        .await
        .unwrap();
    assert!(reply.contains("Prep Interview"));
}

#[tokio::test]
async fn status_intent_reports_zero_counts_with_no_activity() {
    let (supervisor, _dir) = harness("status");
    let (reply, _) = supervisor
        .handle_turn(&UserId::from("u1"), &SessionId::from("s1"), "what's my status")
        .await
        .unwrap();
    assert!(reply.contains("CVs on file: 0"));
    assert!(reply.contains("Applications sent: 0"));
}

#[tokio::test]
async fn cv_analysis_intent_without_cv_asks_for_upload() {
    let (supervisor, _dir) = harness("cv_analysis");
    let (reply, _) = supervisor
        .handle_turn(&UserId::from("u1"), &SessionId::from("s1"), "analyze my cv please")
        .await
        .unwrap();
    assert!(reply.contains("upload it first"));
}

#[tokio::test]
async fn cv_analysis_intent_with_active_cv_summarises_sections() {
    let (supervisor, _dir) = harness("cv_analysis");
    let user = UserId::from("u1");
    let parsed = ParsedCv {
        sections: CvSections {
            skills: vec!["rust".into(), "postgres".into()],
            work_experience: vec!["Engineer at Acme".into()],
            education: vec!["BSc Computer Science".into()],
            projects: vec![],
        },
        years_experience: 4.0,
        has_degree: true,
    };
    supervisor.set_active_cv(&user, CvId::new(), parsed).await;

    let (reply, _) = supervisor.handle_turn(&user, &SessionId::from("s1"), "analyze my cv please").await.unwrap();
    assert!(reply.contains("rust, postgres"));
    assert!(reply.contains("4"));
}
