//! End-to-end suspend/resume through the full turn-handling stack: Supervisor -> Pipeline
//! Controller -> Session Store, exercising spec §8's pipeline-resumability scenario across two
//! independent `handle_turn` calls exactly as the server layer would drive them.

use std::sync::Arc;

use async_trait::async_trait;
use rust_agency::cv_tailor::{CvSections, ParsedCv};
use rust_agency::error::Result;
use rust_agency::events::EventBus;
use rust_agency::hr::HRContactResolver;
use rust_agency::jobs::JobSearchAggregator;
use rust_agency::llm::provider::LLMProvider;
use rust_agency::llm::Router as LlmRouter;
use rust_agency::model::{ApplicationStatus, CvId, JobId, MessageMetadata, SessionId, UserId};
use rust_agency::pipeline::PipelineController;
use rust_agency::quota::QuotaLedger;
use rust_agency::session::SessionStore;
use rust_agency::supervisor::Supervisor;

/// An LLM stub returning a fixed string regardless of prompt — enough for the CV-analysis and
/// email-compose calls, which tolerantly fall back to a default on any JSON they can't parse.
struct StaticProvider(&'static str);

#[async_trait]
impl LLMProvider for StaticProvider {
    fn name(&self) -> &str {
        "openai"
    }
    async fn generate(&self, _model: &str, _prompt: &str, _system: Option<&str>) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn harness() -> (Arc<Supervisor>, Arc<PipelineController>, Arc<SessionStore>, tempfile::TempDir) {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(
        LlmRouter::new(quota.clone()).with_provider("openai", Arc::new(StaticProvider("not json, falls back"))),
    );
    let hr = Arc::new(HRContactResolver::new());
    let jobs = Arc::new(JobSearchAggregator::new(llm.clone(), hr.clone()));
    let events = Arc::new(EventBus::new());
    let pipeline = Arc::new(PipelineController::new(llm.clone(), hr.clone(), events.clone()));

    let dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionStore::new(dir.path()));

    let supervisor = Arc::new(Supervisor::new(llm, sessions.clone(), jobs, pipeline.clone(), events));
    (supervisor, pipeline, sessions, dir)
}

async fn posting_with_hr(pipeline: &PipelineController, job_id: JobId) {
    use rust_agency::cv_tailor::JobRequirements;
    use rust_agency::model::{ContactSource, HRContact, JobPosting};

    let posting = JobPosting {
        id: job_id.clone(),
        title: "Backend Engineer".into(),
        company: "Acme".into(),
        location: "Remote".into(),
        salary: None,
        job_type: None,
        description: "Build things with Rust".into(),
        requirements: vec!["rust".into()],
        source: "test".into(),
        application_url: None,
        posted_date: None,
        match_score: None,
        hr_contact: Some(HRContact {
            name: Some("Jamie".into()),
            email: "jamie@acme.com".into(),
            title: None,
            confidence: 0.95,
            source: ContactSource::Hunter,
            verified: true,
        }),
    };
    let cv = ParsedCv {
        sections: CvSections { skills: vec!["rust".into()], work_experience: vec!["Engineer at Foo".into()], ..Default::default() },
        years_experience: 3.0,
        has_degree: true,
    };
    pipeline.register_job_context(posting, cv, JobRequirements { required_years: 2.0, requires_degree: true, keywords: vec!["rust".into()] }).await;
}

#[tokio::test]
async fn suspend_then_resume_across_two_turns_reaches_email_review() {
    let (supervisor, pipeline, sessions, _dir) = harness();
    let user = UserId::from("u1");
    let session = SessionId::from("s1");
    let job_id = JobId::from("job-acme-001");

    posting_with_hr(&pipeline, job_id.clone()).await;
    supervisor.set_active_cv(&user, CvId::new(), ParsedCv {
        sections: CvSections { skills: vec!["rust".into()], work_experience: vec!["Engineer at Foo".into()], ..Default::default() },
        years_experience: 3.0,
        has_degree: true,
    }).await;

    // Turn 1: kick off tailoring via the UI action prefix.
    let (reply, metadata) = supervisor
        .handle_turn(&user, &session, &format!("__TAILOR_APPLY__:{}", job_id.0))
        .await
        .unwrap();
    sessions.append(&user, &session, &rust_agency::model::Message::assistant(reply.as_str(), metadata.clone())).await.unwrap();

    let application_id = match metadata {
        Some(MessageMetadata::CvReview { application_id, .. }) => application_id,
        other => panic!("expected CvReview suspension, got {other:?}"),
    };
    assert_eq!(pipeline.application(&application_id).await.unwrap().status, ApplicationStatus::PendingApproval);

    // Turn 2: a fresh call into the Supervisor resolves the continuation purely from the
    // persisted session log — no in-memory state threading the two turns together.
    let (reply2, metadata2) = supervisor.handle_turn(&user, &session, "yes").await.unwrap();
    assert!(reply2.to_lowercase().contains("approve") || reply2.to_lowercase().contains("draft"));

    match metadata2 {
        Some(MessageMetadata::EmailReview { application_id: resumed_id, .. }) => {
            assert_eq!(resumed_id, application_id);
        }
        other => panic!("expected EmailReview suspension, got {other:?}"),
    }
    assert_eq!(pipeline.application(&application_id).await.unwrap().status, ApplicationStatus::CvApproved);
}

#[tokio::test]
async fn multi_word_approval_phrase_resolves_a_pending_cv_review() {
    // spec.md:268's mandatory scenario: "yes send it" must resolve a pending CvReview just like a
    // bare "yes" does, not fall through to general chat.
    let (supervisor, pipeline, sessions, _dir) = harness();
    let user = UserId::from("u3");
    let session = SessionId::from("s1");
    let job_id = JobId::from("job-acme-002");

    posting_with_hr(&pipeline, job_id.clone()).await;
    supervisor.set_active_cv(&user, CvId::new(), ParsedCv {
        sections: CvSections { skills: vec!["rust".into()], work_experience: vec!["Engineer at Foo".into()], ..Default::default() },
        years_experience: 3.0,
        has_degree: true,
    }).await;

    let (reply, metadata) =
        supervisor.handle_turn(&user, &session, &format!("__TAILOR_APPLY__:{}", job_id.0)).await.unwrap();
    sessions.append(&user, &session, &rust_agency::model::Message::assistant(reply.as_str(), metadata.clone())).await.unwrap();

    let application_id = match metadata {
        Some(MessageMetadata::CvReview { application_id, .. }) => application_id,
        other => panic!("expected CvReview suspension, got {other:?}"),
    };

    let (reply2, metadata2) = supervisor.handle_turn(&user, &session, "yes send it").await.unwrap();
    assert!(reply2.to_lowercase().contains("approve") || reply2.to_lowercase().contains("draft"));
    match metadata2 {
        Some(MessageMetadata::EmailReview { application_id: resumed_id, .. }) => assert_eq!(resumed_id, application_id),
        other => panic!("expected EmailReview suspension (continuation fell through to general chat instead), got {other:?}"),
    }
}

#[tokio::test]
async fn unresolvable_continuation_falls_back_to_general_chat() {
    let (supervisor, _pipeline, sessions, _dir) = harness();
    let user = UserId::from("u2");
    let session = SessionId::from("s1");

    // No prior assistant metadata exists yet; a bare "yes" has nothing to resume.
    let (reply, metadata) = supervisor.handle_turn(&user, &session, "yes").await.unwrap();
    assert!(metadata.is_none());
    assert!(!reply.is_empty());

    let history = sessions.last_n(&user, &session, 10).await.unwrap();
    assert!(history.is_empty(), "handle_turn itself does not persist; the caller (server) does");
}
