//! Pipeline send-email outcomes (spec §4.10 "send failures" / §8): token revocation, transient
//! failure, and success each drive the Application to the right terminal state and surface the
//! right error kind, exercised against the full `PipelineController` rather than the `Mailer`
//! trait in isolation.

use std::sync::Arc;

use async_trait::async_trait;
use rust_agency::cv_tailor::{CvSections, JobRequirements, LlmAnalysis, ParsedCv};
use rust_agency::error::{OrchestrationError, Result as OrchResult};
use rust_agency::events::EventBus;
use rust_agency::hr::HRContactResolver;
use rust_agency::llm::provider::LLMProvider;
use rust_agency::llm::Router as LlmRouter;
use rust_agency::model::{ApplicationStatus, ContactSource, HRContact, JobId, JobPosting, MailerCredentialStatus, UserId};
use rust_agency::pipeline::{Mailer, PipelineController, PipelineOutcome, SendError};
use rust_agency::quota::QuotaLedger;

struct SilentProvider;
#[async_trait]
impl LLMProvider for SilentProvider {
    fn name(&self) -> &str {
        "openai"
    }
    async fn generate(&self, _model: &str, _prompt: &str, _system: Option<&str>) -> OrchResult<String> {
        Ok(String::new())
    }
}

struct ScriptedMailer(SendErrorKind);

enum SendErrorKind {
    Ok,
    TokenRevoked,
    Transient,
}

#[async_trait]
impl Mailer for ScriptedMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str, _pdf: Option<&[u8]>) -> std::result::Result<(), SendError> {
        match self.0 {
            SendErrorKind::Ok => Ok(()),
            SendErrorKind::TokenRevoked => Err(SendError::TokenRevoked("refresh token expired".into())),
            SendErrorKind::Transient => Err(SendError::Transient("connection reset".into())),
        }
    }
}

async fn pipeline_with_mailer(kind: SendErrorKind) -> (Arc<PipelineController>, JobId) {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(LlmRouter::new(quota).with_provider("openai", Arc::new(SilentProvider)));
    let hr = Arc::new(HRContactResolver::new());
    let events = Arc::new(EventBus::new());
    let pipeline = Arc::new(
        PipelineController::new(llm, hr, events).with_mailer(Arc::new(ScriptedMailer(kind))),
    );

    let job_id = JobId::from("job-send-1");
    let posting = JobPosting {
        id: job_id.clone(),
        title: "Engineer".into(),
        company: "Acme".into(),
        location: "Remote".into(),
        salary: None,
        job_type: None,
        description: "desc".into(),
        requirements: vec![],
        source: "test".into(),
        application_url: None,
        posted_date: None,
        match_score: None,
        hr_contact: Some(HRContact {
            name: None,
            email: "hr@acme.com".into(),
            title: None,
            confidence: 0.9,
            source: ContactSource::Hunter,
            verified: true,
        }),
    };
    let cv = ParsedCv { sections: CvSections { skills: vec!["rust".into()], ..Default::default() }, years_experience: 1.0, has_degree: false };
    pipeline.register_job_context(posting, cv, JobRequirements::default()).await;
    (pipeline, job_id)
}

async fn run_to_email_review(pipeline: &PipelineController, job_id: &JobId) -> rust_agency::model::ApplicationId {
    let user = UserId::from("u1");
    let outcome = pipeline.tailor_apply(&user, job_id, LlmAnalysis::default()).await.unwrap();
    let application_id = match outcome {
        PipelineOutcome::Suspended { application_id, .. } => application_id,
        other => panic!("expected CvReview suspension, got {other:?}"),
    };
    pipeline.approve_cv(&user, &application_id).await.unwrap();
    application_id
}

#[tokio::test]
async fn successful_send_marks_application_sent() {
    let (pipeline, job_id) = pipeline_with_mailer(SendErrorKind::Ok).await;
    let application_id = run_to_email_review(&pipeline, &job_id).await;

    let outcome = pipeline.send_email(&UserId::from("u1"), &application_id).await.unwrap();
    match outcome {
        PipelineOutcome::Sent { recipient_email, .. } => assert_eq!(recipient_email, "hr@acme.com"),
        other => panic!("expected Sent, got {other:?}"),
    }
    let app = pipeline.application(&application_id).await.unwrap();
    assert_eq!(app.status, ApplicationStatus::Sent);
    assert!(app.sent_at.is_some());
}

#[tokio::test]
async fn token_revoked_marks_credential_revoked_and_send_failed() {
    let (pipeline, job_id) = pipeline_with_mailer(SendErrorKind::TokenRevoked).await;
    let application_id = run_to_email_review(&pipeline, &job_id).await;

    let err = pipeline.send_email(&UserId::from("u1"), &application_id).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::AuthRevoked { .. }));

    let app = pipeline.application(&application_id).await.unwrap();
    assert_eq!(app.status, ApplicationStatus::SendFailed);
    assert_eq!(app.mailer_credential_status, MailerCredentialStatus::Revoked);
}

#[tokio::test]
async fn transient_send_failure_leaves_credential_active_for_retry() {
    let (pipeline, job_id) = pipeline_with_mailer(SendErrorKind::Transient).await;
    let application_id = run_to_email_review(&pipeline, &job_id).await;

    let err = pipeline.send_email(&UserId::from("u1"), &application_id).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::Transient { .. }));
    assert!(err.is_retryable_in_chain());

    let app = pipeline.application(&application_id).await.unwrap();
    assert_eq!(app.status, ApplicationStatus::SendFailed);
    assert_eq!(app.mailer_credential_status, MailerCredentialStatus::Active, "a transient failure is not a credential problem");
}

#[tokio::test]
async fn send_refuses_when_no_acceptable_hr_contact_is_on_the_application() {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(LlmRouter::new(quota).with_provider("openai", Arc::new(SilentProvider)));
    let hr = Arc::new(HRContactResolver::new());
    let events = Arc::new(EventBus::new());
    let pipeline = Arc::new(
        PipelineController::new(llm, hr, events).with_mailer(Arc::new(ScriptedMailer(SendErrorKind::Ok))),
    );

    let job_id = JobId::from("job-no-hr");
    let posting = JobPosting {
        id: job_id.clone(),
        title: "Engineer".into(),
        company: "Acme".into(),
        location: "Remote".into(),
        salary: None,
        job_type: None,
        description: "desc".into(),
        requirements: vec![],
        source: "test".into(),
        application_url: None,
        posted_date: None,
        match_score: None,
        // No hr_contact and no HR providers configured means resolution yields None, which
        // aborts tailor_apply before an Application even exists.
        hr_contact: None,
    };
    let cv = ParsedCv::default();
    pipeline.register_job_context(posting, cv, JobRequirements::default()).await;

    let outcome = pipeline.tailor_apply(&UserId::from("u1"), &job_id, LlmAnalysis::default()).await.unwrap();
    match outcome {
        PipelineOutcome::Aborted { reason } => assert!(reason.contains("no verified HR email")),
        other => panic!("expected Aborted, got {other:?}"),
    }
}
