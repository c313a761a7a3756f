//! Pipeline Controller (C10).
//!
//! Sequences a per-job application through C6 (CV Tailor) and C7 (Email Composer) with two
//! suspension points for human approval (spec §4.10). Grounded on
//! `original_source/backend/app/orchestration/pipeline_controller.py`'s `run_full_pipeline` for
//! the node sequence and on `supervisor.py`'s `_handle_tailor_apply` / `_handle_approve_cv` /
//! `_handle_send_email` for the concrete per-step bodies the pipeline-controller shell defers to
//! in the original (the `app/agents/graph.py` node functions it imports).
//!
//! A SUSPEND is implemented exactly per spec §5: it is a logical return from the turn, not a
//! held task. The caller (Supervisor) persists the returned `MessageMetadata` into the session
//! log; a later turn re-enters at the matching arrow by calling `approve_cv`/`send_email` with
//! the same `application_id`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cv_tailor::{self, JobRequirements, LlmAnalysis, ParsedCv};
use crate::email::EmailComposer;
use crate::error::{OrchestrationError, Result};
use crate::events::SharedEventBus;
use crate::hr::HRContactResolver;
use crate::llm::Router as LlmRouter;
use crate::model::{
    Application, ApplicationId, ApplicationStatus, CvId, HRContact, JobId, JobPosting,
    MessageMetadata, TailoredCV, UserId,
};

/// The PDF-rendering collaborator (out of scope per spec §1 — the core treats it as a function
/// from a tailored CV to bytes).
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, cv: &TailoredCV) -> anyhow::Result<Vec<u8>>;
}

/// A renderer that always fails, standing in until a real PDF backend is wired — the pipeline
/// still suspends into `email_review` on failure rather than silently skipping the attachment,
/// mirroring `supervisor.py`'s `_handle_approve_cv`, which logs a PDF failure and proceeds to the
/// email-review step anyway (the attachment is best-effort, not a hard gate).
pub struct NullPdfRenderer;

#[async_trait]
impl PdfRenderer for NullPdfRenderer {
    async fn render(&self, _cv: &TailoredCV) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no PDF renderer configured")
    }
}

/// Categorised send failures (spec §4.10 "Send failures"). Grounded on
/// `supervisor.py`'s `_handle_send_email` branch on `error_code == "token_revoked"` vs. a plain
/// `send_error` string.
#[derive(Debug, Clone)]
pub enum SendError {
    TokenRevoked(String),
    Transient(String),
    PermanentConfig(String),
}

/// The mail-delivery collaborator (out of scope per spec §1 — third-party mailer API).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        pdf_attachment: Option<&[u8]>,
    ) -> std::result::Result<(), SendError>;
}

/// No mailer credential configured: every send is a `permanent_config` failure, matching spec
/// §6's "mail send optional" configuration note.
pub struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str, _pdf: Option<&[u8]>) -> std::result::Result<(), SendError> {
        Err(SendError::PermanentConfig("mailer OAuth client id/secret not configured".to_string()))
    }
}

/// What the pipeline produced for one call into it. The Supervisor turns this into
/// `(reply_text, metadata)`.
pub enum PipelineOutcome {
    /// `cv_selected?` was no — the caller must resolve a CV selection before the pipeline can
    /// start (spec §4.10's `ask_cv` node).
    AskCv { job_id: JobId },
    /// A SUSPEND: the turn ends here: `metadata` is persisted by the caller, the next turn's
    /// explicit approval resumes at the matching step.
    Suspended { application_id: ApplicationId, metadata: MessageMetadata },
    /// `send_email` succeeded.
    Sent { application_id: ApplicationId, recipient_email: String, next_job_id: Option<JobId> },
    /// The pipeline refused to proceed (stale HR contact with no re-resolution, for instance) —
    /// never a silent skip to sending.
    Aborted { reason: String },
}

struct HeldJob {
    posting: JobPosting,
    cv: ParsedCv,
    job_requirements: JobRequirements,
}

/// Per-(user, job) pipeline state, held in memory for the lifetime of the process (spec §4.10
/// does not require durability beyond a session; persistence is an external collaborator's
/// concern per spec §1).
pub struct PipelineController {
    llm: Arc<LlmRouter>,
    hr: Arc<HRContactResolver>,
    events: SharedEventBus,
    mailer: Arc<dyn Mailer>,
    pdf: Arc<dyn PdfRenderer>,
    applications: Mutex<HashMap<ApplicationId, Application>>,
    /// `job_id -> application_id` so a repeat `__TAILOR_APPLY__` for the same job resumes the
    /// existing Application rather than creating a duplicate.
    by_job: Mutex<HashMap<JobId, ApplicationId>>,
    jobs: Mutex<HashMap<JobId, HeldJob>>,
    /// Composed `{subject, body}` per application, kept outside `Application` (spec §3 doesn't
    /// name a draft field on it) so `approve_cv`/`send_email` can retrieve what `tailor_apply`
    /// drafted without re-invoking the Email Composer.
    drafts: Mutex<HashMap<ApplicationId, (String, String)>>,
}

impl PipelineController {
    pub fn new(llm: Arc<LlmRouter>, hr: Arc<HRContactResolver>, events: SharedEventBus) -> Self {
        Self {
            llm,
            hr,
            events,
            mailer: Arc::new(UnconfiguredMailer),
            pdf: Arc::new(NullPdfRenderer),
            applications: Mutex::new(HashMap::new()),
            by_job: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
            drafts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_pdf_renderer(mut self, pdf: Arc<dyn PdfRenderer>) -> Self {
        self.pdf = pdf;
        self
    }

    /// Register the posting + parsed CV context a job needs for tailoring, keyed by job id. The
    /// Job Search Aggregator (C4) and CV ingestion (out of scope, §6) are the producers of this
    /// data; the pipeline only consumes it.
    pub async fn register_job_context(&self, posting: JobPosting, cv: ParsedCv, job_requirements: JobRequirements) {
        let job_id = posting.id.clone();
        self.jobs.lock().await.insert(job_id, HeldJob { posting, cv, job_requirements });
    }

    pub async fn application(&self, id: &ApplicationId) -> Option<Application> {
        self.applications.lock().await.get(id).cloned()
    }

    /// Backs the `status` intent (spec §4.9): a per-user count of in-flight/sent applications,
    /// grounded on `_handle_status_request`'s dashboard counters.
    pub async fn applications_for_user(&self, user_id: &UserId) -> Vec<Application> {
        self.applications.lock().await.values().filter(|app| &app.user_id == user_id).cloned().collect()
    }

    /// `start`/`tailor_cv` arrow in spec §4.10's diagram: entry point for `__TAILOR_APPLY__` and
    /// the natural-language `cv_tailor` intent alike.
    pub async fn tailor_apply(&self, user_id: &UserId, job_id: &JobId, llm_analysis: LlmAnalysis) -> Result<PipelineOutcome> {
        let held = {
            let jobs = self.jobs.lock().await;
            match jobs.get(job_id) {
                Some(h) => (h.posting.clone(), h.cv.clone(), h.job_requirements.clone()),
                None => return Ok(PipelineOutcome::AskCv { job_id: job_id.clone() }),
            }
        };
        let (posting, cv, job_requirements) = held;

        self.events.agent_started(user_id, "cv_tailor", format!("Tailoring CV for {}", posting.title)).await;
        let tailored = cv_tailor::tailor(&cv, &job_requirements, &llm_analysis);
        self.events
            .agent_progress(user_id, "cv_tailor", 1, 3, format!("Match score: {}", tailored.match_score))
            .await;

        let application_id = {
            let mut by_job = self.by_job.lock().await;
            match by_job.get(job_id) {
                Some(id) => id.clone(),
                None => {
                    let mut app = Application::new(user_id.clone(), job_id.clone());
                    let id = app.id.clone();
                    app.transition_to(ApplicationStatus::PendingApproval)
                        .map_err(OrchestrationError::invariant_violation)?;
                    self.applications.lock().await.insert(id.clone(), app);
                    by_job.insert(job_id.clone(), id.clone());
                    id
                }
            }
        };

        // load_hr_contact from the pre-filter; stale? -> re_resolve (spec §4.10).
        self.events.agent_progress(user_id, "hr_finder", 2, 3, "Checking recruiter contact").await;
        let contact = match self.load_or_reresolve_hr(&posting).await {
            Some(c) => c,
            None => {
                self.events
                    .agent_error(user_id, "hr_finder", format!("no verified HR email for {}", posting.company))
                    .await;
                return Ok(PipelineOutcome::Aborted {
                    reason: format!("no verified HR email for {}", posting.company),
                });
            }
        };

        self.events.agent_progress(user_id, "email_composer", 3, 3, "Drafting outreach email").await;
        let candidate_summary = cv.sections.skills.join(", ");
        let composer = EmailComposer::new(self.llm.clone());
        let draft = composer
            .compose(&posting.title, &posting.company, &contact, &candidate_summary, &cv.sections.skills)
            .await;

        let tailored_cv = TailoredCV {
            id: CvId::new(),
            original_ref: CvId::new(),
            job_ref: job_id.clone(),
            tailored_sections: serde_json::to_value(&tailored.sections).unwrap_or(serde_json::Value::Null),
            cover_letter: tailored.cover_letter.clone(),
            ats_score: tailored.ats_score,
            match_score: tailored.match_score,
            rating: tailored.rating,
            change_log: tailored.change_log.clone(),
        };

        {
            let mut applications = self.applications.lock().await;
            if let Some(app) = applications.get_mut(&application_id) {
                app.tailored_cv = Some(tailored_cv.clone());
                app.hr_contact = Some(contact.clone());
            }
        }

        self.events.agent_completed(user_id, "pipeline", "CV tailored, awaiting approval").await;
        self.events.approval_requested(user_id, application_id.to_string(), "cv_review").await;

        // Stash the composed draft alongside the Application for the subsequent email_review
        // suspension, keyed by a side table to avoid widening `Application` with pipeline-only
        // fields the data model (spec §3) doesn't name.
        self.stash_draft(&application_id, draft.subject.clone(), draft.body.clone()).await;

        Ok(PipelineOutcome::Suspended {
            application_id: application_id.clone(),
            metadata: MessageMetadata::CvReview { application_id, tailored_cv },
        })
    }

    /// `approve_cv` -> `render_pdf` -> SUSPEND(email_review), per spec §4.10.
    pub async fn approve_cv(&self, user_id: &UserId, application_id: &ApplicationId) -> Result<PipelineOutcome> {
        let tailored_cv = {
            let mut applications = self.applications.lock().await;
            let app = applications
                .get_mut(application_id)
                .ok_or_else(|| OrchestrationError::validation("unknown application id"))?;
            app.transition_to(ApplicationStatus::CvApproved).map_err(OrchestrationError::invariant_violation)?;
            app.tailored_cv.clone().ok_or_else(|| OrchestrationError::invariant_violation("no tailored CV to approve"))?
        };

        self.events.agent_started(user_id, "pdf_generator", "Rendering application PDF").await;
        match self.pdf.render(&tailored_cv).await {
            Ok(_bytes) => {
                self.events.agent_completed(user_id, "pdf_generator", "PDF generated").await;
            }
            Err(e) => {
                // Best-effort per `supervisor.py`'s `_handle_approve_cv`: a PDF failure logs and
                // proceeds to email review rather than aborting the pipeline.
                warn!(error = %e, "PDF generation failed, proceeding to email review without an attachment");
                self.events.agent_error(user_id, "pdf_generator", format!("PDF generation failed: {e}")).await;
            }
        }

        let (subject, body) = self.drafted(application_id).await.unwrap_or_default();
        self.events.approval_requested(user_id, application_id.to_string(), "email_review").await;

        Ok(PipelineOutcome::Suspended {
            application_id: application_id.clone(),
            metadata: MessageMetadata::EmailReview { application_id: application_id.clone(), subject, body },
        })
    }

    /// `send_email` (external, with PDF attachment) -> `sent` | `send_failed`, per spec §4.10.
    pub async fn send_email(&self, user_id: &UserId, application_id: &ApplicationId) -> Result<PipelineOutcome> {
        // Snapshot everything needed before any external .await so the applications lock is
        // never held across the PDF render or the mailer call.
        let (recipient_email, tailored_cv, job_id) = {
            let applications = self.applications.lock().await;
            let app = applications
                .get(application_id)
                .ok_or_else(|| OrchestrationError::validation("unknown application id"))?;
            let contact = app
                .hr_contact
                .as_ref()
                .ok_or_else(|| OrchestrationError::invariant_violation("no HR contact on this application"))?;
            if !contact.is_acceptable() {
                return Ok(PipelineOutcome::Aborted {
                    reason: "no verified HR email for this application — refusing to send".to_string(),
                });
            }
            (contact.email.clone(), app.tailored_cv.clone(), app.job_id.clone())
        };

        let (subject, body) = self.drafted(application_id).await.unwrap_or_default();
        let pdf_bytes = match &tailored_cv {
            Some(cv) => self.pdf.render(cv).await.ok(),
            None => None,
        };

        self.events.agent_started(user_id, "email_sender", format!("Sending email to {recipient_email}")).await;
        match self.mailer.send(&recipient_email, &subject, &body, pdf_bytes.as_deref()).await {
            Ok(()) => {
                let mut applications = self.applications.lock().await;
                let app = applications.get_mut(application_id).expect("checked above");
                app.mark_sent(recipient_email.clone()).map_err(OrchestrationError::invariant_violation)?;
                drop(applications);

                self.events.agent_completed(user_id, "email_sender", "Application sent").await;
                let next_job_id = self.next_job_suggestion(&job_id).await;
                Ok(PipelineOutcome::Sent { application_id: application_id.clone(), recipient_email, next_job_id })
            }
            Err(SendError::TokenRevoked(msg)) => {
                let mut applications = self.applications.lock().await;
                let app = applications.get_mut(application_id).expect("checked above");
                app.mailer_credential_status = crate::model::MailerCredentialStatus::Revoked;
                let _ = app.transition_to(ApplicationStatus::SendFailed);
                drop(applications);

                self.events.agent_error(user_id, "email_sender", format!("mailer credential revoked: {msg}")).await;
                Err(OrchestrationError::auth_revoked(msg))
            }
            Err(SendError::Transient(msg)) => {
                let mut applications = self.applications.lock().await;
                let app = applications.get_mut(application_id).expect("checked above");
                let _ = app.transition_to(ApplicationStatus::SendFailed);
                drop(applications);

                self.events.agent_error(user_id, "email_sender", format!("send failed (retryable): {msg}")).await;
                Err(OrchestrationError::transient("mailer", msg))
            }
            Err(SendError::PermanentConfig(msg)) => {
                let mut applications = self.applications.lock().await;
                let app = applications.get_mut(application_id).expect("checked above");
                let _ = app.transition_to(ApplicationStatus::SendFailed);
                drop(applications);

                self.events.agent_error(user_id, "email_sender", format!("mailer not configured: {msg}")).await;
                Err(OrchestrationError::permanent_config("mailer", msg))
            }
        }
    }

    /// Pre-filter optimisation (spec §4.10): reuse the contact attached during C4's aggregation
    /// unless it is stale, in which case re-resolve via C5. Repeated `not_found` aborts.
    async fn load_or_reresolve_hr(&self, posting: &JobPosting) -> Option<HRContact> {
        match &posting.hr_contact {
            Some(contact) if !contact.is_stale() => Some(contact.clone()),
            _ => self.hr.resolve(&posting.company, &posting.title, None).await,
        }
    }

    async fn next_job_suggestion(&self, current_job_id: &JobId) -> Option<JobId> {
        let jobs = self.jobs.lock().await;
        jobs.keys().find(|id| *id != current_job_id).cloned()
    }

    // --- draft side-table: keeps `Application`/`TailoredCV` matching spec §3 exactly, while
    // still letting `approve_cv`/`send_email` retrieve the composed subject/body. ---

    async fn stash_draft(&self, application_id: &ApplicationId, subject: String, body: String) {
        let mut drafts = self.drafts.lock().await;
        drafts.insert(application_id.clone(), (subject, body));
    }

    async fn drafted(&self, application_id: &ApplicationId) -> Option<(String, String)> {
        self.drafts.lock().await.get(application_id).cloned()
    }
}
