//! Supervisor / Intent Router (C9).
//!
//! Every chat turn enters here first (spec §4.9). Action-prefixed turns (`__TAILOR_APPLY__:...`)
//! are UI-originated and dispatch directly into the Pipeline Controller; free text is classified
//! into a closed intent set and, for `continuation`, resolved against the session's most recent
//! assistant metadata. Grounded on
//! `original_source/backend/app/agents/supervisor.py`'s `process_chat_message` (the action-prefix
//! dispatch chain), `_classify_intent` (the four classification rules, folded here into
//! deterministic pre-filters for rules 1-3 and a single LLM call for rule 4 — see DESIGN.md's
//! Open Question resolution), `_APPROVAL_WORDS`/`_is_explicit_approval`, and `_handle_continuation`
//! (the per-metadata-tag resumption table).

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cv_tailor::{JobRequirements, LlmAnalysis, ParsedCv};
use crate::error::{OrchestrationError, Result};
use crate::events::SharedEventBus;
use crate::jobs::{CvSkillsSummary, JobSearchAggregator};
use crate::llm::Router as LlmRouter;
use crate::model::{ApplicationId, CvId, JobId, MessageMetadata, SessionId, UserId};
use crate::pipeline::{PipelineController, PipelineOutcome};
use crate::session::SessionStore;

/// How many of the session's trailing assistant messages the continuation resolver scans
/// looking for one that carries metadata (spec §4.9).
const CONTINUATION_WINDOW: usize = 10;

/// Single-token approvals, carried over from `supervisor.py`'s `_APPROVAL_WORDS` frozenset. The
/// original's own set also holds a few multi-word phrases ("send it", "go ahead", "do it",
/// "sounds good") but its matching loop (`word in _APPROVAL_WORDS for word in tokens[:6]`) checks
/// membership per whitespace-split token, so those phrase entries can never match there either —
/// only their single-word entries below are ever reachable, and this list mirrors exactly those.
const APPROVAL_WORDS: &[&str] = &[
    "yes", "yep", "yeah", "yup", "approve", "approved", "confirm", "confirmed", "send", "proceed", "go", "sure", "alright", "absolutely",
    "correct", "right", "lgtm", "ok", "okay",
];

/// spec.md:145: an explicit approval is the presence of any closed-set token among the first six
/// whitespace-split tokens of the message — not whole-string equality. Grounded on
/// `supervisor.py`'s `_is_explicit_approval`: `tokens = msg.lower().strip().split(); return
/// any(word in _APPROVAL_WORDS for word in tokens[:6])`.
fn is_explicit_approval(text: &str) -> bool {
    text.to_lowercase().split_whitespace().take(6).any(|token| APPROVAL_WORDS.contains(&token))
}

/// Short-affirmative detection for classification rule 1 (spec §4.9): a bare "yes"/"ok"-style
/// reply with no other content is always a continuation, never a fresh intent, regardless of
/// what it is replying to.
fn is_short_affirmative(text: &str) -> bool {
    let normalized = text.trim();
    normalized.split_whitespace().count() <= 3 && is_explicit_approval(normalized)
}

/// Closed-set job-search trigger phrases (classification rule 2), grounded on
/// `supervisor.py`'s `_classify_intent` prompt, which enumerates these as deterministic examples
/// before falling back to the LLM for anything else.
const JOB_SEARCH_PHRASES: &[&str] = &["find me jobs", "search for jobs", "job search", "find jobs", "look for jobs"];

/// Closed-set CV-tailor trigger phrases (classification rule 3).
const CV_TAILOR_PHRASES: &[&str] = &["tailor my cv", "tailor my resume", "update my cv for", "apply to"];

/// Static reply for the `cv_upload` intent — carried verbatim from `supervisor.py`'s own
/// hard-coded response, which points at the out-of-scope upload surface rather than doing work.
const CV_UPLOAD_GUIDANCE: &str = "I'd love to help with your CV! Use the CV upload button in \
    the sidebar to upload your PDF or DOCX file. Once uploaded, I'll automatically parse and \
    analyze it for you.";

/// Static reply for the `interview_prep` intent when reached via free text rather than the
/// `__PREP_INTERVIEW__:{app_id}` action prefix — also carried verbatim from the original.
const INTERVIEW_PREP_GUIDANCE: &str = "I can help you prepare for your interview! After applying \
    to a job, use the 'Prep Interview' action on the application confirmation. I'll generate \
    technical questions, behavioral questions, company research, and salary negotiation tips \
    tailored to that role.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    JobSearch,
    CvTailor,
    CvUpload,
    InterviewPrep,
    CvAnalysis,
    Status,
    Continuation,
    General,
}

/// A parsed `__ACTION__:...` turn (spec §4.9's UI-action prefixes). Any `__..__` prefix not in
/// this set is rejected rather than silently treated as free text.
#[derive(Debug, Clone)]
pub enum Action {
    TailorApply { job_id: JobId },
    ApproveCv { application_id: ApplicationId },
    SendEmail { application_id: ApplicationId },
    RegenerateCv { job_id: JobId },
    PrepInterview { application_id: ApplicationId },
    EditCv { cv_id: CvId, edits_json: String },
    /// `original_message` is the base64-decoded free text the user typed before the CV-selection
    /// prompt interrupted them (spec §6's `__SELECT_CV__:{cv_id}:{pending_intent}:{base64_context}`)
    /// — `None` if the context segment was absent or failed to decode as UTF-8.
    SelectCv { cv_id: CvId, pending_intent: String, original_message: Option<String> },
}

/// Parse a leading `__ACTION__:rest` prefix. Returns `None` for ordinary free text, `Some(Err)`
/// for a `__..__`-shaped prefix that isn't one of the known actions (spec §4.9: "reject any other
/// `__…__` prefix" rather than falling through to natural-language classification).
fn parse_action(text: &str) -> Option<Result<Action>> {
    if !text.starts_with("__") {
        return None;
    }
    let rest = &text[2..];
    let (tag, payload) = rest.split_once("__:").unwrap_or((rest.trim_end_matches("__"), ""));

    let result = match tag {
        "TAILOR_APPLY" => Ok(Action::TailorApply { job_id: JobId::from(payload) }),
        "APPROVE_CV" => Ok(Action::ApproveCv { application_id: ApplicationId::from(payload) }),
        "SEND_EMAIL" => Ok(Action::SendEmail { application_id: ApplicationId::from(payload) }),
        "REGENERATE_CV" => Ok(Action::RegenerateCv { job_id: JobId::from(payload) }),
        "PREP_INTERVIEW" => Ok(Action::PrepInterview { application_id: ApplicationId::from(payload) }),
        "EDIT_CV" => {
            let mut parts = payload.splitn(2, ':');
            match (parts.next(), parts.next()) {
                (Some(cv_id), Some(json)) => Ok(Action::EditCv { cv_id: CvId::from(cv_id), edits_json: json.to_string() }),
                _ => Err(OrchestrationError::validation("__EDIT_CV__ requires {cv_id}:{json}")),
            }
        }
        "SELECT_CV" => {
            let mut parts = payload.splitn(3, ':');
            match (parts.next(), parts.next()) {
                (Some(cv_id), Some(pending_intent)) => {
                    let original_message = parts.next().and_then(decode_base64_context);
                    Ok(Action::SelectCv {
                        cv_id: CvId::from(cv_id),
                        pending_intent: pending_intent.to_string(),
                        original_message,
                    })
                }
                _ => Err(OrchestrationError::validation("__SELECT_CV__ requires {cv_id}:{pending_intent}:{context}")),
            }
        }
        other => Err(OrchestrationError::validation(format!("unknown action prefix __{other}__"))),
    };
    Some(result)
}

/// Best-effort base64 decode of a `__SELECT_CV__` context segment into the original message text.
/// Grounded on `src/orchestrator/speaker.rs`'s `general_purpose::STANDARD` usage. A malformed or
/// non-UTF-8 payload degrades to `None` rather than rejecting the whole action (spec §9's
/// tolerant-parsing rule applied to this wire format too).
fn decode_base64_context(segment: &str) -> Option<String> {
    if segment.is_empty() {
        return None;
    }
    general_purpose::STANDARD
        .decode(segment)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[derive(Debug, Default, Deserialize)]
struct IntentClassification {
    #[serde(default)]
    intent: String,
}

/// Everything the Supervisor needs to drive a CV through the pipeline for a given job: the
/// user's active parsed CV plus the job's derived requirements. Populated out-of-band by CV
/// upload / job search (both out of scope per spec §1) via `set_active_cv`.
struct ActiveCv {
    cv_id: CvId,
    parsed: ParsedCv,
}

pub struct Supervisor {
    llm: Arc<LlmRouter>,
    sessions: Arc<SessionStore>,
    jobs: Arc<JobSearchAggregator>,
    pipeline: Arc<PipelineController>,
    events: SharedEventBus,
    active_cv: Mutex<HashMap<UserId, ActiveCv>>,
    /// Every parsed CV the user has uploaded, keyed by id — distinct from `active_cv` (the one
    /// currently in play). Backs `__SELECT_CV__`, which re-activates a previously uploaded CV by
    /// id rather than the most recently uploaded one.
    cv_store: Mutex<HashMap<CvId, ParsedCv>>,
}

impl Supervisor {
    pub fn new(
        llm: Arc<LlmRouter>,
        sessions: Arc<SessionStore>,
        jobs: Arc<JobSearchAggregator>,
        pipeline: Arc<PipelineController>,
        events: SharedEventBus,
    ) -> Self {
        Self {
            llm,
            sessions,
            jobs,
            pipeline,
            events,
            active_cv: Mutex::new(HashMap::new()),
            cv_store: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_active_cv(&self, user_id: &UserId, cv_id: CvId, parsed: ParsedCv) {
        self.cv_store.lock().await.insert(cv_id.clone(), parsed.clone());
        self.active_cv.lock().await.insert(user_id.clone(), ActiveCv { cv_id, parsed });
    }

    /// Entry point for one chat turn (spec §4.9). Returns the reply text plus optional
    /// structured metadata to attach to the assistant's message.
    pub async fn handle_turn(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        text: &str,
    ) -> Result<(String, Option<MessageMetadata>)> {
        if let Some(action_result) = parse_action(text) {
            return self.dispatch_action(user_id, action_result?).await;
        }

        let intent = self.classify_intent(user_id, session_id, text).await;
        match intent {
            Intent::Continuation => self.handle_continuation(user_id, session_id, text).await,
            Intent::JobSearch => self.handle_job_search(user_id, text).await,
            Intent::CvTailor => self.handle_cv_tailor_request(user_id, text).await,
            Intent::CvUpload => Ok((CV_UPLOAD_GUIDANCE.to_string(), None)),
            Intent::InterviewPrep => Ok((INTERVIEW_PREP_GUIDANCE.to_string(), None)),
            Intent::CvAnalysis => self.handle_cv_analysis(user_id).await,
            Intent::Status => self.handle_status(user_id).await,
            Intent::General => self.handle_general(text).await,
        }
    }

    /// Classification rules 1-3 are deterministic and run before any LLM call, so that the
    /// testable property "classifying the same (history, text) twice yields the same label"
    /// holds for the common cases without depending on a stubbed LLM. Rule 4 (free text that
    /// matches none of the deterministic rules) falls back to a single classification call,
    /// itself defaulting to `general` on any failure — matching `supervisor.py`'s
    /// fallback-to-general behaviour on exception.
    async fn classify_intent(&self, _user_id: &UserId, _session_id: &SessionId, text: &str) -> Intent {
        if is_short_affirmative(text) {
            return Intent::Continuation;
        }
        let lower = text.to_lowercase();
        if JOB_SEARCH_PHRASES.iter().any(|p| lower.contains(p)) {
            return Intent::JobSearch;
        }
        if CV_TAILOR_PHRASES.iter().any(|p| lower.contains(p)) {
            return Intent::CvTailor;
        }

        let prompt = format!(
            "Classify the user's message into exactly one of: job_search, cv_upload, cv_tailor, \
             interview_prep, cv_analysis, status, continuation, general.\n\
             Return JSON {{\"intent\": \"...\"}}.\nMessage: \"{text}\""
        );
        match self.llm.invoke("intent_classify", &prompt, None, None).await {
            Ok(response) => crate::json_tolerant::parse_tolerant(&response)
                .and_then(|v| serde_json::from_value::<IntentClassification>(v).ok())
                .map(|c| match c.intent.as_str() {
                    "job_search" => Intent::JobSearch,
                    "cv_tailor" => Intent::CvTailor,
                    "cv_upload" => Intent::CvUpload,
                    "interview_prep" => Intent::InterviewPrep,
                    "cv_analysis" => Intent::CvAnalysis,
                    "status" => Intent::Status,
                    "continuation" => Intent::Continuation,
                    _ => Intent::General,
                })
                .unwrap_or(Intent::General),
            Err(e) => {
                warn!(error = %e, "intent classification call failed, defaulting to general");
                Intent::General
            }
        }
    }

    /// Resolve a continuation against the session's most recent assistant metadata (spec §4.9's
    /// per-tag resumption table). Grounded on `supervisor.py`'s `_handle_continuation`.
    async fn handle_continuation(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        text: &str,
    ) -> Result<(String, Option<MessageMetadata>)> {
        let last = self
            .sessions
            .most_recent_assistant_metadata(user_id, session_id, CONTINUATION_WINDOW)
            .await
            .map_err(|e| OrchestrationError::invariant_violation(e.to_string()))?;

        let Some(message) = last else {
            return self.handle_general(text).await;
        };
        let Some(metadata) = message.metadata else {
            return self.handle_general(text).await;
        };

        match metadata {
            MessageMetadata::CvReview { application_id, .. } if is_explicit_approval(text) => {
                let outcome = self.pipeline.approve_cv(user_id, &application_id).await?;
                Ok(self.outcome_to_reply(outcome))
            }
            MessageMetadata::EmailReview { application_id, .. } if is_explicit_approval(text) => {
                let outcome = self.pipeline.send_email(user_id, &application_id).await?;
                Ok(self.outcome_to_reply(outcome))
            }
            MessageMetadata::ApplicationSent { .. } if is_explicit_approval(text) => {
                // "Apply to the next one too" — no concrete next-job reference was offered in
                // this turn's text, so hand back to job search rather than guess a job id.
                self.handle_job_search(user_id, "find me more jobs like that").await
            }
            // job_results / interview_ready / cv_selection: the user's free text names a choice
            // (a job title, a CV) rather than a yes/no, which this deterministic layer cannot
            // resolve without another LLM call — fall back to general conversation rather than
            // guess.
            _ => self.handle_general(text).await,
        }
    }

    async fn handle_job_search(&self, user_id: &UserId, text: &str) -> Result<(String, Option<MessageMetadata>)> {
        self.events.agent_started(user_id, "job_hunter", "Searching job boards").await;
        let cv_summary = self.active_cv.lock().await.get(user_id).map(|cv| CvSkillsSummary {
            skills: cv.parsed.sections.skills.clone(),
            years_experience: cv.parsed.years_experience,
            has_degree: cv.parsed.has_degree,
            project_count: cv.parsed.sections.projects.len() as u32,
        });
        let jobs = self.jobs.search(text, cv_summary.as_ref(), 20).await;
        self.events.agent_completed(user_id, "job_hunter", format!("Found {} matching jobs", jobs.len())).await;

        let reply = if jobs.is_empty() {
            "I couldn't find any matching postings right now — try a broader search.".to_string()
        } else {
            format!("Found {} matching jobs. Pick one to tailor your CV for it.", jobs.len())
        };
        Ok((reply, Some(MessageMetadata::JobResults { jobs })))
    }

    /// `__TAILOR_APPLY__` and the natural-language `cv_tailor` intent share this path: resolve
    /// the active CV, analyse it against the job, and hand off to the Pipeline Controller.
    async fn handle_cv_tailor_request(&self, user_id: &UserId, text: &str) -> Result<(String, Option<MessageMetadata>)> {
        let job_id = match extract_job_id(text) {
            Some(id) => id,
            None => return Ok(("Which job would you like me to tailor your CV for?".to_string(), None)),
        };
        self.tailor_apply_for_job(user_id, &job_id).await
    }

    async fn tailor_apply_for_job(&self, user_id: &UserId, job_id: &JobId) -> Result<(String, Option<MessageMetadata>)> {
        let active = self.active_cv.lock().await;
        let Some(active_cv) = active.get(user_id) else {
            return Ok(("Please upload a CV before I can tailor it for this role.".to_string(), None));
        };
        let analysis = self.analyze_cv_for_job(&active_cv.parsed, job_id).await;
        drop(active);

        let outcome = self.pipeline.tailor_apply(user_id, job_id, analysis).await?;
        Ok(self.outcome_to_reply(outcome))
    }

    /// `cv_analysis` intent: summarise the user's active CV rather than querying a CV store
    /// database, since this crate holds parsed CVs in memory (`cv_store`/`active_cv`) rather than
    /// a `UserCV` table. Grounded on `_handle_cv_analysis_request`'s component breakdown.
    async fn handle_cv_analysis(&self, user_id: &UserId) -> Result<(String, Option<MessageMetadata>)> {
        let active = self.active_cv.lock().await;
        let Some(active_cv) = active.get(user_id) else {
            return Ok(("I couldn't find your CV. Please upload it first!".to_string(), None));
        };
        let sections = &active_cv.parsed.sections;
        let reply = format!(
            "CV analysis:\n- Skills: {}\n- Experience: {} years across {} role(s)\n- Education: {}\n- Projects: {}\n\nIs there anything specific you'd like to improve in your profile?",
            if sections.skills.is_empty() { "none listed".to_string() } else { sections.skills.join(", ") },
            active_cv.parsed.years_experience,
            sections.work_experience.len(),
            if sections.education.is_empty() { "none listed".to_string() } else { sections.education.join(", ") },
            sections.projects.len(),
        );
        Ok((reply, None))
    }

    /// `status` intent: a per-user dashboard summary, grounded on `_handle_status_request`'s
    /// CV/jobs/applications counters — jobs-found isn't tracked per user by this crate's Job
    /// Search Aggregator (searches are stateless per spec §4.4), so only CVs and applications
    /// are reported.
    async fn handle_status(&self, user_id: &UserId) -> Result<(String, Option<MessageMetadata>)> {
        let cv_count = usize::from(self.active_cv.lock().await.contains_key(user_id));
        let applications = self.pipeline.applications_for_user(user_id).await;
        let sent = applications.iter().filter(|a| matches!(a.status, crate::model::ApplicationStatus::Sent)).count();
        let reply = format!(
            "Your dashboard:\n- CVs on file: {cv_count}\n- Applications in progress: {}\n- Applications sent: {sent}",
            applications.len(),
        );
        Ok((reply, None))
    }

    async fn dispatch_action(&self, user_id: &UserId, action: Action) -> Result<(String, Option<MessageMetadata>)> {
        match action {
            Action::TailorApply { job_id } | Action::RegenerateCv { job_id } => {
                self.tailor_apply_for_job(user_id, &job_id).await
            }
            Action::ApproveCv { application_id } => {
                let outcome = self.pipeline.approve_cv(user_id, &application_id).await?;
                Ok(self.outcome_to_reply(outcome))
            }
            Action::SendEmail { application_id } => {
                let outcome = self.pipeline.send_email(user_id, &application_id).await?;
                Ok(self.outcome_to_reply(outcome))
            }
            Action::PrepInterview { application_id } => self.prep_interview(user_id, &application_id).await,
            Action::EditCv { cv_id, edits_json } => {
                // Applying the edit to stored CV sections is the CV store's responsibility (out
                // of this component's scope per spec §1); the Supervisor only acknowledges it.
                self.events.workflow_update(user_id, "cv_edit", format!("received edits for {cv_id}")).await;
                let _ = edits_json;
                Ok((format!("Noted your edits to CV {cv_id}."), None))
            }
            Action::SelectCv { cv_id, pending_intent, original_message } => {
                self.events.workflow_update(user_id, "cv_selection", format!("selected {cv_id} for {pending_intent}")).await;

                let Some(parsed) = self.cv_store.lock().await.get(&cv_id).cloned() else {
                    return Ok((format!("I don't have a stored CV with id {cv_id} anymore — please re-upload."), None));
                };
                self.set_active_cv(user_id, cv_id, parsed).await;

                match (pending_intent.as_str(), original_message) {
                    ("job_search", Some(text)) => self.handle_job_search(user_id, &text).await,
                    ("job_search", None) => Ok(("CV selected. What role are you searching for?".to_string(), None)),
                    ("cv_tailor", Some(text)) => self.handle_cv_tailor_request(user_id, &text).await,
                    ("cv_tailor", None) => Ok(("CV selected. Tell me which job to tailor it for.".to_string(), None)),
                    _ => Ok(("CV selected.".to_string(), None)),
                }
            }
        }
    }

    async fn prep_interview(&self, user_id: &UserId, application_id: &ApplicationId) -> Result<(String, Option<MessageMetadata>)> {
        let Some(app) = self.pipeline.application(application_id).await else {
            return Err(OrchestrationError::validation("unknown application id"));
        };
        self.events.agent_started(user_id, "interview_prep", "Preparing interview questions").await;
        let prompt = format!(
            "Generate 5 likely interview questions for a candidate applying to job id {}. Return JSON \
             {{\"questions\": [...]}}.",
            app.job_id
        );
        let questions = match self.llm.invoke("interview_prep", &prompt, None, None).await {
            Ok(text) => crate::json_tolerant::parse_tolerant(&text)
                .and_then(|v| v.get("questions").cloned())
                .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        self.events.agent_completed(user_id, "interview_prep", format!("{} questions ready", questions.len())).await;

        Ok((
            "Here's some interview prep based on this application.".to_string(),
            Some(MessageMetadata::InterviewReady { application_id: application_id.clone(), questions }),
        ))
    }

    async fn handle_general(&self, text: &str) -> Result<(String, Option<MessageMetadata>)> {
        match self.llm.invoke("general_chat", text, None, None).await {
            Ok(reply) => Ok((reply, None)),
            Err(e) => Err(e),
        }
    }

    /// A single LLM call analysing the active CV against a job, tolerant-parsed into
    /// `LlmAnalysis`; any parse or call failure degrades to an empty analysis rather than
    /// aborting the tailor step (spec §9's tolerant-parsing rule — the CV Tailor itself handles
    /// an empty analysis gracefully, per its own fallback tests).
    async fn analyze_cv_for_job(&self, cv: &ParsedCv, job_id: &JobId) -> LlmAnalysis {
        let prompt = format!(
            "Given this candidate's skills ({}) and work history ({}), propose edits to tailor their CV for job {job_id}. \
             Return JSON {{\"cv_sections\": [...], \"non_cv_sections\": [...], \"skills_to_remove\": [...], \"cover_letter\": \"...\"}}.",
            cv.sections.skills.join(", "),
            cv.sections.work_experience.join("; "),
        );
        match self.llm.invoke("cv_analysis", &prompt, None, None).await {
            Ok(text) => crate::json_tolerant::parse_tolerant(&text)
                .and_then(|v| serde_json::from_value::<LlmAnalysis>(v).ok())
                .unwrap_or_default(),
            Err(_) => LlmAnalysis::default(),
        }
    }

    fn outcome_to_reply(&self, outcome: PipelineOutcome) -> (String, Option<MessageMetadata>) {
        match outcome {
            PipelineOutcome::AskCv { job_id } => {
                (format!("I don't have your CV context for job {job_id} anymore — please re-search or re-upload."), None)
            }
            PipelineOutcome::Suspended { metadata, .. } => {
                let reply = match &metadata {
                    MessageMetadata::CvReview { .. } => "Here's your tailored CV. Approve it to continue.".to_string(),
                    MessageMetadata::EmailReview { subject, .. } => {
                        format!("Draft ready: \"{subject}\". Approve to send.")
                    }
                    _ => "Awaiting your approval.".to_string(),
                };
                (reply, Some(metadata))
            }
            PipelineOutcome::Sent { recipient_email, next_job_id, .. } => {
                let mut reply = format!("Application sent to {recipient_email}.");
                if let Some(job_id) = &next_job_id {
                    reply.push_str(&format!(" Want me to tailor your CV for job {job_id} next?"));
                }
                (reply, None)
            }
            PipelineOutcome::Aborted { reason } => (format!("I couldn't proceed: {reason}"), None),
        }
    }
}

/// Best-effort extraction of a job id a user referenced in free text (e.g. pasting a job id back
/// from a prior `job_results` listing). Full reference resolution (matching a title/company
/// phrase against the session's last `job_results`) is left to the `continuation` path; this is
/// only the `__…job_id…__`-shaped literal case the UI actions rely on.
fn extract_job_id(text: &str) -> Option<JobId> {
    text.split_whitespace()
        .find(|token| token.len() >= 8 && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .map(JobId::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_affirmatives_are_continuation_not_intent() {
        assert!(is_short_affirmative("yes"));
        assert!(is_short_affirmative("  Ok  "));
        assert!(!is_short_affirmative("yes please find me jobs in Berlin"));
    }

    #[test]
    fn parse_action_rejects_unknown_prefix() {
        let result = parse_action("__DELETE_EVERYTHING__:oops").unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn parse_action_recognises_tailor_apply() {
        match parse_action("__TAILOR_APPLY__:job-123").unwrap().unwrap() {
            Action::TailorApply { job_id } => assert_eq!(job_id.0, "job-123"),
            _ => panic!("wrong action parsed"),
        }
    }

    #[test]
    fn parse_action_recognises_edit_cv_payload() {
        match parse_action("__EDIT_CV__:cv-1:{\"skills\":[]}").unwrap().unwrap() {
            Action::EditCv { cv_id, edits_json } => {
                assert_eq!(cv_id.0, "cv-1");
                assert_eq!(edits_json, "{\"skills\":[]}");
            }
            _ => panic!("wrong action parsed"),
        }
    }

    #[test]
    fn plain_text_is_not_an_action() {
        assert!(parse_action("find me jobs in Berlin").is_none());
    }

    #[test]
    fn explicit_approval_matches_known_words_only() {
        assert!(is_explicit_approval("yes"));
        assert!(is_explicit_approval("LGTM"));
        assert!(!is_explicit_approval("yes, but let me think about it"));
    }

    #[test]
    fn explicit_approval_matches_a_token_anywhere_in_the_first_six() {
        // spec.md:268's mandatory scenario: "yes send it" must count as approval even though it
        // isn't a verbatim match for any single list entry.
        assert!(is_explicit_approval("yes send it"));
        assert!(is_explicit_approval("go ahead and send it"));
        assert!(is_explicit_approval("please proceed"));
        assert!(!is_explicit_approval("no not yet, I want to review it one more time first"));
    }

    #[test]
    fn parse_action_decodes_select_cv_base64_context() {
        let context = general_purpose::STANDARD.encode("backend engineer in berlin");
        let payload = format!("__SELECT_CV__:cv-1:job_search:{context}");
        match parse_action(&payload).unwrap().unwrap() {
            Action::SelectCv { cv_id, pending_intent, original_message } => {
                assert_eq!(cv_id.0, "cv-1");
                assert_eq!(pending_intent, "job_search");
                assert_eq!(original_message.as_deref(), Some("backend engineer in berlin"));
            }
            _ => panic!("wrong action parsed"),
        }
    }

    #[test]
    fn parse_action_select_cv_tolerates_malformed_context() {
        match parse_action("__SELECT_CV__:cv-1:job_search:not-valid-base64!!").unwrap().unwrap() {
            Action::SelectCv { original_message, .. } => assert!(original_message.is_none()),
            _ => panic!("wrong action parsed"),
        }
    }

    #[test]
    fn parse_action_select_cv_without_context_segment() {
        match parse_action("__SELECT_CV__:cv-1:job_search").unwrap().unwrap() {
            Action::SelectCv { cv_id, pending_intent, original_message } => {
                assert_eq!(cv_id.0, "cv-1");
                assert_eq!(pending_intent, "job_search");
                assert!(original_message.is_none());
            }
            _ => panic!("wrong action parsed"),
        }
    }
}
