//! Email Composer (C7).
//!
//! Produce `{subject, body}` from (job, cv, recruiter): a single LLM call with formatting
//! constraints, treated as a function returning two strings (spec §4.7). Grounded on
//! `original_source/backend/app/agents/email_sender.py`'s prompt construction and its tolerant
//! JSON parsing with a minimally-valid fallback draft.

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::Router as LlmRouter;
use crate::model::HRContact;

pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
}

pub struct EmailComposer {
    llm: Arc<LlmRouter>,
}

impl EmailComposer {
    pub fn new(llm: Arc<LlmRouter>) -> Self {
        Self { llm }
    }

    /// Compose an outreach email for `job_title` at `company_name`, addressed to `recruiter`,
    /// summarising `candidate_summary` and the top matched skills. Empty strings in the return
    /// value are acceptable (spec §4.7) — they produce a minimally valid draft the user edits
    /// before sending, matching `email_sender.py`'s own fallback-on-parse-failure behaviour.
    pub async fn compose(
        &self,
        job_title: &str,
        company_name: &str,
        recruiter: &HRContact,
        candidate_summary: &str,
        matched_skills: &[String],
    ) -> EmailDraft {
        let recruiter_name = recruiter.name.as_deref().unwrap_or("Hiring Manager");
        let truncated_summary: String = candidate_summary.chars().take(500).collect();
        let prompt = format!(
            "Draft a concise outreach email. Return JSON {{\"subject\": ..., \"body\": ...}}.\n\
             Role: {job_title}\nCompany: {company_name}\nRecruiter: {recruiter_name}\n\
             Candidate summary: {truncated_summary}\nMatched skills: {}",
            matched_skills.iter().take(5).cloned().collect::<Vec<_>>().join(", "),
        );

        let response = self.llm.invoke("email_compose", &prompt, None, None).await;

        match response {
            Ok(text) => match crate::json_tolerant::parse_tolerant(&text).and_then(|v| serde_json::from_value::<RawDraft>(v).ok()) {
                Some(draft) if !draft.subject.is_empty() || !draft.body.is_empty() => {
                    EmailDraft { subject: draft.subject, body: draft.body }
                }
                _ => self.fallback(job_title, company_name, recruiter_name),
            },
            Err(_) => self.fallback(job_title, company_name, recruiter_name),
        }
    }

    fn fallback(&self, job_title: &str, company_name: &str, recruiter_name: &str) -> EmailDraft {
        EmailDraft {
            subject: format!("Application for {job_title}"),
            body: format!(
                "Hi {recruiter_name},\n\nPlease find my application attached for the {job_title} position at {company_name}.\n\nBest regards,"
            ),
        }
    }
}
