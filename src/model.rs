//! Core data model: Session, Message, JobPosting, HRContact, TailoredCV, Application,
//! QuotaCounter — per spec §3.
//!
//! Grounded on `original_source/backend/app/schemas/*.py` and `db/models.py` for field shapes;
//! the dynamic-dict style of the original is replaced with closed, tagged Rust types per the
//! rewrite directive in spec §9 ("dynamic typing / open dicts → tagged variants").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

newtype_id!(UserId);
newtype_id!(SessionId);
newtype_id!(JobId);
newtype_id!(ApplicationId);
newtype_id!(CvId);

/// Which side of a chat message spoke it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Discriminated metadata attached to assistant messages. The closed set of `type` tags drives
/// both rich UI rendering and the continuation logic in the Supervisor (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageMetadata {
    JobResults { jobs: Vec<JobPosting> },
    CvReview { application_id: ApplicationId, tailored_cv: TailoredCV },
    EmailReview { application_id: ApplicationId, subject: String, body: String },
    ApplicationSent { application_id: ApplicationId, recipient_email: String },
    InterviewReady { application_id: ApplicationId, questions: Vec<String> },
    CvSelection { candidates: Vec<CvId>, pending_intent: String },
}

impl MessageMetadata {
    /// The `type` tag as it would be written on the wire — used by continuation logic to match
    /// against spec §4.9's resumption table without round-tripping through JSON.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::JobResults { .. } => "job_results",
            Self::CvReview { .. } => "cv_review",
            Self::EmailReview { .. } => "email_review",
            Self::ApplicationSent { .. } => "application_sent",
            Self::InterviewReady { .. } => "interview_ready",
            Self::CvSelection { .. } => "cv_selection",
        }
    }
}

/// A single chat turn. Only assistant messages carry metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), metadata: None, timestamp: Utc::now() }
    }

    pub fn assistant(text: impl Into<String>, metadata: Option<MessageMetadata>) -> Self {
        Self { role: Role::Assistant, text: text.into(), metadata, timestamp: Utc::now() }
    }
}

/// A normalised job posting produced by the Job Search Aggregator (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: JobId,
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// "+"-joined provider names this posting was merged from, e.g. `"linkedin+indeed"`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_date: Option<DateTime<Utc>>,
    /// Populated once §4.6 scoring runs against a CV; `None` before scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u8>,
    /// Attached by the HR pre-filter (spec §4.4 step 4) once a verified contact is found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr_contact: Option<HRContact>,
}

/// Source of an HR contact lookup. `Guess`, `Llm`, and `Constructed` are explicitly *not*
/// acceptable sources for sending per spec §4.5's acceptance rule, regardless of confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Guess,
    Llm,
    Constructed,
    Hunter,
    Apollo,
    NotFound,
}

impl ContactSource {
    /// Sources spec §4.5/§4.10 forbid from ever being treated as acceptable regardless of
    /// confidence — fabricated or inferred addresses.
    pub fn is_fabricated(&self) -> bool {
        matches!(self, Self::Guess | Self::Llm | Self::Constructed | Self::NotFound)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HRContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub confidence: f32,
    pub source: ContactSource,
    pub verified: bool,
}

impl HRContact {
    /// The acceptance rule from spec §4.5: `verified == true` OR
    /// (`confidence >= 0.5` AND the source is not one of the fabricated ones).
    pub fn is_acceptable(&self) -> bool {
        if self.email.is_empty() {
            return false;
        }
        self.verified || (self.confidence >= 0.5 && !self.source.is_fabricated())
    }

    /// "Stale" per spec §4.10's pre-filter optimisation: missing email, low confidence, or a
    /// fabricated/not-found source. A stale contact triggers a fresh C5 call before sending.
    pub fn is_stale(&self) -> bool {
        self.email.is_empty() || self.confidence < 0.5 || self.source.is_fabricated()
    }
}

/// One bucket entry produced by the CV Tailor's LLM analysis (spec §4.6 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTag {
    Modified,
    New,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub section: String,
    pub tag: ChangeTag,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Rating {
    /// Rating bands from spec §4.6 step 5: >=80 Excellent, >=65 Good, >=50 Fair, else Poor.
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::Excellent
        } else if score >= 65 {
            Self::Good
        } else if score >= 50 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailoredCV {
    pub id: CvId,
    pub original_ref: CvId,
    pub job_ref: JobId,
    /// The merged CV sections, keyed by section name (e.g. "skills", "work_experience",
    /// "projects", "education") — kept as a flexible JSON value since section schemas vary by
    /// CV and this crate does not own CV parsing (out of scope per spec §1).
    pub tailored_sections: serde_json::Value,
    pub cover_letter: String,
    /// Invariant (spec §3): in `[0, 100]`.
    pub ats_score: u8,
    /// Invariant (spec §3): in `[0, 100]`.
    pub match_score: u8,
    pub rating: Rating,
    pub change_log: Vec<ChangeLogEntry>,
}

/// Application state machine (spec §4.10 / §3). Transitions are monotonic along
/// `draft -> pending_approval -> cv_approved -> sent | send_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    PendingApproval,
    CvApproved,
    Sent,
    SendFailed,
}

impl ApplicationStatus {
    /// Whether `self -> next` is a legal monotonic transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (Draft, PendingApproval)
                | (PendingApproval, CvApproved)
                | (CvApproved, Sent)
                | (CvApproved, SendFailed)
                | (SendFailed, CvApproved) // explicit retry re-enters approval-cleared state
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailerCredentialStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub job_id: JobId,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tailored_cv: Option<TailoredCV>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr_contact: Option<HRContact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    pub mailer_credential_status: MailerCredentialStatus,
}

impl Application {
    pub fn new(user_id: UserId, job_id: JobId) -> Self {
        Self {
            id: ApplicationId::new(),
            user_id,
            job_id,
            status: ApplicationStatus::Draft,
            tailored_cv: None,
            hr_contact: None,
            recipient_email: None,
            sent_at: None,
            mailer_credential_status: MailerCredentialStatus::Active,
        }
    }

    /// Attempt a transition, enforcing monotonicity (spec §3 invariant).
    pub fn transition_to(&mut self, next: ApplicationStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!("illegal transition {:?} -> {:?}", self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// Invariant (spec §3): an Application in `sent` must have a non-empty recipient email and a
    /// timestamp.
    pub fn mark_sent(&mut self, recipient_email: String) -> Result<(), String> {
        if recipient_email.is_empty() {
            return Err("cannot mark sent with an empty recipient email".to_string());
        }
        self.transition_to(ApplicationStatus::Sent)?;
        self.recipient_email = Some(recipient_email);
        self.sent_at = Some(Utc::now());
        Ok(())
    }
}

/// The three counter periods tracked per (provider, model) by the Quota Ledger (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Rpd,
    Rpm,
    Tpm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaKey {
    pub provider: &'static str,
    pub model: &'static str,
    pub period: QuotaPeriod,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QuotaCounter {
    pub used: u64,
    pub limit: u64,
}

impl QuotaCounter {
    pub fn pct(&self) -> f32 {
        if self.limit == 0 {
            0.0
        } else {
            (self.used as f32 / self.limit as f32) * 100.0
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit > 0 && self.used >= self.limit
    }
}
