//! End-to-end Job Search Aggregator scenarios (spec §8): fan-out across two overlapping
//! providers, dedup, HR pre-filter admitting only postings with an acceptable contact, and the
//! stale-contact re-resolution path in the Pipeline Controller.

use std::sync::Arc;

use async_trait::async_trait;
use rust_agency::cv_tailor::{CvSections, JobRequirements, LlmAnalysis, ParsedCv};
use rust_agency::error::Result;
use rust_agency::events::EventBus;
use rust_agency::hr::{HRContactResolver, HRLookupProvider};
use rust_agency::jobs::{JobProvider, JobSearchAggregator, ParsedQuery};
use rust_agency::llm::provider::LLMProvider;
use rust_agency::llm::Router as LlmRouter;
use rust_agency::model::{ApplicationStatus, ContactSource, HRContact, JobId, JobPosting, UserId};
use rust_agency::pipeline::PipelineController;
use rust_agency::quota::QuotaLedger;

struct SilentProvider;
#[async_trait]
impl LLMProvider for SilentProvider {
    fn name(&self) -> &str {
        "openai"
    }
    async fn generate(&self, _model: &str, _prompt: &str, _system: Option<&str>) -> Result<String> {
        Ok(String::new())
    }
}

fn posting(id: &str, company: &str, title: &str, source: &str, description: &str) -> JobPosting {
    JobPosting {
        id: JobId::from(id),
        title: title.to_string(),
        company: company.to_string(),
        location: "Remote".to_string(),
        salary: None,
        job_type: None,
        description: description.to_string(),
        requirements: vec!["rust".into()],
        source: source.to_string(),
        application_url: None,
        posted_date: None,
        match_score: None,
        hr_contact: None,
    }
}

struct BoardA;
#[async_trait]
impl JobProvider for BoardA {
    fn name(&self) -> &str {
        "board_a"
    }
    async fn search(&self, _query: &ParsedQuery) -> anyhow::Result<Vec<JobPosting>> {
        Ok(vec![posting("a1", "Acme Corp", "Senior Backend Engineer", "board_a", "short listing")])
    }
}

struct BoardB;
#[async_trait]
impl JobProvider for BoardB {
    fn name(&self) -> &str {
        "board_b"
    }
    async fn search(&self, _query: &ParsedQuery) -> anyhow::Result<Vec<JobPosting>> {
        Ok(vec![posting("b1", "ACME, Inc.", "Backend Engineer II", "board_b", "a much longer listing with rust details")])
    }
}

struct FlakyBoard;
#[async_trait]
impl JobProvider for FlakyBoard {
    fn name(&self) -> &str {
        "flaky"
    }
    async fn search(&self, _query: &ParsedQuery) -> anyhow::Result<Vec<JobPosting>> {
        anyhow::bail!("upstream board is down")
    }
}

struct AcceptingHr;
#[async_trait]
impl HRLookupProvider for AcceptingHr {
    fn name(&self) -> &str {
        "hunter"
    }
    async fn lookup(&self, _company: &str, _role: &str, _domain: Option<&str>) -> anyhow::Result<Option<HRContact>> {
        Ok(Some(HRContact {
            name: Some("Jamie".into()),
            email: "jamie@acme.com".into(),
            title: None,
            confidence: 0.9,
            source: ContactSource::Hunter,
            verified: true,
        }))
    }
}

#[tokio::test]
async fn search_merges_duplicate_postings_and_tolerates_a_failing_provider() {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(LlmRouter::new(quota).with_provider("openai", Arc::new(SilentProvider)));
    let hr = Arc::new(HRContactResolver::new().with_provider(Arc::new(AcceptingHr)));
    let aggregator = JobSearchAggregator::new(llm, hr)
        .with_provider(Arc::new(BoardA))
        .with_provider(Arc::new(BoardB))
        .with_provider(Arc::new(FlakyBoard));

    let results = aggregator.search("backend engineer in berlin", None, 20).await;

    assert_eq!(results.len(), 1, "the two boards' postings should merge into a single deduped entry");
    assert_eq!(results[0].source, "board_a+board_b");
    assert!(results[0].hr_contact.is_some(), "a postng with an acceptable HR contact must survive the pre-filter");
}

struct RejectingHr;
#[async_trait]
impl HRLookupProvider for RejectingHr {
    fn name(&self) -> &str {
        "guesser"
    }
    async fn lookup(&self, _company: &str, _role: &str, _domain: Option<&str>) -> anyhow::Result<Option<HRContact>> {
        Ok(Some(HRContact {
            name: None,
            email: "careers@acme.com".into(),
            title: None,
            confidence: 0.9,
            source: ContactSource::Guess,
            verified: false,
        }))
    }
}

#[tokio::test]
async fn hr_prefilter_drops_postings_with_no_acceptable_contact() {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(LlmRouter::new(quota).with_provider("openai", Arc::new(SilentProvider)));
    let hr = Arc::new(HRContactResolver::new().with_provider(Arc::new(RejectingHr)));
    let aggregator = JobSearchAggregator::new(llm, hr).with_provider(Arc::new(BoardA));

    let results = aggregator.search("backend engineer", None, 20).await;
    assert!(results.is_empty(), "a fabricated-source-only contact must never let a posting through");
}

#[tokio::test]
async fn pipeline_reresolves_a_stale_hr_contact_before_suspending() {
    let quota = Arc::new(QuotaLedger::new());
    let llm = Arc::new(LlmRouter::new(quota).with_provider("openai", Arc::new(SilentProvider)));
    let hr = Arc::new(HRContactResolver::new().with_provider(Arc::new(AcceptingHr)));
    let events = Arc::new(EventBus::new());
    let pipeline = PipelineController::new(llm, hr, events);

    let job_id = JobId::from("job-stale-1");
    let mut stale_posting = posting("job-stale-1", "Acme", "Engineer", "board_a", "desc");
    // Attached during aggregation with a fabricated, now-stale source.
    stale_posting.hr_contact = Some(HRContact {
        name: None,
        email: String::new(),
        title: None,
        confidence: 0.1,
        source: ContactSource::NotFound,
        verified: false,
    });
    let cv = ParsedCv { sections: CvSections { skills: vec!["rust".into()], ..Default::default() }, years_experience: 2.0, has_degree: false };
    pipeline.register_job_context(stale_posting, cv, JobRequirements::default()).await;

    let outcome = pipeline.tailor_apply(&UserId::from("u1"), &job_id, LlmAnalysis::default()).await.unwrap();
    let application_id = match outcome {
        rust_agency::pipeline::PipelineOutcome::Suspended { application_id, .. } => application_id,
        other => panic!("expected the stale contact to be re-resolved and the pipeline to suspend, got {other:?}"),
    };
    let app = pipeline.application(&application_id).await.unwrap();
    assert_eq!(app.status, ApplicationStatus::PendingApproval);
    assert_eq!(app.hr_contact.unwrap().email, "jamie@acme.com", "the re-resolved contact must replace the stale one");
}
