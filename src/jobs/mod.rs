//! Job Search Aggregator (C4).
//!
//! Contract (spec §4.4): `search(query_text, cv?) -> [JobPosting]` ranked by match score.
//! Grounded on `original_source/backend/app/agents/job_hunter.py`'s `search_jobs()` flow
//! (query-parsing -> fan-out -> dedup -> HR pre-filter -> score -> sort -> truncate).

pub mod normalize;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cv_tailor::{self, CvSections, JobRequirements};
use crate::hr::HRContactResolver;
use crate::llm::Router as LlmRouter;
use crate::model::JobPosting;

/// Parsed query produced by the single LLM call in spec §4.4 step 1.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParsedQuery {
    pub title: String,
    pub location: String,
    #[serde(default)]
    pub country_code: String,
}

/// A job-board adapter. Out of scope per spec §1 is the third-party API itself; this trait is
/// the seam an adapter plugs into.
#[async_trait]
pub trait JobProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &ParsedQuery) -> anyhow::Result<Vec<JobPosting>>;
}

/// Cheap country-code override table, applied when the LLM leaves `country_code` empty (spec
/// §4.4 step 1). Grounded on `job_hunter.py`'s substring override table.
fn country_code_override(location: &str) -> Option<&'static str> {
    let lower = location.to_lowercase();
    let table: &[(&str, &str)] = &[
        ("united states", "US"),
        ("usa", "US"),
        ("united kingdom", "GB"),
        ("uk", "GB"),
        ("germany", "DE"),
        ("canada", "CA"),
        ("india", "IN"),
        ("remote", ""),
    ];
    table.iter().find(|(needle, _)| lower.contains(needle)).map(|(_, code)| *code)
}

/// A minimal parsed CV used only for §4.4 step 5 scoring; full CV parsing is out of scope (spec
/// §1).
#[derive(Debug, Clone, Default)]
pub struct CvSkillsSummary {
    pub skills: Vec<String>,
    pub years_experience: f32,
    pub has_degree: bool,
    pub project_count: u32,
}

pub struct JobSearchAggregator {
    providers: Vec<Arc<dyn JobProvider>>,
    hr_resolver: Arc<HRContactResolver>,
    llm: Arc<LlmRouter>,
    provider_timeout: Duration,
    hr_prefilter_concurrency: usize,
}

impl JobSearchAggregator {
    pub fn new(llm: Arc<LlmRouter>, hr_resolver: Arc<HRContactResolver>) -> Self {
        Self {
            providers: Vec::new(),
            hr_resolver,
            llm,
            provider_timeout: Duration::from_secs(30),
            hr_prefilter_concurrency: 8,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn JobProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Step 1: a single LLM call turns free text into `{title, location, country_code}`, with a
    /// substring override when the LLM leaves `country_code` empty.
    async fn parse_query(&self, query_text: &str) -> ParsedQuery {
        let prompt = format!(
            "Extract a job search query as JSON {{\"title\": ..., \"location\": ..., \"country_code\": ...}} from: \"{query_text}\""
        );
        let response = self.llm.invoke("job_query_parse", &prompt, None, None).await;

        let mut parsed = match response {
            Ok(text) => crate::json_tolerant::parse_tolerant(&text)
                .and_then(|v| serde_json::from_value::<ParsedQuery>(v).ok())
                .unwrap_or_default(),
            Err(_) => ParsedQuery::default(),
        };

        if parsed.country_code.is_empty() {
            if let Some(code) = country_code_override(&parsed.location) {
                parsed.country_code = code.to_string();
            }
        }

        parsed
    }

    /// Full pipeline: parse -> fan-out -> dedup -> HR pre-filter -> score -> sort -> truncate.
    pub async fn search(
        &self,
        query_text: &str,
        cv: Option<&CvSkillsSummary>,
        limit: usize,
    ) -> Vec<JobPosting> {
        let parsed = self.parse_query(query_text).await;

        // Step 2: fan-out, each bounded by a per-provider timeout; a failing provider is logged
        // and skipped, never aborting the aggregation.
        let fanout = self.providers.iter().map(|provider| {
            let provider = provider.clone();
            let parsed = parsed.clone();
            let timeout = self.provider_timeout;
            async move {
                match tokio::time::timeout(timeout, provider.search(&parsed)).await {
                    Ok(Ok(postings)) => postings,
                    Ok(Err(e)) => {
                        warn!(provider = provider.name(), error = %e, "job provider failed, skipping");
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(provider = provider.name(), "job provider timed out, skipping");
                        Vec::new()
                    }
                }
            }
        });
        let all_postings: Vec<JobPosting> = join_all(fanout).await.into_iter().flatten().collect();

        // Step 3: dedup.
        let deduped = normalize::dedup(all_postings);

        // Step 4: HR pre-filter, bounded concurrency.
        let prefiltered = self.hr_prefilter(deduped).await;

        // Step 5: scoring, sort desc, truncate. Tie-break: later posted_date first, then input
        // order (a stable sort preserves input order among equal keys).
        let mut scored: Vec<JobPosting> = prefiltered
            .into_iter()
            .map(|mut posting| {
                if let Some(cv) = cv {
                    posting.match_score = Some(score_job_match(&posting, cv));
                }
                posting
            })
            .collect();

        scored.sort_by(|a, b| {
            let score_cmp = b.match_score.unwrap_or(0).cmp(&a.match_score.unwrap_or(0));
            if score_cmp != std::cmp::Ordering::Equal {
                return score_cmp;
            }
            b.posted_date.cmp(&a.posted_date)
        });

        scored.truncate(limit);
        scored
    }

    /// Step 4: for each deduped posting, ask the HR resolver in parallel (bounded worker pool,
    /// default concurrency 8 per spec §4.4 step 4). Only postings with an accepted contact
    /// proceed.
    async fn hr_prefilter(&self, postings: Vec<JobPosting>) -> Vec<JobPosting> {
        use futures::stream::{self, StreamExt};

        stream::iter(postings)
            .map(|posting| {
                let resolver = self.hr_resolver.clone();
                async move {
                    let company = posting.company.clone();
                    let title = posting.title.clone();
                    match resolver.resolve(&company, &title, None).await {
                        Some(contact) => {
                            let mut posting = posting;
                            posting.hr_contact = Some(contact);
                            Some(posting)
                        }
                        None => None,
                    }
                }
            })
            .buffer_unordered(self.hr_prefilter_concurrency)
            .filter_map(|result| async move { result })
            .collect()
            .await
    }
}

fn required_years_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\+?\s*years?").unwrap())
}

/// Best-effort extraction of a job's stated experience/degree requirements from its free-text
/// description and requirements list — this crate's `JobPosting` (spec §3) has no structured
/// `required_years`/`requires_degree` fields, so §4.6's weighted formula needs these derived
/// before it can be reused here at all.
fn job_requirements(posting: &JobPosting) -> JobRequirements {
    let text = format!("{} {}", posting.description, posting.requirements.join(" ")).to_lowercase();
    let required_years = required_years_re()
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .unwrap_or(0.0);
    let requires_degree = ["degree", "bachelor", "b.s.", "bsc", "master"].iter().any(|kw| text.contains(kw));

    JobRequirements { required_years, requires_degree, keywords: posting.requirements.clone() }
}

/// Step 5 scoring rules (spec §4.4 step 5, cross-referenced with §4.6's scoring weights): this is
/// a *job-match* pre-filter score, distinct from the CV Tailor's post-tailoring `match_score`, but
/// both must use the same weighted formula (skills 35 / experience 25 / education 15 / projects
/// 15 / density 10) per spec §4.6 — so this delegates to `cv_tailor::score` rather than
/// re-deriving an ad-hoc fraction that only looks at the CV's skills list.
pub fn score_job_match(posting: &JobPosting, cv: &CvSkillsSummary) -> u8 {
    let sections = CvSections {
        skills: cv.skills.clone(),
        work_experience: Vec::new(),
        education: Vec::new(),
        projects: vec![String::new(); cv.project_count as usize],
    };
    let job = job_requirements(posting);
    let (score, _rating) = cv_tailor::score(&sections, cv.years_experience, cv.has_degree, &job);
    score
}
