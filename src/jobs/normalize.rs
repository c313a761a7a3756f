//! Deterministic normalisation and deduplication rules for job postings (spec §4.4 step 3).
//!
//! Grounded on `original_source/backend/app/agents/job_hunter.py`'s `_COMPANY_NOISE`,
//! `_TITLE_LEVELS`, `_WHITESPACE` regexes and its `_dedup_key`/`_merge_jobs` functions.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::JobPosting;

fn company_noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(inc|llc|ltd|corp|corporation|co|gmbh|plc|the)\b\.?").unwrap()
    })
}

fn title_levels_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(senior|sr|junior|jr|lead|principal|staff|associate|i|ii|iii|iv)\b").unwrap()
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Lower-case, strip common corporate suffixes and the word "the", collapse whitespace.
pub fn normalise_company(company: &str) -> String {
    let stripped = company_noise_re().replace_all(&company.to_lowercase(), "");
    whitespace_re().replace_all(stripped.trim(), " ").trim().to_string()
}

/// Lower-case, strip seniority tokens, collapse whitespace.
pub fn normalise_title(title: &str) -> String {
    let stripped = title_levels_re().replace_all(&title.to_lowercase(), "");
    whitespace_re().replace_all(stripped.trim(), " ").trim().to_string()
}

/// The deduplication key: normalised company concatenated with normalised title, per spec §4.4
/// step 3 ("compute a key from the normalised company name ... concatenated with the normalised
/// title").
pub fn dedup_key(company: &str, title: &str) -> String {
    format!("{}|{}", normalise_company(company), normalise_title(title))
}

/// Merge two postings sharing a dedup key, per spec §4.4 step 3's merge rules: prefer the longer
/// description, keep the first non-empty application URL, union requirements, keep any present
/// salary, append sources.
pub fn merge(a: JobPosting, b: JobPosting) -> JobPosting {
    let description = if b.description.len() > a.description.len() { b.description } else { a.description };
    let application_url = a.application_url.or(b.application_url);
    let salary = a.salary.or(b.salary);

    let mut requirements = a.requirements;
    for r in b.requirements {
        if !requirements.contains(&r) {
            requirements.push(r);
        }
    }

    let source = format!("{}+{}", a.source, b.source);

    let posted_date = match (a.posted_date, b.posted_date) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    };

    JobPosting {
        id: a.id,
        title: a.title,
        company: a.company,
        location: a.location,
        salary,
        job_type: a.job_type.or(b.job_type),
        description,
        requirements,
        source,
        application_url,
        posted_date,
        match_score: a.match_score.or(b.match_score),
        hr_contact: a.hr_contact.or(b.hr_contact),
    }
}

/// Deduplicate a list of postings by `dedup_key`, merging collisions in input order. Idempotent:
/// `dedup(dedup(xs)) == dedup(xs)` (spec §8 round-trip property) because merging an
/// already-merged posting with itself under the same key is a no-op on every field.
pub fn dedup(postings: Vec<JobPosting>) -> Vec<JobPosting> {
    use std::collections::HashMap;

    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, JobPosting> = HashMap::new();

    for posting in postings {
        let key = dedup_key(&posting.company, &posting.title);
        match by_key.remove(&key) {
            Some(existing) => {
                by_key.insert(key, merge(existing, posting));
            }
            None => {
                order.push(key.clone());
                by_key.insert(key, posting);
            }
        }
    }

    order.into_iter().filter_map(|key| by_key.remove(&key)).collect()
}
