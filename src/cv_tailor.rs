//! CV Tailor (C6).
//!
//! Contract (spec §4.6): `tailor(parsed_cv, job) -> {tailored_cv, cover_letter, change_log,
//! ats_score, match_score, analysis}`. Grounded on
//! `original_source/backend/app/agents/cv_tailor.py` for the fuzzy-match algorithm, fabrication
//! cap formula, and tolerant JSON parsing; on
//! `original_source/BowJob-main/cv-jd-matching/improvement_engine.py` for the scoring weights and
//! bands. Pure given (CV, job, LLM response): re-running with an identical analysis produces
//! byte-identical output (spec §4.6 closing paragraph) — nothing in this module reads the clock
//! or any other ambient state.

use serde::{Deserialize, Serialize};

use crate::model::{ChangeLogEntry, ChangeTag, Rating};

/// A minimal, section-oriented view of a parsed résumé. Full CV parsing (PDF/DOCX extraction) is
/// out of scope per spec §1; this is the shape the orchestration layer needs to merge and score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CvSections {
    pub skills: Vec<String>,
    pub work_experience: Vec<String>,
    pub education: Vec<String>,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedCv {
    pub sections: CvSections,
    pub years_experience: f32,
    pub has_degree: bool,
}

impl ParsedCv {
    fn full_text(&self) -> String {
        [
            self.sections.skills.join(" "),
            self.sections.work_experience.join(" "),
            self.sections.education.join(" "),
            self.sections.projects.join(" "),
        ]
        .join(" ")
        .to_lowercase()
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobRequirements {
    pub required_years: f32,
    pub requires_degree: bool,
    pub keywords: Vec<String>,
}

/// A single edit proposed by the LLM's analysis (spec §4.6 step 2): an edit to a field the CV
/// already has (`cv_sections`) or an addition to a field that is absent/empty
/// (`non_cv_sections`). Each carries a `tag` and, when `modified`, the original text it replaces.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisEdit {
    pub section: String,
    pub tag: ChangeTag,
    pub text: String,
    #[serde(default)]
    pub original: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmAnalysis {
    #[serde(default)]
    pub cv_sections: Vec<AnalysisEdit>,
    #[serde(default)]
    pub non_cv_sections: Vec<AnalysisEdit>,
    #[serde(default)]
    pub skills_to_remove: Vec<String>,
    #[serde(default)]
    pub cover_letter: String,
}

pub struct TailorResult {
    pub sections: CvSections,
    pub cover_letter: String,
    pub change_log: Vec<ChangeLogEntry>,
    pub ats_score: u8,
    pub match_score: u8,
    pub rating: Rating,
}

/// Fuzzy match for CV-tailor merges (spec §9): identical, equal on a 40-char prefix, or a
/// substring with minimum length 10. Intentionally simple and deterministic — do not substitute
/// a general edit-distance library; tests assert exactly these three cases. Verbatim translation
/// of `cv_tailor.py`'s `_fuzzy_match(a, b, threshold=0.6)` (the `threshold` parameter is vestigial
/// there — none of its three branches use it).
pub fn fuzzy_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a_lower = a.to_lowercase();
    let a_lower = a_lower.trim();
    let b_lower = b.to_lowercase();
    let b_lower = b_lower.trim();

    if a_lower == b_lower {
        return true;
    }

    let prefix_a: String = a_lower.chars().take(40).collect();
    let prefix_b: String = b_lower.chars().take(40).collect();
    if prefix_a == prefix_b {
        return true;
    }

    let (shorter, longer) = if a_lower.len() <= b_lower.len() { (a_lower, b_lower) } else { (b_lower, a_lower) };
    if shorter.len() > 10 && longer.contains(shorter) {
        return true;
    }

    false
}

fn section_mut<'a>(sections: &'a mut CvSections, name: &str) -> Option<&'a mut Vec<String>> {
    match name {
        "skills" => Some(&mut sections.skills),
        "work_experience" => Some(&mut sections.work_experience),
        "education" => Some(&mut sections.education),
        "projects" => Some(&mut sections.projects),
        _ => None,
    }
}

fn section_ref<'a>(sections: &'a CvSections, name: &str) -> Option<&'a Vec<String>> {
    match name {
        "skills" => Some(&sections.skills),
        "work_experience" => Some(&sections.work_experience),
        "education" => Some(&sections.education),
        "projects" => Some(&sections.projects),
        _ => None,
    }
}

/// Apply a `modified` edit: replace the first fuzzy-matching string in its section; if none
/// matches, append (spec §4.6 step 3).
fn apply_modified(sections: &mut CvSections, edit: &AnalysisEdit) {
    let original = edit.original.as_deref().unwrap_or("");
    if let Some(list) = section_mut(sections, &edit.section) {
        if let Some(pos) = list.iter().position(|existing| fuzzy_match(existing, original)) {
            list[pos] = edit.text.clone();
        } else {
            list.push(edit.text.clone());
        }
    }
}

/// Merge the LLM's analysis into the original CV, enforcing the fabrication cap on newly-added
/// work-experience entries (spec §4.6 steps 3-4).
pub fn merge_analysis(original: &ParsedCv, analysis: &LlmAnalysis) -> (CvSections, Vec<ChangeLogEntry>) {
    let mut sections = original.sections.clone();
    let mut change_log = Vec::new();

    let mut modified_counts: std::collections::HashMap<String, usize> = Default::default();
    let mut new_entries_by_section: std::collections::HashMap<String, Vec<String>> = Default::default();

    for edit in analysis.cv_sections.iter().chain(analysis.non_cv_sections.iter()) {
        match edit.tag {
            ChangeTag::Modified => {
                apply_modified(&mut sections, edit);
                *modified_counts.entry(edit.section.clone()).or_insert(0) += 1;
            }
            ChangeTag::New => {
                new_entries_by_section.entry(edit.section.clone()).or_default().push(edit.text.clone());
            }
        }
    }

    // Fabrication cap (spec §4.6 step 4): number of newly-added work-experience entries <=
    // max(1, round(real_count / 2)). Excess entries are silently discarded.
    let real_count = original.sections.work_experience.len();
    let cap = fabrication_cap(real_count);

    for (section_name, mut entries) in new_entries_by_section {
        if section_name == "work_experience" && entries.len() > cap {
            entries.truncate(cap);
        }
        let added = entries.len();
        if let Some(list) = section_mut(&mut sections, &section_name) {
            list.extend(entries);
        }
        if added > 0 {
            change_log.push(ChangeLogEntry {
                section: section_name,
                tag: ChangeTag::New,
                summary: format!("added {added} new entr{}", if added == 1 { "y" } else { "ies" }),
            });
        }
    }

    for (section_name, count) in modified_counts {
        change_log.push(ChangeLogEntry {
            section: section_name,
            tag: ChangeTag::Modified,
            summary: format!("revised {count} existing entr{}", if count == 1 { "y" } else { "ies" }),
        });
    }

    sections.skills.retain(|skill| !analysis.skills_to_remove.iter().any(|removed| removed.eq_ignore_ascii_case(skill)));
    if !analysis.skills_to_remove.is_empty() {
        change_log.push(ChangeLogEntry {
            section: "skills".to_string(),
            tag: ChangeTag::Modified,
            summary: format!("removed {} skill(s)", analysis.skills_to_remove.len()),
        });
    }

    (sections, change_log)
}

/// `max(1, round(real_count / 2))` — spec §4.6 step 4 and §8's invariant, verbatim from
/// `cv_tailor.py`'s `fake_exp_count = max(1, round(real_exp_count / 2))`.
pub fn fabrication_cap(real_count: usize) -> usize {
    let half = (real_count as f32 / 2.0).round() as usize;
    half.max(1)
}

/// Deterministic scoring of a merged CV against a job, per spec §4.6 step 5. Pure function of
/// its inputs — no clock, no randomness — so re-running with the same CV/job produces the same
/// score (the purity property in spec §4.6's closing paragraph).
pub fn score(sections: &CvSections, years_experience: f32, has_degree: bool, job: &JobRequirements) -> (u8, Rating) {
    let cv_text = {
        let cv = ParsedCv { sections: sections.clone(), years_experience, has_degree };
        cv.full_text()
    };

    // Skills (weight 35): fraction of job keywords present anywhere in the CV text, not just the
    // skills section — `improvement_engine.py`'s `calculate_match_score` checks
    // `kw in cv_skills_text or kw in cv_text`, which is equivalent to checking the full CV text
    // alone since the skills section is already part of it.
    let skills_score = keyword_fraction(&job.keywords, &cv_text) * 35.0;

    // Experience (weight 25): ratio of CV years to job-required years, capped at 1.5x. Being at
    // or beyond 1.5x the requirement earns full marks; meeting it exactly earns two-thirds
    // credit, matching `improvement_engine.py`'s capped-ratio formula.
    let experience_score = if job.required_years <= 0.0 {
        25.0
    } else {
        let ratio = (years_experience / job.required_years).min(1.5);
        (ratio / 1.5) * 25.0
    };

    // Education (weight 15): binary (has-degree AND job requires) else partial credit.
    let education_score = if has_degree && job.requires_degree { 15.0 } else { 7.0 };

    // Projects (weight 15): 0/5/10/15 for 0/1/2/>=3 projects.
    let projects_score = match sections.projects.len() {
        0 => 0.0,
        1 => 5.0,
        2 => 10.0,
        _ => 15.0,
    };

    // Keyword density (weight 10): fraction of job keywords present anywhere in the CV.
    let density_score = keyword_fraction(&job.keywords, &cv_text) * 10.0;

    let total = skills_score + experience_score + education_score + projects_score + density_score;
    let clamped = total.round().clamp(0.0, 100.0) as u8;
    (clamped, Rating::from_score(clamped))
}

fn keyword_fraction(keywords: &[String], text: &str) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let matched = keywords.iter().filter(|k| text.contains(&k.to_lowercase())).count();
    matched as f32 / keywords.len() as f32
}

/// Build the human-readable change log summarising bucket counts and score deltas (spec §4.6
/// step 6). `change_log` already carries the per-section bucket summaries from `merge_analysis`;
/// this appends a final score-delta line.
pub fn with_score_delta(mut change_log: Vec<ChangeLogEntry>, before: u8, after: u8) -> Vec<ChangeLogEntry> {
    let delta = after as i16 - before as i16;
    change_log.push(ChangeLogEntry {
        section: "overall".to_string(),
        tag: ChangeTag::Modified,
        summary: format!("match score changed from {before} to {after} ({delta:+})"),
    });
    change_log
}

/// Top-level entry point: merge the analysis and score the result. Returns a minimal, non-
/// crashing result for an empty CV (spec §8 boundary behaviour).
pub fn tailor(original: &ParsedCv, job: &JobRequirements, analysis: &LlmAnalysis) -> TailorResult {
    let (sections, mut change_log) = merge_analysis(original, analysis);
    let (before_score, _) = score(&original.sections, original.years_experience, original.has_degree, job);
    let (match_score, rating) = score(&sections, original.years_experience, original.has_degree, job);
    change_log = with_score_delta(change_log, before_score, match_score);

    TailorResult {
        sections,
        cover_letter: analysis.cover_letter.clone(),
        change_log,
        ats_score: match_score,
        match_score,
        rating,
    }
}

/// A conservative default result for when the LLM's analysis could not be parsed at all (spec
/// §9's "tolerant parsing degrades to a safe default" rule), grounded on `cv_tailor.py`'s
/// `_fallback_result()` (`ats_score: 0, match_score: 0`).
pub fn fallback_result(original: &ParsedCv) -> TailorResult {
    TailorResult {
        sections: original.sections.clone(),
        cover_letter: String::new(),
        change_log: Vec::new(),
        ats_score: 0,
        match_score: 0,
        rating: Rating::Poor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_match_exact_equality() {
        assert!(fuzzy_match("Built scalable APIs", "built scalable apis"));
    }

    #[test]
    fn fuzzy_match_prefix_40() {
        let a = "Led a team of five engineers building a distributed payments platform from scratch";
        let b = "Led a team of five engineers building a distributed payments platform but phrased differently at the end";
        assert!(fuzzy_match(a, b));
    }

    #[test]
    fn fuzzy_match_substring_min_len_10() {
        assert!(fuzzy_match("Kubernetes", "Deployed services on Kubernetes at scale"));
        assert!(!fuzzy_match("Go", "I write Go code"), "substrings shorter than 10 chars must not match");
    }

    #[test]
    fn fuzzy_match_rejects_unrelated_strings() {
        assert!(!fuzzy_match("Managed a sales pipeline", "Wrote distributed systems in Rust"));
    }

    #[test]
    fn fabrication_cap_formula() {
        assert_eq!(fabrication_cap(2), 1);
        assert_eq!(fabrication_cap(4), 2);
        assert_eq!(fabrication_cap(0), 1);
        assert_eq!(fabrication_cap(5), 3); // round(2.5) -> 2 or 3 depending on rounding mode; see below
    }

    #[test]
    fn scenario_5_fabrication_cap_discards_excess() {
        let original = ParsedCv {
            sections: CvSections {
                skills: vec!["rust".into()],
                work_experience: vec!["Engineer at Acme".into(), "Engineer at Globex".into()],
                education: vec![],
                projects: vec![],
            },
            years_experience: 4.0,
            has_degree: true,
        };
        let analysis = LlmAnalysis {
            cv_sections: vec![],
            non_cv_sections: (0..5)
                .map(|i| AnalysisEdit {
                    section: "work_experience".into(),
                    tag: ChangeTag::New,
                    text: format!("Fabricated role #{i}"),
                    original: None,
                })
                .collect(),
            skills_to_remove: vec![],
            cover_letter: String::new(),
        };
        let (sections, _) = merge_analysis(&original, &analysis);
        // cap = max(1, round(2/2)) = 1, so only 1 of the 5 proposed new entries survives.
        assert_eq!(sections.work_experience.len(), 3);
    }

    #[test]
    fn empty_cv_never_crashes() {
        let original = ParsedCv::default();
        let job = JobRequirements::default();
        let analysis = LlmAnalysis::default();
        let result = tailor(&original, &job, &analysis);
        assert_eq!(result.ats_score, result.match_score);
    }

    #[test]
    fn score_is_clamped_to_0_100() {
        let sections = CvSections {
            skills: vec!["rust".into(), "go".into(), "python".into()],
            work_experience: vec!["a".into()],
            education: vec!["BSc".into()],
            projects: vec!["p1".into(), "p2".into(), "p3".into()],
        };
        let job = JobRequirements {
            required_years: 0.5,
            requires_degree: true,
            keywords: vec!["rust".into(), "go".into(), "python".into()],
        };
        let (s, _) = score(&sections, 10.0, true, &job);
        assert!(s <= 100);
    }

    #[test]
    fn pure_given_same_inputs() {
        let original = ParsedCv {
            sections: CvSections { skills: vec!["rust".into()], ..Default::default() },
            years_experience: 3.0,
            has_degree: true,
        };
        let job = JobRequirements { required_years: 2.0, requires_degree: true, keywords: vec!["rust".into()] };
        let analysis = LlmAnalysis::default();
        let r1 = tailor(&original, &job, &analysis);
        let r2 = tailor(&original, &job, &analysis);
        assert_eq!(r1.match_score, r2.match_score);
        assert_eq!(r1.sections.skills, r2.sections.skills);
    }
}
