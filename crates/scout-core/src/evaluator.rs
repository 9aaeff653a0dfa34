//! Scoring and ranking of normalized candidates. Pure computation, no I/O.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

use crate::candidate::{CandidateRecord, ScoredCandidate};
use crate::config::ScoringConfig;
use crate::criteria::RequirementCriteria;
use crate::report::Report;

#[derive(Debug, Clone, Default)]
pub struct CandidateEvaluator {
    weights: ScoringConfig,
}

/// Which kind of criterion a term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Language,
    License,
    Feature,
    Keyword,
}

impl Dimension {
    fn label(self) -> &'static str {
        match self {
            Dimension::Language => "language",
            Dimension::License => "license",
            Dimension::Feature => "feature",
            Dimension::Keyword => "keyword",
        }
    }
}

struct Term<'a> {
    text: &'a str,
    dimension: Dimension,
    weight: f64,
}

impl CandidateEvaluator {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    /// Score every candidate and order them into a report.
    ///
    /// An empty candidate list yields an empty report, not an error.
    pub fn evaluate(&self, candidates: &[CandidateRecord], criteria: &RequirementCriteria) -> Report {
        let terms = self.terms(criteria);

        let mut ranked: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|candidate| self.score_candidate(candidate, &terms))
            .collect();
        ranked.sort_by(compare_ranked);

        debug!(candidates = ranked.len(), "candidates ranked");
        Report {
            ranked_candidates: ranked,
            criteria_used: criteria.clone(),
        }
    }

    /// Weighted terms to match. Keywords stand in as soft terms only when no
    /// language, license or feature constraint exists.
    fn terms<'a>(&self, criteria: &'a RequirementCriteria) -> Vec<Term<'a>> {
        let hard = self.weights.hard_weight;
        let soft = self.weights.soft_weight;

        let groups = [
            (&criteria.language_constraints, Dimension::Language, hard),
            (&criteria.license_constraints, Dimension::License, hard),
            (&criteria.must_have_features, Dimension::Feature, soft),
        ];

        let mut terms = Vec::new();
        for (set, dimension, weight) in groups {
            terms.extend(set.iter().map(|text| Term {
                text: text.as_str(),
                dimension,
                weight,
            }));
        }
        if criteria.is_unconstrained() {
            terms.extend(criteria.keywords().iter().map(|text| Term {
                text: text.as_str(),
                dimension: Dimension::Keyword,
                weight: soft,
            }));
        }
        terms
    }

    fn score_candidate(&self, candidate: &CandidateRecord, terms: &[Term<'_>]) -> ScoredCandidate {
        let tokens = tokenize(&candidate.searchable_text());

        let mut total_weight = 0.0;
        let mut matched_weight = 0.0;
        let mut matched_criteria = BTreeSet::new();
        let mut matched_labels: Vec<(Dimension, &str)> = Vec::new();

        for term in terms {
            total_weight += term.weight;
            let satisfied = match term.dimension {
                Dimension::Language => {
                    field_equals(candidate.primary_language.as_deref(), term.text)
                        || contains_term(&tokens, term.text)
                }
                Dimension::License => {
                    license_matches(candidate.license.as_deref(), term.text)
                        || contains_term(&tokens, term.text)
                }
                Dimension::Feature | Dimension::Keyword => contains_term(&tokens, term.text),
            };
            if satisfied {
                matched_weight += term.weight;
                matched_criteria.insert(term.text.to_string());
                matched_labels.push((term.dimension, term.text));
            }
        }

        let match_score = if total_weight > 0.0 {
            (matched_weight / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let popularity_score = self.popularity(candidate.star_count);
        let score = finite_or_zero(self.blend(match_score, popularity_score));

        let rationale = rationale(
            &matched_labels,
            matched_weight,
            total_weight,
            candidate.star_count,
            match_score,
            popularity_score,
        );

        ScoredCandidate {
            candidate: candidate.clone(),
            score,
            matched_criteria,
            rationale,
        }
    }

    /// Logarithmic in stars, saturating at `star_saturation`.
    fn popularity(&self, stars: u64) -> f64 {
        let saturation = self.weights.star_saturation.max(1) as f64;
        let value = (stars as f64).ln_1p() / saturation.ln_1p();
        finite_or_zero(value).clamp(0.0, 1.0)
    }

    fn blend(&self, match_score: f64, popularity_score: f64) -> f64 {
        let match_blend = self.weights.match_blend.max(0.0);
        let popularity_blend = self.weights.popularity_blend.max(0.0);
        let total = match_blend + popularity_blend;
        if total <= 0.0 {
            return match_score;
        }
        (match_blend * match_score + popularity_blend * popularity_score) / total
    }
}

/// Descending score, then descending stars, then ascending identifier.
fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.candidate.star_count.cmp(&a.candidate.star_count))
        .then_with(|| a.candidate.identifier.cmp(&b.candidate.identifier))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn rationale(
    matched: &[(Dimension, &str)],
    matched_weight: f64,
    total_weight: f64,
    stars: u64,
    match_score: f64,
    popularity_score: f64,
) -> String {
    let mut parts = Vec::new();
    for dimension in [
        Dimension::Language,
        Dimension::License,
        Dimension::Feature,
        Dimension::Keyword,
    ] {
        let hits: Vec<&str> = matched
            .iter()
            .filter(|(d, _)| *d == dimension)
            .map(|(_, text)| *text)
            .collect();
        if !hits.is_empty() {
            parts.push(format!("{}: {}", dimension.label(), hits.join(", ")));
        }
    }

    let matched_summary = if parts.is_empty() {
        "no criteria matched".to_string()
    } else {
        format!("matched {}", parts.join("; "))
    };

    format!(
        "{matched_summary} ({matched_weight:.1}/{total_weight:.1} weighted); {stars} stars; \
         match {match_score:.2}, popularity {popularity_score:.2}"
    )
}

/// Lowercase word tokens. `+` and `#` stay attached so `C++` and `C#` survive.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// True when the term's tokens appear contiguously in `tokens`.
fn contains_term(tokens: &[String], term: &str) -> bool {
    let needle = tokenize(term);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| window == needle.as_slice())
}

fn field_equals(field: Option<&str>, term: &str) -> bool {
    field.is_some_and(|value| value.trim().eq_ignore_ascii_case(term.trim()))
}

/// Exact match, or an SPDX-style prefix such as `MIT` for `MIT License` or
/// `GPL-3.0` for `GPL-3.0-only`.
fn license_matches(license: Option<&str>, term: &str) -> bool {
    let Some(license) = license else {
        return false;
    };
    let license = license.trim().to_lowercase();
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }
    license == term
        || license
            .strip_prefix(&term)
            .is_some_and(|rest| rest.starts_with([' ', '-']))
}
