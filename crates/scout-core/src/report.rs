use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::candidate::ScoredCandidate;
use crate::criteria::RequirementCriteria;
use crate::error::Result;

/// Final ranked recommendation list for one requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Descending by score, then stars, then identifier.
    pub ranked_candidates: Vec<ScoredCandidate>,

    pub criteria_used: RequirementCriteria,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.ranked_candidates.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render the report as a ranked markdown list with per-candidate rationale.
    pub fn render(&self, top: Option<usize>) -> String {
        let mut out = String::new();
        let criteria = &self.criteria_used;

        let _ = writeln!(out, "# Open-source recommendations\n");
        let _ = writeln!(out, "Keywords: {}", criteria.keywords().join(", "));
        if !criteria.language_constraints.is_empty() {
            let _ = writeln!(out, "Languages: {}", join_set(&criteria.language_constraints));
        }
        if !criteria.license_constraints.is_empty() {
            let _ = writeln!(out, "Licenses: {}", join_set(&criteria.license_constraints));
        }
        if !criteria.must_have_features.is_empty() {
            let _ = writeln!(out, "Features: {}", join_set(&criteria.must_have_features));
        }
        out.push('\n');

        if self.is_empty() {
            out.push_str("No matching repositories were found.\n");
            return out;
        }

        let limit = top.unwrap_or(self.ranked_candidates.len());
        for (rank, scored) in self.ranked_candidates.iter().take(limit).enumerate() {
            let c = &scored.candidate;
            let _ = writeln!(
                out,
                "{}. **{}** ({:.3})\n   {}",
                rank + 1,
                c.identifier,
                scored.score,
                c.url
            );
            if !c.description.is_empty() {
                let _ = writeln!(out, "   {}", c.description);
            }
            let _ = writeln!(
                out,
                "   stars: {} | forks: {} | language: {} | license: {}",
                c.star_count,
                c.fork_count,
                c.primary_language.as_deref().unwrap_or("unknown"),
                c.license.as_deref().unwrap_or("unknown"),
            );
            let _ = writeln!(out, "   why: {}\n", scored.rationale);
        }

        let hidden = self.ranked_candidates.len().saturating_sub(limit);
        if hidden > 0 {
            let _ = writeln!(out, "({hidden} more not shown)");
        }
        out
    }
}

fn join_set(set: &std::collections::BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateRecord;
    use std::collections::BTreeSet;

    fn criteria() -> RequirementCriteria {
        RequirementCriteria::new(vec!["CRM".into()])
            .unwrap()
            .with_licenses(["MIT"])
    }

    #[test]
    fn test_empty_report_says_so() {
        let report = Report {
            ranked_candidates: vec![],
            criteria_used: criteria(),
        };
        let text = report.render(None);
        assert!(text.contains("Licenses: MIT"));
        assert!(text.contains("No matching repositories"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["ranked_candidates"], serde_json::json!([]));
    }

    #[test]
    fn test_render_respects_top_limit() {
        let scored = |id: &str, score: f64| ScoredCandidate {
            candidate: CandidateRecord::new(id, format!("https://github.com/{id}")),
            score,
            matched_criteria: BTreeSet::new(),
            rationale: "because".into(),
        };
        let report = Report {
            ranked_candidates: vec![scored("a/one", 0.9), scored("b/two", 0.5)],
            criteria_used: criteria(),
        };

        let text = report.render(Some(1));
        assert!(text.contains("1. **a/one** (0.900)"));
        assert!(!text.contains("b/two"));
        assert!(text.contains("(1 more not shown)"));
    }
}
