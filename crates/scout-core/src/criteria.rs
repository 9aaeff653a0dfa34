use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, ScoutError};

/// Structured technical criteria extracted from a free-text requirement.
///
/// Built once per run by the analyzer and never mutated afterwards. Use
/// [`RequirementCriteria::new`] so the non-empty keyword invariant holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CriteriaFields")]
pub struct RequirementCriteria {
    /// Search keywords, most relevant first. Never empty.
    keywords: Vec<String>,

    /// Required languages or frameworks. Empty means unconstrained.
    pub language_constraints: BTreeSet<String>,

    /// Acceptable licenses. Empty means unconstrained.
    pub license_constraints: BTreeSet<String>,

    /// Feature phrases the project should offer.
    pub must_have_features: BTreeSet<String>,

    /// Anything the backend said that did not fit a structured field.
    pub freeform_notes: String,
}

/// Wire shape of [`RequirementCriteria`]; deserialization goes through
/// [`RequirementCriteria::new`] so blank keyword lists are rejected.
#[derive(Deserialize)]
struct CriteriaFields {
    keywords: Vec<String>,
    #[serde(default)]
    language_constraints: BTreeSet<String>,
    #[serde(default)]
    license_constraints: BTreeSet<String>,
    #[serde(default)]
    must_have_features: BTreeSet<String>,
    #[serde(default)]
    freeform_notes: String,
}

impl TryFrom<CriteriaFields> for RequirementCriteria {
    type Error = ScoutError;

    fn try_from(fields: CriteriaFields) -> Result<Self> {
        Ok(Self::new(fields.keywords)?
            .with_languages(fields.language_constraints)
            .with_licenses(fields.license_constraints)
            .with_features(fields.must_have_features)
            .with_notes(fields.freeform_notes))
    }
}

impl RequirementCriteria {
    pub fn new(keywords: Vec<String>) -> Result<Self> {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Err(ScoutError::Analysis {
                message: "criteria must contain at least one keyword".into(),
                raw_response: None,
            });
        }

        Ok(Self {
            keywords,
            language_constraints: BTreeSet::new(),
            license_constraints: BTreeSet::new(),
            must_have_features: BTreeSet::new(),
            freeform_notes: String::new(),
        })
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.language_constraints
            .extend(languages.into_iter().map(Into::into));
        self
    }

    pub fn with_licenses<I, S>(mut self, licenses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.license_constraints
            .extend(licenses.into_iter().map(Into::into));
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_have_features
            .extend(features.into_iter().map(Into::into));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.freeform_notes = notes.into();
        self
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// True when no language, license or feature constraint was extracted.
    pub fn is_unconstrained(&self) -> bool {
        self.language_constraints.is_empty()
            && self.license_constraints.is_empty()
            && self.must_have_features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_keywords_are_rejected() {
        let err = RequirementCriteria::new(vec!["  ".into(), String::new()]).unwrap_err();
        assert!(matches!(err, ScoutError::Analysis { .. }));
    }

    #[test]
    fn test_deserialize_enforces_keywords() {
        let criteria: RequirementCriteria = serde_json::from_str(
            r#"{"keywords":[" CRM "],"license_constraints":["MIT"]}"#,
        )
        .unwrap();
        assert_eq!(criteria.keywords(), ["CRM"]);
        assert!(criteria.license_constraints.contains("MIT"));

        let round_trip: RequirementCriteria =
            serde_json::from_str(&serde_json::to_string(&criteria).unwrap()).unwrap();
        assert_eq!(round_trip, criteria);

        for blank in [r#"{"keywords":[]}"#, r#"{"keywords":["  "]}"#, r#"{}"#] {
            let err = serde_json::from_str::<RequirementCriteria>(blank).unwrap_err();
            assert!(err.is_data(), "{blank}: {err}");
        }
    }

    #[test]
    fn test_builder_collects_constraints() {
        let criteria = RequirementCriteria::new(vec![" CRM ".into()])
            .unwrap()
            .with_languages(["Python", "Django"])
            .with_licenses(["MIT"]);

        assert_eq!(criteria.keywords(), ["CRM"]);
        assert_eq!(criteria.language_constraints.len(), 2);
        assert!(!criteria.is_unconstrained());
    }
}
