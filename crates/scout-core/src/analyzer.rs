//! Requirement text to structured criteria.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::backend::LanguageBackend;
use crate::criteria::RequirementCriteria;
use crate::error::{Result, ScoutError};
use crate::prompts::PromptConfig;

pub struct RequirementAnalyzer {
    backend: Arc<dyn LanguageBackend>,
    prompts: PromptConfig,
}

impl RequirementAnalyzer {
    pub fn new(backend: Arc<dyn LanguageBackend>, prompts: PromptConfig) -> Self {
        Self { backend, prompts }
    }

    /// Extract criteria from `requirement_text` with one backend call.
    ///
    /// Blank input is a validation failure and never reaches the backend. A
    /// reply without usable keywords is an analysis failure carrying the raw
    /// reply, never a wildcard criteria set.
    #[instrument(skip_all, fields(backend = self.backend.name()))]
    pub async fn analyze(&self, requirement_text: &str) -> Result<RequirementCriteria> {
        let requirement = validate_requirement(requirement_text)?;

        let prompt = self.prompts.render_analyst(requirement);
        let reply = self.backend.complete(&prompt).await?;
        debug!(reply_len = reply.len(), "backend replied");

        let criteria = parse_criteria(&reply).inspect_err(|e| {
            warn!(error = %e, "could not extract criteria from backend reply");
        })?;
        debug!(
            keywords = criteria.keywords().len(),
            languages = criteria.language_constraints.len(),
            licenses = criteria.license_constraints.len(),
            features = criteria.must_have_features.len(),
            "criteria extracted"
        );
        Ok(criteria)
    }
}

/// Trim `text` and reject it if nothing is left.
pub fn validate_requirement(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ScoutError::Validation(
            "requirement text must not be empty".into(),
        ));
    }
    Ok(trimmed)
}

/// Parse a backend reply into criteria, tolerating fences, surrounding prose,
/// camelCase keys and comma-separated strings in place of lists.
pub fn parse_criteria(reply: &str) -> Result<RequirementCriteria> {
    let failure = |message: &str| ScoutError::Analysis {
        message: message.to_string(),
        raw_response: Some(reply.to_string()),
    };

    let value = first_json_object(reply).map_err(|e| failure(&e))?;
    let object = value
        .as_object()
        .ok_or_else(|| failure("reply is not a JSON object"))?;

    let keywords = dedup_preserving_order(string_list(object, &["keywords", "keyword"]));
    if keywords.is_empty() {
        return Err(failure("reply contains no keywords"));
    }

    let notes = ["notes", "freeform_notes", "freeformNotes"]
        .iter()
        .filter_map(|k| object.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    let criteria = RequirementCriteria::new(keywords)
        .map_err(|_| failure("reply contains no keywords"))?
        .with_languages(string_list(
            object,
            &["language_constraints", "languageConstraints", "languages"],
        ))
        .with_licenses(string_list(
            object,
            &["license_constraints", "licenseConstraints", "licenses"],
        ))
        .with_features(string_list(
            object,
            &["must_have_features", "mustHaveFeatures", "features"],
        ))
        .with_notes(notes);

    Ok(criteria)
}

/// The first complete `{...}` value in `reply`. Code fences and prose on
/// either side are ignored, braces included.
fn first_json_object(reply: &str) -> std::result::Result<Value, String> {
    let mut first_error = None;
    for (start, _) in reply.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) if value.is_object() => return Ok(value),
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| format!("invalid JSON: {e}"));
            }
            _ => {}
        }
    }
    Err(first_error.unwrap_or_else(|| "no JSON object in reply".to_string()))
}

fn string_list(object: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|k| object.get(*k)) else {
        return Vec::new();
    };

    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::mock::MockBackend;

    fn analyzer(backend: Arc<MockBackend>) -> RequirementAnalyzer {
        RequirementAnalyzer::new(backend, PromptConfig::default())
    }

    #[tokio::test]
    async fn test_parses_clean_reply() {
        let backend = Arc::new(MockBackend::replying(
            r#"{"keywords":["CRM","self-hosted","lightweight"],
                "language_constraints":["Python","Django"],
                "license_constraints":["MIT"],
                "must_have_features":[],
                "notes":"modern UI"}"#,
        ));
        let criteria = analyzer(backend.clone())
            .analyze("lightweight self-hosted CRM, Python/Django, MIT license")
            .await
            .unwrap();

        assert_eq!(criteria.keywords(), ["CRM", "self-hosted", "lightweight"]);
        assert!(criteria.language_constraints.contains("Django"));
        assert!(criteria.license_constraints.contains("MIT"));
        assert_eq!(criteria.freeform_notes, "modern UI");
        assert!(backend.prompts()[0].contains("Python/Django, MIT license"));
    }

    #[tokio::test]
    async fn test_blank_requirement_never_calls_backend() {
        let backend = Arc::new(MockBackend::replying(r#"{"keywords":["x"]}"#));
        let err = analyzer(backend.clone()).analyze("  \n\t ").await.unwrap_err();

        assert!(matches!(err, ScoutError::Validation(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let backend = Arc::new(MockBackend::new());
        backend.push_error(BackendError::Unauthorized("bad key".into()));

        let err = analyzer(backend).analyze("a blog engine").await.unwrap_err();
        assert!(matches!(err, ScoutError::Backend(BackendError::Unauthorized(_))));
    }

    #[test]
    fn test_tolerates_fences_prose_and_camel_case() {
        let reply = "Sure! Here is the analysis:\n```json\n{\"keywords\": \"static site, markdown\", \
                     \"languageConstraints\": [\"Rust\"], \"extra\": true}\n```\nHope that helps.";
        let criteria = parse_criteria(reply).unwrap();

        assert_eq!(criteria.keywords(), ["static site", "markdown"]);
        assert!(criteria.language_constraints.contains("Rust"));
        assert!(criteria.license_constraints.is_empty());
    }

    #[test]
    fn test_braces_in_trailing_prose_are_ignored() {
        let reply = "{\"keywords\":[\"crm\"]}\nNote: replace {x} as needed.";
        let criteria = parse_criteria(reply).unwrap();
        assert_eq!(criteria.keywords(), ["crm"]);

        let reply = "Fill in {placeholders} first.\n{\"keywords\":[\"wiki\"],\"licenses\":\"MIT\"} {done}";
        let criteria = parse_criteria(reply).unwrap();
        assert_eq!(criteria.keywords(), ["wiki"]);
        assert!(criteria.license_constraints.contains("MIT"));
    }

    #[test]
    fn test_keywords_dedup_case_insensitively() {
        let criteria = parse_criteria(r#"{"keywords":["CRM"," crm ","Sales",""]}"#).unwrap();
        assert_eq!(criteria.keywords(), ["CRM", "Sales"]);
    }

    #[test]
    fn test_missing_or_empty_keywords_is_analysis_failure() {
        for reply in [
            r#"{"language_constraints":["Go"]}"#,
            r#"{"keywords":[]}"#,
            r#"{"keywords":["   "]}"#,
            r#"{"keywords": 42}"#,
        ] {
            let err = parse_criteria(reply).unwrap_err();
            match err {
                ScoutError::Analysis { raw_response, .. } => {
                    assert_eq!(raw_response.as_deref(), Some(reply));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_unparseable_reply_is_analysis_failure() {
        for reply in ["I could not help with that.", "{not json}", "[\"a\"]"] {
            assert!(matches!(
                parse_criteria(reply),
                Err(ScoutError::Analysis { .. })
            ));
        }
    }
}
