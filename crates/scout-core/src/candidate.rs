use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One unopinionated search result, exactly as the search surface sent it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawHit(pub Map<String, Value>);

impl RawHit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for fakes and tests.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First non-blank string found under any of `keys`.
    pub fn str_field(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }
}

impl From<Map<String, Value>> for RawHit {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Normalized view of one discovered repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Lowercase `owner/name`; unique within a run.
    pub identifier: String,

    pub url: String,

    pub description: String,

    pub primary_language: Option<String>,

    pub license: Option<String>,

    pub star_count: u64,

    pub fork_count: u64,

    pub last_activity: Option<DateTime<Utc>>,

    /// Original search-result text, kept as evaluator context.
    pub raw_snippet: String,
}

impl CandidateRecord {
    pub fn new(identifier: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            url: url.into(),
            description: String::new(),
            primary_language: None,
            license: None,
            star_count: 0,
            fork_count: 0,
            last_activity: None,
            raw_snippet: String::new(),
        }
    }

    /// Description and snippet joined; the text the evaluator matches against.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.description, self.raw_snippet)
    }
}

/// A candidate plus its score and the criteria that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: CandidateRecord,

    pub score: f64,

    pub matched_criteria: BTreeSet<String>,

    pub rationale: String,
}

/// Collapse duplicate discoveries into one record per identifier.
///
/// The result does not depend on input order: variants of an identifier are
/// ranked by stars, forks, url and description before merging, and the
/// output is sorted by identifier.
pub fn dedup_candidates(records: impl IntoIterator<Item = CandidateRecord>) -> Vec<CandidateRecord> {
    let mut groups: BTreeMap<String, Vec<CandidateRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.identifier.clone())
            .or_default()
            .push(record);
    }

    groups.into_values().filter_map(merge_variants).collect()
}

fn merge_variants(mut variants: Vec<CandidateRecord>) -> Option<CandidateRecord> {
    variants.sort_by(|a, b| {
        b.star_count
            .cmp(&a.star_count)
            .then_with(|| b.fork_count.cmp(&a.fork_count))
            .then_with(|| a.url.cmp(&b.url))
            .then_with(|| a.description.cmp(&b.description))
            .then_with(|| a.raw_snippet.cmp(&b.raw_snippet))
    });

    let mut iter = variants.into_iter();
    let mut merged = iter.next()?;
    let mut descriptions = vec![merged.description.clone()];
    let mut snippets = vec![merged.raw_snippet.clone()];

    for other in iter {
        if merged.primary_language.is_none() {
            merged.primary_language = other.primary_language;
        }
        if merged.license.is_none() {
            merged.license = other.license;
        }
        merged.last_activity = match (merged.last_activity, other.last_activity) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        descriptions.push(other.description);
        snippets.push(other.raw_snippet);
    }

    merged.description = union_text(descriptions);
    merged.raw_snippet = union_text(snippets);
    Some(merged)
}

fn union_text(parts: Vec<String>) -> String {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::new();
    for part in parts {
        let trimmed = part.trim();
        if !trimmed.is_empty() && seen.insert(trimmed.to_string()) {
            kept.push(trimmed.to_string());
        }
    }
    kept.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, stars: u64, description: &str) -> CandidateRecord {
        CandidateRecord {
            star_count: stars,
            description: description.to_string(),
            ..CandidateRecord::new(id, format!("https://github.com/{id}"))
        }
    }

    #[test]
    fn test_duplicates_keep_highest_stars() {
        let merged = dedup_candidates(vec![
            record("acme/crm", 120, "A small CRM"),
            record("acme/crm", 480, "Lightweight CRM for teams"),
            record("other/tool", 5, "Unrelated"),
        ]);

        assert_eq!(merged.len(), 2);
        let crm = &merged[0];
        assert_eq!(crm.identifier, "acme/crm");
        assert_eq!(crm.star_count, 480);
        assert_eq!(crm.description, "Lightweight CRM for teams | A small CRM");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = record("acme/crm", 10, "first");
        a.license = Some("MIT".into());
        let mut b = record("acme/crm", 10, "second");
        b.primary_language = Some("Python".into());

        let forward = dedup_candidates(vec![a.clone(), b.clone()]);
        let backward = dedup_candidates(vec![b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].license.as_deref(), Some("MIT"));
        assert_eq!(forward[0].primary_language.as_deref(), Some("Python"));
    }

    #[test]
    fn test_identical_text_is_not_repeated() {
        let merged = dedup_candidates(vec![
            record("acme/crm", 1, "same"),
            record("acme/crm", 2, "same"),
        ]);
        assert_eq!(merged[0].description, "same");
    }

    #[test]
    fn test_raw_hit_str_field_skips_blanks() {
        let hit = RawHit::new().with("title", "  ").with("name", "scout");
        assert_eq!(hit.str_field(&["title", "name"]).as_deref(), Some("scout"));
        assert_eq!(hit.str_field(&["missing"]), None);
    }
}
