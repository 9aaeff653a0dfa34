//! Raw search hits to uniform candidate records.
//!
//! Missing counts default to zero, missing language/license stay absent, and a
//! hit that does not point at a repository is skipped rather than failing.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::candidate::{CandidateRecord, RawHit};

/// Top-level github.com paths that are not repository owners.
const RESERVED_OWNERS: &[&str] = &[
    "about",
    "apps",
    "collections",
    "customer-stories",
    "enterprise",
    "events",
    "explore",
    "features",
    "login",
    "marketplace",
    "orgs",
    "pricing",
    "search",
    "security",
    "settings",
    "signup",
    "site",
    "sponsors",
    "topics",
    "trending",
];

static STARS_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?\s*[km]?)\s+stars?\b").unwrap()
});

static FORKS_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?\s*[km]?)\s+forks?\b").unwrap()
});

/// Normalize one hit, or `None` when no repository identifier can be derived.
pub fn normalize_hit(hit: &RawHit) -> Option<CandidateRecord> {
    let url = hit.str_field(&["link", "url", "html_url"]);
    let identifier = hit
        .str_field(&["full_name"])
        .filter(|name| is_owner_name(name))
        .map(|name| name.to_lowercase())
        .or_else(|| url.as_deref().and_then(repository_identifier))?;

    let url = url.unwrap_or_else(|| format!("https://github.com/{identifier}"));
    let description = hit
        .str_field(&["description", "title"])
        .unwrap_or_default();
    let raw_snippet = hit.str_field(&["snippet", "body"]).unwrap_or_default();

    let star_count = count_field(hit, &["stars", "stargazers_count", "stargazers"])
        .or_else(|| count_in_text(&STARS_IN_TEXT, &raw_snippet))
        .unwrap_or(0);
    let fork_count = count_field(hit, &["forks", "forks_count"])
        .or_else(|| count_in_text(&FORKS_IN_TEXT, &raw_snippet))
        .unwrap_or(0);

    Some(CandidateRecord {
        identifier,
        url,
        description,
        primary_language: hit.str_field(&["language", "primary_language", "primaryLanguage"]),
        license: license_field(hit),
        star_count,
        fork_count,
        last_activity: ["pushed_at", "updated_at", "last_activity", "date"]
            .iter()
            .filter_map(|k| hit.get(k).and_then(Value::as_str))
            .find_map(parse_timestamp),
        raw_snippet,
    })
}

/// `owner/name` from a github.com URL, lowercased.
pub fn repository_identifier(url: &str) -> Option<String> {
    let rest = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.");
    let path = rest.strip_prefix("github.com/")?;
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let name = segments.next()?.trim_end_matches(".git");

    if name.is_empty() || RESERVED_OWNERS.contains(&owner.to_lowercase().as_str()) {
        return None;
    }
    Some(format!("{}/{}", owner.to_lowercase(), name.to_lowercase()))
}

fn is_owner_name(name: &str) -> bool {
    let mut parts = name.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
    )
}

fn count_field(hit: &RawHit, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| hit.get(k)).find_map(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => parse_count(s),
        _ => None,
    })
}

/// "1,234", "1.2k", "3M" style counts.
fn parse_count(text: &str) -> Option<u64> {
    let cleaned = text.trim().replace(',', "").to_lowercase();
    let (number, factor) = match cleaned.chars().last()? {
        'k' => (&cleaned[..cleaned.len() - 1], 1_000.0),
        'm' => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    let value: f64 = number.trim().parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| (value * factor).round() as u64)
}

fn count_in_text(regex: &Regex, text: &str) -> Option<u64> {
    let captures = regex.captures(text)?;
    parse_count(captures.get(1)?.as_str())
}

fn license_field(hit: &RawHit) -> Option<String> {
    let value = hit.get("license")?;
    let license = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => ["spdx_id", "key", "name"]
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty() && *s != "NOASSERTION")?
            .to_string(),
        _ => return None,
    };
    (!license.is_empty()).then_some(license)
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
