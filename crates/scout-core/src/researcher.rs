//! Criteria to search queries to deduplicated candidate records.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::candidate::{dedup_candidates, CandidateRecord};
use crate::config::SearchConfig;
use crate::criteria::RequirementCriteria;
use crate::error::{Result, ScoutError};
use crate::gateway::SearchGateway;
use crate::normalize::normalize_hit;
use crate::search::SearchQuery;

/// How many distinct candidates a run aims for before it stops caring.
pub const TARGET_CANDIDATES: usize = 10;

pub struct CandidateResearcher {
    gateway: Arc<SearchGateway>,
    results_per_query: usize,
    max_queries: usize,
}

impl CandidateResearcher {
    pub fn new(gateway: Arc<SearchGateway>, config: &SearchConfig) -> Self {
        Self {
            gateway,
            results_per_query: config.results_per_query.max(1),
            max_queries: config.max_queries.max(1),
        }
    }

    /// Deterministic query plan: one composite keyword query, then one
    /// refinement per language constraint, capped at `max_queries`.
    pub fn plan_queries(&self, criteria: &RequirementCriteria) -> Vec<SearchQuery> {
        let composite = criteria.keywords().join(" ");
        let mut texts = vec![composite.clone()];

        for language in &criteria.language_constraints {
            let refined = format!("{composite} {}", language.trim());
            if !texts.contains(&refined) {
                texts.push(refined);
            }
        }

        texts
            .into_iter()
            .take(self.max_queries)
            .map(|text| SearchQuery::new(text).with_target_count(self.results_per_query))
            .collect()
    }

    /// Search for candidates matching `criteria`.
    ///
    /// Queries run concurrently. Individual query failures are tolerated as
    /// long as at least one query succeeds; if none do, the call fails with
    /// [`ScoutError::Research`] so "unreachable" is never mistaken for "no
    /// matches".
    #[instrument(skip_all)]
    pub async fn research(&self, criteria: &RequirementCriteria) -> Result<Vec<CandidateRecord>> {
        let queries = self.plan_queries(criteria);
        info!(queries = queries.len(), "issuing search queries");

        let outcomes = join_all(queries.iter().map(|query| self.gateway.search(query))).await;

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => {
                    let before = records.len();
                    for hit in &hits {
                        match normalize_hit(hit) {
                            Some(record) => records.push(record),
                            None => debug!(query = %query.text, "skipping hit without a repository"),
                        }
                    }
                    debug!(
                        query = %query.text,
                        hits = hits.len(),
                        kept = records.len() - before,
                        "query completed"
                    );
                }
                Err(error) => {
                    warn!(query = %query.text, error = %error, "query failed");
                    failures.push(format!("'{}': {}", query.text, error));
                }
            }
        }

        if failures.len() == queries.len() {
            return Err(ScoutError::Research(format!(
                "all {} search queries failed: {}",
                queries.len(),
                failures.join("; ")
            )));
        }

        let candidates = dedup_candidates(records);
        if candidates.len() < TARGET_CANDIDATES {
            info!(
                found = candidates.len(),
                target = TARGET_CANDIDATES,
                "fewer candidates than targeted"
            );
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::RawHit;
    use crate::error::SearchError;
    use crate::gateway::RetryPolicy;
    use crate::mock::MockSearchSurface;

    fn hit(id: &str, stars: u64) -> RawHit {
        RawHit::new()
            .with("title", format!("{id} on GitHub"))
            .with("link", format!("https://github.com/{id}"))
            .with("stars", stars)
    }

    fn researcher(surface: Arc<MockSearchSurface>, config: &SearchConfig) -> CandidateResearcher {
        let policy = RetryPolicy {
            max_attempts: 2,
            jitter: false,
            ..RetryPolicy::from(config)
        };
        CandidateResearcher::new(Arc::new(SearchGateway::new(surface, policy)), config)
    }

    fn criteria() -> RequirementCriteria {
        RequirementCriteria::new(vec!["CRM".into(), "self-hosted".into()])
            .unwrap()
            .with_languages(["Python", "Django"])
    }

    #[test]
    fn test_query_plan_is_deterministic_and_capped() {
        let surface = Arc::new(MockSearchSurface::new());
        let config = SearchConfig {
            max_queries: 2,
            results_per_query: 7,
            ..SearchConfig::default()
        };
        let researcher = researcher(surface, &config);

        let plan = researcher.plan_queries(&criteria());
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].text, "CRM self-hosted");
        assert_eq!(plan[1].text, "CRM self-hosted Django");
        assert!(plan.iter().all(|q| q.target_count == 7));
        assert_eq!(plan, researcher.plan_queries(&criteria()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_are_merged_across_queries() {
        let surface = Arc::new(
            MockSearchSurface::new()
                .with_query_hits("CRM self-hosted", vec![hit("acme/crm", 100), hit("b/two", 3)])
                .with_query_hits(
                    "CRM self-hosted Python",
                    vec![hit("Acme/CRM", 400), RawHit::new().with("title", "no link")],
                ),
        );
        let researcher = researcher(surface.clone(), &SearchConfig::default());

        let candidates = researcher.research(&criteria()).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].identifier, "acme/crm");
        assert_eq!(candidates[0].star_count, 400);
        assert_eq!(surface.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_still_returns_results() {
        let surface = Arc::new(
            MockSearchSurface::new()
                .with_query_hits("CRM self-hosted", vec![hit("acme/crm", 10)])
                .with_query_error(
                    "CRM self-hosted Django",
                    SearchError::Rejected {
                        status: 400,
                        message: "bad".into(),
                    },
                )
                .with_query_error("CRM self-hosted Python", SearchError::Timeout),
        );
        let researcher = researcher(surface, &SearchConfig::default());

        let candidates = researcher.research(&criteria()).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_queries_failing_is_research_failure() {
        let surface = Arc::new(MockSearchSurface::failing(SearchError::Server {
            status: 503,
            message: "down".into(),
        }));
        let researcher = researcher(surface.clone(), &SearchConfig::default());

        let err = researcher.research(&criteria()).await.unwrap_err();
        assert!(matches!(err, ScoutError::Research(_)));
        // three queries, two attempts each
        assert_eq!(surface.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_hits_is_not_a_failure() {
        let surface = Arc::new(MockSearchSurface::new());
        let researcher = researcher(surface, &SearchConfig::default());

        let candidates = researcher.research(&criteria()).await.unwrap();
        assert!(candidates.is_empty());
    }
}
