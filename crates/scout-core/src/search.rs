use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::candidate::RawHit;
use crate::error::SearchError;

pub const DEFAULT_TARGET_COUNT: usize = 10;

/// One outbound query plus how many results we would like back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub target_count: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_count: DEFAULT_TARGET_COUNT,
        }
    }

    pub fn with_target_count(mut self, target_count: usize) -> Self {
        self.target_count = target_count;
        self
    }
}

/// A single attempt against an external search surface.
///
/// Implementations perform exactly one request per call; retry, backoff and
/// timeouts are applied by [`crate::gateway::SearchGateway`].
#[async_trait]
pub trait SearchSurface: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>, SearchError>;

    fn name(&self) -> &str;
}
