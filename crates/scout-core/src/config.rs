use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ScoutError};
use crate::prompts::PromptConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub api_keys: ApiKeysConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub prompts: PromptConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    #[serde(default)]
    pub gemini: String,

    #[serde(default)]
    pub serper: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_backend_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,

    /// Attempts per backend call when the model is overloaded or throttled.
    #[serde(default = "default_backend_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backend_retry_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_backend_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Target-count hint attached to every query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,

    /// Upper bound on queries issued per run, composite query included.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Maximum jitter as a fraction of the computed delay (0.0 - 1.0).
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Per-attempt timeout; exceeding it counts as a transient failure.
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight of a language or license constraint in the match fraction.
    #[serde(default = "default_hard_weight")]
    pub hard_weight: f64,

    /// Weight of a feature keyword in the match fraction.
    #[serde(default = "default_soft_weight")]
    pub soft_weight: f64,

    #[serde(default = "default_match_blend")]
    pub match_blend: f64,

    #[serde(default = "default_popularity_blend")]
    pub popularity_blend: f64,

    /// Star count at which popularity saturates to 1.0.
    #[serde(default = "default_star_saturation")]
    pub star_saturation: u64,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_backend_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_backend_timeout() -> u64 {
    60
}
fn default_backend_attempts() -> u32 {
    3
}
fn default_backend_retry_delay_ms() -> u64 {
    30_000
}
fn default_backend_retry_max_delay_ms() -> u64 {
    120_000
}
fn default_search_endpoint() -> String {
    "https://google.serper.dev/search".to_string()
}
fn default_results_per_query() -> usize {
    10
}
fn default_max_queries() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_jitter_ratio() -> f64 {
    0.2
}
fn default_search_timeout() -> u64 {
    15
}
fn default_hard_weight() -> f64 {
    2.0
}
fn default_soft_weight() -> f64 {
    1.0
}
fn default_match_blend() -> f64 {
    0.7
}
fn default_popularity_blend() -> f64 {
    0.3
}
fn default_star_saturation() -> u64 {
    100_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_backend_endpoint(),
            timeout_seconds: default_backend_timeout(),
            max_attempts: default_backend_attempts(),
            retry_base_delay_ms: default_backend_retry_delay_ms(),
            retry_max_delay_ms: default_backend_retry_max_delay_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            results_per_query: default_results_per_query(),
            max_queries: default_max_queries(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_true(),
            jitter_ratio: default_jitter_ratio(),
            timeout_seconds: default_search_timeout(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hard_weight: default_hard_weight(),
            soft_weight: default_soft_weight(),
            match_blend: default_match_blend(),
            popularity_blend: default_popularity_blend(),
            star_saturation: default_star_saturation(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl SearchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ScoutConfig {
    /// Load config from ~/.config/scout/config.toml, creating defaults if missing.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = ScoutConfig::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load config from an explicit path. Nothing is written if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ScoutError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| ScoutError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| ScoutError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&config_path, contents)?;
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ScoutError::Config("Could not determine config directory".into()))?;
        Ok(config_dir.join("scout").join("config.toml"))
    }

    /// Let `GEMINI_API_KEY` / `SERPER_API_KEY` override whatever the file says.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_keys.gemini = key;
        }
        if let Some(key) = lookup("SERPER_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_keys.serper = key;
        }
    }

    /// Reject settings the retry policy or scoring function cannot work with.
    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if search.max_attempts == 0 {
            return Err(ScoutError::Config("search.max_attempts must be at least 1".into()));
        }
        if !search.multiplier.is_finite() || search.multiplier < 2.0 {
            return Err(ScoutError::Config("search.multiplier must be at least 2".into()));
        }
        if search.base_delay_ms > search.max_delay_ms {
            return Err(ScoutError::Config(
                "search.base_delay_ms must not exceed search.max_delay_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&search.jitter_ratio) {
            return Err(ScoutError::Config("search.jitter_ratio must be within 0..=1".into()));
        }
        if search.results_per_query == 0 || search.max_queries == 0 {
            return Err(ScoutError::Config(
                "search.results_per_query and search.max_queries must be positive".into(),
            ));
        }

        let backend = &self.backend;
        if backend.max_attempts == 0 {
            return Err(ScoutError::Config("backend.max_attempts must be at least 1".into()));
        }
        if backend.retry_base_delay_ms > backend.retry_max_delay_ms {
            return Err(ScoutError::Config(
                "backend.retry_base_delay_ms must not exceed backend.retry_max_delay_ms".into(),
            ));
        }

        let scoring = &self.scoring;
        let weights = [
            ("hard_weight", scoring.hard_weight),
            ("soft_weight", scoring.soft_weight),
            ("match_blend", scoring.match_blend),
            ("popularity_blend", scoring.popularity_blend),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoutError::Config(format!(
                    "scoring.{name} must be a finite, non-negative number"
                )));
            }
        }
        if scoring.match_blend + scoring.popularity_blend == 0.0 {
            return Err(ScoutError::Config(
                "scoring.match_blend and scoring.popularity_blend cannot both be zero".into(),
            ));
        }
        if scoring.star_saturation == 0 {
            return Err(ScoutError::Config("scoring.star_saturation must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.max_attempts, 5);
        assert_eq!(config.search.base_delay(), Duration::from_secs(1));
        assert_eq!(config.search.max_delay(), Duration::from_secs(30));
        assert_eq!(config.scoring.hard_weight, 2.0);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ScoutConfig = toml::from_str(
            r#"
            [search]
            max_attempts = 3

            [scoring]
            match_blend = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.search.max_attempts, 3);
        assert_eq!(config.search.results_per_query, 10);
        assert_eq!(config.scoring.match_blend, 0.5);
        assert_eq!(config.scoring.popularity_blend, 0.3);
        assert!(config.prompts.analyst_template.contains("{requirement}"));
    }

    #[test]
    fn test_validate_rejects_bad_retry_policy() {
        let mut config = ScoutConfig::default();
        config.search.multiplier = 1.5;
        assert!(matches!(config.validate(), Err(ScoutError::Config(_))));

        let mut config = ScoutConfig::default();
        config.search.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ScoutConfig::default();
        config.search.base_delay_ms = 60_000;
        assert!(config.validate().is_err());

        let mut config = ScoutConfig::default();
        config.backend.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = ScoutConfig::default();
        config.scoring.hard_weight = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ScoutConfig::default();
        config.scoring.match_blend = 0.0;
        config.scoring.popularity_blend = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_api_keys() {
        let mut config = ScoutConfig::default();
        config.api_keys.serper = "from-file".into();
        config.apply_env_from(|name| match name {
            "GEMINI_API_KEY" => Some("gem".into()),
            "SERPER_API_KEY" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.api_keys.gemini, "gem");
        assert_eq!(config.api_keys.serper, "from-file");
    }
}
