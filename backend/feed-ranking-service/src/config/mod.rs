use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got {value:?}")]
    Parse {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub scoring: ScoringConfig,
    pub pagination: PaginationConfig,
    pub fetch: FetchConfig,
}

/// Tunables of the feed score: `affinity + freshness + popularity`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ScoringConfig {
    /// Flat bonus when the viewer follows the author (`A`).
    pub affinity_bonus: f64,
    /// Freshness numerator (`K`).
    pub freshness_scale: f64,
    /// Freshness decay exponent (`p`).
    pub freshness_exponent: f64,
    pub like_weight: f64,
    pub comment_weight: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            affinity_bonus: 50.0,
            freshness_scale: 150.0,
            freshness_exponent: 1.2,
            like_weight: 1.0,
            comment_weight: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PaginationConfig {
    pub page_size: usize,
    pub max_page_size: usize,
    /// Request one extra row per page so `has_more` is exact.
    pub lookahead: bool,
    pub max_tags: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_page_size: 100,
            lookahead: true,
            max_tags: 5,
        }
    }
}

impl PaginationConfig {
    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn clamp_page_size(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_page_size.max(1))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct FetchConfig {
    pub timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let config = Config {
            scoring: ScoringConfig {
                affinity_bonus: env_or(
                    "FEED_AFFINITY_BONUS",
                    "f64",
                    defaults.scoring.affinity_bonus,
                )?,
                freshness_scale: env_or(
                    "FEED_FRESHNESS_SCALE",
                    "f64",
                    defaults.scoring.freshness_scale,
                )?,
                freshness_exponent: env_or(
                    "FEED_FRESHNESS_EXPONENT",
                    "f64",
                    defaults.scoring.freshness_exponent,
                )?,
                like_weight: env_or("FEED_LIKE_WEIGHT", "f64", defaults.scoring.like_weight)?,
                comment_weight: env_or(
                    "FEED_COMMENT_WEIGHT",
                    "f64",
                    defaults.scoring.comment_weight,
                )?,
            },
            pagination: PaginationConfig {
                page_size: env_or("FEED_PAGE_SIZE", "usize", defaults.pagination.page_size)?,
                max_page_size: env_or(
                    "FEED_MAX_PAGE_SIZE",
                    "usize",
                    defaults.pagination.max_page_size,
                )?,
                lookahead: env_or("FEED_PAGE_LOOKAHEAD", "bool", defaults.pagination.lookahead)?,
                max_tags: env_or("FEED_MAX_TAGS", "usize", defaults.pagination.max_tags)?,
            },
            fetch: FetchConfig {
                timeout_ms: env_or("FEED_FETCH_TIMEOUT_MS", "u64", defaults.fetch.timeout_ms)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        let constants = [
            ("affinity_bonus", s.affinity_bonus),
            ("freshness_scale", s.freshness_scale),
            ("freshness_exponent", s.freshness_exponent),
            ("like_weight", s.like_weight),
            ("comment_weight", s.comment_weight),
        ];
        for (name, value) in constants {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if s.freshness_exponent <= 0.0 {
            return Err(ConfigError::Invalid(
                "freshness_exponent must be positive".to_string(),
            ));
        }
        if s.comment_weight <= s.like_weight {
            return Err(ConfigError::Invalid(format!(
                "comment_weight ({}) must exceed like_weight ({})",
                s.comment_weight, s.like_weight
            )));
        }

        let p = &self.pagination;
        if p.page_size == 0 || p.max_page_size == 0 {
            return Err(ConfigError::Invalid("page sizes must be at least 1".to_string()));
        }
        if p.page_size > p.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "page_size ({}) exceeds max_page_size ({})",
                p.page_size, p.max_page_size
            )));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch timeout must be non-zero".to_string()));
        }

        Ok(())
    }
}

fn env_or<T: FromStr>(key: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Parse {
                key,
                expected,
                value,
            })
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.affinity_bonus, 50.0);
        assert_eq!(config.pagination.page_size, 10);
        assert!(config.pagination.lookahead);
    }

    #[test]
    fn test_comment_weight_must_exceed_like_weight() {
        let mut config = Config::default();
        config.scoring.comment_weight = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_finite_constants() {
        let mut config = Config::default();
        config.scoring.freshness_scale = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.freshness_exponent = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let mut config = Config::default();
        config.pagination.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamp_page_size() {
        let pagination = PaginationConfig::default();
        assert_eq!(pagination.clamp_page_size(0), 1);
        assert_eq!(pagination.clamp_page_size(25), 25);
        assert_eq!(pagination.clamp_page_size(1000), 100);
    }

    #[test]
    fn test_env_or_parse_error() {
        std::env::set_var("FEED_TEST_BAD_NUMBER", "not-a-number");
        let result: Result<f64, _> = env_or("FEED_TEST_BAD_NUMBER", "f64", 1.0);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        std::env::remove_var("FEED_TEST_BAD_NUMBER");

        let fallback: f64 = env_or("FEED_TEST_UNSET_NUMBER", "f64", 2.5).unwrap();
        assert_eq!(fallback, 2.5);
    }
}
