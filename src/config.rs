//! Env-driven pipeline tuning.
//!
//! All knobs are read once at startup (call `dotenvy::dotenv()` first if a
//! `.env` file should participate) and passed explicitly to the components
//! that need them. Nothing in this crate reads the environment lazily.

use std::time::Duration;

/// Tuning knobs for the acquisition/aggregation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound of the randomized pre-request delay, seconds.
    pub request_delay_secs: f64,
    /// Cache validity window, seconds.
    pub cache_ttl_secs: u64,
    /// HTTP retry attempts per request.
    pub max_retries: u32,
    /// Per-call HTTP timeout, seconds.
    pub http_timeout_secs: u64,
    /// Consecutive failures before a source's breaker opens.
    pub breaker_threshold: u32,
    /// Seconds past the last success before an open breaker resets.
    pub breaker_cooldown_secs: u64,
    /// Blend weight of the news sub-score in the overall score.
    pub news_weight: f64,
    /// Blend weight of the forum sub-score in the overall score.
    pub forum_weight: f64,
    /// Maximum forum posts fetched per request.
    pub max_forum_posts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_delay_secs: 2.0,
            cache_ttl_secs: 3600,
            max_retries: 3,
            http_timeout_secs: 10,
            breaker_threshold: 5,
            breaker_cooldown_secs: 300,
            news_weight: 0.6,
            forum_weight: 0.4,
            max_forum_posts: 20,
        }
    }
}

impl PipelineConfig {
    /// Read overrides from the environment on top of defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<f64>("SENTIMENT_REQUEST_DELAY") {
            cfg.request_delay_secs = v.max(0.0);
        }
        if let Some(v) = env_parse::<u64>("SENTIMENT_CACHE_TTL") {
            cfg.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse::<u32>("SENTIMENT_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("SENTIMENT_HTTP_TIMEOUT") {
            cfg.http_timeout_secs = v.max(1);
        }
        if let Some(v) = env_parse::<u32>("SENTIMENT_BREAKER_THRESHOLD") {
            cfg.breaker_threshold = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("SENTIMENT_BREAKER_COOLDOWN") {
            cfg.breaker_cooldown_secs = v;
        }
        cfg
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Priority weight of a data source, used as the deterministic tie-break
/// when the same title shows up in more than one source.
pub fn source_priority(name: &str) -> f64 {
    match name {
        "eastmoney" => 0.6,
        "sina" => 0.4,
        _ => 0.5,
    }
}
