//! Multi-source sentiment aggregation for Chinese A-share stocks.
//!
//! The pipeline scrapes Sina Finance news and EastMoney guba forum posts,
//! deduplicates and filters the merged corpus, scores it with a weighted
//! Chinese sentiment lexicon, optionally refines the result through one or
//! more chat models, and assembles a stable-shaped report. Per-source
//! circuit breakers and a file-backed TTL cache keep the public surface
//! infallible: when no real data can be had, a fallback report with the
//! identical field set is returned instead of an error.

pub mod breaker;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod enhance;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod report;
pub mod sentiment;
pub mod sources;
pub mod stocks;

// ---- Re-exports for the stable public API ----
pub use breaker::CircuitBreaker;
pub use cache::SentimentCache;
pub use config::PipelineConfig;
pub use enhance::{ChatClient, LlmEnhancer};
pub use error::{EnhanceError, FetchError, SourceError};
pub use fetch::HttpFetcher;
pub use orchestrator::SentimentOrchestrator;
pub use report::{BatchReport, ReportSource, SentimentReport};
pub use sentiment::{Polarity, SentimentAnalyzer, SentimentLevel};
pub use sources::{ContentItem, NewsSource, SourceKind};
