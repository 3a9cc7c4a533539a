//! Error taxonomy for the acquisition pipeline.
//!
//! Every layer hands failures upward as values; the orchestrator's public
//! surface never propagates any of these — it degrades to a fallback report.

use thiserror::Error;

/// Transport-level failure from the HTTP fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error after exhausting all retries.
    #[error("request to {url} failed after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-2xx status.
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Failure inside a single news/forum source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Malformed listing or detail page; skipped at item granularity where
    /// possible, surfaced only when the whole listing is unreadable.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
}

impl SourceError {
    pub fn parse(what: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            what,
            reason: reason.to_string(),
        }
    }
}

/// Best-effort LLM refinement failure; the lexical score stands.
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("no chat model produced a usable answer")]
    NoUsableAnswer,
    #[error("chat call failed: {0}")]
    Chat(#[from] anyhow::Error),
}
