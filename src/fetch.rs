//! Retrying HTTP fetcher shared by every scraper.
//!
//! Anti-scraping posture: realistic browser headers rotated per call and a
//! randomized delay before each request. Non-2xx answers are failures, not
//! panics; callers substitute empty results and feed the circuit breaker.

use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::FetchError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
];

const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    request_delay_secs: f64,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(cfg: &PipelineConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(cfg.http_timeout())
            .build()
            .unwrap_or_default();
        Self {
            client,
            request_delay_secs: cfg.request_delay_secs,
            max_retries: cfg.max_retries.max(1),
        }
    }

    /// GET the URL and return the body text.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_with_query::<&str>(url, &[]).await
    }

    /// GET with query parameters. Retries transport errors up to
    /// `max_retries` with a fixed short backoff; a non-2xx status is
    /// reported immediately (the server answered, retrying won't help).
    pub async fn fetch_with_query<V: AsRef<str>>(
        &self,
        url: &str,
        query: &[(&str, V)],
    ) -> Result<String, FetchError> {
        self.pause_before_request().await;

        let mut last_err: Option<reqwest::Error> = None;
        for attempt in 1..=self.max_retries {
            let req = self
                .client
                .get(url)
                .headers(browser_headers())
                .query(
                    &query
                        .iter()
                        .map(|(k, v)| (*k, v.as_ref()))
                        .collect::<Vec<_>>(),
                );
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        warn!(url, status = status.as_u16(), "non-success status");
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }
                    return resp.text().await.map_err(|e| FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    debug!(url, attempt, error = %e, "fetch attempt failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.max_retries,
            source: last_err.expect("at least one attempt ran"),
        })
    }

    /// Randomized inter-request pause, uniform in [1, request_delay] seconds.
    /// A suspension point, not a blocking sleep.
    async fn pause_before_request(&self) {
        let upper = self.request_delay_secs.max(1.0);
        let secs = {
            let mut rng = rand::rng();
            rng.random_range(1.0..=upper)
        };
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

/// A rotated set of realistic browser headers.
fn browser_headers() -> HeaderMap {
    let ua = {
        let mut rng = rand::rng();
        *USER_AGENTS.choose(&mut rng).expect("non-empty UA pool")
    };
    let mut headers = HeaderMap::new();
    headers.insert("User-Agent", HeaderValue::from_static(ua));
    headers.insert(
        "Accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        "Accept-Language",
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers
}
