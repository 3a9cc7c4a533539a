//! Pipeline orchestration: cache check, breaker gating, source fan-out,
//! dedup/filter, scoring, optional LLM refinement, report assembly.
//!
//! The public surface never fails: every degradation path ends in a
//! fallback report with the same shape as the real one.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Local};
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::breaker::{CircuitBreaker, SourceHealth};
use crate::cache::SentimentCache;
use crate::config::PipelineConfig;
use crate::dedup::{dedup_items, filter_by_lookback, filter_items};
use crate::enhance::LlmEnhancer;
use crate::report::{
    extract_hot_topics, BatchReport, DataStatistics, DataTransparency, DetailedData,
    ReportSource, SentimentReport, TimeRange, MAX_DETAILED_ITEMS,
};
use crate::sentiment::SentimentAnalyzer;
use crate::sources::{normalize_symbol, ContentItem, NewsSource};
use crate::stocks::stock_info;

const CACHE_ENTRY_TYPE: &str = "social_sentiment";

pub struct SentimentOrchestrator {
    config: PipelineConfig,
    sources: Vec<Arc<dyn NewsSource>>,
    analyzer: SentimentAnalyzer,
    enhancer: Option<LlmEnhancer>,
    cache: Option<SentimentCache>,
    breaker: CircuitBreaker,
}

impl SentimentOrchestrator {
    /// All collaborators are injected; nothing here reads the environment
    /// or touches globals.
    pub fn new(
        config: PipelineConfig,
        sources: Vec<Arc<dyn NewsSource>>,
        analyzer: SentimentAnalyzer,
        enhancer: Option<LlmEnhancer>,
        cache: Option<SentimentCache>,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown_secs);
        Self {
            config,
            sources,
            analyzer,
            enhancer,
            cache,
            breaker,
        }
    }

    pub fn source_health(&self) -> Vec<SourceHealth> {
        self.breaker.health_status()
    }

    /// Produce the sentiment report for one symbol. Infallible by contract:
    /// every failure mode degrades to a fallback report.
    pub async fn get_sentiment(&self, symbol: &str, lookback_days: u32) -> SentimentReport {
        let started = std::time::Instant::now();
        let code = normalize_symbol(symbol);
        let stock = stock_info(&code);
        let cache_params = cache_params(lookback_days);

        if let Some(mut report) = self.cached_report(&code, &cache_params) {
            info!(symbol = %code, "serving cached report");
            report.data_transparency.cached = true;
            return report;
        }

        let source_names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        if self.breaker.should_use_fallback(&source_names) {
            warn!(symbol = %code, "all source circuits open");
            let mut report = SentimentReport::fallback(
                &code,
                &stock.name,
                lookback_days,
                "所有数据源熔断中".to_string(),
            );
            report.query_time_ms = started.elapsed().as_millis() as u64;
            return report;
        }

        let (items, reached_sources, errors) = self.fan_out(&code, lookback_days).await;
        if reached_sources.is_empty() {
            warn!(symbol = %code, "no source produced data");
            let mut report = SentimentReport::fallback(
                &code,
                &stock.name,
                lookback_days,
                if errors.is_empty() {
                    "没有可用的数据源".to_string()
                } else {
                    errors.join("; ")
                },
            );
            report.query_time_ms = started.elapsed().as_millis() as u64;
            return report;
        }

        let items = filter_items(dedup_items(filter_by_lookback(items, lookback_days)));
        let mut report = self
            .assemble(&code, &stock.name, lookback_days, reached_sources, items)
            .await;
        report.query_time_ms = started.elapsed().as_millis() as u64;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(
                &code,
                CACHE_ENTRY_TYPE,
                &cache_params,
                json!(&report),
            ) {
                warn!(symbol = %code, error = %e, "cache write failed");
            }
        }
        report
    }

    /// Fan out to the symbols concurrently and merge into one batch view.
    pub async fn get_aggregated(
        self: &Arc<Self>,
        symbols: &[String],
        lookback_days: u32,
    ) -> BatchReport {
        let mut set = JoinSet::new();
        for symbol in symbols {
            let this = Arc::clone(self);
            let symbol = symbol.clone();
            set.spawn(async move {
                let report = this.get_sentiment(&symbol, lookback_days).await;
                (symbol, report)
            });
        }

        let mut reports: Vec<(String, SentimentReport)> = Vec::with_capacity(symbols.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => reports.push(pair),
                Err(e) => warn!(error = %e, "aggregation task panicked"),
            }
        }
        // A panicked task loses its symbol; stand in a fallback entry so the
        // batch always covers every requested symbol.
        for symbol in symbols {
            if !reports.iter().any(|(s, _)| s == symbol) {
                let code = normalize_symbol(symbol);
                let stock = stock_info(&code);
                reports.push((
                    symbol.clone(),
                    SentimentReport::fallback(
                        &code,
                        &stock.name,
                        lookback_days,
                        "聚合任务异常终止".to_string(),
                    ),
                ));
            }
        }
        // Join order is completion order; restore the caller's.
        reports.sort_by_key(|(symbol, _)| {
            symbols.iter().position(|s| s == symbol).unwrap_or(usize::MAX)
        });

        BatchReport::from_reports(
            symbols.to_vec(),
            reports.into_iter().map(|(_, r)| r).collect(),
        )
    }

    /// Poll every closed-circuit source concurrently; breaker bookkeeping
    /// happens after the join, in source order, so it stays deterministic.
    /// An empty batch counts as a failure: a source that answers but never
    /// carries data must eventually open its circuit too.
    async fn fan_out(
        &self,
        code: &str,
        lookback_days: u32,
    ) -> (Vec<ContentItem>, Vec<&'static str>, Vec<String>) {
        let mut set = JoinSet::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let name = source.name();
            if self.breaker.is_open(name) {
                warn!(source = name, "circuit open, skipping source");
                continue;
            }
            let source = Arc::clone(source);
            let code = code.to_string();
            set.spawn(async move {
                let result = source.get_items(&code, lookback_days).await;
                (idx, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => warn!(error = %e, "source task panicked"),
            }
        }
        results.sort_by_key(|(idx, _)| *idx);

        let mut items = Vec::new();
        let mut reached = Vec::new();
        let mut errors = Vec::new();
        for (idx, result) in results {
            let source = &self.sources[idx];
            let name = source.name();
            match result {
                Ok(batch) if !batch.is_empty() => {
                    info!(source = name, items = batch.len(), "source fetched");
                    self.breaker.record_success(name);
                    reached.push(source.kind().display_name());
                    items.extend(batch);
                }
                Ok(_) => {
                    warn!(source = name, "source returned no items");
                    self.breaker.record_failure(name);
                    errors.push(format!("{name}: returned no items"));
                }
                Err(e) => {
                    warn!(source = name, error = %e, "source failed");
                    self.breaker.record_failure(name);
                    errors.push(format!("{name}: {e}"));
                }
            }
        }
        (items, reached, errors)
    }

    async fn assemble(
        &self,
        code: &str,
        stock_name: &str,
        lookback_days: u32,
        data_sources: Vec<&'static str>,
        items: Vec<ContentItem>,
    ) -> SentimentReport {
        let (news, forum): (Vec<ContentItem>, Vec<ContentItem>) =
            items.into_iter().partition(|it| it.source.is_news());

        let news_texts: Vec<String> = news.iter().map(ContentItem::combined_text).collect();
        let forum_texts: Vec<String> = forum.iter().map(ContentItem::combined_text).collect();
        let lexical = self.analyzer.analyze_stock_sentiment(
            &news_texts,
            &forum_texts,
            self.config.news_weight,
            self.config.forum_weight,
        );

        let llm_assessment = match &self.enhancer {
            Some(enhancer) if enhancer.is_configured() => {
                let stock = stock_info(code);
                match enhancer.assess(&stock, &news, &forum, &lexical).await {
                    Ok(consensus) => Some(consensus),
                    Err(e) => {
                        warn!(symbol = code, error = %e, "llm refinement unavailable, lexical result stands");
                        None
                    }
                }
            }
            _ => None,
        };

        let total_interactions = forum.iter().map(|it| it.engagement.total()).sum();
        let hot_topics = extract_hot_topics(&forum);
        let now = Local::now();

        let mut detailed_news = news;
        let mut detailed_forum = forum;
        detailed_news.truncate(MAX_DETAILED_ITEMS);
        detailed_forum.truncate(MAX_DETAILED_ITEMS);

        SentimentReport {
            symbol: code.to_string(),
            stock_name: stock_name.to_string(),
            analysis_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            // The caller overwrites this with the measured wall time.
            query_time_ms: 0,
            source: ReportSource::RealData,
            sentiment_analysis: SentimentReport::sentiment_section(&lexical),
            data_statistics: DataStatistics {
                total_news: lexical.news_count,
                total_forum_posts: lexical.forum_count,
                total_interactions,
                data_sources: data_sources.into_iter().map(String::from).collect(),
            },
            hot_topics,
            detailed_data: DetailedData {
                news: detailed_news,
                forum_discussions: detailed_forum,
            },
            time_range: TimeRange {
                start: (now - Duration::days(i64::from(lookback_days)))
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                end: now.format("%Y-%m-%d %H:%M:%S").to_string(),
                lookback_days,
            },
            data_transparency: DataTransparency {
                data_kind: ReportSource::RealData,
                cached: false,
                note: "基于实时抓取的新闻与论坛数据".to_string(),
            },
            llm_assessment,
            error: None,
        }
    }

    fn cached_report(
        &self,
        code: &str,
        params: &BTreeMap<String, String>,
    ) -> Option<SentimentReport> {
        let record = self.cache.as_ref()?.get(code, CACHE_ENTRY_TYPE, params)?;
        match serde_json::from_value(record.data) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(symbol = code, error = %e, "cached report unreadable, refetching");
                None
            }
        }
    }
}

fn cache_params(lookback_days: u32) -> BTreeMap<String, String> {
    BTreeMap::from([("days".to_string(), lookback_days.to_string())])
}
