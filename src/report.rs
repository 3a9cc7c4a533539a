//! The public report contract.
//!
//! Real and fallback reports carry the identical field set; consumers never
//! branch on shape, only on `source`. Keep these structs additive — removing
//! or renaming a field breaks downstream readers.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::enhance::ConsensusAssessment;
use crate::sentiment::{CorpusSentiment, SentimentLevel};
use crate::sources::ContentItem;

/// Where the report's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    RealData,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSection {
    pub overall_score: f64,
    pub sentiment_level: SentimentLevel,
    pub sentiment_description: String,
    pub confidence: f64,
    pub news_sentiment: f64,
    pub forum_sentiment: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStatistics {
    pub total_news: usize,
    pub total_forum_posts: usize,
    /// Sum of read/reply/like counters over the forum posts.
    pub total_interactions: u64,
    pub data_sources: Vec<String>,
}

/// At most this many items are embedded per section; the full corpus only
/// feeds the numbers.
pub const MAX_DETAILED_ITEMS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedData {
    pub news: Vec<ContentItem>,
    pub forum_discussions: Vec<ContentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
    pub lookback_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransparency {
    /// Mirrors the top-level `source`; kept here so the section is
    /// self-describing when extracted on its own.
    pub data_kind: ReportSource,
    pub cached: bool,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReport {
    pub symbol: String,
    pub stock_name: String,
    pub analysis_time: String,
    /// Wall-clock cost of producing this report; 0 when served from cache.
    pub query_time_ms: u64,
    pub source: ReportSource,
    pub sentiment_analysis: SentimentSection,
    pub data_statistics: DataStatistics,
    pub hot_topics: Vec<String>,
    pub detailed_data: DetailedData,
    pub time_range: TimeRange,
    pub data_transparency: DataTransparency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_assessment: Option<ConsensusAssessment>,
    /// Non-null exactly when `source` is `fallback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SentimentReport {
    /// Neutral report emitted when no real data could be obtained. Same
    /// field set as the real one; only the values are inert.
    pub fn fallback(symbol: &str, stock_name: &str, lookback_days: u32, reason: String) -> Self {
        let now = Local::now();
        let end = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let start = (now - chrono::Duration::days(i64::from(lookback_days)))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        Self {
            symbol: symbol.to_string(),
            stock_name: stock_name.to_string(),
            analysis_time: end.clone(),
            query_time_ms: 0,
            source: ReportSource::Fallback,
            sentiment_analysis: SentimentSection {
                overall_score: 0.0,
                sentiment_level: SentimentLevel::Neutral,
                sentiment_description: SentimentLevel::Neutral.description().to_string(),
                confidence: 0.0,
                news_sentiment: 0.0,
                forum_sentiment: 0.0,
            },
            data_statistics: DataStatistics {
                total_news: 0,
                total_forum_posts: 0,
                total_interactions: 0,
                data_sources: Vec::new(),
            },
            hot_topics: Vec::new(),
            detailed_data: DetailedData {
                news: Vec::new(),
                forum_discussions: Vec::new(),
            },
            time_range: TimeRange {
                start,
                end,
                lookback_days,
            },
            data_transparency: DataTransparency {
                data_kind: ReportSource::Fallback,
                cached: false,
                note: "所有数据源不可用，返回降级结果".to_string(),
            },
            llm_assessment: None,
            error: Some(reason),
        }
    }

    pub fn sentiment_section(lexical: &CorpusSentiment) -> SentimentSection {
        SentimentSection {
            overall_score: lexical.overall_score,
            sentiment_level: lexical.sentiment_level,
            sentiment_description: lexical.sentiment_level.description().to_string(),
            confidence: lexical.confidence,
            news_sentiment: lexical.news_sentiment,
            forum_sentiment: lexical.forum_sentiment,
        }
    }
}

/// Cross-symbol batch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub symbols: Vec<String>,
    pub reports: Vec<SentimentReport>,
    /// Confidence-weighted mean of the per-symbol overall scores; fallback
    /// reports carry zero confidence and so drop out of the blend.
    pub average_score: f64,
    pub average_level: SentimentLevel,
    /// Arithmetic mean of the per-symbol confidences.
    pub average_confidence: f64,
    pub fallback_count: usize,
}

impl BatchReport {
    pub fn from_reports(symbols: Vec<String>, reports: Vec<SentimentReport>) -> Self {
        let mut weighted = 0.0f64;
        let mut total_weight = 0.0f64;
        let mut confidence_sum = 0.0f64;
        for r in &reports {
            let s = &r.sentiment_analysis;
            weighted += s.overall_score * s.confidence;
            total_weight += s.confidence;
            confidence_sum += s.confidence;
        }
        let average_score = if total_weight == 0.0 {
            0.0
        } else {
            weighted / total_weight
        };
        let average_confidence = if reports.is_empty() {
            0.0
        } else {
            confidence_sum / reports.len() as f64
        };
        let fallback_count = reports
            .iter()
            .filter(|r| r.source == ReportSource::Fallback)
            .count();
        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            symbols,
            reports,
            average_score,
            average_level: SentimentLevel::from_score(average_score),
            average_confidence,
            fallback_count,
        }
    }
}

/// Forum themes worth surfacing. Counts watchlist keyword occurrences across
/// titles and keeps the most frequent ones.
const TOPIC_WATCHLIST: &[&str] = &[
    "业绩", "重组", "涨停", "跌停", "分红", "解禁", "回购", "并购", "增持", "减持", "中标",
    "商誉", "退市", "利好", "利空", "年报", "季报",
];
const MAX_HOT_TOPICS: usize = 5;

pub fn extract_hot_topics(items: &[ContentItem]) -> Vec<String> {
    let mut counts: Vec<(usize, &str)> = TOPIC_WATCHLIST
        .iter()
        .map(|topic| {
            let n = items.iter().filter(|it| it.title.contains(topic)).count();
            (n, *topic)
        })
        .filter(|(n, _)| *n > 0)
        .collect();
    counts.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    counts
        .into_iter()
        .take(MAX_HOT_TOPICS)
        .map(|(_, t)| t.to_string())
        .collect()
}
