//! Data acquisition: the normalized content item, the source capability
//! trait, and the parsing helpers shared by concrete scrapers.

pub mod eastmoney;
pub mod sina;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::sentiment::Polarity;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 1000;

/// Which scraper produced an item. Doubles as the tag stored in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    SinaNews,
    EastmoneyForum,
}

impl SourceKind {
    pub fn is_news(self) -> bool {
        matches!(self, SourceKind::SinaNews)
    }

    pub fn is_forum(self) -> bool {
        matches!(self, SourceKind::EastmoneyForum)
    }

    /// Human-readable platform name used in the report.
    pub fn display_name(self) -> &'static str {
        match self {
            SourceKind::SinaNews => "新浪财经",
            SourceKind::EastmoneyForum => "东方财富股吧",
        }
    }
}

/// Read/reply/like counters; forum posts only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub read_count: u64,
    pub reply_count: u64,
    pub like_count: u64,
}

impl Engagement {
    pub fn total(&self) -> u64 {
        self.read_count + self.reply_count + self.like_count
    }
}

/// A single acquired unit: news article or forum post. Created by a scraper
/// at fetch time, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub body: String,
    pub url: String,
    /// Canonical local-time string, `%Y-%m-%d %H:%M:%S`. Always resolvable;
    /// unparsable inputs fall back to the acquisition instant.
    pub publish_time: String,
    pub source: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero_engagement")]
    pub engagement: Engagement,
    /// Acquisition-time label from the cheap keyword pass; the full analyzer
    /// runs later, once, over the merged corpus.
    pub sentiment: Polarity,
}

fn is_zero_engagement(e: &Engagement) -> bool {
    e.total() == 0
}

impl ContentItem {
    /// Truncate title/body to their bounded lengths (char-wise, CJK safe).
    pub fn bounded(mut self) -> Self {
        self.title = truncate_chars(&self.title, MAX_TITLE_CHARS);
        self.body = truncate_chars(&self.body, MAX_BODY_CHARS);
        self
    }

    /// The parsed publish instant; falls back to now when the stored string
    /// is somehow unreadable (it never should be).
    pub fn publish_instant(&self) -> DateTime<Local> {
        NaiveDateTime::parse_from_str(&self.publish_time, "%Y-%m-%d %H:%M:%S")
            .ok()
            .and_then(|ndt| Local.from_local_datetime(&ndt).single())
            .unwrap_or_else(Local::now)
    }

    /// Calendar day of publication, used by the dedup hash.
    pub fn publish_day(&self) -> NaiveDate {
        self.publish_instant().date_naive()
    }

    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

/// A concrete news/forum source. Implementations return the subset of items
/// that parsed cleanly (partial-success semantics); only a failure to obtain
/// any listing at all surfaces as an error.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Stable source name; feeds the circuit breaker and dedup priority.
    fn name(&self) -> &'static str;
    fn kind(&self) -> SourceKind;
    async fn get_items(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<ContentItem>, SourceError>;
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Normalize a stock code to the 6-digit form the Chinese sources expect:
/// strip market suffixes, zero-pad numeric codes.
pub fn normalize_symbol(symbol: &str) -> String {
    let mut s = symbol.trim().to_string();
    for suffix in [".SZ", ".SH", ".BJ", ".sz", ".sh", ".bj"] {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
            break;
        }
    }
    if s.chars().all(|c| c.is_ascii_digit()) && s.len() < 6 {
        s = format!("{s:0>6}");
    }
    s
}

// Cheap keyword lists for the acquisition-time label. Deliberately smaller
// and flatter than the weighted lexicon in `sentiment`.
const QUICK_POSITIVE: &[&str] = &[
    "上涨", "增长", "利好", "看好", "买入", "推荐", "强势", "突破", "创新高", "涨停", "盈利",
    "赚钱", "机会",
];
const QUICK_NEGATIVE: &[&str] = &[
    "下跌", "下降", "利空", "看空", "卖出", "风险", "跌破", "创新低", "跌停", "亏损", "亏钱",
    "危险",
];

/// Fast lexical label so dedup/filter stages have something to filter on
/// without invoking the full analyzer twice.
pub fn quick_sentiment(text: &str) -> Polarity {
    let text = text.to_lowercase();
    let pos = QUICK_POSITIVE.iter().filter(|w| text.contains(*w)).count();
    let neg = QUICK_NEGATIVE.iter().filter(|w| text.contains(*w)).count();
    match pos.cmp(&neg) {
        std::cmp::Ordering::Greater => Polarity::Positive,
        std::cmp::Ordering::Less => Polarity::Negative,
        std::cmp::Ordering::Equal => Polarity::Neutral,
    }
}

pub fn format_instant(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

static RE_LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

/// Parse the heterogeneous time strings the sources emit into the canonical
/// local-time string. Total parse failure defaults to "now", never null.
pub fn parse_publish_time(raw: &str) -> String {
    format_instant(parse_publish_instant(raw))
}

fn parse_publish_instant(raw: &str) -> DateTime<Local> {
    let now = Local::now();
    let s = raw.trim();
    if s.is_empty() {
        return now;
    }

    // Relative forms: N分钟前 / N小时前 / N天前.
    if let Some(n) = relative_amount(s, "分钟前") {
        return now - Duration::minutes(n);
    }
    if let Some(n) = relative_amount(s, "小时前") {
        return now - Duration::hours(n);
    }
    if let Some(n) = relative_amount(s, "天前") {
        return now - Duration::days(n);
    }

    // Unix seconds (Sina roll feeds emit these as 10-digit strings).
    if s.len() == 10 && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(secs) = s.parse::<i64>() {
            if let Some(dt) = Local.timestamp_opt(secs, 0).single() {
                return dt;
            }
        }
    }

    // RFC2822-ish RSS dates.
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt.with_timezone(&Local);
    }

    // Absolute forms, most specific first.
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y年%m月%d日 %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            if let Some(dt) = Local.from_local_datetime(&ndt).single() {
                return dt;
            }
        }
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = Local
            .from_local_datetime(&nd.and_hms_opt(0, 0, 0).expect("midnight"))
            .single()
        {
            return dt;
        }
    }
    // Partial date missing the year (guba listing column): assume this year.
    if let Ok(ndt) =
        NaiveDateTime::parse_from_str(&format!("{} {}", now.year(), s), "%Y %m-%d %H:%M")
    {
        if let Some(dt) = Local.from_local_datetime(&ndt).single() {
            return dt;
        }
    }

    now
}

fn relative_amount(s: &str, marker: &str) -> Option<i64> {
    if !s.contains(marker) {
        return None;
    }
    RE_LEADING_NUMBER
        .captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
