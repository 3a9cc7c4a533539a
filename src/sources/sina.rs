//! Sina Finance news source: the stock RSS feed plus two roll-news JSON
//! endpoints, merged, filtered by keyword and de-duplicated by URL.

use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::warn;

use crate::error::SourceError;
use crate::fetch::HttpFetcher;
use crate::sources::{
    normalize_symbol, parse_publish_time, quick_sentiment, ContentItem, Engagement, NewsSource,
    SourceKind,
};
use crate::stocks::stock_info;

const RSS_URL: &str = "https://feed.sina.com.cn/api/news/rss";
const ROLL_ALL_URL: &str = "https://feed.sina.com.cn/api/roll/all";
const ROLL_FINANCE_URL: &str = "https://feed.sina.com.cn/api/roll/finance";
const MAX_ITEMS: usize = 50;

pub struct SinaNewsSource {
    fetcher: HttpFetcher,
}

impl SinaNewsSource {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }

    async fn fetch_rss(&self, keyword: &str) -> Result<Vec<ContentItem>, SourceError> {
        let body = self
            .fetcher
            .fetch_with_query(RSS_URL, &[("cate", "stock"), ("keyword", keyword)])
            .await?;
        parse_rss(&body)
    }

    async fn fetch_search(&self, keyword: &str) -> Result<Vec<ContentItem>, SourceError> {
        let body = self
            .fetcher
            .fetch_with_query(
                ROLL_ALL_URL,
                &[
                    ("pageid", "153"),
                    ("lid", "2516"),
                    ("k", keyword),
                    ("num", "20"),
                    ("page", "1"),
                ],
            )
            .await?;
        Ok(parse_roll(&body, &[keyword])?)
    }

    async fn fetch_market(&self, stock_code: &str, stock_name: &str) -> Result<Vec<ContentItem>, SourceError> {
        let body = self
            .fetcher
            .fetch_with_query(
                ROLL_FINANCE_URL,
                &[("pageid", "153"), ("lid", "2517"), ("num", "20"), ("page", "1")],
            )
            .await?;
        Ok(parse_roll(&body, &[stock_code, stock_name, "股票"])?)
    }
}

#[async_trait]
impl NewsSource for SinaNewsSource {
    fn name(&self) -> &'static str {
        "sina"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SinaNews
    }

    /// Fans out to the three feeds; any single feed failure is logged and
    /// skipped. Errors only when every feed failed.
    async fn get_items(
        &self,
        symbol: &str,
        _lookback_days: u32,
    ) -> Result<Vec<ContentItem>, SourceError> {
        let code = normalize_symbol(symbol);
        let name = stock_info(&code).name;

        let (rss, search, market) = tokio::join!(
            self.fetch_rss(&code),
            self.fetch_search(&name),
            self.fetch_market(&code, &name),
        );

        let mut items = Vec::new();
        let mut first_err = None;
        for result in [rss, search, market] {
            match result {
                Ok(mut batch) => items.append(&mut batch),
                Err(e) => {
                    warn!(source = "sina", error = %e, "feed failed, continuing with the rest");
                    first_err.get_or_insert(e);
                }
            }
        }
        if items.is_empty() {
            if let Some(e) = first_err {
                return Err(e);
            }
        }

        items = dedup_by_url(items);
        items.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
        items.truncate(MAX_ITEMS);
        Ok(items)
    }
}

// --- RSS parsing (quick-xml derive) ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}
#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

pub(crate) fn parse_rss(xml: &str) -> Result<Vec<ContentItem>, SourceError> {
    let rss: Rss = from_str(xml).map_err(|e| SourceError::parse("sina rss", e))?;
    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = it.title.unwrap_or_default();
        let link = it.link.unwrap_or_default();
        if title.is_empty() || link.is_empty() {
            continue;
        }
        let body = html_escape::decode_html_entities(&it.description.unwrap_or_default()).to_string();
        let sentiment = quick_sentiment(&format!("{title} {body}"));
        out.push(
            ContentItem {
                title,
                body,
                url: link,
                publish_time: parse_publish_time(it.pub_date.as_deref().unwrap_or_default()),
                source: SourceKind::SinaNews,
                author: None,
                engagement: Engagement::default(),
                sentiment,
            }
            .bounded(),
        );
    }
    Ok(out)
}

// --- Roll-news JSON parsing ---

#[derive(Debug, Deserialize)]
struct Roll {
    #[serde(default)]
    result: Option<RollResult>,
}
#[derive(Debug, Deserialize)]
struct RollResult {
    #[serde(default)]
    data: Vec<RollItem>,
}
#[derive(Debug, Deserialize)]
struct RollItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    ctime: String,
}

/// Parse the roll feed, keeping entries that mention any of the keywords.
pub(crate) fn parse_roll(json: &str, keywords: &[&str]) -> Result<Vec<ContentItem>, SourceError> {
    let roll: Roll = serde_json::from_str(json).map_err(|e| SourceError::parse("sina roll", e))?;
    let data = roll.result.map(|r| r.data).unwrap_or_default();

    let mut out = Vec::new();
    for it in data {
        if it.title.is_empty() {
            continue;
        }
        let relevant = keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| it.title.contains(*k) || it.summary.contains(*k));
        if !relevant {
            continue;
        }
        let sentiment = quick_sentiment(&format!("{} {}", it.title, it.summary));
        out.push(
            ContentItem {
                title: it.title,
                body: it.summary,
                url: it.url,
                publish_time: parse_publish_time(&it.ctime),
                source: SourceKind::SinaNews,
                author: None,
                engagement: Engagement::default(),
                sentiment,
            }
            .bounded(),
        );
    }
    Ok(out)
}

fn dedup_by_url(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|it| seen.insert(format!("{}_{}", it.title, it.url)))
        .collect()
}
