//! EastMoney guba forum scraper: paginated listing pages plus per-post
//! detail pages, normalized into forum `ContentItem`s with engagement.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::dedup::filter_by_lookback;
use crate::error::SourceError;
use crate::fetch::HttpFetcher;
use crate::sources::{
    normalize_symbol, parse_publish_time, quick_sentiment, ContentItem, Engagement, NewsSource,
    SourceKind,
};

const BASE_URL: &str = "https://guba.eastmoney.com";
const MAX_LISTING_PAGES: usize = 3;

/// Listing-row stub; the detail fetch fills in the body and like count.
#[derive(Debug, Clone)]
pub(crate) struct PostStub {
    pub title: String,
    pub url: String,
    pub author: String,
    pub read_count: u64,
    pub reply_count: u64,
    pub publish_time: String,
}

pub struct EastMoneyForumSource {
    fetcher: HttpFetcher,
    max_posts: usize,
}

impl EastMoneyForumSource {
    pub fn new(fetcher: HttpFetcher, max_posts: usize) -> Self {
        Self { fetcher, max_posts }
    }

    fn listing_url(code: &str, page: usize) -> String {
        format!("{BASE_URL}/list,{code},f_{page}.html")
    }

    async fn collect_stubs(&self, code: &str) -> Result<Vec<PostStub>, SourceError> {
        let mut stubs = Vec::new();
        for page in 1..=MAX_LISTING_PAGES {
            let url = Self::listing_url(code, page);
            match self.fetcher.fetch(&url).await {
                Ok(html) => stubs.extend(parse_listing(&html)),
                Err(e) if page == 1 => return Err(e.into()),
                Err(e) => {
                    warn!(source = "eastmoney", page, error = %e, "listing page failed, stopping pagination");
                    break;
                }
            }
            if stubs.len() >= self.max_posts {
                break;
            }
        }
        stubs.truncate(self.max_posts);
        Ok(stubs)
    }
}

#[async_trait]
impl NewsSource for EastMoneyForumSource {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::EastmoneyForum
    }

    async fn get_items(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<ContentItem>, SourceError> {
        let code = normalize_symbol(symbol);
        let stubs = self.collect_stubs(&code).await?;

        let mut items = Vec::with_capacity(stubs.len());
        for stub in stubs {
            // Detail failures degrade to the listing stub; the post itself
            // is not lost.
            let detail = match self.fetcher.fetch(&stub.url).await {
                Ok(html) => parse_detail(&html),
                Err(e) => {
                    debug!(source = "eastmoney", url = %stub.url, error = %e, "detail fetch failed");
                    PostDetail::default()
                }
            };
            items.push(build_item(stub, detail));
        }

        Ok(filter_by_lookback(items, lookback_days))
    }
}

#[derive(Debug, Default)]
pub(crate) struct PostDetail {
    pub body: String,
    pub like_count: u64,
    pub exact_time: Option<String>,
}

fn build_item(stub: PostStub, detail: PostDetail) -> ContentItem {
    let publish_time = detail
        .exact_time
        .map(|t| parse_publish_time(&t))
        .unwrap_or(stub.publish_time);
    let sentiment = quick_sentiment(&format!("{} {}", stub.title, detail.body));
    ContentItem {
        title: stub.title,
        body: detail.body,
        url: stub.url,
        publish_time,
        source: SourceKind::EastmoneyForum,
        author: Some(stub.author),
        engagement: Engagement {
            read_count: stub.read_count,
            reply_count: stub.reply_count,
            like_count: detail.like_count,
        },
        sentiment,
    }
    .bounded()
}

static SEL_ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.articleh, div.normal_post").expect("row selector"));
static SEL_READ: Lazy<Selector> = Lazy::new(|| Selector::parse("span.l1").expect("l1"));
static SEL_REPLY: Lazy<Selector> = Lazy::new(|| Selector::parse("span.l2").expect("l2"));
static SEL_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.l3 a, a.l3").expect("l3"));
static SEL_AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("span.l4").expect("l4"));
static SEL_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("span.l5").expect("l5"));
static SEL_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.stockcodec, #zwcontentmain").expect("body selector"));
static SEL_LIKE: Lazy<Selector> = Lazy::new(|| Selector::parse("span.like-num").expect("like"));
static SEL_POST_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.zwfbtime").expect("meta"));

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static RE_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}").unwrap());

/// Parse a guba listing page into post stubs. Rows missing a title link are
/// skipped; nothing here aborts the page.
pub(crate) fn parse_listing(html: &str) -> Vec<PostStub> {
    let doc = Html::parse_document(html);
    let mut stubs = Vec::new();

    for row in doc.select(&SEL_ROW) {
        let Some(link) = row.select(&SEL_TITLE).next() else {
            continue;
        };
        let title = element_text(&link);
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{BASE_URL}{}", href)
        };

        let read_count = row
            .select(&SEL_READ)
            .next()
            .map(|e| extract_number(&element_text(&e)))
            .unwrap_or(0);
        let reply_count = row
            .select(&SEL_REPLY)
            .next()
            .map(|e| extract_number(&element_text(&e)))
            .unwrap_or(0);
        let author = row
            .select(&SEL_AUTHOR)
            .next()
            .map(|e| element_text(&e))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "匿名用户".to_string());
        let publish_time = row
            .select(&SEL_TIME)
            .next()
            .map(|e| parse_publish_time(&element_text(&e)))
            .unwrap_or_else(|| parse_publish_time(""));

        stubs.push(PostStub {
            title,
            url,
            author,
            read_count,
            reply_count,
            publish_time,
        });
    }

    stubs
}

/// Parse a post detail page: body text, like count, and the exact publish
/// timestamp when present.
pub(crate) fn parse_detail(html: &str) -> PostDetail {
    let doc = Html::parse_document(html);

    let body = doc
        .select(&SEL_BODY)
        .next()
        .map(|e| element_text(&e))
        .unwrap_or_default();
    let like_count = doc
        .select(&SEL_LIKE)
        .next()
        .map(|e| extract_number(&element_text(&e)))
        .unwrap_or(0);
    let exact_time = doc
        .select(&SEL_POST_META)
        .next()
        .and_then(|e| RE_DATETIME.find(&element_text(&e)).map(|m| m.as_str().to_string()));

    PostDetail {
        body,
        like_count,
        exact_time,
    }
}

fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn extract_number(text: &str) -> u64 {
    RE_NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
