//! Deduplication and quality filtering of merged acquisition results.
//!
//! Dedup key: title (case-folded, trimmed) + publish calendar day. Two items
//! with the same key are the same story no matter which source carried them
//! or how their engagement counters differ. Folding order is deterministic:
//! higher source priority first, then newer publish time, then title, so the
//! surviving copy does not depend on fetch completion order.

use std::collections::HashSet;

use chrono::{Duration, Local};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::source_priority;
use crate::sources::ContentItem;

/// Minimum combined title+body length (chars) for an item to count.
pub const MIN_CONTENT_CHARS: usize = 50;
/// Same-day titles at least this similar are treated as reposts.
const NEAR_DUP_THRESHOLD: f64 = 0.92;

const SPAM_KEYWORDS: &[&str] = &[
    "加微信",
    "加QQ",
    "荐股群",
    "带你操作",
    "稳赚不赔",
    "免费诊股",
    "点击领取",
    "开户返佣",
];

/// Stable fingerprint of (title, publish day).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(item: &ContentItem) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(item.title.trim().to_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(item.publish_day().to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// First-seen-wins dedup over a deterministic ordering.
pub fn dedup_items(mut items: Vec<ContentItem>) -> Vec<ContentItem> {
    items.sort_by(|a, b| {
        let pa = source_priority(source_name(a));
        let pb = source_priority(source_name(b));
        pb.partial_cmp(&pa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.publish_time.cmp(&a.publish_time))
            .then_with(|| a.title.cmp(&b.title))
    });

    let mut seen: HashSet<ContentHash> = HashSet::new();
    let before = items.len();
    let kept: Vec<ContentItem> = items
        .into_iter()
        .filter(|it| seen.insert(ContentHash::of(it)))
        .collect();
    if kept.len() < before {
        debug!(removed = before - kept.len(), "deduplicated merged items");
    }
    kept
}

/// Drop spam, too-short, and near-duplicate same-day items. Run after
/// `dedup_items` so the near-dup pass sees the canonical copies.
pub fn filter_items(items: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut kept: Vec<ContentItem> = Vec::with_capacity(items.len());
    for item in items {
        if is_spam(&item) {
            debug!(title = %item.title, "dropped spam item");
            continue;
        }
        if item.combined_text().chars().count() < MIN_CONTENT_CHARS {
            continue;
        }
        let near_dup = kept.iter().any(|k| {
            k.publish_day() == item.publish_day()
                && strsim::normalized_levenshtein(&k.title, &item.title) >= NEAR_DUP_THRESHOLD
        });
        if near_dup {
            continue;
        }
        kept.push(item);
    }
    kept
}

/// Keep items inside the lookback window. Items whose timestamp fell back
/// to "now" pass by construction.
pub fn filter_by_lookback(items: Vec<ContentItem>, lookback_days: u32) -> Vec<ContentItem> {
    let cutoff = Local::now() - Duration::days(i64::from(lookback_days));
    items
        .into_iter()
        .filter(|it| it.publish_instant() >= cutoff)
        .collect()
}

pub fn is_spam(item: &ContentItem) -> bool {
    let text = item.combined_text();
    SPAM_KEYWORDS.iter().any(|k| text.contains(k))
}

fn source_name(item: &ContentItem) -> &'static str {
    match item.source {
        crate::sources::SourceKind::SinaNews => "sina",
        crate::sources::SourceKind::EastmoneyForum => "eastmoney",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::Polarity;
    use crate::sources::{ContentItem, Engagement, SourceKind};

    fn item(title: &str, body: &str, source: SourceKind, time: &str) -> ContentItem {
        ContentItem {
            title: title.to_string(),
            body: body.to_string(),
            url: format!("https://example.test/{title}"),
            publish_time: time.to_string(),
            source,
            author: None,
            engagement: Engagement::default(),
            sentiment: Polarity::Neutral,
        }
    }

    fn long_body() -> String {
        "内容".repeat(40)
    }

    #[test]
    fn same_title_same_day_collapses_across_sources() {
        let a = item("科蓝软件中标大单", "新闻正文", SourceKind::SinaNews, "2024-05-01 09:00:00");
        let b = item(
            "科蓝软件中标大单",
            "论坛转载",
            SourceKind::EastmoneyForum,
            "2024-05-01 15:00:00",
        );
        let out = dedup_items(vec![a, b]);
        assert_eq!(out.len(), 1);
        // Higher-priority source wins regardless of input order.
        assert_eq!(out[0].source, SourceKind::EastmoneyForum);
    }

    #[test]
    fn engagement_difference_does_not_defeat_dedup() {
        let mut a = item("同一个帖子", "x", SourceKind::EastmoneyForum, "2024-05-01 09:00:00");
        let mut b = a.clone();
        a.engagement.read_count = 10;
        b.engagement.read_count = 9999;
        assert_eq!(dedup_items(vec![a, b]).len(), 1);
    }

    #[test]
    fn title_match_is_case_insensitive() {
        let a = item("AI Concept Stock", "x", SourceKind::SinaNews, "2024-05-01 09:00:00");
        let b = item("ai concept stock", "y", SourceKind::SinaNews, "2024-05-01 10:00:00");
        assert_eq!(dedup_items(vec![a, b]).len(), 1);
    }

    #[test]
    fn different_days_are_distinct() {
        let a = item("复牌公告", "x", SourceKind::SinaNews, "2024-05-01 09:00:00");
        let b = item("复牌公告", "x", SourceKind::SinaNews, "2024-05-02 09:00:00");
        assert_eq!(dedup_items(vec![a, b]).len(), 2);
    }

    #[test]
    fn dedup_is_input_order_independent() {
        let a = item("公告一则", "x", SourceKind::SinaNews, "2024-05-01 09:00:00");
        let b = item("公告一则", "y", SourceKind::EastmoneyForum, "2024-05-01 10:00:00");
        let left = dedup_items(vec![a.clone(), b.clone()]);
        let right = dedup_items(vec![b, a]);
        assert_eq!(left[0].source, right[0].source);
        assert_eq!(left[0].body, right[0].body);
    }

    #[test]
    fn short_items_are_filtered() {
        let a = item("短", "很短", SourceKind::SinaNews, "2024-05-01 09:00:00");
        assert!(filter_items(vec![a]).is_empty());
    }

    #[test]
    fn spam_keywords_are_filtered() {
        let a = item(
            "牛股推荐加微信领取",
            &long_body(),
            SourceKind::EastmoneyForum,
            "2024-05-01 09:00:00",
        );
        assert!(filter_items(vec![a]).is_empty());
    }

    #[test]
    fn near_duplicate_same_day_titles_collapse() {
        let a = item(
            "科蓝软件发布年度业绩预告利润大增",
            &long_body(),
            SourceKind::SinaNews,
            "2024-05-01 09:00:00",
        );
        let b = item(
            "科蓝软件发布年度业绩预告利润大增!",
            &long_body(),
            SourceKind::SinaNews,
            "2024-05-01 10:00:00",
        );
        assert_eq!(filter_items(vec![a, b]).len(), 1);
    }

    #[test]
    fn lookback_window_drops_old_items() {
        let old = item("旧闻", &long_body(), SourceKind::SinaNews, "2000-01-01 00:00:00");
        let fresh = item(
            "新闻",
            &long_body(),
            SourceKind::SinaNews,
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        let kept = filter_by_lookback(vec![old, fresh], 3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "新闻");
    }

    #[test]
    fn content_hash_is_stable() {
        let a = item("标题", "x", SourceKind::SinaNews, "2024-05-01 09:00:00");
        assert_eq!(ContentHash::of(&a), ContentHash::of(&a.clone()));
    }
}
