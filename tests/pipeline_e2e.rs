//! End-to-end pipeline tests over mock sources: real reports, degradation,
//! fallback shape and cache behavior through the public API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use ashare_sentiment::error::{FetchError, SourceError};
use ashare_sentiment::report::ReportSource;
use ashare_sentiment::sources::{ContentItem, Engagement, NewsSource, SourceKind};
use ashare_sentiment::{
    PipelineConfig, Polarity, SentimentAnalyzer, SentimentCache, SentimentOrchestrator,
};

struct FixedSource {
    name: &'static str,
    kind: SourceKind,
    items: Vec<ContentItem>,
}

#[async_trait]
impl NewsSource for FixedSource {
    fn name(&self) -> &'static str {
        self.name
    }
    fn kind(&self) -> SourceKind {
        self.kind
    }
    async fn get_items(
        &self,
        _symbol: &str,
        _lookback_days: u32,
    ) -> Result<Vec<ContentItem>, SourceError> {
        Ok(self.items.clone())
    }
}

struct DownSource(&'static str, SourceKind);

#[async_trait]
impl NewsSource for DownSource {
    fn name(&self) -> &'static str {
        self.0
    }
    fn kind(&self) -> SourceKind {
        self.1
    }
    async fn get_items(
        &self,
        _symbol: &str,
        _lookback_days: u32,
    ) -> Result<Vec<ContentItem>, SourceError> {
        Err(SourceError::Fetch(FetchError::Status {
            url: "https://example.test/listing".to_string(),
            status: 502,
        }))
    }
}

fn item(title: &str, body: &str, source: SourceKind, reads: u64) -> ContentItem {
    ContentItem {
        title: title.to_string(),
        body: body.to_string(),
        url: format!("https://example.test/{title}"),
        publish_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        source,
        author: None,
        engagement: Engagement {
            read_count: reads,
            reply_count: 0,
            like_count: 0,
        },
        sentiment: Polarity::Neutral,
    }
}

fn padding() -> String {
    "以下为正文内容，补充足够的篇幅以通过最小长度过滤，包含公司经营情况与市场表现的描述。".to_string()
}

fn news_source() -> Arc<dyn NewsSource> {
    Arc::new(FixedSource {
        name: "sina",
        kind: SourceKind::SinaNews,
        items: vec![
            item(
                "公司业绩大幅增长，机构看好",
                &format!("营收利润双增，前景乐观。{}", padding()),
                SourceKind::SinaNews,
                0,
            ),
            item(
                "获得重要合同，股价上涨",
                &format!("中标大单，利好持续。{}", padding()),
                SourceKind::SinaNews,
                0,
            ),
        ],
    })
}

fn forum_source() -> Arc<dyn NewsSource> {
    Arc::new(FixedSource {
        name: "eastmoney",
        kind: SourceKind::EastmoneyForum,
        items: vec![item(
            "高位套牢，亏损严重，风险太大",
            &format!("连续下跌，已经被套，很悲观。{}", padding()),
            SourceKind::EastmoneyForum,
            350,
        )],
    })
}

fn orchestrator(sources: Vec<Arc<dyn NewsSource>>) -> SentimentOrchestrator {
    SentimentOrchestrator::new(
        PipelineConfig::default(),
        sources,
        SentimentAnalyzer::new(),
        None,
        None,
    )
}

#[tokio::test]
async fn report_blends_news_and_forum_with_configured_weights() {
    let orch = orchestrator(vec![news_source(), forum_source()]);
    let report = orch.get_sentiment("300663", 3).await;

    assert_eq!(report.source, ReportSource::RealData);
    let s = &report.sentiment_analysis;
    assert!(s.news_sentiment > 0.0, "news corpus should score positive");
    assert!(s.forum_sentiment < 0.0, "forum corpus should score negative");
    let expected = s.news_sentiment * 0.6 + s.forum_sentiment * 0.4;
    assert!((s.overall_score - expected).abs() < 1e-9);

    assert_eq!(report.data_statistics.total_news, 2);
    assert_eq!(report.data_statistics.total_forum_posts, 1);
    assert_eq!(report.data_statistics.total_interactions, 350);
    assert_eq!(
        report.data_statistics.data_sources,
        vec!["新浪财经", "东方财富股吧"]
    );
    assert!(report.error.is_none());
    assert_eq!(report.stock_name, "科蓝软件");
}

#[tokio::test]
async fn hot_topics_come_from_forum_titles() {
    let orch = orchestrator(vec![news_source(), forum_source()]);
    let report = orch.get_sentiment("300663", 3).await;
    // The single forum title carries none of the watchlist themes.
    assert!(report.hot_topics.is_empty());
}

#[tokio::test]
async fn fallback_report_matches_real_report_shape() {
    let real = orchestrator(vec![news_source(), forum_source()])
        .get_sentiment("300663", 3)
        .await;
    let fallen = orchestrator(vec![
        Arc::new(DownSource("sina", SourceKind::SinaNews)) as Arc<dyn NewsSource>,
        Arc::new(DownSource("eastmoney", SourceKind::EastmoneyForum)) as Arc<dyn NewsSource>,
    ])
    .get_sentiment("300663", 3)
    .await;

    assert_eq!(fallen.source, ReportSource::Fallback);
    assert_eq!(fallen.sentiment_analysis.overall_score, 0.0);
    assert_eq!(fallen.sentiment_analysis.confidence, 0.0);
    assert!(fallen.error.is_some());

    // Field-for-field identical shape: consumers never branch on structure.
    let real_v = serde_json::to_value(&real).unwrap();
    let fallen_v = serde_json::to_value(&fallen).unwrap();
    let keys = |v: &serde_json::Value| {
        let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        k.retain(|k| k != "error" && k != "llm_assessment");
        k
    };
    assert_eq!(keys(&real_v), keys(&fallen_v));
    assert_eq!(
        real_v["sentiment_analysis"].as_object().unwrap().keys().collect::<Vec<_>>(),
        fallen_v["sentiment_analysis"].as_object().unwrap().keys().collect::<Vec<_>>(),
    );
}

#[tokio::test]
async fn partial_outage_still_produces_real_data() {
    let orch = orchestrator(vec![
        Arc::new(DownSource("sina", SourceKind::SinaNews)) as Arc<dyn NewsSource>,
        forum_source(),
    ]);
    let report = orch.get_sentiment("300663", 3).await;
    assert_eq!(report.source, ReportSource::RealData);
    assert_eq!(report.data_statistics.total_news, 0);
    assert_eq!(report.data_statistics.total_forum_posts, 1);
}

#[tokio::test]
async fn cached_report_is_identical_and_marked() {
    let dir = tempfile::tempdir().unwrap();
    let orch = SentimentOrchestrator::new(
        PipelineConfig::default(),
        vec![news_source(), forum_source()],
        SentimentAnalyzer::new(),
        None,
        Some(SentimentCache::new(dir.path(), 3600).unwrap()),
    );

    let first = orch.get_sentiment("300663", 3).await;
    let second = orch.get_sentiment("300663", 3).await;

    assert!(!first.data_transparency.cached);
    assert!(second.data_transparency.cached);
    assert_eq!(
        first.sentiment_analysis.overall_score,
        second.sentiment_analysis.overall_score
    );
    assert_eq!(first.analysis_time, second.analysis_time);
}

#[tokio::test]
async fn batch_aggregates_across_symbols() {
    let orch = Arc::new(orchestrator(vec![news_source(), forum_source()]));
    let symbols = vec!["300663".to_string(), "000001".to_string()];
    let batch = orch.get_aggregated(&symbols, 3).await;

    assert_eq!(batch.symbols, symbols);
    assert_eq!(batch.reports.len(), 2);
    assert_eq!(batch.fallback_count, 0);
    // Both symbols see the same corpus, so the weighted mean equals either
    // report's own score.
    assert!(
        (batch.average_score - batch.reports[0].sentiment_analysis.overall_score).abs() < 1e-9
    );
    assert!(batch.average_confidence > 0.0);
}
