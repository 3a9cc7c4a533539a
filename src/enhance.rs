//! Optional LLM refinement of the lexical result.
//!
//! One prompt carries the stock identity, a sample of the acquired items and
//! the lexical statistics; each configured chat model answers independently
//! and the answers are merged into a consensus. Model answers arrive either
//! as a JSON object or as free text with a trailing "N分" style score; both
//! are accepted, anything else falls back to the neutral 5.0.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EnhanceError;
use crate::sentiment::CorpusSentiment;
use crate::sources::ContentItem;
use crate::stocks::StockInfo;

/// LLM answers use a 0..=10 scale; 5 is neutral.
pub const NEUTRAL_LLM_SCORE: f64 = 5.0;
const MAX_SAMPLE_ITEMS: usize = 5;

/// A chat-completion backend. One implementation per configured model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Stable model identifier, used in the per-model breakdown.
    fn model_name(&self) -> &str;
    async fn chat(&self, prompt: &str) -> anyhow::Result<String>;
}

/// One model's parsed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAssessment {
    pub model: String,
    /// 0..=10, 5 neutral.
    pub score: f64,
    pub level: String,
    pub analysis: String,
}

/// Merged view over all answering models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusAssessment {
    pub score: f64,
    /// The level most models agreed on, not the level of the mean.
    pub level: String,
    /// `max(0, 1 - stddev/5)`: 1 when the models agree exactly.
    pub consensus: f64,
    pub models: Vec<ModelAssessment>,
}

pub struct LlmEnhancer {
    clients: Vec<Box<dyn ChatClient>>,
}

impl LlmEnhancer {
    pub fn new(clients: Vec<Box<dyn ChatClient>>) -> Self {
        Self { clients }
    }

    pub fn is_configured(&self) -> bool {
        !self.clients.is_empty()
    }

    /// Ask every model; individual failures are logged and skipped. Errors
    /// only when no model produced a usable answer.
    pub async fn assess(
        &self,
        info: &StockInfo,
        news: &[ContentItem],
        forum: &[ContentItem],
        lexical: &CorpusSentiment,
    ) -> Result<ConsensusAssessment, EnhanceError> {
        if self.clients.is_empty() {
            return Err(EnhanceError::NoUsableAnswer);
        }
        let prompt = build_prompt(info, news, forum, lexical);

        let mut assessments = Vec::with_capacity(self.clients.len());
        let mut last_err: Option<anyhow::Error> = None;
        for client in &self.clients {
            match client.chat(&prompt).await {
                Ok(answer) => {
                    let (score, analysis) = parse_answer(&answer);
                    debug!(model = client.model_name(), score, "model answered");
                    assessments.push(ModelAssessment {
                        model: client.model_name().to_string(),
                        score,
                        level: llm_level(score).to_string(),
                        analysis,
                    });
                }
                Err(e) => {
                    warn!(model = client.model_name(), error = %e, "chat model failed, skipping");
                    last_err = Some(e);
                }
            }
        }

        if assessments.is_empty() {
            // Every model failed: surface the last transport error when
            // there is one, so the caller can tell outage from silence.
            return Err(match last_err {
                Some(e) => EnhanceError::Chat(e),
                None => EnhanceError::NoUsableAnswer,
            });
        }
        Ok(merge(assessments))
    }
}

/// Bucket an LLM 0..=10 score into a Chinese label.
pub fn llm_level(score: f64) -> &'static str {
    if score >= 8.0 {
        "非常积极"
    } else if score >= 6.0 {
        "积极"
    } else if score >= 4.0 {
        "中性"
    } else if score >= 2.0 {
        "消极"
    } else {
        "非常消极"
    }
}

fn merge(models: Vec<ModelAssessment>) -> ConsensusAssessment {
    let n = models.len() as f64;
    let mean = models.iter().map(|m| m.score).sum::<f64>() / n;
    let variance = models.iter().map(|m| (m.score - mean).powi(2)).sum::<f64>() / n;
    let consensus = (1.0 - variance.sqrt() / 5.0).max(0.0);
    ConsensusAssessment {
        score: mean,
        level: dominant_level(&models),
        consensus,
        models,
    }
}

/// Most frequent per-model level; first seen wins a tie.
fn dominant_level(models: &[ModelAssessment]) -> String {
    let mut best: Option<(&str, usize)> = None;
    for m in models {
        let count = models.iter().filter(|o| o.level == m.level).count();
        match best {
            Some((_, n)) if count <= n => {}
            _ => best = Some((&m.level, count)),
        }
    }
    best.map(|(level, _)| level.to_string())
        .unwrap_or_else(|| llm_level(NEUTRAL_LLM_SCORE).to_string())
}

fn build_prompt(
    info: &StockInfo,
    news: &[ContentItem],
    forum: &[ContentItem],
    lexical: &CorpusSentiment,
) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&format!(
        "请分析股票 {}（{}，{}行业）的市场情绪。\n\n",
        info.name, info.symbol, info.industry
    ));

    prompt.push_str("最新新闻：\n");
    if news.is_empty() {
        prompt.push_str("（无）\n");
    }
    for item in news.iter().take(MAX_SAMPLE_ITEMS) {
        prompt.push_str(&format!(
            "- [{}] {} {}\n",
            item.publish_time,
            item.title,
            snippet(&item.body)
        ));
    }

    prompt.push_str("\n股吧讨论：\n");
    if forum.is_empty() {
        prompt.push_str("（无）\n");
    }
    for item in forum.iter().take(MAX_SAMPLE_ITEMS) {
        prompt.push_str(&format!(
            "- {} {}（阅读{} 回复{}）\n",
            item.title,
            snippet(&item.body),
            item.engagement.read_count,
            item.engagement.reply_count
        ));
    }

    prompt.push_str(&format!(
        "\n统计：新闻{}条，讨论{}条，词典情绪得分 {:.2}（范围 -10 到 10）。\n",
        lexical.news_count, lexical.forum_count, lexical.overall_score
    ));
    prompt.push_str(
        "请综合以上信息给出情绪评分（0-10，5为中性）和简要分析，\
         优先以 JSON 返回：{\"sentiment_analysis\": 评分, \"analysis\": \"分析\"}。",
    );
    prompt
}

/// First 100 chars of the body, to keep the prompt bounded.
fn snippet(body: &str) -> String {
    body.chars().take(100).collect()
}

static RE_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:分|/\s*10|\s*points?|\s*score)").unwrap()
});

/// Extract (score, analysis text) from a model answer. Accepts a JSON object
/// (possibly wrapped in prose) or free text with a "N分"-style score; any
/// other shape scores neutral with the raw answer as the analysis.
pub(crate) fn parse_answer(answer: &str) -> (f64, String) {
    if let Some(obj) = extract_json_object(answer) {
        let score = obj
            .get("sentiment_analysis")
            .or_else(|| obj.get("score"))
            .and_then(value_as_f64);
        if let Some(score) = score {
            let analysis = obj
                .get("analysis")
                .and_then(Value::as_str)
                .unwrap_or(answer)
                .to_string();
            return (score.clamp(0.0, 10.0), analysis);
        }
    }

    let score = RE_SCORE
        .captures_iter(answer)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|s| s.clamp(0.0, 10.0))
        .unwrap_or(NEUTRAL_LLM_SCORE);
    (score, answer.trim().to_string())
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Find the outermost `{...}` span and try to parse it. Models often wrap
/// JSON in prose or code fences.
fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentAnalyzer;
    use crate::stocks::stock_info;

    struct CannedClient {
        name: &'static str,
        answer: &'static str,
    }

    #[async_trait]
    impl ChatClient for CannedClient {
        fn model_name(&self) -> &str {
            self.name
        }
        async fn chat(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.answer.to_string())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl ChatClient for FailingClient {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn chat(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn lexical() -> CorpusSentiment {
        SentimentAnalyzer::new().analyze_stock_sentiment::<&str>(&[], &[], 0.6, 0.4)
    }

    #[test]
    fn json_answer_is_parsed() {
        let (score, analysis) =
            parse_answer(r#"{"sentiment_analysis": 7.5, "analysis": "偏多"}"#);
        assert_eq!(score, 7.5);
        assert_eq!(analysis, "偏多");
    }

    #[test]
    fn json_wrapped_in_prose_is_parsed() {
        let (score, _) = parse_answer("好的，结果如下：{\"score\": \"8\"} 供参考。");
        assert_eq!(score, 8.0);
    }

    #[test]
    fn free_text_score_is_extracted() {
        let (score, _) = parse_answer("综合判断市场情绪偏乐观，评分为7分");
        assert_eq!(score, 7.0);
    }

    #[test]
    fn unparseable_answer_is_neutral() {
        let (score, analysis) = parse_answer("看不懂行情");
        assert_eq!(score, NEUTRAL_LLM_SCORE);
        assert_eq!(analysis, "看不懂行情");
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let (score, _) = parse_answer(r#"{"sentiment_analysis": 42}"#);
        assert_eq!(score, 10.0);
    }

    #[test]
    fn level_buckets_are_monotonic() {
        assert_eq!(llm_level(9.0), "非常积极");
        assert_eq!(llm_level(6.5), "积极");
        assert_eq!(llm_level(5.0), "中性");
        assert_eq!(llm_level(3.0), "消极");
        assert_eq!(llm_level(0.5), "非常消极");
    }

    #[tokio::test]
    async fn consensus_averages_models_and_skips_failures() {
        let enhancer = LlmEnhancer::new(vec![
            Box::new(CannedClient {
                name: "model-a",
                answer: r#"{"sentiment_analysis": 8, "analysis": "强烈看多"}"#,
            }),
            Box::new(CannedClient {
                name: "model-b",
                answer: "情绪一般，评分为6分",
            }),
            Box::new(FailingClient),
        ]);
        let out = enhancer
            .assess(&stock_info("300663"), &[], &[], &lexical())
            .await
            .unwrap();
        assert_eq!(out.models.len(), 2);
        assert_eq!(out.score, 7.0);
        // Level tie (one 非常积极, one 积极): the first answer wins.
        assert_eq!(out.level, "非常积极");
        // stddev = 1.0 → consensus 0.8
        assert!((out.consensus - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn all_models_failing_surfaces_the_chat_error() {
        let enhancer = LlmEnhancer::new(vec![Box::new(FailingClient)]);
        let err = enhancer
            .assess(&stock_info("300663"), &[], &[], &lexical())
            .await
            .unwrap_err();
        assert!(matches!(err, EnhanceError::Chat(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn no_clients_is_an_error() {
        let enhancer = LlmEnhancer::new(vec![]);
        assert!(!enhancer.is_configured());
        let err = enhancer
            .assess(&stock_info("300663"), &[], &[], &lexical())
            .await
            .unwrap_err();
        assert!(matches!(err, EnhanceError::NoUsableAnswer));
    }
}
