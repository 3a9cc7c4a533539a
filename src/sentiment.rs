//! Lexicon-based Chinese sentiment scoring.
//!
//! Tokenization is forward maximum matching against the combined vocabulary
//! (lexicon entries, intensifiers, negation markers); characters outside the
//! vocabulary become single-char tokens. Scoring: an intensifier immediately
//! before a lexicon word multiplies its weight, a negation marker immediately
//! before it flips the sign. Positive and negative magnitudes accumulate
//! separately; `raw_score = positive_total - negative_total`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static POSITIVE: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    serde_json::from_str::<HashMap<String, f64>>(include_str!("../lexicon/positive.json"))
        .expect("valid positive lexicon")
});

static NEGATIVE: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    serde_json::from_str::<HashMap<String, f64>>(include_str!("../lexicon/negative.json"))
        .expect("valid negative lexicon")
});

static INTENSIFIERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("非常", 1.5),
        ("极其", 2.0),
        ("特别", 1.3),
        ("相当", 1.2),
        ("很", 1.2),
        ("太", 1.3),
        ("超级", 1.8),
        ("十分", 1.4),
    ])
});

const NEGATIONS: &[char] = &['不', '没', '无', '非', '莫', '勿', '别', '未', '否', '休'];

/// Longest vocabulary entry, in chars; bounds the maximum-match window.
static MAX_WORD_CHARS: Lazy<usize> = Lazy::new(|| {
    POSITIVE
        .keys()
        .chain(NEGATIVE.keys())
        .map(|k| k.chars().count())
        .chain(INTENSIFIERS.keys().map(|k| k.chars().count()))
        .max()
        .unwrap_or(1)
});

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());

/// 3-level polarity of a single text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

/// 5-level bucketing of corpus-level scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLevel {
    VeryNegative,
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl SentimentLevel {
    /// Monotonic bucketing with fixed thresholds.
    pub fn from_score(score: f64) -> Self {
        if score >= 3.0 {
            Self::VeryPositive
        } else if score >= 1.0 {
            Self::Positive
        } else if score >= -1.0 {
            Self::Neutral
        } else if score >= -3.0 {
            Self::Negative
        } else {
            Self::VeryNegative
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::VeryPositive => "极度乐观",
            Self::Positive => "乐观",
            Self::Neutral => "中性",
            Self::Negative => "悲观",
            Self::VeryNegative => "极度悲观",
        }
    }
}

/// Score of a single text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextScore {
    pub raw_score: f64,
    pub positive_total: f64,
    pub negative_total: f64,
    pub polarity: Polarity,
    /// In [0,1]; combines text length and signal magnitude.
    pub confidence: f64,
    /// Lexicon words that matched the winning polarity, at most 5.
    pub keywords: Vec<String>,
}

impl TextScore {
    fn neutral() -> Self {
        Self {
            raw_score: 0.0,
            positive_total: 0.0,
            negative_total: 0.0,
            polarity: Polarity::Neutral,
            confidence: 0.0,
            keywords: Vec::new(),
        }
    }
}

/// Corpus-level result over news and forum subsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSentiment {
    /// Weighted blend of the news and forum sub-scores, in [-10,10].
    pub overall_score: f64,
    pub sentiment_level: SentimentLevel,
    pub news_sentiment: f64,
    pub forum_sentiment: f64,
    pub news_count: usize,
    pub forum_count: usize,
    /// Sample-size confidence: `min(1, (news+forum)/20)`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Score one text. Empty or whitespace-only input is neutral with zero
    /// confidence.
    pub fn score(&self, text: &str) -> TextScore {
        if text.trim().is_empty() {
            return TextScore::neutral();
        }
        let raw_len = text.chars().count();
        let processed = preprocess(text);
        let tokens = tokenize(&processed);

        let mut positive_total = 0.0f64;
        let mut negative_total = 0.0f64;
        let mut pos_words: Vec<String> = Vec::new();
        let mut neg_words: Vec<String> = Vec::new();

        for i in 0..tokens.len() {
            let word = tokens[i].as_str();
            let base = match (POSITIVE.get(word), NEGATIVE.get(word)) {
                (Some(&w), _) => w,
                (_, Some(&w)) => w,
                _ => continue,
            };

            let mut weight = base;
            if i > 0 {
                let prev = tokens[i - 1].as_str();
                if let Some(&mult) = INTENSIFIERS.get(prev) {
                    weight *= mult;
                }
                if is_negation(prev) {
                    weight = -weight;
                }
            }

            if weight > 0.0 {
                positive_total += weight;
                pos_words.push(word.to_string());
            } else if weight < 0.0 {
                negative_total += -weight;
                neg_words.push(word.to_string());
            }
        }

        let raw_score = positive_total - negative_total;
        let polarity = if raw_score > 0.5 {
            Polarity::Positive
        } else if raw_score < -0.5 {
            Polarity::Negative
        } else {
            Polarity::Neutral
        };

        let mut keywords = match polarity {
            Polarity::Positive => pos_words,
            Polarity::Negative => neg_words,
            Polarity::Neutral => Vec::new(),
        };
        keywords.dedup();
        keywords.truncate(5);

        TextScore {
            raw_score,
            positive_total,
            negative_total,
            polarity,
            confidence: confidence(raw_len, positive_total + negative_total),
            keywords,
        }
    }

    /// Aggregate score over a corpus: each text weighted by its own
    /// confidence, clamped to [-10,10]. Zero when nothing carries signal.
    pub fn score_corpus<S: AsRef<str>>(&self, texts: &[S]) -> f64 {
        let mut weighted = 0.0f64;
        let mut total_weight = 0.0f64;
        for text in texts {
            let text = text.as_ref();
            if text.trim().is_empty() {
                continue;
            }
            let s = self.score(text);
            weighted += s.raw_score * s.confidence;
            total_weight += s.confidence;
        }
        if total_weight == 0.0 {
            return 0.0;
        }
        (weighted / total_weight).clamp(-10.0, 10.0)
    }

    /// Blend news and forum sub-scores into the overall stock sentiment.
    pub fn analyze_stock_sentiment<S: AsRef<str>>(
        &self,
        news_texts: &[S],
        forum_texts: &[S],
        news_weight: f64,
        forum_weight: f64,
    ) -> CorpusSentiment {
        let news_sentiment = self.score_corpus(news_texts);
        let forum_sentiment = self.score_corpus(forum_texts);
        let overall = news_sentiment * news_weight + forum_sentiment * forum_weight;
        CorpusSentiment {
            overall_score: overall,
            sentiment_level: SentimentLevel::from_score(overall),
            news_sentiment,
            forum_sentiment,
            news_count: news_texts.len(),
            forum_count: forum_texts.len(),
            confidence: (((news_texts.len() + forum_texts.len()) as f64) / 20.0).min(1.0),
        }
    }
}

/// `0.3 * min(len/100, 1) + 0.7 * min(magnitude/10, 1)`, clamped to [0,1].
fn confidence(text_chars: usize, magnitude: f64) -> f64 {
    if text_chars == 0 {
        return 0.0;
    }
    let length_factor = (text_chars as f64 / 100.0).min(1.0);
    let intensity_factor = (magnitude / 10.0).min(1.0);
    (length_factor * 0.3 + intensity_factor * 0.7).clamp(0.0, 1.0)
}

/// Strip markup, keep CJK + alphanumerics, lowercase.
fn preprocess(text: &str) -> String {
    let decoded = html_escape::decode_html_entities(text);
    let stripped = RE_TAGS.replace_all(&decoded, "");
    stripped
        .chars()
        .filter(|c| is_cjk(*c) || c.is_ascii_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

fn is_negation(token: &str) -> bool {
    let mut chars = token.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if NEGATIONS.contains(&c))
}

/// Forward maximum match against the combined vocabulary.
fn tokenize(processed: &str) -> Vec<String> {
    let chars: Vec<char> = processed.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let mut matched = None;
        let upper = (*MAX_WORD_CHARS).min(chars.len() - i);
        for len in (2..=upper).rev() {
            let candidate: String = chars[i..i + len].iter().collect();
            if POSITIVE.contains_key(&candidate)
                || NEGATIVE.contains_key(&candidate)
                || INTENSIFIERS.contains_key(candidate.as_str())
            {
                matched = Some((candidate, len));
                break;
            }
        }
        match matched {
            Some((word, len)) => {
                tokens.push(word);
                i += len;
            }
            None => {
                tokens.push(chars[i].to_string());
                i += 1;
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> SentimentAnalyzer {
        SentimentAnalyzer::new()
    }

    #[test]
    fn empty_text_is_neutral_with_zero_confidence() {
        let s = analyzer().score("   ");
        assert_eq!(s.polarity, Polarity::Neutral);
        assert_eq!(s.raw_score, 0.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn positive_word_scores_positive() {
        let s = analyzer().score("大家都看好这只股票");
        assert!(s.raw_score > 0.0);
        assert_eq!(s.polarity, Polarity::Positive);
        assert!(s.keywords.contains(&"看好".to_string()));
    }

    #[test]
    fn negation_flips_the_sign() {
        let plain = analyzer().score("看好");
        let negated = analyzer().score("不看好");
        assert!(plain.raw_score > 0.0);
        assert!(negated.raw_score <= 0.0);
        assert!(negated.raw_score < plain.raw_score);
    }

    #[test]
    fn intensifier_scales_magnitude_same_sign() {
        let plain = analyzer().score("看好");
        let intense = analyzer().score("非常看好");
        assert!(intense.raw_score >= plain.raw_score);
        assert!(intense.raw_score.abs() >= plain.raw_score.abs());
        assert_eq!(intense.polarity, Polarity::Positive);
    }

    #[test]
    fn mixed_text_accumulates_both_totals() {
        let s = analyzer().score("业绩上涨但是风险仍在");
        assert!(s.positive_total > 0.0);
        assert!(s.negative_total > 0.0);
    }

    #[test]
    fn confidence_is_bounded() {
        let long = "上涨".repeat(200);
        for text in ["", "涨停", "暴涨暴跌恐慌崩盘利好利空", long.as_str()] {
            let c = analyzer().score(text).confidence;
            assert!((0.0..=1.0).contains(&c), "confidence {c} out of range");
        }
    }

    #[test]
    fn html_markup_is_ignored() {
        let plain = analyzer().score("利好消息");
        let tagged = analyzer().score("<b>利好</b>消息");
        assert_eq!(plain.raw_score, tagged.raw_score);
    }

    #[test]
    fn corpus_score_is_clamped_and_weighted() {
        let texts = vec!["涨停 暴涨 创新高 强势 利好".to_string(); 10];
        let score = analyzer().score_corpus(&texts);
        assert!(score <= 10.0 && score > 0.0);

        let empty: Vec<String> = vec!["".into(), "   ".into()];
        assert_eq!(analyzer().score_corpus(&empty), 0.0);
    }

    #[test]
    fn five_level_bucketing_thresholds() {
        assert_eq!(SentimentLevel::from_score(3.0), SentimentLevel::VeryPositive);
        assert_eq!(SentimentLevel::from_score(2.0), SentimentLevel::Positive);
        assert_eq!(SentimentLevel::from_score(0.0), SentimentLevel::Neutral);
        assert_eq!(SentimentLevel::from_score(-2.0), SentimentLevel::Negative);
        assert_eq!(SentimentLevel::from_score(-3.5), SentimentLevel::VeryNegative);
    }

    #[test]
    fn stock_blend_uses_configured_weights() {
        let a = analyzer();
        let news = vec!["涨停 利好 买入 推荐 业绩 增长".to_string()];
        let forum = vec!["跌停 亏损 风险 恐慌".to_string()];
        let out = a.analyze_stock_sentiment(&news, &forum, 0.6, 0.4);
        let expect = out.news_sentiment * 0.6 + out.forum_sentiment * 0.4;
        assert!((out.overall_score - expect).abs() < 1e-9);
        assert_eq!(out.news_count, 1);
        assert_eq!(out.forum_count, 1);
        assert!((out.confidence - 0.1).abs() < 1e-9);
    }
}
