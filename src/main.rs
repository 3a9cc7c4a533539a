//! CLI entrypoint: fetch, score and print the sentiment report for one or
//! more A-share symbols as pretty-printed JSON.
//!
//! Usage: `ashare-sentiment [--days N] SYMBOL [SYMBOL...]`

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ashare_sentiment::fetch::HttpFetcher;
use ashare_sentiment::orchestrator::SentimentOrchestrator;
use ashare_sentiment::sources::eastmoney::EastMoneyForumSource;
use ashare_sentiment::sources::sina::SinaNewsSource;
use ashare_sentiment::sources::NewsSource;
use ashare_sentiment::{PipelineConfig, SentimentAnalyzer, SentimentCache};

const DEFAULT_LOOKBACK_DAYS: u32 = 3;
const DEFAULT_CACHE_DIR: &str = ".sentiment-cache";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ashare_sentiment=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

struct CliArgs {
    symbols: Vec<String>,
    lookback_days: u32,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut symbols = Vec::new();
    let mut lookback_days = DEFAULT_LOOKBACK_DAYS;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--days" => {
                let value = args.next().ok_or("--days requires a number")?;
                lookback_days = value
                    .parse()
                    .map_err(|_| format!("invalid --days value: {value}"))?;
            }
            "--help" | "-h" => {
                return Err("usage: ashare-sentiment [--days N] SYMBOL [SYMBOL...]".to_string())
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown flag: {other}"));
            }
            symbol => symbols.push(symbol.to_string()),
        }
    }

    if symbols.is_empty() {
        return Err("usage: ashare-sentiment [--days N] SYMBOL [SYMBOL...]".to_string());
    }
    Ok(CliArgs {
        symbols,
        lookback_days,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env when present; a missing file is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let config = PipelineConfig::from_env();
    let fetcher = HttpFetcher::new(&config);
    let sources: Vec<Arc<dyn NewsSource>> = vec![
        Arc::new(SinaNewsSource::new(fetcher.clone())),
        Arc::new(EastMoneyForumSource::new(fetcher, config.max_forum_posts)),
    ];
    let cache = match SentimentCache::new(DEFAULT_CACHE_DIR, config.cache_ttl_secs) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!(error = %e, "cache unavailable, continuing without it");
            None
        }
    };

    let orchestrator = Arc::new(SentimentOrchestrator::new(
        config,
        sources,
        SentimentAnalyzer::new(),
        None,
        cache,
    ));

    let output = if args.symbols.len() == 1 {
        let report = orchestrator
            .get_sentiment(&args.symbols[0], args.lookback_days)
            .await;
        serde_json::to_string_pretty(&report)
    } else {
        let batch = orchestrator
            .get_aggregated(&args.symbols, args.lookback_days)
            .await;
        serde_json::to_string_pretty(&batch)
    };

    match output {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to serialize report: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_symbols_and_days() {
        let args = parse_args(
            ["--days", "7", "300663", "000001"]
                .iter()
                .map(|s| s.to_string()),
        )
        .unwrap();
        assert_eq!(args.lookback_days, 7);
        assert_eq!(args.symbols, vec!["300663", "000001"]);
    }

    #[test]
    fn missing_symbol_is_an_error() {
        assert!(parse_args(std::iter::empty()).is_err());
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(parse_args(["--frobnicate".to_string()].into_iter()).is_err());
    }
}
