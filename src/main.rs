use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use news_digest::sinks::slack::send_error_notification;
use news_digest::{
    Config, DigestPipeline, FeedFetcher, FeedSource, OpenAiScorer, Scorer, Secrets, SheetsSink,
    Sink, SlackSink,
};

/// Fetch news from RSS feeds, score them with an LLM, and deliver a curated
/// digest to Slack and an archive spreadsheet.
#[derive(Debug, Parser)]
#[command(name = "news-digest", version)]
struct Cli {
    /// News type to run (a key under [news_types] in the config file).
    #[arg(long)]
    news_type: String,

    /// Render payloads without dispatching to any sink.
    #[arg(long)]
    dry_run: bool,

    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let secrets = Secrets::from_env();

    match run(&cli, &secrets).await {
        Ok(code) => code,
        Err(e) => {
            error!("run failed: {}", e);
            if let Some(webhook) = &secrets.slack_webhook_url {
                send_error_notification(webhook, &e.to_string()).await;
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, secrets: &Secrets) -> anyhow::Result<ExitCode> {
    let config = Config::load(&cli.config)?;
    secrets.validate(cli.dry_run, config.sheets.enabled)?;
    let nt = config.news_type(&cli.news_type)?;

    let api_key = secrets
        .openai_api_key
        .clone()
        .unwrap_or_default();
    let scorer: Arc<dyn Scorer> =
        Arc::new(OpenAiScorer::new(&config.llm, api_key, nt.financial)?);

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if !cli.dry_run {
        if let Some(webhook) = &secrets.slack_webhook_url {
            sinks.push(Box::new(SlackSink::new(webhook.clone())?));
        }
        if config.sheets.enabled {
            if let Some(token) = &secrets.sheets_access_token {
                sinks.push(Box::new(SheetsSink::new(
                    config.sheets.spreadsheet_id.clone(),
                    token.clone(),
                )?));
            }
        }
    }

    let source: Arc<dyn FeedSource> = Arc::new(FeedFetcher::new(
        config.digest.articles_per_feed,
        config.llm.concurrency,
    )?);
    let pipeline = DigestPipeline::new(config, source, scorer, sinks);
    let report = pipeline.run(&cli.news_type, cli.dry_run).await?;

    match report.status {
        news_digest::RunStatus::Degraded => {
            error!("all sinks failed");
            Ok(ExitCode::FAILURE)
        }
        status => {
            info!("run finished with status {:?}", status);
            Ok(ExitCode::SUCCESS)
        }
    }
}
