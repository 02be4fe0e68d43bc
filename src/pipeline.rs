use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::compose::compose;
use crate::config::Config;
use crate::dedup::dedup;
use crate::fetcher::FeedSource;
use crate::filter::filter_articles;
use crate::retry::RetryPolicy;
use crate::scorer::{score_all, Scorer};
use crate::selector::select;
use crate::sinks::{dispatch, Sink};
use crate::types::{Result, RunContext, RunStats, RunStatus};

const DELIVERY_BASE_DELAY: Duration = Duration::from_secs(2);
const DELIVERY_ATTEMPTS: u32 = 3;
const SCORING_BASE_DELAY: Duration = Duration::from_secs(1);

/// Outcome of one run: stage counters plus the overall delivery status.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    pub status: RunStatus,
}

/// The digest pipeline: fetch -> filter -> dedup -> score -> select ->
/// compose -> dispatch. The scorer and sinks are injected so tests can run
/// the whole pipeline without any network.
pub struct DigestPipeline {
    config: Config,
    source: Arc<dyn FeedSource>,
    scorer: Arc<dyn Scorer>,
    sinks: Vec<Box<dyn Sink>>,
}

impl DigestPipeline {
    pub fn new(
        config: Config,
        source: Arc<dyn FeedSource>,
        scorer: Arc<dyn Scorer>,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Self {
        Self {
            config,
            source,
            scorer,
            sinks,
        }
    }

    pub async fn run(&self, news_type: &str, dry_run: bool) -> Result<RunReport> {
        let ctx = RunContext::new(news_type, dry_run);
        let deadline = Instant::now() + Duration::from_secs(self.config.run.timeout_secs);
        let nt = self.config.news_type(news_type)?;
        let mut stats = RunStats::default();

        info!(
            "starting digest run: news_type={} dry_run={} feeds={}",
            news_type,
            dry_run,
            nt.feeds.iter().filter(|f| f.enabled).count()
        );

        let articles = self.source.collect(news_type, &nt.feeds).await;
        stats.fetched = articles.len();
        if articles.is_empty() {
            warn!("no articles fetched, ending run");
            self.log_summary(&stats);
            return Ok(RunReport {
                stats,
                status: RunStatus::Success,
            });
        }

        let filtered = filter_articles(&nt.keywords, articles);
        stats.filtered = filtered.len();
        let deduped = dedup(filtered);
        stats.deduped = deduped.len();
        if deduped.is_empty() {
            warn!("no articles survived filtering, ending run");
            self.log_summary(&stats);
            return Ok(RunReport {
                stats,
                status: RunStatus::Success,
            });
        }

        let scoring_policy = RetryPolicy::new(self.config.llm.max_retries, SCORING_BASE_DELAY);
        let scored = score_all(
            self.scorer.as_ref(),
            &scoring_policy,
            deduped,
            self.config.llm.concurrency,
            deadline,
        )
        .await;
        stats.scored = scored.len();

        let selection = select(
            scored,
            self.config.digest.score_threshold,
            self.config.digest.max_articles,
        );
        stats.selected = selection.len();

        if selection.is_empty() && !self.config.digest.notify_empty {
            info!("empty selection and notify_empty is off, skipping delivery");
            self.log_summary(&stats);
            return Ok(RunReport {
                stats,
                status: RunStatus::Success,
            });
        }

        let payload = compose(&selection, &ctx, &self.config.slack);
        let delivery_policy = RetryPolicy::new(DELIVERY_ATTEMPTS, DELIVERY_BASE_DELAY);
        let report = dispatch(&self.sinks, &payload, &ctx, &delivery_policy).await;
        stats.delivered_sinks = report.delivered.clone();
        stats.failed_sinks = report.failed.clone();

        self.log_summary(&stats);
        Ok(RunReport {
            stats,
            status: report.status(),
        })
    }

    fn log_summary(&self, stats: &RunStats) {
        info!(
            "run summary: fetched={} filtered={} deduped={} scored={} selected={} delivered=[{}] failed=[{}]",
            stats.fetched,
            stats.filtered,
            stats.deduped,
            stats.scored,
            stats.selected,
            stats.delivered_sinks.join(","),
            stats.failed_sinks.join(",")
        );
    }
}
