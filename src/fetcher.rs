use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::dedup::article_id;
use crate::types::{Article, DigestError, Result};

const USER_AGENT: &str = "news-digest/0.1";
const FEED_TIMEOUT_SECS: u64 = 15;
/// Snippet cap keeps LLM prompts bounded.
const SNIPPET_MAX_CHARS: usize = 800;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// The inbound feed seam: given a news-type's feed configs, produce the
/// merged, fetch-ordered article set. Production uses `FeedFetcher`; tests
/// inject static sources.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn collect(&self, news_type: &str, feeds: &[FeedConfig]) -> Vec<Article>;
}

/// Fetches and normalizes RSS/Atom feeds into `Article`s. One feed's failure
/// is isolated to a warning and an empty contribution; it never aborts a run.
pub struct FeedFetcher {
    client: Client,
    articles_per_feed: usize,
    concurrency: usize,
}

impl FeedFetcher {
    pub fn new(articles_per_feed: usize, concurrency: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(FEED_TIMEOUT_SECS))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            articles_per_feed,
            concurrency: concurrency.max(1),
        })
    }

    /// Fetch every enabled feed with bounded concurrency and merge the
    /// results in feed-config order, so the merged set is deterministic
    /// regardless of completion order.
    pub async fn fetch_all(&self, news_type: &str, feeds: &[FeedConfig]) -> Vec<Article> {
        let enabled: Vec<(usize, &FeedConfig)> = feeds
            .iter()
            .filter(|f| f.enabled)
            .enumerate()
            .map(|(idx, f)| (idx, f))
            .collect();
        info!("fetching {} feeds for news_type '{}'", enabled.len(), news_type);

        let fetches: Vec<_> = enabled
            .into_iter()
            .map(|(idx, feed)| async move {
                match self.fetch_feed(news_type, feed).await {
                    Ok(articles) => {
                        info!("{}: fetched {} articles", feed.name, articles.len());
                        (idx, articles)
                    }
                    Err(e) => {
                        warn!("{}: fetch failed, skipping feed: {}", feed.name, e);
                        (idx, Vec::new())
                    }
                }
            })
            .collect();
        let mut per_feed: Vec<(usize, Vec<Article>)> = stream::iter(fetches)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        per_feed.sort_by_key(|(idx, _)| *idx);
        let mut merged: Vec<Article> = per_feed
            .into_iter()
            .flat_map(|(_, articles)| articles)
            .collect();
        for (order, article) in merged.iter_mut().enumerate() {
            article.fetch_order = order;
        }

        info!("fetched {} articles in total", merged.len());
        merged
    }

    async fn fetch_feed(&self, news_type: &str, feed: &FeedConfig) -> Result<Vec<Article>> {
        let response = self.client.get(&feed.url).send().await.map_err(|e| {
            DigestError::Fetch {
                feed: feed.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::Fetch {
                feed: feed.name.clone(),
                reason: format!("HTTP {}", status),
            });
        }

        let body = response.bytes().await.map_err(|e| DigestError::Fetch {
            feed: feed.name.clone(),
            reason: e.to_string(),
        })?;
        let parsed = parser::parse(body.as_ref()).map_err(|e| DigestError::Fetch {
            feed: feed.name.clone(),
            reason: format!("feed parse error: {}", e),
        })?;

        let articles = parsed
            .entries
            .into_iter()
            .take(self.articles_per_feed)
            .filter_map(|entry| entry_to_article(entry, &feed.name, news_type))
            .collect();
        Ok(articles)
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn collect(&self, news_type: &str, feeds: &[FeedConfig]) -> Vec<Article> {
        self.fetch_all(news_type, feeds).await
    }
}

/// Entries with no usable title or link are skipped, not errors.
fn entry_to_article(
    entry: feed_rs::model::Entry,
    source: &str,
    news_type: &str,
) -> Option<Article> {
    let title = clean_html(&entry.title.map(|t| t.content)?);
    if title.is_empty() {
        return None;
    }
    let url = entry.links.first()?.href.clone();
    if url.is_empty() {
        return None;
    }

    // Prefer the summary, fall back to full content.
    let raw_snippet = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();
    let snippet = truncate_chars(&clean_html(&raw_snippet), SNIPPET_MAX_CHARS);

    let published = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc));

    Some(Article {
        id: article_id(&url),
        title,
        url,
        source: source.to_string(),
        published,
        snippet,
        news_type: news_type.to_string(),
        fetch_order: 0,
    })
}

/// Strip tags, decode entities, and collapse whitespace in feed-provided HTML.
pub fn clean_html(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, " ");
    let decoded = html_escape::decode_html_entities(stripped.as_ref()).into_owned();
    WS_RE.replace_all(decoded.trim(), " ").into_owned()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
