use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized feed entry. Immutable after creation; identity is `id`,
/// a stable hash of the canonical URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published: Option<DateTime<Utc>>,
    /// Cleaned body/summary snippet from the feed, capped in length.
    pub snippet: String,
    pub news_type: String,
    /// Position in the deterministic merged fetch order. Used as the
    /// tie-breaker when two articles score the same.
    pub fetch_order: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Research,
    Product,
    Industry,
    Market,
    Policy,
    Opinion,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Research => "RESEARCH",
            Category::Product => "PRODUCT",
            Category::Industry => "INDUSTRY",
            Category::Market => "MARKET",
            Category::Policy => "POLICY",
            Category::Opinion => "OPINION",
        }
    }
}

/// Financial analysis fields, produced only for news-types that request them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialFields {
    pub related_companies: String,
    pub market_impact: String,
    pub investment_insight: String,
}

/// The result of one LLM assessment of one article. Append-only: a failed
/// scoring attempt produces no `ScoredArticle` at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredArticle {
    pub article: Article,
    /// Importance score, always within 1..=10.
    pub score: u8,
    pub category: Category,
    pub summary: String,
    pub financial: Option<FinancialFields>,
}

/// The ordered set of articles chosen for delivery in one run.
/// Invariants: sorted by score descending (ties keep fetch order), length
/// bounded by `max_articles`, every score at or above the threshold.
#[derive(Debug, Clone, Default)]
pub struct DigestSelection {
    pub articles: Vec<ScoredArticle>,
}

impl DigestSelection {
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Per-run context. Lives for one pipeline execution, never persisted.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub news_type: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
}

impl RunContext {
    pub fn new(news_type: &str, dry_run: bool) -> Self {
        Self {
            news_type: news_type.to_string(),
            started_at: Utc::now(),
            dry_run,
        }
    }
}

/// Counters reported in the end-of-run summary line.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub fetched: usize,
    pub filtered: usize,
    pub deduped: usize,
    pub scored: usize,
    pub selected: usize,
    pub delivered_sinks: Vec<String>,
    pub failed_sinks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every configured sink delivered (or the run was a dry run).
    Success,
    /// At least one sink delivered, at least one failed.
    Partial,
    /// All sinks failed.
    Degraded,
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("config error: {0}")]
    Config(String),

    #[error("feed fetch failed for {feed}: {reason}")]
    Fetch { feed: String, reason: String },

    #[error("LLM request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("malformed LLM response: {0}")]
    Malformed(String),

    #[error("LLM service error: {0}")]
    Llm(String),

    #[error("LLM request rejected: {0}")]
    LlmRejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("delivery to {sink} failed: {reason}")]
    Delivery { sink: String, reason: String },
}

impl DigestError {
    /// Whether a retry could plausibly succeed. Config, URL and rejected
    /// requests (bad credentials, bad payload) are permanent; everything
    /// else touching the network or the model is not.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            DigestError::Config(_)
                | DigestError::InvalidUrl(_)
                | DigestError::Json(_)
                | DigestError::LlmRejected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;
