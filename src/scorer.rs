use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::retry::RetryPolicy;
use crate::types::{Article, Category, DigestError, FinancialFields, Result, ScoredArticle};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "\
You are a senior technology and finance analyst. Assess the news article the \
user provides and respond with strict JSON only, using this shape:
{
  \"score\": <integer 1-10>,
  \"category\": \"RESEARCH\" | \"PRODUCT\" | \"INDUSTRY\" | \"MARKET\" | \"POLICY\" | \"OPINION\",
  \"summary\": \"<concise summary of the core facts, key numbers and actors>\",
  \"related_companies\": \"<listed companies affected, with tickers>\",
  \"market_impact\": \"<expected short- and mid-term market reaction>\",
  \"investment_insight\": \"<opportunities, risks and what to watch>\"
}
Score 1-3 for routine items, 4-6 for notable developments, 7-10 for breaking \
or market-moving news. Omit nothing; use empty strings for fields that do not \
apply.";

/// One validated LLM assessment. Scores outside 1..=10 never get this far.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub score: u8,
    pub category: Category,
    pub summary: String,
    pub financial: Option<FinancialFields>,
}

/// The completion service seam. Production uses `OpenAiScorer`; tests inject
/// scripted implementations.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, article: &Article) -> Result<Assessment>;
}

/// Wire shape the model is instructed to return. Decoded strictly: a missing
/// required field is a malformed response, never a partially filled result.
#[derive(Debug, Deserialize)]
struct WireAssessment {
    score: i64,
    category: Category,
    summary: String,
    #[serde(default)]
    related_companies: Option<String>,
    #[serde(default)]
    market_impact: Option<String>,
    #[serde(default)]
    investment_insight: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Scorer backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiScorer {
    client: Client,
    api_key: String,
    config: LlmConfig,
    /// Request the financial analysis fields in the prompt.
    financial: bool,
}

impl OpenAiScorer {
    pub fn new(config: &LlmConfig, api_key: String, financial: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
            financial,
        })
    }

    fn user_prompt(&self, article: &Article) -> String {
        let focus = if self.financial {
            "Focus on listed companies affected by this story and fill the \
             financial fields with concrete tickers and reasoning."
        } else {
            "This is general technology news; the financial fields may be \
             empty strings."
        };
        format!(
            "News type: {}\n{}\n\nSource: {}\nTitle: {}\nLink: {}\n\nSnippet:\n{}",
            article.news_type, focus, article.source, article.title, article.url, article.snippet
        )
    }

    fn decode(&self, body: &str, article: &Article) -> Result<Assessment> {
        let wire: WireAssessment = serde_json::from_str(body)
            .map_err(|e| DigestError::Malformed(format!("bad assessment JSON: {}", e)))?;

        if !(1..=10).contains(&wire.score) {
            return Err(DigestError::Malformed(format!(
                "score {} outside 1..=10",
                wire.score
            )));
        }

        let financial = match (
            wire.related_companies,
            wire.market_impact,
            wire.investment_insight,
        ) {
            (None, None, None) => None,
            (companies, impact, insight) => Some(FinancialFields {
                related_companies: companies.unwrap_or_default(),
                market_impact: impact.unwrap_or_default(),
                investment_insight: insight.unwrap_or_default(),
            }),
        };
        if self.financial && financial.is_none() {
            warn!(
                "assessment for '{}' is missing financial fields",
                article.title
            );
        }

        Ok(Assessment {
            score: wire.score as u8,
            category: wire.category,
            summary: wire.summary,
            financial,
        })
    }
}

#[async_trait]
impl Scorer for OpenAiScorer {
    async fn score(&self, article: &Article) -> Result<Assessment> {
        let user_content = self.user_prompt(article);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DigestError::Timeout
                } else {
                    DigestError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            DigestError::Malformed(format!("bad completion envelope: {}", e))
        })?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| DigestError::Malformed("empty choices".into()))?;

        let assessment = self.decode(content, article)?;
        debug!(
            "scored '{}' -> {} ({})",
            article.title,
            assessment.score,
            assessment.category.as_str()
        );
        Ok(assessment)
    }
}

/// 429 and server errors are worth retrying; any other client error (bad
/// credential, bad payload) will fail the same way every time.
fn status_error(status: reqwest::StatusCode) -> DigestError {
    if status.as_u16() == 429 {
        DigestError::RateLimited
    } else if status.is_client_error() {
        DigestError::LlmRejected(format!("HTTP {}", status))
    } else {
        DigestError::Llm(format!("HTTP {}", status))
    }
}

/// Score a batch with bounded parallelism. Articles whose retries are
/// exhausted are dropped from the run with a warning. Scoring still in
/// flight at `deadline` is abandoned; completed results are kept. The output
/// is re-sorted to fetch order so downstream ordering is deterministic.
pub async fn score_all(
    scorer: &dyn Scorer,
    policy: &RetryPolicy,
    articles: Vec<Article>,
    concurrency: usize,
    deadline: Instant,
) -> Vec<ScoredArticle> {
    let total = articles.len();
    let mut in_flight = stream::iter(articles.into_iter().map(|article| async move {
        let outcome = policy
            .run("scoring", || scorer.score(&article))
            .await;
        (article, outcome)
    }))
    .buffer_unordered(concurrency.max(1));

    let mut scored = Vec::with_capacity(total);
    loop {
        match timeout_at(deadline, in_flight.next()).await {
            Ok(Some((article, Ok(assessment)))) => {
                scored.push(ScoredArticle {
                    article,
                    score: assessment.score,
                    category: assessment.category,
                    summary: assessment.summary,
                    financial: assessment.financial,
                });
            }
            Ok(Some((article, Err(e)))) => {
                warn!("dropping '{}' after scoring failure: {}", article.title, e);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "run deadline reached with {}/{} articles scored, abandoning the rest",
                    scored.len(),
                    total
                );
                break;
            }
        }
    }

    scored.sort_by_key(|s| s.article.fetch_order);
    scored
}
