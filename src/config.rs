use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::types::{DigestError, Result};

/// Application configuration, loaded from a TOML file. Secrets are loaded
/// separately from the environment (`Secrets`), never from this file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub news_types: HashMap<String, NewsTypeConfig>,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub slack: SlackOptions,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsTypeConfig {
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub keywords: KeywordRules,
    /// Ask the scorer for related-company / market-impact / investment fields.
    #[serde(default)]
    pub financial: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordRules {
    /// Keep an article only if at least one matches (empty = keep all).
    #[serde(default)]
    pub allow: Vec<String>,
    /// Drop an article if any matches. Deny always wins over allow.
    #[serde(default)]
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub max_articles: usize,
    pub score_threshold: u8,
    pub articles_per_feed: usize,
    /// Send a "no results" notice when the selection is empty.
    pub notify_empty: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_articles: 10,
            score_threshold: 6,
            articles_per_feed: 15,
            notify_empty: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.3,
            max_retries: 3,
            concurrency: 4,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock budget for the whole run. Scoring still in flight at the
    /// deadline is abandoned; completed results are kept.
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlackOptions {
    pub title: String,
    pub show_source: bool,
    pub show_score: bool,
    pub show_category: bool,
}

impl Default for SlackOptions {
    fn default() -> Self {
        Self {
            title: "📰 News Digest".to_string(),
            show_source: true,
            show_score: true,
            show_category: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub enabled: bool,
    pub spreadsheet_id: String,
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DigestError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| DigestError::Config(format!("invalid config file: {}", e)))?;
        config.validate()?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.news_types.is_empty() {
            return Err(DigestError::Config("no news_types configured".into()));
        }
        for (name, nt) in &self.news_types {
            if nt.feeds.iter().filter(|f| f.enabled).count() == 0 {
                return Err(DigestError::Config(format!(
                    "news_type '{}' has no enabled feeds",
                    name
                )));
            }
        }
        if !(1..=10).contains(&self.digest.score_threshold) {
            return Err(DigestError::Config(format!(
                "score_threshold must be within 1..=10, got {}",
                self.digest.score_threshold
            )));
        }
        if self.sheets.enabled && self.sheets.spreadsheet_id.is_empty() {
            return Err(DigestError::Config(
                "sheets.enabled requires sheets.spreadsheet_id".into(),
            ));
        }
        Ok(())
    }

    pub fn news_type(&self, name: &str) -> Result<&NewsTypeConfig> {
        self.news_types.get(name).ok_or_else(|| {
            let mut known: Vec<&str> = self.news_types.keys().map(|k| k.as_str()).collect();
            known.sort_unstable();
            DigestError::Config(format!(
                "unknown news_type '{}' (known: {})",
                name,
                known.join(", ")
            ))
        })
    }
}

/// Credentials pulled from the environment. Opaque to the pipeline; each is
/// handed to exactly one component at construction time.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub slack_webhook_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub sheets_access_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            slack_webhook_url: non_empty_var("SLACK_WEBHOOK_URL"),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            sheets_access_token: non_empty_var("SHEETS_ACCESS_TOKEN"),
        }
    }

    /// Fatal at startup, before any fetch. Delivery credentials are only
    /// required for a live run; scoring happens in dry runs too.
    pub fn validate(&self, dry_run: bool, sheets_enabled: bool) -> Result<()> {
        if self.openai_api_key.is_none() {
            return Err(DigestError::Config("OPENAI_API_KEY is not set".into()));
        }
        if !dry_run {
            if self.slack_webhook_url.is_none() {
                return Err(DigestError::Config("SLACK_WEBHOOK_URL is not set".into()));
            }
            if sheets_enabled && self.sheets_access_token.is_none() {
                return Err(DigestError::Config("SHEETS_ACCESS_TOKEN is not set".into()));
            }
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let toml = r#"
            [news_types.ai]
            feeds = [{ name = "Hacker News", url = "https://hnrss.org/frontpage" }]
            keywords = { allow = ["AI"], deny = ["sponsored"] }
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        let nt = config.news_type("ai").unwrap();
        assert!(nt.feeds[0].enabled);
        assert!(!nt.financial);
        assert_eq!(config.digest.max_articles, 10);
        assert_eq!(config.digest.score_threshold, 6);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.run.timeout_secs, 300);
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let toml = r#"
            [news_types.market]
            feeds = [{ name = "WSJ", url = "https://example.com/rss" }]
            financial = true

            [digest]
            max_articles = 5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.digest.max_articles, 5);
        assert_eq!(config.digest.score_threshold, 6);
        assert!(config.news_type("market").unwrap().financial);
    }

    #[test]
    fn rejects_unknown_news_type() {
        let toml = r#"
            [news_types.ai]
            feeds = [{ name = "A", url = "https://a.example/rss" }]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.news_type("crypto"),
            Err(DigestError::Config(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let toml = r#"
            [news_types.ai]
            feeds = [{ name = "A", url = "https://a.example/rss" }]

            [digest]
            score_threshold = 11
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_news_type_without_enabled_feeds() {
        let toml = r#"
            [news_types.ai]
            feeds = [{ name = "A", url = "https://a.example/rss", enabled = false }]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
