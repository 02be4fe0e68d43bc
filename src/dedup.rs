use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::types::Article;

/// Titles at or above this normalized Levenshtein similarity are treated as
/// the same story. Secondary heuristic only; canonical URLs are authoritative.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.92;

/// Normalize a URL to its dedup key: scheme + lowercased host + path, query
/// and fragment stripped, trailing slash trimmed. Unparseable URLs fall back
/// to the trimmed input so they still dedup against exact repeats.
pub fn canonical_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("").to_ascii_lowercase();
            let path = url.path().trim_end_matches('/');
            format!("{}://{}{}", url.scheme(), host, path)
        }
        Err(_) => raw.trim().trim_end_matches('/').to_string(),
    }
}

/// Stable article id: hex prefix of the SHA-256 of the canonical URL.
pub fn article_id(url: &str) -> String {
    let digest = Sha256::digest(canonical_url(url).as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse duplicates in a merged article set, keeping the first occurrence
/// in order. Primary key is the canonical URL (hash lookup); near-identical
/// normalized titles are a best-effort fallback for syndicated reposts.
pub fn dedup(articles: Vec<Article>) -> Vec<Article> {
    let total = articles.len();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut kept_titles: Vec<String> = Vec::new();
    let mut kept = Vec::with_capacity(total);

    for article in articles {
        let key = canonical_url(&article.url);
        if !seen_urls.insert(key.clone()) {
            debug!("dropping duplicate URL: {}", article.url);
            continue;
        }

        let title = normalize_title(&article.title);
        let near_duplicate = seen_titles.contains(&title)
            || kept_titles.iter().any(|kept| {
                strsim::normalized_levenshtein(kept, &title) >= TITLE_SIMILARITY_THRESHOLD
            });
        if !title.is_empty() && near_duplicate {
            debug!("dropping near-duplicate title: {}", article.title);
            continue;
        }

        seen_titles.insert(title.clone());
        kept_titles.push(title);
        kept.push(article);
    }

    if kept.len() < total {
        info!("dedup removed {} of {} articles", total - kept.len(), total);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, url: &str) -> Article {
        Article {
            id: article_id(url),
            title: title.to_string(),
            url: url.to_string(),
            source: "test".to_string(),
            published: None,
            snippet: String::new(),
            news_type: "ai".to_string(),
            fetch_order: 0,
        }
    }

    #[test]
    fn canonical_url_strips_query_and_trailing_slash() {
        assert_eq!(
            canonical_url("https://Example.com/a/b/?utm_source=rss#frag"),
            "https://example.com/a/b"
        );
        assert_eq!(
            canonical_url("https://example.com/a/b"),
            canonical_url("https://example.com/a/b?ref=feed")
        );
    }

    #[test]
    fn article_id_is_stable_across_tracking_params() {
        assert_eq!(
            article_id("https://example.com/story?utm_medium=rss"),
            article_id("https://example.com/story")
        );
        assert_ne!(
            article_id("https://example.com/story"),
            article_id("https://example.com/other")
        );
    }

    #[test]
    fn identical_canonical_urls_keep_exactly_one() {
        let kept = dedup(vec![
            article("First report", "https://example.com/story?utm_source=a"),
            article("Second copy", "https://example.com/story?utm_source=b"),
            article("Other story", "https://example.com/other"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "First report");
        assert_eq!(kept[1].title, "Other story");
    }

    #[test]
    fn near_identical_titles_are_collapsed() {
        let kept = dedup(vec![
            article(
                "OpenAI announces new flagship model",
                "https://a.example/openai",
            ),
            article(
                "OpenAI announces new flagship model!",
                "https://b.example/openai-mirror",
            ),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://a.example/openai");
    }

    #[test]
    fn distinct_stories_survive() {
        let kept = dedup(vec![
            article("Nvidia earnings beat expectations", "https://a.example/1"),
            article("EU passes new AI regulation", "https://a.example/2"),
        ]);
        assert_eq!(kept.len(), 2);
    }
}
