use tracing::{debug, info};

use crate::config::KeywordRules;
use crate::types::Article;

/// Keyword pre-filter decision for one article. Pure and deterministic:
/// case-insensitive substring match over title + snippet, deny wins over
/// allow, an empty allow-list keeps everything.
pub fn keep(rules: &KeywordRules, article: &Article) -> bool {
    let text = format!("{} {}", article.title, article.snippet).to_lowercase();

    for keyword in &rules.deny {
        if text.contains(&keyword.to_lowercase()) {
            debug!("dropping '{}': deny keyword '{}'", article.title, keyword);
            return false;
        }
    }

    if rules.allow.is_empty() {
        return true;
    }
    let allowed = rules
        .allow
        .iter()
        .any(|keyword| text.contains(&keyword.to_lowercase()));
    if !allowed {
        debug!("dropping '{}': no allow keyword matched", article.title);
    }
    allowed
}

pub fn filter_articles(rules: &KeywordRules, articles: Vec<Article>) -> Vec<Article> {
    let total = articles.len();
    let kept: Vec<Article> = articles.into_iter().filter(|a| keep(rules, a)).collect();
    info!("keyword filter: {} -> {} articles", total, kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::article_id;

    fn rules(allow: &[&str], deny: &[&str]) -> KeywordRules {
        KeywordRules {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn article(title: &str, snippet: &str) -> Article {
        let url = format!("https://example.com/{}", title.len());
        Article {
            id: article_id(&url),
            title: title.to_string(),
            url,
            source: "test".to_string(),
            published: None,
            snippet: snippet.to_string(),
            news_type: "ai".to_string(),
            fetch_order: 0,
        }
    }

    #[test]
    fn deny_wins_over_allow() {
        let rules = rules(&["AI"], &["sponsored"]);
        let a = article("Sponsored: the best AI tools", "an AI roundup");
        assert!(!keep(&rules, &a));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let rules = rules(&["machine learning"], &[]);
        let a = article("New Machine Learning benchmark", "");
        assert!(keep(&rules, &a));
    }

    #[test]
    fn allow_matches_snippet_too() {
        let rules = rules(&["LLM"], &[]);
        let a = article("Model release notes", "the new LLM outperforms");
        assert!(keep(&rules, &a));
    }

    #[test]
    fn empty_allow_list_keeps_everything() {
        let rules = rules(&[], &["advertisement"]);
        assert!(keep(&rules, &article("Anything goes", "")));
        assert!(!keep(&rules, &article("An advertisement", "")));
    }

    #[test]
    fn no_allow_match_drops() {
        let rules = rules(&["AI", "LLM"], &[]);
        assert!(!keep(&rules, &article("Best summer recipes", "food ideas")));
    }
}
