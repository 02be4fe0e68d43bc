use serde_json::{json, Value};

use crate::config::SlackOptions;
use crate::types::{Category, DigestSelection, RunContext, ScoredArticle};

/// Slack caps section text at 3000 characters; stay under it.
const SECTION_TEXT_MAX: usize = 2900;

/// Sink-ready renderings of one selection: a Block Kit chat message and flat
/// archive rows. Composition is pure and total; a problematic article
/// degrades to a plain-text fallback entry, never an error.
#[derive(Debug, Clone)]
pub struct DigestPayload {
    pub slack: Value,
    pub rows: Vec<Vec<String>>,
}

pub fn compose(
    selection: &DigestSelection,
    ctx: &RunContext,
    opts: &SlackOptions,
) -> DigestPayload {
    DigestPayload {
        slack: slack_message(selection, ctx, opts),
        rows: sheet_rows(selection, ctx),
    }
}

fn slack_message(selection: &DigestSelection, ctx: &RunContext, opts: &SlackOptions) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": opts.title, "emoji": true }
        }),
        json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": format!(
                    "*{}* • {} • {} articles",
                    ctx.started_at.format("%Y-%m-%d %H:%M UTC"),
                    ctx.news_type,
                    selection.len()
                )
            }]
        }),
        json!({ "type": "divider" }),
    ];

    if selection.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": "No articles met the score threshold in this run." }
        }));
    }

    for (i, scored) in selection.articles.iter().enumerate() {
        blocks.extend(article_blocks(i, scored, opts));
        if i + 1 < selection.len() {
            blocks.push(json!({ "type": "divider" }));
        }
    }

    json!({
        "text": format!("{} - {} articles", opts.title, selection.len()),
        "blocks": blocks
    })
}

/// Render one article as Block Kit. Missing or unusable fields degrade this
/// entry to plain text instead of failing the whole composition.
fn article_blocks(index: usize, scored: &ScoredArticle, opts: &SlackOptions) -> Vec<Value> {
    let article = &scored.article;
    let title = non_empty_or(&article.title, "(untitled)");
    let summary = non_empty_or(&scored.summary, &article.snippet);

    let body = if article.url.trim().is_empty() {
        // No link to render; fall back to an unlinked plain entry.
        format!("*{}. {}*\n{}", index + 1, title, summary)
    } else {
        format!("*{}. <{}|{}>*\n{}", index + 1, article.url, title, summary)
    };

    let mut blocks = vec![json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": truncate_chars(&body, SECTION_TEXT_MAX) }
    })];

    let mut meta = Vec::new();
    if opts.show_score {
        meta.push(json!({
            "type": "mrkdwn",
            "text": format!("{} *{}/10*", score_emoji(scored.score), scored.score)
        }));
    }
    if opts.show_category {
        meta.push(json!({
            "type": "mrkdwn",
            "text": format!("{} {}", category_emoji(scored.category), scored.category.as_str())
        }));
    }
    if opts.show_source {
        meta.push(json!({
            "type": "mrkdwn",
            "text": format!("🔗 {}", non_empty_or(&article.source, "unknown source"))
        }));
    }
    if !meta.is_empty() {
        blocks.push(json!({ "type": "context", "elements": meta }));
    }
    blocks
}

/// Archive row columns, in order: fetch time, news-type, title, url, source,
/// score, category, summary, related companies, market impact, investment
/// insight, published time.
pub fn sheet_header() -> Vec<String> {
    [
        "Fetched at",
        "News type",
        "Title",
        "URL",
        "Source",
        "Score",
        "Category",
        "Summary",
        "Related companies",
        "Market impact",
        "Investment insight",
        "Published at",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn sheet_rows(selection: &DigestSelection, ctx: &RunContext) -> Vec<Vec<String>> {
    let fetched_at = ctx.started_at.format("%Y-%m-%d %H:%M:%S").to_string();
    selection
        .articles
        .iter()
        .map(|scored| {
            let article = &scored.article;
            let financial = scored.financial.clone().unwrap_or_default();
            vec![
                fetched_at.clone(),
                ctx.news_type.clone(),
                article.title.clone(),
                article.url.clone(),
                article.source.clone(),
                scored.score.to_string(),
                scored.category.as_str().to_string(),
                scored.summary.clone(),
                financial.related_companies,
                financial.market_impact,
                financial.investment_insight,
                article
                    .published
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect()
}

fn score_emoji(score: u8) -> &'static str {
    if score >= 8 {
        "🔥"
    } else if score >= 6 {
        "⭐"
    } else {
        "📌"
    }
}

fn category_emoji(category: Category) -> &'static str {
    match category {
        Category::Research => "🔬",
        Category::Product => "🚀",
        Category::Industry => "🏢",
        Category::Market => "📈",
        Category::Policy => "🏛️",
        Category::Opinion => "💭",
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Article, ScoredArticle};

    fn scored(title: &str, url: &str, score: u8, summary: &str) -> ScoredArticle {
        ScoredArticle {
            article: Article {
                id: "id".into(),
                title: title.to_string(),
                url: url.to_string(),
                source: "Feed".into(),
                published: None,
                snippet: "snippet text".into(),
                news_type: "ai".into(),
                fetch_order: 0,
            },
            score,
            category: Category::Product,
            summary: summary.to_string(),
            financial: None,
        }
    }

    fn ctx() -> RunContext {
        RunContext::new("ai", false)
    }

    fn selection(articles: Vec<ScoredArticle>) -> DigestSelection {
        DigestSelection { articles }
    }

    #[test]
    fn rows_follow_the_archive_column_order() {
        let payload = compose(
            &selection(vec![scored("Title", "https://e.com/a", 7, "Summary")]),
            &ctx(),
            &SlackOptions::default(),
        );
        assert_eq!(payload.rows.len(), 1);
        let row = &payload.rows[0];
        assert_eq!(row.len(), sheet_header().len());
        assert_eq!(row[1], "ai");
        assert_eq!(row[2], "Title");
        assert_eq!(row[3], "https://e.com/a");
        assert_eq!(row[5], "7");
        assert_eq!(row[6], "PRODUCT");
    }

    #[test]
    fn malformed_article_degrades_to_fallback_not_panic() {
        let payload = compose(
            &selection(vec![scored("", "", 5, "")]),
            &ctx(),
            &SlackOptions::default(),
        );
        let rendered = payload.slack.to_string();
        assert!(rendered.contains("(untitled)"));
        assert!(rendered.contains("snippet text"));
    }

    #[test]
    fn empty_selection_renders_a_notice() {
        let payload = compose(&selection(vec![]), &ctx(), &SlackOptions::default());
        assert!(payload.rows.is_empty());
        assert!(payload
            .slack
            .to_string()
            .contains("No articles met the score threshold"));
    }

    #[test]
    fn oversized_summary_is_truncated_under_slack_limit() {
        let long = "x".repeat(5000);
        let payload = compose(
            &selection(vec![scored("Big", "https://e.com/b", 9, &long)]),
            &ctx(),
            &SlackOptions::default(),
        );
        let blocks = payload.slack["blocks"].as_array().unwrap();
        let section = blocks
            .iter()
            .find(|b| b["type"] == "section")
            .unwrap();
        let text = section["text"]["text"].as_str().unwrap();
        assert!(text.chars().count() <= SECTION_TEXT_MAX + 1);
    }

    #[test]
    fn meta_blocks_respect_display_options() {
        let opts = SlackOptions {
            show_score: false,
            show_category: false,
            show_source: false,
            ..SlackOptions::default()
        };
        let payload = compose(
            &selection(vec![scored("T", "https://e.com/c", 6, "s")]),
            &ctx(),
            &opts,
        );
        assert!(!payload.slack.to_string().contains("/10*"));
    }
}
