use tracing::info;

use crate::types::{DigestSelection, ScoredArticle};

/// Rank and cut the scored set. Pure: threshold filter, stable sort by score
/// descending (ties keep the input's fetch order), truncate to `max_articles`.
/// An empty result is a valid terminal state.
pub fn select(
    mut scored: Vec<ScoredArticle>,
    threshold: u8,
    max_articles: usize,
) -> DigestSelection {
    let candidates = scored.len();
    scored.retain(|s| s.score >= threshold);
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(max_articles);

    info!(
        "selected {} of {} scored articles (threshold {}, max {})",
        scored.len(),
        candidates,
        threshold,
        max_articles
    );
    DigestSelection { articles: scored }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Article, Category};

    fn scored(title: &str, score: u8, fetch_order: usize) -> ScoredArticle {
        ScoredArticle {
            article: Article {
                id: format!("id-{}", fetch_order),
                title: title.to_string(),
                url: format!("https://example.com/{}", fetch_order),
                source: "test".to_string(),
                published: None,
                snippet: String::new(),
                news_type: "ai".to_string(),
                fetch_order,
            },
            score,
            category: Category::Industry,
            summary: String::new(),
            financial: None,
        }
    }

    #[test]
    fn sorts_descending_by_score() {
        let selection = select(
            vec![scored("a", 4, 0), scored("b", 9, 1), scored("c", 7, 2)],
            1,
            10,
        );
        let scores: Vec<u8> = selection.articles.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![9, 7, 4]);
    }

    #[test]
    fn ties_preserve_fetch_order() {
        let selection = select(
            vec![scored("first", 7, 0), scored("second", 7, 1), scored("third", 7, 2)],
            1,
            10,
        );
        let titles: Vec<&str> = selection
            .articles
            .iter()
            .map(|s| s.article.title.as_str())
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn applies_threshold_and_max() {
        let selection = select(
            vec![
                scored("a", 3, 0),
                scored("b", 8, 1),
                scored("c", 6, 2),
                scored("d", 9, 3),
            ],
            6,
            2,
        );
        assert_eq!(selection.len(), 2);
        assert!(selection.articles.iter().all(|s| s.score >= 6));
        assert_eq!(selection.articles[0].score, 9);
        assert_eq!(selection.articles[1].score, 8);
    }

    #[test]
    fn empty_input_yields_empty_selection() {
        assert!(select(Vec::new(), 6, 10).is_empty());
    }

    #[test]
    fn nothing_above_threshold_yields_empty_selection() {
        assert!(select(vec![scored("a", 2, 0)], 6, 10).is_empty());
    }
}
