//! News feed and blog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct News {
    pub id: i64,
    pub title: String,
    /// Markdown source
    pub content: String,
    pub content_html: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsInput {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlogTag {
    pub id: i64,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlogArticle {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub content_html: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Filled from `blog_article_views`
    pub views: i64,
}

/// Article with its tags, as shown on list and detail pages
#[derive(Debug, Clone, Serialize)]
pub struct BlogArticleWithTags {
    #[serde(flatten)]
    pub article: BlogArticle,
    pub tags: Vec<BlogTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlogArticleInput {
    pub title: String,
    pub content: String,
    #[serde(default = "default_published")]
    pub is_published: bool,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlogTagInput {
    pub title: String,
    pub slug: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            items,
            page,
            per_page,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_navigation() {
        let page: Page<i64> = Page::new(vec![], 1, 10, 25);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(!page.has_prev);

        let last: Page<i64> = Page::new(vec![], 3, 10, 25);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let empty: Page<i64> = Page::new(vec![], 1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }
}
