//! Blog articles, tags and view counting

use crate::db::dialect::{placeholders, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{BlogArticle, BlogTag};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.title, a.content, a.content_html, a.is_published, a.created_at, a.updated_at,
           (SELECT COUNT(*) FROM blog_article_views bv WHERE bv.article_id = a.id) AS views
    FROM blog_articles a
"#;

/// Fields written on create and update
pub struct ArticleFields<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub content_html: &'a str,
    pub is_published: bool,
    pub tag_ids: &'a [i64],
}

#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Newest first. Drafts are skipped unless `include_drafts`; `tag_slug`
    /// narrows to one tag.
    async fn list_articles(
        &self,
        include_drafts: bool,
        tag_slug: Option<&str>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<BlogArticle>, i64)>;
    async fn get_article(&self, id: i64) -> Result<Option<BlogArticle>>;
    async fn create_article(&self, fields: &ArticleFields<'_>) -> Result<i64>;
    async fn update_article(&self, id: i64, fields: &ArticleFields<'_>) -> Result<bool>;
    async fn delete_article(&self, id: i64) -> Result<bool>;

    /// Tags of each listed article
    async fn tags_for_articles(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<BlogTag>>>;

    async fn list_tags(&self) -> Result<Vec<BlogTag>>;
    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<BlogTag>>;
    async fn create_tag(&self, title: &str, slug: &str) -> Result<BlogTag>;
    async fn update_tag(&self, id: i64, title: &str, slug: &str) -> Result<bool>;
    async fn delete_tag(&self, id: i64) -> Result<bool>;

    /// Record a view unless `ip_address` already viewed the article after `since`.
    /// Returns whether a view was recorded.
    async fn record_view(
        &self,
        article_id: i64,
        user_id: Option<i64>,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<bool>;
}

pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }

    async fn set_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()> {
        with_pool!(self.pool, |p| {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM blog_article_tags WHERE article_id = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear article tags")?;
            for tag_id in tag_ids {
                sqlx::query("INSERT INTO blog_article_tags (article_id, tag_id) VALUES (?, ?)")
                    .bind(article_id)
                    .bind(*tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to tag article")?;
            }
            tx.commit().await.context("Failed to commit article tags")?;
        });
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ArticleTagRow {
    article_id: i64,
    id: i64,
    title: String,
    slug: String,
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn list_articles(
        &self,
        include_drafts: bool,
        tag_slug: Option<&str>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<BlogArticle>, i64)> {
        let mut conditions = Vec::new();
        if !include_drafts {
            conditions.push("a.is_published = 1");
        }
        if tag_slug.is_some() {
            conditions.push(
                "EXISTS (SELECT 1 FROM blog_article_tags bat JOIN blog_tags bt ON bt.id = bat.tag_id \
                 WHERE bat.article_id = a.id AND bt.slug = ?)",
            );
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let list_sql = format!(
            "{} {} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
            ARTICLE_SELECT, where_clause
        );
        let count_sql = format!("SELECT COUNT(*) FROM blog_articles a {}", where_clause);
        let offset = (page.max(1) - 1) * per_page;

        let (items, (total,)): (Vec<BlogArticle>, (i64,)) = with_pool!(self.pool, |p| {
            let mut list = sqlx::query_as::<_, BlogArticle>(&list_sql);
            let mut count = sqlx::query_as(&count_sql);
            if let Some(slug) = tag_slug {
                list = list.bind(slug);
                count = count.bind(slug);
            }
            let items = list
                .bind(per_page)
                .bind(offset)
                .fetch_all(p)
                .await
                .context("Failed to list articles")?;
            let total = count.fetch_one(p).await.context("Failed to count articles")?;
            (items, total)
        });
        Ok((items, total))
    }

    async fn get_article(&self, id: i64) -> Result<Option<BlogArticle>> {
        let sql = format!("{} WHERE a.id = ?", ARTICLE_SELECT);
        let article = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, BlogArticle>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get article")?
        });
        Ok(article)
    }

    async fn create_article(&self, fields: &ArticleFields<'_>) -> Result<i64> {
        let now = Utc::now();
        let sql = "INSERT INTO blog_articles (title, content, content_html, is_published, created_at, updated_at) \
                   VALUES (?, ?, ?, ?, ?, ?)";
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(fields.title)
                .bind(fields.content)
                .bind(fields.content_html)
                .bind(fields.is_published)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create article")?
                .insert_id()
        });
        self.set_tags(id, fields.tag_ids).await?;
        Ok(id)
    }

    async fn update_article(&self, id: i64, fields: &ArticleFields<'_>) -> Result<bool> {
        let sql = "UPDATE blog_articles SET title = ?, content = ?, content_html = ?, is_published = ?, updated_at = ? \
                   WHERE id = ?";
        let affected = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(fields.title)
                .bind(fields.content)
                .bind(fields.content_html)
                .bind(fields.is_published)
                .bind(Utc::now())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update article")?
                .rows_affected()
        });
        if affected == 0 {
            return Ok(false);
        }
        self.set_tags(id, fields.tag_ids).await?;
        Ok(true)
    }

    async fn delete_article(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM blog_articles WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete article")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn tags_for_articles(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<BlogTag>>> {
        let mut map: HashMap<i64, Vec<BlogTag>> = HashMap::new();
        if article_ids.is_empty() {
            return Ok(map);
        }
        let sql = format!(
            "SELECT bat.article_id, t.id, t.title, t.slug FROM blog_article_tags bat \
             JOIN blog_tags t ON t.id = bat.tag_id \
             WHERE bat.article_id IN ({}) ORDER BY t.title",
            placeholders(article_ids.len())
        );
        let rows: Vec<ArticleTagRow> = with_pool!(self.pool, |p| {
            let mut query = sqlx::query_as::<_, ArticleTagRow>(&sql);
            for id in article_ids {
                query = query.bind(*id);
            }
            query.fetch_all(p).await.context("Failed to load article tags")?
        });
        for row in rows {
            map.entry(row.article_id).or_default().push(BlogTag {
                id: row.id,
                title: row.title,
                slug: row.slug,
            });
        }
        Ok(map)
    }

    async fn list_tags(&self) -> Result<Vec<BlogTag>> {
        let tags = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, BlogTag>("SELECT id, title, slug FROM blog_tags ORDER BY title")
                .fetch_all(p)
                .await
                .context("Failed to list tags")?
        });
        Ok(tags)
    }

    async fn get_tag_by_slug(&self, slug: &str) -> Result<Option<BlogTag>> {
        let tag = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, BlogTag>("SELECT id, title, slug FROM blog_tags WHERE slug = ?")
                .bind(slug)
                .fetch_optional(p)
                .await
                .context("Failed to get tag")?
        });
        Ok(tag)
    }

    async fn create_tag(&self, title: &str, slug: &str) -> Result<BlogTag> {
        let id = with_pool!(self.pool, |p| {
            sqlx::query("INSERT INTO blog_tags (title, slug) VALUES (?, ?)")
                .bind(title)
                .bind(slug)
                .execute(p)
                .await
                .context("Failed to create tag")?
                .insert_id()
        });
        Ok(BlogTag {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
        })
    }

    async fn update_tag(&self, id: i64, title: &str, slug: &str) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("UPDATE blog_tags SET title = ?, slug = ? WHERE id = ?")
                .bind(title)
                .bind(slug)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update tag")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete_tag(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM blog_tags WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete tag")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn record_view(
        &self,
        article_id: i64,
        user_id: Option<i64>,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let check = "SELECT COUNT(*) FROM blog_article_views WHERE article_id = ? AND ip_address = ? AND created_at >= ?";
        let insert = "INSERT INTO blog_article_views (article_id, user_id, ip_address, created_at) VALUES (?, ?, ?, ?)";
        let recorded = with_pool!(self.pool, |p| {
            let (recent,): (i64,) = sqlx::query_as(check)
                .bind(article_id)
                .bind(ip_address)
                .bind(since)
                .fetch_one(p)
                .await
                .context("Failed to check recent views")?;
            if recent > 0 {
                false
            } else {
                sqlx::query(insert)
                    .bind(article_id)
                    .bind(user_id)
                    .bind(ip_address)
                    .bind(Utc::now())
                    .execute(p)
                    .await
                    .context("Failed to record view")?;
                true
            }
        });
        Ok(recorded)
    }
}
