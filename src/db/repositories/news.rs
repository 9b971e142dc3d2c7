//! News repository

use crate::db::dialect::InsertId;
use crate::db::DynDatabasePool;
use crate::models::News;
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Newest first, with the total count
    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<News>, i64)>;
    async fn get(&self, id: i64) -> Result<Option<News>>;
    async fn create(&self, title: &str, content: &str, content_html: &str) -> Result<News>;
    async fn update(&self, id: i64, title: &str, content: &str, content_html: &str) -> Result<bool>;
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxNewsRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NewsRepository for SqlxNewsRepository {
    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<News>, i64)> {
        let offset = (page.max(1) - 1) * per_page;
        let sql = "SELECT id, title, content, content_html, created_at, updated_at FROM news \
                   ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?";
        let (items, (total,)): (Vec<News>, (i64,)) = with_pool!(self.pool, |p| {
            let items = sqlx::query_as::<_, News>(sql)
                .bind(per_page)
                .bind(offset)
                .fetch_all(p)
                .await
                .context("Failed to list news")?;
            let total = sqlx::query_as("SELECT COUNT(*) FROM news")
                .fetch_one(p)
                .await
                .context("Failed to count news")?;
            (items, total)
        });
        Ok((items, total))
    }

    async fn get(&self, id: i64) -> Result<Option<News>> {
        let sql = "SELECT id, title, content, content_html, created_at, updated_at FROM news WHERE id = ?";
        let news = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, News>(sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get news")?
        });
        Ok(news)
    }

    async fn create(&self, title: &str, content: &str, content_html: &str) -> Result<News> {
        let now = Utc::now();
        let sql = "INSERT INTO news (title, content, content_html, created_at, updated_at) VALUES (?, ?, ?, ?, ?)";
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(title)
                .bind(content)
                .bind(content_html)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create news")?
                .insert_id()
        });
        Ok(News {
            id,
            title: title.to_string(),
            content: content.to_string(),
            content_html: content_html.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn update(&self, id: i64, title: &str, content: &str, content_html: &str) -> Result<bool> {
        let sql = "UPDATE news SET title = ?, content = ?, content_html = ?, updated_at = ? WHERE id = ?";
        let affected = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(title)
                .bind(content)
                .bind(content_html)
                .bind(Utc::now())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update news")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM news WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete news")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures;

    #[tokio::test]
    async fn test_list_newest_first_with_total() {
        let pool = fixtures::migrated_pool().await;
        let repo = SqlxNewsRepository::new(pool);

        for i in 1..=3 {
            repo.create(&format!("Новость {}", i), "text", "<p>text</p>").await.unwrap();
        }

        let (items, total) = repo.list(1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Новость 3");

        let (rest, _) = repo.list(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].title, "Новость 1");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let pool = fixtures::migrated_pool().await;
        let repo = SqlxNewsRepository::new(pool);

        let news = repo.create("Старое", "a", "<p>a</p>").await.unwrap();
        assert!(repo.update(news.id, "Новое", "b", "<p>b</p>").await.unwrap());
        assert_eq!(repo.get(news.id).await.unwrap().unwrap().content_html, "<p>b</p>");

        assert!(repo.delete(news.id).await.unwrap());
        assert!(!repo.update(news.id, "x", "x", "x").await.unwrap());
    }
}
