//! Session repository

use crate::db::DynDatabasePool;
use crate::models::Session;
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look a session up by its token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Sign a user out everywhere
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Returns the number of removed sessions
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(p)
                .await
                .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";
        let session = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Session>(sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get session by ID")?
        });
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete session")?;
        });
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(p)
                .await
                .context("Failed to delete sessions by user")?;
        });
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let removed = with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(Utc::now())
                .execute(p)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected()
        });
        Ok(removed as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures;
    use chrono::Duration;

    fn session(id: &str, user_id: i64, ttl: Duration) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let pool = fixtures::migrated_pool().await;
        let user_id = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&session("token-1", user_id, Duration::days(14))).await.unwrap();
        let found = repo.get_by_id("token-1").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        repo.delete("token-1").await.unwrap();
        assert!(repo.get_by_id("token-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let pool = fixtures::migrated_pool().await;
        let user_id = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&session("old", user_id, Duration::hours(-1))).await.unwrap();
        repo.create(&session("live", user_id, Duration::hours(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let pool = fixtures::migrated_pool().await;
        let user_id = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxSessionRepository::new(pool);

        repo.create(&session("a", user_id, Duration::days(1))).await.unwrap();
        repo.create(&session("b", user_id, Duration::days(1))).await.unwrap();
        repo.delete_by_user(user_id).await.unwrap();

        assert!(repo.get_by_id("a").await.unwrap().is_none());
        assert!(repo.get_by_id("b").await.unwrap().is_none());
    }
}
