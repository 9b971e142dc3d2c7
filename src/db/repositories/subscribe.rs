//! Subscriptions between users

use crate::db::DynDatabasePool;
use crate::models::SubscriptionUser;
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait SubscribeRepository: Send + Sync {
    async fn exists(&self, from: i64, to: i64) -> Result<bool>;
    /// No-op when already subscribed
    async fn subscribe(&self, from: i64, to: i64) -> Result<()>;
    async fn unsubscribe(&self, from: i64, to: i64) -> Result<()>;
    /// Users `user_id` follows
    async fn list_subscriptions(&self, user_id: i64) -> Result<Vec<SubscriptionUser>>;
    /// Users following `user_id`
    async fn list_subscribers(&self, user_id: i64) -> Result<Vec<SubscriptionUser>>;
}

pub struct SqlxSubscribeRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscribeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscribeRepository> {
        Arc::new(Self::new(pool))
    }

    async fn list_joined(&self, join_on: &str, where_col: &str, user_id: i64) -> Result<Vec<SubscriptionUser>> {
        let sql = format!(
            "SELECT u.id, u.username, u.first_name, u.last_name FROM subscribes s \
             JOIN users u ON u.id = s.{} WHERE s.{} = ? ORDER BY u.username",
            join_on, where_col
        );
        let users = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, SubscriptionUser>(&sql)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to list subscriptions")?
        });
        Ok(users)
    }
}

#[async_trait]
impl SubscribeRepository for SqlxSubscribeRepository {
    async fn exists(&self, from: i64, to: i64) -> Result<bool> {
        let (count,): (i64,) = with_pool!(self.pool, |p| {
            sqlx::query_as("SELECT COUNT(*) FROM subscribes WHERE subscribe_from = ? AND subscribe_to = ?")
                .bind(from)
                .bind(to)
                .fetch_one(p)
                .await
                .context("Failed to check subscription")?
        });
        Ok(count > 0)
    }

    async fn subscribe(&self, from: i64, to: i64) -> Result<()> {
        if self.exists(from, to).await? {
            return Ok(());
        }
        with_pool!(self.pool, |p| {
            sqlx::query("INSERT INTO subscribes (subscribe_from, subscribe_to, created_at) VALUES (?, ?, ?)")
                .bind(from)
                .bind(to)
                .bind(Utc::now())
                .execute(p)
                .await
                .context("Failed to subscribe")?;
        });
        Ok(())
    }

    async fn unsubscribe(&self, from: i64, to: i64) -> Result<()> {
        with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM subscribes WHERE subscribe_from = ? AND subscribe_to = ?")
                .bind(from)
                .bind(to)
                .execute(p)
                .await
                .context("Failed to unsubscribe")?;
        });
        Ok(())
    }

    async fn list_subscriptions(&self, user_id: i64) -> Result<Vec<SubscriptionUser>> {
        self.list_joined("subscribe_to", "subscribe_from", user_id).await
    }

    async fn list_subscribers(&self, user_id: i64) -> Result<Vec<SubscriptionUser>> {
        self.list_joined("subscribe_from", "subscribe_to", user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures;

    #[tokio::test]
    async fn test_subscribe_is_idempotent_and_directional() {
        let pool = fixtures::migrated_pool().await;
        let ivan = fixtures::insert_user(&pool, "ivan").await;
        let petr = fixtures::insert_user(&pool, "petr").await;
        let repo = SqlxSubscribeRepository::new(pool);

        repo.subscribe(ivan, petr).await.unwrap();
        repo.subscribe(ivan, petr).await.unwrap();

        assert!(repo.exists(ivan, petr).await.unwrap());
        assert!(!repo.exists(petr, ivan).await.unwrap());
        assert_eq!(repo.list_subscriptions(ivan).await.unwrap()[0].username, "petr");
        assert_eq!(repo.list_subscribers(petr).await.unwrap()[0].username, "ivan");

        repo.unsubscribe(ivan, petr).await.unwrap();
        assert!(repo.list_subscriptions(ivan).await.unwrap().is_empty());
    }
}
