//! Advertisement exceptions

use crate::db::dialect::InsertId;
use crate::db::DynDatabasePool;
use crate::models::AdvertisementException;
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

#[async_trait]
pub trait AdvertisementRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<AdvertisementException>>;
    async fn get_by_user(&self, user_id: i64) -> Result<Option<AdvertisementException>>;
    async fn create(&self, user_id: i64, deadline: NaiveDate) -> Result<AdvertisementException>;
    async fn update(&self, id: i64, user_id: i64, deadline: NaiveDate) -> Result<bool>;
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxAdvertisementRepository {
    pool: DynDatabasePool,
}

impl SqlxAdvertisementRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AdvertisementRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AdvertisementRepository for SqlxAdvertisementRepository {
    async fn list(&self) -> Result<Vec<AdvertisementException>> {
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, AdvertisementException>(
                "SELECT id, user_id, deadline FROM advertisement_exceptions ORDER BY deadline DESC",
            )
            .fetch_all(p)
            .await
            .context("Failed to list advertisement exceptions")?
        });
        Ok(rows)
    }

    async fn get_by_user(&self, user_id: i64) -> Result<Option<AdvertisementException>> {
        let row = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, AdvertisementException>(
                "SELECT id, user_id, deadline FROM advertisement_exceptions WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(p)
            .await
            .context("Failed to get advertisement exception")?
        });
        Ok(row)
    }

    async fn create(&self, user_id: i64, deadline: NaiveDate) -> Result<AdvertisementException> {
        let id = with_pool!(self.pool, |p| {
            sqlx::query("INSERT INTO advertisement_exceptions (user_id, deadline) VALUES (?, ?)")
                .bind(user_id)
                .bind(deadline)
                .execute(p)
                .await
                .context("Failed to create advertisement exception")?
                .insert_id()
        });
        Ok(AdvertisementException { id, user_id, deadline })
    }

    async fn update(&self, id: i64, user_id: i64, deadline: NaiveDate) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("UPDATE advertisement_exceptions SET user_id = ?, deadline = ? WHERE id = ?")
                .bind(user_id)
                .bind(deadline)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update advertisement exception")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM advertisement_exceptions WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete advertisement exception")?
                .rows_affected()
        });
        Ok(affected > 0)
    }
}
