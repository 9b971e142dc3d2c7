//! Share settings repository

use crate::db::DynDatabasePool;
use crate::models::ShareSettings;
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ShareSettingsRepository: Send + Sync {
    /// `None` when the user never saved the form
    async fn get(&self, user_id: i64) -> Result<Option<ShareSettings>>;

    /// Insert or replace the user's settings as given
    async fn save(&self, settings: &ShareSettings) -> Result<()>;
}

pub struct SqlxShareSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxShareSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ShareSettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ShareSettingsRepository for SqlxShareSettingsRepository {
    async fn get(&self, user_id: i64) -> Result<Option<ShareSettings>> {
        let sql = "SELECT user_id, can_share, can_share_dashboard, can_share_city_map, can_share_region_map, can_subscribe \
                   FROM share_settings WHERE user_id = ?";
        let settings = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, ShareSettings>(sql)
                .bind(user_id)
                .fetch_optional(p)
                .await
                .context("Failed to get share settings")?
        });
        Ok(settings)
    }

    async fn save(&self, settings: &ShareSettings) -> Result<()> {
        let insert = "INSERT INTO share_settings \
                      (user_id, can_share, can_share_dashboard, can_share_city_map, can_share_region_map, can_subscribe) \
                      VALUES (?, ?, ?, ?, ?, ?)";
        with_pool!(self.pool, |p| {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM share_settings WHERE user_id = ?")
                .bind(settings.user_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear share settings")?;
            sqlx::query(insert)
                .bind(settings.user_id)
                .bind(settings.can_share)
                .bind(settings.can_share_dashboard)
                .bind(settings.can_share_city_map)
                .bind(settings.can_share_region_map)
                .bind(settings.can_subscribe)
                .execute(&mut *tx)
                .await
                .context("Failed to save share settings")?;
            tx.commit().await.context("Failed to commit share settings")?;
        });
        Ok(())
    }
}
