//! Share settings and the public read-only pages they unlock

use crate::db::repositories::{ShareSettingsRepository, UserRepository};
use crate::models::{SharePage, ShareSettings, ShareSettingsInput, User};
use crate::services::{ServiceError, ServiceResult};
use std::sync::Arc;

/// What a visitor of `/share/{user_id}` gets to see
#[derive(Debug, Clone)]
pub struct SharedView {
    pub owner: User,
    pub settings: ShareSettings,
    pub page: SharePage,
}

pub struct ShareService {
    settings: Arc<dyn ShareSettingsRepository>,
    users: Arc<dyn UserRepository>,
}

impl ShareService {
    pub fn new(settings: Arc<dyn ShareSettingsRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { settings, users }
    }

    /// Stored settings, or everything off for users who never saved the form
    pub async fn settings(&self, user_id: i64) -> ServiceResult<ShareSettings> {
        Ok(self
            .settings
            .get(user_id)
            .await?
            .unwrap_or_else(|| ShareSettings::disabled(user_id)))
    }

    pub async fn save(&self, user_id: i64, input: ShareSettingsInput) -> ServiceResult<ShareSettings> {
        let settings = normalize(user_id, input)?;
        self.settings.save(&settings).await?;
        tracing::info!(user_id, can_share = settings.can_share, "Share settings saved");
        Ok(settings)
    }

    /// Resolve a public page request. Anything not explicitly shared is
    /// reported as missing.
    pub async fn shared_view(&self, owner_id: i64, page: Option<SharePage>) -> ServiceResult<SharedView> {
        let not_shared = || ServiceError::not_found(format!("страница пользователя {}", owner_id));

        let owner = self
            .users
            .get_by_id(owner_id)
            .await?
            .filter(|u| !u.is_banned())
            .ok_or_else(not_shared)?;
        let settings = self.settings(owner_id).await?;

        let page = match page {
            Some(page) if settings.allows(page) => page,
            Some(_) => return Err(not_shared()),
            None => settings.default_page().ok_or_else(not_shared)?,
        };

        Ok(SharedView { owner, settings, page })
    }
}

/// Apply the master switch and require at least one page when sharing
fn normalize(user_id: i64, input: ShareSettingsInput) -> ServiceResult<ShareSettings> {
    if !input.can_share {
        return Ok(ShareSettings::disabled(user_id));
    }
    if !(input.can_share_dashboard || input.can_share_city_map || input.can_share_region_map) {
        return Err(ServiceError::validation(
            "Выберите хотя бы одну страницу, которой хотите поделиться",
        ));
    }
    Ok(ShareSettings {
        user_id,
        can_share: true,
        can_share_dashboard: input.can_share_dashboard,
        can_share_city_map: input.can_share_city_map,
        can_share_region_map: input.can_share_region_map,
        can_subscribe: input.can_subscribe,
    })
}
