//! Following other users' visited cities

use crate::db::repositories::{ShareSettingsRepository, SubscribeRepository, UserRepository, VisitedCityRepository};
use crate::models::{ParseEnumError, SubscriptionUser, VisitedCitySummary};
use crate::services::{ServiceError, ServiceResult};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeAction {
    Subscribe,
    Unsubscribe,
}

impl FromStr for SubscribeAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscribe" => Ok(SubscribeAction::Subscribe),
            "unsubscribe" => Ok(SubscribeAction::Unsubscribe),
            _ => Err(ParseEnumError::new("subscribe action", s)),
        }
    }
}

pub struct SubscribeService {
    subscriptions: Arc<dyn SubscribeRepository>,
    share: Arc<dyn ShareSettingsRepository>,
    users: Arc<dyn UserRepository>,
    visits: Arc<dyn VisitedCityRepository>,
}

impl SubscribeService {
    pub fn new(
        subscriptions: Arc<dyn SubscribeRepository>,
        share: Arc<dyn ShareSettingsRepository>,
        users: Arc<dyn UserRepository>,
        visits: Arc<dyn VisitedCityRepository>,
    ) -> Self {
        Self {
            subscriptions,
            share,
            users,
            visits,
        }
    }

    /// Subscribe or unsubscribe; returns whether `from` now follows `to`
    pub async fn apply(&self, from: i64, to: i64, action: SubscribeAction) -> ServiceResult<bool> {
        if from == to {
            return Err(ServiceError::validation("Нельзя подписаться на самого себя"));
        }
        if self.users.get_by_id(to).await?.is_none() {
            return Err(ServiceError::not_found(format!("пользователь {}", to)));
        }

        match action {
            SubscribeAction::Subscribe => {
                if !self.accepts_subscribers(to).await? {
                    return Err(ServiceError::Forbidden(
                        "Пользователь не разрешил подписку".to_string(),
                    ));
                }
                self.subscriptions.subscribe(from, to).await?;
                tracing::info!(from, to, "Subscribed");
                Ok(true)
            }
            SubscribeAction::Unsubscribe => {
                self.subscriptions.unsubscribe(from, to).await?;
                tracing::info!(from, to, "Unsubscribed");
                Ok(false)
            }
        }
    }

    /// Whether `user_id` currently lets others follow their cities
    async fn accepts_subscribers(&self, user_id: i64) -> ServiceResult<bool> {
        Ok(self
            .share
            .get(user_id)
            .await?
            .is_some_and(|s| s.can_share && s.can_subscribe))
    }

    pub async fn is_subscribed(&self, from: i64, to: i64) -> ServiceResult<bool> {
        Ok(self.subscriptions.exists(from, to).await?)
    }

    pub async fn subscriptions(&self, user_id: i64) -> ServiceResult<Vec<SubscriptionUser>> {
        Ok(self.subscriptions.list_subscriptions(user_id).await?)
    }

    pub async fn subscribers(&self, user_id: i64) -> ServiceResult<Vec<SubscriptionUser>> {
        Ok(self.subscriptions.list_subscribers(user_id).await?)
    }

    /// Visited cities of followed users, tagged with the owner id. Every id
    /// must be followed by `viewer_id` and still accept subscribers; turning
    /// sharing off hides the cities without dropping the subscription.
    pub async fn followed_cities(
        &self,
        viewer_id: i64,
        user_ids: &[i64],
    ) -> ServiceResult<Vec<(i64, VisitedCitySummary)>> {
        for id in user_ids {
            if !self.subscriptions.exists(viewer_id, *id).await? {
                return Err(ServiceError::Forbidden(format!(
                    "Нет подписки на пользователя {}",
                    id
                )));
            }
            if !self.accepts_subscribers(*id).await? {
                return Err(ServiceError::Forbidden(format!(
                    "Пользователь {} закрыл доступ к своим городам",
                    id
                )));
            }
        }
        Ok(self.visits.list_summaries_for_users(user_ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        fixtures, SqlxShareSettingsRepository, SqlxSubscribeRepository, SqlxUserRepository,
        SqlxVisitedCityRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::ShareSettings;

    async fn setup() -> (DynDatabasePool, SubscribeService) {
        let pool = fixtures::migrated_pool().await;
        let service = SubscribeService::new(
            SqlxSubscribeRepository::boxed(pool.clone()),
            SqlxShareSettingsRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            SqlxVisitedCityRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    async fn open_subscriptions(pool: &DynDatabasePool, user_id: i64) {
        SqlxShareSettingsRepository::new(pool.clone())
            .save(&ShareSettings {
                user_id,
                can_share: true,
                can_share_dashboard: true,
                can_subscribe: true,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("unsubscribe".parse::<SubscribeAction>().unwrap(), SubscribeAction::Unsubscribe);
        let json: SubscribeAction = serde_json::from_str("\"subscribe\"").unwrap();
        assert_eq!(json, SubscribeAction::Subscribe);
        assert!("follow".parse::<SubscribeAction>().is_err());
    }

    #[tokio::test]
    async fn test_subscription_rules() {
        let (pool, service) = setup().await;
        let ivan = fixtures::insert_user(&pool, "ivan").await;
        let petr = fixtures::insert_user(&pool, "petr").await;

        assert!(matches!(
            service.apply(ivan, ivan, SubscribeAction::Subscribe).await,
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.apply(ivan, 999, SubscribeAction::Subscribe).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.apply(ivan, petr, SubscribeAction::Subscribe).await,
            Err(ServiceError::Forbidden(_))
        ));

        open_subscriptions(&pool, petr).await;
        assert!(service.apply(ivan, petr, SubscribeAction::Subscribe).await.unwrap());
        assert!(service.is_subscribed(ivan, petr).await.unwrap());
        assert_eq!(service.subscribers(petr).await.unwrap()[0].username, "ivan");

        assert!(!service.apply(ivan, petr, SubscribeAction::Unsubscribe).await.unwrap());
        assert!(service.subscriptions(ivan).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_followed_cities_require_subscription() {
        let (pool, service) = setup().await;
        let geo = fixtures::seed_geography(&pool).await;
        let ivan = fixtures::insert_user(&pool, "ivan").await;
        let petr = fixtures::insert_user(&pool, "petr").await;
        let anna = fixtures::insert_user(&pool, "anna").await;
        fixtures::insert_visit(&pool, petr, geo.cities[3], None, 5).await;
        open_subscriptions(&pool, petr).await;
        service.apply(ivan, petr, SubscribeAction::Subscribe).await.unwrap();

        let cities = service.followed_cities(ivan, &[petr]).await.unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].0, petr);
        assert_eq!(cities[0].1.city_title, "Ярославль");

        assert!(matches!(
            service.followed_cities(ivan, &[petr, anna]).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_revoked_sharing_hides_followed_cities() {
        let (pool, service) = setup().await;
        let geo = fixtures::seed_geography(&pool).await;
        let ivan = fixtures::insert_user(&pool, "ivan").await;
        let petr = fixtures::insert_user(&pool, "petr").await;
        fixtures::insert_visit(&pool, petr, geo.cities[3], None, 5).await;
        open_subscriptions(&pool, petr).await;
        service.apply(ivan, petr, SubscribeAction::Subscribe).await.unwrap();
        assert_eq!(service.followed_cities(ivan, &[petr]).await.unwrap().len(), 1);

        let share = SqlxShareSettingsRepository::new(pool.clone());
        share.save(&ShareSettings::disabled(petr)).await.unwrap();
        assert!(matches!(
            service.followed_cities(ivan, &[petr]).await,
            Err(ServiceError::Forbidden(_))
        ));

        // Sharing stays on but subscriptions are closed
        share
            .save(&ShareSettings {
                user_id: petr,
                can_share: true,
                can_share_dashboard: true,
                can_subscribe: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(
            service.followed_cities(ivan, &[petr]).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(service.is_subscribed(ivan, petr).await.unwrap());

        open_subscriptions(&pool, petr).await;
        assert_eq!(service.followed_cities(ivan, &[petr]).await.unwrap().len(), 1);
    }
}
