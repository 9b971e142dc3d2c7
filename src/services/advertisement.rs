//! Advertisement exceptions: users who see no ads until a deadline

use crate::db::repositories::{AdvertisementRepository, UserRepository};
use crate::models::{AdvertisementException, AdvertisementExceptionInput};
use crate::services::{ServiceError, ServiceResult};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

pub struct AdvertisementService {
    repo: Arc<dyn AdvertisementRepository>,
    users: Arc<dyn UserRepository>,
}

impl AdvertisementService {
    pub fn new(repo: Arc<dyn AdvertisementRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { repo, users }
    }

    /// Anonymous visitors always see ads
    pub async fn show_ads(&self, user_id: Option<i64>) -> ServiceResult<bool> {
        self.show_ads_on(user_id, Utc::now().date_naive()).await
    }

    async fn show_ads_on(&self, user_id: Option<i64>, today: NaiveDate) -> ServiceResult<bool> {
        let Some(user_id) = user_id else {
            return Ok(true);
        };
        let exception = self.repo.get_by_user(user_id).await?;
        Ok(!exception.is_some_and(|e| e.is_active(today)))
    }

    pub async fn list(&self) -> ServiceResult<Vec<AdvertisementException>> {
        Ok(self.repo.list().await?)
    }

    pub async fn create(&self, input: AdvertisementExceptionInput) -> ServiceResult<AdvertisementException> {
        self.ensure_user(input.user_id).await?;
        if self.repo.get_by_user(input.user_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Для пользователя {} исключение уже есть",
                input.user_id
            )));
        }
        Ok(self.repo.create(input.user_id, input.deadline).await?)
    }

    pub async fn update(&self, id: i64, input: AdvertisementExceptionInput) -> ServiceResult<()> {
        self.ensure_user(input.user_id).await?;
        if let Some(other) = self.repo.get_by_user(input.user_id).await? {
            if other.id != id {
                return Err(ServiceError::Conflict(format!(
                    "Для пользователя {} исключение уже есть",
                    input.user_id
                )));
            }
        }
        if !self.repo.update(id, input.user_id, input.deadline).await? {
            return Err(ServiceError::not_found(format!("исключение {}", id)));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::not_found(format!("исключение {}", id)));
        }
        Ok(())
    }

    async fn ensure_user(&self, user_id: i64) -> ServiceResult<()> {
        if self.users.get_by_id(user_id).await?.is_none() {
            return Err(ServiceError::validation(format!("Пользователь {} не найден", user_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures::{self, date};
    use crate::db::repositories::{SqlxAdvertisementRepository, SqlxUserRepository};

    async fn setup() -> (AdvertisementService, i64) {
        let pool = fixtures::migrated_pool().await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        let service = AdvertisementService::new(
            SqlxAdvertisementRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool),
        );
        (service, user)
    }

    #[tokio::test]
    async fn test_ads_hidden_until_deadline() {
        let (service, user) = setup().await;
        let today = date(2025, 6, 1);

        assert!(service.show_ads_on(None, today).await.unwrap());
        assert!(service.show_ads_on(Some(user), today).await.unwrap());

        service
            .create(AdvertisementExceptionInput {
                user_id: user,
                deadline: today,
            })
            .await
            .unwrap();
        assert!(!service.show_ads_on(Some(user), today).await.unwrap());
        assert!(service.show_ads_on(Some(user), date(2025, 6, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_exception_per_user() {
        let (service, user) = setup().await;
        let input = AdvertisementExceptionInput {
            user_id: user,
            deadline: date(2030, 1, 1),
        };
        let created = service.create(input.clone()).await.unwrap();
        assert!(matches!(service.create(input.clone()).await, Err(ServiceError::Conflict(_))));

        service
            .update(
                created.id,
                AdvertisementExceptionInput {
                    user_id: user,
                    deadline: date(2031, 1, 1),
                },
            )
            .await
            .unwrap();
        assert_eq!(service.list().await.unwrap()[0].deadline, date(2031, 1, 1));

        let stranger = AdvertisementExceptionInput {
            user_id: 404,
            deadline: date(2030, 1, 1),
        };
        assert!(matches!(service.create(stranger).await, Err(ServiceError::ValidationError(_))));

        service.delete(created.id).await.unwrap();
        assert!(matches!(service.delete(created.id).await, Err(ServiceError::NotFound(_))));
    }
}
