//! Accounts and sessions
//!
//! - Registration (the first account becomes admin)
//! - Sign in / sign out with database-backed sessions
//! - Profile and password changes

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, UpdateProfileInput, User, UserRole};
use crate::services::password::{hash_password, password_problems, verify_password};
use anyhow::Context;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 14;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    // Static pattern; compiling it cannot fail
    Regex::new(r"^[A-Za-z0-9_.\-]{3,30}$").unwrap_or_else(|_| unreachable!())
});

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    Conflict(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Create an account. The first account in an empty database is an admin.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        if !USERNAME_RE.is_match(&username) {
            return Err(UserServiceError::ValidationError(
                "Имя пользователя: 3-30 символов, латинские буквы, цифры и _.-".to_string(),
            ));
        }
        validate_email(&email)?;
        if let Some(problem) = password_problems(&input.password, &username).first() {
            return Err(UserServiceError::ValidationError(problem.to_string()));
        }

        if self.user_repo.get_by_username(&username).await?.is_some() {
            return Err(UserServiceError::Conflict(format!(
                "Имя пользователя '{}' уже занято",
                username
            )));
        }
        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(UserServiceError::Conflict(format!(
                "Адрес '{}' уже зарегистрирован",
                email
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::User
        };
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(username, email, password_hash, role);

        let created = self.user_repo.create(&user).await.context("Failed to create user")?;
        tracing::info!(user_id = created.id, role = %created.role, "Registered user");
        Ok(created)
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Неверное имя пользователя или пароль".to_string());

        let user = self
            .user_repo
            .get_by_login(input.username_or_email.trim())
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }
        if user.is_banned() {
            return Err(UserServiceError::AuthenticationError(
                "Учётная запись заблокирована".to_string(),
            ));
        }

        self.create_session(user.id).await
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// User behind a session token; expired sessions are deleted on sight
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self.session_repo.get_by_id(token).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo.delete(token).await?;
            return Ok(None);
        }

        let user = self.user_repo.get_by_id(session.user_id).await?;
        Ok(user.filter(|u| !u.is_banned()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await?)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    pub async fn update_profile(&self, user_id: i64, input: UpdateProfileInput) -> Result<User, UserServiceError> {
        let email = input.email.trim().to_lowercase();
        validate_email(&email)?;
        if let Some(other) = self.user_repo.get_by_email(&email).await? {
            if other.id != user_id {
                return Err(UserServiceError::Conflict(format!(
                    "Адрес '{}' уже зарегистрирован",
                    email
                )));
            }
        }
        let input = UpdateProfileInput { email, ..input };
        self.user_repo.update_profile(user_id, &input).await?;
        self.user_repo
            .get_by_id(user_id)
            .await?
            .ok_or(UserServiceError::NotFound)
    }

    /// Change the password after checking the current one. Other sessions
    /// of the user are closed; `keep_session` stays valid.
    pub async fn change_password(
        &self,
        user_id: i64,
        current: &str,
        new_password: &str,
        keep_session: Option<&str>,
    ) -> Result<(), UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await?
            .ok_or(UserServiceError::NotFound)?;

        if !verify_password(current, &user.password_hash).context("Failed to verify password")? {
            return Err(UserServiceError::AuthenticationError(
                "Текущий пароль указан неверно".to_string(),
            ));
        }
        if let Some(problem) = password_problems(new_password, &user.username).first() {
            return Err(UserServiceError::ValidationError(problem.to_string()));
        }

        let hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo.update_password(user_id, &hash).await?;

        let kept = match keep_session {
            Some(token) => self.session_repo.get_by_id(token).await?,
            None => None,
        };
        self.session_repo.delete_by_user(user_id).await?;
        if let Some(session) = kept {
            self.session_repo.create(&session).await?;
        }
        Ok(())
    }

    /// Returns the number of sessions removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::issue(user_id, Duration::days(self.session_expiration_days));
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid && email.len() <= 255 {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError("Некорректный адрес электронной почты".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{fixtures, SqlxSessionRepository, SqlxUserRepository};
    use crate::db::DynDatabasePool;
    use chrono::Utc;

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = fixtures::migrated_pool().await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    const PASSWORD: &str = "volga-river-2024";

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let (_pool, service) = setup_test_service().await;

        let first = service
            .register(RegisterInput::new("ivan", "Ivan@Example.com", PASSWORD))
            .await
            .unwrap();
        let second = service
            .register(RegisterInput::new("petr", "petr@example.com", PASSWORD))
            .await
            .unwrap();

        assert!(first.is_admin());
        assert_eq!(first.email, "ivan@example.com");
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_register_validation_and_conflicts() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("ivan", "ivan@example.com", PASSWORD))
            .await
            .unwrap();

        let bad_name = service.register(RegisterInput::new("iv", "a@example.com", PASSWORD)).await;
        assert!(matches!(bad_name, Err(UserServiceError::ValidationError(_))));

        let bad_email = service.register(RegisterInput::new("anna", "anna", PASSWORD)).await;
        assert!(matches!(bad_email, Err(UserServiceError::ValidationError(_))));

        let weak = service.register(RegisterInput::new("anna", "anna@example.com", "12345678")).await;
        assert!(matches!(weak, Err(UserServiceError::ValidationError(_))));

        let taken = service.register(RegisterInput::new("IVAN", "x@example.com", PASSWORD)).await;
        assert!(matches!(taken, Err(UserServiceError::Conflict(_))));

        let email_taken = service.register(RegisterInput::new("anna", "IVAN@example.com", PASSWORD)).await;
        assert!(matches!(email_taken, Err(UserServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_validate_logout() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("ivan", "ivan@example.com", PASSWORD))
            .await
            .unwrap();

        let wrong = service.login(LoginInput::new("ivan", "nope")).await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        let session = service.login(LoginInput::new("ivan@example.com", PASSWORD)).await.unwrap();
        assert_eq!(session.user_id, user.id);
        assert!(session.expires_at > Utc::now() + Duration::days(13));

        let found = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let (pool, service) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("ivan", "ivan@example.com", PASSWORD))
            .await
            .unwrap();
        let sessions = SqlxSessionRepository::new(pool);
        let now = Utc::now();
        sessions
            .create(&Session {
                id: "stale".into(),
                user_id: user.id,
                expires_at: now - Duration::minutes(1),
                created_at: now - Duration::days(15),
            })
            .await
            .unwrap();

        assert!(service.validate_session("stale").await.unwrap().is_none());
        assert!(sessions.get_by_id("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_banned_user_cannot_login() {
        let (pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("ivan", "ivan@example.com", PASSWORD))
            .await
            .unwrap();
        sqlx::query("UPDATE users SET status = 'banned'")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let result = service.login(LoginInput::new("ivan", PASSWORD)).await;
        assert!(matches!(result, Err(UserServiceError::AuthenticationError(_))));
    }

    #[tokio::test]
    async fn test_change_password_keeps_current_session_only() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("ivan", "ivan@example.com", PASSWORD))
            .await
            .unwrap();
        let here = service.login(LoginInput::new("ivan", PASSWORD)).await.unwrap();
        let elsewhere = service.login(LoginInput::new("ivan", PASSWORD)).await.unwrap();

        let wrong = service
            .change_password(user.id, "bad", "new-secret-pass", Some(&here.id))
            .await;
        assert!(matches!(wrong, Err(UserServiceError::AuthenticationError(_))));

        service
            .change_password(user.id, PASSWORD, "new-secret-pass", Some(&here.id))
            .await
            .unwrap();

        assert!(service.validate_session(&here.id).await.unwrap().is_some());
        assert!(service.validate_session(&elsewhere.id).await.unwrap().is_none());
        assert!(service.login(LoginInput::new("ivan", "new-secret-pass")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_profile_rejects_foreign_email() {
        let (_pool, service) = setup_test_service().await;
        let ivan = service
            .register(RegisterInput::new("ivan", "ivan@example.com", PASSWORD))
            .await
            .unwrap();
        service
            .register(RegisterInput::new("petr", "petr@example.com", PASSWORD))
            .await
            .unwrap();

        let taken = service
            .update_profile(
                ivan.id,
                UpdateProfileInput {
                    email: "petr@example.com".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(UserServiceError::Conflict(_))));

        let updated = service
            .update_profile(
                ivan.id,
                UpdateProfileInput {
                    email: "ivan@example.com".into(),
                    first_name: "Иван".into(),
                    last_name: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name(), "Иван");
    }
}
