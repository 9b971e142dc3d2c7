//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::dialect::InsertId;
use crate::db::DynDatabasePool;
use crate::models::{UpdateProfileInput, User};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, status, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return it with its new id
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Case-insensitive lookup by username or email, as typed on the sign-in form
    async fn get_by_login(&self, login: &str) -> Result<Option<User>>;

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> Result<()>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository, SQLite or MySQL
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE LOWER({}) = LOWER(?)", USER_COLUMNS, column);
        let user = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, User>(&sql)
                .bind(value)
                .fetch_optional(p)
                .await
                .with_context(|| format!("Failed to get user by {}", column))?
        });
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let sql = "INSERT INTO users (username, email, password_hash, first_name, last_name, role, status, created_at, updated_at) \
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(user.role.to_string())
                .bind(user.status.to_string())
                .bind(user.created_at)
                .bind(user.updated_at)
                .execute(p)
                .await
                .context("Failed to create user")?
                .insert_id()
        });

        Ok(User { id, ..user.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get user by ID")?
        });
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_by("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        match self.get_by_username(login).await? {
            Some(user) => Ok(Some(user)),
            None => self.get_by_email(login).await,
        }
    }

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> Result<()> {
        let sql = "UPDATE users SET email = ?, first_name = ?, last_name = ?, updated_at = ? WHERE id = ?";
        with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(input.email.trim())
                .bind(input.first_name.trim())
                .bind(input.last_name.trim())
                .bind(Utc::now())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update user profile")?;
        });
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let sql = "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?";
        with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update password")?;
        });
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = with_pool!(self.pool, |p| {
            sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(p)
                .await
                .context("Failed to count users")?
        });
        Ok(count)
    }
}
