//! API middleware
//!
//! Contains:
//! - Shared application state
//! - Authentication (session token from cookie or bearer header)
//! - Authorization (admin access)
//! - The JSON error body and the mapping from service errors

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAdvertisementRepository, SqlxBlogRepository, SqlxCollectionRepository, SqlxGeoRepository,
    SqlxNewsRepository, SqlxSessionRepository, SqlxShareSettingsRepository, SqlxStatisticsRepository,
    SqlxSubscribeRepository, SqlxUserRepository, SqlxVisitedCityRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AdvertisementService, BlogService, CityService, CollectionService, GeoService, LoginRateLimiter, NewsService,
    RegionService, ReportService, ServiceError, ShareService, StatisticsService, SubscribeService, UserService,
    UserServiceError,
};
use crate::templates::TemplateEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub templates: Arc<TemplateEngine>,
    pub cache: Arc<MemoryCache>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub user_service: Arc<UserService>,
    pub city_service: Arc<CityService>,
    pub region_service: Arc<RegionService>,
    pub statistics_service: Arc<StatisticsService>,
    pub collection_service: Arc<CollectionService>,
    pub news_service: Arc<NewsService>,
    pub blog_service: Arc<BlogService>,
    pub share_service: Arc<ShareService>,
    pub subscribe_service: Arc<SubscribeService>,
    pub advertisement_service: Arc<AdvertisementService>,
    pub geo_service: Arc<GeoService>,
    pub report_service: Arc<ReportService>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, config: Config, templates: TemplateEngine, cache: Arc<MemoryCache>) -> Self {
        let users = SqlxUserRepository::boxed(pool.clone());
        let geo = SqlxGeoRepository::boxed(pool.clone());
        let visits = SqlxVisitedCityRepository::boxed(pool.clone());
        let stats = SqlxStatisticsRepository::boxed(pool.clone());
        let share_settings = SqlxShareSettingsRepository::boxed(pool.clone());

        let user_service = UserService::with_session_expiration(
            users.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            config.session.expiration_days,
        );

        Self {
            user_service: Arc::new(user_service),
            city_service: Arc::new(CityService::new(geo.clone(), visits.clone())),
            region_service: Arc::new(RegionService::new(geo.clone(), stats.clone())),
            statistics_service: Arc::new(StatisticsService::new(stats.clone(), geo.clone(), cache.clone())),
            collection_service: Arc::new(CollectionService::new(SqlxCollectionRepository::boxed(pool.clone()))),
            news_service: Arc::new(NewsService::new(SqlxNewsRepository::boxed(pool.clone()))),
            blog_service: Arc::new(BlogService::new(SqlxBlogRepository::boxed(pool.clone()))),
            share_service: Arc::new(ShareService::new(share_settings.clone(), users.clone())),
            subscribe_service: Arc::new(SubscribeService::new(
                SqlxSubscribeRepository::boxed(pool.clone()),
                share_settings,
                users.clone(),
                visits.clone(),
            )),
            advertisement_service: Arc::new(AdvertisementService::new(
                SqlxAdvertisementRepository::boxed(pool.clone()),
                users,
            )),
            geo_service: Arc::new(GeoService::new(geo, cache.clone())),
            report_service: Arc::new(ReportService::new(visits, stats)),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            templates: Arc::new(templates),
            config: Arc::new(config),
            cache,
            pool,
        }
    }

    /// `Set-Cookie` value for a fresh session
    pub fn session_cookie(&self, token: &str) -> String {
        let max_age = self.user_service.session_expiration_days() * 24 * 60 * 60;
        let secure = if self.config.session.secure_cookie { "; Secure" } else { "" };
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            SESSION_COOKIE, token, max_age, secure
        )
    }
}

pub const SESSION_COOKIE: &str = "session";

/// `Set-Cookie` value that drops the session cookie
pub const CLEAR_SESSION_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(what) => ApiError::not_found(format!("Не найдено: {}", what)),
            ServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::InternalError(e) => {
                tracing::error!("Request failed: {:#}", e);
                ApiError::internal_error("Внутренняя ошибка сервера")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::Conflict(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("Пользователь не найден"),
            UserServiceError::InternalError(e) => {
                tracing::error!("Request failed: {:#}", e);
                ApiError::internal_error("Внутренняя ошибка сервера")
            }
        }
    }
}

/// Extract session token from request headers; bearer wins over the cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|cookie| cookie.trim().strip_prefix("session="))
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Client address as reported by the reverse proxy
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next());
    let real_ip = headers.get("x-real-ip").and_then(|h| h.to_str().ok());
    forwarded.or(real_ip).and_then(|ip| ip.trim().parse().ok())
}

/// Authentication middleware
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}
