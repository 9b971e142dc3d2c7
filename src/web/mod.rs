//! HTML pages
//!
//! Server-rendered pages for accounts, visits, regions, collections, news,
//! blog, shared pages and report downloads. Handlers take a [`PageContext`]
//! and return [`WebError`] on failure; the [`render_error_pages`] layer turns
//! those errors into `error.html`.

pub mod account;
pub mod city;
pub mod collection;
pub mod content;
pub mod region;
pub mod report;
pub mod share;
pub mod static_files;

use axum::{
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{request::Parts, Extensions, StatusCode, Uri},
    middleware::{self as axum_middleware, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tera::Context;

use crate::api::middleware::{optional_auth, AppState, AuthenticatedUser};
use crate::models::{ParseEnumError, User};
use crate::services::{parse_key, ServiceError, UserServiceError};
use crate::templates::{PageVars, TemplateEngine, TemplateError, TemplateUser};

/// Build the HTML router
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(content::index))
        .nest("/account", account::router())
        .nest("/city", city::router())
        .nest("/region", region::router())
        .merge(collection::router())
        .merge(content::news_router())
        .merge(content::blog_router())
        .nest("/share", share::router())
        .route("/report/download", get(report::download))
        .route("/static/{*path}", get(static_files::serve_static))
        .fallback(not_found)
        .layer(axum_middleware::from_fn_with_state(state.clone(), render_error_pages))
        .layer(axum_middleware::from_fn_with_state(state, optional_auth))
}

async fn not_found() -> WebError {
    WebError::not_found()
}

/// Failure of an HTML handler
#[derive(Debug)]
pub enum WebError {
    /// Page needs a signed-in user; `next` is where to come back to
    SignIn { next: String },
    Page { status: StatusCode, message: String },
}

impl WebError {
    pub fn not_found() -> Self {
        Self::Page {
            status: StatusCode::NOT_FOUND,
            message: "Страница не найдена".to_string(),
        }
    }

    fn internal() -> Self {
        Self::Page {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Внутренняя ошибка сервера".to_string(),
        }
    }
}

/// Marker the error-page layer picks up from a response
#[derive(Debug, Clone)]
struct ErrorPage {
    status: StatusCode,
    message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::SignIn { next } => {
                Redirect::to(&format!("/account/signin?next={}", urlencoding::encode(&next))).into_response()
            }
            WebError::Page { status, message } => {
                let mut response = (status, message.clone()).into_response();
                response.extensions_mut().insert(ErrorPage { status, message });
                response
            }
        }
    }
}

impl From<ServiceError> for WebError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(_) => WebError::not_found(),
            ServiceError::ValidationError(message) => WebError::Page {
                status: StatusCode::BAD_REQUEST,
                message,
            },
            ServiceError::Forbidden(message) => WebError::Page {
                status: StatusCode::FORBIDDEN,
                message,
            },
            ServiceError::Conflict(message) => WebError::Page {
                status: StatusCode::CONFLICT,
                message,
            },
            ServiceError::InternalError(e) => {
                tracing::error!("Page failed: {:#}", e);
                WebError::internal()
            }
        }
    }
}

impl From<UserServiceError> for WebError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound => WebError::not_found(),
            UserServiceError::InternalError(e) => {
                tracing::error!("Page failed: {:#}", e);
                WebError::internal()
            }
            other => WebError::Page {
                status: StatusCode::BAD_REQUEST,
                message: other.to_string(),
            },
        }
    }
}

impl From<TemplateError> for WebError {
    fn from(e: TemplateError) -> Self {
        tracing::error!("Template failed: {}", e);
        WebError::internal()
    }
}

pub type WebResult<T = Response> = Result<T, WebError>;

fn page_vars(state: &AppState, path: &str, user: Option<&User>, show_ads: bool) -> PageVars {
    PageVars {
        site_name: state.config.site.name.clone(),
        base_url: state.config.site.base_url.clone(),
        request_path: path.to_string(),
        year: Utc::now().year(),
        current_user: user.map(|u| TemplateUser {
            id: u.id,
            username: u.username.clone(),
            is_admin: u.is_admin(),
        }),
        show_ads,
    }
}

/// Request URI including the prefix of any `nest` it was routed through
fn original_uri(extensions: &Extensions, uri: &Uri) -> Uri {
    extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| uri.clone())
}

/// Render [`WebError::Page`] responses as `error.html`
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone());
    let path = original_uri(request.extensions(), request.uri()).path().to_string();

    let mut response = next.run(request).await;
    let Some(page) = response.extensions_mut().remove::<ErrorPage>() else {
        return response;
    };

    let vars = page_vars(&state, &path, user.as_ref(), false);
    let mut ctx = Context::new();
    ctx.insert("status", &page.status.as_u16());
    ctx.insert("message", &page.message);
    match state.templates.render_page("error.html", &ctx, &vars) {
        Ok(html) => (page.status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error page: {}", e);
            (page.status, page.message).into_response()
        }
    }
}

/// Per-request page state: the visitor and the shared template variables
pub struct PageContext {
    pub user: Option<User>,
    pub vars: PageVars,
    path_and_query: String,
    templates: Arc<TemplateEngine>,
}

impl FromRequestParts<AppState> for PageContext {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|u| u.0.clone());
        let show_ads = state
            .advertisement_service
            .show_ads(user.as_ref().map(|u| u.id))
            .await?;
        let uri = original_uri(&parts.extensions, &parts.uri);
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            vars: page_vars(state, uri.path(), user.as_ref(), show_ads),
            user,
            path_and_query,
            templates: state.templates.clone(),
        })
    }
}

impl PageContext {
    /// The signed-in user, or a redirect to the sign-in form
    pub fn require_user(&self) -> Result<&User, WebError> {
        self.user.as_ref().ok_or_else(|| WebError::SignIn {
            next: self.path_and_query.clone(),
        })
    }

    pub fn render(&self, template: &str, context: &Context) -> WebResult {
        let html = self.templates.render_page(template, context, &self.vars)?;
        Ok(Html(html).into_response())
    }
}

/// Redirect after a successful form post
pub fn see_other(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/// Key and caption of a filter or sort option
#[derive(Debug, Serialize)]
pub struct Choice {
    pub key: &'static str,
    pub label: &'static str,
}

pub(crate) fn choices(items: &[(&'static str, &'static str)]) -> Vec<Choice> {
    items.iter().map(|&(key, label)| Choice { key, label }).collect()
}

/// Query-string key for an HTML list, with the key echoed back for the
/// page. Unknown keys fall back to the default.
pub(crate) fn lenient_key<T>(value: Option<&str>) -> (Option<T>, Option<&str>)
where
    T: FromStr<Err = ParseEnumError>,
{
    match parse_key(value) {
        Ok(Some(parsed)) => (Some(parsed), value.map(str::trim)),
        _ => (None, None),
    }
}

/// Marker for the Leaflet map script
#[derive(Debug, Serialize)]
pub struct MapPoint {
    pub id: i64,
    pub title: String,
    pub lat: f64,
    pub lon: f64,
}

/// Contents of the `map-data` block a map page embeds
#[derive(Debug, Default, Serialize)]
pub struct MapData {
    pub visited: Vec<MapPoint>,
    pub not_visited: Vec<MapPoint>,
}

impl MapData {
    /// Split markers by whether the city has visits
    pub(crate) fn split<T>(items: &[T], point: impl Fn(&T) -> (MapPoint, bool)) -> Self {
        let mut data = Self::default();
        for item in items {
            match point(item) {
                (p, true) => data.visited.push(p),
                (p, false) => data.not_visited.push(p),
            }
        }
        data
    }
}

/// Checkbox fields arrive as `on` when ticked and are absent otherwise
pub(crate) fn checked(value: &Option<String>) -> bool {
    value
        .as_deref()
        .is_some_and(|v| !matches!(v.trim(), "" | "off" | "0" | "false"))
}

pub(crate) fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `YYYY-MM-DD` from a date input; empty means no date
pub(crate) fn parse_date(value: &str) -> Result<Option<NaiveDate>, String> {
    match value.trim() {
        "" => Ok(None),
        v => NaiveDate::parse_from_str(v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("Некорректная дата: {}", v)),
    }
}

/// Same-site path to return to after signing in
pub(crate) fn safe_next(next: Option<&str>, default: &str) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests;
