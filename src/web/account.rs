//! Account pages: sign up, sign in/out, profile, password, statistics and
//! share settings

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tera::Context;

use super::{checked, safe_next, see_other, PageContext, WebError, WebResult};
use crate::api::auth::sign_in;
use crate::api::middleware::{extract_session_token, AppState, CLEAR_SESSION_COOKIE};
use crate::models::{ShareSettingsInput, UpdateProfileInput};
use crate::services::{RegisterInput, ServiceError, UserServiceError};

const HOME: &str = "/city/all/list";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(signup_form).post(signup))
        .route("/signin", get(signin_form).post(signin))
        .route("/signout", post(signout))
        .route("/profile", get(profile_form).post(profile))
        .route("/password", get(password_form).post(password))
        .route("/stats", get(stats))
        .route("/share", get(share_form).post(share))
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing)]
    pub password2: String,
}

async fn signup_form(page: PageContext) -> WebResult {
    if page.user.is_some() {
        return Ok(see_other(HOME));
    }
    render_signup(&page, &SignupForm::default(), &[])
}

fn render_signup(page: &PageContext, form: &SignupForm, errors: &[String]) -> WebResult {
    let mut ctx = Context::new();
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    page.render("account/signup.html", &ctx)
}

async fn signup(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Form(form): Form<SignupForm>,
) -> WebResult {
    if form.password != form.password2 {
        return render_signup(&page, &form, &["Пароли не совпадают".to_string()]);
    }

    let input = RegisterInput::new(&form.username, &form.email, &form.password);
    match state.user_service.register(input).await {
        Ok(_) => {}
        Err(UserServiceError::ValidationError(msg)) | Err(UserServiceError::Conflict(msg)) => {
            return render_signup(&page, &form, &[msg]);
        }
        Err(e) => return Err(e.into()),
    }

    let session = sign_in(&state, &headers, &form.username, &form.password)
        .await
        .map_err(|e| {
            tracing::error!("Sign-in after registration failed: {}", e.error.message);
            WebError::Page {
                status: e.status(),
                message: e.error.message,
            }
        })?;
    let cookie = state.session_cookie(&session.id);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(HOME)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SigninQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SigninForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

async fn signin_form(page: PageContext, Query(query): Query<SigninQuery>) -> WebResult {
    let next = safe_next(query.next.as_deref(), HOME);
    if page.user.is_some() {
        return Ok(see_other(&next));
    }
    render_signin(&page, "", &next, None)
}

fn render_signin(page: &PageContext, username: &str, next: &str, error: Option<&str>) -> WebResult {
    let mut ctx = Context::new();
    ctx.insert("username", username);
    ctx.insert("next", next);
    ctx.insert("error", &error);
    page.render("account/signin.html", &ctx)
}

async fn signin(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Form(form): Form<SigninForm>,
) -> WebResult {
    let next = safe_next(form.next.as_deref(), HOME);
    match sign_in(&state, &headers, &form.username, &form.password).await {
        Ok(session) => {
            let cookie = state.session_cookie(&session.id);
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&next)).into_response())
        }
        Err(e) if e.status() == StatusCode::INTERNAL_SERVER_ERROR => Err(WebError::Page {
            status: e.status(),
            message: e.error.message,
        }),
        Err(e) => {
            let mut response = render_signin(&page, &form.username, &next, Some(&e.error.message))?;
            *response.status_mut() = e.status();
            Ok(response)
        }
    }
}

async fn signout(State(state): State<AppState>, headers: HeaderMap) -> WebResult {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok(([(header::SET_COOKIE, CLEAR_SESSION_COOKIE)], Redirect::to("/")).into_response())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

async fn profile_form(State(state): State<AppState>, page: PageContext) -> WebResult {
    let user = page.require_user()?;
    let form = ProfileForm {
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
    };
    render_profile(&state, &page, &form, &[], false).await
}

async fn render_profile(
    state: &AppState,
    page: &PageContext,
    form: &ProfileForm,
    errors: &[String],
    saved: bool,
) -> WebResult {
    let user = page.require_user()?;
    let mut ctx = Context::new();
    ctx.insert("form", form);
    ctx.insert("errors", errors);
    ctx.insert("saved", &saved);
    ctx.insert("username", &user.username);
    ctx.insert("subscriptions", &state.subscribe_service.subscriptions(user.id).await?);
    ctx.insert("subscribers", &state.subscribe_service.subscribers(user.id).await?);
    page.render("account/profile.html", &ctx)
}

async fn profile(State(state): State<AppState>, page: PageContext, Form(form): Form<ProfileForm>) -> WebResult {
    let user = page.require_user()?;
    let input = UpdateProfileInput {
        email: form.email.clone(),
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
    };
    match state.user_service.update_profile(user.id, input).await {
        Ok(_) => render_profile(&state, &page, &form, &[], true).await,
        Err(UserServiceError::ValidationError(msg)) | Err(UserServiceError::Conflict(msg)) => {
            render_profile(&state, &page, &form, &[msg], false).await
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub new_password2: String,
}

async fn password_form(page: PageContext) -> WebResult {
    page.require_user()?;
    render_password(&page, &[], false)
}

fn render_password(page: &PageContext, errors: &[String], saved: bool) -> WebResult {
    let mut ctx = Context::new();
    ctx.insert("errors", errors);
    ctx.insert("saved", &saved);
    page.render("account/password.html", &ctx)
}

async fn password(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Form(form): Form<PasswordForm>,
) -> WebResult {
    let user = page.require_user()?;
    if form.new_password != form.new_password2 {
        return render_password(&page, &["Пароли не совпадают".to_string()], false);
    }

    let token = extract_session_token(&headers);
    match state
        .user_service
        .change_password(user.id, &form.current, &form.new_password, token.as_deref())
        .await
    {
        Ok(()) => {
            tracing::info!(user_id = user.id, "Password changed");
            render_password(&page, &[], true)
        }
        Err(UserServiceError::AuthenticationError(msg)) | Err(UserServiceError::ValidationError(msg)) => {
            render_password(&page, &[msg], false)
        }
        Err(e) => Err(e.into()),
    }
}

async fn stats(State(state): State<AppState>, page: PageContext) -> WebResult {
    let user = page.require_user()?;
    let mut ctx = Context::new();
    ctx.insert("stats", &state.statistics_service.user_statistics(user.id).await?);
    ctx.insert("owner_name", &user.display_name());
    page.render("account/stats.html", &ctx)
}

#[derive(Debug, Deserialize)]
pub struct ShareForm {
    pub can_share: Option<String>,
    pub can_share_dashboard: Option<String>,
    pub can_share_city_map: Option<String>,
    pub can_share_region_map: Option<String>,
    pub can_subscribe: Option<String>,
}

async fn share_form(State(state): State<AppState>, page: PageContext) -> WebResult {
    let user = page.require_user()?;
    let settings = state.share_service.settings(user.id).await?;
    render_share(&page, user.id, &settings, &[], false)
}

fn render_share<T: Serialize>(
    page: &PageContext,
    user_id: i64,
    settings: &T,
    errors: &[String],
    saved: bool,
) -> WebResult {
    let mut ctx = Context::new();
    ctx.insert("settings", settings);
    ctx.insert("errors", errors);
    ctx.insert("saved", &saved);
    ctx.insert("share_url", &format!("{}/share/{}", page.vars.base_url, user_id));
    page.render("account/share.html", &ctx)
}

async fn share(State(state): State<AppState>, page: PageContext, Form(form): Form<ShareForm>) -> WebResult {
    let user = page.require_user()?;
    let input = ShareSettingsInput {
        can_share: checked(&form.can_share),
        can_share_dashboard: checked(&form.can_share_dashboard),
        can_share_city_map: checked(&form.can_share_city_map),
        can_share_region_map: checked(&form.can_share_region_map),
        can_subscribe: checked(&form.can_subscribe),
    };
    match state.share_service.save(user.id, input.clone()).await {
        Ok(settings) => render_share(&page, user.id, &settings, &[], true),
        Err(ServiceError::ValidationError(msg)) => render_share(&page, user.id, &input, &[msg], false),
        Err(e) => Err(e.into()),
    }
}
