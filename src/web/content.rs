//! Landing page, news feed and blog

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Router,
};
use serde::Deserialize;
use tera::Context;

use super::{see_other, PageContext, WebResult};
use crate::api::middleware::{client_ip, AppState};

const LANDING_NEWS: usize = 3;

pub fn news_router() -> Router<AppState> {
    Router::new()
        .route("/news", get(news))
        .route("/news/", get(news))
}

pub fn blog_router() -> Router<AppState> {
    Router::new()
        .route("/blog", get(blog))
        .route("/blog/", get(blog))
        .route("/blog/{id}", get(article))
}

pub async fn index(State(state): State<AppState>, page: PageContext) -> WebResult {
    if page.user.is_some() {
        return Ok(see_other("/city/all/list"));
    }
    let mut news = state.news_service.list(1).await?.items;
    news.truncate(LANDING_NEWS);

    let mut ctx = Context::new();
    ctx.insert("news", &news);
    page.render("index.html", &ctx)
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub tag: Option<String>,
}

async fn news(State(state): State<AppState>, page: PageContext, Query(query): Query<PageQuery>) -> WebResult {
    let mut ctx = Context::new();
    ctx.insert("page", &state.news_service.list(query.page.unwrap_or(1)).await?);
    ctx.insert("base_query", "");
    page.render("news/list.html", &ctx)
}

async fn blog(State(state): State<AppState>, page: PageContext, Query(query): Query<PageQuery>) -> WebResult {
    let include_drafts = page.user.as_ref().is_some_and(|u| u.is_admin());
    let tag = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let articles = state
        .blog_service
        .list(include_drafts, tag, query.page.unwrap_or(1))
        .await?;

    let mut ctx = Context::new();
    ctx.insert("page", &articles);
    ctx.insert("tags", &state.blog_service.list_tags().await?);
    ctx.insert("tag", &tag);
    ctx.insert(
        "base_query",
        &tag.map(|t| format!("tag={}&", urlencoding::encode(t)))
            .unwrap_or_default(),
    );
    page.render("blog/list.html", &ctx)
}

async fn article(
    State(state): State<AppState>,
    page: PageContext,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> WebResult {
    let include_drafts = page.user.as_ref().is_some_and(|u| u.is_admin());
    let mut article = state.blog_service.get(id, include_drafts).await?;

    let ip = client_ip(&headers).map(|ip| ip.to_string()).unwrap_or_default();
    let viewer = page.user.as_ref().map(|u| u.id);
    if state.blog_service.record_view(id, viewer, &ip).await? {
        article.article.views += 1;
    }

    let mut ctx = Context::new();
    ctx.insert("article", &article);
    page.render("blog/article.html", &ctx)
}
