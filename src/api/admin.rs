//! Admin API endpoints
//!
//! Reference data and content management, admin role required:
//! - GET /api/admin/dashboard - Counters
//! - /api/admin/areas, /regions, /cities - Geography CRUD
//! - /api/admin/collections - Curated collections
//! - /api/admin/news, /blog/articles, /blog/tags - Content
//! - /api/admin/advertisement - Ad-free exceptions
//!
//! Creation answers 201 with the stored row, updates and deletions 204.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    AdminDashboard, AdvertisementException, AdvertisementExceptionInput, Area, AreaInput, BlogArticle,
    BlogArticleInput, BlogArticleWithTags, BlogTag, BlogTagInput, City, CityInput, Collection, CollectionInput,
    News, NewsInput, Page, Region, RegionInput,
};

type Created<T> = Result<(StatusCode, Json<T>), ApiError>;
type NoContent = Result<StatusCode, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/areas", get(list_areas).post(create_area))
        .route("/areas/{id}", axum::routing::put(update_area).delete(delete_area))
        .route("/regions", get(list_regions).post(create_region))
        .route("/regions/{id}", get(get_region).put(update_region).delete(delete_region))
        .route("/cities", axum::routing::post(create_city))
        .route("/cities/{id}", get(get_city).put(update_city).delete(delete_city))
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/{id}", axum::routing::put(update_collection).delete(delete_collection))
        .route("/news", get(list_news).post(create_news))
        .route("/news/{id}", axum::routing::put(update_news).delete(delete_news))
        .route("/blog/articles", get(list_articles).post(create_article))
        .route(
            "/blog/articles/{id}",
            get(get_article).put(update_article).delete(delete_article),
        )
        .route("/blog/tags", get(list_tags).post(create_tag))
        .route("/blog/tags/{id}", axum::routing::put(update_tag).delete(delete_tag))
        .route("/advertisement", get(list_exceptions).post(create_exception))
        .route(
            "/advertisement/{id}",
            axum::routing::put(update_exception).delete(delete_exception),
        )
}

fn created<T>(value: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(value)))
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<AdminDashboard>, ApiError> {
    Ok(Json(state.statistics_service.admin_dashboard().await?))
}

// Areas

async fn list_areas(State(state): State<AppState>) -> Result<Json<Vec<Area>>, ApiError> {
    Ok(Json(state.geo_service.list_areas().await?))
}

async fn create_area(State(state): State<AppState>, Json(input): Json<AreaInput>) -> Created<Area> {
    created(state.geo_service.create_area(input).await?)
}

async fn update_area(State(state): State<AppState>, Path(id): Path<i64>, Json(input): Json<AreaInput>) -> NoContent {
    state.geo_service.update_area(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_area(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.geo_service.delete_area(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Regions

async fn list_regions(State(state): State<AppState>) -> Result<Json<Vec<Region>>, ApiError> {
    Ok(Json(state.geo_service.list_regions().await?))
}

async fn get_region(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Region>, ApiError> {
    Ok(Json(state.geo_service.get_region(id).await?))
}

async fn create_region(State(state): State<AppState>, Json(input): Json<RegionInput>) -> Created<Region> {
    created(state.geo_service.create_region(input).await?)
}

async fn update_region(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<RegionInput>,
) -> NoContent {
    state.geo_service.update_region(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_region(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.geo_service.delete_region(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Cities

async fn get_city(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<City>, ApiError> {
    Ok(Json(state.geo_service.get_city(id).await?))
}

async fn create_city(State(state): State<AppState>, Json(input): Json<CityInput>) -> Created<City> {
    created(state.geo_service.create_city(input).await?)
}

async fn update_city(State(state): State<AppState>, Path(id): Path<i64>, Json(input): Json<CityInput>) -> NoContent {
    state.geo_service.update_city(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_city(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.geo_service.delete_city(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Collections

async fn list_collections(State(state): State<AppState>) -> Result<Json<Vec<Collection>>, ApiError> {
    Ok(Json(state.collection_service.list_all().await?))
}

async fn create_collection(
    State(state): State<AppState>,
    Json(input): Json<CollectionInput>,
) -> Created<Collection> {
    created(state.collection_service.create(input).await?)
}

async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<CollectionInput>,
) -> NoContent {
    state.collection_service.update(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_collection(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.collection_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// News

async fn list_news(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Result<Json<Page<News>>, ApiError> {
    Ok(Json(state.news_service.list(query.page).await?))
}

async fn create_news(State(state): State<AppState>, Json(input): Json<NewsInput>) -> Created<News> {
    created(state.news_service.create(input).await?)
}

async fn update_news(State(state): State<AppState>, Path(id): Path<i64>, Json(input): Json<NewsInput>) -> NoContent {
    state.news_service.update(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_news(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.news_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Blog

async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<BlogArticleWithTags>>, ApiError> {
    Ok(Json(state.blog_service.list(true, None, query.page).await?))
}

async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BlogArticleWithTags>, ApiError> {
    Ok(Json(state.blog_service.get(id, true).await?))
}

async fn create_article(
    State(state): State<AppState>,
    Json(input): Json<BlogArticleInput>,
) -> Created<BlogArticle> {
    created(state.blog_service.create_article(input).await?)
}

async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<BlogArticleInput>,
) -> NoContent {
    state.blog_service.update_article(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_article(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.blog_service.delete_article(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<BlogTag>>, ApiError> {
    Ok(Json(state.blog_service.list_tags().await?))
}

async fn create_tag(State(state): State<AppState>, Json(input): Json<BlogTagInput>) -> Created<BlogTag> {
    created(state.blog_service.create_tag(input).await?)
}

async fn update_tag(State(state): State<AppState>, Path(id): Path<i64>, Json(input): Json<BlogTagInput>) -> NoContent {
    state.blog_service.update_tag(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_tag(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.blog_service.delete_tag(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Advertisement exceptions

async fn list_exceptions(State(state): State<AppState>) -> Result<Json<Vec<AdvertisementException>>, ApiError> {
    Ok(Json(state.advertisement_service.list().await?))
}

async fn create_exception(
    State(state): State<AppState>,
    Json(input): Json<AdvertisementExceptionInput>,
) -> Created<AdvertisementException> {
    created(state.advertisement_service.create(input).await?)
}

async fn update_exception(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<AdvertisementExceptionInput>,
) -> NoContent {
    state.advertisement_service.update(id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_exception(State(state): State<AppState>, Path(id): Path<i64>) -> NoContent {
    state.advertisement_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
