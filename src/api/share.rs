//! Shared map data
//!
//! - GET /api/share/{user_id}/cities - Visited cities, when the city map is shared
//! - GET /api/share/{user_id}/regions - Region progress, when the region map is shared
//!
//! Pages the owner did not share answer 404.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{RegionProgress, SharePage, VisitedCitySummary};
use crate::services::{RegionSort, VisitSort};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}/cities", get(cities))
        .route("/{user_id}/regions", get(regions))
}

async fn cities(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<VisitedCitySummary>>, ApiError> {
    let view = state
        .share_service
        .shared_view(user_id, Some(SharePage::CityMap))
        .await?;
    let cities = state
        .city_service
        .list_visited(view.owner.id, None, VisitSort::Default)
        .await?;
    Ok(Json(cities))
}

async fn regions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<RegionProgress>>, ApiError> {
    let view = state
        .share_service
        .shared_view(user_id, Some(SharePage::RegionMap))
        .await?;
    let regions = state
        .region_service
        .list_regions(view.owner.id, None, RegionSort::Default)
        .await?;
    Ok(Json(regions))
}
