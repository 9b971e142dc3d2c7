//! Region API endpoints
//!
//! - GET /api/region/list - Regions with the user's visited-city counts

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::RegionProgress;
use crate::services::{parse_key, RegionFilter, RegionSort};

#[derive(Debug, Deserialize)]
pub struct RegionListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/list", get(list))
}

async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<RegionListQuery>,
) -> Result<Json<Vec<RegionProgress>>, ApiError> {
    let filter: Option<RegionFilter> = parse_key(query.filter.as_deref())?;
    let sort: RegionSort = parse_key(query.sort.as_deref())?.unwrap_or_default();
    Ok(Json(state.region_service.list_regions(user.id, filter, sort).await?))
}
