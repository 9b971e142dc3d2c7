//! City map API endpoints
//!
//! - GET /api/city/visited - Visited-city markers of the current user
//! - GET /api/city/not_visited - Cities the user has not been to
//! - GET /api/city/visited/subscriptions?ids=1,2 - Markers of followed users
//! - GET /api/city/list_by_region?region_id= - Cities of a region (public)

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{City, VisitedCitySummary};
use crate::services::{parse_key, VisitFilter, VisitSort};

#[derive(Debug, Deserialize)]
pub struct VisitedQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    /// Comma-separated user ids
    pub ids: String,
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    pub region_id: i64,
}

/// Visited city tagged with the user it belongs to
#[derive(Debug, Serialize)]
pub struct SubscriptionMarker {
    pub user_id: i64,
    #[serde(flatten)]
    pub city: VisitedCitySummary,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/list_by_region", get(list_by_region))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/visited", get(visited))
        .route("/not_visited", get(not_visited))
        .route("/visited/subscriptions", get(subscriptions))
}

async fn visited(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<VisitedQuery>,
) -> Result<Json<Vec<VisitedCitySummary>>, ApiError> {
    let filter: Option<VisitFilter> = parse_key(query.filter.as_deref())?;
    let sort: VisitSort = parse_key(query.sort.as_deref())?.unwrap_or_default();
    let cities = state.city_service.list_visited(user.id, filter, sort).await?;
    Ok(Json(cities))
}

async fn not_visited(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<City>>, ApiError> {
    Ok(Json(state.city_service.list_not_visited(user.id).await?))
}

async fn subscriptions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<SubscriptionsQuery>,
) -> Result<Json<Vec<SubscriptionMarker>>, ApiError> {
    let ids = parse_ids(&query.ids)?;
    let markers = state
        .subscribe_service
        .followed_cities(user.id, &ids)
        .await?
        .into_iter()
        .map(|(user_id, city)| SubscriptionMarker { user_id, city })
        .collect();
    Ok(Json(markers))
}

async fn list_by_region(
    State(state): State<AppState>,
    Query(query): Query<RegionQuery>,
) -> Result<Json<Vec<City>>, ApiError> {
    Ok(Json(state.city_service.cities_of_region(query.region_id).await?))
}

/// `1,2, 3` → `[1, 2, 3]`; blanks are skipped, duplicates dropped
fn parse_ids(raw: &str) -> Result<Vec<i64>, ApiError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = part
            .parse::<i64>()
            .map_err(|_| ApiError::validation_error(format!("Некорректный идентификатор: {}", part)))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        return Err(ApiError::validation_error("Не указаны пользователи"));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids("1,2, 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ids("4,,4").unwrap(), vec![4]);
        assert!(parse_ids("").is_err());
        assert!(parse_ids("1,x").is_err());
    }
}
