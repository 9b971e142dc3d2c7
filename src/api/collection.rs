//! Collection API endpoints
//!
//! - GET /api/collection/{id}/cities - Cities of a collection with visit flags

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CollectionCity, CollectionProgress};

#[derive(Debug, Serialize)]
pub struct CollectionCitiesResponse {
    pub collection: CollectionProgress,
    pub cities: Vec<CollectionCity>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/cities", get(cities))
}

async fn cities(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<CollectionCitiesResponse>, ApiError> {
    let (collection, cities) = state.collection_service.cities(user.id, id).await?;
    Ok(Json(CollectionCitiesResponse { collection, cities }))
}
