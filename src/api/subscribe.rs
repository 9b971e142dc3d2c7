//! Subscription API endpoint
//!
//! - POST /api/subscribe `{to_id, action}` - Follow or unfollow a user

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::SubscribeAction;

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub to_id: i64,
    pub action: SubscribeAction,
}

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub subscribed: bool,
}

pub async fn subscribe(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let subscribed = state
        .subscribe_service
        .apply(user.id, body.to_id, body.action)
        .await?;
    Ok(Json(SubscribeResponse { subscribed }))
}
