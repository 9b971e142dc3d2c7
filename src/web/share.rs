//! Public read-only pages a user chose to share

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use tera::Context;

use super::city::visited_map;
use super::region::region_rows;
use super::{PageContext, WebError, WebResult};
use crate::api::middleware::AppState;
use crate::models::SharePage;
use crate::services::{RegionSort, VisitSort};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}", get(default_page))
        .route("/{user_id}/{page}", get(named_page))
}

async fn default_page(State(state): State<AppState>, page: PageContext, Path(user_id): Path<i64>) -> WebResult {
    render(&state, &page, user_id, None).await
}

async fn named_page(
    State(state): State<AppState>,
    page: PageContext,
    Path((user_id, name)): Path<(i64, String)>,
) -> WebResult {
    let requested = name.parse::<SharePage>().map_err(|_| WebError::not_found())?;
    render(&state, &page, user_id, Some(requested)).await
}

async fn render(state: &AppState, page: &PageContext, owner_id: i64, requested: Option<SharePage>) -> WebResult {
    let view = state.share_service.shared_view(owner_id, requested).await?;
    let viewer = page.user.as_ref().map(|u| u.id);
    let can_subscribe = view.settings.can_subscribe && viewer.is_some_and(|v| v != owner_id);
    let subscribed = match viewer {
        Some(v) if can_subscribe => state.subscribe_service.is_subscribed(v, owner_id).await?,
        _ => false,
    };

    let mut ctx = Context::new();
    ctx.insert("owner_id", &owner_id);
    ctx.insert("owner_name", &view.owner.display_name());
    ctx.insert("settings", &view.settings);
    ctx.insert("current", view.page.as_str());
    ctx.insert("can_subscribe", &can_subscribe);
    ctx.insert("subscribed", &subscribed);

    let template = match view.page {
        SharePage::Dashboard => {
            ctx.insert("stats", &state.statistics_service.user_statistics(owner_id).await?);
            "share/dashboard.html"
        }
        SharePage::CityMap => {
            let cities = state
                .city_service
                .list_visited(owner_id, None, VisitSort::Default)
                .await?;
            ctx.insert("map_data", &visited_map(&cities));
            ctx.insert("cities", &cities);
            "share/city_map.html"
        }
        SharePage::RegionMap => {
            let regions = state
                .region_service
                .list_regions(owner_id, None, RegionSort::Default)
                .await?;
            ctx.insert("regions", &region_rows(regions));
            "share/region_map.html"
        }
    };
    page.render(template, &ctx)
}
