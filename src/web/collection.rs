//! Collection pages: curated collections with progress, favorites and
//! personal collections

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tera::Context;

use super::{choices, lenient_key, see_other, MapData, MapPoint, PageContext, WebResult};
use crate::api::middleware::AppState;
use crate::models::{CollectionCity, PersonalCollectionInput};
use crate::services::{CollectionFilter, CollectionSort, ServiceError};

const FILTERS: &[(&str, &str)] = &[
    ("favorite", "Избранные"),
    ("started", "Начатые"),
    ("finished", "Завершённые"),
    ("not_started", "Не начатые"),
];

const SORTS: &[(&str, &str)] = &[
    ("default", "По умолчанию"),
    ("name_down", "По названию (А-Я)"),
    ("name_up", "По названию (Я-А)"),
    ("progress_down", "Сначала с большим прогрессом"),
    ("progress_up", "Сначала с меньшим прогрессом"),
];

/// Routes with their full paths; the list pages live at `/collection/`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/collection", get(list))
        .route("/collection/", get(list))
        .route("/collection/{id}/list", get(cities))
        .route("/collection/{id}/map", get(cities_map))
        .route("/collection/{id}/favorite", post(favorite))
        .route("/collection/personal", get(personal_list))
        .route("/collection/personal/", get(personal_list))
        .route("/collection/personal/create", get(personal_create_form).post(personal_create))
        .route("/collection/personal/{id}", get(personal_detail))
        .route("/collection/personal/{id}/edit", get(personal_edit_form).post(personal_edit))
        .route("/collection/personal/{id}/delete", post(personal_delete))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
}

async fn list(State(state): State<AppState>, page: PageContext, Query(query): Query<ListQuery>) -> WebResult {
    let user = page.require_user()?;
    let (filter, filter_key) = lenient_key::<CollectionFilter>(query.filter.as_deref());
    let (sort, sort_key) = lenient_key::<CollectionSort>(query.sort.as_deref());
    let collections = state
        .collection_service
        .list(user.id, filter, sort.unwrap_or_default())
        .await?;

    let mut ctx = Context::new();
    ctx.insert("collections", &collections);
    ctx.insert("filters", &choices(FILTERS));
    ctx.insert("sorts", &choices(SORTS));
    ctx.insert("filter", &filter_key);
    ctx.insert("sort", &sort_key.unwrap_or("default"));
    page.render("collection/list.html", &ctx)
}

async fn cities(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let (collection, cities) = state.collection_service.cities(user.id, id).await?;
    let mut ctx = Context::new();
    ctx.insert("collection", &collection);
    ctx.insert("cities", &cities);
    page.render("collection/cities.html", &ctx)
}

async fn cities_map(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let (collection, cities) = state.collection_service.cities(user.id, id).await?;
    let mut ctx = Context::new();
    ctx.insert("map_data", &collection_map(&cities));
    ctx.insert("collection", &collection);
    ctx.insert("cities", &cities);
    page.render("collection/map.html", &ctx)
}

fn collection_map(cities: &[CollectionCity]) -> MapData {
    MapData::split(cities, |c| {
        let point = MapPoint {
            id: c.id,
            title: c.title.clone(),
            lat: c.latitude,
            lon: c.longitude,
        };
        (point, c.visits > 0)
    })
}

async fn favorite(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let favorite = state.collection_service.toggle_favorite(user.id, id).await?;
    tracing::debug!(user_id = user.id, collection_id = id, favorite, "Favorite toggled");
    Ok(see_other("/collection/"))
}

async fn personal_list(State(state): State<AppState>, page: PageContext) -> WebResult {
    let user = page.require_user()?;
    let mut ctx = Context::new();
    ctx.insert("collections", &state.collection_service.list_personal(user.id).await?);
    page.render("collection/personal_list.html", &ctx)
}

#[derive(Debug, Serialize)]
struct CityOption {
    id: i64,
    title: String,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct RegionGroup {
    name: String,
    cities: Vec<CityOption>,
}

/// Submitted personal collection; cities arrive as `city_<id>` checkboxes
#[derive(Debug, Default, Serialize)]
struct PersonalForm {
    title: String,
    is_public: bool,
    #[serde(skip)]
    city_ids: BTreeSet<i64>,
}

impl PersonalForm {
    fn from_fields(fields: &HashMap<String, String>) -> Self {
        let city_ids = fields
            .keys()
            .filter_map(|key| key.strip_prefix("city_"))
            .filter_map(|id| id.parse().ok())
            .collect();
        Self {
            title: fields.get("title").cloned().unwrap_or_default(),
            is_public: fields.get("is_public").is_some_and(|v| v == "on"),
            city_ids,
        }
    }

    fn to_input(&self) -> PersonalCollectionInput {
        PersonalCollectionInput {
            title: self.title.clone(),
            is_public: self.is_public,
            city_ids: self.city_ids.iter().copied().collect(),
        }
    }
}

async fn render_personal_form(
    state: &AppState,
    page: &PageContext,
    form: &PersonalForm,
    collection_id: Option<i64>,
    errors: &[String],
) -> WebResult {
    let regions = state.region_service.list_all().await?;
    let mut cities = state.city_service.all_cities().await?;
    let mut groups = Vec::new();
    for region in regions {
        let (own, rest): (Vec<_>, Vec<_>) = cities.into_iter().partition(|c| c.region_id == region.id);
        cities = rest;
        if own.is_empty() {
            continue;
        }
        groups.push(RegionGroup {
            name: region.full_name(),
            cities: own
                .into_iter()
                .map(|c| CityOption {
                    selected: form.city_ids.contains(&c.id),
                    id: c.id,
                    title: c.title,
                })
                .collect(),
        });
    }

    let mut ctx = Context::new();
    ctx.insert("form", form);
    ctx.insert("groups", &groups);
    ctx.insert("collection_id", &collection_id);
    ctx.insert("errors", errors);
    page.render("collection/personal_form.html", &ctx)
}

async fn personal_create_form(State(state): State<AppState>, page: PageContext) -> WebResult {
    page.require_user()?;
    render_personal_form(&state, &page, &PersonalForm::default(), None, &[]).await
}

async fn personal_create(
    State(state): State<AppState>,
    page: PageContext,
    Form(fields): Form<HashMap<String, String>>,
) -> WebResult {
    let user = page.require_user()?;
    let form = PersonalForm::from_fields(&fields);
    match state.collection_service.create_personal(user.id, form.to_input()).await {
        Ok(collection) => Ok(see_other(&format!("/collection/personal/{}", collection.id))),
        Err(ServiceError::ValidationError(msg)) => render_personal_form(&state, &page, &form, None, &[msg]).await,
        Err(e) => Err(e.into()),
    }
}

async fn personal_detail(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let viewer = page.user.as_ref().map(|u| u.id);
    let (collection, cities) = state.collection_service.view_personal(viewer, id).await?;
    let visited = cities.iter().filter(|c| c.visits > 0).count();

    let mut ctx = Context::new();
    ctx.insert("is_owner", &(viewer == Some(collection.user_id)));
    ctx.insert("collection", &collection);
    ctx.insert("cities", &cities);
    ctx.insert("visited", &visited);
    ctx.insert("map_data", &collection_map(&cities));
    page.render("collection/personal_detail.html", &ctx)
}

async fn personal_edit_form(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let (collection, cities) = state.collection_service.view_personal(Some(user.id), id).await?;
    if collection.user_id != user.id {
        return Err(ServiceError::Forbidden("Это чужая коллекция".to_string()).into());
    }
    let form = PersonalForm {
        title: collection.title,
        is_public: collection.is_public,
        city_ids: cities.iter().map(|c: &CollectionCity| c.id).collect(),
    };
    render_personal_form(&state, &page, &form, Some(id), &[]).await
}

async fn personal_edit(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Form(fields): Form<HashMap<String, String>>,
) -> WebResult {
    let user = page.require_user()?;
    let form = PersonalForm::from_fields(&fields);
    match state
        .collection_service
        .update_personal(user.id, id, form.to_input())
        .await
    {
        Ok(()) => Ok(see_other(&format!("/collection/personal/{}", id))),
        Err(ServiceError::ValidationError(msg)) => {
            render_personal_form(&state, &page, &form, Some(id), &[msg]).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn personal_delete(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    state.collection_service.delete_personal(user.id, id).await?;
    Ok(see_other("/collection/personal/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_form_fields() {
        let fields: HashMap<String, String> = [
            ("title", "Север"),
            ("is_public", "on"),
            ("city_12", "on"),
            ("city_3", "on"),
            ("city_x", "on"),
            ("csrf", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let form = PersonalForm::from_fields(&fields);
        assert_eq!(form.title, "Север");
        assert!(form.is_public);
        assert_eq!(form.to_input().city_ids, vec![3, 12]);
    }
}
