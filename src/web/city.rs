//! Visited-city pages and the visit form

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tera::Context;

use super::{
    checked, choices, lenient_key, optional_text, parse_date, see_other, MapData, MapPoint, PageContext, WebResult,
};
use crate::api::middleware::AppState;
use crate::models::{City, VisitedCity, VisitedCityInput, VisitedCitySummary};
use crate::services::statistics::DEFAULT_NEIGHBOR_RADIUS;
use crate::services::{ServiceError, VisitFilter, VisitSort};

const FILTERS: &[(&str, &str)] = &[
    ("magnet", "С магнитом"),
    ("no_magnet", "Без магнита"),
    ("current_year", "В этом году"),
    ("last_year", "В прошлом году"),
];

const SORTS: &[(&str, &str)] = &[
    ("default", "По умолчанию"),
    ("name_down", "По названию (А-Я)"),
    ("name_up", "По названию (Я-А)"),
    ("date_down", "Сначала новые"),
    ("date_up", "Сначала старые"),
    ("rating_down", "Сначала с высокой оценкой"),
    ("rating_up", "Сначала с низкой оценкой"),
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/all/list", get(list))
        .route("/all/map", get(map))
        .route("/create", get(create_form).post(create))
        .route("/update/{visit_id}", get(update_form).post(update))
        .route("/delete/{visit_id}", post(delete))
        .route("/{city_id}", get(detail))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
}

async fn list(State(state): State<AppState>, page: PageContext, Query(query): Query<ListQuery>) -> WebResult {
    let user = page.require_user()?;
    let (filter, filter_key) = lenient_key::<VisitFilter>(query.filter.as_deref());
    let (sort, sort_key) = lenient_key::<VisitSort>(query.sort.as_deref());

    let mut ctx = Context::new();
    ctx.insert(
        "cities",
        &state
            .city_service
            .list_visited(user.id, filter, sort.unwrap_or_default())
            .await?,
    );
    ctx.insert("stats", &state.statistics_service.city_stats(user.id).await?);
    ctx.insert("filters", &choices(FILTERS));
    ctx.insert("sorts", &choices(SORTS));
    ctx.insert("filter", &filter_key);
    ctx.insert("sort", &sort_key.unwrap_or("default"));
    page.render("city/list.html", &ctx)
}

async fn map(State(state): State<AppState>, page: PageContext) -> WebResult {
    let user = page.require_user()?;
    let cities = state.city_service.list_visited(user.id, None, VisitSort::Default).await?;
    let mut ctx = Context::new();
    ctx.insert("map_data", &visited_map(&cities));
    ctx.insert("cities", &cities);
    ctx.insert("stats", &state.statistics_service.city_stats(user.id).await?);
    ctx.insert("subscriptions", &state.subscribe_service.subscriptions(user.id).await?);
    page.render("city/map.html", &ctx)
}

pub(crate) fn visited_map(cities: &[VisitedCitySummary]) -> MapData {
    MapData::split(cities, |c| {
        let point = MapPoint {
            id: c.city_id,
            title: c.city_title.clone(),
            lat: c.latitude,
            lon: c.longitude,
        };
        (point, true)
    })
}

/// Raw visit form; every field arrives as text
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VisitForm {
    #[serde(default)]
    pub region_id: String,
    #[serde(default)]
    pub city_id: String,
    #[serde(default)]
    pub date_of_visit: String,
    pub has_magnet: Option<String>,
    #[serde(default)]
    pub impression: String,
    #[serde(default)]
    pub rating: String,
}

impl VisitForm {
    fn from_visit(visit: &VisitedCity) -> Self {
        Self {
            region_id: visit.region_id.to_string(),
            city_id: visit.city_id.to_string(),
            date_of_visit: visit
                .date_of_visit
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            has_magnet: visit.has_magnet.then(|| "on".to_string()),
            impression: visit.impression.clone().unwrap_or_default(),
            rating: visit.rating.to_string(),
        }
    }

    fn to_input(&self) -> Result<VisitedCityInput, Vec<String>> {
        let mut errors = Vec::new();
        let city_id = self.city_id.trim().parse::<i64>().ok();
        if city_id.is_none() {
            errors.push("Выберите город".to_string());
        }
        let rating = self.rating.trim().parse::<i64>().ok();
        if rating.is_none() {
            errors.push("Поставьте оценку от 1 до 5".to_string());
        }
        let date_of_visit = parse_date(&self.date_of_visit).unwrap_or_else(|e| {
            errors.push(e);
            None
        });

        match (city_id, rating) {
            (Some(city_id), Some(rating)) if errors.is_empty() => Ok(VisitedCityInput {
                city_id,
                date_of_visit,
                has_magnet: checked(&self.has_magnet),
                impression: optional_text(&self.impression),
                rating,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Serialize)]
struct RegionOption {
    id: i64,
    name: String,
}

async fn render_form(
    state: &AppState,
    page: &PageContext,
    form: &VisitForm,
    visit_id: Option<i64>,
    errors: &[String],
) -> WebResult {
    let regions: Vec<RegionOption> = state
        .region_service
        .list_all()
        .await?
        .into_iter()
        .map(|r| RegionOption {
            id: r.id,
            name: r.full_name(),
        })
        .collect();
    let cities: Vec<City> = match form.region_id.trim().parse::<i64>() {
        Ok(region_id) => state.city_service.cities_of_region(region_id).await?,
        Err(_) => Vec::new(),
    };

    let mut ctx = Context::new();
    ctx.insert("form", form);
    ctx.insert("regions", &regions);
    ctx.insert("cities", &cities);
    ctx.insert("visit_id", &visit_id);
    ctx.insert("errors", errors);
    page.render("city/form.html", &ctx)
}

#[derive(Debug, Deserialize)]
pub struct CreateQuery {
    pub city_id: Option<i64>,
}

async fn create_form(State(state): State<AppState>, page: PageContext, Query(query): Query<CreateQuery>) -> WebResult {
    page.require_user()?;
    let mut form = VisitForm {
        rating: "5".to_string(),
        ..VisitForm::default()
    };
    if let Some(city_id) = query.city_id {
        let city = state.city_service.city_detail(city_id).await?;
        form.region_id = city.city.region_id.to_string();
        form.city_id = city.city.id.to_string();
    }
    render_form(&state, &page, &form, None, &[]).await
}

async fn create(State(state): State<AppState>, page: PageContext, Form(form): Form<VisitForm>) -> WebResult {
    let user = page.require_user()?;
    let input = match form.to_input() {
        Ok(input) => input,
        Err(errors) => return render_form(&state, &page, &form, None, &errors).await,
    };
    match state.city_service.create_visit(user.id, input).await {
        Ok(visit) => Ok(see_other(&format!("/city/{}", visit.city_id))),
        Err(ServiceError::ValidationError(msg)) | Err(ServiceError::Conflict(msg)) => {
            render_form(&state, &page, &form, None, &[msg]).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_form(State(state): State<AppState>, page: PageContext, Path(visit_id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let visit = state.city_service.get_visit(user.id, visit_id).await?;
    render_form(&state, &page, &VisitForm::from_visit(&visit), Some(visit_id), &[]).await
}

async fn update(
    State(state): State<AppState>,
    page: PageContext,
    Path(visit_id): Path<i64>,
    Form(form): Form<VisitForm>,
) -> WebResult {
    let user = page.require_user()?;
    // Foreign or missing visits answer 404 before the form is looked at
    state.city_service.get_visit(user.id, visit_id).await?;
    let input = match form.to_input() {
        Ok(input) => input,
        Err(errors) => return render_form(&state, &page, &form, Some(visit_id), &errors).await,
    };
    match state.city_service.update_visit(user.id, visit_id, input).await {
        Ok(visit) => Ok(see_other(&format!("/city/{}", visit.city_id))),
        Err(ServiceError::ValidationError(msg)) | Err(ServiceError::Conflict(msg)) => {
            render_form(&state, &page, &form, Some(visit_id), &[msg]).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete(State(state): State<AppState>, page: PageContext, Path(visit_id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    state.city_service.delete_visit(user.id, visit_id).await?;
    Ok(see_other("/city/all/list"))
}

async fn detail(State(state): State<AppState>, page: PageContext, Path(city_id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let city = state.city_service.city_detail(city_id).await?;

    let mut ctx = Context::new();
    ctx.insert("region_name", &city.region_full_name());
    ctx.insert("city", &city);
    ctx.insert("visits", &state.city_service.visits_to_city(user.id, city_id).await?);
    ctx.insert("rank", &state.statistics_service.city_rank(city_id).await?);
    ctx.insert(
        "neighbors",
        &state
            .statistics_service
            .neighbors(city_id, DEFAULT_NEIGHBOR_RADIUS)
            .await?,
    );
    page.render("city/detail.html", &ctx)
}
