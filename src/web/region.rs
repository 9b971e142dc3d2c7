//! Region pages

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tera::Context;

use super::{choices, lenient_key, MapData, MapPoint, PageContext, WebResult};
use crate::api::middleware::AppState;
use crate::models::{region_full_name, RegionCity, RegionProgress, RegionType};
use crate::services::{RegionCityFilter, RegionCitySort, RegionFilter, RegionSort};

const REGION_FILTERS: &[(&str, &str)] = &[
    ("visited", "Посещённые"),
    ("not_visited", "Непосещённые"),
    ("finished", "Полностью посещённые"),
    ("half_finished", "Посещённые наполовину"),
];

const REGION_SORTS: &[(&str, &str)] = &[
    ("default", "По умолчанию"),
    ("name_down", "По названию (А-Я)"),
    ("name_up", "По названию (Я-А)"),
    ("ratio_down", "Сначала с большим процентом"),
    ("ratio_up", "Сначала с меньшим процентом"),
    ("visited_down", "Сначала с большим числом городов"),
    ("visited_up", "Сначала с меньшим числом городов"),
];

const CITY_FILTERS: &[(&str, &str)] = &[("visited", "Посещённые"), ("not_visited", "Непосещённые")];

const CITY_SORTS: &[(&str, &str)] = &[
    ("default", "По умолчанию"),
    ("name_down", "По названию (А-Я)"),
    ("name_up", "По названию (Я-А)"),
    ("population_down", "Сначала крупные"),
    ("population_up", "Сначала небольшие"),
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/all/list", get(list))
        .route("/all/map", get(map))
        .route("/{id}/list", get(cities))
        .route("/{id}/map", get(cities_map))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
}

/// Region progress with its display name
#[derive(Debug, Serialize)]
pub struct RegionRow {
    #[serde(flatten)]
    pub progress: RegionProgress,
    pub full_name: String,
}

impl From<RegionProgress> for RegionRow {
    fn from(progress: RegionProgress) -> Self {
        let full_name = match progress.region_type.parse::<RegionType>() {
            Ok(kind) => region_full_name(&progress.title, kind),
            Err(_) => progress.title.clone(),
        };
        Self { progress, full_name }
    }
}

pub(crate) fn region_rows(regions: Vec<RegionProgress>) -> Vec<RegionRow> {
    regions.into_iter().map(RegionRow::from).collect()
}

async fn list(State(state): State<AppState>, page: PageContext, Query(query): Query<ListQuery>) -> WebResult {
    let user = page.require_user()?;
    let (filter, filter_key) = lenient_key::<RegionFilter>(query.filter.as_deref());
    let (sort, sort_key) = lenient_key::<RegionSort>(query.sort.as_deref());
    let regions = state
        .region_service
        .list_regions(user.id, filter, sort.unwrap_or_default())
        .await?;

    let mut ctx = Context::new();
    ctx.insert("regions", &region_rows(regions));
    ctx.insert("stats", &state.statistics_service.region_stats(user.id).await?);
    ctx.insert("areas", &state.statistics_service.area_progress(user.id).await?);
    ctx.insert("filters", &choices(REGION_FILTERS));
    ctx.insert("sorts", &choices(REGION_SORTS));
    ctx.insert("filter", &filter_key);
    ctx.insert("sort", &sort_key.unwrap_or("default"));
    page.render("region/list.html", &ctx)
}

async fn map(State(state): State<AppState>, page: PageContext) -> WebResult {
    let user = page.require_user()?;
    let regions = state
        .region_service
        .list_regions(user.id, None, RegionSort::Default)
        .await?;

    let mut ctx = Context::new();
    ctx.insert("regions", &region_rows(regions));
    ctx.insert("stats", &state.statistics_service.region_stats(user.id).await?);
    page.render("region/map.html", &ctx)
}

async fn cities(
    State(state): State<AppState>,
    page: PageContext,
    Path(id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> WebResult {
    let user = page.require_user()?;
    let (filter, filter_key) = lenient_key::<RegionCityFilter>(query.filter.as_deref());
    let (sort, sort_key) = lenient_key::<RegionCitySort>(query.sort.as_deref());
    let (region, cities) = state
        .region_service
        .list_cities(user.id, id, filter, sort.unwrap_or_default())
        .await?;

    let mut ctx = region_context(&region.full_name(), id, &cities);
    ctx.insert("filters", &choices(CITY_FILTERS));
    ctx.insert("sorts", &choices(CITY_SORTS));
    ctx.insert("filter", &filter_key);
    ctx.insert("sort", &sort_key.unwrap_or("default"));
    page.render("region/cities.html", &ctx)
}

async fn cities_map(State(state): State<AppState>, page: PageContext, Path(id): Path<i64>) -> WebResult {
    let user = page.require_user()?;
    let (region, cities) = state
        .region_service
        .list_cities(user.id, id, None, RegionCitySort::Default)
        .await?;
    let ctx = region_context(&region.full_name(), id, &cities);
    page.render("region/cities_map.html", &ctx)
}

fn region_context(name: &str, id: i64, cities: &[RegionCity]) -> Context {
    let visited = cities.iter().filter(|c| c.is_visited()).count();
    let map_data = MapData::split(cities, |c| {
        let point = MapPoint {
            id: c.id,
            title: c.title.clone(),
            lat: c.latitude,
            lon: c.longitude,
        };
        (point, c.is_visited())
    });
    let mut ctx = Context::new();
    ctx.insert("map_data", &map_data);
    ctx.insert("region_id", &id);
    ctx.insert("region_name", name);
    ctx.insert("cities", cities);
    ctx.insert("visited", &visited);
    ctx.insert("total", &cities.len());
    ctx
}
