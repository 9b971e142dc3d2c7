//! Visited cities
//!
//! Visit CRUD with the server-side rules (region derived from the city,
//! rating range, no future dates, one visit per date) and the filter/sort
//! keys of the visited-city list.

use crate::db::repositories::{GeoRepository, VisitedCityRepository};
use crate::models::{
    City, CityDetail, ParseEnumError, VisitWithCity, VisitedCity, VisitedCityInput, VisitedCitySummary,
};
use crate::services::{ServiceError, ServiceResult};
use chrono::{Datelike, NaiveDate, Utc};
use std::str::FromStr;
use std::sync::Arc;

const MAX_IMPRESSION_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFilter {
    Magnet,
    NoMagnet,
    CurrentYear,
    LastYear,
}

impl VisitFilter {
    /// Condition over the aggregated summary row `t`
    pub fn sql(&self, today: NaiveDate) -> String {
        match self {
            VisitFilter::Magnet => "t.magnets > 0".to_string(),
            VisitFilter::NoMagnet => "t.magnets = 0".to_string(),
            VisitFilter::CurrentYear => year_range("t.first_visit_date", today.year()),
            VisitFilter::LastYear => year_range("t.first_visit_date", today.year() - 1),
        }
    }
}

/// Dates render as ISO strings, which compare correctly on both backends
fn year_range(column: &str, year: i32) -> String {
    format!("{} BETWEEN '{:04}-01-01' AND '{:04}-12-31'", column, year, year)
}

impl FromStr for VisitFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "magnet" => Ok(VisitFilter::Magnet),
            "no_magnet" => Ok(VisitFilter::NoMagnet),
            "current_year" => Ok(VisitFilter::CurrentYear),
            "last_year" => Ok(VisitFilter::LastYear),
            _ => Err(ParseEnumError::new("filter", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitSort {
    #[default]
    Default,
    NameDown,
    NameUp,
    DateDown,
    DateUp,
    RatingDown,
    RatingUp,
}

impl VisitSort {
    pub fn sql(&self) -> &'static str {
        match self {
            VisitSort::Default | VisitSort::DateDown => {
                "(t.first_visit_date IS NULL), t.first_visit_date DESC, t.city_title ASC"
            }
            VisitSort::DateUp => "(t.first_visit_date IS NULL), t.first_visit_date ASC, t.city_title ASC",
            VisitSort::NameDown => "t.city_title ASC",
            VisitSort::NameUp => "t.city_title DESC",
            VisitSort::RatingDown => "t.average_rating DESC, t.city_title ASC",
            VisitSort::RatingUp => "t.average_rating ASC, t.city_title ASC",
        }
    }
}

impl FromStr for VisitSort {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(VisitSort::Default),
            "name_down" => Ok(VisitSort::NameDown),
            "name_up" => Ok(VisitSort::NameUp),
            "date_down" => Ok(VisitSort::DateDown),
            "date_up" => Ok(VisitSort::DateUp),
            "rating_down" => Ok(VisitSort::RatingDown),
            "rating_up" => Ok(VisitSort::RatingUp),
            _ => Err(ParseEnumError::new("sort", s)),
        }
    }
}

pub struct CityService {
    geo: Arc<dyn GeoRepository>,
    visits: Arc<dyn VisitedCityRepository>,
}

impl CityService {
    pub fn new(geo: Arc<dyn GeoRepository>, visits: Arc<dyn VisitedCityRepository>) -> Self {
        Self { geo, visits }
    }

    pub async fn list_visited(
        &self,
        user_id: i64,
        filter: Option<VisitFilter>,
        sort: VisitSort,
    ) -> ServiceResult<Vec<VisitedCitySummary>> {
        let today = Utc::now().date_naive();
        let filter = filter.map(|f| f.sql(today));
        Ok(self
            .visits
            .list_summaries(user_id, filter.as_deref(), sort.sql())
            .await?)
    }

    pub async fn list_not_visited(&self, user_id: i64) -> ServiceResult<Vec<City>> {
        Ok(self.visits.list_not_visited(user_id).await?)
    }

    /// Every visit of the user, newest first
    pub async fn list_visits(&self, user_id: i64) -> ServiceResult<Vec<VisitWithCity>> {
        Ok(self.visits.list_for_user(user_id).await?)
    }

    pub async fn city_detail(&self, city_id: i64) -> ServiceResult<CityDetail> {
        self.geo
            .get_city_detail(city_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("город {}", city_id)))
    }

    pub async fn visits_to_city(&self, user_id: i64, city_id: i64) -> ServiceResult<Vec<VisitWithCity>> {
        Ok(self.visits.list_for_city(user_id, city_id).await?)
    }

    /// Cities of a region for the visit form
    pub async fn cities_of_region(&self, region_id: i64) -> ServiceResult<Vec<City>> {
        Ok(self.geo.list_cities_by_region(region_id).await?)
    }

    pub async fn all_cities(&self) -> ServiceResult<Vec<City>> {
        Ok(self.geo.list_cities().await?)
    }

    /// A visit owned by `user_id`; foreign visits look missing
    pub async fn get_visit(&self, user_id: i64, visit_id: i64) -> ServiceResult<VisitedCity> {
        self.visits
            .get_by_id(visit_id)
            .await?
            .filter(|v| v.user_id == user_id)
            .ok_or_else(|| ServiceError::not_found(format!("посещение {}", visit_id)))
    }

    pub async fn create_visit(&self, user_id: i64, input: VisitedCityInput) -> ServiceResult<VisitedCity> {
        let input = validate_visit(input, Utc::now().date_naive())?;
        let city = self.visited_city(input.city_id).await?;

        if self
            .visits
            .exists_on_date(user_id, city.id, input.date_of_visit, None)
            .await?
        {
            return Err(duplicate_visit(&city, input.date_of_visit));
        }

        let id = self.visits.create(user_id, city.region_id, &input).await?;
        self.visits.recompute_first_visit(user_id, city.id).await?;
        tracing::info!(user_id, city_id = city.id, visit_id = id, "Visit added");

        self.get_visit(user_id, id).await
    }

    pub async fn update_visit(
        &self,
        user_id: i64,
        visit_id: i64,
        input: VisitedCityInput,
    ) -> ServiceResult<VisitedCity> {
        let existing = self.get_visit(user_id, visit_id).await?;
        let input = validate_visit(input, Utc::now().date_naive())?;
        let city = self.visited_city(input.city_id).await?;

        if self
            .visits
            .exists_on_date(user_id, city.id, input.date_of_visit, Some(visit_id))
            .await?
        {
            return Err(duplicate_visit(&city, input.date_of_visit));
        }

        self.visits.update(visit_id, city.region_id, &input).await?;
        self.visits.recompute_first_visit(user_id, city.id).await?;
        if existing.city_id != city.id {
            self.visits.recompute_first_visit(user_id, existing.city_id).await?;
        }

        self.get_visit(user_id, visit_id).await
    }

    pub async fn delete_visit(&self, user_id: i64, visit_id: i64) -> ServiceResult<()> {
        let existing = self.get_visit(user_id, visit_id).await?;
        self.visits.delete(visit_id).await?;
        self.visits.recompute_first_visit(user_id, existing.city_id).await?;
        tracing::info!(user_id, visit_id, "Visit deleted");
        Ok(())
    }

    async fn visited_city(&self, city_id: i64) -> ServiceResult<City> {
        self.geo
            .get_city(city_id)
            .await?
            .ok_or_else(|| ServiceError::validation("Выбранный город не найден"))
    }
}

fn duplicate_visit(city: &City, date: Option<NaiveDate>) -> ServiceError {
    match date {
        Some(date) => ServiceError::Conflict(format!(
            "Посещение города {} {} уже сохранено",
            city.title,
            date.format("%d.%m.%Y")
        )),
        None => ServiceError::Conflict(format!(
            "Посещение города {} без даты уже сохранено",
            city.title
        )),
    }
}

fn validate_visit(mut input: VisitedCityInput, today: NaiveDate) -> ServiceResult<VisitedCityInput> {
    if !(1..=5).contains(&input.rating) {
        return Err(ServiceError::validation("Оценка должна быть от 1 до 5"));
    }
    if let Some(date) = input.date_of_visit {
        if date > today {
            return Err(ServiceError::validation("Дата посещения не может быть в будущем"));
        }
    }
    input.impression = input
        .impression
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(text) = &input.impression {
        if text.chars().count() > MAX_IMPRESSION_CHARS {
            return Err(ServiceError::validation("Слишком длинный текст впечатлений"));
        }
    }
    Ok(input)
}
