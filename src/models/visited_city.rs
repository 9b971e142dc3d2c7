//! Visits of users to cities

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One visit of one user to one city
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VisitedCity {
    pub id: i64,
    pub user_id: i64,
    /// Always the region of `city_id`
    pub region_id: i64,
    pub city_id: i64,
    pub date_of_visit: Option<NaiveDate>,
    pub has_magnet: bool,
    pub impression: Option<String>,
    /// 1..=5
    pub rating: i64,
    /// Earliest visit of this user to this city
    pub is_first_visit: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Form data for adding or editing a visit
#[derive(Debug, Clone, Deserialize)]
pub struct VisitedCityInput {
    pub city_id: i64,
    pub date_of_visit: Option<NaiveDate>,
    #[serde(default)]
    pub has_magnet: bool,
    pub impression: Option<String>,
    pub rating: i64,
}

/// All visits of a user to one city folded into a single row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VisitedCitySummary {
    pub city_id: i64,
    pub city_title: String,
    pub region_id: i64,
    pub region_title: String,
    pub population: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub first_visit_date: Option<NaiveDate>,
    pub last_visit_date: Option<NaiveDate>,
    pub number_of_visits: i64,
    pub average_rating: f64,
    /// Visits on which a souvenir magnet was bought
    pub magnets: i64,
}

impl VisitedCitySummary {
    pub fn has_magnet(&self) -> bool {
        self.magnets > 0
    }
}

/// Visit joined with its city and region, newest first in listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VisitWithCity {
    pub id: i64,
    pub city_id: i64,
    pub city_title: String,
    pub region_id: i64,
    pub region_title: String,
    pub date_of_visit: Option<NaiveDate>,
    pub has_magnet: bool,
    pub impression: Option<String>,
    pub rating: i64,
    pub is_first_visit: bool,
}
