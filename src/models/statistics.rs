//! Aggregates shown on dashboards, statistics pages and reports

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityStats {
    pub total: i64,
    pub visited: i64,
    pub not_visited: i64,
    pub ratio: i64,
    pub visited_current_year: i64,
    pub visited_previous_year: i64,
    /// Every visit, repeated visits included
    pub total_visits: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStats {
    pub total: i64,
    pub visited: i64,
    pub not_visited: i64,
    pub ratio_visited: i64,
    pub finished: i64,
    pub ratio_finished: i64,
    pub half_finished: i64,
}

/// One region with the user's progress through its cities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegionProgress {
    pub id: i64,
    pub title: String,
    pub region_type: String,
    pub iso3166: String,
    pub area_id: Option<i64>,
    pub total_cities: i64,
    pub visited_cities: i64,
    pub ratio: i64,
    /// Position by ratio, ties share a rank
    #[sqlx(rename = "ratio_rank")]
    pub rank: i64,
}

impl RegionProgress {
    pub fn is_finished(&self) -> bool {
        self.total_cities > 0 && self.visited_cities == self.total_cities
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AreaProgress {
    pub id: i64,
    pub title: String,
    pub total_regions: i64,
    pub visited_regions: i64,
    pub total_cities: i64,
    pub visited_cities: i64,
    #[sqlx(default)]
    pub ratio: i64,
}

/// New cities in a calendar year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct YearBucket {
    pub year: i64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonthBucket {
    pub year: i64,
    pub month: i64,
    pub count: i64,
}

/// Visit as listed in "latest visits"
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LatestVisit {
    pub id: i64,
    pub city_id: i64,
    pub city_title: String,
    pub region_title: String,
    pub date_of_visit: NaiveDate,
}

/// Popularity of a city among all users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityRank {
    pub visitors: i64,
    pub rank_in_country: i64,
    pub cities_in_country: i64,
    pub rank_in_region: i64,
    pub cities_in_region: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NeighborCity {
    pub id: i64,
    pub title: String,
    pub visitors: i64,
    /// 1-based position in the popularity order
    pub position: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRank {
    /// `None` for users without visits
    pub rank: Option<i64>,
    pub total_users: i64,
    pub visited_cities: i64,
}

/// Everything the statistics page and shared dashboard show
#[derive(Debug, Clone, Serialize)]
pub struct UserStatistics {
    pub cities: CityStats,
    pub regions: RegionStats,
    pub areas: Vec<AreaProgress>,
    pub top_regions: Vec<RegionProgress>,
    pub years: Vec<YearBucket>,
    pub months: Vec<MonthBucket>,
    pub latest_visits: Vec<LatestVisit>,
    pub rank: UserRank,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDashboard {
    pub total_users: i64,
    pub users_with_visits: i64,
    pub total_visits: i64,
    pub visits_last_week: i64,
}
