//! Statistics engine
//!
//! Builds the dashboard and statistics pages out of the aggregate queries in
//! [`StatisticsRepository`]: city and region roll-ups, area progress,
//! time buckets, rankings and the popularity neighborhood of a city.
//!
//! Percentages are integer and floored:
//!
//! ```
//! use moi_goroda::services::statistics::calculate_ratio;
//!
//! assert_eq!(calculate_ratio(2, 3), 66);
//! assert_eq!(calculate_ratio(5, 0), 0);
//! ```

use crate::cache::{get_or_load, CacheLayer, MemoryCache};
use crate::db::repositories::{GeoRepository, StatisticsRepository};
use crate::models::{
    AdminDashboard, AreaProgress, CityRank, CityStats, MonthBucket, NeighborCity, RegionProgress, RegionStats,
    UserRank, UserStatistics,
};
use crate::services::{ServiceError, ServiceResult};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_NEIGHBOR_RADIUS: i64 = 5;

const MONTHS_SHOWN: u32 = 24;
const LATEST_VISITS: i64 = 10;
const TOP_REGIONS: usize = 10;

const CACHE_KEY_TOTAL_CITIES: &str = "stats:cities:total";
const CACHE_KEY_REGION_CITIES: &str = "stats:cities:region:";

/// Pattern covering every cached reference count
pub const CACHE_PATTERN: &str = "stats:*";

/// `floor(part * 100 / total)`, 0 for an empty total, clamped to 0..=100
pub fn calculate_ratio(part: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (part.saturating_mul(100) / total).clamp(0, 100)
}

/// Positions `start..=end` around `position` in a 1-based ordering of
/// `total` rows. Near either end the window slides inward so it still holds
/// `2 * radius + 1` rows when that many exist.
pub fn neighbor_window(position: i64, total: i64, radius: i64) -> (i64, i64) {
    let radius = radius.max(0);
    let mut start = position - radius;
    let mut end = position + radius;
    if start < 1 {
        end += 1 - start;
        start = 1;
    }
    if end > total {
        start -= end - total;
        end = total;
    }
    (start.max(1), end)
}

/// First day of the month `months` before the month of `date`
fn months_back(date: NaiveDate, months: u32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 - months as i32;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1).unwrap_or(date)
}

/// The `MONTHS_SHOWN` months ending with the month of `today`, oldest first,
/// with months missing from `buckets` set to 0
fn fill_months(today: NaiveDate, buckets: &[MonthBucket]) -> Vec<MonthBucket> {
    let counts: HashMap<(i64, i64), i64> = buckets.iter().map(|b| ((b.year, b.month), b.count)).collect();
    (0..MONTHS_SHOWN)
        .rev()
        .map(|back| {
            let month = months_back(today, back);
            let key = (month.year() as i64, month.month() as i64);
            MonthBucket {
                year: key.0,
                month: key.1,
                count: counts.get(&key).copied().unwrap_or(0),
            }
        })
        .collect()
}

fn region_stats(regions: &[RegionProgress]) -> RegionStats {
    let total = regions.len() as i64;
    let visited = regions.iter().filter(|r| r.visited_cities > 0).count() as i64;
    let finished = regions.iter().filter(|r| r.is_finished()).count() as i64;
    let half_finished = regions
        .iter()
        .filter(|r| r.ratio >= 50 && !r.is_finished())
        .count() as i64;

    RegionStats {
        total,
        visited,
        not_visited: total - visited,
        ratio_visited: calculate_ratio(visited, total),
        finished,
        ratio_finished: calculate_ratio(finished, total),
        half_finished,
    }
}

pub struct StatisticsService {
    stats: Arc<dyn StatisticsRepository>,
    geo: Arc<dyn GeoRepository>,
    cache: Arc<MemoryCache>,
}

impl StatisticsService {
    pub fn new(stats: Arc<dyn StatisticsRepository>, geo: Arc<dyn GeoRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { stats, geo, cache }
    }

    pub async fn city_stats(&self, user_id: i64) -> ServiceResult<CityStats> {
        self.city_stats_on(user_id, Utc::now().date_naive()).await
    }

    async fn city_stats_on(&self, user_id: i64, today: NaiveDate) -> ServiceResult<CityStats> {
        let total = self.total_cities().await?;
        let counts = self.stats.user_city_counts(user_id, today.year()).await?;
        Ok(CityStats {
            total,
            visited: counts.visited,
            not_visited: (total - counts.visited).max(0),
            ratio: calculate_ratio(counts.visited, total),
            visited_current_year: counts.visited_current_year,
            visited_previous_year: counts.visited_previous_year,
            total_visits: counts.total_visits,
        })
    }

    pub async fn region_stats(&self, user_id: i64) -> ServiceResult<RegionStats> {
        let regions = self.stats.region_progress(user_id, None, "t.title ASC").await?;
        Ok(region_stats(&regions))
    }

    pub async fn area_progress(&self, user_id: i64) -> ServiceResult<Vec<AreaProgress>> {
        let mut areas = self.stats.area_progress(user_id).await?;
        for area in &mut areas {
            area.ratio = calculate_ratio(area.visited_cities, area.total_cities);
        }
        Ok(areas)
    }

    /// Everything on the personal statistics page and the shared dashboard
    pub async fn user_statistics(&self, user_id: i64) -> ServiceResult<UserStatistics> {
        self.user_statistics_on(user_id, Utc::now().date_naive()).await
    }

    async fn user_statistics_on(&self, user_id: i64, today: NaiveDate) -> ServiceResult<UserStatistics> {
        let cities = self.city_stats_on(user_id, today).await?;

        let ranked = self
            .stats
            .region_progress(user_id, None, "t.ratio_rank ASC, t.visited_cities DESC, t.title ASC")
            .await?;
        let regions = region_stats(&ranked);
        let top_regions = ranked
            .into_iter()
            .filter(|r| r.visited_cities > 0)
            .take(TOP_REGIONS)
            .collect();

        let since = months_back(today, MONTHS_SHOWN - 1);
        let months = self.stats.first_visits_by_month(user_id, since).await?;
        let (rank, total_users) = self.stats.user_rank(user_id).await?;

        Ok(UserStatistics {
            rank: UserRank {
                rank,
                total_users,
                visited_cities: cities.visited,
            },
            cities,
            regions,
            areas: self.area_progress(user_id).await?,
            top_regions,
            years: self.stats.first_visits_by_year(user_id).await?,
            months: fill_months(today, &months),
            latest_visits: self.stats.latest_visits(user_id, LATEST_VISITS).await?,
        })
    }

    /// Rank of a city by number of distinct visitors, overall and within its region
    pub async fn city_rank(&self, city_id: i64) -> ServiceResult<CityRank> {
        let popularity = self
            .stats
            .city_popularity(city_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("город {}", city_id)))?;

        Ok(CityRank {
            visitors: popularity.visitors,
            rank_in_country: popularity.country_rank,
            cities_in_country: self.total_cities().await?,
            rank_in_region: popularity.region_rank,
            cities_in_region: self.cities_in_region(popularity.region_id).await?,
        })
    }

    /// Cities around `city_id` in the popularity ordering, the city included
    pub async fn neighbors(&self, city_id: i64, radius: i64) -> ServiceResult<Vec<NeighborCity>> {
        let popularity = self
            .stats
            .city_popularity(city_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("город {}", city_id)))?;
        let total = self.total_cities().await?;
        let (start, end) = neighbor_window(popularity.position, total, radius);
        Ok(self.stats.cities_by_position(start, end).await?)
    }

    pub async fn admin_dashboard(&self) -> ServiceResult<AdminDashboard> {
        let since = Utc::now() - Duration::days(7);
        Ok(self.stats.admin_dashboard(since).await?)
    }

    /// Drop cached reference counts after geography changes
    pub async fn invalidate(cache: &MemoryCache) {
        if let Err(e) = cache.delete_pattern(CACHE_PATTERN).await {
            tracing::warn!("Failed to invalidate statistics cache: {:#}", e);
        }
    }

    async fn total_cities(&self) -> ServiceResult<i64> {
        let geo = self.geo.clone();
        Ok(get_or_load(&self.cache, CACHE_KEY_TOTAL_CITIES, || async move { geo.count_cities().await }).await?)
    }

    async fn cities_in_region(&self, region_id: i64) -> ServiceResult<i64> {
        let geo = self.geo.clone();
        let key = format!("{}{}", CACHE_KEY_REGION_CITIES, region_id);
        Ok(get_or_load(&self.cache, &key, || async move { geo.count_cities_in_region(region_id).await }).await?)
    }
}
