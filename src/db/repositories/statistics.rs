//! Aggregate queries behind statistics pages, rankings and the admin dashboard
//!
//! "Visited" always means at least one visit regardless of date; year and
//! month buckets count first visits only, so a city contributes once.

use crate::db::dialect::Dialect;
use crate::db::DynDatabasePool;
use crate::models::{AdminDashboard, AreaProgress, LatestVisit, MonthBucket, NeighborCity, RegionProgress, YearBucket};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Visit counters of one user
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct UserCityCounts {
    /// Distinct cities
    pub visited: i64,
    pub total_visits: i64,
    pub visited_current_year: i64,
    pub visited_previous_year: i64,
}

/// A city's place in the popularity ordering
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CityPopularity {
    pub id: i64,
    pub region_id: i64,
    pub visitors: i64,
    pub country_rank: i64,
    pub region_rank: i64,
    /// 1-based, unique: visitors desc, then title
    pub position: i64,
}

#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    async fn user_city_counts(&self, user_id: i64, current_year: i32) -> Result<UserCityCounts>;

    /// Every region with the user's progress, ranked by ratio before
    /// `filter` (SQL over row `t`) is applied
    async fn region_progress(&self, user_id: i64, filter: Option<&str>, order: &str) -> Result<Vec<RegionProgress>>;

    /// Areas with region and city counters; `ratio` is left at 0
    async fn area_progress(&self, user_id: i64) -> Result<Vec<AreaProgress>>;

    /// Ascending by year
    async fn first_visits_by_year(&self, user_id: i64) -> Result<Vec<YearBucket>>;

    /// Non-empty months on or after `since`, ascending
    async fn first_visits_by_month(&self, user_id: i64, since: NaiveDate) -> Result<Vec<MonthBucket>>;

    async fn latest_visits(&self, user_id: i64, limit: i64) -> Result<Vec<LatestVisit>>;

    async fn city_popularity(&self, city_id: i64) -> Result<Option<CityPopularity>>;

    /// Cities at popularity positions `start..=end`
    async fn cities_by_position(&self, start: i64, end: i64) -> Result<Vec<NeighborCity>>;

    /// Rank among users with at least one visit, by distinct cities; `None`
    /// when the user has no visits. Second value is the number of ranked users.
    async fn user_rank(&self, user_id: i64) -> Result<(Option<i64>, i64)>;

    async fn admin_dashboard(&self, since: DateTime<Utc>) -> Result<AdminDashboard>;
}

pub struct SqlxStatisticsRepository {
    pool: DynDatabasePool,
}

impl SqlxStatisticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn StatisticsRepository> {
        Arc::new(Self::new(pool))
    }

    fn dialect(&self) -> Dialect {
        Dialect::of(&self.pool)
    }

    fn popularity_select(&self) -> String {
        let d = self.dialect();
        format!(
            r#"
            SELECT t.id, t.title, t.region_id, t.visitors,
                   {} AS country_rank,
                   {} AS region_rank,
                   {} AS position
            FROM (
                SELECT c.id, c.title, c.region_id,
                       (SELECT COUNT(DISTINCT v.user_id) FROM visited_cities v
                        WHERE v.city_id = c.id) AS visitors
                FROM cities c
            ) t
            "#,
            d.int("RANK() OVER (ORDER BY t.visitors DESC)"),
            d.int("RANK() OVER (PARTITION BY t.region_id ORDER BY t.visitors DESC)"),
            d.int("ROW_NUMBER() OVER (ORDER BY t.visitors DESC, t.title ASC, t.id ASC)"),
        )
    }

    async fn scalar(&self, sql: &str, bind: Option<DateTime<Utc>>) -> Result<i64> {
        let (value,): (i64,) = with_pool!(self.pool, |p| {
            let mut query = sqlx::query_as(sql);
            if let Some(value) = bind {
                query = query.bind(value);
            }
            query.fetch_one(p).await.context("Failed to run counter query")?
        });
        Ok(value)
    }
}

#[async_trait]
impl StatisticsRepository for SqlxStatisticsRepository {
    async fn user_city_counts(&self, user_id: i64, current_year: i32) -> Result<UserCityCounts> {
        let d = self.dialect();
        let year = d.year("date_of_visit");
        let sql = format!(
            r#"
            SELECT
                (SELECT COUNT(DISTINCT city_id) FROM visited_cities WHERE user_id = ?) AS visited,
                (SELECT COUNT(*) FROM visited_cities WHERE user_id = ?) AS total_visits,
                (SELECT COUNT(*) FROM visited_cities
                 WHERE user_id = ? AND is_first_visit = ? AND {year} = ?) AS visited_current_year,
                (SELECT COUNT(*) FROM visited_cities
                 WHERE user_id = ? AND is_first_visit = ? AND {year} = ?) AS visited_previous_year
            "#,
            year = year
        );
        let counts = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, UserCityCounts>(&sql)
                .bind(user_id)
                .bind(user_id)
                .bind(user_id)
                .bind(true)
                .bind(i64::from(current_year))
                .bind(user_id)
                .bind(true)
                .bind(i64::from(current_year) - 1)
                .fetch_one(p)
                .await
                .context("Failed to count visited cities")?
        });
        Ok(counts)
    }

    async fn region_progress(&self, user_id: i64, filter: Option<&str>, order: &str) -> Result<Vec<RegionProgress>> {
        let d = self.dialect();
        let sql = format!(
            r#"
            SELECT t.* FROM (
                SELECT s.id, s.title, s.region_type, s.iso3166, s.area_id,
                       s.total_cities, s.visited_cities, s.ratio,
                       {rank} AS ratio_rank
                FROM (
                    SELECT q.*, {ratio} AS ratio
                    FROM (
                        SELECT r.id, r.title, r.region_type, r.iso3166, r.area_id,
                               (SELECT COUNT(*) FROM cities c WHERE c.region_id = r.id) AS total_cities,
                               (SELECT COUNT(DISTINCT v.city_id) FROM visited_cities v
                                WHERE v.region_id = r.id AND v.user_id = ?) AS visited_cities
                        FROM regions r
                    ) q
                ) s
            ) t
            WHERE {filter}
            ORDER BY {order}
            "#,
            rank = d.int("RANK() OVER (ORDER BY s.ratio DESC)"),
            ratio = d.int(&d.ratio("q.visited_cities", "q.total_cities")),
            filter = filter.unwrap_or("1 = 1"),
            order = order,
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, RegionProgress>(&sql)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to compute region progress")?
        });
        Ok(rows)
    }

    async fn area_progress(&self, user_id: i64) -> Result<Vec<AreaProgress>> {
        let sql = r#"
            SELECT a.id, a.title,
                   (SELECT COUNT(*) FROM regions r WHERE r.area_id = a.id) AS total_regions,
                   (SELECT COUNT(DISTINCT v.region_id) FROM visited_cities v
                    JOIN regions r ON r.id = v.region_id
                    WHERE r.area_id = a.id AND v.user_id = ?) AS visited_regions,
                   (SELECT COUNT(*) FROM cities c
                    JOIN regions r ON r.id = c.region_id
                    WHERE r.area_id = a.id) AS total_cities,
                   (SELECT COUNT(DISTINCT v.city_id) FROM visited_cities v
                    JOIN regions r ON r.id = v.region_id
                    WHERE r.area_id = a.id AND v.user_id = ?) AS visited_cities
            FROM areas a
            ORDER BY a.title
        "#;
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, AreaProgress>(sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to compute area progress")?
        });
        Ok(rows)
    }

    async fn first_visits_by_year(&self, user_id: i64) -> Result<Vec<YearBucket>> {
        let sql = format!(
            "SELECT {} AS year, COUNT(*) AS count FROM visited_cities \
             WHERE user_id = ? AND is_first_visit = ? AND date_of_visit IS NOT NULL \
             GROUP BY year ORDER BY year",
            self.dialect().year("date_of_visit")
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, YearBucket>(&sql)
                .bind(user_id)
                .bind(true)
                .fetch_all(p)
                .await
                .context("Failed to group visits by year")?
        });
        Ok(rows)
    }

    async fn first_visits_by_month(&self, user_id: i64, since: NaiveDate) -> Result<Vec<MonthBucket>> {
        let d = self.dialect();
        let sql = format!(
            "SELECT {} AS year, {} AS month, COUNT(*) AS count FROM visited_cities \
             WHERE user_id = ? AND is_first_visit = ? AND date_of_visit >= ? \
             GROUP BY year, month ORDER BY year, month",
            d.year("date_of_visit"),
            d.month("date_of_visit")
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, MonthBucket>(&sql)
                .bind(user_id)
                .bind(true)
                .bind(since)
                .fetch_all(p)
                .await
                .context("Failed to group visits by month")?
        });
        Ok(rows)
    }

    async fn latest_visits(&self, user_id: i64, limit: i64) -> Result<Vec<LatestVisit>> {
        let sql = r#"
            SELECT v.id, v.city_id, c.title AS city_title, r.title AS region_title, v.date_of_visit
            FROM visited_cities v
            JOIN cities c ON c.id = v.city_id
            JOIN regions r ON r.id = v.region_id
            WHERE v.user_id = ? AND v.date_of_visit IS NOT NULL
            ORDER BY v.date_of_visit DESC, v.id DESC
            LIMIT ?
        "#;
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, LatestVisit>(sql)
                .bind(user_id)
                .bind(limit)
                .fetch_all(p)
                .await
                .context("Failed to list latest visits")?
        });
        Ok(rows)
    }

    async fn city_popularity(&self, city_id: i64) -> Result<Option<CityPopularity>> {
        let sql = format!("SELECT ranked.* FROM ({}) ranked WHERE ranked.id = ?", self.popularity_select());
        let row = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, CityPopularity>(&sql)
                .bind(city_id)
                .fetch_optional(p)
                .await
                .context("Failed to rank city")?
        });
        Ok(row)
    }

    async fn cities_by_position(&self, start: i64, end: i64) -> Result<Vec<NeighborCity>> {
        let sql = format!(
            "SELECT ranked.id, ranked.title, ranked.visitors, ranked.position FROM ({}) ranked \
             WHERE ranked.position BETWEEN ? AND ? ORDER BY ranked.position",
            self.popularity_select()
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, NeighborCity>(&sql)
                .bind(start)
                .bind(end)
                .fetch_all(p)
                .await
                .context("Failed to list neighboring cities")?
        });
        Ok(rows)
    }

    async fn user_rank(&self, user_id: i64) -> Result<(Option<i64>, i64)> {
        let d = self.dialect();
        let ranked = format!(
            "SELECT t.user_id, {} AS user_rank FROM \
             (SELECT user_id, COUNT(DISTINCT city_id) AS cities FROM visited_cities GROUP BY user_id) t",
            d.int("RANK() OVER (ORDER BY t.cities DESC)")
        );
        let rank_sql = format!("SELECT r.user_rank FROM ({}) r WHERE r.user_id = ?", ranked);
        let total_sql = "SELECT COUNT(DISTINCT user_id) FROM visited_cities";

        let (rank, (total,)): (Option<(i64,)>, (i64,)) = with_pool!(self.pool, |p| {
            let rank = sqlx::query_as(&rank_sql)
                .bind(user_id)
                .fetch_optional(p)
                .await
                .context("Failed to rank user")?;
            let total = sqlx::query_as(total_sql)
                .fetch_one(p)
                .await
                .context("Failed to count ranked users")?;
            (rank, total)
        });
        Ok((rank.map(|(r,)| r), total))
    }

    async fn admin_dashboard(&self, since: DateTime<Utc>) -> Result<AdminDashboard> {
        Ok(AdminDashboard {
            total_users: self.scalar("SELECT COUNT(*) FROM users", None).await?,
            users_with_visits: self
                .scalar("SELECT COUNT(DISTINCT user_id) FROM visited_cities", None)
                .await?,
            total_visits: self.scalar("SELECT COUNT(*) FROM visited_cities", None).await?,
            visits_last_week: self
                .scalar("SELECT COUNT(*) FROM visited_cities WHERE created_at >= ?", Some(since))
                .await?,
        })
    }
}
