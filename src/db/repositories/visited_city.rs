//! Visits of users to cities
//!
//! Besides plain CRUD this repository keeps `is_first_visit` consistent:
//! after any write touching a (user, city) pair call
//! [`VisitedCityRepository::recompute_first_visit`].

use crate::db::dialect::{Dialect, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{City, VisitWithCity, VisitedCity, VisitedCityInput, VisitedCitySummary};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

const VISIT_COLUMNS: &str = "id, user_id, region_id, city_id, date_of_visit, has_magnet, impression, rating, \
                             is_first_visit, created_at, updated_at";

const VISIT_WITH_CITY: &str = r#"
    SELECT v.id, v.city_id, c.title AS city_title, v.region_id, r.title AS region_title,
           v.date_of_visit, v.has_magnet, v.impression, v.rating, v.is_first_visit
    FROM visited_cities v
    JOIN cities c ON c.id = v.city_id
    JOIN regions r ON r.id = v.region_id
"#;

#[async_trait]
pub trait VisitedCityRepository: Send + Sync {
    /// Insert a visit. `region_id` must be the city's region.
    async fn create(&self, user_id: i64, region_id: i64, input: &VisitedCityInput) -> Result<i64>;

    async fn update(&self, id: i64, region_id: i64, input: &VisitedCityInput) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<VisitedCity>>;

    /// Whether the user already has a visit to the city on `date`
    /// (both undated counts as the same date), ignoring visit `exclude_id`
    async fn exists_on_date(
        &self,
        user_id: i64,
        city_id: i64,
        date: Option<NaiveDate>,
        exclude_id: Option<i64>,
    ) -> Result<bool>;

    /// Mark the earliest dated visit of the pair as first; undated visits
    /// come after dated ones and ties go to the lower id
    async fn recompute_first_visit(&self, user_id: i64, city_id: i64) -> Result<()>;

    /// All visits of the user to one city, newest first
    async fn list_for_city(&self, user_id: i64, city_id: i64) -> Result<Vec<VisitWithCity>>;

    /// Every visit of the user, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<VisitWithCity>>;

    /// One row per visited city. `filter` and `order` are SQL fragments
    /// over the aggregated row `t`.
    async fn list_summaries(
        &self,
        user_id: i64,
        filter: Option<&str>,
        order: &str,
    ) -> Result<Vec<VisitedCitySummary>>;

    /// Summaries for several users at once, tagged with the owner id
    async fn list_summaries_for_users(&self, user_ids: &[i64]) -> Result<Vec<(i64, VisitedCitySummary)>>;

    async fn list_not_visited(&self, user_id: i64) -> Result<Vec<City>>;
}

pub struct SqlxVisitedCityRepository {
    pool: DynDatabasePool,
}

impl SqlxVisitedCityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VisitedCityRepository> {
        Arc::new(Self::new(pool))
    }

    fn summary_select(&self) -> String {
        let d = Dialect::of(&self.pool);
        format!(
            r#"
            SELECT v.user_id AS owner_id, c.id AS city_id, c.title AS city_title,
                   r.id AS region_id, r.title AS region_title,
                   c.population, c.latitude, c.longitude,
                   MIN(v.date_of_visit) AS first_visit_date,
                   MAX(v.date_of_visit) AS last_visit_date,
                   {} AS number_of_visits,
                   {} AS average_rating,
                   {} AS magnets
            FROM visited_cities v
            JOIN cities c ON c.id = v.city_id
            JOIN regions r ON r.id = c.region_id
            "#,
            d.int("COUNT(v.id)"),
            d.float("AVG(v.rating)"),
            d.int("SUM(CASE WHEN v.has_magnet THEN 1 ELSE 0 END)"),
        )
    }
}

const SUMMARY_GROUP_BY: &str =
    "GROUP BY v.user_id, c.id, c.title, r.id, r.title, c.population, c.latitude, c.longitude";

#[async_trait]
impl VisitedCityRepository for SqlxVisitedCityRepository {
    async fn create(&self, user_id: i64, region_id: i64, input: &VisitedCityInput) -> Result<i64> {
        let sql = "INSERT INTO visited_cities \
                   (user_id, region_id, city_id, date_of_visit, has_magnet, impression, rating, is_first_visit, created_at, updated_at) \
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let now = Utc::now();
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(user_id)
                .bind(region_id)
                .bind(input.city_id)
                .bind(input.date_of_visit)
                .bind(input.has_magnet)
                .bind(input.impression.as_deref())
                .bind(input.rating)
                .bind(false)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create visit")?
                .insert_id()
        });
        Ok(id)
    }

    async fn update(&self, id: i64, region_id: i64, input: &VisitedCityInput) -> Result<bool> {
        let sql = "UPDATE visited_cities SET region_id = ?, city_id = ?, date_of_visit = ?, has_magnet = ?, \
                   impression = ?, rating = ?, updated_at = ? WHERE id = ?";
        let affected = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(region_id)
                .bind(input.city_id)
                .bind(input.date_of_visit)
                .bind(input.has_magnet)
                .bind(input.impression.as_deref())
                .bind(input.rating)
                .bind(Utc::now())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update visit")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM visited_cities WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .context("Failed to delete visit")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<VisitedCity>> {
        let sql = format!("SELECT {} FROM visited_cities WHERE id = ?", VISIT_COLUMNS);
        let visit = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, VisitedCity>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get visit")?
        });
        Ok(visit)
    }

    async fn exists_on_date(
        &self,
        user_id: i64,
        city_id: i64,
        date: Option<NaiveDate>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let sql = "SELECT COUNT(*) FROM visited_cities \
                   WHERE user_id = ? AND city_id = ? \
                   AND ((date_of_visit IS NULL AND ? IS NULL) OR date_of_visit = ?) \
                   AND id <> ?";
        let (count,): (i64,) = with_pool!(self.pool, |p| {
            sqlx::query_as(sql)
                .bind(user_id)
                .bind(city_id)
                .bind(date)
                .bind(date)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(p)
                .await
                .context("Failed to check for duplicate visit")?
        });
        Ok(count > 0)
    }

    async fn recompute_first_visit(&self, user_id: i64, city_id: i64) -> Result<()> {
        let pick = "SELECT id FROM visited_cities WHERE user_id = ? AND city_id = ? \
                    ORDER BY (date_of_visit IS NULL), date_of_visit ASC, id ASC LIMIT 1";
        with_pool!(self.pool, |p| {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;
            sqlx::query("UPDATE visited_cities SET is_first_visit = ? WHERE user_id = ? AND city_id = ?")
                .bind(false)
                .bind(user_id)
                .bind(city_id)
                .execute(&mut *tx)
                .await
                .context("Failed to reset first visit flags")?;
            let first: Option<(i64,)> = sqlx::query_as(pick)
                .bind(user_id)
                .bind(city_id)
                .fetch_optional(&mut *tx)
                .await
                .context("Failed to find first visit")?;
            if let Some((id,)) = first {
                sqlx::query("UPDATE visited_cities SET is_first_visit = ? WHERE id = ?")
                    .bind(true)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to mark first visit")?;
            }
            tx.commit().await.context("Failed to commit first visit")?;
        });
        Ok(())
    }

    async fn list_for_city(&self, user_id: i64, city_id: i64) -> Result<Vec<VisitWithCity>> {
        let sql = format!(
            "{} WHERE v.user_id = ? AND v.city_id = ? ORDER BY (v.date_of_visit IS NULL), v.date_of_visit DESC, v.id DESC",
            VISIT_WITH_CITY
        );
        let visits = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, VisitWithCity>(&sql)
                .bind(user_id)
                .bind(city_id)
                .fetch_all(p)
                .await
                .context("Failed to list visits of city")?
        });
        Ok(visits)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<VisitWithCity>> {
        let sql = format!(
            "{} WHERE v.user_id = ? ORDER BY (v.date_of_visit IS NULL), v.date_of_visit DESC, v.id DESC",
            VISIT_WITH_CITY
        );
        let visits = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, VisitWithCity>(&sql)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to list visits")?
        });
        Ok(visits)
    }

    async fn list_summaries(
        &self,
        user_id: i64,
        filter: Option<&str>,
        order: &str,
    ) -> Result<Vec<VisitedCitySummary>> {
        let sql = format!(
            "SELECT t.* FROM ({} WHERE v.user_id = ? {}) t WHERE {} ORDER BY {}",
            self.summary_select(),
            SUMMARY_GROUP_BY,
            filter.unwrap_or("1 = 1"),
            order
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, VisitedCitySummary>(&sql)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to list visited cities")?
        });
        Ok(rows)
    }

    async fn list_summaries_for_users(&self, user_ids: &[i64]) -> Result<Vec<(i64, VisitedCitySummary)>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE v.user_id IN ({}) {} ORDER BY v.user_id, c.title",
            self.summary_select(),
            crate::db::dialect::placeholders(user_ids.len()),
            SUMMARY_GROUP_BY
        );
        let rows: Vec<OwnedSummary> = with_pool!(self.pool, |p| {
            let mut query = sqlx::query_as::<_, OwnedSummary>(&sql);
            for id in user_ids {
                query = query.bind(*id);
            }
            query.fetch_all(p).await.context("Failed to list visited cities of users")?
        });
        Ok(rows.into_iter().map(|r| (r.owner_id, r.summary)).collect())
    }

    async fn list_not_visited(&self, user_id: i64) -> Result<Vec<City>> {
        let sql = "SELECT c.id, c.title, c.region_id, c.population, c.date_of_foundation, \
                   c.latitude, c.longitude, c.wiki, c.image \
                   FROM cities c \
                   WHERE NOT EXISTS (SELECT 1 FROM visited_cities v WHERE v.city_id = c.id AND v.user_id = ?) \
                   ORDER BY c.title";
        let cities = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, City>(sql)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to list not visited cities")?
        });
        Ok(cities)
    }
}

#[derive(sqlx::FromRow)]
struct OwnedSummary {
    owner_id: i64,
    #[sqlx(flatten)]
    summary: VisitedCitySummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures::{self, date};

    fn input(city_id: i64, date: Option<NaiveDate>, rating: i64, magnet: bool) -> VisitedCityInput {
        VisitedCityInput {
            city_id,
            date_of_visit: date,
            has_magnet: magnet,
            impression: None,
            rating,
        }
    }

    async fn first_flags(repo: &SqlxVisitedCityRepository, ids: &[i64]) -> Vec<bool> {
        let mut flags = Vec::new();
        for id in ids {
            flags.push(repo.get_by_id(*id).await.unwrap().unwrap().is_first_visit);
        }
        flags
    }

    #[tokio::test]
    async fn test_first_visit_is_earliest_dated() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxVisitedCityRepository::new(pool);
        let city = geo.cities[0];
        let region = geo.regions[0];

        let undated = repo.create(user, region, &input(city, None, 3, false)).await.unwrap();
        let late = repo.create(user, region, &input(city, Some(date(2024, 6, 1)), 4, false)).await.unwrap();
        let early = repo.create(user, region, &input(city, Some(date(2021, 6, 1)), 5, true)).await.unwrap();
        repo.recompute_first_visit(user, city).await.unwrap();

        assert_eq!(first_flags(&repo, &[undated, late, early]).await, vec![false, false, true]);

        repo.delete(early).await.unwrap();
        repo.recompute_first_visit(user, city).await.unwrap();
        assert_eq!(first_flags(&repo, &[undated, late]).await, vec![false, true]);

        repo.delete(late).await.unwrap();
        repo.recompute_first_visit(user, city).await.unwrap();
        assert_eq!(first_flags(&repo, &[undated]).await, vec![true]);
    }

    #[tokio::test]
    async fn test_exists_on_date_treats_undated_as_equal() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxVisitedCityRepository::new(pool);
        let city = geo.cities[0];

        let id = repo.create(user, geo.regions[0], &input(city, None, 3, false)).await.unwrap();
        assert!(repo.exists_on_date(user, city, None, None).await.unwrap());
        assert!(!repo.exists_on_date(user, city, None, Some(id)).await.unwrap());
        assert!(!repo.exists_on_date(user, city, Some(date(2024, 1, 1)), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_summaries_fold_visits() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxVisitedCityRepository::new(pool);

        let tver = geo.cities[0];
        repo.create(user, geo.regions[0], &input(tver, Some(date(2020, 1, 1)), 4, false)).await.unwrap();
        repo.create(user, geo.regions[0], &input(tver, Some(date(2023, 1, 1)), 5, true)).await.unwrap();
        repo.create(user, geo.regions[2], &input(geo.cities[5], None, 3, false)).await.unwrap();

        let rows = repo
            .list_summaries(user, None, "(t.first_visit_date IS NULL), t.first_visit_date DESC, t.city_title ASC")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].city_title, "Тверь");
        assert_eq!(rows[0].number_of_visits, 2);
        assert_eq!(rows[0].first_visit_date, Some(date(2020, 1, 1)));
        assert_eq!(rows[0].last_visit_date, Some(date(2023, 1, 1)));
        assert!((rows[0].average_rating - 4.5).abs() < f64::EPSILON);
        assert!(rows[0].has_magnet());
        assert_eq!(rows[1].city_title, "Казань");

        let magnets = repo.list_summaries(user, Some("t.magnets > 0"), "t.city_title ASC").await.unwrap();
        assert_eq!(magnets.len(), 1);
    }

    #[tokio::test]
    async fn test_summaries_for_users_and_not_visited() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let ivan = fixtures::insert_user(&pool, "ivan").await;
        let petr = fixtures::insert_user(&pool, "petr").await;
        let repo = SqlxVisitedCityRepository::new(pool);

        repo.create(ivan, geo.regions[0], &input(geo.cities[0], None, 3, false)).await.unwrap();
        repo.create(petr, geo.regions[1], &input(geo.cities[3], None, 3, false)).await.unwrap();

        let rows = repo.list_summaries_for_users(&[ivan, petr]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, ivan);
        assert_eq!(rows[1].1.city_title, "Ярославль");

        let not_visited = repo.list_not_visited(ivan).await.unwrap();
        assert_eq!(not_visited.len(), 5);
        assert!(not_visited.iter().all(|c| c.id != geo.cities[0]));
    }
}
