//! Areas, regions and cities
//!
//! Reference data maintained by administrators and the `import-geo` tool.
//! Update and delete methods return `false` when no row matched.

use crate::db::dialect::InsertId;
use crate::db::DynDatabasePool;
use crate::models::{Area, AreaInput, City, CityDetail, CityInput, Region, RegionCity, RegionInput};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

const REGION_COLUMNS: &str = "id, area_id, title, region_type, iso3166";
const CITY_COLUMNS: &str =
    "id, title, region_id, population, date_of_foundation, latitude, longitude, wiki, image";

#[async_trait]
pub trait GeoRepository: Send + Sync {
    // Areas
    async fn list_areas(&self) -> Result<Vec<Area>>;
    async fn get_area(&self, id: i64) -> Result<Option<Area>>;
    async fn get_area_by_title(&self, title: &str) -> Result<Option<Area>>;
    async fn create_area(&self, input: &AreaInput) -> Result<Area>;
    async fn update_area(&self, id: i64, input: &AreaInput) -> Result<bool>;
    async fn delete_area(&self, id: i64) -> Result<bool>;

    // Regions
    async fn list_regions(&self) -> Result<Vec<Region>>;
    async fn get_region(&self, id: i64) -> Result<Option<Region>>;
    async fn get_region_by_iso(&self, iso3166: &str) -> Result<Option<Region>>;
    async fn create_region(&self, input: &RegionInput) -> Result<Region>;
    async fn update_region(&self, id: i64, input: &RegionInput) -> Result<bool>;
    async fn delete_region(&self, id: i64) -> Result<bool>;
    async fn count_regions(&self) -> Result<i64>;

    // Cities
    async fn get_city(&self, id: i64) -> Result<Option<City>>;
    /// City with region and area names
    async fn get_city_detail(&self, id: i64) -> Result<Option<CityDetail>>;
    async fn get_city_by_title(&self, region_id: i64, title: &str) -> Result<Option<City>>;
    /// Cities of a region by title, for the visit form dropdown
    async fn list_cities_by_region(&self, region_id: i64) -> Result<Vec<City>>;
    /// Every city, ordered by region then title
    async fn list_cities(&self) -> Result<Vec<City>>;
    /// Cities of a region with `user_id`'s visit counts.
    ///
    /// `filter` and `order` are SQL fragments over the aliased row `t`.
    async fn list_region_cities(
        &self,
        user_id: i64,
        region_id: i64,
        filter: Option<&str>,
        order: &str,
    ) -> Result<Vec<RegionCity>>;
    async fn create_city(&self, input: &CityInput) -> Result<City>;
    async fn update_city(&self, id: i64, input: &CityInput) -> Result<bool>;
    async fn delete_city(&self, id: i64) -> Result<bool>;
    async fn count_cities(&self) -> Result<i64>;
    async fn count_cities_in_region(&self, region_id: i64) -> Result<i64>;
}

pub struct SqlxGeoRepository {
    pool: DynDatabasePool,
}

impl SqlxGeoRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GeoRepository> {
        Arc::new(Self::new(pool))
    }

    async fn delete_from(&self, table: &str, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table);
        let affected = with_pool!(self.pool, |p| {
            sqlx::query(&sql)
                .bind(id)
                .execute(p)
                .await
                .with_context(|| format!("Failed to delete from {}", table))?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let (count,): (i64,) = with_pool!(self.pool, |p| {
            sqlx::query_as(sql).fetch_one(p).await.context("Failed to count rows")?
        });
        Ok(count)
    }
}

#[async_trait]
impl GeoRepository for SqlxGeoRepository {
    // ------------------------------------------------------------------
    // Areas
    // ------------------------------------------------------------------

    async fn list_areas(&self) -> Result<Vec<Area>> {
        let areas = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Area>("SELECT id, title FROM areas ORDER BY title")
                .fetch_all(p)
                .await
                .context("Failed to list areas")?
        });
        Ok(areas)
    }

    async fn get_area(&self, id: i64) -> Result<Option<Area>> {
        let area = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Area>("SELECT id, title FROM areas WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get area")?
        });
        Ok(area)
    }

    async fn get_area_by_title(&self, title: &str) -> Result<Option<Area>> {
        let area = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Area>("SELECT id, title FROM areas WHERE title = ?")
                .bind(title)
                .fetch_optional(p)
                .await
                .context("Failed to get area by title")?
        });
        Ok(area)
    }

    async fn create_area(&self, input: &AreaInput) -> Result<Area> {
        let title = input.title.trim();
        let id = with_pool!(self.pool, |p| {
            sqlx::query("INSERT INTO areas (title) VALUES (?)")
                .bind(title)
                .execute(p)
                .await
                .context("Failed to create area")?
                .insert_id()
        });
        Ok(Area {
            id,
            title: title.to_string(),
        })
    }

    async fn update_area(&self, id: i64, input: &AreaInput) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("UPDATE areas SET title = ? WHERE id = ?")
                .bind(input.title.trim())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update area")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete_area(&self, id: i64) -> Result<bool> {
        self.delete_from("areas", id).await
    }

    // ------------------------------------------------------------------
    // Regions
    // ------------------------------------------------------------------

    async fn list_regions(&self) -> Result<Vec<Region>> {
        let sql = format!("SELECT {} FROM regions ORDER BY title", REGION_COLUMNS);
        let regions = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Region>(&sql)
                .fetch_all(p)
                .await
                .context("Failed to list regions")?
        });
        Ok(regions)
    }

    async fn get_region(&self, id: i64) -> Result<Option<Region>> {
        let sql = format!("SELECT {} FROM regions WHERE id = ?", REGION_COLUMNS);
        let region = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Region>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get region")?
        });
        Ok(region)
    }

    async fn get_region_by_iso(&self, iso3166: &str) -> Result<Option<Region>> {
        let sql = format!("SELECT {} FROM regions WHERE iso3166 = ?", REGION_COLUMNS);
        let region = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Region>(&sql)
                .bind(iso3166)
                .fetch_optional(p)
                .await
                .context("Failed to get region by ISO code")?
        });
        Ok(region)
    }

    async fn create_region(&self, input: &RegionInput) -> Result<Region> {
        let sql = "INSERT INTO regions (area_id, title, region_type, iso3166) VALUES (?, ?, ?, ?)";
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(input.area_id)
                .bind(input.title.trim())
                .bind(input.region_type.as_str())
                .bind(input.iso3166.trim())
                .execute(p)
                .await
                .context("Failed to create region")?
                .insert_id()
        });
        Ok(Region {
            id,
            area_id: input.area_id,
            title: input.title.trim().to_string(),
            region_type: input.region_type,
            iso3166: input.iso3166.trim().to_string(),
        })
    }

    async fn update_region(&self, id: i64, input: &RegionInput) -> Result<bool> {
        let sql = "UPDATE regions SET area_id = ?, title = ?, region_type = ?, iso3166 = ? WHERE id = ?";
        let affected = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(input.area_id)
                .bind(input.title.trim())
                .bind(input.region_type.as_str())
                .bind(input.iso3166.trim())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update region")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn delete_region(&self, id: i64) -> Result<bool> {
        self.delete_from("regions", id).await
    }

    async fn count_regions(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM regions").await
    }

    // ------------------------------------------------------------------
    // Cities
    // ------------------------------------------------------------------

    async fn get_city(&self, id: i64) -> Result<Option<City>> {
        let sql = format!("SELECT {} FROM cities WHERE id = ?", CITY_COLUMNS);
        let city = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, City>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get city")?
        });
        Ok(city)
    }

    async fn get_city_detail(&self, id: i64) -> Result<Option<CityDetail>> {
        let sql = r#"
            SELECT c.id, c.title, c.region_id, c.population, c.date_of_foundation,
                   c.latitude, c.longitude, c.wiki, c.image,
                   r.title AS region_title, r.region_type, r.area_id, a.title AS area_title
            FROM cities c
            JOIN regions r ON r.id = c.region_id
            LEFT JOIN areas a ON a.id = r.area_id
            WHERE c.id = ?
        "#;
        let city = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, CityDetail>(sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get city detail")?
        });
        Ok(city)
    }

    async fn get_city_by_title(&self, region_id: i64, title: &str) -> Result<Option<City>> {
        let sql = format!("SELECT {} FROM cities WHERE region_id = ? AND title = ?", CITY_COLUMNS);
        let city = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, City>(&sql)
                .bind(region_id)
                .bind(title)
                .fetch_optional(p)
                .await
                .context("Failed to get city by title")?
        });
        Ok(city)
    }

    async fn list_cities_by_region(&self, region_id: i64) -> Result<Vec<City>> {
        let sql = format!("SELECT {} FROM cities WHERE region_id = ? ORDER BY title", CITY_COLUMNS);
        let cities = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, City>(&sql)
                .bind(region_id)
                .fetch_all(p)
                .await
                .context("Failed to list cities of region")?
        });
        Ok(cities)
    }

    async fn list_cities(&self) -> Result<Vec<City>> {
        let sql = format!("SELECT {} FROM cities ORDER BY region_id, title", CITY_COLUMNS);
        let cities = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, City>(&sql)
                .fetch_all(p)
                .await
                .context("Failed to list cities")?
        });
        Ok(cities)
    }

    async fn list_region_cities(
        &self,
        user_id: i64,
        region_id: i64,
        filter: Option<&str>,
        order: &str,
    ) -> Result<Vec<RegionCity>> {
        let sql = format!(
            r#"
            SELECT t.* FROM (
                SELECT c.id, c.title, c.population, c.date_of_foundation, c.latitude, c.longitude,
                       (SELECT COUNT(*) FROM visited_cities v
                        WHERE v.city_id = c.id AND v.user_id = ?) AS visits
                FROM cities c
                WHERE c.region_id = ?
            ) t
            WHERE {}
            ORDER BY {}
            "#,
            filter.unwrap_or("1 = 1"),
            order
        );
        let cities = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, RegionCity>(&sql)
                .bind(user_id)
                .bind(region_id)
                .fetch_all(p)
                .await
                .context("Failed to list region cities")?
        });
        Ok(cities)
    }

    async fn create_city(&self, input: &CityInput) -> Result<City> {
        let sql = "INSERT INTO cities (title, region_id, population, date_of_foundation, latitude, longitude, wiki, image) \
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)";
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(input.title.trim())
                .bind(input.region_id)
                .bind(input.population)
                .bind(input.date_of_foundation)
                .bind(input.latitude)
                .bind(input.longitude)
                .bind(input.wiki.as_deref())
                .bind(input.image.as_deref())
                .execute(p)
                .await
                .context("Failed to create city")?
                .insert_id()
        });
        Ok(City {
            id,
            title: input.title.trim().to_string(),
            region_id: input.region_id,
            population: input.population,
            date_of_foundation: input.date_of_foundation,
            latitude: input.latitude,
            longitude: input.longitude,
            wiki: input.wiki.clone(),
            image: input.image.clone(),
        })
    }

    async fn update_city(&self, id: i64, input: &CityInput) -> Result<bool> {
        let sql = "UPDATE cities SET title = ?, region_id = ?, population = ?, date_of_foundation = ?, \
                   latitude = ?, longitude = ?, wiki = ?, image = ? WHERE id = ?";
        let affected = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(input.title.trim())
                .bind(input.region_id)
                .bind(input.population)
                .bind(input.date_of_foundation)
                .bind(input.latitude)
                .bind(input.longitude)
                .bind(input.wiki.as_deref())
                .bind(input.image.as_deref())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update city")?
                .rows_affected()
        });
        if affected > 0 {
            // Visits follow their city into the new region
            with_pool!(self.pool, |p| {
                sqlx::query("UPDATE visited_cities SET region_id = ? WHERE city_id = ?")
                    .bind(input.region_id)
                    .bind(id)
                    .execute(p)
                    .await
                    .context("Failed to move visits to new region")?;
            });
        }
        Ok(affected > 0)
    }

    async fn delete_city(&self, id: i64) -> Result<bool> {
        self.delete_from("cities", id).await
    }

    async fn count_cities(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM cities").await
    }

    async fn count_cities_in_region(&self, region_id: i64) -> Result<i64> {
        let (count,): (i64,) = with_pool!(self.pool, |p| {
            sqlx::query_as("SELECT COUNT(*) FROM cities WHERE region_id = ?")
                .bind(region_id)
                .fetch_one(p)
                .await
                .context("Failed to count cities of region")?
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures::{self, date};
    use crate::models::RegionType;

    #[tokio::test]
    async fn test_area_crud() {
        let pool = fixtures::migrated_pool().await;
        let repo = SqlxGeoRepository::new(pool);

        let area = repo
            .create_area(&AreaInput { title: " Северо-Западный ".into() })
            .await
            .unwrap();
        assert_eq!(area.title, "Северо-Западный");
        assert!(repo.get_area_by_title("Северо-Западный").await.unwrap().is_some());

        assert!(repo.update_area(area.id, &AreaInput { title: "СЗФО".into() }).await.unwrap());
        assert_eq!(repo.get_area(area.id).await.unwrap().unwrap().title, "СЗФО");

        assert!(repo.delete_area(area.id).await.unwrap());
        assert!(!repo.delete_area(area.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_region_roundtrips_type() {
        let pool = fixtures::migrated_pool().await;
        let repo = SqlxGeoRepository::new(pool);

        let region = repo
            .create_region(&RegionInput {
                area_id: None,
                title: "Карелия".into(),
                region_type: RegionType::Republic,
                iso3166: "RU-KR".into(),
            })
            .await
            .unwrap();

        let found = repo.get_region_by_iso("RU-KR").await.unwrap().unwrap();
        assert_eq!(found.id, region.id);
        assert_eq!(found.region_type, RegionType::Republic);
        assert_eq!(found.full_name(), "Республика Карелия");
    }

    #[tokio::test]
    async fn test_city_detail_joins_region_and_area() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let repo = SqlxGeoRepository::new(pool);

        let detail = repo.get_city_detail(geo.cities[0]).await.unwrap().unwrap();
        assert_eq!(detail.city.title, "Тверь");
        assert_eq!(detail.region_title, "Тверская");
        assert_eq!(detail.area_title.as_deref(), Some("Центральный"));
        assert_eq!(detail.region_full_name(), "Тверская область");
    }

    #[tokio::test]
    async fn test_counts() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let repo = SqlxGeoRepository::new(pool);

        assert_eq!(repo.count_cities().await.unwrap(), 6);
        assert_eq!(repo.count_regions().await.unwrap(), 3);
        assert_eq!(repo.count_cities_in_region(geo.regions[0]).await.unwrap(), 3);

        let tatarstan = repo.get_region(geo.regions[2]).await.unwrap().unwrap();
        assert_eq!(tatarstan.area_id, Some(geo.areas[1]));
    }

    #[tokio::test]
    async fn test_region_cities_carry_visit_counts() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        fixtures::insert_visit(&pool, user, geo.cities[1], Some(date(2023, 5, 1)), 4).await;
        fixtures::insert_visit(&pool, user, geo.cities[1], Some(date(2024, 5, 1)), 5).await;
        let repo = SqlxGeoRepository::new(pool);

        let all = repo
            .list_region_cities(user, geo.regions[0], None, "t.title ASC")
            .await
            .unwrap();
        let titles: Vec<_> = all.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Ржев", "Тверь", "Торжок"]);
        assert_eq!(all[0].visits, 2);
        assert!(!all[1].is_visited());

        let visited = repo
            .list_region_cities(user, geo.regions[0], Some("t.visits > 0"), "t.title ASC")
            .await
            .unwrap();
        assert_eq!(visited.len(), 1);
    }

    #[tokio::test]
    async fn test_moving_city_moves_visits() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        fixtures::insert_visit(&pool, user, geo.cities[0], None, 3).await;
        let repo = SqlxGeoRepository::new(pool.clone());

        let city = repo.get_city(geo.cities[0]).await.unwrap().unwrap();
        let input = CityInput {
            title: city.title,
            region_id: geo.regions[1],
            population: city.population,
            date_of_foundation: Some(1135),
            latitude: city.latitude,
            longitude: city.longitude,
            wiki: None,
            image: None,
        };
        assert!(repo.update_city(city.id, &input).await.unwrap());

        let (region_id,): (i64,) = sqlx::query_as("SELECT region_id FROM visited_cities")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(region_id, geo.regions[1]);
    }
}
