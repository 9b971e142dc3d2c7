//! Curated collections, favorites and personal collections

use crate::db::dialect::{placeholders, Dialect, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{Collection, CollectionCity, CollectionProgress, PersonalCollection};
use crate::with_pool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Collection>>;
    async fn get(&self, id: i64) -> Result<Option<Collection>>;
    async fn create(&self, title: &str, city_ids: &[i64]) -> Result<Collection>;
    /// Replace title and member cities
    async fn update(&self, id: i64, title: &str, city_ids: &[i64]) -> Result<bool>;
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Every collection with `user_id`'s progress; `filter` and `order` are
    /// SQL fragments over the row `t`
    async fn list_progress(&self, user_id: i64, filter: Option<&str>, order: &str) -> Result<Vec<CollectionProgress>>;
    async fn get_progress(&self, user_id: i64, id: i64) -> Result<Option<CollectionProgress>>;
    /// Member cities with `user_id`'s visit counts
    async fn list_cities(&self, user_id: i64, collection_id: i64) -> Result<Vec<CollectionCity>>;

    async fn is_favorite(&self, user_id: i64, collection_id: i64) -> Result<bool>;
    async fn add_favorite(&self, user_id: i64, collection_id: i64) -> Result<()>;
    async fn remove_favorite(&self, user_id: i64, collection_id: i64) -> Result<()>;

    // Personal collections
    async fn create_personal(&self, user_id: i64, title: &str, is_public: bool, city_ids: &[i64]) -> Result<PersonalCollection>;
    async fn get_personal(&self, id: i64) -> Result<Option<PersonalCollection>>;
    async fn list_personal(&self, user_id: i64) -> Result<Vec<PersonalCollection>>;
    /// Member cities of a personal collection with `viewer_id`'s visit counts
    async fn list_personal_cities(&self, viewer_id: i64, collection_id: i64) -> Result<Vec<CollectionCity>>;
    async fn update_personal(&self, id: i64, title: &str, is_public: bool, city_ids: &[i64]) -> Result<bool>;
    async fn delete_personal(&self, id: i64) -> Result<bool>;

    /// Ids among `city_ids` that exist in `cities`
    async fn existing_city_ids(&self, city_ids: &[i64]) -> Result<Vec<i64>>;
}

pub struct SqlxCollectionRepository {
    pool: DynDatabasePool,
}

impl SqlxCollectionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CollectionRepository> {
        Arc::new(Self::new(pool))
    }

    fn progress_select(&self) -> String {
        let d = Dialect::of(&self.pool);
        format!(
            r#"
            SELECT q.id, q.title, q.total_cities, q.visited_cities, q.favorite,
                   {} AS ratio
            FROM (
                SELECT col.id, col.title,
                       (SELECT COUNT(*) FROM collection_cities cc
                        WHERE cc.collection_id = col.id) AS total_cities,
                       (SELECT COUNT(DISTINCT cc.city_id) FROM collection_cities cc
                        JOIN visited_cities v ON v.city_id = cc.city_id AND v.user_id = ?
                        WHERE cc.collection_id = col.id) AS visited_cities,
                       (SELECT COUNT(*) FROM favorite_collections f
                        WHERE f.collection_id = col.id AND f.user_id = ?) AS favorite
                FROM collections col
            ) q
            "#,
            d.int(&d.ratio("q.visited_cities", "q.total_cities"))
        )
    }

    /// Replace the member rows of `table` for one collection
    async fn replace_cities(&self, table: &str, key: &str, id: i64, city_ids: &[i64]) -> Result<()> {
        let delete = format!("DELETE FROM {} WHERE {} = ?", table, key);
        let insert = format!(
            "{} INTO {} ({}, city_id) VALUES (?, ?)",
            Dialect::of(&self.pool).insert_ignore(),
            table,
            key
        );
        with_pool!(self.pool, |p| {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;
            sqlx::query(&delete)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear collection cities")?;
            for city_id in city_ids {
                sqlx::query(&insert)
                    .bind(id)
                    .bind(*city_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to add collection city")?;
            }
            tx.commit().await.context("Failed to commit collection cities")?;
        });
        Ok(())
    }

    async fn cities_of(&self, table: &str, key: &str, user_id: i64, id: i64) -> Result<Vec<CollectionCity>> {
        let sql = format!(
            r#"
            SELECT c.id, c.title, c.region_id, r.title AS region_title, c.population,
                   c.latitude, c.longitude,
                   (SELECT COUNT(*) FROM visited_cities v
                    WHERE v.city_id = c.id AND v.user_id = ?) AS visits
            FROM {} m
            JOIN cities c ON c.id = m.city_id
            JOIN regions r ON r.id = c.region_id
            WHERE m.{} = ?
            ORDER BY c.title
            "#,
            table, key
        );
        let cities = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, CollectionCity>(&sql)
                .bind(user_id)
                .bind(id)
                .fetch_all(p)
                .await
                .context("Failed to list collection cities")?
        });
        Ok(cities)
    }

    async fn delete_row(&self, table: &str, id: i64) -> Result<bool> {
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
}

const PERSONAL_COLUMNS: &str = "id, user_id, title, is_public, created_at, updated_at";

#[async_trait]
impl CollectionRepository for SqlxCollectionRepository {
    async fn list(&self) -> Result<Vec<Collection>> {
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Collection>("SELECT id, title, created_at FROM collections ORDER BY title")
                .fetch_all(p)
                .await
                .context("Failed to list collections")?
        });
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Collection>> {
        let row = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, Collection>("SELECT id, title, created_at FROM collections WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get collection")?
        });
        Ok(row)
    }

    async fn create(&self, title: &str, city_ids: &[i64]) -> Result<Collection> {
        let now = Utc::now();
        let id = with_pool!(self.pool, |p| {
            sqlx::query("INSERT INTO collections (title, created_at) VALUES (?, ?)")
                .bind(title)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create collection")?
                .insert_id()
        });
        self.replace_cities("collection_cities", "collection_id", id, city_ids).await?;
        Ok(Collection {
            id,
            title: title.to_string(),
            created_at: now,
        })
    }

    async fn update(&self, id: i64, title: &str, city_ids: &[i64]) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("UPDATE collections SET title = ? WHERE id = ?")
                .bind(title)
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update collection")?
                .rows_affected()
        });
        if affected == 0 {
            return Ok(false);
        }
        self.replace_cities("collection_cities", "collection_id", id, city_ids).await?;
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.delete_row("collections", id).await
    }

    async fn list_progress(&self, user_id: i64, filter: Option<&str>, order: &str) -> Result<Vec<CollectionProgress>> {
        let sql = format!(
            "SELECT t.* FROM ({}) t WHERE {} ORDER BY {}",
            self.progress_select(),
            filter.unwrap_or("1 = 1"),
            order
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, CollectionProgress>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to list collection progress")?
        });
        Ok(rows)
    }

    async fn get_progress(&self, user_id: i64, id: i64) -> Result<Option<CollectionProgress>> {
        let sql = format!("SELECT t.* FROM ({}) t WHERE t.id = ?", self.progress_select());
        let row = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, CollectionProgress>(&sql)
                .bind(user_id)
                .bind(user_id)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get collection progress")?
        });
        Ok(row)
    }

    async fn list_cities(&self, user_id: i64, collection_id: i64) -> Result<Vec<CollectionCity>> {
        self.cities_of("collection_cities", "collection_id", user_id, collection_id).await
    }

    async fn is_favorite(&self, user_id: i64, collection_id: i64) -> Result<bool> {
        let (count,): (i64,) = with_pool!(self.pool, |p| {
            sqlx::query_as("SELECT COUNT(*) FROM favorite_collections WHERE user_id = ? AND collection_id = ?")
                .bind(user_id)
                .bind(collection_id)
                .fetch_one(p)
                .await
                .context("Failed to check favorite")?
        });
        Ok(count > 0)
    }

    async fn add_favorite(&self, user_id: i64, collection_id: i64) -> Result<()> {
        let sql = format!(
            "{} INTO favorite_collections (user_id, collection_id) VALUES (?, ?)",
            Dialect::of(&self.pool).insert_ignore()
        );
        with_pool!(self.pool, |p| {
            sqlx::query(&sql)
                .bind(user_id)
                .bind(collection_id)
                .execute(p)
                .await
                .context("Failed to add favorite")?;
        });
        Ok(())
    }

    async fn remove_favorite(&self, user_id: i64, collection_id: i64) -> Result<()> {
        with_pool!(self.pool, |p| {
            sqlx::query("DELETE FROM favorite_collections WHERE user_id = ? AND collection_id = ?")
                .bind(user_id)
                .bind(collection_id)
                .execute(p)
                .await
                .context("Failed to remove favorite")?;
        });
        Ok(())
    }

    async fn create_personal(&self, user_id: i64, title: &str, is_public: bool, city_ids: &[i64]) -> Result<PersonalCollection> {
        let now = Utc::now();
        let sql = "INSERT INTO personal_collections (user_id, title, is_public, created_at, updated_at) VALUES (?, ?, ?, ?, ?)";
        let id = with_pool!(self.pool, |p| {
            sqlx::query(sql)
                .bind(user_id)
                .bind(title)
                .bind(is_public)
                .bind(now)
                .bind(now)
                .execute(p)
                .await
                .context("Failed to create personal collection")?
                .insert_id()
        });
        self.replace_cities("personal_collection_cities", "personal_collection_id", id, city_ids)
            .await?;
        Ok(PersonalCollection {
            id,
            user_id,
            title: title.to_string(),
            is_public,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_personal(&self, id: i64) -> Result<Option<PersonalCollection>> {
        let sql = format!("SELECT {} FROM personal_collections WHERE id = ?", PERSONAL_COLUMNS);
        let row = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, PersonalCollection>(&sql)
                .bind(id)
                .fetch_optional(p)
                .await
                .context("Failed to get personal collection")?
        });
        Ok(row)
    }

    async fn list_personal(&self, user_id: i64) -> Result<Vec<PersonalCollection>> {
        let sql = format!(
            "SELECT {} FROM personal_collections WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            PERSONAL_COLUMNS
        );
        let rows = with_pool!(self.pool, |p| {
            sqlx::query_as::<_, PersonalCollection>(&sql)
                .bind(user_id)
                .fetch_all(p)
                .await
                .context("Failed to list personal collections")?
        });
        Ok(rows)
    }

    async fn list_personal_cities(&self, viewer_id: i64, collection_id: i64) -> Result<Vec<CollectionCity>> {
        self.cities_of("personal_collection_cities", "personal_collection_id", viewer_id, collection_id)
            .await
    }

    async fn update_personal(&self, id: i64, title: &str, is_public: bool, city_ids: &[i64]) -> Result<bool> {
        let affected = with_pool!(self.pool, |p| {
            sqlx::query("UPDATE personal_collections SET title = ?, is_public = ?, updated_at = ? WHERE id = ?")
                .bind(title)
                .bind(is_public)
                .bind(Utc::now())
                .bind(id)
                .execute(p)
                .await
                .context("Failed to update personal collection")?
                .rows_affected()
        });
        if affected == 0 {
            return Ok(false);
        }
        self.replace_cities("personal_collection_cities", "personal_collection_id", id, city_ids)
            .await?;
        Ok(true)
    }

    async fn delete_personal(&self, id: i64) -> Result<bool> {
        self.delete_row("personal_collections", id).await
    }

    async fn existing_city_ids(&self, city_ids: &[i64]) -> Result<Vec<i64>> {
        if city_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT id FROM cities WHERE id IN ({})", placeholders(city_ids.len()));
        let rows: Vec<(i64,)> = with_pool!(self.pool, |p| {
            let mut query = sqlx::query_as(&sql);
            for id in city_ids {
                query = query.bind(*id);
            }
            query.fetch_all(p).await.context("Failed to check city ids")?
        });
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures;

    #[tokio::test]
    async fn test_progress_and_favorites() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        fixtures::insert_visit(&pool, user, geo.cities[0], None, 5).await;
        fixtures::insert_visit(&pool, user, geo.cities[0], Some(fixtures::date(2020, 1, 1)), 5).await;
        let repo = SqlxCollectionRepository::new(pool);

        let ring = repo
            .create("Золотое кольцо", &[geo.cities[0], geo.cities[3], geo.cities[4]])
            .await
            .unwrap();
        let volga = repo.create("Волга", &[geo.cities[5]]).await.unwrap();
        repo.add_favorite(user, volga.id).await.unwrap();
        repo.add_favorite(user, volga.id).await.unwrap();

        let rows = repo.list_progress(user, None, "t.title ASC").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Волга");
        assert!(rows[0].is_favorite());
        assert_eq!(rows[1].total_cities, 3);
        assert_eq!(rows[1].visited_cities, 1);
        assert_eq!(rows[1].ratio, 33);

        let started = repo
            .list_progress(user, Some("t.visited_cities > 0"), "t.title ASC")
            .await
            .unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id, ring.id);

        repo.remove_favorite(user, volga.id).await.unwrap();
        assert!(!repo.is_favorite(user, volga.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_replaces_cities() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let repo = SqlxCollectionRepository::new(pool);

        let c = repo.create("Тверские", &[geo.cities[0], geo.cities[1]]).await.unwrap();
        assert!(repo.update(c.id, "Тверские города", &[geo.cities[2]]).await.unwrap());

        let cities = repo.list_cities(0, c.id).await.unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].title, "Торжок");
        assert_eq!(cities[0].visits, 0);
        assert!(!repo.update(9999, "x", &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_personal_collections() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        let repo = SqlxCollectionRepository::new(pool.clone());

        let pc = repo
            .create_personal(user, "Хочу посетить", true, &[geo.cities[3], geo.cities[5]])
            .await
            .unwrap();
        assert_eq!(repo.list_personal(user).await.unwrap().len(), 1);
        assert_eq!(repo.list_personal_cities(user, pc.id).await.unwrap().len(), 2);

        let found = repo.get_personal(pc.id).await.unwrap().unwrap();
        assert!(found.is_public);

        assert!(repo.delete_personal(pc.id).await.unwrap());
        assert!(repo.get_personal(pc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_city_ids() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;

        let repo = SqlxCollectionRepository::new(pool);

        let ids = repo.existing_city_ids(&[geo.cities[0], 9999]).await.unwrap();
        assert_eq!(ids, vec![geo.cities[0]]);
        assert!(repo.existing_city_ids(&[]).await.unwrap().is_empty());
    }
}
