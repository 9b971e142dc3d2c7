//! Collections: curated city sets, favorites and personal collections

use crate::db::repositories::CollectionRepository;
use crate::models::{
    Collection, CollectionCity, CollectionInput, CollectionProgress, ParseEnumError, PersonalCollection,
    PersonalCollectionInput,
};
use crate::services::{clean_title, ServiceError, ServiceResult};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

const MAX_TITLE_CHARS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionFilter {
    Favorite,
    /// Some cities visited, not all
    Started,
    Finished,
    NotStarted,
}

impl CollectionFilter {
    pub fn sql(&self) -> &'static str {
        match self {
            CollectionFilter::Favorite => "t.favorite > 0",
            CollectionFilter::Started => "t.visited_cities > 0 AND t.visited_cities < t.total_cities",
            CollectionFilter::Finished => "t.total_cities > 0 AND t.visited_cities = t.total_cities",
            CollectionFilter::NotStarted => "t.visited_cities = 0",
        }
    }
}

impl FromStr for CollectionFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "favorite" => Ok(CollectionFilter::Favorite),
            "started" => Ok(CollectionFilter::Started),
            "finished" => Ok(CollectionFilter::Finished),
            "not_started" => Ok(CollectionFilter::NotStarted),
            _ => Err(ParseEnumError::new("filter", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionSort {
    #[default]
    Default,
    NameDown,
    NameUp,
    ProgressDown,
    ProgressUp,
}

impl CollectionSort {
    pub fn sql(&self) -> &'static str {
        match self {
            CollectionSort::Default | CollectionSort::NameDown => "t.title ASC",
            CollectionSort::NameUp => "t.title DESC",
            CollectionSort::ProgressDown => "t.ratio DESC, t.title ASC",
            CollectionSort::ProgressUp => "t.ratio ASC, t.title ASC",
        }
    }
}

impl FromStr for CollectionSort {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(CollectionSort::Default),
            "name_down" => Ok(CollectionSort::NameDown),
            "name_up" => Ok(CollectionSort::NameUp),
            "progress_down" => Ok(CollectionSort::ProgressDown),
            "progress_up" => Ok(CollectionSort::ProgressUp),
            _ => Err(ParseEnumError::new("sort", s)),
        }
    }
}

pub struct CollectionService {
    repo: Arc<dyn CollectionRepository>,
}

impl CollectionService {
    pub fn new(repo: Arc<dyn CollectionRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(
        &self,
        user_id: i64,
        filter: Option<CollectionFilter>,
        sort: CollectionSort,
    ) -> ServiceResult<Vec<CollectionProgress>> {
        Ok(self
            .repo
            .list_progress(user_id, filter.map(|f| f.sql()), sort.sql())
            .await?)
    }

    pub async fn get(&self, user_id: i64, collection_id: i64) -> ServiceResult<CollectionProgress> {
        self.repo
            .get_progress(user_id, collection_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("коллекция {}", collection_id)))
    }

    /// Collection progress with its cities
    pub async fn cities(
        &self,
        user_id: i64,
        collection_id: i64,
    ) -> ServiceResult<(CollectionProgress, Vec<CollectionCity>)> {
        let progress = self.get(user_id, collection_id).await?;
        let cities = self.repo.list_cities(user_id, collection_id).await?;
        Ok((progress, cities))
    }

    /// Flip the favorite mark; returns whether the collection is now a favorite
    pub async fn toggle_favorite(&self, user_id: i64, collection_id: i64) -> ServiceResult<bool> {
        if self.repo.get(collection_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("коллекция {}", collection_id)));
        }
        if self.repo.is_favorite(user_id, collection_id).await? {
            self.repo.remove_favorite(user_id, collection_id).await?;
            Ok(false)
        } else {
            self.repo.add_favorite(user_id, collection_id).await?;
            Ok(true)
        }
    }

    // Curated collections (admin)

    pub async fn list_all(&self) -> ServiceResult<Vec<Collection>> {
        Ok(self.repo.list().await?)
    }

    pub async fn create(&self, input: CollectionInput) -> ServiceResult<Collection> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        let city_ids = self.checked_city_ids(&input.city_ids).await?;
        self.ensure_unique_title(&title, None).await?;

        let collection = self.repo.create(&title, &city_ids).await?;
        tracing::info!(collection_id = collection.id, cities = city_ids.len(), "Collection created");
        Ok(collection)
    }

    pub async fn update(&self, id: i64, input: CollectionInput) -> ServiceResult<()> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        let city_ids = self.checked_city_ids(&input.city_ids).await?;
        self.ensure_unique_title(&title, Some(id)).await?;

        if !self.repo.update(id, &title, &city_ids).await? {
            return Err(ServiceError::not_found(format!("коллекция {}", id)));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete(id).await? {
            return Err(ServiceError::not_found(format!("коллекция {}", id)));
        }
        Ok(())
    }

    // Personal collections

    pub async fn list_personal(&self, user_id: i64) -> ServiceResult<Vec<PersonalCollection>> {
        Ok(self.repo.list_personal(user_id).await?)
    }

    pub async fn create_personal(
        &self,
        user_id: i64,
        input: PersonalCollectionInput,
    ) -> ServiceResult<PersonalCollection> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        let city_ids = self.checked_city_ids(&input.city_ids).await?;
        Ok(self
            .repo
            .create_personal(user_id, &title, input.is_public, &city_ids)
            .await?)
    }

    /// A personal collection as seen by `viewer_id`. Private collections of
    /// other users look missing.
    pub async fn view_personal(
        &self,
        viewer_id: Option<i64>,
        collection_id: i64,
    ) -> ServiceResult<(PersonalCollection, Vec<CollectionCity>)> {
        let collection = self
            .repo
            .get_personal(collection_id)
            .await?
            .filter(|c| c.is_public || Some(c.user_id) == viewer_id)
            .ok_or_else(|| ServiceError::not_found(format!("коллекция {}", collection_id)))?;

        // Anonymous viewers see no visit marks
        let cities = self
            .repo
            .list_personal_cities(viewer_id.unwrap_or(0), collection_id)
            .await?;
        Ok((collection, cities))
    }

    pub async fn update_personal(
        &self,
        user_id: i64,
        collection_id: i64,
        input: PersonalCollectionInput,
    ) -> ServiceResult<()> {
        self.owned_personal(user_id, collection_id).await?;
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        let city_ids = self.checked_city_ids(&input.city_ids).await?;
        self.repo
            .update_personal(collection_id, &title, input.is_public, &city_ids)
            .await?;
        Ok(())
    }

    pub async fn delete_personal(&self, user_id: i64, collection_id: i64) -> ServiceResult<()> {
        self.owned_personal(user_id, collection_id).await?;
        self.repo.delete_personal(collection_id).await?;
        Ok(())
    }

    async fn owned_personal(&self, user_id: i64, collection_id: i64) -> ServiceResult<PersonalCollection> {
        let collection = self
            .repo
            .get_personal(collection_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("коллекция {}", collection_id)))?;
        if collection.user_id != user_id {
            return Err(ServiceError::Forbidden("Это чужая коллекция".to_string()));
        }
        Ok(collection)
    }

    /// Deduplicated ids, all of which must exist
    async fn checked_city_ids(&self, city_ids: &[i64]) -> ServiceResult<Vec<i64>> {
        let unique: Vec<i64> = city_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Err(ServiceError::validation("Добавьте в коллекцию хотя бы один город"));
        }
        let existing = self.repo.existing_city_ids(&unique).await?;
        if existing.len() != unique.len() {
            let missing: Vec<String> = unique
                .iter()
                .filter(|id| !existing.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(ServiceError::validation(format!(
                "Неизвестные города: {}",
                missing.join(", ")
            )));
        }
        Ok(unique)
    }

    async fn ensure_unique_title(&self, title: &str, except: Option<i64>) -> ServiceResult<()> {
        let taken = self
            .repo
            .list()
            .await?
            .into_iter()
            .any(|c| c.title == title && Some(c.id) != except);
        if taken {
            return Err(ServiceError::Conflict(format!("Коллекция «{}» уже существует", title)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures::{self, Geography};
    use crate::db::repositories::SqlxCollectionRepository;
    use crate::db::DynDatabasePool;

    async fn setup() -> (DynDatabasePool, CollectionService, Geography, i64) {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        let service = CollectionService::new(SqlxCollectionRepository::boxed(pool.clone()));
        (pool, service, geo, user)
    }

    fn curated(title: &str, city_ids: Vec<i64>) -> CollectionInput {
        CollectionInput {
            title: title.to_string(),
            city_ids,
        }
    }

    fn personal(title: &str, is_public: bool, city_ids: Vec<i64>) -> PersonalCollectionInput {
        PersonalCollectionInput {
            title: title.to_string(),
            is_public,
            city_ids,
        }
    }

    #[test]
    fn test_keys() {
        assert_eq!("not_started".parse::<CollectionFilter>().unwrap(), CollectionFilter::NotStarted);
        assert_eq!("progress_up".parse::<CollectionSort>().unwrap(), CollectionSort::ProgressUp);
        assert!("popular".parse::<CollectionFilter>().is_err());
    }

    #[tokio::test]
    async fn test_create_validates_cities_and_title() {
        let (_pool, service, geo, _user) = setup().await;

        let empty = service.create(curated("Пусто", vec![])).await;
        assert!(matches!(empty, Err(ServiceError::ValidationError(_))));

        let unknown = service.create(curated("Нет", vec![geo.cities[0], 4242])).await;
        assert!(matches!(unknown, Err(ServiceError::ValidationError(msg)) if msg.contains("4242")));

        service
            .create(curated("Верхневолжье", vec![geo.cities[0], geo.cities[0], geo.cities[3]]))
            .await
            .unwrap();
        let duplicate = service.create(curated(" Верхневолжье ", vec![geo.cities[1]])).await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_progress_filters_and_favorites() {
        let (pool, service, geo, user) = setup().await;
        let upper = service
            .create(curated("Верхневолжье", vec![geo.cities[0], geo.cities[3]]))
            .await
            .unwrap();
        let kazan = service.create(curated("Казань", vec![geo.cities[5]])).await.unwrap();
        service.create(curated("Углич", vec![geo.cities[4]])).await.unwrap();
        fixtures::insert_visit(&pool, user, geo.cities[0], None, 5).await;
        fixtures::insert_visit(&pool, user, geo.cities[5], None, 5).await;

        let started = service
            .list(user, Some(CollectionFilter::Started), CollectionSort::Default)
            .await
            .unwrap();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].id, upper.id);
        assert_eq!(started[0].ratio, 50);

        let finished = service
            .list(user, Some(CollectionFilter::Finished), CollectionSort::Default)
            .await
            .unwrap();
        assert_eq!(finished[0].id, kazan.id);

        let by_progress = service.list(user, None, CollectionSort::ProgressDown).await.unwrap();
        let titles: Vec<_> = by_progress.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Казань", "Верхневолжье", "Углич"]);

        assert!(service.toggle_favorite(user, kazan.id).await.unwrap());
        let favorites = service
            .list(user, Some(CollectionFilter::Favorite), CollectionSort::Default)
            .await
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert!(!service.toggle_favorite(user, kazan.id).await.unwrap());

        assert!(matches!(
            service.toggle_favorite(user, 777).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_personal_visibility_and_ownership() {
        let (pool, service, geo, owner) = setup().await;
        let stranger = fixtures::insert_user(&pool, "petr").await;

        let private = service
            .create_personal(owner, personal("Мой маршрут", false, vec![geo.cities[1], geo.cities[2]]))
            .await
            .unwrap();

        assert!(service.view_personal(Some(owner), private.id).await.is_ok());
        assert!(matches!(
            service.view_personal(Some(stranger), private.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.view_personal(None, private.id).await,
            Err(ServiceError::NotFound(_))
        ));

        let edit = service
            .update_personal(stranger, private.id, personal("Чужой", true, vec![geo.cities[1]]))
            .await;
        assert!(matches!(edit, Err(ServiceError::Forbidden(_))));

        service
            .update_personal(owner, private.id, personal("Мой маршрут", true, vec![geo.cities[1]]))
            .await
            .unwrap();
        let (shown, cities) = service.view_personal(None, private.id).await.unwrap();
        assert!(shown.is_public);
        assert_eq!(cities.len(), 1);

        assert!(matches!(
            service.delete_personal(stranger, private.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        service.delete_personal(owner, private.id).await.unwrap();
        assert!(service.list_personal(owner).await.unwrap().is_empty());
    }
}
