//! Regions with visit progress and the cities inside one region

use crate::db::repositories::{GeoRepository, StatisticsRepository};
use crate::models::{Area, ParseEnumError, Region, RegionCity, RegionProgress};
use crate::services::{ServiceError, ServiceResult};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFilter {
    Visited,
    NotVisited,
    Finished,
    /// At least half the cities, but not all
    HalfFinished,
}

impl RegionFilter {
    pub fn sql(&self) -> &'static str {
        match self {
            RegionFilter::Visited => "t.visited_cities > 0",
            RegionFilter::NotVisited => "t.visited_cities = 0",
            RegionFilter::Finished => "t.total_cities > 0 AND t.visited_cities = t.total_cities",
            RegionFilter::HalfFinished => "t.ratio >= 50 AND t.visited_cities < t.total_cities",
        }
    }
}

impl FromStr for RegionFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visited" => Ok(RegionFilter::Visited),
            "not_visited" => Ok(RegionFilter::NotVisited),
            "finished" => Ok(RegionFilter::Finished),
            "half_finished" => Ok(RegionFilter::HalfFinished),
            _ => Err(ParseEnumError::new("filter", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionSort {
    #[default]
    Default,
    NameDown,
    NameUp,
    RatioDown,
    RatioUp,
    VisitedDown,
    VisitedUp,
}

impl RegionSort {
    pub fn sql(&self) -> &'static str {
        match self {
            RegionSort::Default | RegionSort::NameDown => "t.title ASC",
            RegionSort::NameUp => "t.title DESC",
            RegionSort::RatioDown => "t.ratio DESC, t.title ASC",
            RegionSort::RatioUp => "t.ratio ASC, t.title ASC",
            RegionSort::VisitedDown => "t.visited_cities DESC, t.title ASC",
            RegionSort::VisitedUp => "t.visited_cities ASC, t.title ASC",
        }
    }
}

impl FromStr for RegionSort {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(RegionSort::Default),
            "name_down" => Ok(RegionSort::NameDown),
            "name_up" => Ok(RegionSort::NameUp),
            "ratio_down" => Ok(RegionSort::RatioDown),
            "ratio_up" => Ok(RegionSort::RatioUp),
            "visited_down" => Ok(RegionSort::VisitedDown),
            "visited_up" => Ok(RegionSort::VisitedUp),
            _ => Err(ParseEnumError::new("sort", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionCityFilter {
    Visited,
    NotVisited,
}

impl RegionCityFilter {
    pub fn sql(&self) -> &'static str {
        match self {
            RegionCityFilter::Visited => "t.visits > 0",
            RegionCityFilter::NotVisited => "t.visits = 0",
        }
    }
}

impl FromStr for RegionCityFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visited" => Ok(RegionCityFilter::Visited),
            "not_visited" => Ok(RegionCityFilter::NotVisited),
            _ => Err(ParseEnumError::new("filter", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionCitySort {
    #[default]
    Default,
    NameDown,
    NameUp,
    PopulationDown,
    PopulationUp,
}

impl RegionCitySort {
    pub fn sql(&self) -> &'static str {
        match self {
            RegionCitySort::Default | RegionCitySort::NameDown => "t.title ASC",
            RegionCitySort::NameUp => "t.title DESC",
            RegionCitySort::PopulationDown => "t.population DESC, t.title ASC",
            RegionCitySort::PopulationUp => "t.population ASC, t.title ASC",
        }
    }
}

impl FromStr for RegionCitySort {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(RegionCitySort::Default),
            "name_down" => Ok(RegionCitySort::NameDown),
            "name_up" => Ok(RegionCitySort::NameUp),
            "population_down" => Ok(RegionCitySort::PopulationDown),
            "population_up" => Ok(RegionCitySort::PopulationUp),
            _ => Err(ParseEnumError::new("sort", s)),
        }
    }
}

pub struct RegionService {
    geo: Arc<dyn GeoRepository>,
    statistics: Arc<dyn StatisticsRepository>,
}

impl RegionService {
    pub fn new(geo: Arc<dyn GeoRepository>, statistics: Arc<dyn StatisticsRepository>) -> Self {
        Self { geo, statistics }
    }

    pub async fn list_regions(
        &self,
        user_id: i64,
        filter: Option<RegionFilter>,
        sort: RegionSort,
    ) -> ServiceResult<Vec<RegionProgress>> {
        Ok(self
            .statistics
            .region_progress(user_id, filter.map(|f| f.sql()), sort.sql())
            .await?)
    }

    pub async fn get_region(&self, region_id: i64) -> ServiceResult<Region> {
        self.geo
            .get_region(region_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("регион {}", region_id)))
    }

    pub async fn list_areas(&self) -> ServiceResult<Vec<Area>> {
        Ok(self.geo.list_areas().await?)
    }

    pub async fn list_all(&self) -> ServiceResult<Vec<Region>> {
        Ok(self.geo.list_regions().await?)
    }

    /// Cities of one region with the user's visit counts
    pub async fn list_cities(
        &self,
        user_id: i64,
        region_id: i64,
        filter: Option<RegionCityFilter>,
        sort: RegionCitySort,
    ) -> ServiceResult<(Region, Vec<RegionCity>)> {
        let region = self.get_region(region_id).await?;
        let cities = self
            .geo
            .list_region_cities(user_id, region_id, filter.map(|f| f.sql()), sort.sql())
            .await?;
        Ok((region, cities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::fixtures::{self, date};
    use crate::db::repositories::{SqlxGeoRepository, SqlxStatisticsRepository};

    #[test]
    fn test_keys() {
        assert_eq!("half_finished".parse::<RegionFilter>().unwrap(), RegionFilter::HalfFinished);
        assert_eq!("visited_up".parse::<RegionSort>().unwrap(), RegionSort::VisitedUp);
        assert_eq!("not_visited".parse::<RegionCityFilter>().unwrap(), RegionCityFilter::NotVisited);
        assert_eq!(
            "population_down".parse::<RegionCitySort>().unwrap(),
            RegionCitySort::PopulationDown
        );
        assert!("ratio".parse::<RegionSort>().is_err());
        assert!("finished".parse::<RegionCityFilter>().is_err());
    }

    #[tokio::test]
    async fn test_region_filters() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        // Тверская 2/3, Ярославская 0/2, Татарстан 1/1
        fixtures::insert_visit(&pool, user, geo.cities[0], Some(date(2024, 1, 1)), 5).await;
        fixtures::insert_visit(&pool, user, geo.cities[1], None, 4).await;
        fixtures::insert_visit(&pool, user, geo.cities[5], None, 3).await;

        let service = RegionService::new(
            SqlxGeoRepository::boxed(pool.clone()),
            SqlxStatisticsRepository::boxed(pool.clone()),
        );
        let titles = |rows: Vec<RegionProgress>| rows.into_iter().map(|r| r.title).collect::<Vec<_>>();

        let visited = service
            .list_regions(user, Some(RegionFilter::Visited), RegionSort::RatioDown)
            .await
            .unwrap();
        assert_eq!(titles(visited), vec!["Татарстан", "Тверская"]);

        let finished = service
            .list_regions(user, Some(RegionFilter::Finished), RegionSort::Default)
            .await
            .unwrap();
        assert_eq!(titles(finished), vec!["Татарстан"]);

        let half = service
            .list_regions(user, Some(RegionFilter::HalfFinished), RegionSort::Default)
            .await
            .unwrap();
        assert_eq!(titles(half), vec!["Тверская"]);

        let untouched = service
            .list_regions(user, Some(RegionFilter::NotVisited), RegionSort::Default)
            .await
            .unwrap();
        assert_eq!(titles(untouched), vec!["Ярославская"]);
    }

    #[tokio::test]
    async fn test_region_cities() {
        let pool = fixtures::migrated_pool().await;
        let geo = fixtures::seed_geography(&pool).await;
        let user = fixtures::insert_user(&pool, "ivan").await;
        fixtures::insert_visit(&pool, user, geo.cities[2], None, 4).await;

        let service = RegionService::new(
            SqlxGeoRepository::boxed(pool.clone()),
            SqlxStatisticsRepository::boxed(pool.clone()),
        );

        let (region, cities) = service
            .list_cities(user, geo.regions[0], None, RegionCitySort::PopulationDown)
            .await
            .unwrap();
        assert_eq!(region.title, "Тверская");
        let names: Vec<_> = cities.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(names, vec!["Тверь", "Ржев", "Торжок"]);

        let (_, visited) = service
            .list_cities(user, geo.regions[0], Some(RegionCityFilter::Visited), RegionCitySort::Default)
            .await
            .unwrap();
        assert_eq!(visited.len(), 1);
        assert_eq!(visited[0].title, "Торжок");

        let missing = service.list_cities(user, 999, None, RegionCitySort::Default).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
    }
}
