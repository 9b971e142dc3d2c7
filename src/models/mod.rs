//! Data models
//!
//! Database rows, form/API inputs and the aggregates built from them:
//! - Users and sessions
//! - Reference geography (areas, regions, cities)
//! - Visits, collections, news and blog
//! - Sharing, subscriptions and advertisement exceptions
//! - Statistics

mod collection;
mod content;
mod geo;
mod session;
mod share;
mod statistics;
mod user;
mod visited_city;

pub use collection::{
    Collection, CollectionCity, CollectionInput, CollectionProgress, PersonalCollection,
    PersonalCollectionInput,
};
pub use content::{BlogArticle, BlogArticleInput, BlogArticleWithTags, BlogTag, BlogTagInput, News, NewsInput, Page};
pub use geo::{region_full_name, Area, AreaInput, City, CityDetail, CityInput, Region, RegionCity, RegionInput, RegionType};
pub use session::Session;
pub use share::{
    AdvertisementException, AdvertisementExceptionInput, SharePage, ShareSettings, ShareSettingsInput,
    Subscribe, SubscriptionUser,
};
pub use statistics::{
    AdminDashboard, AreaProgress, CityRank, CityStats, LatestVisit, MonthBucket, NeighborCity,
    RegionProgress, RegionStats, UserRank, UserStatistics, YearBucket,
};
pub use user::{UpdateProfileInput, User, UserRole, UserStatus};
pub use visited_city::{VisitWithCity, VisitedCity, VisitedCityInput, VisitedCitySummary};

/// A stored or submitted string that names no known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
