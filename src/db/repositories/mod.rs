//! Database repositories
//!
//! One repository per aggregate. Each exposes an `async_trait` interface and
//! a `Sqlx*` implementation that works on both SQLite and MySQL.

pub mod advertisement;
pub mod blog;
pub mod collection;
pub mod geo;
pub mod news;
pub mod session;
pub mod share;
pub mod statistics;
pub mod subscribe;
pub mod user;
pub mod visited_city;

pub use advertisement::{AdvertisementRepository, SqlxAdvertisementRepository};
pub use blog::{BlogRepository, SqlxBlogRepository};
pub use collection::{CollectionRepository, SqlxCollectionRepository};
pub use geo::{GeoRepository, SqlxGeoRepository};
pub use news::{NewsRepository, SqlxNewsRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use share::{ShareSettingsRepository, SqlxShareSettingsRepository};
pub use statistics::{CityPopularity, SqlxStatisticsRepository, StatisticsRepository, UserCityCounts};
pub use subscribe::{SqlxSubscribeRepository, SubscribeRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use visited_city::{SqlxVisitedCityRepository, VisitedCityRepository};
