//! Services layer - business logic
//!
//! Services validate input, apply the rules of each feature area and turn
//! filter/sort keys into SQL fragments for the repositories.

pub mod advertisement;
pub mod blog;
pub mod city;
pub mod collection;
pub mod geo;
pub mod markdown;
pub mod news;
pub mod password;
pub mod rate_limiter;
pub mod region;
pub mod report;
pub mod share;
pub mod statistics;
pub mod subscribe;
pub mod user;

pub use advertisement::AdvertisementService;
pub use blog::{generate_slug, BlogService};
pub use city::{CityService, VisitFilter, VisitSort};
pub use collection::{CollectionFilter, CollectionService, CollectionSort};
pub use geo::{GeoImport, GeoService, ImportSummary};
pub use markdown::{plain_excerpt, render_markdown};
pub use news::NewsService;
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use region::{RegionCityFilter, RegionCitySort, RegionFilter, RegionService, RegionSort};
pub use report::{Report, ReportFormat, ReportKind, ReportOptions, ReportService};
pub use share::ShareService;
pub use statistics::{calculate_ratio, neighbor_window, StatisticsService};
pub use subscribe::{SubscribeAction, SubscribeService};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};

use crate::models::ParseEnumError;

/// Errors shared by the feature services
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

impl From<ParseEnumError> for ServiceError {
    fn from(e: ParseEnumError) -> Self {
        Self::ValidationError(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Parse an optional query-string key, treating empty as absent
pub fn parse_key<T>(value: Option<&str>) -> ServiceResult<Option<T>>
where
    T: std::str::FromStr<Err = ParseEnumError>,
{
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(key) => Ok(Some(key.parse()?)),
    }
}

/// Trimmed, non-empty title of at most `max_chars` characters
pub(crate) fn clean_title(title: &str, max_chars: usize) -> ServiceResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::validation("Название не может быть пустым"));
    }
    if title.chars().count() > max_chars {
        return Err(ServiceError::validation(format!(
            "Название не может быть длиннее {} символов",
            max_chars
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let none: Option<VisitSort> = parse_key(None).unwrap();
        assert!(none.is_none());
        let empty: Option<VisitSort> = parse_key(Some(" ")).unwrap();
        assert!(empty.is_none());
        let sort: Option<VisitSort> = parse_key(Some("rating_down")).unwrap();
        assert_eq!(sort, Some(VisitSort::RatingDown));
        let bad = parse_key::<VisitSort>(Some("price_up"));
        assert!(matches!(bad, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  Золотое кольцо ", 100).unwrap(), "Золотое кольцо");
        assert!(clean_title("   ", 100).is_err());
        assert!(clean_title("абвг", 3).is_err());
    }
}
