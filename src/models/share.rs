//! Public sharing, subscriptions and advertisement exceptions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// What a user allows others to see
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShareSettings {
    pub user_id: i64,
    /// Master switch; all other flags are off while this is off
    pub can_share: bool,
    pub can_share_dashboard: bool,
    pub can_share_city_map: bool,
    pub can_share_region_map: bool,
    pub can_subscribe: bool,
}

impl ShareSettings {
    /// Settings of a user who never opened the share form
    pub fn disabled(user_id: i64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn allows(&self, page: SharePage) -> bool {
        self.can_share
            && match page {
                SharePage::Dashboard => self.can_share_dashboard,
                SharePage::CityMap => self.can_share_city_map,
                SharePage::RegionMap => self.can_share_region_map,
            }
    }

    /// Page shown at `/share/{user_id}` when no page is named
    pub fn default_page(&self) -> Option<SharePage> {
        [SharePage::Dashboard, SharePage::CityMap, SharePage::RegionMap]
            .into_iter()
            .find(|page| self.allows(*page))
    }
}

/// Form data of the share settings page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareSettingsInput {
    #[serde(default)]
    pub can_share: bool,
    #[serde(default)]
    pub can_share_dashboard: bool,
    #[serde(default)]
    pub can_share_city_map: bool,
    #[serde(default)]
    pub can_share_region_map: bool,
    #[serde(default)]
    pub can_subscribe: bool,
}

/// Read-only pages another user can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharePage {
    Dashboard,
    CityMap,
    RegionMap,
}

impl SharePage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharePage::Dashboard => "dashboard",
            SharePage::CityMap => "city_map",
            SharePage::RegionMap => "region_map",
        }
    }
}

impl fmt::Display for SharePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharePage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboard" => Ok(SharePage::Dashboard),
            "city_map" => Ok(SharePage::CityMap),
            "region_map" => Ok(SharePage::RegionMap),
            _ => Err(ParseEnumError::new("share page", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscribe {
    pub id: i64,
    pub subscribe_from: i64,
    pub subscribe_to: i64,
    pub created_at: DateTime<Utc>,
}

/// Other side of a subscription
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionUser {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// User for whom ads are hidden until `deadline` (inclusive)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdvertisementException {
    pub id: i64,
    pub user_id: i64,
    pub deadline: NaiveDate,
}

impl AdvertisementException {
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.deadline >= today
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertisementExceptionInput {
    pub user_id: i64,
    pub deadline: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_switch_gates_every_page() {
        let settings = ShareSettings {
            user_id: 1,
            can_share: false,
            can_share_dashboard: true,
            can_share_city_map: true,
            can_share_region_map: true,
            can_subscribe: true,
        };
        assert!(!settings.allows(SharePage::Dashboard));
        assert!(settings.default_page().is_none());
    }

    #[test]
    fn test_default_page_is_first_allowed() {
        let settings = ShareSettings {
            user_id: 1,
            can_share: true,
            can_share_dashboard: false,
            can_share_city_map: false,
            can_share_region_map: true,
            can_subscribe: false,
        };
        assert_eq!(settings.default_page(), Some(SharePage::RegionMap));
        assert!(!settings.allows(SharePage::CityMap));
    }

    #[test]
    fn test_share_page_parsing() {
        assert_eq!("city_map".parse::<SharePage>().unwrap(), SharePage::CityMap);
        assert!("stats".parse::<SharePage>().is_err());
    }

    #[test]
    fn test_advertisement_exception_deadline_inclusive() {
        let exception = AdvertisementException {
            id: 1,
            user_id: 1,
            deadline: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        };
        assert!(exception.is_active(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()));
        assert!(!exception.is_active(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    }
}
