//! Reference geography: federal districts (areas), regions and cities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// Federal district
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Area {
    pub id: i64,
    pub title: String,
}

/// Administrative kind of a region; decides how its full name is spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    Oblast,
    Krai,
    Republic,
    AutonomousOkrug,
    AutonomousOblast,
    FederalCity,
}

impl RegionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionType::Oblast => "oblast",
            RegionType::Krai => "krai",
            RegionType::Republic => "republic",
            RegionType::AutonomousOkrug => "autonomous_okrug",
            RegionType::AutonomousOblast => "autonomous_oblast",
            RegionType::FederalCity => "federal_city",
        }
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oblast" => Ok(RegionType::Oblast),
            "krai" => Ok(RegionType::Krai),
            "republic" => Ok(RegionType::Republic),
            "autonomous_okrug" => Ok(RegionType::AutonomousOkrug),
            "autonomous_oblast" => Ok(RegionType::AutonomousOblast),
            "federal_city" => Ok(RegionType::FederalCity),
            _ => Err(ParseEnumError::new("region type", s)),
        }
    }
}

impl TryFrom<String> for RegionType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Build the conventional Russian name of a region from its short title
pub fn region_full_name(title: &str, region_type: RegionType) -> String {
    match region_type {
        RegionType::Oblast => format!("{} область", title),
        RegionType::Krai => format!("{} край", title),
        RegionType::Republic => format!("Республика {}", title),
        RegionType::AutonomousOkrug => format!("{} автономный округ", title),
        RegionType::AutonomousOblast => format!("{} автономная область", title),
        RegionType::FederalCity => title.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Region {
    pub id: i64,
    pub area_id: Option<i64>,
    pub title: String,
    #[sqlx(try_from = "String")]
    pub region_type: RegionType,
    /// ISO 3166-2 code, e.g. `RU-MOS`
    pub iso3166: String,
}

impl Region {
    pub fn full_name(&self) -> String {
        region_full_name(&self.title, self.region_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct City {
    pub id: i64,
    pub title: String,
    pub region_id: i64,
    pub population: i64,
    /// Year the city was founded
    pub date_of_foundation: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub wiki: Option<String>,
    pub image: Option<String>,
}

/// City joined with the names of its region and area
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CityDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub city: City,
    pub region_title: String,
    #[sqlx(try_from = "String")]
    pub region_type: RegionType,
    pub area_id: Option<i64>,
    pub area_title: Option<String>,
}

impl CityDetail {
    pub fn region_full_name(&self) -> String {
        region_full_name(&self.region_title, self.region_type)
    }
}

/// City of a region with the number of times the current user visited it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegionCity {
    pub id: i64,
    pub title: String,
    pub population: i64,
    pub date_of_foundation: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub visits: i64,
}

impl RegionCity {
    pub fn is_visited(&self) -> bool {
        self.visits > 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AreaInput {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionInput {
    pub area_id: Option<i64>,
    pub title: String,
    pub region_type: RegionType,
    pub iso3166: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityInput {
    pub title: String,
    pub region_id: i64,
    #[serde(default)]
    pub population: i64,
    pub date_of_foundation: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub wiki: Option<String>,
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_full_name() {
        assert_eq!(region_full_name("Тверская", RegionType::Oblast), "Тверская область");
        assert_eq!(region_full_name("Пермский", RegionType::Krai), "Пермский край");
        assert_eq!(region_full_name("Карелия", RegionType::Republic), "Республика Карелия");
        assert_eq!(
            region_full_name("Ханты-Мансийский", RegionType::AutonomousOkrug),
            "Ханты-Мансийский автономный округ"
        );
        assert_eq!(
            region_full_name("Еврейская", RegionType::AutonomousOblast),
            "Еврейская автономная область"
        );
        assert_eq!(region_full_name("Москва", RegionType::FederalCity), "Москва");
    }

    #[test]
    fn test_region_type_roundtrip_through_str() {
        for t in [
            RegionType::Oblast,
            RegionType::Krai,
            RegionType::Republic,
            RegionType::AutonomousOkrug,
            RegionType::AutonomousOblast,
            RegionType::FederalCity,
        ] {
            assert_eq!(t.as_str().parse::<RegionType>().unwrap(), t);
            assert_eq!(serde_json::to_string(&t).unwrap(), format!("\"{}\"", t));
        }
        assert!("county".parse::<RegionType>().is_err());
    }
}
