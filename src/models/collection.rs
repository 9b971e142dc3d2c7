//! Curated and personal city collections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Collection {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Collection with the current user's progress through it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionProgress {
    pub id: i64,
    pub title: String,
    pub total_cities: i64,
    pub visited_cities: i64,
    /// Non-zero when the user starred the collection
    pub favorite: i64,
    pub ratio: i64,
}

impl CollectionProgress {
    pub fn is_favorite(&self) -> bool {
        self.favorite > 0
    }

    pub fn is_finished(&self) -> bool {
        self.total_cities > 0 && self.visited_cities == self.total_cities
    }
}

/// City inside a collection, flagged with the user's visits
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionCity {
    pub id: i64,
    pub title: String,
    pub region_id: i64,
    pub region_title: String,
    pub population: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub visits: i64,
}

/// Collection a user assembled for themselves
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonalCollection {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// Visible to anyone with the link
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInput {
    pub title: String,
    #[serde(default)]
    pub city_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalCollectionInput {
    pub title: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub city_ids: Vec<i64>,
}
