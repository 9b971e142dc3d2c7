//! Moi Goroda - a tracker of visited cities
//!
//! Users mark the cities they have been to and follow their progress through
//! regions, federal districts and curated collections. The crate provides
//! the storage layer, the services, a JSON API and the server-rendered pages.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod templates;
pub mod web;
