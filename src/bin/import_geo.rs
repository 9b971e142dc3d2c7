//! Load reference geography (federal districts, regions, cities) from JSON
//!
//! Usage: `import-geo <file.json> [config.yml]`
//!
//! The file holds `{"areas": [{"title", "regions": [{"title", "region_type",
//! "iso3166", "cities": [...]}]}]}`. Rows that already exist are skipped, so
//! the same file can be imported again after adding entries to it.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moi_goroda::{
    cache::create_cache,
    config::Config,
    db::{self, repositories::SqlxGeoRepository},
    services::{GeoImport, GeoService},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moi_goroda=info,import_geo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(file) = args.next() else {
        bail!("usage: import-geo <file.json> [config.yml]");
    };
    let config_path = args.next().unwrap_or_else(|| "config.yml".to_string());

    let raw = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file))?;
    let data: GeoImport = serde_json::from_str(&raw).with_context(|| format!("Invalid geography file {}", file))?;
    tracing::info!(file = %file, areas = data.areas.len(), "Geography file parsed");

    let config = Config::load_with_env(Path::new(&config_path))?;
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let service = GeoService::new(SqlxGeoRepository::boxed(pool), create_cache(&config.cache));
    let summary = service.import(data).await.context("Import failed")?;

    println!(
        "areas: {} new, {} existing; regions: {} new, {} existing; cities: {} new, {} existing",
        summary.areas_created,
        summary.areas_existing,
        summary.regions_created,
        summary.regions_existing,
        summary.cities_created,
        summary.cities_existing,
    );
    Ok(())
}
