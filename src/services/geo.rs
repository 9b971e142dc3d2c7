//! Admin maintenance of the reference geography
//!
//! Every write drops the cached reference counts used by the statistics
//! engine.

use crate::cache::MemoryCache;
use crate::db::repositories::GeoRepository;
use crate::models::{Area, AreaInput, City, CityInput, Region, RegionInput, RegionType};
use crate::services::statistics::StatisticsService;
use crate::services::{clean_title, ServiceError, ServiceResult};
use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_TITLE_CHARS: usize = 100;

/// ISO 3166-2 subdivision code, e.g. `RU-MOS`
static ISO3166_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}-[A-Z0-9]{1,3}$").unwrap_or_else(|_| unreachable!()));

/// Reference geography file read by `import-geo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoImport {
    #[serde(default)]
    pub areas: Vec<AreaImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AreaImport {
    pub title: String,
    #[serde(default)]
    pub regions: Vec<RegionImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionImport {
    pub title: String,
    pub region_type: RegionType,
    pub iso3166: String,
    #[serde(default)]
    pub cities: Vec<CityImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityImport {
    pub title: String,
    #[serde(default)]
    pub population: i64,
    pub date_of_foundation: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub wiki: Option<String>,
    pub image: Option<String>,
}

/// Rows created and rows already present, per level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub areas_created: usize,
    pub areas_existing: usize,
    pub regions_created: usize,
    pub regions_existing: usize,
    pub cities_created: usize,
    pub cities_existing: usize,
}

pub struct GeoService {
    geo: Arc<dyn GeoRepository>,
    cache: Arc<MemoryCache>,
}

impl GeoService {
    pub fn new(geo: Arc<dyn GeoRepository>, cache: Arc<MemoryCache>) -> Self {
        Self { geo, cache }
    }

    // Areas

    pub async fn list_areas(&self) -> ServiceResult<Vec<Area>> {
        Ok(self.geo.list_areas().await?)
    }

    pub async fn create_area(&self, input: AreaInput) -> ServiceResult<Area> {
        let input = self.validate_area(input, None).await?;
        let area = self.geo.create_area(&input).await?;
        tracing::info!(area_id = area.id, title = %area.title, "Area created");
        self.invalidate().await;
        Ok(area)
    }

    pub async fn update_area(&self, id: i64, input: AreaInput) -> ServiceResult<()> {
        let input = self.validate_area(input, Some(id)).await?;
        if !self.geo.update_area(id, &input).await? {
            return Err(ServiceError::not_found(format!("округ {}", id)));
        }
        self.invalidate().await;
        Ok(())
    }

    /// Regions of a deleted area stay, detached from any area
    pub async fn delete_area(&self, id: i64) -> ServiceResult<()> {
        if !self.geo.delete_area(id).await? {
            return Err(ServiceError::not_found(format!("округ {}", id)));
        }
        tracing::info!(area_id = id, "Area deleted");
        self.invalidate().await;
        Ok(())
    }

    // Regions

    pub async fn list_regions(&self) -> ServiceResult<Vec<Region>> {
        Ok(self.geo.list_regions().await?)
    }

    pub async fn get_region(&self, id: i64) -> ServiceResult<Region> {
        self.geo
            .get_region(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("регион {}", id)))
    }

    pub async fn create_region(&self, input: RegionInput) -> ServiceResult<Region> {
        let input = self.validate_region(input, None).await?;
        let region = self.geo.create_region(&input).await?;
        tracing::info!(region_id = region.id, iso3166 = %region.iso3166, "Region created");
        self.invalidate().await;
        Ok(region)
    }

    pub async fn update_region(&self, id: i64, input: RegionInput) -> ServiceResult<()> {
        let input = self.validate_region(input, Some(id)).await?;
        if !self.geo.update_region(id, &input).await? {
            return Err(ServiceError::not_found(format!("регион {}", id)));
        }
        self.invalidate().await;
        Ok(())
    }

    /// Cascades to the region's cities and visits
    pub async fn delete_region(&self, id: i64) -> ServiceResult<()> {
        if !self.geo.delete_region(id).await? {
            return Err(ServiceError::not_found(format!("регион {}", id)));
        }
        tracing::warn!(region_id = id, "Region deleted with its cities and visits");
        self.invalidate().await;
        Ok(())
    }

    // Cities

    pub async fn get_city(&self, id: i64) -> ServiceResult<City> {
        self.geo
            .get_city(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("город {}", id)))
    }

    pub async fn create_city(&self, input: CityInput) -> ServiceResult<City> {
        let input = self.validate_city(input, None).await?;
        let city = self.geo.create_city(&input).await?;
        tracing::info!(city_id = city.id, title = %city.title, "City created");
        self.invalidate().await;
        Ok(city)
    }

    /// Moving a city to another region moves its visits along
    pub async fn update_city(&self, id: i64, input: CityInput) -> ServiceResult<()> {
        let input = self.validate_city(input, Some(id)).await?;
        if !self.geo.update_city(id, &input).await? {
            return Err(ServiceError::not_found(format!("город {}", id)));
        }
        self.invalidate().await;
        Ok(())
    }

    pub async fn delete_city(&self, id: i64) -> ServiceResult<()> {
        if !self.geo.delete_city(id).await? {
            return Err(ServiceError::not_found(format!("город {}", id)));
        }
        tracing::warn!(city_id = id, "City deleted with its visits");
        self.invalidate().await;
        Ok(())
    }

    // Import

    /// Load a reference file. Areas match by title, regions by ISO code and
    /// cities by title within their region; existing rows are left as they
    /// are, so running the same file twice changes nothing.
    pub async fn import(&self, data: GeoImport) -> ServiceResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        for area in data.areas {
            let area_id = match self.geo.get_area_by_title(area.title.trim()).await? {
                Some(existing) => {
                    summary.areas_existing += 1;
                    existing.id
                }
                None => {
                    summary.areas_created += 1;
                    self.create_area(AreaInput { title: area.title }).await?.id
                }
            };

            for region in area.regions {
                let iso3166 = region.iso3166.trim().to_uppercase();
                let region_id = match self.geo.get_region_by_iso(&iso3166).await? {
                    Some(existing) => {
                        summary.regions_existing += 1;
                        existing.id
                    }
                    None => {
                        summary.regions_created += 1;
                        let input = RegionInput {
                            area_id: Some(area_id),
                            title: region.title,
                            region_type: region.region_type,
                            iso3166,
                        };
                        self.create_region(input).await?.id
                    }
                };

                for city in region.cities {
                    if self.geo.get_city_by_title(region_id, city.title.trim()).await?.is_some() {
                        summary.cities_existing += 1;
                        continue;
                    }
                    let input = CityInput {
                        title: city.title,
                        region_id,
                        population: city.population,
                        date_of_foundation: city.date_of_foundation,
                        latitude: city.latitude,
                        longitude: city.longitude,
                        wiki: city.wiki,
                        image: city.image,
                    };
                    self.create_city(input).await?;
                    summary.cities_created += 1;
                }
            }
        }
        tracing::info!(?summary, "Reference geography imported");
        Ok(summary)
    }

    async fn invalidate(&self) {
        StatisticsService::invalidate(&self.cache).await;
    }

    async fn validate_area(&self, input: AreaInput, except: Option<i64>) -> ServiceResult<AreaInput> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        if let Some(other) = self.geo.get_area_by_title(&title).await? {
            if Some(other.id) != except {
                return Err(ServiceError::Conflict(format!("Округ «{}» уже существует", title)));
            }
        }
        Ok(AreaInput { title })
    }

    async fn validate_region(&self, input: RegionInput, except: Option<i64>) -> ServiceResult<RegionInput> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        let iso3166 = input.iso3166.trim().to_uppercase();
        if !ISO3166_RE.is_match(&iso3166) {
            return Err(ServiceError::validation(format!(
                "Код ISO 3166-2 должен иметь вид RU-MOS, получено «{}»",
                input.iso3166.trim()
            )));
        }
        if let Some(area_id) = input.area_id {
            if self.geo.get_area(area_id).await?.is_none() {
                return Err(ServiceError::validation(format!("Округ {} не найден", area_id)));
            }
        }
        if let Some(other) = self.geo.get_region_by_iso(&iso3166).await? {
            if Some(other.id) != except {
                return Err(ServiceError::Conflict(format!("Регион с кодом {} уже существует", iso3166)));
            }
        }
        Ok(RegionInput {
            area_id: input.area_id,
            title,
            region_type: input.region_type,
            iso3166,
        })
    }

    async fn validate_city(&self, input: CityInput, except: Option<i64>) -> ServiceResult<CityInput> {
        let title = clean_title(&input.title, MAX_TITLE_CHARS)?;
        if input.population < 0 {
            return Err(ServiceError::validation("Население не может быть отрицательным"));
        }
        if !(-90.0..=90.0).contains(&input.latitude) || !(-180.0..=180.0).contains(&input.longitude) {
            return Err(ServiceError::validation("Координаты вне допустимого диапазона"));
        }
        if let Some(year) = input.date_of_foundation {
            if year > i64::from(Utc::now().year()) {
                return Err(ServiceError::validation("Год основания не может быть в будущем"));
            }
        }
        let wiki = optional_url(input.wiki, "Википедия")?;
        let image = optional_url(input.image, "Изображение")?;

        if self.geo.get_region(input.region_id).await?.is_none() {
            return Err(ServiceError::validation(format!("Регион {} не найден", input.region_id)));
        }
        if let Some(other) = self.geo.get_city_by_title(input.region_id, &title).await? {
            if Some(other.id) != except {
                return Err(ServiceError::Conflict(format!(
                    "Город «{}» в этом регионе уже существует",
                    title
                )));
            }
        }

        Ok(CityInput {
            title,
            wiki,
            image,
            ..input
        })
    }
}

/// Blank becomes `None`; anything else must be an http(s) URL
fn optional_url(value: Option<String>, field: &str) -> ServiceResult<Option<String>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(url) if url.starts_with("https://") || url.starts_with("http://") => Ok(Some(url.to_string())),
        Some(_) => Err(ServiceError::validation(format!(
            "{}: ссылка должна начинаться с http:// или https://",
            field
        ))),
    }
}
