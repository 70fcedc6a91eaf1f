use common::config::CityConfig;
use serde::{Deserialize, Serialize};

/// A named location the extractor fetches weather for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub name: String,
    pub region: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(name: &str, region: Option<&str>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            region: region.map(str::to_string),
            latitude,
            longitude,
        }
    }

    /// Identity of the point; coordinates are attributes, not identity.
    pub fn key(&self) -> (&str, Option<&str>) {
        (&self.name, self.region.as_deref())
    }

    pub fn label(&self) -> String {
        match &self.region {
            Some(region) => format!("{}, {}", self.name, region),
            None => self.name.clone(),
        }
    }
}

impl From<&CityConfig> for GeoPoint {
    fn from(city: &CityConfig) -> Self {
        Self {
            name: city.city.clone(),
            region: city.state.clone(),
            latitude: city.lat,
            longitude: city.lon,
        }
    }
}
