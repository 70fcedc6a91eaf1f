use crate::models::GeoPoint;
use common::config::Settings;

/// US state capitals, the default extraction targets.
const US_STATE_CAPITALS: &[(&str, &str, f64, f64)] = &[
    ("Montgomery", "Alabama", 32.377716, -86.300568),
    ("Juneau", "Alaska", 58.301598, -134.420212),
    ("Phoenix", "Arizona", 33.448143, -112.096962),
    ("Little Rock", "Arkansas", 34.746613, -92.288986),
    ("Sacramento", "California", 38.576668, -121.493629),
    ("Denver", "Colorado", 39.739227, -104.984856),
    ("Hartford", "Connecticut", 41.764046, -72.682198),
    ("Dover", "Delaware", 39.157307, -75.519722),
    ("Tallahassee", "Florida", 30.438118, -84.281296),
    ("Atlanta", "Georgia", 33.749027, -84.388229),
    ("Honolulu", "Hawaii", 21.307442, -157.857376),
    ("Boise", "Idaho", 43.617775, -116.199722),
    ("Springfield", "Illinois", 39.798363, -89.654961),
    ("Indianapolis", "Indiana", 39.768623, -86.162643),
    ("Des Moines", "Iowa", 41.591087, -93.603729),
    ("Topeka", "Kansas", 39.048191, -95.677956),
    ("Frankfort", "Kentucky", 38.186722, -84.875374),
    ("Baton Rouge", "Louisiana", 30.457069, -91.187393),
    ("Augusta", "Maine", 44.307167, -69.781693),
    ("Annapolis", "Maryland", 38.978764, -76.490936),
    ("Boston", "Massachusetts", 42.358162, -71.063698),
    ("Lansing", "Michigan", 42.733635, -84.555328),
    ("St. Paul", "Minnesota", 44.955097, -93.102211),
    ("Jackson", "Mississippi", 32.303848, -90.182106),
    ("Jefferson City", "Missouri", 38.576702, -92.173516),
    ("Helena", "Montana", 46.585709, -112.018417),
    ("Lincoln", "Nebraska", 40.808075, -96.699654),
    ("Carson City", "Nevada", 39.163914, -119.766121),
    ("Concord", "New Hampshire", 43.208137, -71.537567),
    ("Trenton", "New Jersey", 40.220596, -74.769913),
    ("Santa Fe", "New Mexico", 35.686973, -105.937798),
    ("Albany", "New York", 42.652843, -73.757874),
    ("Raleigh", "North Carolina", 35.78043, -78.639099),
    ("Bismarck", "North Dakota", 46.82085, -100.783318),
    ("Columbus", "Ohio", 39.961346, -82.999069),
    ("Oklahoma City", "Oklahoma", 35.492207, -97.503342),
    ("Salem", "Oregon", 44.938461, -123.030403),
    ("Harrisburg", "Pennsylvania", 40.264378, -76.883598),
    ("Providence", "Rhode Island", 41.830914, -71.414963),
    ("Columbia", "South Carolina", 34.000343, -81.033211),
    ("Pierre", "South Dakota", 44.367031, -100.346405),
    ("Nashville", "Tennessee", 36.16581, -86.784241),
    ("Austin", "Texas", 30.27467, -97.740349),
    ("Salt Lake City", "Utah", 40.777477, -111.888237),
    ("Montpelier", "Vermont", 44.262436, -72.580536),
    ("Richmond", "Virginia", 37.538857, -77.43364),
    ("Olympia", "Washington", 47.035805, -122.905014),
    ("Charleston", "West Virginia", 38.336246, -81.612328),
    ("Madison", "Wisconsin", 43.074684, -89.384445),
    ("Cheyenne", "Wyoming", 41.140259, -104.820236),
];

/// Immutable list of points passed explicitly into the extractor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoCatalog {
    points: Vec<GeoPoint>,
}

impl GeoCatalog {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    pub fn us_state_capitals() -> Self {
        Self::new(
            US_STATE_CAPITALS
                .iter()
                .map(|&(city, state, lat, lon)| GeoPoint::new(city, Some(state), lat, lon))
                .collect(),
        )
    }

    /// Catalog from configuration, or the built-in capitals when none is set.
    pub fn from_settings(settings: &Settings) -> Self {
        match &settings.cities {
            Some(cities) => Self::new(cities.iter().map(GeoPoint::from).collect()),
            None => Self::us_state_capitals(),
        }
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
