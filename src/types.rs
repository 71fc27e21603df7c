//! Core value types shared by the index, the cache and the services.

use crate::error::{GeotierError, Result};
use geo::Point;
use serde::{Deserialize, Serialize};

/// Placeholder written into fields that are coarser-grained than requested.
pub const UNKNOWN: &str = "Unknown";

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    /// Create a coordinate, rejecting NaN and values outside `[-90, 90] × [-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeotierError::InvalidArgument(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeotierError::InvalidArgument(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl From<GeoCoordinate> for Point<f64> {
    fn from(coord: GeoCoordinate) -> Self {
        Point::new(coord.longitude, coord.latitude)
    }
}

/// Axis-aligned rectangle covered by a geohash cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl CellBounds {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Inclusive containment test.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// A named place as stored in the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub district: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: String,
    pub population: u32,
}

impl LocationEntry {
    /// Shorthand for a place that only carries a city and country.
    pub fn new(latitude: f64, longitude: f64, city: &str, country: &str) -> Self {
        Self {
            latitude,
            longitude,
            district: None,
            city: Some(city.to_string()),
            county: None,
            state: None,
            country: country.to_string(),
            population: 0,
        }
    }

    pub fn with_population(mut self, population: u32) -> Self {
        self.population = population;
        self
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_county(mut self, county: &str) -> Self {
        self.county = Some(county.to_string());
        self
    }

    pub fn with_district(mut self, district: &str) -> Self {
        self.district = Some(district.to_string());
        self
    }

    /// Approximate heap + inline footprint of this entry in bytes.
    pub fn estimated_memory_bytes(&self) -> usize {
        let strings = [&self.district, &self.city, &self.county, &self.state]
            .iter()
            .filter_map(|field| field.as_ref())
            .map(String::len)
            .sum::<usize>();
        std::mem::size_of::<Self>() + strings + self.country.len()
    }
}

/// How specific a resolved place name should be.
///
/// Ordered from coarsest to finest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum LocationGranularity {
    Country,
    State,
    County,
    City,
    #[default]
    District,
}

/// The place name returned to callers of the geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub district: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country: String,
    pub population: u32,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Replace every field finer than `granularity` with [`UNKNOWN`].
    pub fn with_granularity(mut self, granularity: LocationGranularity) -> Self {
        let unknown = || Some(UNKNOWN.to_string());
        if granularity < LocationGranularity::District {
            self.district = unknown();
        }
        if granularity < LocationGranularity::City {
            self.city = unknown();
        }
        if granularity < LocationGranularity::County {
            self.county = unknown();
        }
        if granularity < LocationGranularity::State {
            self.state = unknown();
        }
        self
    }

    /// Most specific non-empty name, falling back to the country.
    pub fn display_name(&self) -> &str {
        [&self.district, &self.city, &self.county, &self.state]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|name| !name.is_empty() && *name != UNKNOWN)
            .unwrap_or(&self.country)
    }
}

impl From<&LocationEntry> for Location {
    fn from(entry: &LocationEntry) -> Self {
        Self {
            district: entry.district.clone(),
            city: entry.city.clone(),
            county: entry.county.clone(),
            state: entry.state.clone(),
            country: entry.country.clone(),
            population: entry.population,
            latitude: entry.latitude,
            longitude: entry.longitude,
        }
    }
}

impl From<LocationEntry> for Location {
    fn from(entry: LocationEntry) -> Self {
        Self {
            district: entry.district,
            city: entry.city,
            county: entry.county,
            state: entry.state,
            country: entry.country,
            population: entry.population,
            latitude: entry.latitude,
            longitude: entry.longitude,
        }
    }
}

/// One resolved query, with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoLookupResult {
    pub location: LocationEntry,
    pub distance_km: f64,
    pub cell_geohash: String,
    pub is_from_neighbor_cell: bool,
}

impl GeoLookupResult {
    pub fn to_location(&self) -> Location {
        Location::from(&self.location)
    }
}
