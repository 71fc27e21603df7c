//! Country boundary containment.
//!
//! [`BoundaryService`] answers "which country is this point in?". The
//! geocoder only depends on the trait, so any dataset can be plugged in.
//! [`PolygonBoundaryService`] is the bundled implementation: country
//! multipolygons indexed by bounding box in an R-tree and confirmed with an
//! exact point-in-polygon test.

#[cfg(feature = "geojson")]
use crate::error::{GeotierError, Result};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 3166-1 style country code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a country field.
    pub fn matches(&self, country: &str) -> bool {
        self.0.eq_ignore_ascii_case(country.trim())
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CountryCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

pub trait BoundaryService: Send + Sync {
    /// Country whose territory contains the point, if any is known.
    fn contains(&self, lat: f64, lon: f64) -> Option<CountryCode>;
}

#[derive(Debug)]
struct IndexedBoundary {
    country: CountryCode,
    geometry: MultiPolygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl IndexedBoundary {
    fn new(country: CountryCode, geometry: MultiPolygon<f64>) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        Some(Self {
            country,
            geometry,
            envelope: AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ),
        })
    }
}

impl RTreeObject for IndexedBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree of country polygons.
pub struct PolygonBoundaryService {
    tree: RTree<IndexedBoundary>,
}

impl PolygonBoundaryService {
    /// Index `(country, geometry)` pairs. Empty geometries are skipped.
    pub fn new<I>(boundaries: I) -> Self
    where
        I: IntoIterator<Item = (CountryCode, MultiPolygon<f64>)>,
    {
        let indexed: Vec<IndexedBoundary> = boundaries
            .into_iter()
            .filter_map(|(country, geometry)| IndexedBoundary::new(country, geometry))
            .collect();

        log::info!("Indexed {} country boundaries", indexed.len());
        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Every country containing the point. Overlapping claims yield several.
    pub fn countries_at(&self, lat: f64, lon: f64) -> Vec<CountryCode> {
        let point = Point::new(lon, lat);
        let query = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query)
            .filter(|boundary| boundary.geometry.contains(&point))
            .map(|boundary| boundary.country.clone())
            .collect()
    }

    /// Load a GeoJSON `FeatureCollection` of Polygon/MultiPolygon features.
    ///
    /// The country code is taken from the first of the `iso_a2`, `ISO_A2`,
    /// `country_code` or `country` properties that holds a string. Features
    /// with other geometry types are skipped.
    #[cfg(feature = "geojson")]
    pub fn from_geojson_str(geojson_str: &str) -> Result<Self> {
        let collection: geojson::FeatureCollection = serde_json::from_str(geojson_str)
            .map_err(|e| GeotierError::Boundary(format!("Failed to parse GeoJSON: {}", e)))?;

        let mut boundaries = Vec::with_capacity(collection.features.len());
        for (i, feature) in collection.features.iter().enumerate() {
            let country = country_property(feature).ok_or_else(|| {
                GeotierError::Boundary(format!("feature {} has no country code property", i))
            })?;
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            if let Some(multi) = geojson_to_multipolygon(&geometry.value)? {
                boundaries.push((country, multi));
            }
        }
        Ok(Self::new(boundaries))
    }

    #[cfg(feature = "geojson")]
    pub fn from_geojson_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let service = Self::from_geojson_str(&contents)?;
        log::info!(
            "Loaded {} country boundaries from {}",
            service.len(),
            path.as_ref().display()
        );
        Ok(service)
    }
}

impl BoundaryService for PolygonBoundaryService {
    fn contains(&self, lat: f64, lon: f64) -> Option<CountryCode> {
        self.countries_at(lat, lon).into_iter().next()
    }
}

impl fmt::Debug for PolygonBoundaryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonBoundaryService")
            .field("boundaries", &self.tree.size())
            .finish()
    }
}

#[cfg(feature = "geojson")]
const COUNTRY_PROPERTIES: [&str; 4] = ["iso_a2", "ISO_A2", "country_code", "country"];

#[cfg(feature = "geojson")]
fn country_property(feature: &geojson::Feature) -> Option<CountryCode> {
    let properties = feature.properties.as_ref()?;
    COUNTRY_PROPERTIES
        .iter()
        .filter_map(|key| properties.get(*key)?.as_str())
        .map(CountryCode::new)
        .next()
}

#[cfg(feature = "geojson")]
fn ring_from_positions(ring: &[Vec<f64>]) -> Result<geo::LineString<f64>> {
    let coords = ring
        .iter()
        .map(|position| {
            if position.len() < 2 {
                return Err(GeotierError::Boundary(
                    "Coordinate must have at least 2 values".to_string(),
                ));
            }
            Ok(geo::Coord {
                x: position[0],
                y: position[1],
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(geo::LineString::from(coords))
}

#[cfg(feature = "geojson")]
fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<geo::Polygon<f64>> {
    let Some((exterior, interiors)) = rings.split_first() else {
        return Err(GeotierError::Boundary(
            "Polygon must have at least one ring".to_string(),
        ));
    };
    let interiors = interiors
        .iter()
        .map(|ring| ring_from_positions(ring))
        .collect::<Result<Vec<_>>>()?;
    Ok(geo::Polygon::new(ring_from_positions(exterior)?, interiors))
}

#[cfg(feature = "geojson")]
fn geojson_to_multipolygon(value: &geojson::Value) -> Result<Option<MultiPolygon<f64>>> {
    match value {
        geojson::Value::Polygon(rings) => Ok(Some(MultiPolygon::new(vec![polygon_from_rings(
            rings,
        )?]))),
        geojson::Value::MultiPolygon(polygons) => {
            let polygons = polygons
                .iter()
                .map(|rings| polygon_from_rings(rings))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(MultiPolygon::new(polygons)))
        }
        _ => Ok(None),
    }
}
