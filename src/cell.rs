//! Materialized geohash cells.

use crate::error::Result;
use crate::geohash::{self, haversine_distance};
use crate::types::{CellBounds, LocationEntry};

/// The places that fall inside one geohash rectangle.
///
/// `bounds` always equals `geohash::decode_bounds(&geohash)`; the only
/// constructor derives it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoCell {
    pub geohash: String,
    pub bounds: CellBounds,
    pub entries: Vec<LocationEntry>,
    pub estimated_memory_bytes: usize,
}

impl GeoCell {
    pub fn new(geohash: &str, entries: Vec<LocationEntry>) -> Result<Self> {
        let bounds = geohash::decode_bounds(geohash)?;
        let estimated_memory_bytes = std::mem::size_of::<Self>()
            + geohash.len()
            + entries
                .iter()
                .map(LocationEntry::estimated_memory_bytes)
                .sum::<usize>();

        Ok(Self {
            geohash: geohash.to_string(),
            bounds,
            entries,
            estimated_memory_bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry within `max_distance_km` of the point, with its distance.
    ///
    /// Entries whose population is below `min_population` are skipped.
    pub fn candidates_within(
        &self,
        lat: f64,
        lon: f64,
        max_distance_km: f64,
        min_population: Option<u32>,
    ) -> impl Iterator<Item = (&LocationEntry, f64)> + '_ {
        self.entries
            .iter()
            .filter(move |entry| min_population.is_none_or(|min| entry.population >= min))
            .map(move |entry| {
                let distance = haversine_distance(lat, lon, entry.latitude, entry.longitude);
                (entry, distance)
            })
            .filter(move |(_, distance)| *distance <= max_distance_km)
    }

    /// Closest entry within `max_distance_km`, ties going to the earlier entry.
    pub fn find_nearest(
        &self,
        lat: f64,
        lon: f64,
        max_distance_km: f64,
    ) -> Option<(&LocationEntry, f64)> {
        self.find_nearest_filtered(lat, lon, max_distance_km, None)
    }

    pub fn find_nearest_filtered(
        &self,
        lat: f64,
        lon: f64,
        max_distance_km: f64,
        min_population: Option<u32>,
    ) -> Option<(&LocationEntry, f64)> {
        self.candidates_within(lat, lon, max_distance_km, min_population)
            .fold(None, |best: Option<(&LocationEntry, f64)>, candidate| match best {
                Some((_, best_distance)) if best_distance <= candidate.1 => best,
                _ => Some(candidate),
            })
    }
}
