//! Query services.
//!
//! [`TieredGeocodingService`] is the engine proper. [`BoundaryAwareGeocodingService`]
//! wraps it with a country containment check. Both are used through the
//! [`ReverseGeocoder`] trait so callers can hold either behind an `Arc<dyn _>`.

pub mod boundary;
pub mod tiered;

pub use boundary::BoundaryAwareGeocodingService;
pub use tiered::TieredGeocodingService;

use crate::cache::CacheStats;
use crate::error::Result;
use crate::types::{GeoLookupResult, Location, LocationGranularity};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub trait ReverseGeocoder: Send + Sync {
    /// Nearest indexed place with its distance and source cell.
    fn lookup(&self, lat: f64, lon: f64) -> Result<Option<GeoLookupResult>>;

    /// Granularity configured for [`ReverseGeocoder::resolve`].
    fn granularity(&self) -> LocationGranularity {
        LocationGranularity::default()
    }

    fn stats(&self) -> GeocoderStats;

    /// Nearest place with every available field filled in.
    ///
    /// `Ok(None)` means nothing lies within the distance bound.
    fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<Location>> {
        Ok(self.lookup(lat, lon)?.map(|result| result.to_location()))
    }

    /// Like [`ReverseGeocoder::reverse_geocode`] but logs failures and
    /// reports them as "no location".
    fn reverse_geocode_or_none(&self, lat: f64, lon: f64) -> Option<Location> {
        match self.reverse_geocode(lat, lon) {
            Ok(location) => location,
            Err(e) if e.is_fatal() => {
                log::error!("Reverse geocoding ({}, {}) failed: {}", lat, lon, e);
                None
            }
            Err(e) => {
                log::warn!("Reverse geocoding ({}, {}) failed: {}", lat, lon, e);
                None
            }
        }
    }

    /// Place name for the metadata pipeline, truncated to the configured
    /// granularity.
    fn resolve(&self, lat: f64, lon: f64) -> Option<Location> {
        self.reverse_geocode_or_none(lat, lon)
            .map(|location| location.with_granularity(self.granularity()))
    }
}

/// Point-in-time view of query counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocoderStats {
    pub queries: u64,
    pub resolved: u64,
    pub unresolved: u64,
    /// Resolved queries whose winner came from a neighboring cell.
    pub neighbor_matches: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Default)]
pub(crate) struct QueryCounters {
    queries: AtomicU64,
    resolved: AtomicU64,
    unresolved: AtomicU64,
    neighbor_matches: AtomicU64,
}

impl QueryCounters {
    pub(crate) fn record(&self, outcome: Option<&GeoLookupResult>) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Some(result) => {
                self.resolved.fetch_add(1, Ordering::Relaxed);
                if result.is_from_neighbor_cell {
                    self.neighbor_matches.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                self.unresolved.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn snapshot(&self, cache: CacheStats) -> GeocoderStats {
        GeocoderStats {
            queries: self.queries.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            neighbor_matches: self.neighbor_matches.load(Ordering::Relaxed),
            cache,
        }
    }
}
