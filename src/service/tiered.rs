//! The tiered query engine.
//!
//! The index lives in memory for the lifetime of the service. Cells are read
//! from the data file on first use and kept in a shared [`CellCache`]. Every
//! query scans the cell containing the point plus its eight neighbors, since
//! a place just across a cell edge can be closer than anything inside the
//! query's own cell.

use super::{GeocoderStats, QueryCounters, ReverseGeocoder};
use crate::cache::CellCache;
use crate::cell::GeoCell;
use crate::config::Config;
use crate::error::{GeotierError, Result};
use crate::geohash;
use crate::index::{IndexEntry, SpatialIndex};
use crate::storage::CellLoader;
use crate::types::{GeoLookupResult, LocationEntry, LocationGranularity};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[derive(Debug)]
struct Tiers {
    index: SpatialIndex,
    loader: CellLoader,
}

impl Tiers {
    fn open(config: &Config) -> Result<Self> {
        let index = SpatialIndex::load(config.index_path())?;
        let loader = CellLoader::open(config.data_path())?;
        Self::new(index, loader)
    }

    fn new(index: SpatialIndex, loader: CellLoader) -> Result<Self> {
        if loader.file_len() != index.data_file_size() {
            return Err(GeotierError::IndexCorrupt(format!(
                "index expects a {} byte data file, {} is {} bytes",
                index.data_file_size(),
                loader.path().display(),
                loader.file_len()
            )));
        }
        Ok(Self { index, loader })
    }
}

/// Result of [`TieredGeocodingService::nearest_split`].
#[derive(Debug, Default)]
pub(crate) struct Nearest {
    pub(crate) overall: Option<GeoLookupResult>,
    pub(crate) accepted: Option<GeoLookupResult>,
}

/// Replace `best` with `candidate` from `cell` if it is strictly nearer.
fn keep_nearer(
    best: &mut Option<GeoLookupResult>,
    cell: &GeoCell,
    is_neighbor: bool,
    candidate: Option<(&LocationEntry, f64)>,
) {
    if let Some((entry, distance_km)) = candidate
        && best.as_ref().is_none_or(|b| distance_km < b.distance_km)
    {
        *best = Some(GeoLookupResult {
            location: entry.clone(),
            distance_km,
            cell_geohash: cell.geohash.clone(),
            is_from_neighbor_cell: is_neighbor,
        });
    }
}

#[derive(Debug)]
pub struct TieredGeocodingService {
    config: Config,
    tiers: OnceCell<Tiers>,
    cache: CellCache,
    counters: QueryCounters,
}

impl TieredGeocodingService {
    /// Create an uninitialized service. Call [`initialize`](Self::initialize)
    /// before querying.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let cache = CellCache::new(config.cache_budget_bytes);
        Ok(Self {
            config,
            tiers: OnceCell::new(),
            cache,
            counters: QueryCounters::default(),
        })
    }

    /// Create a ready-to-query service from an already loaded index and data file.
    pub fn from_parts(config: Config, index: SpatialIndex, loader: CellLoader) -> Result<Self> {
        let service = Self::new(config)?;
        let tiers = Tiers::new(index, loader)?;
        if service.tiers.set(tiers).is_err() {
            return Err(GeotierError::InvalidArgument(
                "service already initialized".to_string(),
            ));
        }
        Ok(service)
    }

    /// Load the index and open the data file.
    ///
    /// Missing or corrupt files are reported here and leave the service
    /// uninitialized. Calling this again after success is a no-op.
    pub fn initialize(&self) -> Result<()> {
        if self.tiers.get().is_some() {
            log::warn!("Geocoding service already initialized, ignoring repeated initialize()");
            return Ok(());
        }

        let tiers = self.tiers.get_or_try_init(|| Tiers::open(&self.config))?;
        log::info!(
            "Geocoding service ready: precision {}, {} cells, {} locations, {} data bytes, cache budget {} bytes",
            tiers.index.precision(),
            tiers.index.cell_count(),
            tiers.index.total_location_count(),
            tiers.index.data_file_size(),
            self.cache.budget_bytes()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.tiers.get().is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CellCache {
        &self.cache
    }

    pub fn index(&self) -> Result<&SpatialIndex> {
        Ok(&self.tiers()?.index)
    }

    fn tiers(&self) -> Result<&Tiers> {
        self.tiers.get().ok_or(GeotierError::NotInitialized)
    }

    /// Cached cell, or a fresh load that is then cached.
    ///
    /// The cache lock is not held across the disk read.
    fn cell(&self, tiers: &Tiers, hash: &str, entry: &IndexEntry) -> Result<Arc<GeoCell>> {
        if let Some(cell) = self.cache.try_get(hash) {
            return Ok(cell);
        }
        log::debug!(
            "Cache miss for cell {}, loading {} locations from disk",
            hash,
            entry.location_count
        );
        let cell = Arc::new(tiers.loader.load_cell(entry, hash)?);
        self.cache.put(hash, Arc::clone(&cell));
        Ok(cell)
    }

    /// Visit the query cell (if indexed) and then each indexed neighbor.
    ///
    /// The callback receives the cell and whether it is a neighbor.
    fn for_each_cell<F>(&self, lat: f64, lon: f64, mut visit: F) -> Result<()>
    where
        F: FnMut(&GeoCell, bool),
    {
        let tiers = self.tiers()?;
        // Rejects NaN and out-of-range coordinates.
        let hash = geohash::encode(lat, lon, tiers.index.precision())?;

        let local = match self.cache.try_get(&hash) {
            Some(cell) => Some(cell),
            None => match tiers.index.try_get_cell(&hash) {
                Some(entry) => {
                    let cell = Arc::new(tiers.loader.load_cell(entry, &hash)?);
                    self.cache.put(&hash, Arc::clone(&cell));
                    Some(cell)
                }
                None => None,
            },
        };
        if let Some(cell) = local {
            visit(&cell, false);
        }

        for (neighbor, entry) in tiers.index.get_cell_and_neighbors(&hash)? {
            if neighbor == hash {
                continue;
            }
            let cell = self.cell(tiers, &neighbor, &entry)?;
            visit(&cell, true);
        }
        Ok(())
    }

    /// Nearest place within the distance bound.
    ///
    /// Does not touch the query counters.
    pub(crate) fn nearest(&self, lat: f64, lon: f64) -> Result<Option<GeoLookupResult>> {
        Ok(self.nearest_split(lat, lon, |_| false)?.overall)
    }

    /// Nearest place overall and nearest place satisfying `accept`, found in
    /// one pass over the cells.
    ///
    /// Does not touch the query counters.
    pub(crate) fn nearest_split<P>(&self, lat: f64, lon: f64, accept: P) -> Result<Nearest>
    where
        P: Fn(&LocationEntry) -> bool,
    {
        let max_distance_km = self.config.max_distance_km;
        let min_population = self.config.min_population;
        let mut nearest = Nearest::default();

        self.for_each_cell(lat, lon, |cell, is_neighbor| {
            let mut overall: Option<(&LocationEntry, f64)> = None;
            let mut accepted: Option<(&LocationEntry, f64)> = None;
            for (entry, distance) in
                cell.candidates_within(lat, lon, max_distance_km, min_population)
            {
                if overall.is_none_or(|(_, d)| distance < d) {
                    overall = Some((entry, distance));
                }
                if accepted.is_none_or(|(_, d)| distance < d) && accept(entry) {
                    accepted = Some((entry, distance));
                }
            }
            keep_nearer(&mut nearest.overall, cell, is_neighbor, overall);
            keep_nearer(&mut nearest.accepted, cell, is_neighbor, accepted);
        })?;

        Ok(nearest)
    }

    /// Every place within `max_distance_km` in the query cell and its
    /// neighbors, nearest first.
    ///
    /// The configured population filter still applies.
    pub fn find_candidates(
        &self,
        lat: f64,
        lon: f64,
        max_distance_km: f64,
    ) -> Result<Vec<GeoLookupResult>> {
        let min_population = self.config.min_population;
        let mut results = Vec::new();

        self.for_each_cell(lat, lon, |cell, is_neighbor| {
            results.extend(
                cell.candidates_within(lat, lon, max_distance_km, min_population)
                    .map(|(entry, distance_km)| GeoLookupResult {
                        location: entry.clone(),
                        distance_km,
                        cell_geohash: cell.geohash.clone(),
                        is_from_neighbor_cell: is_neighbor,
                    }),
            );
        })?;

        results.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    pub(crate) fn record(&self, outcome: Option<&GeoLookupResult>) {
        if outcome.is_none() {
            log::debug!("No location within {} km", self.config.max_distance_km);
        }
        self.counters.record(outcome);
    }
}

impl ReverseGeocoder for TieredGeocodingService {
    fn lookup(&self, lat: f64, lon: f64) -> Result<Option<GeoLookupResult>> {
        let result = self.nearest(lat, lon)?;
        self.record(result.as_ref());
        Ok(result)
    }

    fn granularity(&self) -> LocationGranularity {
        self.config.granularity
    }

    fn stats(&self) -> GeocoderStats {
        self.counters.snapshot(self.cache.stats())
    }
}
