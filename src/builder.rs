//! Geocoder builder.
//!
//! Assembles a configured, initialized geocoder and hands it out as a shared
//! handle that worker threads can clone.

use crate::boundary::BoundaryService;
#[cfg(feature = "geojson")]
use crate::boundary::PolygonBoundaryService;
use crate::config::{BoundaryPolicy, Config};
#[cfg(feature = "geojson")]
use crate::error::GeotierError;
use crate::error::Result;
use crate::service::{BoundaryAwareGeocodingService, ReverseGeocoder, TieredGeocodingService};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub struct GeocoderBuilder {
    config: Config,
    boundaries: Option<Arc<dyn BoundaryService>>,
    #[cfg(feature = "geojson")]
    boundary_file: Option<PathBuf>,
}

impl GeocoderBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            boundaries: None,
            #[cfg(feature = "geojson")]
            boundary_file: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn max_distance_km(mut self, km: f64) -> Self {
        self.config.max_distance_km = km;
        self
    }

    pub fn cache_budget_bytes(mut self, bytes: usize) -> Self {
        self.config.cache_budget_bytes = bytes;
        self
    }

    pub fn boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.config.boundary_policy = policy;
        self
    }

    /// Correct results with country containment from `service`.
    pub fn boundary_service(mut self, service: Arc<dyn BoundaryService>) -> Self {
        self.boundaries = Some(service);
        self
    }

    /// Load country boundaries from a GeoJSON file at build time.
    #[cfg(feature = "geojson")]
    pub fn boundary_geojson<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.boundary_file = Some(path.into());
        self
    }

    /// Build and initialize the tiered engine on its own.
    pub fn build_tiered(&self) -> Result<Arc<TieredGeocodingService>> {
        let service = TieredGeocodingService::new(self.config.clone())?;
        service.initialize()?;
        Ok(Arc::new(service))
    }

    /// Build the geocoder, boundary-aware if boundaries were supplied.
    ///
    /// Supplying both a boundary service and a GeoJSON file is a
    /// configuration error.
    pub fn build(self) -> Result<Arc<dyn ReverseGeocoder>> {
        #[cfg(feature = "geojson")]
        let boundaries = match (self.boundary_file.as_ref(), self.boundaries.clone()) {
            (Some(_), Some(_)) => {
                return Err(GeotierError::Config(
                    "boundary_service and boundary_geojson are mutually exclusive".to_string(),
                ));
            }
            (Some(path), None) => Some(Arc::new(PolygonBoundaryService::from_geojson_file(path)?)
                as Arc<dyn BoundaryService>),
            (None, boundaries) => boundaries,
        };
        #[cfg(not(feature = "geojson"))]
        let boundaries = self.boundaries.clone();

        let tiered = self.build_tiered()?;

        let geocoder: Arc<dyn ReverseGeocoder> = match boundaries {
            Some(boundaries) => Arc::new(BoundaryAwareGeocodingService::new(tiered, boundaries)),
            None => tiered,
        };
        Ok(geocoder)
    }
}

impl Default for GeocoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GeocoderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocoderBuilder")
            .field("config", &self.config)
            .field("boundaries", &self.boundaries.is_some())
            .finish_non_exhaustive()
    }
}
