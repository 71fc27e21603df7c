//! Tiered reverse geocoding: GPS coordinate to place name.
//!
//! Places are bucketed into geohash cells and stored as a file pair. The
//! index (`geo.geoindex`) is loaded into memory at startup. Cell contents
//! (`geo.geodata`) are read on demand and kept in a byte-budgeted LRU cache.
//! Each query searches the point's own cell plus its neighbors and returns
//! the nearest place within a distance bound.
//!
//! ```rust,no_run
//! use geotier::{Config, GeocoderBuilder, ReverseGeocoder};
//!
//! let geocoder = GeocoderBuilder::new()
//!     .config(Config::new("/var/lib/geotier").with_max_distance_km(50.0))
//!     .build()?;
//!
//! if let Some(place) = geocoder.reverse_geocode(40.7128, -74.0060)? {
//!     println!("{}, {}", place.display_name(), place.country);
//! }
//! # Ok::<(), geotier::GeotierError>(())
//! ```

pub mod boundary;
pub mod builder;
pub mod cache;
pub mod cell;
pub mod config;
pub mod error;
pub mod geohash;
pub mod index;
pub mod service;
pub mod storage;
pub mod types;

pub use boundary::{BoundaryService, CountryCode, PolygonBoundaryService};
pub use builder::GeocoderBuilder;
pub use cache::{CacheStats, CellCache};
pub use cell::GeoCell;
pub use config::{BoundaryPolicy, Config};
pub use error::{GeotierError, Result};
pub use index::{IndexEntry, IndexHeader, SpatialIndex};
pub use service::{
    BoundaryAwareGeocodingService, GeocoderStats, ReverseGeocoder, TieredGeocodingService,
};
pub use storage::CellLoader;
#[cfg(feature = "writer")]
pub use storage::IndexWriter;
pub use types::{
    CellBounds, GeoCoordinate, GeoLookupResult, Location, LocationEntry, LocationGranularity,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeocoderBuilder, GeotierError, Result};

    pub use crate::{BoundaryPolicy, Config};

    pub use crate::{Location, LocationEntry, LocationGranularity};

    pub use crate::{BoundaryService, CountryCode, ReverseGeocoder};

    #[cfg(feature = "writer")]
    pub use crate::IndexWriter;

    pub use std::sync::Arc;
}
