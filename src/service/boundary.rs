//! Country-aware wrapper around the tiered engine.

use super::{GeocoderStats, ReverseGeocoder, TieredGeocodingService};
use crate::boundary::BoundaryService;
use crate::config::BoundaryPolicy;
use crate::error::Result;
use crate::types::{GeoLookupResult, LocationGranularity};
use std::fmt;
use std::sync::Arc;

/// Corrects nearest-place answers that cross a national border.
///
/// When the boundary data places the query point in a country, candidates
/// from that country win over nearer places elsewhere. What happens when no
/// candidate matches is decided by the [`BoundaryPolicy`]. Points outside
/// every known boundary get the plain tiered answer.
pub struct BoundaryAwareGeocodingService {
    inner: Arc<TieredGeocodingService>,
    boundaries: Arc<dyn BoundaryService>,
    policy: BoundaryPolicy,
}

impl BoundaryAwareGeocodingService {
    /// Wrap `inner`, taking the policy from its configuration.
    pub fn new(inner: Arc<TieredGeocodingService>, boundaries: Arc<dyn BoundaryService>) -> Self {
        let policy = inner.config().boundary_policy;
        Self {
            inner,
            boundaries,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn inner(&self) -> &Arc<TieredGeocodingService> {
        &self.inner
    }

    fn resolve_lookup(&self, lat: f64, lon: f64) -> Result<Option<GeoLookupResult>> {
        let Some(country) = self.boundaries.contains(lat, lon) else {
            return self.inner.nearest(lat, lon);
        };

        let nearest = self.inner.nearest_split(lat, lon, |entry| country.matches(&entry.country))?;
        if nearest.accepted.is_some() {
            return Ok(nearest.accepted);
        }

        match self.policy {
            BoundaryPolicy::PreferMatching => {
                if let Some(result) = &nearest.overall {
                    log::debug!(
                        "No {} place near ({}, {}), falling back to {} in {}",
                        country,
                        lat,
                        lon,
                        result.location.country,
                        result.cell_geohash
                    );
                }
                Ok(nearest.overall)
            }
            BoundaryPolicy::RequireMatching => {
                log::debug!(
                    "No {} place near ({}, {}), rejecting cross-border candidates",
                    country,
                    lat,
                    lon
                );
                Ok(None)
            }
        }
    }
}

impl ReverseGeocoder for BoundaryAwareGeocodingService {
    fn lookup(&self, lat: f64, lon: f64) -> Result<Option<GeoLookupResult>> {
        let result = self.resolve_lookup(lat, lon)?;
        self.inner.record(result.as_ref());
        Ok(result)
    }

    fn granularity(&self) -> LocationGranularity {
        self.inner.granularity()
    }

    fn stats(&self) -> GeocoderStats {
        self.inner.stats()
    }
}

impl fmt::Debug for BoundaryAwareGeocodingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryAwareGeocodingService")
            .field("inner", &self.inner)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "writer"))]
mod tests {
    use super::*;
    use crate::boundary::{CountryCode, PolygonBoundaryService};
    use crate::config::Config;
    use crate::error::GeotierError;
    use crate::storage::IndexWriter;
    use crate::types::LocationEntry;
    use geo::{MultiPolygon, Rect, coord};
    use tempfile::TempDir;

    fn rect(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            Rect::new(
                coord! { x: min_lon, y: min_lat },
                coord! { x: max_lon, y: max_lat },
            )
            .to_polygon(),
        ])
    }

    /// Windsor (CA) sits just across the river from Detroit (US).
    fn border_fixture() -> (TempDir, Arc<TieredGeocodingService>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let mut writer = IndexWriter::new(4).unwrap();
        writer
            .extend([
                LocationEntry::new(42.3149, -83.0364, "Windsor", "CA"),
                LocationEntry::new(42.3314, -83.0458, "Detroit", "US"),
            ])
            .unwrap();
        writer.write(dir.path()).unwrap();

        let tiered = TieredGeocodingService::new(Config::new(dir.path())).unwrap();
        tiered.initialize().unwrap();
        (dir, Arc::new(tiered))
    }

    /// Split at latitude 42.32: south is CA, north is US.
    fn border() -> Arc<dyn BoundaryService> {
        Arc::new(PolygonBoundaryService::new([
            (CountryCode::new("CA"), rect(-84.0, 41.0, -82.0, 42.32)),
            (CountryCode::new("US"), rect(-84.0, 42.32, -82.0, 43.0)),
        ]))
    }

    struct NoBoundaries;

    impl BoundaryService for NoBoundaries {
        fn contains(&self, _lat: f64, _lon: f64) -> Option<CountryCode> {
            None
        }
    }

    struct Always(&'static str);

    impl BoundaryService for Always {
        fn contains(&self, _lat: f64, _lon: f64) -> Option<CountryCode> {
            Some(CountryCode::new(self.0))
        }
    }

    #[test]
    fn test_prefers_same_country() {
        let (_dir, tiered) = border_fixture();
        // Closer to Windsor, but inside the US polygon.
        let (lat, lon) = (42.3210, -83.0390);
        let raw = tiered.lookup(lat, lon).unwrap().unwrap();
        assert_eq!(raw.location.country, "CA");

        let service = BoundaryAwareGeocodingService::new(Arc::clone(&tiered), border());
        let result = service.lookup(lat, lon).unwrap().unwrap();
        assert_eq!(result.location.country, "US");
        assert_eq!(result.location.city.as_deref(), Some("Detroit"));
    }

    #[test]
    fn test_matching_nearest_unchanged() {
        let (_dir, tiered) = border_fixture();
        let service = BoundaryAwareGeocodingService::new(tiered, border());

        let result = service.lookup(42.3100, -83.0364).unwrap().unwrap();
        assert_eq!(result.location.city.as_deref(), Some("Windsor"));
    }

    #[test]
    fn test_no_polygon_passes_through() {
        let (_dir, tiered) = border_fixture();
        let service =
            BoundaryAwareGeocodingService::new(Arc::clone(&tiered), Arc::new(NoBoundaries));

        let (lat, lon) = (42.3210, -83.0390);
        assert_eq!(
            service.lookup(lat, lon).unwrap(),
            tiered.lookup(lat, lon).unwrap()
        );
    }

    #[test]
    fn test_policy_when_nothing_matches() {
        let (_dir, tiered) = border_fixture();

        let prefer =
            BoundaryAwareGeocodingService::new(Arc::clone(&tiered), Arc::new(Always("MX")));
        assert_eq!(prefer.policy(), BoundaryPolicy::PreferMatching);
        assert!(prefer.lookup(42.3210, -83.0390).unwrap().is_some());

        let require = BoundaryAwareGeocodingService::new(tiered, Arc::new(Always("mx")))
            .with_policy(BoundaryPolicy::RequireMatching);
        assert!(require.lookup(42.3210, -83.0390).unwrap().is_none());
    }

    #[test]
    fn test_fallback_scans_cells_once() {
        let (_dir, tiered) = border_fixture();
        let (lat, lon) = (42.3210, -83.0390);
        tiered.lookup(lat, lon).unwrap();

        let before = tiered.cache().hit_count();
        tiered.lookup(lat, lon).unwrap();
        let plain_hits = tiered.cache().hit_count() - before;
        assert!(plain_hits > 0);

        let prefer =
            BoundaryAwareGeocodingService::new(Arc::clone(&tiered), Arc::new(Always("MX")));
        let before = tiered.cache().hit_count();
        let result = prefer.lookup(lat, lon).unwrap().unwrap();
        assert_eq!(result.location.country, "CA");
        assert_eq!(tiered.cache().hit_count() - before, plain_hits);
    }

    #[test]
    fn test_country_match_is_case_insensitive() {
        let (_dir, tiered) = border_fixture();
        let service = BoundaryAwareGeocodingService::new(tiered, Arc::new(Always("us")))
            .with_policy(BoundaryPolicy::RequireMatching);

        let result = service.lookup(42.3149, -83.0364).unwrap().unwrap();
        assert_eq!(result.location.city.as_deref(), Some("Detroit"));
    }

    #[test]
    fn test_stats_and_errors_delegate() {
        let (_dir, tiered) = border_fixture();
        let service = BoundaryAwareGeocodingService::new(Arc::clone(&tiered), border());

        service.lookup(42.3210, -83.0390).unwrap();
        assert_eq!(service.stats().queries, 1);
        assert!(matches!(
            service.lookup(-91.0, 0.0),
            Err(GeotierError::InvalidArgument(_))
        ));

        let uninitialized =
            Arc::new(TieredGeocodingService::new(Config::new("/nonexistent")).unwrap());
        let service = BoundaryAwareGeocodingService::new(uninitialized, Arc::new(NoBoundaries));
        assert!(matches!(
            service.lookup(42.0, -83.0),
            Err(GeotierError::NotInitialized)
        ));
    }
}
