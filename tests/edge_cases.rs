use geotier::geohash;
use geotier::{
    CellLoader, Config, GeotierError, IndexWriter, LocationEntry, ReverseGeocoder, SpatialIndex,
    TieredGeocodingService,
};
use std::sync::Arc;
use tempfile::TempDir;

fn write_fixture(entries: Vec<LocationEntry>) -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut writer = IndexWriter::new(4).unwrap();
    writer.extend(entries).unwrap();
    writer.write(dir.path()).expect("Failed to write index");
    dir
}

fn open(dir: &TempDir) -> TieredGeocodingService {
    let service = TieredGeocodingService::new(Config::new(dir.path())).unwrap();
    service.initialize().expect("Failed to initialize");
    service
}

/// Test 1: Places on opposite sides of the antimeridian
#[test]
fn test_antimeridian_neighbor() {
    // Taveuni, Fiji straddles 180°.
    let dir = write_fixture(vec![LocationEntry::new(-16.5, 179.95, "Waiyevo", "FJ")]);
    let service = open(&dir);

    assert_eq!(geohash::encode(-16.5, -179.95, 4).unwrap(), "2j04");
    assert_eq!(geohash::encode(-16.5, 179.95, 4).unwrap(), "rvpf");

    let result = service.lookup(-16.5, -179.95).unwrap().unwrap();
    assert_eq!(result.location.city.as_deref(), Some("Waiyevo"));
    assert!(result.is_from_neighbor_cell);
    assert!(result.distance_km < 15.0);
}

/// Test 2: Queries near and at the poles
#[test]
fn test_polar_queries() {
    let dir = write_fixture(vec![
        LocationEntry::new(89.95, 10.0, "Polar Station", "XX"),
        LocationEntry::new(-89.99, 0.0, "South Pole", "AQ"),
    ]);
    let service = open(&dir);

    let north = service.lookup(89.99, 10.0).unwrap().unwrap();
    assert_eq!(north.location.city.as_deref(), Some("Polar Station"));

    let south = service.lookup(-90.0, 0.0).unwrap().unwrap();
    assert_eq!(south.location.city.as_deref(), Some("South Pole"));

    assert!(service.lookup(90.0, 180.0).is_ok());
    assert!(service.lookup(90.0, -180.0).is_ok());
}

/// Test 3: Dense cell agrees with brute force
#[test]
fn test_dense_cell_matches_brute_force() {
    let mut seed = 0x2545_f491_u64;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 11) as f64 / (1u64 << 53) as f64
    };

    // All inside dr5r (40.605..40.781, -74.180..-73.828).
    let entries: Vec<LocationEntry> = (0..2_000)
        .map(|i| {
            let lat = 40.62 + next() * 0.14;
            let lon = -74.16 + next() * 0.30;
            LocationEntry::new(lat, lon, &format!("place-{}", i), "US")
        })
        .collect();
    let dir = write_fixture(entries.clone());
    let service = open(&dir);

    for _ in 0..50 {
        let lat = 40.62 + next() * 0.14;
        let lon = -74.16 + next() * 0.30;

        let expected = entries
            .iter()
            .map(|e| (e, geohash::haversine_distance(lat, lon, e.latitude, e.longitude)))
            .fold(None, |best: Option<(&LocationEntry, f64)>, c| match best {
                Some((_, d)) if d <= c.1 => best,
                _ => Some(c),
            })
            .unwrap();

        let result = service.lookup(lat, lon).unwrap().unwrap();
        assert_eq!(result.location.city, expected.0.city);
        assert_eq!(result.distance_km, expected.1);
    }
}

/// Test 4: Equidistant duplicates resolve to the first one written
#[test]
fn test_duplicate_coordinates() {
    let dir = write_fixture(vec![
        LocationEntry::new(48.8566, 2.3522, "Paris", "FR"),
        LocationEntry::new(48.8566, 2.3522, "Paris (duplicate)", "FR"),
    ]);
    let service = open(&dir);

    let result = service.lookup(48.8566, 2.3522).unwrap().unwrap();
    assert_eq!(result.location.city.as_deref(), Some("Paris"));
    assert_eq!(result.distance_km, 0.0);
}

/// Test 5: Index with no places
#[test]
fn test_empty_index() {
    let dir = write_fixture(Vec::new());
    let service = open(&dir);

    assert_eq!(service.index().unwrap().cell_count(), 0);
    assert!(service.lookup(40.7128, -74.0060).unwrap().is_none());
    assert_eq!(service.stats().cache.count, 0);
}

/// Test 6: A damaged cell fails only the queries that touch it
#[test]
fn test_corrupt_cell_is_per_query() {
    let dir = write_fixture(vec![
        LocationEntry::new(40.7128, -74.0060, "New York", "US"),
        LocationEntry::new(51.5074, -0.1278, "London", "GB"),
    ]);

    let index = SpatialIndex::load(dir.path().join("geo.geoindex")).unwrap();
    let london = *index.try_get_cell("gcpv").unwrap();
    let data_path = dir.path().join("geo.geodata");
    let mut data = std::fs::read(&data_path).unwrap();
    // Flags byte of the first record: lat f64 | lon f64 | population u32 | flags u8.
    data[london.data_offset as usize + 20] = 0xff;
    std::fs::write(&data_path, &data).unwrap();

    let service = open(&dir);
    let err = service.lookup(51.5074, -0.1278).unwrap_err();
    assert!(matches!(err, GeotierError::DataCorrupt(_)));
    assert!(err.is_per_query());
    assert!(service.reverse_geocode_or_none(51.5074, -0.1278).is_none());

    let nyc = service.lookup(40.7128, -74.0060).unwrap().unwrap();
    assert_eq!(nyc.location.city.as_deref(), Some("New York"));
}

/// Test 7: Structural damage is fatal at initialization
#[test]
fn test_corrupt_index_fails_initialize() {
    let dir = write_fixture(vec![LocationEntry::new(40.7128, -74.0060, "New York", "US")]);
    let index_path = dir.path().join("geo.geoindex");
    let bytes = std::fs::read(&index_path).unwrap();

    std::fs::write(&index_path, &bytes[..bytes.len() - 1]).unwrap();
    let service = TieredGeocodingService::new(Config::new(dir.path())).unwrap();
    let err = service.initialize().unwrap_err();
    assert!(matches!(err, GeotierError::IndexCorrupt(_)));
    assert!(err.is_fatal());
    assert!(!service.is_initialized());

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    std::fs::write(&index_path, &bad_magic).unwrap();
    assert!(matches!(
        service.initialize(),
        Err(GeotierError::IndexCorrupt(_))
    ));

    // Restoring the file lets a later initialize succeed.
    std::fs::write(&index_path, &bytes).unwrap();
    service.initialize().unwrap();
    assert!(service.lookup(40.7128, -74.0060).unwrap().is_some());
}

/// Test 8: Missing data file
#[test]
fn test_missing_data_file() {
    let dir = write_fixture(vec![LocationEntry::new(40.7128, -74.0060, "New York", "US")]);
    std::fs::remove_file(dir.path().join("geo.geodata")).unwrap();

    let service = TieredGeocodingService::new(Config::new(dir.path())).unwrap();
    assert!(matches!(service.initialize(), Err(GeotierError::Io(_))));
    assert!(matches!(
        service.lookup(40.7128, -74.0060),
        Err(GeotierError::NotInitialized)
    ));
}

/// Test 9: Extreme and invalid coordinates
#[test]
fn test_invalid_coordinates() {
    let dir = write_fixture(vec![LocationEntry::new(0.0, 0.0, "Null Island", "XX")]);
    let service = open(&dir);

    for (lat, lon) in [
        (90.0001, 0.0),
        (-90.0001, 0.0),
        (0.0, 180.0001),
        (0.0, -180.0001),
        (f64::NAN, 0.0),
        (0.0, f64::INFINITY),
    ] {
        assert!(
            matches!(
                service.lookup(lat, lon),
                Err(GeotierError::InvalidArgument(_))
            ),
            "({}, {}) should be rejected",
            lat,
            lon
        );
    }

    let result = service.lookup(0.0, 0.0).unwrap().unwrap();
    assert_eq!(result.location.city.as_deref(), Some("Null Island"));
}

/// Test 10: Cache budget smaller than any single cell
#[test]
fn test_budget_smaller_than_a_cell() {
    let dir = write_fixture(vec![
        LocationEntry::new(40.7128, -74.0060, "New York", "US"),
        LocationEntry::new(51.5074, -0.1278, "London", "GB"),
    ]);
    let service =
        TieredGeocodingService::new(Config::new(dir.path()).with_cache_budget_bytes(1)).unwrap();
    service.initialize().unwrap();

    for _ in 0..5 {
        assert!(service.lookup(40.7128, -74.0060).unwrap().is_some());
        assert!(service.lookup(51.5074, -0.1278).unwrap().is_some());
        assert!(service.cache().count() <= 1);
    }
}

/// Test 11: Loader shared between threads reads consistent cells
#[test]
fn test_loader_concurrent_reads() {
    let entries: Vec<LocationEntry> = (0..200)
        .map(|i| {
            LocationEntry::new(
                40.62 + (i as f64) * 0.0007,
                -74.0,
                &format!("stop-{}", i),
                "US",
            )
        })
        .collect();
    let dir = write_fixture(entries);

    let index = Arc::new(SpatialIndex::load(dir.path().join("geo.geoindex")).unwrap());
    let loader = Arc::new(CellLoader::open(dir.path().join("geo.geodata")).unwrap());
    let expected = {
        let entry = index.try_get_cell("dr5r").unwrap();
        loader.load_cell(entry, "dr5r").unwrap()
    };
    let expected = Arc::new(expected);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            let loader = Arc::clone(&loader);
            let expected = Arc::clone(&expected);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let entry = index.try_get_cell("dr5r").unwrap();
                    let cell = loader.load_cell(entry, "dr5r").unwrap();
                    assert_eq!(cell, *expected);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

/// Test 12: Geohash properties over a coordinate grid
#[test]
fn test_geohash_grid_properties() {
    for lat_step in -8..=8 {
        for lon_step in -17..=17 {
            let lat = lat_step as f64 * 11.1;
            let lon = lon_step as f64 * 10.4;
            for precision in [1, 4, 6, 9, 12] {
                let hash = geohash::encode(lat, lon, precision).unwrap();
                assert!(geohash::decode_bounds(&hash).unwrap().contains(lat, lon));
                if precision <= 6 {
                    let code = geohash::encode_to_u32(&hash).unwrap();
                    assert_eq!(geohash::decode_from_u32(code, precision).unwrap(), hash);
                }
            }

            if lat.abs() < 80.0 && lon.abs() < 170.0 {
                let hash = geohash::encode(lat, lon, 4).unwrap();
                let neighbors = geohash::get_neighbors(&hash).unwrap();
                assert_eq!(neighbors.len(), 8, "neighbors of {}", hash);
                assert!(!neighbors.contains(&hash));
            }
        }
    }
    assert_eq!(geohash::get_ancestors("dr5rg"), vec!["d", "dr", "dr5", "dr5r"]);
}
