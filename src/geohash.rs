//! Geohash helpers for cell addressing.
//!
//! Encoding and bounding-box decoding are delegated to the `geohash` crate.
//! On top of that this module adds the pieces the tiered index needs: a packed
//! `u32` form used as the on-disk cell key, neighbor enumeration that tolerates
//! poles and the antimeridian, ancestor prefixes and great-circle distance.

use crate::error::{GeotierError, Result};
use crate::types::CellBounds;
use geo::{Distance, Haversine, Point};

/// The geohash alphabet. `a`, `i`, `l` and `o` are omitted.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const MIN_PRECISION: usize = 1;
pub const MAX_PRECISION: usize = 12;

/// Longest hash whose 5-bit symbols fit in a `u32`.
pub const MAX_PACKED_PRECISION: usize = 6;

const BITS_PER_CHAR: usize = 5;

/// (lat, lon) steps in cell units: N, S, E, W, NE, NW, SE, SW.
const NEIGHBOR_OFFSETS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
];

fn validate_precision(precision: usize, max: usize) -> Result<()> {
    if !(MIN_PRECISION..=max).contains(&precision) {
        return Err(GeotierError::InvalidArgument(format!(
            "geohash precision {} outside [{}, {}]",
            precision, MIN_PRECISION, max
        )));
    }
    Ok(())
}

/// 5-bit value of a geohash symbol.
fn symbol_value(c: char) -> Option<u32> {
    if !c.is_ascii() {
        return None;
    }
    BASE32
        .iter()
        .position(|&b| b == c as u8)
        .map(|idx| idx as u32)
}

fn validate_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(GeotierError::InvalidArgument(
            "geohash must not be empty".to_string(),
        ));
    }
    if hash.len() > MAX_PRECISION {
        return Err(GeotierError::InvalidArgument(format!(
            "geohash '{}' longer than {} characters",
            hash, MAX_PRECISION
        )));
    }
    if let Some(bad) = hash.chars().find(|&c| symbol_value(c).is_none()) {
        return Err(GeotierError::InvalidArgument(format!(
            "invalid character '{}' in geohash '{}'",
            bad, hash
        )));
    }
    Ok(())
}

/// Encode a coordinate into a geohash of `precision` characters.
///
/// # Examples
///
/// ```rust
/// use geotier::geohash;
///
/// assert_eq!(geohash::encode(40.7128, -74.0060, 4).unwrap(), "dr5r");
/// ```
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String> {
    validate_precision(precision, MAX_PRECISION)?;
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(GeotierError::InvalidArgument(format!(
            "latitude {} outside [-90, 90]",
            lat
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(GeotierError::InvalidArgument(format!(
            "longitude {} outside [-180, 180]",
            lon
        )));
    }

    geohash::encode(geohash::Coord { x: lon, y: lat }, precision)
        .map_err(|e| GeotierError::InvalidArgument(e.to_string()))
}

/// Rectangle covered by `hash`.
pub fn decode_bounds(hash: &str) -> Result<CellBounds> {
    validate_hash(hash)?;
    let rect = geohash::decode_bbox(hash)
        .map_err(|e| GeotierError::InvalidArgument(e.to_string()))?;

    Ok(CellBounds {
        min_lat: rect.min().y,
        max_lat: rect.max().y,
        min_lon: rect.min().x,
        max_lon: rect.max().x,
    })
}

/// Midpoint of the cell as `(lat, lon)`.
pub fn decode_center(hash: &str) -> Result<(f64, f64)> {
    Ok(decode_bounds(hash)?.center())
}

/// Pack a hash of at most six characters into its 5-bit-per-symbol integer form.
pub fn encode_to_u32(hash: &str) -> Result<u32> {
    validate_hash(hash)?;
    validate_precision(hash.len(), MAX_PACKED_PRECISION)?;

    Ok(hash
        .chars()
        .filter_map(symbol_value)
        .fold(0u32, |code, value| (code << BITS_PER_CHAR) | value))
}

/// Inverse of [`encode_to_u32`] for a known precision.
pub fn decode_from_u32(code: u32, precision: usize) -> Result<String> {
    validate_precision(precision, MAX_PACKED_PRECISION)?;
    let bits = precision * BITS_PER_CHAR;
    if u64::from(code) >= 1u64 << bits {
        return Err(GeotierError::InvalidArgument(format!(
            "packed geohash {:#x} does not fit precision {}",
            code, precision
        )));
    }

    let hash = (0..precision)
        .rev()
        .map(|i| {
            let value = (code >> (i * BITS_PER_CHAR)) & 0x1f;
            BASE32[value as usize] as char
        })
        .collect();
    Ok(hash)
}

fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

/// Adjacent cells at the same precision.
///
/// Each neighbor is found by stepping one cell width/height away from the
/// center and re-encoding. Steps past a pole are dropped and longitudes wrap
/// across the antimeridian, so polar cells yield fewer than eight entries.
/// The result never contains `hash` itself or duplicates.
pub fn get_neighbors(hash: &str) -> Result<Vec<String>> {
    let bounds = decode_bounds(hash)?;
    let (lat, lon) = bounds.center();
    let precision = hash.len();

    let mut neighbors = Vec::with_capacity(NEIGHBOR_OFFSETS.len());
    for (dlat, dlon) in NEIGHBOR_OFFSETS {
        let n_lat = lat + dlat * bounds.height();
        if !(-90.0..=90.0).contains(&n_lat) {
            continue;
        }
        let n_lon = wrap_longitude(lon + dlon * bounds.width());
        let neighbor = encode(n_lat, n_lon, precision)?;
        if neighbor != hash && !neighbors.contains(&neighbor) {
            neighbors.push(neighbor);
        }
    }
    Ok(neighbors)
}

/// `hash` followed by its neighbors.
pub fn get_cell_and_neighbors(hash: &str) -> Result<Vec<String>> {
    let neighbors = get_neighbors(hash)?;
    let mut cells = Vec::with_capacity(neighbors.len() + 1);
    cells.push(hash.to_string());
    cells.extend(neighbors);
    Ok(cells)
}

/// Proper prefixes of `hash`, coarsest first.
///
/// # Examples
///
/// ```rust
/// use geotier::geohash::get_ancestors;
///
/// assert_eq!(get_ancestors("dr5rg"), vec!["d", "dr", "dr5", "dr5r"]);
/// ```
pub fn get_ancestors(hash: &str) -> Vec<String> {
    let chars: Vec<char> = hash.chars().collect();
    (1..chars.len())
        .map(|len| chars[..len].iter().collect())
        .collect()
}

/// Great-circle distance in kilometres on a sphere of mean Earth radius (≈6371 km).
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2)) / 1000.0
}
