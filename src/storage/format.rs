//! Byte layout of the `geo.geoindex` / `geo.geodata` file pair.
//!
//! All numerics are little-endian. Strings are UTF-8 with a `u16` length
//! prefix.
//!
//! ```text
//! geo.geoindex
//! ├─ magic "GEOTIER_INDEX" | version u8
//! ├─ precision u32 | cell_count u32 | total_locations u32 | data_file_size u64
//! └─ cell_count × { geohash_code u32 | location_count u32 | data_offset u64 | data_length u32 }
//!
//! geo.geodata
//! ├─ magic "GEOTIER_DATA" | version u8
//! └─ location records, addressed by absolute offset from the index
//!    { lat f64 | lon f64 | population u32 | flags u8 | country str | [district] [city] [county] [state] }
//! ```

use crate::error::{GeotierError, Result};
use crate::index::{IndexEntry, IndexHeader};
use crate::types::LocationEntry;
use bytes::{Buf, BufMut, BytesMut};

pub const INDEX_MAGIC: &[u8] = b"GEOTIER_INDEX";
pub const DATA_MAGIC: &[u8] = b"GEOTIER_DATA";
pub const FORMAT_VERSION: u8 = 1;

pub const DEFAULT_INDEX_FILE: &str = "geo.geoindex";
pub const DEFAULT_DATA_FILE: &str = "geo.geodata";

pub const INDEX_HEADER_LEN: usize = INDEX_MAGIC.len() + 1 + 4 + 4 + 4 + 8;
pub const INDEX_RECORD_LEN: usize = 4 + 4 + 8 + 4;
pub const DATA_HEADER_LEN: usize = DATA_MAGIC.len() + 1;

const FLAG_DISTRICT: u8 = 0b0000_0001;
const FLAG_CITY: u8 = 0b0000_0010;
const FLAG_COUNTY: u8 = 0b0000_0100;
const FLAG_STATE: u8 = 0b0000_1000;
const KNOWN_FLAGS: u8 = FLAG_DISTRICT | FLAG_CITY | FLAG_COUNTY | FLAG_STATE;

/// Fixed-width prefix of every location record.
pub const LOCATION_FIXED_LEN: usize = 8 + 8 + 4 + 1;

pub fn write_index_header(buf: &mut BytesMut, header: &IndexHeader) {
    buf.put_slice(INDEX_MAGIC);
    buf.put_u8(FORMAT_VERSION);
    buf.put_u32_le(header.precision);
    buf.put_u32_le(header.cell_count);
    buf.put_u32_le(header.total_location_count);
    buf.put_u64_le(header.data_file_size);
}

pub fn read_index_header(mut buf: &[u8]) -> Result<IndexHeader> {
    if buf.len() < INDEX_HEADER_LEN {
        return Err(GeotierError::IndexCorrupt(format!(
            "header truncated: {} of {} bytes",
            buf.len(),
            INDEX_HEADER_LEN
        )));
    }
    if &buf[..INDEX_MAGIC.len()] != INDEX_MAGIC {
        return Err(GeotierError::IndexCorrupt("bad magic".to_string()));
    }
    buf.advance(INDEX_MAGIC.len());

    let version = buf.get_u8();
    if version != FORMAT_VERSION {
        return Err(GeotierError::IndexCorrupt(format!(
            "unsupported format version {}",
            version
        )));
    }

    Ok(IndexHeader {
        precision: buf.get_u32_le(),
        cell_count: buf.get_u32_le(),
        total_location_count: buf.get_u32_le(),
        data_file_size: buf.get_u64_le(),
    })
}

pub fn write_index_entry(buf: &mut BytesMut, entry: &IndexEntry) {
    buf.put_u32_le(entry.geohash_code);
    buf.put_u32_le(entry.location_count);
    buf.put_u64_le(entry.data_offset);
    buf.put_u32_le(entry.data_length);
}

/// Decode one fixed-size index record; `buf` must hold exactly [`INDEX_RECORD_LEN`] bytes.
pub fn read_index_entry(mut buf: &[u8]) -> Result<IndexEntry> {
    if buf.len() != INDEX_RECORD_LEN {
        return Err(GeotierError::IndexCorrupt(format!(
            "index record is {} bytes, expected {}",
            buf.len(),
            INDEX_RECORD_LEN
        )));
    }
    Ok(IndexEntry {
        geohash_code: buf.get_u32_le(),
        location_count: buf.get_u32_le(),
        data_offset: buf.get_u64_le(),
        data_length: buf.get_u32_le(),
    })
}

pub fn write_data_header(buf: &mut BytesMut) {
    buf.put_slice(DATA_MAGIC);
    buf.put_u8(FORMAT_VERSION);
}

pub fn check_data_header(buf: &[u8]) -> Result<()> {
    if buf.len() < DATA_HEADER_LEN || &buf[..DATA_MAGIC.len()] != DATA_MAGIC {
        return Err(GeotierError::DataCorrupt("bad magic".to_string()));
    }
    let version = buf[DATA_MAGIC.len()];
    if version != FORMAT_VERSION {
        return Err(GeotierError::DataCorrupt(format!(
            "unsupported format version {}",
            version
        )));
    }
    Ok(())
}

fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| {
        GeotierError::InvalidArgument(format!(
            "string of {} bytes exceeds the {} byte record limit",
            value.len(),
            u16::MAX
        ))
    })?;
    buf.put_u16_le(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Append one serialized location record to `buf`.
pub fn write_location(buf: &mut BytesMut, entry: &LocationEntry) -> Result<()> {
    let optional = [
        (FLAG_DISTRICT, &entry.district),
        (FLAG_CITY, &entry.city),
        (FLAG_COUNTY, &entry.county),
        (FLAG_STATE, &entry.state),
    ];
    let flags = optional
        .iter()
        .filter(|(_, value)| value.is_some())
        .fold(0u8, |acc, (flag, _)| acc | flag);

    buf.reserve(LOCATION_FIXED_LEN + 2 + entry.country.len());
    buf.put_f64_le(entry.latitude);
    buf.put_f64_le(entry.longitude);
    buf.put_u32_le(entry.population);
    buf.put_u8(flags);
    put_str(buf, &entry.country)?;
    for (_, value) in optional {
        if let Some(value) = value {
            put_str(buf, value)?;
        }
    }
    Ok(())
}

fn corrupt(what: &str, needed: usize, remaining: usize) -> GeotierError {
    GeotierError::DataCorrupt(format!(
        "{} needs {} bytes, {} remaining",
        what, needed, remaining
    ))
}

fn get_str(buf: &mut &[u8], field: &str) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(corrupt(field, 2, buf.remaining()));
    }
    let len = buf.get_u16_le() as usize;
    if buf.remaining() < len {
        return Err(corrupt(field, len, buf.remaining()));
    }
    let value = std::str::from_utf8(&buf[..len])
        .map_err(|e| GeotierError::DataCorrupt(format!("{} is not UTF-8: {}", field, e)))?
        .to_string();
    buf.advance(len);
    Ok(value)
}

fn get_optional(buf: &mut &[u8], flags: u8, flag: u8, field: &str) -> Result<Option<String>> {
    if flags & flag == 0 {
        return Ok(None);
    }
    get_str(buf, field).map(Some)
}

fn read_location(buf: &mut &[u8]) -> Result<LocationEntry> {
    if buf.remaining() < LOCATION_FIXED_LEN {
        return Err(corrupt("location record", LOCATION_FIXED_LEN, buf.remaining()));
    }
    let latitude = buf.get_f64_le();
    let longitude = buf.get_f64_le();
    let population = buf.get_u32_le();
    let flags = buf.get_u8();

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(GeotierError::DataCorrupt(format!(
            "coordinate ({}, {}) out of range",
            latitude, longitude
        )));
    }
    if flags & !KNOWN_FLAGS != 0 {
        return Err(GeotierError::DataCorrupt(format!(
            "unknown field flags {:#010b}",
            flags
        )));
    }

    let country = get_str(buf, "country")?;
    let district = get_optional(buf, flags, FLAG_DISTRICT, "district")?;
    let city = get_optional(buf, flags, FLAG_CITY, "city")?;
    let county = get_optional(buf, flags, FLAG_COUNTY, "county")?;
    let state = get_optional(buf, flags, FLAG_STATE, "state")?;

    Ok(LocationEntry {
        latitude,
        longitude,
        district,
        city,
        county,
        state,
        country,
        population,
    })
}

/// Decode exactly `count` records spanning all of `bytes`.
pub fn read_locations(mut bytes: &[u8], count: u32) -> Result<Vec<LocationEntry>> {
    let max_possible = bytes.len() / LOCATION_FIXED_LEN;
    if count as usize > max_possible {
        return Err(GeotierError::DataCorrupt(format!(
            "{} records cannot fit in {} bytes",
            count,
            bytes.len()
        )));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(read_location(&mut bytes)?);
    }
    if bytes.has_remaining() {
        return Err(GeotierError::DataCorrupt(format!(
            "{} trailing bytes after {} records",
            bytes.remaining(),
            count
        )));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokyo() -> LocationEntry {
        LocationEntry::new(35.6762, 139.6503, "Tokyo", "JP")
            .with_district("Shinjuku")
            .with_state("Tokyo")
            .with_population(13_960_000)
    }

    #[test]
    fn test_location_records_decode() {
        let mut buf = BytesMut::new();
        write_location(&mut buf, &tokyo()).unwrap();
        write_location(&mut buf, &LocationEntry::new(-1.2921, 36.8219, "Nairobi", "KE")).unwrap();

        let entries = read_locations(&buf, 2).unwrap();
        assert_eq!(entries[0], tokyo());
        assert_eq!(entries[1].city.as_deref(), Some("Nairobi"));
        assert!(entries[1].county.is_none());
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let mut buf = BytesMut::new();
        write_location(&mut buf, &tokyo()).unwrap();

        assert!(matches!(
            read_locations(&buf, 2),
            Err(GeotierError::DataCorrupt(_))
        ));
        assert!(matches!(
            read_locations(&buf, 0),
            Err(GeotierError::DataCorrupt(_))
        ));
    }

    #[test]
    fn test_truncated_string_is_corrupt() {
        let mut buf = BytesMut::new();
        write_location(&mut buf, &tokyo()).unwrap();
        let truncated = &buf[..buf.len() - 3];

        assert!(matches!(
            read_locations(truncated, 1),
            Err(GeotierError::DataCorrupt(_))
        ));
    }

    #[test]
    fn test_unknown_flags_are_corrupt() {
        let mut buf = BytesMut::new();
        write_location(&mut buf, &LocationEntry::new(1.0, 1.0, "X", "Y")).unwrap();
        buf[LOCATION_FIXED_LEN - 1] |= 0b1000_0000;

        assert!(read_locations(&buf, 1).is_err());
    }

    #[test]
    fn test_oversized_string_rejected_on_write() {
        let mut entry = tokyo();
        entry.country = "x".repeat(u16::MAX as usize + 1);
        let mut buf = BytesMut::new();
        assert!(matches!(
            write_location(&mut buf, &entry),
            Err(GeotierError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_index_header_checks() {
        let header = IndexHeader {
            precision: 4,
            cell_count: 2,
            total_location_count: 10,
            data_file_size: 512,
        };
        let mut buf = BytesMut::new();
        write_index_header(&mut buf, &header);
        assert_eq!(buf.len(), INDEX_HEADER_LEN);
        assert_eq!(read_index_header(&buf).unwrap(), header);

        assert!(read_index_header(&buf[..INDEX_HEADER_LEN - 1]).is_err());

        let mut bad_magic = buf.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            read_index_header(&bad_magic),
            Err(GeotierError::IndexCorrupt(_))
        ));

        let mut bad_version = buf.clone();
        bad_version[INDEX_MAGIC.len()] = 9;
        assert!(read_index_header(&bad_version).is_err());
    }

    #[test]
    fn test_data_header_checks() {
        let mut buf = BytesMut::new();
        write_data_header(&mut buf);
        assert_eq!(buf.len(), DATA_HEADER_LEN);
        assert!(check_data_header(&buf).is_ok());
        assert!(check_data_header(b"GEOTIER_DAT").is_err());
        assert!(check_data_header(b"NOT_GEOTIER!\x01").is_err());
    }
}
