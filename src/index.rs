//! In-memory directory of geohash cells.
//!
//! The index file is read in full at startup. Each record maps a packed
//! geohash to the byte range in the data file that holds the cell's places.
//! After loading the index is immutable and can be shared across threads
//! without locking.

use crate::error::{GeotierError, Result};
use crate::geohash;
use crate::storage::format::{self, DATA_HEADER_LEN, INDEX_HEADER_LEN, INDEX_RECORD_LEN};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Aggregate metadata stored at the top of the index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub precision: u32,
    pub cell_count: u32,
    pub total_location_count: u32,
    pub data_file_size: u64,
}

/// Location of one cell's records inside the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub geohash_code: u32,
    pub location_count: u32,
    pub data_offset: u64,
    pub data_length: u32,
}

impl IndexEntry {
    /// One past the last byte of this cell in the data file, or `None` if
    /// the range does not fit in a `u64`.
    pub fn data_end(&self) -> Option<u64> {
        self.data_offset.checked_add(u64::from(self.data_length))
    }

    /// Whether the cell's bytes lie after the data header and within `file_len`.
    pub(crate) fn fits_within(&self, file_len: u64) -> bool {
        self.data_offset >= DATA_HEADER_LEN as u64
            && self.data_end().is_some_and(|end| end <= file_len)
    }
}

/// Read-only geohash → cell directory.
#[derive(Debug)]
pub struct SpatialIndex {
    header: IndexHeader,
    cells: FxHashMap<u32, IndexEntry>,
}

impl SpatialIndex {
    /// Load and validate an index file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let index = Self::from_bytes(&bytes)?;

        log::info!(
            "Loaded spatial index {}: precision {}, {} cells, {} locations",
            path.display(),
            index.header.precision,
            index.header.cell_count,
            index.header.total_location_count
        );
        Ok(index)
    }

    /// Validate and index an in-memory copy of the index file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = format::read_index_header(bytes)?;

        let precision = header.precision as usize;
        if !(geohash::MIN_PRECISION..=geohash::MAX_PACKED_PRECISION).contains(&precision) {
            return Err(GeotierError::IndexCorrupt(format!(
                "precision {} outside [{}, {}]",
                precision,
                geohash::MIN_PRECISION,
                geohash::MAX_PACKED_PRECISION
            )));
        }

        let records = &bytes[INDEX_HEADER_LEN..];
        let expected_len = header.cell_count as usize * INDEX_RECORD_LEN;
        if records.len() != expected_len {
            return Err(GeotierError::IndexCorrupt(format!(
                "header declares {} cells ({} bytes) but file holds {} record bytes",
                header.cell_count,
                expected_len,
                records.len()
            )));
        }

        let code_limit = 1u64 << (precision * 5);
        let mut cells =
            FxHashMap::with_capacity_and_hasher(header.cell_count as usize, Default::default());
        let mut location_sum = 0u64;

        for chunk in records.chunks_exact(INDEX_RECORD_LEN) {
            let entry = format::read_index_entry(chunk)?;

            if u64::from(entry.geohash_code) >= code_limit {
                return Err(GeotierError::IndexCorrupt(format!(
                    "cell code {:#x} exceeds precision {}",
                    entry.geohash_code, precision
                )));
            }
            if !entry.fits_within(header.data_file_size) {
                return Err(GeotierError::IndexCorrupt(format!(
                    "cell {:#x} spans {} bytes at offset {}, outside data file of {} bytes",
                    entry.geohash_code, entry.data_length, entry.data_offset, header.data_file_size
                )));
            }
            if cells.insert(entry.geohash_code, entry).is_some() {
                return Err(GeotierError::IndexCorrupt(format!(
                    "duplicate cell {:#x}",
                    entry.geohash_code
                )));
            }
            location_sum += u64::from(entry.location_count);
        }

        if location_sum != u64::from(header.total_location_count) {
            return Err(GeotierError::IndexCorrupt(format!(
                "cells hold {} locations, header declares {}",
                location_sum, header.total_location_count
            )));
        }

        Ok(Self { header, cells })
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Geohash length the index was built with.
    pub fn precision(&self) -> usize {
        self.header.precision as usize
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn total_location_count(&self) -> u32 {
        self.header.total_location_count
    }

    pub fn data_file_size(&self) -> u64 {
        self.header.data_file_size
    }

    /// Look up a cell by geohash string.
    ///
    /// `None` means the cell holds no indexed places, which is the common case
    /// away from populated areas. Hashes of the wrong length or with invalid
    /// characters are also reported as absent.
    pub fn try_get_cell(&self, hash: &str) -> Option<&IndexEntry> {
        if hash.len() != self.precision() {
            return None;
        }
        let code = geohash::encode_to_u32(hash).ok()?;
        self.cells.get(&code)
    }

    /// `hash` and its neighbors, restricted to cells present in the index.
    pub fn get_cell_and_neighbors(&self, hash: &str) -> Result<Vec<(String, IndexEntry)>> {
        let candidates = geohash::get_cell_and_neighbors(hash)?;
        Ok(candidates
            .into_iter()
            .filter_map(|cell| {
                let entry = *self.try_get_cell(&cell)?;
                Some((cell, entry))
            })
            .collect())
    }

    /// Every cell, ordered by packed geohash.
    pub fn get_all_cells(&self) -> Vec<IndexEntry> {
        let mut cells: Vec<IndexEntry> = self.cells.values().copied().collect();
        cells.sort_by_key(|entry| entry.geohash_code);
        cells
    }

    /// String form of an entry's cell.
    pub fn geohash_of(&self, entry: &IndexEntry) -> Result<String> {
        geohash::decode_from_u32(entry.geohash_code, self.precision())
    }
}
