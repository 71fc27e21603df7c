//! Offline generator for the `geo.geoindex` / `geo.geodata` pair.

use crate::error::{GeotierError, Result};
use crate::geohash;
use crate::index::{IndexEntry, IndexHeader};
use crate::storage::format::{self, DEFAULT_DATA_FILE, DEFAULT_INDEX_FILE};
use crate::types::{GeoCoordinate, LocationEntry};
use bytes::BytesMut;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Default geohash length for generated indexes (~39 km × 20 km cells).
pub const DEFAULT_PRECISION: usize = 4;

/// Buckets places by geohash and serializes them.
///
/// ```no_run
/// use geotier::storage::IndexWriter;
/// use geotier::LocationEntry;
///
/// let mut writer = IndexWriter::new(4)?;
/// writer.add(LocationEntry::new(40.7128, -74.0060, "New York", "US"))?;
/// writer.write("/var/lib/geotier")?;
/// # Ok::<(), geotier::GeotierError>(())
/// ```
#[derive(Debug)]
pub struct IndexWriter {
    precision: usize,
    cells: BTreeMap<u32, Vec<LocationEntry>>,
    location_count: u32,
}

impl IndexWriter {
    pub fn new(precision: usize) -> Result<Self> {
        if !(geohash::MIN_PRECISION..=geohash::MAX_PACKED_PRECISION).contains(&precision) {
            return Err(GeotierError::InvalidArgument(format!(
                "index precision {} outside [{}, {}]",
                precision,
                geohash::MIN_PRECISION,
                geohash::MAX_PACKED_PRECISION
            )));
        }
        Ok(Self {
            precision,
            cells: BTreeMap::new(),
            location_count: 0,
        })
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.location_count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.location_count == 0
    }

    pub fn add(&mut self, entry: LocationEntry) -> Result<()> {
        GeoCoordinate::new(entry.latitude, entry.longitude)?;
        if self.location_count == u32::MAX {
            return Err(GeotierError::InvalidArgument(
                "index cannot hold more than u32::MAX locations".to_string(),
            ));
        }

        let hash = geohash::encode(entry.latitude, entry.longitude, self.precision)?;
        let code = geohash::encode_to_u32(&hash)?;
        self.cells.entry(code).or_default().push(entry);
        self.location_count += 1;
        Ok(())
    }

    pub fn extend<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = LocationEntry>,
    {
        for entry in entries {
            self.add(entry)?;
        }
        Ok(())
    }

    /// Write both files into `dir` under their default names.
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<IndexHeader> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        self.write_to(dir.join(DEFAULT_INDEX_FILE), dir.join(DEFAULT_DATA_FILE))
    }

    pub fn write_to<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        index_path: P,
        data_path: Q,
    ) -> Result<IndexHeader> {
        let (data, entries) = self.encode_data()?;

        let header = IndexHeader {
            precision: self.precision as u32,
            cell_count: entries.len() as u32,
            total_location_count: self.location_count,
            data_file_size: data.len() as u64,
        };

        let mut index = BytesMut::with_capacity(
            format::INDEX_HEADER_LEN + entries.len() * format::INDEX_RECORD_LEN,
        );
        format::write_index_header(&mut index, &header);
        for entry in &entries {
            format::write_index_entry(&mut index, entry);
        }

        write_file(data_path.as_ref(), &data)?;
        write_file(index_path.as_ref(), &index)?;

        log::info!(
            "Wrote geocoding index {}: precision {}, {} cells, {} locations, {} data bytes",
            index_path.as_ref().display(),
            header.precision,
            header.cell_count,
            header.total_location_count,
            header.data_file_size
        );
        Ok(header)
    }

    fn encode_data(&self) -> Result<(BytesMut, Vec<IndexEntry>)> {
        let mut data = BytesMut::new();
        format::write_data_header(&mut data);

        let mut entries = Vec::with_capacity(self.cells.len());
        for (&code, locations) in &self.cells {
            let offset = data.len();
            for location in locations {
                format::write_location(&mut data, location)?;
            }
            let data_length = u32::try_from(data.len() - offset).map_err(|_| {
                GeotierError::InvalidArgument(format!(
                    "cell {:#x} serializes to more than 4 GiB",
                    code
                ))
            })?;

            entries.push(IndexEntry {
                geohash_code: code,
                location_count: locations.len() as u32,
                data_offset: offset as u64,
                data_length,
            });
        }
        Ok((data, entries))
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
