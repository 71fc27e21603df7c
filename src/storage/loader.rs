//! Random-access reader for the data file.

use crate::cell::GeoCell;
use crate::error::{GeotierError, Result};
use crate::geohash;
use crate::index::IndexEntry;
use crate::storage::format::{self, DATA_HEADER_LEN};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Materializes cells from `geo.geodata`.
///
/// Reads are positioned (`pread` on unix, `seek_read` on windows), so one
/// loader can serve any number of threads without a shared cursor.
#[derive(Debug)]
pub struct CellLoader {
    file: File,
    path: PathBuf,
    file_len: u64,
}

impl CellLoader {
    /// Open the data file and check its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        if file_len < DATA_HEADER_LEN as u64 {
            return Err(GeotierError::DataCorrupt(format!(
                "{} is {} bytes, shorter than its header",
                path.display(),
                file_len
            )));
        }

        let mut header = [0u8; DATA_HEADER_LEN];
        read_exact_at(&file, &mut header, 0)?;
        format::check_data_header(&header)?;

        log::debug!("Opened data file {} ({} bytes)", path.display(), file_len);
        Ok(Self {
            file,
            path,
            file_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the data file when it was opened.
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Read and decode the cell `hash` described by `entry`.
    ///
    /// Does no caching; every call goes to disk.
    pub fn load_cell(&self, entry: &IndexEntry, hash: &str) -> Result<GeoCell> {
        let code = geohash::encode_to_u32(hash)?;
        if code != entry.geohash_code {
            return Err(GeotierError::InvalidArgument(format!(
                "geohash '{}' does not match index entry {:#x}",
                hash, entry.geohash_code
            )));
        }

        if !entry.fits_within(self.file_len) {
            return Err(GeotierError::DataCorrupt(format!(
                "cell '{}' spans {} bytes at offset {}, outside data file of {} bytes",
                hash, entry.data_length, entry.data_offset, self.file_len
            )));
        }

        let mut payload = vec![0u8; entry.data_length as usize];
        read_exact_at(&self.file, &mut payload, entry.data_offset)?;

        let entries = format::read_locations(&payload, entry.location_count)
            .map_err(|e| match e {
                GeotierError::DataCorrupt(msg) => {
                    GeotierError::DataCorrupt(format!("cell '{}': {}", hash, msg))
                }
                other => other,
            })?;

        GeoCell::new(hash, entries)
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
