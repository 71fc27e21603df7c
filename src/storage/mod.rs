//! On-disk storage for the tiered index.
//!
//! `format` owns the byte layout, `loader` reads cells back at query time and
//! `writer` (feature `writer`) produces the file pair offline.

pub mod format;
pub mod loader;
#[cfg(feature = "writer")]
pub mod writer;

pub use format::{DEFAULT_DATA_FILE, DEFAULT_INDEX_FILE};
pub use loader::CellLoader;
#[cfg(feature = "writer")]
pub use writer::IndexWriter;
