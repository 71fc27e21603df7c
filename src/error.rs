//! Error types for geotier.
//!
//! Failures fall into two groups. Structural problems with the index or data
//! files, configuration mistakes and use before initialization are fatal to
//! the engine. I/O failures and damaged cell payloads hit during a single query
//! only affect that query.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeotierError>;

#[derive(Debug, Error)]
pub enum GeotierError {
    /// Bad precision, malformed geohash, out-of-range coordinate.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The index file is truncated or structurally inconsistent.
    #[error("Index file is corrupt: {0}")]
    IndexCorrupt(String),

    /// A cell payload in the data file could not be decoded.
    #[error("Data file is corrupt: {0}")]
    DataCorrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A query arrived before `initialize()` completed.
    #[error("Geocoding service has not been initialized")]
    NotInitialized,

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The boundary dataset could not be parsed.
    #[error("Boundary data error: {0}")]
    Boundary(String),
}

impl GeotierError {
    /// Errors that leave the engine unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IndexCorrupt(_) | Self::NotInitialized | Self::Config(_) | Self::Boundary(_)
        )
    }

    /// Errors scoped to one lookup; callers treat them as "no location".
    pub fn is_per_query(&self) -> bool {
        matches!(self, Self::Io(_) | Self::DataCorrupt(_))
    }
}
