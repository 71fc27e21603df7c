//! Engine configuration.

use crate::cache::DEFAULT_CACHE_BUDGET_BYTES;
use crate::error::{GeotierError, Result};
use crate::storage::{DEFAULT_DATA_FILE, DEFAULT_INDEX_FILE};
use crate::types::LocationGranularity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What the boundary-aware service does when the nearest place lies in a
/// different country than the query point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Re-rank candidates: same-country places first, then by distance.
    /// Falls back to the nearest place if no candidate matches.
    #[default]
    PreferMatching,
    /// Only return same-country places; `None` if there are none.
    RequireMatching,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the index and data files.
    #[serde(default = "Config::default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "Config::default_index_file_name")]
    pub index_file_name: String,

    #[serde(default = "Config::default_data_file_name")]
    pub data_file_name: String,

    /// Places farther than this from the query point are never returned.
    #[serde(default = "Config::default_max_distance_km")]
    pub max_distance_km: f64,

    /// Soft memory budget for materialized cells.
    #[serde(default = "Config::default_cache_budget_bytes")]
    pub cache_budget_bytes: usize,

    /// Places with a smaller population are ignored.
    #[serde(default)]
    pub min_population: Option<u32>,

    #[serde(default)]
    pub granularity: LocationGranularity,

    #[serde(default)]
    pub boundary_policy: BoundaryPolicy,
}

impl Config {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("data")
    }

    fn default_index_file_name() -> String {
        DEFAULT_INDEX_FILE.to_string()
    }

    fn default_data_file_name() -> String {
        DEFAULT_DATA_FILE.to_string()
    }

    const fn default_max_distance_km() -> f64 {
        100.0
    }

    const fn default_cache_budget_bytes() -> usize {
        DEFAULT_CACHE_BUDGET_BYTES
    }

    /// Defaults with `data_dir` pointed at `dir`.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self::default().with_data_dir(dir)
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_file_names(mut self, index: &str, data: &str) -> Self {
        self.index_file_name = index.to_string();
        self.data_file_name = data.to_string();
        self
    }

    pub fn with_max_distance_km(mut self, km: f64) -> Self {
        self.max_distance_km = km;
        self
    }

    pub fn with_cache_budget_bytes(mut self, bytes: usize) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    pub fn with_min_population(mut self, population: u32) -> Self {
        self.min_population = Some(population);
        self
    }

    pub fn with_granularity(mut self, granularity: LocationGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary_policy = policy;
        self
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file_name)
    }

    pub fn data_path(&self) -> PathBuf {
        self.data_dir.join(&self.data_file_name)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            return Err(GeotierError::Config(format!(
                "max_distance_km must be a positive number, got {}",
                self.max_distance_km
            )));
        }
        if self.cache_budget_bytes == 0 {
            return Err(GeotierError::Config(
                "cache_budget_bytes must be greater than zero".to_string(),
            ));
        }
        if self.index_file_name.is_empty() || self.data_file_name.is_empty() {
            return Err(GeotierError::Config(
                "index and data file names must not be empty".to_string(),
            ));
        }
        if self.index_file_name == self.data_file_name {
            return Err(GeotierError::Config(format!(
                "index and data files must differ, both are '{}'",
                self.index_file_name
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| GeotierError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GeotierError::Config(e.to_string()))
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| GeotierError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GeotierError::Config(e.to_string()))
    }

    /// Load from a `.json` or (with the `toml` feature) `.toml` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml_str(&contents),
            _ => Err(GeotierError::Config(format!(
                "unsupported config file type: {}",
                path.display()
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            index_file_name: Self::default_index_file_name(),
            data_file_name: Self::default_data_file_name(),
            max_distance_km: Self::default_max_distance_km(),
            cache_budget_bytes: Self::default_cache_budget_bytes(),
            min_population: None,
            granularity: LocationGranularity::default(),
            boundary_policy: BoundaryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_distance_km, 100.0);
        assert_eq!(config.cache_budget_bytes, 8 * 1024 * 1024);
        assert!(config.min_population.is_none());
        assert_eq!(config.granularity, LocationGranularity::District);
        assert_eq!(config.boundary_policy, BoundaryPolicy::PreferMatching);
        assert_eq!(config.index_path(), PathBuf::from("data/geo.geoindex"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::new("/srv/geo")
            .with_max_distance_km(25.0)
            .with_min_population(1000)
            .with_granularity(LocationGranularity::City)
            .with_boundary_policy(BoundaryPolicy::RequireMatching);

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json_str(&json).unwrap();
        assert_eq!(deserialized, config);
        assert_eq!(deserialized.data_path(), PathBuf::from("/srv/geo/geo.geodata"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            Config::from_json_str(r#"{"data_dir": "/tmp/geo", "granularity": "county"}"#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/geo"));
        assert_eq!(config.granularity, LocationGranularity::County);
        assert_eq!(config.max_distance_km, 100.0);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = Config::from_json_str(r#"{"data_directory": "/tmp"}"#);
        assert!(matches!(result, Err(GeotierError::Config(_))));
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().with_max_distance_km(0.0).validate().is_err());
        assert!(
            Config::default()
                .with_max_distance_km(f64::NAN)
                .validate()
                .is_err()
        );
        assert!(Config::default().with_cache_budget_bytes(0).validate().is_err());
        assert!(
            Config::default()
                .with_file_names("geo.bin", "geo.bin")
                .validate()
                .is_err()
        );
        assert!(Config::from_json_str(r#"{"max_distance_km": -5.0}"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"max_distance_km": 42.0}"#).unwrap();
        file.flush().unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.max_distance_km, 42.0);

        let other = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(Config::from_file(other.path()).is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_roundtrip() {
        let config = Config::new("/srv/geo").with_min_population(500);
        let toml_str = config.to_toml().unwrap();
        assert_eq!(Config::from_toml_str(&toml_str).unwrap(), config);
    }
}
