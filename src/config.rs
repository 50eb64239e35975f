//! # Toolkit Configuration
//!
//! Shared settings for every `cfgrid` command: where the variable definition
//! table lives, the time scale, cache sizes and profile defaults. A
//! configuration file is JSON or YAML, chosen by its extension; every field is
//! optional and falls back to the defaults below.
//!
//! ## Example
//!
//! ```yaml
//! variable_definitions: /data/cf/variables.yaml
//! timescale: 0.001
//! field_cache_capacity: 32
//! profile_cache_capacity: 64
//! profile_interval: 5000.0
//! vertical_resolution: 10.0
//! ```
//!
//! ```rust,no_run
//! use cfgrid::config::ToolkitConfig;
//!
//! let config = ToolkitConfig::from_file("cfgrid.yaml")?;
//! let file = cfgrid::gridfile::GridFile::open("run.nc", &config.grid_options())?;
//! # Ok::<(), cfgrid::error::CfError>(())
//! ```

use crate::createfile::VariableDefinitions;
use crate::error::{CfError, CfResult};
use crate::field::ReadOptions;
use crate::gridfile::{DEFAULT_SLICE_CACHE, DEFAULT_TIMESCALE, GridFileOptions};
use crate::profile::{
    DEFAULT_INTERVAL, DEFAULT_PROFILE_CACHE, DEFAULT_VERTICAL_RESOLUTION, DEFAULT_XSCALE,
    ProfileOptions,
};
use crate::timeindex::Round;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// JSON/YAML variable definition table; the built-in table when unset.
    pub variable_definitions: Option<PathBuf>,
    /// Factor from stored time units to reported units.
    pub timescale: f64,
    /// 2D slices cached per grid file. Zero disables the cache.
    pub field_cache_capacity: usize,
    /// Sampled series cached per profile. Zero disables the cache.
    pub profile_cache_capacity: usize,
    pub profile_interval: f64,
    pub profile_xscale: f64,
    /// Vertical spacing of 2D profile sections, in metres.
    pub vertical_resolution: f64,
    pub round: Round,
    pub read: ReadOptions,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            variable_definitions: None,
            timescale: DEFAULT_TIMESCALE,
            field_cache_capacity: DEFAULT_SLICE_CACHE,
            profile_cache_capacity: DEFAULT_PROFILE_CACHE,
            profile_interval: DEFAULT_INTERVAL,
            profile_xscale: DEFAULT_XSCALE,
            vertical_resolution: DEFAULT_VERTICAL_RESOLUTION,
            round: Round::Nearest,
            read: ReadOptions::default(),
        }
    }
}

impl ToolkitConfig {
    /// Loads a configuration file. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CfResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = if is_yaml(path) {
            Self::from_yaml(&content)?
        } else {
            Self::from_json(&content)?
        };
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> CfResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml(yaml: &str) -> CfResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_json(&self) -> CfResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> CfResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> CfResult<()> {
        if !(self.timescale.is_finite() && self.timescale > 0.0) {
            return Err(CfError::Config(format!("timescale must be positive, got {}", self.timescale)));
        }
        if !(self.profile_interval.is_finite() && self.profile_interval > 0.0) {
            return Err(CfError::Config(format!(
                "profile_interval must be positive, got {}",
                self.profile_interval
            )));
        }
        if !(self.vertical_resolution.is_finite() && self.vertical_resolution > 0.0) {
            return Err(CfError::Config(format!(
                "vertical_resolution must be positive, got {}",
                self.vertical_resolution
            )));
        }
        Ok(())
    }

    pub fn grid_options(&self) -> GridFileOptions {
        GridFileOptions {
            timescale: self.timescale,
            slice_cache_capacity: self.field_cache_capacity,
        }
    }

    /// Profile options for projected control points.
    pub fn profile_options(&self) -> ProfileOptions {
        ProfileOptions {
            projected: true,
            interval: self.profile_interval,
            xrange: (None, None),
            xscale: self.profile_xscale,
            vertical_resolution: self.vertical_resolution,
            cache_capacity: self.profile_cache_capacity,
        }
    }

    pub fn definitions(&self) -> CfResult<VariableDefinitions> {
        match &self.variable_definitions {
            Some(path) => VariableDefinitions::from_file(path),
            None => Ok(VariableDefinitions::builtin()),
        }
    }
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ToolkitConfig::default();
        assert_eq!(config.timescale, 0.001);
        assert_eq!(config.grid_options(), GridFileOptions::default());
        assert_eq!(config.profile_options(), ProfileOptions::default());
        assert!(config.variable_definitions.is_none());
        assert!(config.definitions().unwrap().contains("thk"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ToolkitConfig::from_json(r#"{"timescale": 1.0, "round": "down"}"#).unwrap();
        assert_eq!(config.timescale, 1.0);
        assert_eq!(config.round, Round::Down);
        assert_eq!(config.profile_interval, DEFAULT_INTERVAL);
        assert!(config.read.slc_eus);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join("cfgrid.yaml");
        fs::write(&yaml, "field_cache_capacity: 0\nread:\n  pmt: true\n  slc_eus: false\n").unwrap();
        let config = ToolkitConfig::from_file(&yaml).unwrap();
        assert_eq!(config.field_cache_capacity, 0);
        assert!(config.read.pmt);
        assert!(!config.read.slc_eus);

        let json = dir.path().join("cfgrid.json");
        fs::write(&json, config.to_json().unwrap()).unwrap();
        assert_eq!(ToolkitConfig::from_file(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"profile_interval": -5.0}"#).unwrap();
        assert!(matches!(ToolkitConfig::from_file(&path), Err(CfError::Config(_))));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(ToolkitConfig::from_file(&path), Err(CfError::Config(_))));
        assert!(ToolkitConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ToolkitConfig {
            variable_definitions: Some(PathBuf::from("/tmp/vars.yaml")),
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(ToolkitConfig::from_yaml(&yaml).unwrap(), config);
    }
}
