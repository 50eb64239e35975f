//! # Grid File Information
//!
//! Summarises a CF grid file: global metadata, dimensions, variables with
//! their CF labels, the grid mapping, the time span and the bounding box in
//! both coordinate systems. Printed as text, JSON or YAML by `cfgrid info`.

use crate::config::ToolkitConfig;
use crate::gridfile::GridFile;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub dimensions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionInfo {
    pub grid_mapping_name: String,
    pub gmt: String,
    pub proj4: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeInfo {
    pub slices: usize,
    pub first: f64,
    pub last: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsInfo {
    pub ll_xy: (f64, f64),
    pub ur_xy: (f64, f64),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ll_geo: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ur_geo: Option<(f64, f64)>,
    pub delta_x: f64,
    pub delta_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridInfo {
    pub path: String,
    pub title: String,
    pub institution: String,
    pub source: String,
    pub references: String,
    pub comment: String,
    pub history: String,
    pub file_size: Option<u64>,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub levels: usize,
    pub projection: Option<ProjectionInfo>,
    pub time: Option<TimeInfo>,
    pub bounds: BoundsInfo,
}

fn text_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<String> {
    match var.attribute_value(name)? {
        Ok(netcdf::AttributeValue::Str(s)) => Some(s),
        _ => None,
    }
}

/// Reads the summary of `path` with its native bounding box.
pub fn get_grid_info<P: AsRef<Path>>(path: P, config: &ToolkitConfig) -> Result<GridInfo> {
    let path = path.as_ref();
    let grid = GridFile::open(path, &config.grid_options())
        .with_context(|| format!("{} is not a CF grid file", path.display()))?;
    describe(path, &grid)
}

/// Summary of `grid`, opened from `path`, with its current bounding box.
pub fn describe(path: &Path, grid: &GridFile) -> Result<GridInfo> {
    debug!("Describing grid file: {}", path.display());
    let nc = netcdf::open(path).with_context(|| format!("Failed to open NetCDF file: {}", path.display()))?;

    let dimensions = nc
        .dimensions()
        .map(|d| DimensionInfo {
            name: d.name().to_string(),
            length: d.len(),
            is_unlimited: d.is_unlimited(),
        })
        .collect();
    let variables = nc
        .variables()
        .map(|v| VariableInfo {
            name: v.name().to_string(),
            dimensions: v.dimensions().iter().map(|d| d.name().to_string()).collect(),
            units: text_attribute(&v, "units"),
            long_name: text_attribute(&v, "long_name"),
            standard_name: text_attribute(&v, "standard_name"),
        })
        .collect();
    nc.close().context("Failed to close NetCDF file")?;

    let projection = match grid.mapping_var() {
        Some(_) => match grid.projection() {
            Ok(p) => Some(ProjectionInfo {
                grid_mapping_name: p.kind().cf_name().to_string(),
                gmt: p.gmt_projection(),
                proj4: p.proj4_string(),
            }),
            Err(e) => {
                warn!("{}: unusable grid mapping: {}", path.display(), e);
                None
            }
        },
        None => None,
    };
    let time = grid.time_index().ok().map(|index| TimeInfo {
        slices: index.len(),
        first: index.first(),
        last: index.last(),
    });
    let (ll_geo, ur_geo) = if projection.is_some() {
        (grid.ll_geo().ok(), grid.ur_geo().ok())
    } else {
        (None, None)
    };

    Ok(GridInfo {
        path: path.display().to_string(),
        title: grid.title().to_string(),
        institution: grid.institution().to_string(),
        source: grid.source().to_string(),
        references: grid.references().to_string(),
        comment: grid.comment().to_string(),
        history: grid.history().to_string(),
        file_size: std::fs::metadata(path).ok().map(|m| m.len()),
        dimensions,
        variables,
        levels: grid.num_levels(),
        projection,
        time,
        bounds: BoundsInfo {
            ll_xy: grid.ll_xy(),
            ur_xy: grid.ur_xy(),
            ll_geo,
            ur_geo,
            delta_x: grid.delta_x(),
            delta_y: grid.delta_y(),
        },
    })
}

pub fn print_grid_info_human(info: &GridInfo) {
    println!("CF Grid File Information:");
    println!("  Path: {}", info.path);
    println!("  Title: {}", info.title);
    for (label, value) in [
        ("Institution", &info.institution),
        ("Source", &info.source),
        ("References", &info.references),
        ("Comment", &info.comment),
        ("History", &info.history),
    ] {
        if !value.is_empty() {
            println!("  {}: {}", label, value);
        }
    }
    if let Some(size) = info.file_size {
        println!("  File Size: {:.2} MB", size as f64 / 1_048_576.0);
    }
    println!("  Dimensions: {} total", info.dimensions.len());
    for dim in &info.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables: {} total", info.variables.len());
    for var in &info.variables {
        print!("    {} [{}]", var.name, var.dimensions.join(", "));
        if let Some(units) = &var.units {
            print!(" ({})", units);
        }
        if let Some(long_name) = &var.long_name {
            print!(" - {}", long_name);
        }
        println!();
    }
    if info.levels > 0 {
        println!("  Vertical levels: {}", info.levels);
    }
    match &info.projection {
        Some(p) => {
            println!("  Projection: {}", p.grid_mapping_name);
            println!("    GMT: {}", p.gmt);
            println!("    PROJ: {}", p.proj4);
        }
        None => println!("  Projection: none"),
    }
    if let Some(t) = &info.time {
        println!("  Time: {} slices from {} to {}", t.slices, t.first, t.last);
    }
    let b = &info.bounds;
    println!(
        "  Extent (x/y): ({}, {}) - ({}, {}), spacing {} x {}",
        b.ll_xy.0, b.ll_xy.1, b.ur_xy.0, b.ur_xy.1, b.delta_x, b.delta_y
    );
    if let (Some(ll), Some(ur)) = (b.ll_geo, b.ur_geo) {
        println!("  Extent (lon/lat): ({:.4}, {:.4}) - ({:.4}, {:.4})", ll.0, ll.1, ur.0, ur.1);
    }
}

pub fn print_grid_info_json(info: &GridInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

pub fn print_grid_info_yaml(info: &GridInfo) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize grid info to YAML")?;
    println!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn write_grid(path: &Path) {
        MemoryStore::new()
            .with_dimension("x1", 3)
            .with_dimension("y1", 2)
            .with_dimension("time", 2)
            .with_variable("x1", &["x1"], vec![-1000.0, 0.0, 1000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![0.0, 2000.0])
            .unwrap()
            .with_variable("time", &["time"], vec![-2000.0, 0.0])
            .unwrap()
            .with_variable("thk", &["time", "y1", "x1"], vec![1.0; 12])
            .unwrap()
            .with_attribute("thk", "units", "meter")
            .unwrap()
            .with_attribute("thk", "long_name", "ice thickness")
            .unwrap()
            .with_variable("mapping", &[], vec![0.0])
            .unwrap()
            .with_attribute("mapping", "grid_mapping_name", "lambert_azimuthal_equal_area")
            .unwrap()
            .with_attribute("mapping", "longitude_of_central_meridian", -40.0)
            .unwrap()
            .with_attribute("mapping", "latitude_of_projection_origin", 72.0)
            .unwrap()
            .with_global("title", "info test")
            .save_netcdf(path)
            .unwrap();
    }

    #[test]
    fn test_get_grid_info() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("grid.nc");
        write_grid(&path);

        let info = get_grid_info(&path, &ToolkitConfig::default()).unwrap();
        assert_eq!(info.title, "info test");
        assert!(info.dimensions.iter().any(|d| d.name == "x1" && d.length == 3));
        let thk = info.variables.iter().find(|v| v.name == "thk").unwrap();
        assert_eq!(thk.units.as_deref(), Some("meter"));
        assert_eq!(thk.dimensions, vec!["time", "y1", "x1"]);

        let time = info.time.as_ref().unwrap();
        assert_eq!(time.slices, 2);
        assert_eq!(time.first, -2.0);
        let projection = info.projection.as_ref().unwrap();
        assert_eq!(projection.grid_mapping_name, "lambert_azimuthal_equal_area");
        assert!(info.bounds.ll_geo.is_some());
        assert_eq!(info.bounds.delta_x, 1000.0);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"grid_mapping_name\""));
        print_grid_info_human(&info);
        print_grid_info_yaml(&info).unwrap();
    }

    #[test]
    fn test_missing_file() {
        assert!(get_grid_info("/nonexistent/grid.nc", &ToolkitConfig::default()).is_err());
    }
}
