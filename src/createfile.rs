//! # Creating CF Files
//!
//! Variable definitions describe every variable a CF grid file may hold:
//! its dimensions and the `long_name`, `standard_name` and `units`
//! attributes. A `<name>_spot` variant is derived for every time-dependent
//! horizontal variable, with the `(y, x)` pair replaced by a `spot` dimension.
//!
//! Definitions are read from a JSON or YAML document mapping names to
//! definitions:
//!
//! ```yaml
//! thk:
//!   dimensions: [time, y1, x1]
//!   long_name: ice thickness
//!   standard_name: land_ice_thickness
//!   units: meter
//! ```
//!
//! [`create_cf_file`] writes a new file with the grid axes and an optional
//! grid-mapping variable; [`add_projection_info`] retrofits a mapping onto an
//! existing file.

use crate::error::{CfError, CfResult};
use crate::gridfile::FileMetadata;
use crate::projection::{GridMapping, Projection};
use crate::store::{AttrValue, put_global};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const CONVENTIONS: &str = "CF-1.0";
pub const MAPPING_VARIABLE: &str = "mapping";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<String>,
}

impl VariableDef {
    fn new(dimensions: &[&str], long_name: &str, standard_name: Option<&str>, units: &str) -> Self {
        Self {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            long_name: Some(long_name.to_string()),
            standard_name: standard_name.map(str::to_string),
            units: Some(units.to_string()),
            coordinates: None,
        }
    }

    /// A coordinate variable: one dimension named like the variable.
    fn is_coordinate(&self, name: &str) -> bool {
        self.dimensions.len() == 1 && self.dimensions[0] == name
    }

    /// Spot variant, if the variable is time dependent and horizontal.
    fn spot(&self) -> Option<Self> {
        if !self.dimensions.iter().any(|d| d == "time") {
            return None;
        }
        let pos = self
            .dimensions
            .windows(2)
            .position(|w| matches!((w[0].as_str(), w[1].as_str()), ("y0", "x0") | ("y1", "x1")))?;
        let staggered = self.dimensions[pos] == "y0";
        let mut dimensions = self.dimensions.clone();
        dimensions.splice(pos..pos + 2, ["spot".to_string()]);
        Some(Self {
            dimensions,
            coordinates: Some(if staggered { "y0_spot x0_spot" } else { "y1_spot x1_spot" }.to_string()),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableDefinitions {
    defs: BTreeMap<String, VariableDef>,
}

impl VariableDefinitions {
    /// Definitions of the axes and of the fields this toolkit interprets.
    pub fn builtin() -> Self {
        let mut defs = Self::default();
        let entries = [
            ("x0", VariableDef::new(&["x0"], "Cartesian x-coordinate, velocity grid", None, "meter")),
            ("y0", VariableDef::new(&["y0"], "Cartesian y-coordinate, velocity grid", None, "meter")),
            ("x1", VariableDef::new(&["x1"], "Cartesian x-coordinate", None, "meter")),
            ("y1", VariableDef::new(&["y1"], "Cartesian y-coordinate", None, "meter")),
            ("level", VariableDef::new(&["level"], "sigma layers", Some("land_ice_sigma_coordinate"), "1")),
            ("time", VariableDef::new(&["time"], "Model time", Some("time"), "year since 1-1-1 0:0:0")),
            ("eus", VariableDef::new(&["time"], "global average sea level", Some("global_average_sea_level_change"), "meter")),
            ("thk", VariableDef::new(&["time", "y1", "x1"], "ice thickness", Some("land_ice_thickness"), "meter")),
            ("topg", VariableDef::new(&["time", "y1", "x1"], "bedrock topography", Some("bedrock_altitude"), "meter")),
            ("usurf", VariableDef::new(&["time", "y1", "x1"], "ice upper surface elevation", Some("surface_altitude"), "meter")),
            ("slc", VariableDef::new(&["time", "y1", "x1"], "isostatic adjustment", Some("bedrock_altitude_change_due_to_isostatic_adjustment"), "meter")),
            ("bmlt", VariableDef::new(&["time", "y1", "x1"], "basal melt rate", Some("land_ice_basal_melt_rate"), "meter/year")),
            ("btemp", VariableDef::new(&["time", "y1", "x1"], "basal ice temperature", Some("land_ice_temperature"), "degree_Celsius")),
            ("temp", VariableDef::new(&["time", "level", "y1", "x1"], "ice temperature", Some("land_ice_temperature"), "degree_Celsius")),
        ];
        for (name, def) in entries {
            defs.insert(name, def);
        }
        defs
    }

    /// Loads definitions from JSON, or YAML when the extension is `.yaml`/`.yml`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CfResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let raw: BTreeMap<String, VariableDef> = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        let mut defs = Self::default();
        for (name, def) in raw {
            defs.insert(&name, def);
        }
        debug!("Loaded {} variable definitions from {}", defs.len(), path.display());
        Ok(defs)
    }

    /// Adds a definition and its spot variant.
    pub fn insert(&mut self, name: &str, def: VariableDef) {
        if let Some(spot) = def.spot() {
            self.defs.insert(format!("{name}_spot"), spot);
        }
        self.defs.insert(name.to_string(), def);
    }

    pub fn get(&self, name: &str) -> Option<&VariableDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Coordinate variables first, then the rest, each alphabetically.
    pub fn names(&self) -> Vec<&str> {
        let (mut coords, others): (Vec<&str>, Vec<&str>) = self
            .defs
            .keys()
            .map(String::as_str)
            .partition(|n| self.defs[*n].is_coordinate(n));
        coords.extend(others);
        coords
    }

    /// Definitions as written by hand: derived spot variants are left out.
    fn declared(&self) -> BTreeMap<&str, &VariableDef> {
        self.defs
            .iter()
            .filter(|(name, _)| {
                name.strip_suffix("_spot")
                    .is_none_or(|base| !self.defs.contains_key(base))
            })
            .map(|(name, def)| (name.as_str(), def))
            .collect()
    }

    pub fn to_json(&self) -> CfResult<String> {
        Ok(serde_json::to_string_pretty(&self.declared())?)
    }

    pub fn to_yaml(&self) -> CfResult<String> {
        Ok(serde_yaml::to_string(&self.declared())?)
    }
}

/// Layout of a new grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Projected coordinates of node (0, 0).
    pub origin: (f64, f64),
    pub delta: (f64, f64),
    pub nx: usize,
    pub ny: usize,
    /// Sigma levels; empty for 2D files.
    #[serde(default)]
    pub levels: Vec<f64>,
}

impl GridSpec {
    pub fn x1(&self) -> Vec<f64> {
        (0..self.nx).map(|i| self.origin.0 + i as f64 * self.delta.0).collect()
    }

    pub fn y1(&self) -> Vec<f64> {
        (0..self.ny).map(|j| self.origin.1 + j as f64 * self.delta.1).collect()
    }
}

/// An open CF file being written.
pub struct CfFileWriter {
    file: netcdf::FileMut,
    definitions: VariableDefinitions,
    mapped: bool,
}

impl std::fmt::Debug for CfFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CfFileWriter")
            .field("definitions", &self.definitions.len())
            .field("mapped", &self.mapped)
            .finish_non_exhaustive()
    }
}

/// Creates a CF file with grid axes, global metadata and, when given, a
/// grid-mapping variable. `history` defaults to a timestamped creation note.
pub fn create_cf_file<P: AsRef<Path>>(
    path: P,
    definitions: &VariableDefinitions,
    grid: &GridSpec,
    metadata: &FileMetadata,
    mapping: Option<&GridMapping>,
) -> CfResult<CfFileWriter> {
    if grid.nx < 2 || grid.ny < 2 {
        return Err(CfError::DimensionMismatch(format!(
            "grid of {}x{} nodes is too small",
            grid.nx, grid.ny
        )));
    }
    let path = path.as_ref();
    let mut file = netcdf::create(path)?;
    put_global(&mut file, "Conventions", &AttrValue::from(CONVENTIONS))?;
    let history = metadata.history.clone().unwrap_or_else(|| {
        format!("{}: created by cfgrid", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    });
    let globals = [
        ("title", metadata.title.clone()),
        ("institution", metadata.institution.clone()),
        ("source", metadata.source.clone()),
        ("references", metadata.references.clone()),
        ("comment", metadata.comment.clone()),
        ("history", Some(history)),
    ];
    for (name, value) in globals {
        if let Some(value) = value {
            put_global(&mut file, name, &AttrValue::Text(value))?;
        }
    }

    file.add_unlimited_dimension("time")?;
    file.add_dimension("x1", grid.nx)?;
    file.add_dimension("y1", grid.ny)?;
    file.add_dimension("x0", grid.nx - 1)?;
    file.add_dimension("y0", grid.ny - 1)?;
    if !grid.levels.is_empty() {
        file.add_dimension("level", grid.levels.len())?;
    }

    let mut writer = CfFileWriter {
        file,
        definitions: definitions.clone(),
        mapped: false,
    };
    let x1 = grid.x1();
    let y1 = grid.y1();
    let midpoints = |v: &[f64]| v.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect::<Vec<f64>>();
    writer.add_variable("time")?;
    writer.put_axis("x1", &x1)?;
    writer.put_axis("y1", &y1)?;
    writer.put_axis("x0", &midpoints(&x1))?;
    writer.put_axis("y0", &midpoints(&y1))?;
    if !grid.levels.is_empty() {
        writer.put_axis("level", &grid.levels)?;
    }

    if let Some(mapping) = mapping {
        let mut var = writer.file.add_variable::<i32>(MAPPING_VARIABLE, &[])?;
        mapping.write_netcdf(&mut var)?;
        writer.mapped = true;
    }
    debug!("Created {} ({}x{} nodes)", path.display(), grid.nx, grid.ny);
    Ok(writer)
}

impl CfFileWriter {
    fn put_axis(&mut self, name: &str, values: &[f64]) -> CfResult<()> {
        self.add_variable(name)?;
        let mut var = self
            .file
            .variable_mut(name)
            .ok_or_else(|| CfError::UnknownVariable(name.to_string()))?;
        var.put_values::<_, Vec<netcdf::Extent>>(values, vec![(0..values.len()).into()])?;
        Ok(())
    }

    /// Defines variable `name` from its definition. Horizontal variables
    /// are tied to the grid mapping when the file has one.
    pub fn add_variable(&mut self, name: &str) -> CfResult<()> {
        let def = self
            .definitions
            .get(name)
            .cloned()
            .ok_or_else(|| CfError::UnknownVariable(format!("no definition for variable {name}")))?;
        let dims: Vec<&str> = def.dimensions.iter().map(String::as_str).collect();
        let mut var = self.file.add_variable::<f32>(name, &dims)?;
        let attrs = [
            ("long_name", &def.long_name),
            ("standard_name", &def.standard_name),
            ("units", &def.units),
            ("coordinates", &def.coordinates),
        ];
        for (attr, value) in attrs {
            if let Some(value) = value {
                var.put_attribute(attr, value.as_str())?;
            }
        }
        if self.mapped && dims.contains(&"x1") && dims.contains(&"y1") {
            var.put_attribute("grid_mapping", MAPPING_VARIABLE)?;
        }
        Ok(())
    }

    /// Writes the time of record `index` (years).
    pub fn put_time(&mut self, index: usize, time: f64) -> CfResult<()> {
        let mut var = self
            .file
            .variable_mut("time")
            .ok_or_else(|| CfError::UnknownVariable("time".to_string()))?;
        var.put_values::<_, Vec<netcdf::Extent>>(&[time as f32], vec![(index..index + 1).into()])?;
        Ok(())
    }

    /// Writes one `(y, x)` slice of a time-dependent horizontal variable,
    /// `data` in stored row-major order.
    pub fn put_slice(&mut self, name: &str, time: usize, data: &[f64]) -> CfResult<()> {
        let mut var = self
            .file
            .variable_mut(name)
            .ok_or_else(|| CfError::UnknownVariable(name.to_string()))?;
        let dims: Vec<(String, usize)> = var
            .dimensions()
            .iter()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();
        let extents: Vec<netcdf::Extent> = dims
            .iter()
            .map(|(dim, len)| match dim.as_str() {
                "time" => (time..time + 1).into(),
                _ => (0..*len).into(),
            })
            .collect();
        let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        var.put_values(&values, extents)?;
        Ok(())
    }

    pub fn close(self) -> CfResult<()> {
        self.file.close()?;
        Ok(())
    }
}

/// Adds a grid mapping to an existing file, placing `origin` (lon, lat) at
/// projected (0, 0). Returns `false` when the file already has a mapping
/// variable.
pub fn add_projection_info<P: AsRef<Path>>(path: P, mapping: &GridMapping, origin: (f64, f64)) -> CfResult<bool> {
    let path = path.as_ref();
    let projection = Projection::from_grid_mapping(mapping)?.set_origin(origin.0, origin.1)?;
    let mut file = netcdf::append(path)?;
    if file.variable(MAPPING_VARIABLE).is_some() {
        info!("{} already has map projection info", path.display());
        return Ok(false);
    }

    let mut var = file.add_variable::<i32>(MAPPING_VARIABLE, &[])?;
    projection.grid_mapping().write_netcdf(&mut var)?;

    let horizontal: Vec<String> = file
        .variables()
        .filter(|v| {
            let dims: Vec<String> = v.dimensions().iter().map(|d| d.name().to_string()).collect();
            dims.iter().any(|d| d == "x1") && dims.iter().any(|d| d == "y1")
        })
        .map(|v| v.name().to_string())
        .collect();
    for name in &horizontal {
        if let Some(mut var) = file.variable_mut(name) {
            var.put_attribute("grid_mapping", MAPPING_VARIABLE)?;
        }
    }
    file.close()?;
    debug!("Tagged {} variables of {} with the grid mapping", horizontal.len(), path.display());
    Ok(true)
}
