//! # Fields
//!
//! A [`Field`] is a named quantity of a [`GridFile`], stored or derived, that
//! can be reconstructed as a 2D horizontal slice for a given time and level.
//! Slices are returned in (x, y) orientation: `values[i * ny + j]` is the
//! value at `x[i]`, `y[j]`.
//!
//! Corrections are applied in a fixed order:
//!
//! 1. vertical average (trapezoidal rule over sigma) for `<name>_avg`
//! 2. otherwise the raw slice at the requested level
//! 3. derived fields: `is` = `topg` + `thk`
//! 4. sea-level datum: `topg`/`is` minus `eus`, `slc` plus `eus` when
//!    [`ReadOptions::slc_eus`] is set
//! 5. pressure-melting-point offset for `temp`/`btemp` when
//!    [`ReadOptions::pmt`] is set
//!
//! Options are passed to every read, so two reads with different options
//! never see each other's results.

use crate::error::{CfError, CfResult};
use crate::gridfile::{GridFile, SliceKey, SliceSelection};
use crate::spline::interpolate_grid;
use log::warn;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Melting point depression per metre of ice, in degrees.
pub const PMT_COEFFICIENT: f64 = 8.7e-4;

const TEMPERATURES: [&str; 2] = ["btemp", "temp"];
const SURFACE: &str = "is";
const AVERAGE_SUFFIX: &str = "_avg";

/// Per-read correction switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Add the pressure-melting-point offset to temperatures.
    pub pmt: bool,
    /// Add the sea-level equivalent back onto `slc`.
    pub slc_eus: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            pmt: false,
            slc_eus: true,
        }
    }
}

/// Horizontal slice in (x, y) orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice2D {
    nx: usize,
    ny: usize,
    values: Vec<f64>,
}

impl Slice2D {
    pub fn new(nx: usize, ny: usize, values: Vec<f64>) -> CfResult<Self> {
        if values.len() != nx * ny {
            return Err(CfError::DimensionMismatch(format!(
                "{nx}x{ny} slice cannot hold {} values",
                values.len()
            )));
        }
        Ok(Self { nx, ny, values })
    }

    /// Builds a slice from stored (y, x) row-major data.
    pub fn from_yx(nx: usize, ny: usize, data: &[f64]) -> CfResult<Self> {
        if data.len() != nx * ny {
            return Err(CfError::DimensionMismatch(format!(
                "{nx}x{ny} slice cannot hold {} values",
                data.len()
            )));
        }
        let mut values = vec![0.0; nx * ny];
        for j in 0..ny {
            for i in 0..nx {
                values[i * ny + j] = data[j * nx + i];
            }
        }
        Ok(Self { nx, ny, values })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.ny + j]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn combine(&mut self, other: &Slice2D, f: impl Fn(f64, f64) -> f64) {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a = f(*a, *b);
        }
    }

    fn map(&mut self, f: impl Fn(f64) -> f64) {
        for v in &mut self.values {
            *v = f(*v);
        }
    }
}

/// A slice with the metadata a renderer needs.
#[derive(Debug, Clone)]
pub struct Grid2 {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub units: String,
    pub long_name: String,
    pub slice: Rc<Slice2D>,
}

pub struct Field<'a> {
    file: &'a GridFile,
    requested: String,
    name: String,
    average: bool,
    /// Variable providing dimensions and units (`topg` for `is`).
    source: String,
    dims: Vec<String>,
}

impl std::fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("average", &self.average)
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}

impl<'a> Field<'a> {
    pub(crate) fn new(file: &'a GridFile, requested: &str) -> CfResult<Self> {
        let (name, average) = match requested.strip_suffix(AVERAGE_SUFFIX) {
            Some(base) => (base, true),
            None => (requested, false),
        };
        let store = file.store();
        let source = if name == SURFACE {
            for needed in ["topg", "thk"] {
                if !store.has_variable(needed) {
                    return Err(CfError::MissingDependency {
                        variable: SURFACE.to_string(),
                        requires: needed.to_string(),
                    });
                }
            }
            "topg"
        } else if store.has_variable(name) {
            name
        } else {
            return Err(CfError::UnknownVariable(requested.to_string()));
        };
        let dims = store.dimensions(source)?;
        if dims.len() < 2 {
            return Err(CfError::DimensionMismatch(format!(
                "'{name}' is not a horizontal field"
            )));
        }
        Ok(Self {
            file,
            requested: requested.to_string(),
            name: name.to_string(),
            average,
            source: source.to_string(),
            dims,
        })
    }

    /// Base name, without any `_avg` suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requested_name(&self) -> &str {
        &self.requested
    }

    pub fn is_average(&self) -> bool {
        self.average
    }

    pub fn is_3d(&self) -> bool {
        self.name != SURFACE && self.dims.iter().any(|d| d == "level")
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dims
    }

    pub fn units(&self) -> String {
        self.text_attribute(&self.source, "units")
    }

    pub fn standard_name(&self) -> String {
        self.text_attribute(&self.name, "standard_name")
    }

    pub fn long_name(&self, options: ReadOptions) -> String {
        let has_thk = self.file.store().has_variable("thk");
        let base = if TEMPERATURES.contains(&self.name.as_str()) && options.pmt && has_thk {
            format!("homologous {}", self.text_attribute(&self.name, "long_name"))
        } else if self.name == SURFACE {
            "ice surface elevation".to_string()
        } else {
            self.text_attribute(&self.name, "long_name")
        };
        if self.average {
            format!("vertically averaged {base}")
        } else {
            base
        }
    }

    fn text_attribute(&self, var: &str, attr: &str) -> String {
        self.file
            .store()
            .attribute(var, attr)
            .and_then(|a| a.as_text().map(str::to_string))
            .unwrap_or_default()
    }

    fn x_dim(&self) -> &str {
        &self.dims[self.dims.len() - 1]
    }

    fn y_dim(&self) -> &str {
        &self.dims[self.dims.len() - 2]
    }

    pub fn x_coords(&self) -> CfResult<Vec<f64>> {
        self.file.store().read_all(self.x_dim())
    }

    pub fn y_coords(&self) -> CfResult<Vec<f64>> {
        self.file.store().read_all(self.y_dim())
    }

    fn shape(&self) -> CfResult<(usize, usize)> {
        let store = self.file.store();
        Ok((store.dimension_len(self.x_dim())?, store.dimension_len(self.y_dim())?))
    }

    pub fn num_levels(&self) -> usize {
        if self.is_3d() { self.file.num_levels() } else { 1 }
    }

    /// Reconstructed 2D slice at slice `time` and vertical `level`.
    pub fn slice(&self, time: usize, level: usize, options: ReadOptions) -> CfResult<Rc<Slice2D>> {
        if self.reads_time(options) {
            self.file.check_time(time)?;
        }
        if self.average && !self.is_3d() {
            return Err(CfError::NotA3DVariable(self.name.clone()));
        }
        let level = if self.is_3d() && !self.average { level } else { 0 };
        if level >= self.num_levels() {
            return Err(CfError::InvalidSelection(format!(
                "level {level} outside '{}' with {} levels",
                self.name,
                self.num_levels()
            )));
        }

        let key = SliceKey {
            name: self.name.clone(),
            average: self.average,
            time,
            level,
            options,
        };
        if let Some(slice) = self.file.cached_slice(&key) {
            return Ok(slice);
        }
        let slice = if self.average {
            self.vertical_average(time, options)?
        } else {
            self.level_slice(time, level, options)?
        };
        let slice = Rc::new(slice);
        self.file.cache_slice(key, Rc::clone(&slice));
        Ok(slice)
    }

    /// Whether slice `time` is read from the file: a time dimension of its own,
    /// or a datum or melting-point correction taken from time-dependent data.
    fn reads_time(&self, options: ReadOptions) -> bool {
        let store = self.file.store();
        let name = self.name.as_str();
        let eus = store.has_variable("eus")
            && (name == "topg" || name == SURFACE || (name == "slc" && options.slc_eus));
        let pmt = options.pmt && TEMPERATURES.contains(&name) && store.has_variable("thk");
        self.dims.iter().any(|d| d == "time") || eus || pmt
    }

    /// Trapezoidal integral over sigma of the corrected level slices.
    fn vertical_average(&self, time: usize, options: ReadOptions) -> CfResult<Slice2D> {
        let sigma = self.file.levels()?;
        let (nx, ny) = self.shape()?;
        let mut total = Slice2D::new(nx, ny, vec![0.0; nx * ny])?;
        if sigma.is_empty() {
            return Ok(total);
        }
        let mut upper = self.level_slice(time, sigma.len() - 1, options)?;
        for k in (0..sigma.len() - 1).rev() {
            let lower = self.level_slice(time, k, options)?;
            let weight = sigma[k + 1] - sigma[k];
            for ((t, u), l) in total.values.iter_mut().zip(&upper.values).zip(&lower.values) {
                *t += (u + l) * weight;
            }
            upper = lower;
        }
        total.map(|v| 0.5 * v);
        Ok(total)
    }

    /// Single level with derivation and corrections applied.
    fn level_slice(&self, time: usize, level: usize, options: ReadOptions) -> CfResult<Slice2D> {
        let (nx, ny) = self.shape()?;
        let mut grid = if self.name == SURFACE {
            let mut topg = Slice2D::from_yx(nx, ny, &self.file.read_slice("topg", time, level)?)?;
            let thk = Slice2D::from_yx(nx, ny, &self.file.read_slice("thk", time, level)?)?;
            topg.combine(&thk, |b, h| b + h);
            topg
        } else {
            Slice2D::from_yx(nx, ny, &self.file.read_slice(&self.name, time, level)?)?
        };

        let has_eus = self.file.store().has_variable("eus");
        if has_eus && (self.name == "topg" || self.name == SURFACE) {
            let eus = self.file.read_scalar("eus", time)?;
            grid.map(|v| v - eus);
        }
        if has_eus && self.name == "slc" && options.slc_eus {
            let eus = self.file.read_scalar("eus", time)?;
            grid.map(|v| v + eus);
        }

        if TEMPERATURES.contains(&self.name.as_str()) && options.pmt {
            if self.file.store().has_variable("thk") {
                let thk = Slice2D::from_yx(nx, ny, &self.file.read_slice("thk", time, 0)?)?;
                let factor = if self.name == "btemp" {
                    1.0
                } else {
                    self.file
                        .levels()?
                        .get(level)
                        .copied()
                        .ok_or_else(|| CfError::InvalidSelection(format!("no sigma value for level {level}")))?
                };
                grid.combine(&thk, |t, h| t + PMT_COEFFICIENT * h * factor);
            } else {
                warn!(
                    "Cannot correct '{}' for pressure melting point: no ice thickness in {}",
                    self.name,
                    self.file.name()
                );
            }
        }
        Ok(grid)
    }

    /// Values at grid node `(i, j)` over several times or several levels.
    pub fn spot(
        &self,
        node: (usize, usize),
        time: SliceSelection,
        level: SliceSelection,
        options: ReadOptions,
    ) -> CfResult<Vec<f64>> {
        let (nx, ny) = self.shape()?;
        if node.0 >= nx || node.1 >= ny {
            return Err(CfError::InvalidSelection(format!(
                "node {node:?} outside {nx}x{ny} grid"
            )));
        }
        let level = if self.is_3d() && !self.average {
            level
        } else {
            SliceSelection::Single(0)
        };
        if time.is_multiple() && level.is_multiple() {
            return Err(CfError::InvalidSelection(
                "cannot select both multiple times and multiple levels".to_string(),
            ));
        }
        let times = time.resolve(self.file.num_times().max(1))?;
        let levels = level.resolve(self.num_levels())?;
        let mut values = Vec::with_capacity(times.len().max(levels.len()));
        for &t in &times {
            for &l in &levels {
                values.push(self.slice(t, l, options)?.get(node.0, node.1));
            }
        }
        Ok(values)
    }

    /// Bicubic spline interpolation at a projected position.
    pub fn spline(&self, pos: (f64, f64), time: usize, level: usize, options: ReadOptions) -> CfResult<f64> {
        let slice = self.slice(time, level, options)?;
        interpolate_grid(&self.x_coords()?, &self.y_coords()?, slice.values(), pos)
    }

    /// Slice plus extents and labels for a renderer.
    pub fn slice_grid(&self, time: usize, level: usize, options: ReadOptions) -> CfResult<Grid2> {
        self.file.check_time(time)?;
        let x = self.x_coords()?;
        let y = self.y_coords()?;
        Ok(Grid2 {
            x_range: (x[0], x[x.len() - 1]),
            y_range: (y[0], y[y.len() - 1]),
            units: self.units(),
            long_name: self.long_name(options),
            slice: self.slice(time, level, options)?,
        })
    }
}
