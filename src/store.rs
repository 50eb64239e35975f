//! # Gridded Array Store
//!
//! The toolkit never talks to NetCDF directly outside this module. Everything
//! above it sees a [`GridStore`]: a key-value store of named N-dimensional
//! arrays with attributes, read as flat row-major `f64` hyperslabs.
//!
//! Two implementations are provided:
//!
//! - [`NetCdfStore`]: a read-only view over a NetCDF file on disk
//! - [`MemoryStore`]: in-memory arrays, handy for tests and for assembling a
//!   grid before persisting it with [`MemoryStore::save_netcdf`]
//!
//! ## Example
//!
//! ```rust
//! use cfgrid::store::{GridStore, MemoryStore};
//!
//! let store = MemoryStore::new()
//!     .with_dimension("x1", 3)
//!     .with_variable("x1", &["x1"], vec![0.0, 1000.0, 2000.0])?;
//! assert_eq!(store.read_all("x1")?, vec![0.0, 1000.0, 2000.0]);
//! # Ok::<(), cfgrid::error::CfError>(())
//! ```

use crate::error::{CfError, CfResult};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Attribute value as seen by the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Numbers(Vec<f64>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Numbers(_) => None,
        }
    }

    /// First numeric element, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Numbers(v) => v.first().copied(),
            AttrValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            AttrValue::Numbers(v) => Some(v),
            AttrValue::Text(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Numbers(vec![v])
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::Numbers(v)
    }
}

/// Read access to a gridded dataset.
///
/// A selection has one entry per dimension of the variable: `Some(i)` fixes
/// that dimension to index `i`, `None` keeps the whole axis. The returned
/// vector holds the selected values in row-major order over the free axes.
pub trait GridStore {
    fn variable_names(&self) -> Vec<String>;

    fn has_variable(&self, name: &str) -> bool {
        self.variable_names().iter().any(|v| v == name)
    }

    fn dimensions(&self, var: &str) -> CfResult<Vec<String>>;

    fn dimension_len(&self, dim: &str) -> CfResult<usize>;

    fn attribute(&self, var: &str, name: &str) -> Option<AttrValue>;

    fn global_attribute(&self, name: &str) -> Option<AttrValue>;

    fn read(&self, var: &str, selection: &[Option<usize>]) -> CfResult<Vec<f64>>;

    fn read_all(&self, var: &str) -> CfResult<Vec<f64>> {
        let ndims = self.dimensions(var)?.len();
        self.read(var, &vec![None; ndims])
    }

    /// Shape of a variable, in dimension order.
    fn shape(&self, var: &str) -> CfResult<Vec<usize>> {
        self.dimensions(var)?
            .iter()
            .map(|d| self.dimension_len(d))
            .collect()
    }

    /// Location on disk, when the store is file backed.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Read-only NetCDF-backed store.
pub struct NetCdfStore {
    file: netcdf::File,
    path: PathBuf,
}

impl NetCdfStore {
    pub fn open<P: AsRef<Path>>(path: P) -> CfResult<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening NetCDF file: {}", path.display());
        let file = netcdf::open(&path)?;
        Ok(Self { file, path })
    }

    pub fn file(&self) -> &netcdf::File {
        &self.file
    }

    fn variable(&self, var: &str) -> CfResult<netcdf::Variable<'_>> {
        self.file
            .variable(var)
            .ok_or_else(|| CfError::UnknownVariable(var.to_string()))
    }
}

impl std::fmt::Debug for NetCdfStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetCdfStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Converts a NetCDF attribute into the toolkit representation.
///
/// Character and numeric types are supported; anything else is dropped.
pub fn convert_attribute(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as A;
    let numbers = match value {
        A::Str(s) => return Some(AttrValue::Text(s)),
        A::Strs(v) => return Some(AttrValue::Text(v.join(" "))),
        A::Double(v) => vec![v],
        A::Doubles(v) => v,
        A::Float(v) => vec![v as f64],
        A::Floats(v) => v.into_iter().map(f64::from).collect(),
        A::Int(v) => vec![v as f64],
        A::Ints(v) => v.into_iter().map(f64::from).collect(),
        A::Short(v) => vec![v as f64],
        A::Shorts(v) => v.into_iter().map(f64::from).collect(),
        A::Longlong(v) => vec![v as f64],
        A::Longlongs(v) => v.into_iter().map(|x| x as f64).collect(),
        A::Uint(v) => vec![v as f64],
        A::Uints(v) => v.into_iter().map(f64::from).collect(),
        _ => return None,
    };
    Some(AttrValue::Numbers(numbers))
}

impl GridStore for NetCdfStore {
    fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name().to_string()).collect()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn dimensions(&self, var: &str) -> CfResult<Vec<String>> {
        Ok(self
            .variable(var)?
            .dimensions()
            .iter()
            .map(|d| d.name().to_string())
            .collect())
    }

    fn dimension_len(&self, dim: &str) -> CfResult<usize> {
        self.file
            .dimension(dim)
            .map(|d| d.len())
            .ok_or_else(|| CfError::DimensionMismatch(format!("no dimension named '{dim}'")))
    }

    fn attribute(&self, var: &str, name: &str) -> Option<AttrValue> {
        let var = self.file.variable(var)?;
        let attr = var.attribute(name)?;
        attr.value().ok().and_then(convert_attribute)
    }

    fn global_attribute(&self, name: &str) -> Option<AttrValue> {
        let attr = self.file.attribute(name)?;
        attr.value().ok().and_then(convert_attribute)
    }

    fn read(&self, var: &str, selection: &[Option<usize>]) -> CfResult<Vec<f64>> {
        let variable = self.variable(var)?;
        let shape: Vec<usize> = variable.dimensions().iter().map(|d| d.len()).collect();
        check_selection(var, &shape, selection)?;
        let extents: Vec<netcdf::Extent> = selection
            .iter()
            .map(|s| match s {
                Some(i) => (*i).into(),
                None => (..).into(),
            })
            .collect();
        Ok(variable.get_values::<f64, _>(extents)?)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn check_selection(var: &str, shape: &[usize], selection: &[Option<usize>]) -> CfResult<()> {
    if shape.len() != selection.len() {
        return Err(CfError::DimensionMismatch(format!(
            "'{var}' has {} dimensions, selection has {}",
            shape.len(),
            selection.len()
        )));
    }
    for (len, sel) in shape.iter().zip(selection) {
        if let Some(i) = sel
            && i >= len
        {
            return Err(CfError::InvalidSelection(format!(
                "index {i} out of bounds for '{var}' axis of length {len}"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct MemoryVariable {
    dims: Vec<String>,
    data: Vec<f64>,
    attrs: BTreeMap<String, AttrValue>,
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    dims: BTreeMap<String, usize>,
    vars: BTreeMap<String, MemoryVariable>,
    globals: BTreeMap<String, AttrValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, name: &str, len: usize) -> Self {
        self.dims.insert(name.to_string(), len);
        self
    }

    pub fn with_variable(mut self, name: &str, dims: &[&str], data: Vec<f64>) -> CfResult<Self> {
        self.add_variable(name, dims, data)?;
        Ok(self)
    }

    pub fn with_attribute(mut self, var: &str, name: &str, value: impl Into<AttrValue>) -> CfResult<Self> {
        self.set_attribute(var, name, value)?;
        Ok(self)
    }

    pub fn with_global(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.globals.insert(name.to_string(), value.into());
        self
    }

    pub fn add_variable(&mut self, name: &str, dims: &[&str], data: Vec<f64>) -> CfResult<()> {
        let mut expected = 1;
        for d in dims {
            expected *= self.dims.get(*d).copied().ok_or_else(|| {
                CfError::DimensionMismatch(format!("no dimension named '{d}'"))
            })?;
        }
        if expected != data.len() {
            return Err(CfError::DimensionMismatch(format!(
                "'{name}' expects {expected} values, got {}",
                data.len()
            )));
        }
        self.vars.insert(
            name.to_string(),
            MemoryVariable {
                dims: dims.iter().map(|d| d.to_string()).collect(),
                data,
                attrs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn set_attribute(&mut self, var: &str, name: &str, value: impl Into<AttrValue>) -> CfResult<()> {
        let variable = self
            .vars
            .get_mut(var)
            .ok_or_else(|| CfError::UnknownVariable(var.to_string()))?;
        variable.attrs.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Writes the store to a new NetCDF file. A dimension named `time` is
    /// created unlimited.
    pub fn save_netcdf<P: AsRef<Path>>(&self, path: P) -> CfResult<()> {
        let mut file = netcdf::create(path.as_ref())?;
        for (name, len) in &self.dims {
            if name == "time" {
                file.add_unlimited_dimension(name)?;
            } else {
                file.add_dimension(name, *len)?;
            }
        }
        for (name, value) in &self.globals {
            put_global(&mut file, name, value)?;
        }
        for (name, var) in &self.vars {
            let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
            let mut nc_var = file.add_variable::<f64>(name, &dims)?;
            for (attr, value) in &var.attrs {
                match value {
                    AttrValue::Text(s) => nc_var.put_attribute(attr, s.as_str())?,
                    AttrValue::Numbers(v) if v.len() == 1 => nc_var.put_attribute(attr, v[0])?,
                    AttrValue::Numbers(v) => nc_var.put_attribute(attr, v.clone())?,
                };
            }
            if !var.data.is_empty() {
                let extents: Vec<netcdf::Extent> = var
                    .dims
                    .iter()
                    .map(|d| {
                        let len = self.dims.get(d).copied().unwrap_or(0);
                        (0..len).into()
                    })
                    .collect();
                nc_var.put_values(&var.data, extents)?;
            }
        }
        file.close()?;
        Ok(())
    }
}

pub(crate) fn put_global(file: &mut netcdf::FileMut, name: &str, value: &AttrValue) -> CfResult<()> {
    match value {
        AttrValue::Text(s) => file.add_attribute(name, s.as_str())?,
        AttrValue::Numbers(v) if v.len() == 1 => file.add_attribute(name, v[0])?,
        AttrValue::Numbers(v) => file.add_attribute(name, v.clone())?,
    };
    Ok(())
}

impl GridStore for MemoryStore {
    fn variable_names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn dimensions(&self, var: &str) -> CfResult<Vec<String>> {
        self.vars
            .get(var)
            .map(|v| v.dims.clone())
            .ok_or_else(|| CfError::UnknownVariable(var.to_string()))
    }

    fn dimension_len(&self, dim: &str) -> CfResult<usize> {
        self.dims
            .get(dim)
            .copied()
            .ok_or_else(|| CfError::DimensionMismatch(format!("no dimension named '{dim}'")))
    }

    fn attribute(&self, var: &str, name: &str) -> Option<AttrValue> {
        self.vars.get(var)?.attrs.get(name).cloned()
    }

    fn global_attribute(&self, name: &str) -> Option<AttrValue> {
        self.globals.get(name).cloned()
    }

    fn read(&self, var: &str, selection: &[Option<usize>]) -> CfResult<Vec<f64>> {
        let variable = self
            .vars
            .get(var)
            .ok_or_else(|| CfError::UnknownVariable(var.to_string()))?;
        let shape: Vec<usize> = variable
            .dims
            .iter()
            .map(|d| self.dimension_len(d))
            .collect::<CfResult<_>>()?;
        check_selection(var, &shape, selection)?;
        Ok(gather(&shape, &variable.data, selection))
    }
}

/// Collects a row-major hyperslab from a flat array.
fn gather(shape: &[usize], data: &[f64], selection: &[Option<usize>]) -> Vec<f64> {
    let mut strides = vec![1usize; shape.len()];
    for k in (0..shape.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * shape[k + 1];
    }
    let base: usize = selection
        .iter()
        .zip(&strides)
        .map(|(s, st)| s.unwrap_or(0) * st)
        .sum();
    let free: Vec<usize> = (0..shape.len()).filter(|&k| selection[k].is_none()).collect();
    let count: usize = free.iter().map(|&k| shape[k]).product();

    let mut out = Vec::with_capacity(count);
    let mut counter = vec![0usize; free.len()];
    for _ in 0..count {
        let offset: usize = free
            .iter()
            .zip(&counter)
            .map(|(&k, &c)| c * strides[k])
            .sum();
        out.push(data[base + offset]);
        for pos in (0..counter.len()).rev() {
            counter[pos] += 1;
            if counter[pos] < shape[free[pos]] {
                break;
            }
            counter[pos] = 0;
        }
    }
    out
}
