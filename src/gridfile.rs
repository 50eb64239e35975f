//! # CF Grid Files
//!
//! [`GridFile`] wraps one gridded ice-sheet dataset. It knows the native
//! `x1`/`y1` axes, the (scaled) time axis, the grid mapping and a region of
//! interest, and computes whole-grid statistics such as ice volume, ice area
//! and the basal melt fraction.
//!
//! Field access lives in [`crate::field`]; 2D slices produced there are kept
//! in a bounded LRU cache owned by the file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cfgrid::gridfile::{GridFile, GridFileOptions, SliceSelection};
//! use cfgrid::timeindex::Round;
//!
//! let file = GridFile::open("greenland.nc", &GridFileOptions::default())?;
//! let t = file.timeslice(-20.0, Round::Nearest)?;
//! let volume = file.ice_volume(SliceSelection::Single(t), 1e-15)?;
//! println!("{} km^3 x 10^6", volume[0]);
//! # Ok::<(), cfgrid::error::CfError>(())
//! ```

use crate::error::{CfError, CfResult};
use crate::field::{Field, ReadOptions, Slice2D};
use crate::projection::Projection;
use crate::store::{GridStore, NetCdfStore};
use crate::timeindex::{Round, TimeIndex};
use log::debug;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, OnceCell, RefCell};
use std::num::NonZeroUsize;
use std::path::Path;
use std::rc::Rc;

/// Default factor from stored time units (years) to reported units (ka).
pub const DEFAULT_TIMESCALE: f64 = 0.001;

/// Default number of 2D slices kept per file.
pub const DEFAULT_SLICE_CACHE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridFileOptions {
    pub timescale: f64,
    /// Zero disables slice caching.
    pub slice_cache_capacity: usize,
}

impl Default for GridFileOptions {
    fn default() -> Self {
        Self {
            timescale: DEFAULT_TIMESCALE,
            slice_cache_capacity: DEFAULT_SLICE_CACHE,
        }
    }
}

/// Selection of time slices (or levels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SliceSelection {
    #[default]
    All,
    /// Inclusive range of indices.
    Range(usize, usize),
    Single(usize),
}

impl SliceSelection {
    pub fn is_multiple(&self) -> bool {
        !matches!(self, SliceSelection::Single(_))
    }

    /// Expands the selection against an axis of `len` entries.
    pub fn resolve(&self, len: usize) -> CfResult<Vec<usize>> {
        match *self {
            SliceSelection::All => Ok((0..len).collect()),
            SliceSelection::Single(i) if i < len => Ok(vec![i]),
            SliceSelection::Range(a, b) if a <= b && b < len => Ok((a..=b).collect()),
            other => Err(CfError::InvalidSelection(format!(
                "{other:?} does not fit an axis of length {len}"
            ))),
        }
    }
}

/// Global CF metadata. Missing attributes are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub title: Option<String>,
    pub institution: Option<String>,
    pub source: Option<String>,
    pub references: Option<String>,
    pub comment: Option<String>,
    pub history: Option<String>,
}

impl FileMetadata {
    fn from_store(store: &dyn GridStore) -> Self {
        let text = |name: &str| {
            store
                .global_attribute(name)
                .and_then(|a| a.as_text().map(str::to_string))
        };
        Self {
            title: text("title"),
            institution: text("institution"),
            source: text("source"),
            references: text("references"),
            comment: text("comment"),
            history: text("history"),
        }
    }
}

/// Region of interest. Geographic corners are derived lazily from the
/// projected ones; `None` marks a stale value.
#[derive(Debug, Clone)]
struct BoundingBox {
    ll_xy: (f64, f64),
    ur_xy: (f64, f64),
    ll_geo: Cell<Option<(f64, f64)>>,
    ur_geo: Cell<Option<(f64, f64)>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SliceKey {
    pub name: String,
    pub average: bool,
    pub time: usize,
    pub level: usize,
    pub options: ReadOptions,
}

/// Ice statistics for one time slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IceStats {
    pub time: f64,
    /// 10^6 km^3
    pub volume: f64,
    /// 10^6 km^2
    pub area: f64,
    pub melt_fraction: f64,
    pub divide_thickness: Option<f64>,
    pub divide_basal_temperature: Option<f64>,
}

pub struct GridFile {
    store: Box<dyn GridStore>,
    name: String,
    timescale: f64,
    x: Vec<f64>,
    y: Vec<f64>,
    raw_time: Vec<f64>,
    time_index: Option<TimeIndex>,
    mapping_var: Option<String>,
    projection: OnceCell<Projection>,
    bbox: BoundingBox,
    metadata: FileMetadata,
    slices: Option<RefCell<LruCache<SliceKey, Rc<Slice2D>>>>,
}

impl std::fmt::Debug for GridFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridFile")
            .field("name", &self.name)
            .field("timescale", &self.timescale)
            .field("nx", &self.x.len())
            .field("ny", &self.y.len())
            .field("ntimes", &self.raw_time.len())
            .field("mapping_var", &self.mapping_var)
            .finish_non_exhaustive()
    }
}

impl GridFile {
    pub fn open<P: AsRef<Path>>(path: P, options: &GridFileOptions) -> CfResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let store = NetCdfStore::open(path)?;
        Self::from_store(Box::new(store), &name, options)
    }

    pub fn from_store(store: Box<dyn GridStore>, name: &str, options: &GridFileOptions) -> CfResult<Self> {
        let x = store.read_all("x1")?;
        let y = store.read_all("y1")?;
        if x.is_empty() || y.is_empty() {
            return Err(CfError::DimensionMismatch(format!("{name}: empty x1/y1 axis")));
        }
        let raw_time = if store.has_variable("time") {
            store.read_all("time")?
        } else {
            Vec::new()
        };
        let time_index = if raw_time.is_empty() {
            None
        } else {
            let scaled: Vec<f64> = raw_time.iter().map(|t| t * options.timescale).collect();
            Some(TimeIndex::new(scaled)?)
        };
        let mapping_var = store
            .variable_names()
            .into_iter()
            .find(|v| store.attribute(v, "grid_mapping_name").is_some());
        if mapping_var.is_none() {
            debug!("{name}: no grid mapping variable");
        }
        let metadata = FileMetadata::from_store(store.as_ref());
        let bbox = BoundingBox {
            ll_xy: (x[0], y[0]),
            ur_xy: (x[x.len() - 1], y[y.len() - 1]),
            ll_geo: Cell::new(None),
            ur_geo: Cell::new(None),
        };
        let slices = NonZeroUsize::new(options.slice_cache_capacity).map(|cap| RefCell::new(LruCache::new(cap)));

        debug!(
            "Loaded {}: {}x{} grid, {} time slices",
            name,
            x.len(),
            y.len(),
            raw_time.len()
        );
        Ok(Self {
            store,
            name: name.to_string(),
            timescale: options.timescale,
            x,
            y,
            raw_time,
            time_index,
            mapping_var,
            projection: OnceCell::new(),
            bbox,
            metadata,
            slices,
        })
    }

    /// Replaces the projection read from the file.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = OnceCell::from(projection);
        self.bbox.ll_geo.set(None);
        self.bbox.ur_geo.set(None);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &dyn GridStore {
        self.store.as_ref()
    }

    pub fn timescale(&self) -> f64 {
        self.timescale
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Title, falling back to the file name.
    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or(&self.name)
    }

    pub fn institution(&self) -> &str {
        self.metadata.institution.as_deref().unwrap_or("")
    }

    pub fn source(&self) -> &str {
        self.metadata.source.as_deref().unwrap_or("")
    }

    pub fn references(&self) -> &str {
        self.metadata.references.as_deref().unwrap_or("")
    }

    pub fn comment(&self) -> &str {
        self.metadata.comment.as_deref().unwrap_or("")
    }

    pub fn history(&self) -> &str {
        self.metadata.history.as_deref().unwrap_or("")
    }

    pub fn mapping_var(&self) -> Option<&str> {
        self.mapping_var.as_deref()
    }

    pub fn x_coords(&self) -> &[f64] {
        &self.x
    }

    pub fn y_coords(&self) -> &[f64] {
        &self.y
    }

    pub fn delta_x(&self) -> f64 {
        if self.x.len() < 2 { 0.0 } else { self.x[1] - self.x[0] }
    }

    pub fn delta_y(&self) -> f64 {
        if self.y.len() < 2 { 0.0 } else { self.y[1] - self.y[0] }
    }

    pub fn num_times(&self) -> usize {
        self.raw_time.len()
    }

    pub fn num_levels(&self) -> usize {
        self.store.dimension_len("level").unwrap_or(0)
    }

    /// Sigma coordinate values, empty for 2D-only files.
    pub fn levels(&self) -> CfResult<Vec<f64>> {
        if self.store.has_variable("level") {
            self.store.read_all("level")
        } else {
            Ok(Vec::new())
        }
    }

    // --- time -----------------------------------------------------------

    pub(crate) fn check_time(&self, index: usize) -> CfResult<()> {
        if index >= self.raw_time.len() {
            return Err(CfError::TimeSliceOutOfRange {
                index,
                len: self.raw_time.len(),
            });
        }
        Ok(())
    }

    /// Scaled time of slice `index`.
    pub fn time(&self, index: usize) -> CfResult<f64> {
        self.check_time(index)?;
        Ok(self.raw_time[index] * self.timescale)
    }

    /// Scaled times of a selection.
    pub fn times(&self, selection: SliceSelection) -> CfResult<Vec<f64>> {
        Ok(selection
            .resolve(self.raw_time.len())?
            .into_iter()
            .map(|i| self.raw_time[i] * self.timescale)
            .collect())
    }

    pub fn time_index(&self) -> CfResult<&TimeIndex> {
        self.time_index.as_ref().ok_or(CfError::TimeSliceOutOfRange { index: 0, len: 0 })
    }

    /// Slice index for a scaled time.
    pub fn timeslice(&self, time: f64, round: Round) -> CfResult<usize> {
        self.time_index()?.lookup(time, round)
    }

    // --- projection and region ------------------------------------------

    pub fn projection(&self) -> CfResult<&Projection> {
        if let Some(p) = self.projection.get() {
            return Ok(p);
        }
        let var = self.mapping_var.as_deref().ok_or_else(|| CfError::MissingAttribute {
            owner: self.name.clone(),
            attribute: "grid_mapping_name".to_string(),
        })?;
        let projection = Projection::from_store(self.store.as_ref(), var)?;
        let _ = self.projection.set(projection);
        self.projection
            .get()
            .ok_or_else(|| CfError::Projection("projection cache not initialised".to_string()))
    }

    /// Geographic to projected.
    pub fn project(&self, lonlat: (f64, f64)) -> CfResult<(f64, f64)> {
        self.projection()?.forward(lonlat)
    }

    /// Projected to geographic.
    pub fn unproject(&self, xy: (f64, f64)) -> CfResult<(f64, f64)> {
        self.projection()?.inverse(xy)
    }

    /// Whether `point` lies within the native extent, edges included.
    pub fn inside(&self, point: (f64, f64)) -> bool {
        let (x0, x1) = (self.x[0], self.x[self.x.len() - 1]);
        let (y0, y1) = (self.y[0], self.y[self.y.len() - 1]);
        point.0 >= x0.min(x1) && point.0 <= x0.max(x1) && point.1 >= y0.min(y1) && point.1 <= y0.max(y1)
    }

    pub fn ll_xy(&self) -> (f64, f64) {
        self.bbox.ll_xy
    }

    pub fn ur_xy(&self) -> (f64, f64) {
        self.bbox.ur_xy
    }

    pub fn set_ll_xy(&mut self, xy: (f64, f64)) -> CfResult<()> {
        if !self.inside(xy) {
            return Err(CfError::PointOutsideGrid { x: xy.0, y: xy.1 });
        }
        self.bbox.ll_xy = xy;
        self.bbox.ll_geo.set(None);
        Ok(())
    }

    pub fn set_ur_xy(&mut self, xy: (f64, f64)) -> CfResult<()> {
        if !self.inside(xy) {
            return Err(CfError::PointOutsideGrid { x: xy.0, y: xy.1 });
        }
        self.bbox.ur_xy = xy;
        self.bbox.ur_geo.set(None);
        Ok(())
    }

    pub fn ll_geo(&self) -> CfResult<(f64, f64)> {
        if let Some(geo) = self.bbox.ll_geo.get() {
            return Ok(geo);
        }
        let geo = self.unproject(self.bbox.ll_xy)?;
        self.bbox.ll_geo.set(Some(geo));
        Ok(geo)
    }

    pub fn ur_geo(&self) -> CfResult<(f64, f64)> {
        if let Some(geo) = self.bbox.ur_geo.get() {
            return Ok(geo);
        }
        let geo = self.unproject(self.bbox.ur_xy)?;
        self.bbox.ur_geo.set(Some(geo));
        Ok(geo)
    }

    pub fn set_ll_geo(&mut self, lonlat: (f64, f64)) -> CfResult<()> {
        let xy = self.project(lonlat)?;
        self.set_ll_xy(xy)?;
        self.bbox.ll_geo.set(Some(lonlat));
        Ok(())
    }

    pub fn set_ur_geo(&mut self, lonlat: (f64, f64)) -> CfResult<()> {
        let xy = self.project(lonlat)?;
        self.set_ur_xy(xy)?;
        self.bbox.ur_geo.set(Some(lonlat));
        Ok(())
    }

    /// Restores the region to the full native extent.
    pub fn reset_bbox(&mut self) {
        self.bbox.ll_xy = (self.x[0], self.y[0]);
        self.bbox.ur_xy = (self.x[self.x.len() - 1], self.y[self.y.len() - 1]);
        self.bbox.ll_geo.set(None);
        self.bbox.ur_geo.set(None);
    }

    /// Renderer region string for the current region.
    pub fn region(&self) -> CfResult<String> {
        self.projection()?.region_bounds(self.bbox.ll_xy, self.bbox.ur_xy)
    }

    // --- raw access and caching -----------------------------------------

    /// Reads a horizontal slice in stored (y, x) order. Dimensions named
    /// `time` and `level` are fixed; any others are read whole.
    pub(crate) fn read_slice(&self, var: &str, time: usize, level: usize) -> CfResult<Vec<f64>> {
        let dims = self.store.dimensions(var)?;
        let selection: Vec<Option<usize>> = dims
            .iter()
            .map(|d| match d.as_str() {
                "time" => Some(time),
                "level" => Some(level),
                _ => None,
            })
            .collect();
        self.store.read(var, &selection)
    }

    /// Scalar of a time-only variable such as `eus`.
    pub(crate) fn read_scalar(&self, var: &str, time: usize) -> CfResult<f64> {
        let values = self.read_slice(var, time, 0)?;
        values
            .first()
            .copied()
            .ok_or_else(|| CfError::DimensionMismatch(format!("'{var}' is empty at slice {time}")))
    }

    pub(crate) fn cached_slice(&self, key: &SliceKey) -> Option<Rc<Slice2D>> {
        self.slices.as_ref()?.borrow_mut().get(key).cloned()
    }

    pub(crate) fn cache_slice(&self, key: SliceKey, slice: Rc<Slice2D>) {
        if let Some(cache) = &self.slices {
            cache.borrow_mut().put(key, slice);
        }
    }

    /// Drops every cached slice.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.slices {
            cache.borrow_mut().clear();
        }
    }

    pub fn cached_slices(&self) -> usize {
        self.slices.as_ref().map_or(0, |c| c.borrow().len())
    }

    // --- fields -----------------------------------------------------------

    /// Looks up a stored or derived variable. `is` is ice surface elevation,
    /// a `_avg` suffix requests the vertical average.
    pub fn variable(&self, name: &str) -> CfResult<Field<'_>> {
        Field::new(self, name)
    }

    // --- statistics --------------------------------------------------------

    fn cell_area(&self) -> f64 {
        (self.delta_x() * self.delta_y()).abs()
    }

    fn ice_area_at(&self, t: usize, scale: f64) -> CfResult<f64> {
        let thk = self.read_slice("thk", t, 0)?;
        let cells = thk.iter().filter(|&&h| h > 0.0).count();
        Ok(cells as f64 * self.cell_area() * scale)
    }

    fn ice_volume_at(&self, t: usize, scale: f64) -> CfResult<f64> {
        let thk = self.read_slice("thk", t, 0)?;
        let total: f64 = thk.iter().filter(|&&h| h > 0.0).sum();
        Ok(total * self.cell_area() * scale)
    }

    fn melt_fraction_at(&self, t: usize, scale: f64) -> CfResult<f64> {
        let area = self.ice_area_at(t, scale)?;
        if area <= 0.0 {
            return Ok(0.0);
        }
        let bmlt = self.read_slice("bmlt", t, 0)?;
        let cells = bmlt.iter().filter(|&&m| m > 0.0).count();
        Ok(cells as f64 * self.cell_area() * scale / area)
    }

    /// Ice-covered area (cells with thickness > 0) times `scale`, per slice.
    pub fn ice_area(&self, selection: SliceSelection, scale: f64) -> CfResult<Vec<f64>> {
        selection
            .resolve(self.num_times())?
            .into_iter()
            .map(|t| self.ice_area_at(t, scale))
            .collect()
    }

    /// Ice volume times `scale`, per slice.
    pub fn ice_volume(&self, selection: SliceSelection, scale: f64) -> CfResult<Vec<f64>> {
        selection
            .resolve(self.num_times())?
            .into_iter()
            .map(|t| self.ice_volume_at(t, scale))
            .collect()
    }

    /// Fraction of the ice-covered area with basal melting; 0 without ice.
    pub fn melt_fraction(&self, selection: SliceSelection, scale: f64) -> CfResult<Vec<f64>> {
        selection
            .resolve(self.num_times())?
            .into_iter()
            .map(|t| self.melt_fraction_at(t, scale))
            .collect()
    }

    /// Volume, area and melt fraction at slice `t`. With `eismint`, also the
    /// thickness and basal temperature at the central node.
    pub fn stats(&self, t: usize, eismint: bool) -> CfResult<IceStats> {
        self.check_time(t)?;
        let mut stats = IceStats {
            time: self.time(t)?,
            volume: self.ice_volume_at(t, 1e-15)?,
            area: self.ice_area_at(t, 1e-12)?,
            melt_fraction: self.melt_fraction_at(t, 1.0)?,
            divide_thickness: None,
            divide_basal_temperature: None,
        };
        if eismint {
            let node = (self.x.len() / 2, self.y.len() / 2);
            let options = ReadOptions::default();
            let thk = self.variable("thk")?;
            stats.divide_thickness = thk
                .spot(node, SliceSelection::Single(t), SliceSelection::Single(0), options)?
                .first()
                .copied();
            let temp = self.variable("temp")?;
            let basal = self.num_levels().saturating_sub(1);
            stats.divide_basal_temperature = temp
                .spot(node, SliceSelection::Single(t), SliceSelection::Single(basal), options)?
                .first()
                .copied();
        }
        Ok(stats)
    }

    /// Modelled sea-level contribution at a geographic location, one value
    /// per selected slice.
    pub fn rsl(&self, lonlat: (f64, f64), selection: SliceSelection) -> CfResult<Vec<f64>> {
        let xy = self.project(lonlat)?;
        if !self.inside(xy) {
            return Err(CfError::PointOutsideGrid { x: xy.0, y: xy.1 });
        }
        let slc = self.variable("slc")?;
        selection
            .resolve(self.num_times())?
            .into_iter()
            .map(|t| slc.spline(xy, t, 0, ReadOptions::default()))
            .collect()
    }
}
