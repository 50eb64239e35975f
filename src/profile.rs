//! # Profiles
//!
//! A [`ProfileLine`] is a polyline across a [`GridFile`], resampled at a fixed
//! arc-length interval and clipped to the grid extent. Fields are sampled
//! along it to give distance-along-profile series, vertical sections through
//! 3D fields ([`ProfileLine::profile_2d`]) and the position of the ice margin
//! ([`ProfileLine::ice_extent`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use cfgrid::field::ReadOptions;
//! use cfgrid::gridfile::{GridFile, GridFileOptions};
//! use cfgrid::profile::{ProfileLine, ProfileOptions};
//!
//! let file = GridFile::open("scandinavia.nc", &GridFileOptions::default())?;
//! let line = ProfileLine::new(
//!     &file,
//!     &[(5.0, 60.0), (20.0, 68.0)],
//!     &ProfileOptions { projected: false, ..ProfileOptions::default() },
//! )?;
//! let thk = line.sample("thk", 0, 0, ReadOptions::default())?;
//! for (x, h) in line.xvalues().iter().zip(thk.iter()) {
//!     println!("{x:.1} km\t{h:.1} m");
//! }
//! # Ok::<(), cfgrid::error::CfError>(())
//! ```

use crate::error::{CfError, CfResult};
use crate::field::ReadOptions;
use crate::gridfile::{GridFile, SliceSelection};
use crate::spline::interpolate_grid;
use log::{debug, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Fill value for cells of a [`Profile2D`] outside the ice column.
pub const NO_DATA: f64 = -99999.0;

/// Thicknesses at or above this are treated as fill values.
pub const MAX_ICE_THICKNESS: f64 = 10000.0;

pub const DEFAULT_INTERVAL: f64 = 10000.0;
pub const DEFAULT_XSCALE: f64 = 0.001;
pub const DEFAULT_VERTICAL_RESOLUTION: f64 = 10.0;
pub const DEFAULT_PROFILE_CACHE: usize = 64;

/// Resamples a polyline at a constant arc-length step.
///
/// The first control point is always emitted; every following point lies
/// exactly `interval` further along the line. The last control point is only
/// emitted when the total length is a multiple of `interval`.
pub fn resample_constant_step(points: &[(f64, f64)], interval: f64) -> CfResult<Vec<(f64, f64)>> {
    if !(interval > 0.0) || !interval.is_finite() {
        return Err(CfError::InvalidProfileInput(format!(
            "resampling interval must be positive, got {interval}"
        )));
    }
    let Some(&first) = points.first() else {
        return Err(CfError::InvalidProfileInput("no control points".to_string()));
    };

    let mut resampled = vec![first];
    let mut remainder = 0.0;
    let mut last_remainder = 0.0;
    let mut start = first;
    for (n, &end) in points.iter().enumerate().skip(1) {
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let length = dx.hypot(dy);
        if length == 0.0 {
            return Err(CfError::InvalidProfileInput(format!(
                "control points {} and {} coincide",
                n - 1,
                n
            )));
        }
        let (cos, sin) = (dx / length, dy / length);
        remainder += length;
        let mut cursor = start;
        while remainder - interval >= 0.0 {
            let step = interval - last_remainder;
            cursor = (cursor.0 + step * cos, cursor.1 + step * sin);
            last_remainder = 0.0;
            resampled.push(cursor);
            remainder -= interval;
        }
        last_remainder = remainder;
        start = end;
    }
    Ok(resampled)
}

/// Piecewise-linear interpolation of `(x, y)` onto `positions`.
///
/// Both `x` and `positions` must be ascending. Positions outside `x` take the
/// boundary value.
pub fn interpolate_linear(x: &[f64], y: &[f64], positions: &[f64]) -> CfResult<Vec<f64>> {
    if x.len() != y.len() {
        return Err(CfError::InvalidProfileInput(format!(
            "x has {} samples but y has {}",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(CfError::InvalidProfileInput("no samples to interpolate".to_string()));
    }
    let last = x.len() - 1;
    let mut j = 0;
    let mut result = Vec::with_capacity(positions.len());
    for &p in positions {
        if p <= x[0] {
            result.push(y[0]);
            continue;
        }
        if p >= x[last] {
            result.push(y[last]);
            continue;
        }
        while p > x[j] {
            j += 1;
        }
        result.push(y[j - 1] + (p - x[j - 1]) * (y[j] - y[j - 1]) / (x[j] - x[j - 1]));
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileOptions {
    /// Control points are projected coordinates; otherwise lon/lat.
    pub projected: bool,
    /// Resampling step in projected units.
    pub interval: f64,
    /// Arc-length sub-range in projected units.
    pub xrange: (Option<f64>, Option<f64>),
    /// Factor applied to arc-length coordinates.
    pub xscale: f64,
    /// Vertical spacing of [`Profile2D`] grids.
    pub vertical_resolution: f64,
    /// Zero disables sample caching.
    pub cache_capacity: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            projected: true,
            interval: DEFAULT_INTERVAL,
            xrange: (None, None),
            xscale: DEFAULT_XSCALE,
            vertical_resolution: DEFAULT_VERTICAL_RESOLUTION,
            cache_capacity: DEFAULT_PROFILE_CACHE,
        }
    }
}

/// Result of scanning a thickness profile for the ice margin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum IceExtent {
    /// Distance of the ice-covered sample furthest along the profile.
    Found(f64),
    /// No ice on the profile; carries the first distance so plots still close.
    NoIce(f64),
}

impl IceExtent {
    pub fn distance(&self) -> f64 {
        match *self {
            IceExtent::Found(x) | IceExtent::NoIce(x) => x,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, IceExtent::Found(_))
    }
}

/// Vertical section along a profile. `values[i * z.len() + k]` is the value
/// at distance `x[i]` and elevation `z[k]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile2D {
    pub x: Vec<f64>,
    pub z: Vec<f64>,
    pub values: Vec<f64>,
}

impl Profile2D {
    pub fn get(&self, i: usize, k: usize) -> f64 {
        self.values[i * self.z.len() + k]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SampleKey {
    var: String,
    time: usize,
    level: usize,
    options: ReadOptions,
}

pub struct ProfileLine<'a> {
    file: &'a GridFile,
    control: Vec<(f64, f64)>,
    interval: f64,
    xrange: (f64, f64),
    xvalues: Vec<f64>,
    points: Vec<(f64, f64)>,
    vertical_resolution: f64,
    samples: Option<RefCell<LruCache<SampleKey, Rc<Vec<f64>>>>>,
}

impl std::fmt::Debug for ProfileLine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileLine")
            .field("file", &self.file.name())
            .field("interval", &self.interval)
            .field("xrange", &self.xrange)
            .field("points", &self.points.len())
            .finish_non_exhaustive()
    }
}

impl<'a> ProfileLine<'a> {
    pub fn new(file: &'a GridFile, control_points: &[(f64, f64)], options: &ProfileOptions) -> CfResult<Self> {
        let control: Vec<(f64, f64)> = if options.projected {
            control_points.to_vec()
        } else {
            control_points
                .iter()
                .map(|&p| file.project(p))
                .collect::<CfResult<_>>()?
        };
        let resampled = resample_constant_step(&control, options.interval)?;

        let start = options
            .xrange
            .0
            .map_or(0, |x0| (x0 / options.interval).max(0.0) as usize);
        let end = options
            .xrange
            .1
            .map_or(resampled.len(), |x1| (x1 / options.interval + 0.9999).max(0.0) as usize)
            .min(resampled.len());
        if start >= end {
            return Err(CfError::InvalidProfileInput(format!(
                "arc-length range {:?} selects no samples",
                options.xrange
            )));
        }

        let interval = options.interval * options.xscale;
        let xrange = (start as f64 * interval, end as f64 * interval);
        let mut xvalues = Vec::with_capacity(end - start);
        let mut points = Vec::with_capacity(end - start);
        for (i, &p) in resampled[start..end].iter().enumerate() {
            if file.inside(p) {
                xvalues.push(xrange.0 + i as f64 * interval);
                points.push(p);
            }
        }
        if points.is_empty() {
            return Err(CfError::InvalidProfileInput(format!(
                "profile lies entirely outside {}",
                file.name()
            )));
        }
        if points.len() < end - start {
            warn!(
                "{} of {} profile points lie outside {} and were dropped",
                end - start - points.len(),
                end - start,
                file.name()
            );
        }
        debug!(
            "Profile across {}: {} control points, {} samples every {}",
            file.name(),
            control.len(),
            points.len(),
            options.interval
        );

        Ok(Self {
            file,
            control,
            interval,
            xrange,
            xvalues,
            points,
            vertical_resolution: options.vertical_resolution,
            samples: NonZeroUsize::new(options.cache_capacity).map(|cap| RefCell::new(LruCache::new(cap))),
        })
    }

    pub fn file(&self) -> &'a GridFile {
        self.file
    }

    /// Control points in projected coordinates.
    pub fn control_points(&self) -> &[(f64, f64)] {
        &self.control
    }

    /// Resampled, clipped path.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Scaled arc-length coordinate of every path point.
    pub fn xvalues(&self) -> &[f64] {
        &self.xvalues
    }

    /// Scaled sample spacing.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn xrange(&self) -> (f64, f64) {
        self.xrange
    }

    /// Field `var` sampled along the path at slice `time`, vertical `level`.
    pub fn sample(&self, var: &str, time: usize, level: usize, options: ReadOptions) -> CfResult<Rc<Vec<f64>>> {
        let key = SampleKey {
            var: var.to_string(),
            time,
            level,
            options,
        };
        if let Some(cache) = &self.samples
            && let Some(hit) = cache.borrow_mut().get(&key)
        {
            return Ok(Rc::clone(hit));
        }

        let field = self.file.variable(var)?;
        let slice = field.slice(time, level, options)?;
        let xs = field.x_coords()?;
        let ys = field.y_coords()?;
        let values = Rc::new(
            self.points
                .iter()
                .map(|&p| interpolate_grid(&xs, &ys, slice.values(), p))
                .collect::<CfResult<Vec<f64>>>()?,
        );
        if let Some(cache) = &self.samples {
            cache.borrow_mut().put(key, Rc::clone(&values));
        }
        Ok(values)
    }

    /// One sampled profile per selected time slice.
    pub fn profile_time_series(
        &self,
        var: &str,
        selection: SliceSelection,
        level: usize,
        options: ReadOptions,
    ) -> CfResult<Vec<Rc<Vec<f64>>>> {
        selection
            .resolve(self.file.num_times())?
            .into_iter()
            .map(|t| self.sample(var, t, level, options))
            .collect()
    }

    /// Vertical section of the 3D field `var` between bedrock and ice surface.
    ///
    /// Missing bedrock is taken as zero. Cells above the surface, below the
    /// bed or in ice-free columns hold [`NO_DATA`].
    pub fn profile_2d(&self, var: &str, time: usize, options: ReadOptions) -> CfResult<Profile2D> {
        let field = self.file.variable(var)?;
        if !field.is_3d() || field.is_average() {
            return Err(CfError::NotA3DVariable(var.to_string()));
        }
        let thk = self.sample("thk", time, 0, ReadOptions::default())?;
        let topg = if self.file.store().has_variable("topg") {
            self.sample("topg", time, 0, ReadOptions::default())?
        } else {
            warn!("{}: no bedrock elevation, assuming zero", self.file.name());
            Rc::new(vec![0.0; thk.len()])
        };
        let sigma = self.file.levels()?;
        let levels = (0..sigma.len())
            .map(|k| self.sample(var, time, k, options))
            .collect::<CfResult<Vec<_>>>()?;

        // fill values and absent bedrock would stretch the vertical axis without bound
        let columns: Vec<usize> = (0..thk.len())
            .filter(|&j| thk[j] > 0.0 && thk[j] < MAX_ICE_THICKNESS && topg[j].is_finite())
            .collect();
        let dz = self.vertical_resolution;
        let z = match (
            columns.iter().map(|&j| topg[j]).reduce(f64::min),
            columns.iter().map(|&j| topg[j] + thk[j]).reduce(f64::max),
        ) {
            (Some(bottom), Some(top)) => {
                let z0 = (bottom / dz).floor() * dz;
                let nz = ((top / dz).ceil() * dz - z0) / dz;
                (0..=nz.round() as usize).map(|k| z0 + k as f64 * dz).collect()
            }
            _ => Vec::new(),
        };

        let mut values = vec![NO_DATA; thk.len() * z.len()];
        for &j in &columns {
            // level elevations descend with sigma; reverse for ascending interpolation
            let (heights, column): (Vec<f64>, Vec<f64>) = sigma
                .iter()
                .zip(&levels)
                .rev()
                .map(|(s, profile)| (topg[j] + (1.0 - s) * thk[j], profile[j]))
                .unzip();
            let inside: Vec<(usize, f64)> = z
                .iter()
                .enumerate()
                .filter(|&(_, &zk)| zk >= topg[j] && zk <= topg[j] + thk[j])
                .map(|(k, &zk)| (k, zk))
                .collect();
            let positions: Vec<f64> = inside.iter().map(|&(_, zk)| zk).collect();
            let interpolated = interpolate_linear(&heights, &column, &positions)?;
            for (&(k, _), v) in inside.iter().zip(interpolated) {
                values[j * z.len() + k] = v;
            }
        }

        Ok(Profile2D {
            x: self.xvalues.clone(),
            z,
            values,
        })
    }

    /// Position of the ice margin at slice `time`, scanning from the far end.
    pub fn ice_extent(&self, time: usize) -> CfResult<IceExtent> {
        let thk = self.sample("thk", time, 0, ReadOptions::default())?;
        Ok(thk
            .iter()
            .zip(&self.xvalues)
            .rev()
            .find(|&(&h, _)| h > 0.0 && h < MAX_ICE_THICKNESS)
            .map_or(IceExtent::NoIce(self.xvalues[0]), |(_, &x)| IceExtent::Found(x)))
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.samples {
            cache.borrow_mut().clear();
        }
    }

    pub fn cached_samples(&self) -> usize {
        self.samples.as_ref().map_or(0, |c| c.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridfile::GridFileOptions;
    use crate::store::MemoryStore;

    fn assert_points(actual: &[(f64, f64)], expected: &[(f64, f64)]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a.0 - e.0).abs() < 1e-9 && (a.1 - e.1).abs() < 1e-9, "{a:?} != {e:?}");
        }
    }

    #[test]
    fn test_resample_straight_line() {
        let out = resample_constant_step(&[(0.0, 0.0), (25.0, 0.0)], 10.0).unwrap();
        assert_points(&out, &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let exact = resample_constant_step(&[(0.0, 0.0), (0.0, 30.0)], 10.0).unwrap();
        assert_points(&exact, &[(0.0, 0.0), (0.0, 10.0), (0.0, 20.0), (0.0, 30.0)]);
    }

    #[test]
    fn test_resample_carries_remainder_across_corners() {
        let out = resample_constant_step(&[(0.0, 0.0), (5.0, 0.0), (5.0, 12.0), (8.0, 12.0)], 10.0).unwrap();
        assert_points(&out, &[(0.0, 0.0), (5.0, 5.0), (8.0, 12.0)]);
    }

    #[test]
    fn test_resample_rejects_degenerate_input() {
        assert!(matches!(
            resample_constant_step(&[(1.0, 1.0), (1.0, 1.0)], 10.0),
            Err(CfError::InvalidProfileInput(_))
        ));
        assert!(resample_constant_step(&[], 10.0).is_err());
        assert!(resample_constant_step(&[(0.0, 0.0), (1.0, 0.0)], 0.0).is_err());
        assert_eq!(resample_constant_step(&[(3.0, 4.0)], 1.0).unwrap(), vec![(3.0, 4.0)]);
    }

    #[test]
    fn test_interpolate_linear() {
        let x = [0.0, 1.0, 3.0];
        let y = [0.0, 10.0, 30.0];
        let out = interpolate_linear(&x, &y, &[-1.0, 0.0, 0.5, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(out, vec![0.0, 0.0, 5.0, 10.0, 20.0, 30.0, 30.0]);
        assert!(matches!(
            interpolate_linear(&x, &[1.0], &[0.5]),
            Err(CfError::InvalidProfileInput(_))
        ));
    }

    /// 5 x 3 grid at 10 km spacing, 2 time slices, 3 sigma levels.
    fn file() -> GridFile {
        let thk_row = [1000.0, 800.0, 600.0, 0.0, 0.0];
        let thk: Vec<f64> = (0..3)
            .flat_map(|_| thk_row)
            .chain(std::iter::repeat_n(0.0, 15))
            .collect();
        let temp: Vec<f64> = (0..2)
            .flat_map(|_| (0..3).flat_map(|k| std::iter::repeat_n(-10.0 * k as f64, 15)))
            .collect();
        let store = MemoryStore::new()
            .with_dimension("time", 2)
            .with_dimension("level", 3)
            .with_dimension("y1", 3)
            .with_dimension("x1", 5)
            .with_variable("time", &["time"], vec![0.0, 1000.0])
            .unwrap()
            .with_variable("level", &["level"], vec![0.0, 0.5, 1.0])
            .unwrap()
            .with_variable("x1", &["x1"], vec![0.0, 10000.0, 20000.0, 30000.0, 40000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![0.0, 10000.0, 20000.0])
            .unwrap()
            .with_variable("thk", &["time", "y1", "x1"], thk)
            .unwrap()
            .with_variable("topg", &["time", "y1", "x1"], vec![100.0; 30])
            .unwrap()
            .with_variable("temp", &["time", "level", "y1", "x1"], temp)
            .unwrap();
        GridFile::from_store(Box::new(store), "profile.nc", &GridFileOptions::default()).unwrap()
    }

    fn across(file: &GridFile) -> ProfileLine<'_> {
        ProfileLine::new(file, &[(0.0, 10000.0), (40000.0, 10000.0)], &ProfileOptions::default()).unwrap()
    }

    #[test]
    fn test_xvalues_and_clipping() {
        let file = file();
        let line = across(&file);
        assert_eq!(line.xvalues(), &[0.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(line.xrange(), (0.0, 50.0));

        let clipped =
            ProfileLine::new(&file, &[(-20000.0, 10000.0), (40000.0, 10000.0)], &ProfileOptions::default())
                .unwrap();
        assert_eq!(clipped.xvalues(), &[20.0, 30.0, 40.0, 50.0, 60.0]);
        assert_eq!(clipped.points()[0], (0.0, 10000.0));

        let outside = ProfileLine::new(&file, &[(50000.0, 0.0), (90000.0, 0.0)], &ProfileOptions::default());
        assert!(matches!(outside, Err(CfError::InvalidProfileInput(_))));
    }

    #[test]
    fn test_xrange_restriction() {
        let file = file();
        let options = ProfileOptions {
            xrange: (Some(15000.0), Some(30000.0)),
            ..ProfileOptions::default()
        };
        let line = ProfileLine::new(&file, &[(0.0, 10000.0), (40000.0, 10000.0)], &options).unwrap();
        assert_eq!(line.xvalues(), &[10.0, 20.0]);
        assert_eq!(line.xrange(), (10.0, 30.0));
    }

    #[test]
    fn test_sample_and_cache() {
        let file = file();
        let line = across(&file);
        let thk = line.sample("thk", 0, 0, ReadOptions::default()).unwrap();
        assert_eq!(*thk, vec![1000.0, 800.0, 600.0, 0.0, 0.0]);
        assert_eq!(line.cached_samples(), 1);
        let again = line.sample("thk", 0, 0, ReadOptions::default()).unwrap();
        assert!(Rc::ptr_eq(&thk, &again));
        line.clear_cache();
        assert_eq!(line.cached_samples(), 0);

        let series = line
            .profile_time_series("thk", SliceSelection::All, 0, ReadOptions::default())
            .unwrap();
        assert_eq!(series.len(), 2);
        assert!(series[1].iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_sample_uses_cubic_interpolation() {
        let file = file();
        let line = ProfileLine::new(&file, &[(5000.0, 5000.0), (25000.0, 5000.0)], &ProfileOptions::default())
            .unwrap();
        let thk = line.sample("thk", 0, 0, ReadOptions::default()).unwrap();
        // natural spline through 1000, 800, 600, 0, 0 at the cell midpoints
        let expected = [885.267857142857, 744.196428571428, 287.946428571428];
        for (v, e) in thk.iter().zip(expected) {
            assert!((v - e).abs() < 1e-6, "{v} != {e}");
        }
        let field = file.variable("thk").unwrap();
        for (&p, v) in line.points().iter().zip(thk.iter()) {
            let direct = field.spline(p, 0, 0, ReadOptions::default()).unwrap();
            assert!((direct - v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ice_extent() {
        let file = file();
        let line = across(&file);
        assert_eq!(line.ice_extent(0).unwrap(), IceExtent::Found(20.0));
        let none = line.ice_extent(1).unwrap();
        assert_eq!(none, IceExtent::NoIce(0.0));
        assert!(!none.is_found());
        assert_eq!(none.distance(), 0.0);
    }

    #[test]
    fn test_profile_2d() {
        let file = file();
        let line = across(&file);
        let section = line.profile_2d("temp", 0, ReadOptions::default()).unwrap();
        assert_eq!(section.z.first(), Some(&100.0));
        assert_eq!(section.z.last(), Some(&1100.0));
        assert_eq!(section.z.len(), 101);

        let k = |z: f64| section.z.iter().position(|&v| (v - z).abs() < 1e-9).unwrap();
        assert_eq!(section.get(0, k(100.0)), -20.0);
        assert_eq!(section.get(0, k(600.0)), -10.0);
        assert_eq!(section.get(0, k(1100.0)), 0.0);
        assert!((section.get(0, k(350.0)) + 15.0).abs() < 1e-9);
        // surface of the third column is at 700 m
        assert_eq!(section.get(2, k(800.0)), NO_DATA);
        assert!(section.get(2, k(700.0)) > NO_DATA);
        assert!((0..section.z.len()).all(|k| section.get(3, k) == NO_DATA));

        assert!(matches!(
            line.profile_2d("thk", 0, ReadOptions::default()),
            Err(CfError::NotA3DVariable(_))
        ));
    }
    #[test]
    fn test_profile_2d_skips_fill_value_columns() {
        let fill = 9.96921e36;
        let thk_row = [1000.0, 800.0, 600.0, 0.0, fill];
        let thk: Vec<f64> = (0..3).flat_map(|_| thk_row).collect();
        let temp: Vec<f64> = (0..3).flat_map(|k| std::iter::repeat_n(-10.0 * k as f64, 15)).collect();
        let store = MemoryStore::new()
            .with_dimension("time", 1)
            .with_dimension("level", 3)
            .with_dimension("y1", 3)
            .with_dimension("x1", 5)
            .with_variable("time", &["time"], vec![0.0])
            .unwrap()
            .with_variable("level", &["level"], vec![0.0, 0.5, 1.0])
            .unwrap()
            .with_variable("x1", &["x1"], vec![0.0, 10000.0, 20000.0, 30000.0, 40000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![0.0, 10000.0, 20000.0])
            .unwrap()
            .with_variable("thk", &["time", "y1", "x1"], thk)
            .unwrap()
            .with_variable("topg", &["time", "y1", "x1"], vec![100.0; 15])
            .unwrap()
            .with_variable("temp", &["time", "level", "y1", "x1"], temp)
            .unwrap();
        let file = GridFile::from_store(Box::new(store), "filled.nc", &GridFileOptions::default()).unwrap();
        let line = across(&file);

        let section = line.profile_2d("temp", 0, ReadOptions::default()).unwrap();
        assert_eq!(section.z.first(), Some(&100.0));
        assert_eq!(section.z.last(), Some(&1100.0));
        assert_eq!(section.z.len(), 101);
        assert!((0..section.z.len()).all(|k| section.get(4, k) == NO_DATA));
        assert_eq!(section.get(0, 0), -20.0);
    }
}
