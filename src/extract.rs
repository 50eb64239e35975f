//! # Table Extraction
//!
//! Assembles grid-file quantities into Polars DataFrames: whole-grid
//! statistics over time, spot values at grid nodes, sampled profiles,
//! vertical sections and RSL residuals. The tables are written by
//! [`crate::output::write_dataframe`].
//!
//! Per-time-slice loops report to an [`indicatif::ProgressBar`]; pass
//! `ProgressBar::hidden()` when no progress display is wanted.

use crate::error::{CfError, CfResult};
use crate::field::ReadOptions;
use crate::gridfile::{GridFile, SliceSelection};
use crate::profile::ProfileLine;
use crate::rsl::RslResidual;
use crate::timeseries::TimeSeries;
use indicatif::ProgressBar;
use log::debug;
use polars::prelude::*;

/// Value of `var` at grid node `(i, j)` and `level`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotRequest {
    pub variable: String,
    pub node: (usize, usize),
    pub level: usize,
}

impl SpotRequest {
    pub fn column_name(&self) -> String {
        format!("{}_{}_{}", self.variable, self.node.0, self.node.1)
    }
}

/// Columns of a time-series table. The time column is always present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesRequest {
    pub volume: bool,
    pub area: bool,
    pub melt: bool,
    /// Ice margin position along the profile passed to [`time_series_table`].
    pub extent: bool,
    pub spots: Vec<SpotRequest>,
}

impl SeriesRequest {
    pub fn is_empty(&self) -> bool {
        !(self.volume || self.area || self.melt || self.extent) && self.spots.is_empty()
    }
}

fn column(name: &str, values: Vec<f64>) -> Column {
    Series::new(name.into(), values).into()
}

/// Volume (10^6 km^3), area (10^6 km^2) and melt fraction per time slice.
/// With `eismint`, the divide thickness and basal temperature follow.
pub fn stats_table(
    file: &GridFile,
    selection: SliceSelection,
    eismint: bool,
    progress: &ProgressBar,
) -> CfResult<DataFrame> {
    let slices = selection.resolve(file.num_times())?;
    progress.set_length(slices.len() as u64);

    let mut time = Vec::with_capacity(slices.len());
    let mut volume = Vec::with_capacity(slices.len());
    let mut area = Vec::with_capacity(slices.len());
    let mut melt = Vec::with_capacity(slices.len());
    let mut divide_thk = Vec::new();
    let mut divide_temp = Vec::new();
    for t in slices {
        let stats = file.stats(t, eismint)?;
        time.push(stats.time);
        volume.push(stats.volume);
        area.push(stats.area);
        melt.push(stats.melt_fraction);
        if eismint {
            divide_thk.push(stats.divide_thickness.unwrap_or(f64::NAN));
            divide_temp.push(stats.divide_basal_temperature.unwrap_or(f64::NAN));
        }
        progress.inc(1);
    }

    let mut columns = vec![
        column("time", time),
        column("ice_volume", volume),
        column("ice_area", area),
        column("melt_fraction", melt),
    ];
    if eismint {
        columns.push(column("divide_thickness", divide_thk));
        columns.push(column("divide_basal_temperature", divide_temp));
    }
    Ok(DataFrame::new(columns)?)
}

/// Time series of the requested quantities. `profile` is required when the
/// ice extent is requested.
pub fn time_series_table(
    file: &GridFile,
    selection: SliceSelection,
    request: &SeriesRequest,
    profile: Option<&ProfileLine<'_>>,
    options: ReadOptions,
    progress: &ProgressBar,
) -> CfResult<DataFrame> {
    if request.is_empty() {
        return Err(CfError::InvalidSelection("no time series requested".to_string()));
    }
    if request.extent && profile.is_none() {
        return Err(CfError::InvalidProfileInput(
            "ice extent needs a profile".to_string(),
        ));
    }
    let slices = selection.resolve(file.num_times())?;
    progress.set_length(slices.len() as u64);

    let fields = request
        .spots
        .iter()
        .map(|s| file.variable(&s.variable))
        .collect::<CfResult<Vec<_>>>()?;

    let mut time = Vec::with_capacity(slices.len());
    let mut volume = Vec::new();
    let mut area = Vec::new();
    let mut melt = Vec::new();
    let mut extent = Vec::new();
    let mut spots: Vec<Vec<f64>> = vec![Vec::with_capacity(slices.len()); fields.len()];
    for t in slices {
        time.push(file.time(t)?);
        if request.volume {
            volume.extend(file.ice_volume(SliceSelection::Single(t), 1e-15)?);
        }
        if request.area {
            area.extend(file.ice_area(SliceSelection::Single(t), 1e-12)?);
        }
        if request.melt {
            melt.extend(file.melt_fraction(SliceSelection::Single(t), 1.0)?);
        }
        if request.extent
            && let Some(line) = profile
        {
            extent.push(line.ice_extent(t)?.distance());
        }
        for ((field, spot), values) in fields.iter().zip(&request.spots).zip(spots.iter_mut()) {
            values.extend(field.spot(
                spot.node,
                SliceSelection::Single(t),
                SliceSelection::Single(spot.level),
                options,
            )?);
        }
        progress.inc(1);
    }

    let mut columns = vec![column("time", time)];
    if request.volume {
        columns.push(column("ice_volume", volume));
    }
    if request.area {
        columns.push(column("ice_area", area));
    }
    if request.melt {
        columns.push(column("melt_fraction", melt));
    }
    if request.extent {
        columns.push(column("ice_extent", extent));
    }
    for (spot, values) in request.spots.iter().zip(spots) {
        columns.push(column(&spot.column_name(), values));
    }
    debug!("{}: time series with {} columns", file.name(), columns.len());
    Ok(DataFrame::new(columns)?)
}

/// Sampled variables along a profile: distance, projected position,
/// geographic position when the file has a projection, then one column per
/// variable.
pub fn profile_table(
    line: &ProfileLine<'_>,
    variables: &[String],
    time: usize,
    level: usize,
    options: ReadOptions,
) -> CfResult<DataFrame> {
    let points = line.points();
    let mut columns = vec![
        column("distance", line.xvalues().to_vec()),
        column("x", points.iter().map(|p| p.0).collect()),
        column("y", points.iter().map(|p| p.1).collect()),
    ];
    if let Ok(projection) = line.file().projection() {
        let geo = projection.project_points(points, true)?;
        columns.push(column("longitude", geo.iter().map(|p| p.0).collect()));
        columns.push(column("latitude", geo.iter().map(|p| p.1).collect()));
    }
    for var in variables {
        let values = line.sample(var, time, level, options)?;
        columns.push(column(var, values.as_ref().clone()));
    }
    Ok(DataFrame::new(columns)?)
}

/// Vertical section of a 3D variable in long format (distance, elevation,
/// value). Cells outside the ice are dropped.
pub fn section_table(
    line: &ProfileLine<'_>,
    variable: &str,
    time: usize,
    options: ReadOptions,
) -> CfResult<DataFrame> {
    let section = line.profile_2d(variable, time, options)?;
    let mut distance = Vec::new();
    let mut elevation = Vec::new();
    let mut values = Vec::new();
    for (i, &x) in section.x.iter().enumerate() {
        for (k, &z) in section.z.iter().enumerate() {
            let v = section.get(i, k);
            if v != crate::profile::NO_DATA {
                distance.push(x);
                elevation.push(z);
                values.push(v);
            }
        }
    }
    Ok(DataFrame::new(vec![
        column("distance", distance),
        column("elevation", elevation),
        column(variable, values),
    ])?)
}

/// A forcing series as a table: `time` followed by one named column per
/// data column.
pub fn forcing_table(series: &TimeSeries, names: &[String]) -> CfResult<DataFrame> {
    if names.len() != series.columns() {
        return Err(CfError::DimensionMismatch(format!(
            "{} column names for {} data columns",
            names.len(),
            series.columns()
        )));
    }
    let mut columns = vec![column("time", series.times().to_vec())];
    for (c, name) in names.iter().enumerate() {
        columns.push(column(name, series.column(c)?));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn rsl_table(residuals: &[RslResidual]) -> CfResult<DataFrame> {
    let ids: Vec<u32> = residuals.iter().map(|r| r.location_id).collect();
    let pick = |f: fn(&RslResidual) -> f64| residuals.iter().map(f).collect::<Vec<f64>>();
    Ok(DataFrame::new(vec![
        Series::new("location_id".into(), ids).into(),
        column("longitude", pick(|r| r.longitude)),
        column("latitude", pick(|r| r.latitude)),
        column("time", pick(|r| r.time)),
        column("observed", pick(|r| r.observed)),
        column("modelled", pick(|r| r.modelled)),
        column("residual", pick(|r| r.residual)),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridfile::GridFileOptions;
    use crate::profile::ProfileOptions;
    use crate::store::MemoryStore;

    /// 4x3 grid at 10 km spacing with 2 time slices of uniform ice.
    fn sample() -> GridFile {
        let (nx, ny) = (4, 3);
        let thk: Vec<f64> = (0..2)
            .flat_map(|t| {
                (0..nx * ny).map(move |n| if t == 0 { 0.0 } else { 100.0 + n as f64 })
            })
            .collect();
        let bmlt: Vec<f64> = (0..2 * nx * ny).map(|n| if n % 2 == 0 { 0.1 } else { 0.0 }).collect();
        let store = MemoryStore::new()
            .with_dimension("x1", nx)
            .with_dimension("y1", ny)
            .with_dimension("time", 2)
            .with_variable("x1", &["x1"], vec![0.0, 10_000.0, 20_000.0, 30_000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![0.0, 10_000.0, 20_000.0])
            .unwrap()
            .with_variable("time", &["time"], vec![-1000.0, 0.0])
            .unwrap()
            .with_variable("thk", &["time", "y1", "x1"], thk)
            .unwrap()
            .with_variable("bmlt", &["time", "y1", "x1"], bmlt)
            .unwrap();
        GridFile::from_store(Box::new(store), "sample", &GridFileOptions::default()).unwrap()
    }

    #[test]
    fn test_stats_table() {
        let file = sample();
        let df = stats_table(&file, SliceSelection::All, false, &ProgressBar::hidden()).unwrap();
        assert_eq!(df.shape(), (2, 4));
        let time = df.column("time").unwrap().f64().unwrap();
        assert_eq!(time.get(0), Some(-1.0));
        let area = df.column("ice_area").unwrap().f64().unwrap();
        assert_eq!(area.get(0), Some(0.0));
        assert!((area.get(1).unwrap() - 12.0 * 1e8 * 1e-12).abs() < 1e-12);
    }

    #[test]
    fn test_time_series_with_spots() {
        let file = sample();
        let request = SeriesRequest {
            volume: true,
            spots: vec![SpotRequest {
                variable: "thk".to_string(),
                node: (1, 2),
                level: 0,
            }],
            ..Default::default()
        };
        let df = time_series_table(
            &file,
            SliceSelection::All,
            &request,
            None,
            ReadOptions::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(df.shape(), (2, 3));
        let spot = df.column("thk_1_2").unwrap().f64().unwrap();
        assert_eq!(spot.get(0), Some(0.0));
        // row-major (y, x): j=2, i=1 -> n = 2 * 4 + 1
        assert_eq!(spot.get(1), Some(109.0));
    }

    #[test]
    fn test_time_series_request_errors() {
        let file = sample();
        let pb = ProgressBar::hidden();
        let empty = SeriesRequest::default();
        assert!(time_series_table(&file, SliceSelection::All, &empty, None, ReadOptions::default(), &pb).is_err());

        let extent = SeriesRequest {
            extent: true,
            ..Default::default()
        };
        assert!(matches!(
            time_series_table(&file, SliceSelection::All, &extent, None, ReadOptions::default(), &pb),
            Err(CfError::InvalidProfileInput(_))
        ));
    }

    #[test]
    fn test_extent_series() {
        let file = sample();
        let line = ProfileLine::new(
            &file,
            &[(0.0, 10_000.0), (30_000.0, 10_000.0)],
            &ProfileOptions::default(),
        )
        .unwrap();
        let request = SeriesRequest {
            extent: true,
            ..Default::default()
        };
        let df = time_series_table(
            &file,
            SliceSelection::All,
            &request,
            Some(&line),
            ReadOptions::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let extent = df.column("ice_extent").unwrap().f64().unwrap();
        assert_eq!(extent.get(0), Some(0.0));
        assert_eq!(extent.get(1), Some(30.0));
    }

    #[test]
    fn test_profile_table_without_projection() {
        let file = sample();
        let line = ProfileLine::new(
            &file,
            &[(0.0, 0.0), (20_000.0, 0.0)],
            &ProfileOptions::default(),
        )
        .unwrap();
        let df = profile_table(&line, &["thk".to_string()], 1, 0, ReadOptions::default()).unwrap();
        assert_eq!(df.shape(), (3, 4));
        assert!(df.column("longitude").is_err());
        let thk = df.column("thk").unwrap().f64().unwrap();
        assert_eq!(thk.get(0), Some(100.0));
        assert_eq!(thk.get(2), Some(102.0));
    }

    #[test]
    fn test_forcing_table() {
        let series = TimeSeries::parse("-1000 -50.0 1.0\n0 0.0 2.0\n", None, 0.001).unwrap();
        let names = vec!["slc".to_string(), "weight".to_string()];
        let df = forcing_table(&series, &names).unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("time").unwrap().f64().unwrap().get(0), Some(-1.0));
        assert_eq!(df.column("slc").unwrap().f64().unwrap().get(0), Some(-50.0));
        assert!(matches!(
            forcing_table(&series, &names[..1]),
            Err(CfError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_rsl_table() {
        let residuals = vec![RslResidual {
            location_id: 3,
            longitude: -20.0,
            latitude: 70.0,
            time: -8.0,
            observed: 12.0,
            modelled: 10.0,
            residual: -2.0,
        }];
        let df = rsl_table(&residuals).unwrap();
        assert_eq!(df.shape(), (1, 7));
        assert_eq!(df.column("location_id").unwrap().u32().unwrap().get(0), Some(3));
        assert!(rsl_table(&[]).unwrap().is_empty());
    }
}
