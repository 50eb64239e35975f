//! # cfgrid
//!
//! A Rust toolkit for gridded NetCDF output of ice-sheet models that follows
//! the CF conventions.
//!
//! ## Features
//!
//! - **Map projections**: CF grid mappings (stereographic, polar
//!   stereographic, Lambert azimuthal equal-area, Albers and Lambert
//!   conformal conic) with forward/inverse transforms and GMT strings
//! - **Time slices**: bisection lookup with nearest/up/down rounding
//! - **Field reconstruction**: 2D slices of 3D sigma-coordinate fields with
//!   sea-level and pressure-melting-point corrections, vertical averages and
//!   the derived ice surface elevation
//! - **Profiles**: constant-step resampling of polylines, sampling along the
//!   path, vertical sections and the ice margin position
//! - **Statistics and tables**: ice volume, area, melt fraction, spot series
//!   and RSL residuals as Polars DataFrames written to Parquet or text
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cfgrid::field::ReadOptions;
//! use cfgrid::gridfile::{GridFile, GridFileOptions};
//! use cfgrid::profile::{ProfileLine, ProfileOptions};
//! use cfgrid::timeindex::Round;
//!
//! let file = GridFile::open("greenland.nc", &GridFileOptions::default())?;
//! let t = file.timeslice(-21.0, Round::Nearest)?;
//! let options = ProfileOptions { projected: false, ..Default::default() };
//! let line = ProfileLine::new(&file, &[(-50.0, 65.0), (-30.0, 72.0)], &options)?;
//! let thickness = line.sample("thk", t, 0, ReadOptions::default())?;
//! println!("{} samples, margin at {:?}", thickness.len(), line.ice_extent(t)?);
//! # Ok::<(), cfgrid::error::CfError>(())
//! ```

pub mod cli;
pub mod config;
pub mod createfile;
pub mod error;
pub mod extract;
pub mod field;
pub mod gridfile;
pub mod info;
pub mod log;
pub mod output;
pub mod profile;
pub mod projection;
pub mod rsl;
pub mod spline;
pub mod store;
pub mod timeindex;
pub mod timeseries;

#[cfg(test)]
mod tests;

use crate::cli::{Cli, Commands, ConfigFormat, OutputFormat, RegionArgs, TemplateType, TimeArgs};
use crate::config::ToolkitConfig;
use crate::createfile::{GridSpec, add_projection_info, create_cf_file};
use crate::error::{CfError, CfResult};
use crate::extract::SeriesRequest;
use crate::gridfile::{FileMetadata, GridFile, IceStats, SliceSelection};
use crate::log::progress_bar;
use crate::output::write_dataframe;
use crate::profile::{ProfileLine, ProfileOptions};
use crate::projection::{GridMapping, Projection};
use crate::rsl::{JsonRslStore, rsl_residuals};
use crate::timeseries::{TimeSeries, eis_temperature};
use anyhow::{Context, Result};
use clap::CommandFactory;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Loads the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<ToolkitConfig> {
    match path {
        Some(path) => ToolkitConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(ToolkitConfig::default()),
    }
}

/// Opens a grid file and applies the region flags.
pub fn open_grid(path: &Path, config: &ToolkitConfig, region: &RegionArgs) -> Result<GridFile> {
    let mut file = GridFile::open(path, &config.grid_options())
        .with_context(|| format!("Failed to open grid file {}", path.display()))?;
    region
        .apply(&mut file)
        .with_context(|| format!("Invalid region for {}", path.display()))?;
    Ok(file)
}

/// Slice index for the requested time; the last slice when none is given.
pub fn select_slice(file: &GridFile, time: &TimeArgs, config: &ToolkitConfig) -> CfResult<usize> {
    match time.time {
        Some(t) => file.timeslice(t, time.round.unwrap_or(config.round)),
        None => file
            .num_times()
            .checked_sub(1)
            .ok_or(CfError::TimeSliceOutOfRange { index: 0, len: 0 }),
    }
}

/// Executes one parsed command line.
pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Info { file, format, region } => {
            run_info(file, format.unwrap_or(cli.output_format), region, &config)
        }
        Commands::Stats { files, time, eismint } => {
            run_stats(files, time, *eismint, cli.output_format, &config)
        }
        Commands::ExtractTs {
            file,
            output,
            volume,
            area,
            melt,
            extent,
            spots,
            points,
            geographic,
            interval,
            pmt,
        } => {
            let request = SeriesRequest {
                volume: *volume,
                area: *area,
                melt: *melt,
                extent: *extent,
                spots: spots.clone(),
            };
            let profile = points
                .as_ref()
                .map(|p| (p.as_slice(), profile_options(&config, *geographic, *interval)));
            run_extract_ts(file, output, &request, profile, *pmt, cli.quiet, &config)
        }
        Commands::Profile {
            file,
            output,
            variables,
            section,
            points,
            geographic,
            interval,
            time,
            level,
            pmt,
        } => {
            let file = open_grid(file, &config, &RegionArgs::default())?;
            let options = profile_options(&config, *geographic, *interval);
            let line = ProfileLine::new(&file, points, &options).context("Failed to build profile")?;
            let t = select_slice(&file, time, &config)?;
            let read = field::ReadOptions {
                pmt: *pmt,
                ..config.read
            };
            let mut df = match section {
                Some(var) => extract::section_table(&line, var, t, read)?,
                None => extract::profile_table(&line, variables, t, *level, read)?,
            };
            write_dataframe(&mut df, output)?;
            ::log::info!("Wrote {} profile rows to {}", df.height(), output.display());
            Ok(())
        }
        Commands::Rsl {
            file,
            database,
            output,
            region,
        } => run_rsl(file, database, output, region, &config),
        Commands::AddProj {
            file,
            projection,
            origin,
        } => {
            let mapping = GridMapping::from_gmt(projection)?;
            if add_projection_info(file, &mapping, *origin)? {
                ::log::info!("Added {} projection to {}", mapping.grid_mapping_name, file.display());
            } else {
                ::log::warn!("{} already has a grid mapping, left unchanged", file.display());
            }
            Ok(())
        }
        Commands::Project {
            projection,
            inverse,
            x,
            y,
        } => run_project(projection, *inverse, (*x, *y), cli.output_format),
        Commands::Create {
            output,
            origin,
            delta,
            size,
            levels,
            variables,
            projection,
            title,
        } => {
            let grid = GridSpec {
                origin: *origin,
                delta: *delta,
                nx: size.0,
                ny: size.1,
                levels: sigma_levels(levels.unwrap_or(0)),
            };
            let metadata = FileMetadata {
                title: title.clone(),
                ..Default::default()
            };
            let mapping = projection.as_deref().map(GridMapping::from_gmt).transpose()?;
            run_create(output, &grid, &metadata, mapping.as_ref(), variables, &config)
        }
        Commands::Forcing {
            input,
            output,
            separator,
            eis_latitude,
            form,
        } => {
            let mut series = TimeSeries::from_file(input, *separator, config.timescale)
                .with_context(|| format!("Failed to read time series {}", input.display()))?;
            let names: Vec<String> = match eis_latitude {
                Some(latitude) => {
                    series = eis_temperature(&series, *latitude, *form)?;
                    vec!["temperature".to_string()]
                }
                None => (1..=series.columns()).map(|c| format!("value_{c}")).collect(),
            };
            let mut df = extract::forcing_table(&series, &names)?;
            write_dataframe(&mut df, output)?;
            ::log::info!("Wrote {} forcing records to {}", df.height(), output.display());
            Ok(())
        }
        Commands::Template {
            template_type,
            output,
            format,
        } => {
            let text = template(template_type, format, &config)?;
            write_text(output.as_deref(), &text)
        }
        Commands::Completions { shell, output } => {
            let mut buffer = Vec::new();
            clap_complete::generate(*shell, &mut Cli::command(), "cfgrid", &mut buffer);
            write_text(output.as_deref(), &String::from_utf8_lossy(&buffer))
        }
    }
}

fn profile_options(config: &ToolkitConfig, geographic: bool, interval: Option<f64>) -> ProfileOptions {
    ProfileOptions {
        projected: !geographic,
        interval: interval.unwrap_or(config.profile_interval),
        ..config.profile_options()
    }
}

/// `n` evenly spaced sigma levels from 0 to 1.
pub fn sigma_levels(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n).map(|k| k as f64 / (n - 1) as f64).collect(),
    }
}

fn write_text(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Human => Ok(false),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(value)?);
            Ok(true)
        }
    }
}

pub fn run_info(path: &Path, format: OutputFormat, region: &RegionArgs, config: &ToolkitConfig) -> Result<()> {
    let grid = open_grid(path, config, region)?;
    let summary = info::describe(path, &grid)?;
    match format {
        OutputFormat::Human => info::print_grid_info_human(&summary),
        OutputFormat::Json => info::print_grid_info_json(&summary)?,
        OutputFormat::Yaml => info::print_grid_info_yaml(&summary)?,
    }
    Ok(())
}

/// Statistics of one file, optionally relative to a reference file.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub file: PathBuf,
    #[serde(flatten)]
    pub stats: IceStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative: Option<RelativeStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelativeStats {
    pub volume: f64,
    pub area: f64,
    pub melt_fraction: f64,
}

impl RelativeStats {
    fn new(stats: &IceStats, reference: &IceStats) -> Self {
        let ratio = |a: f64, b: f64| if b == 0.0 { f64::NAN } else { a / b };
        Self {
            volume: ratio(stats.volume, reference.volume),
            area: ratio(stats.area, reference.area),
            melt_fraction: ratio(stats.melt_fraction, reference.melt_fraction),
        }
    }
}

/// Statistics per file at the selected time. With more than one file, every
/// report carries ratios to the last one.
pub fn collect_stats(
    files: &[PathBuf],
    time: &TimeArgs,
    eismint: bool,
    config: &ToolkitConfig,
) -> Result<Vec<StatsReport>> {
    let mut reports = files
        .iter()
        .map(|path| -> Result<StatsReport> {
            let grid = open_grid(path, config, &RegionArgs::default())?;
            let t = select_slice(&grid, time, config)?;
            let stats = grid
                .stats(t, eismint)
                .with_context(|| format!("Failed to compute statistics for {}", path.display()))?;
            Ok(StatsReport {
                file: path.clone(),
                stats,
                relative: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if reports.len() > 1
        && let Some(reference) = reports.last().map(|r| r.stats)
    {
        for report in &mut reports {
            report.relative = Some(RelativeStats::new(&report.stats, &reference));
        }
    }
    Ok(reports)
}

fn run_stats(
    files: &[PathBuf],
    time: &TimeArgs,
    eismint: bool,
    format: OutputFormat,
    config: &ToolkitConfig,
) -> Result<()> {
    let reports = collect_stats(files, time, eismint, config)?;
    if print_structured(&reports, format)? {
        return Ok(());
    }
    println!(
        "{:<32} {:>10} {:>12} {:>12} {:>8}",
        "file", "time", "volume", "area", "melt"
    );
    for report in &reports {
        let s = &report.stats;
        println!(
            "{:<32} {:>10.3} {:>12.5} {:>12.5} {:>8.4}",
            report.file.display(),
            s.time,
            s.volume,
            s.area,
            s.melt_fraction
        );
        if let Some(r) = &report.relative {
            println!(
                "{:<32} {:>10} {:>11.1}% {:>11.1}% {:>7.1}%",
                "  relative",
                "",
                100.0 * r.volume,
                100.0 * r.area,
                100.0 * r.melt_fraction
            );
        }
        if let (Some(h), Some(tb)) = (s.divide_thickness, s.divide_basal_temperature) {
            println!("{:<32} thickness {:.2} m, basal temperature {:.3}", "  divide", h, tb);
        }
    }
    Ok(())
}

fn run_extract_ts(
    path: &Path,
    output: &Path,
    request: &SeriesRequest,
    profile: Option<(&[(f64, f64)], ProfileOptions)>,
    pmt: bool,
    quiet: bool,
    config: &ToolkitConfig,
) -> Result<()> {
    let file = open_grid(path, config, &RegionArgs::default())?;
    let line = match &profile {
        Some((points, options)) => {
            Some(ProfileLine::new(&file, points, options).context("Failed to build profile")?)
        }
        None => None,
    };
    let read = field::ReadOptions { pmt, ..config.read };
    let pb = progress_bar("extract-ts", file.num_times() as u64, quiet);
    let mut df = extract::time_series_table(&file, SliceSelection::All, request, line.as_ref(), read, &pb)?;
    pb.finish_and_clear();
    write_dataframe(&mut df, output)?;
    ::log::info!("Wrote {} time slices to {}", df.height(), output.display());
    Ok(())
}

fn run_rsl(path: &Path, database: &Path, output: &Path, region: &RegionArgs, config: &ToolkitConfig) -> Result<()> {
    let file = open_grid(path, config, region)?;
    let store = JsonRslStore::from_file(database)
        .with_context(|| format!("Failed to load RSL database {}", database.display()))?;
    let residuals = rsl_residuals(&file, &store)?;
    if residuals.is_empty() {
        ::log::warn!("No RSL observations fall inside {}", path.display());
    }
    let mut df = extract::rsl_table(&residuals)?;
    write_dataframe(&mut df, output)?;
    ::log::info!("Wrote {} residuals to {}", residuals.len(), output.display());
    Ok(())
}

#[derive(Debug, Serialize)]
struct ProjectedPoint {
    input: (f64, f64),
    output: (f64, f64),
    inverse: bool,
}

fn run_project(spec: &str, inverse: bool, point: (f64, f64), format: OutputFormat) -> Result<()> {
    let projection = Projection::from_grid_mapping(&GridMapping::from_gmt(spec)?)?;
    let result = projection.project(point, inverse)?;
    let report = ProjectedPoint {
        input: point,
        output: result,
        inverse,
    };
    if !print_structured(&report, format)? {
        println!("{} {}", result.0, result.1);
    }
    Ok(())
}

fn run_create(
    output: &Path,
    grid: &GridSpec,
    metadata: &FileMetadata,
    mapping: Option<&GridMapping>,
    variables: &[String],
    config: &ToolkitConfig,
) -> Result<()> {
    let definitions = config.definitions()?;
    let mut writer = create_cf_file(output, &definitions, grid, metadata, mapping)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    for var in variables {
        writer.add_variable(var)?;
    }
    writer.close()?;
    ::log::info!(
        "Created {} ({}x{} nodes, {} variables)",
        output.display(),
        grid.nx,
        grid.ny,
        variables.len()
    );
    Ok(())
}

fn template(kind: &TemplateType, format: &ConfigFormat, config: &ToolkitConfig) -> Result<String> {
    let text = match (kind, format) {
        (TemplateType::Config, ConfigFormat::Json) => ToolkitConfig::default().to_json()?,
        (TemplateType::Config, ConfigFormat::Yaml) => ToolkitConfig::default().to_yaml()?,
        (TemplateType::Variables, ConfigFormat::Json) => config.definitions()?.to_json()?,
        (TemplateType::Variables, ConfigFormat::Yaml) => config.definitions()?.to_yaml()?,
    };
    Ok(text)
}
