//! # CLI Module
//!
//! Command-line interface of `cfgrid`:
//! - Argument parsing with clap (derive API)
//! - Global verbosity and configuration file (`CFGRID_CONFIG`)
//! - Small value DSLs for points, regions and spot requests
//! - Subcommands for inspection, extraction, projection and file creation

use crate::error::CfResult;
use crate::extract::SpotRequest;
use crate::gridfile::GridFile;
use crate::timeindex::Round;
use crate::timeseries::TemperatureForm;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Projection, time-slice and profile toolkit for CF ice-sheet model output
#[derive(Parser, Debug)]
#[command(name = "cfgrid")]
#[command(about = "Inspect, project and extract data from CF ice-sheet grid files")]
#[command(version)]
#[command(long_about = "
cfgrid works with gridded NetCDF files that follow the CF conventions used by
ice-sheet models: x1/y1 axes in projected metres, a time axis in years, sigma
levels and a grid-mapping variable describing the map projection.

FEATURES:
  • Map projections: stereographic, polar stereographic, Lambert azimuthal
    equal-area, Albers equal-area conic and Lambert conformal conic
  • Time-slice lookup with nearest/up/down rounding
  • Ice volume, area and basal melt statistics
  • Profiles along polylines, spot time series and vertical sections
  • Relative sea-level residuals against an observation database
  • Parquet or tab-separated output, JSON/YAML configuration

EXAMPLES:
  # File summary
  cfgrid info greenland.nc

  # Ice statistics at -21 ka
  cfgrid stats greenland.nc -t -21

  # Volume and area time series
  cfgrid extract-ts greenland.nc volume.parquet --volume --area

  # Thickness profile between two geographic points
  cfgrid profile greenland.nc profile.dat -n thk --geographic \\
    --points '-50,65;-30,72'

  # Transform one point
  cfgrid project -J 'a-40/72' -- -45 70
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "CFGRID_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Control points of a profile, parsed from one `x,y;x,y` argument.
pub type Polyline = Vec<(f64, f64)>;

/// Region of interest, in projected or geographic coordinates.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RegionArgs {
    /// Lower-left corner in projected coordinates: X,Y
    #[arg(long, value_name = "X,Y", value_parser = parse_pair, allow_hyphen_values = true)]
    pub llx: Option<(f64, f64)>,

    /// Upper-right corner in projected coordinates: X,Y
    #[arg(long, value_name = "X,Y", value_parser = parse_pair, allow_hyphen_values = true)]
    pub urx: Option<(f64, f64)>,

    /// Lower-left corner in geographic coordinates: LON,LAT
    #[arg(long, value_name = "LON,LAT", value_parser = parse_pair, allow_hyphen_values = true, conflicts_with = "llx")]
    pub llg: Option<(f64, f64)>,

    /// Upper-right corner in geographic coordinates: LON,LAT
    #[arg(long, value_name = "LON,LAT", value_parser = parse_pair, allow_hyphen_values = true, conflicts_with = "urx")]
    pub urg: Option<(f64, f64)>,
}

impl RegionArgs {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Sets the requested corners on `file`.
    pub fn apply(&self, file: &mut GridFile) -> CfResult<()> {
        if let Some(xy) = self.llx {
            file.set_ll_xy(xy)?;
        }
        if let Some(xy) = self.urx {
            file.set_ur_xy(xy)?;
        }
        if let Some(lonlat) = self.llg {
            file.set_ll_geo(lonlat)?;
        }
        if let Some(lonlat) = self.urg {
            file.set_ur_geo(lonlat)?;
        }
        Ok(())
    }
}

/// Model time selection.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct TimeArgs {
    /// Model time in scaled units (ka by default); last slice when omitted
    #[arg(short, long, allow_hyphen_values = true)]
    pub time: Option<f64>,

    /// Rounding between time slices: n(earest), u(p), d(own)
    #[arg(long, value_parser = parse_round)]
    pub round: Option<Round>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show information about a grid file
    #[command(long_about = "
Inspect a CF grid file and display its structure.

Reports global metadata, dimensions, variables with units and long names,
the grid mapping (as GMT and PROJ strings), the time span and the bounding
box in projected and geographic coordinates.

EXAMPLES:
  cfgrid info greenland.nc
  cfgrid info greenland.nc --format json
  cfgrid info greenland.nc --llg=-60,60 --urg=-20,80
")]
    Info {
        /// Grid file path
        file: PathBuf,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        #[command(flatten)]
        region: RegionArgs,
    },

    /// Print ice volume, area and melt statistics
    #[command(long_about = "
Compute whole-grid ice statistics for one or more grid files.

Volume is reported in 10^6 km^3, area in 10^6 km^2 and the melt fraction as
the share of the ice-covered area with basal melting. With several files the
values are also given relative to the last file.

EXAMPLES:
  cfgrid stats run.nc
  cfgrid stats run_a.nc run_b.nc reference.nc -t -21
  cfgrid stats eismint.nc --eismint --output-format json
")]
    Stats {
        /// Grid files; the last one is the reference
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        time: TimeArgs,

        /// Also report divide thickness and basal temperature
        #[arg(long)]
        eismint: bool,
    },

    /// Extract time series into a table
    #[command(long_about = "
Extract time series of whole-grid statistics, spot values and the ice margin
position along a profile. Every time slice of the file becomes one row.

Spot requests have the form VARIABLE:I:J or VARIABLE:I:J:LEVEL where I and J
are grid node indices along x and y.

EXAMPLES:
  cfgrid extract-ts run.nc stats.parquet --volume --area --melt
  cfgrid extract-ts run.nc spots.dat --spot thk:40:60 --spot temp:40:60:10
  cfgrid extract-ts run.nc margin.dat --extent --points '0,0;500000,0'
")]
    ExtractTs {
        /// Grid file path
        file: PathBuf,

        /// Output table (.parquet, or .csv/.dat/.txt/.tsv for text)
        output: PathBuf,

        /// Ice volume (10^6 km^3)
        #[arg(long)]
        volume: bool,

        /// Ice area (10^6 km^2)
        #[arg(long)]
        area: bool,

        /// Basal melt fraction
        #[arg(long)]
        melt: bool,

        /// Ice margin position along --points
        #[arg(long, requires = "points")]
        extent: bool,

        /// Spot value: VARIABLE:I:J[:LEVEL]
        #[arg(long = "spot", value_parser = parse_spot)]
        spots: Vec<SpotRequest>,

        /// Profile control points for --extent: X,Y;X,Y;...
        #[arg(long, value_parser = parse_points, allow_hyphen_values = true)]
        points: Option<Polyline>,

        /// Control points are longitude,latitude
        #[arg(long)]
        geographic: bool,

        /// Profile sampling interval in metres
        #[arg(long)]
        interval: Option<f64>,

        /// Correct temperatures for the pressure melting point
        #[arg(long)]
        pmt: bool,
    },

    /// Sample variables along a profile
    #[command(long_about = "
Resample a polyline at a constant step, clip it to the grid and sample one or
more variables along it. With --section, a vertical section of a 3D variable
is written instead (distance, elevation, value).

EXAMPLES:
  cfgrid profile run.nc thk.parquet -n thk -n topg --points '0,0;400000,300000'
  cfgrid profile run.nc p.dat -n is --geographic --points '-50,65;-30,72' -t -10
  cfgrid profile run.nc section.parquet --section temp --pmt --points '0,0;400000,0'
")]
    Profile {
        /// Grid file path
        file: PathBuf,

        /// Output table (.parquet, or .csv/.dat/.txt/.tsv for text)
        output: PathBuf,

        /// Variables to sample (names ending in _avg are vertical averages)
        #[arg(short = 'n', long = "variable", required_unless_present = "section")]
        variables: Vec<String>,

        /// Vertical section of this 3D variable
        #[arg(long, conflicts_with = "variables")]
        section: Option<String>,

        /// Control points: X,Y;X,Y;...
        #[arg(long, value_parser = parse_points, allow_hyphen_values = true)]
        points: Polyline,

        /// Control points are longitude,latitude
        #[arg(long)]
        geographic: bool,

        /// Sampling interval in metres
        #[arg(long)]
        interval: Option<f64>,

        #[command(flatten)]
        time: TimeArgs,

        /// Sigma level of 3D variables
        #[arg(long, default_value_t = 0)]
        level: usize,

        /// Correct temperatures for the pressure melting point
        #[arg(long)]
        pmt: bool,
    },

    /// Compare modelled and observed relative sea level
    #[command(long_about = "
Compute modelled minus observed relative sea level for every observation at
every location of the database that lies inside the grid region. The model
value is interpolated linearly in time.

EXAMPLES:
  cfgrid rsl run.nc rsl.json residuals.parquet
  cfgrid rsl run.nc rsl.yaml residuals.dat --llg=-70,55 --urg=-10,80
")]
    Rsl {
        /// Grid file path
        file: PathBuf,

        /// RSL observation database (JSON or YAML)
        database: PathBuf,

        /// Output table
        output: PathBuf,

        #[command(flatten)]
        region: RegionArgs,
    },

    /// Add grid-mapping information to a file
    #[command(long_about = "
Add a 'mapping' variable to an existing CF file and tag every (y1, x1)
variable with it. The false easting/northing are chosen so that the given
geographic origin maps to projected (0, 0). Files that already carry a
mapping variable are left unchanged.

EXAMPLES:
  cfgrid add-proj run.nc -J 'a-40/72' --origin=-60/58
  cfgrid add-proj run.nc -J 'b-40/72/60/80' --origin=-60/58
")]
    AddProj {
        /// Grid file to modify
        file: PathBuf,

        /// GMT projection: a|b|l|s LON0/LAT0[/...]
        #[arg(short = 'J', long)]
        projection: String,

        /// Geographic origin: LON/LAT
        #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
        origin: (f64, f64),
    },

    /// Transform a single point
    #[command(long_about = "
Project a geographic point, or unproject a projected point with --inverse.

EXAMPLES:
  cfgrid project -J 'a-40/72' -- -45 70
  cfgrid project -J 's-39/90' --inverse 100000 -2000000
")]
    Project {
        /// GMT projection: a|b|l|s LON0/LAT0[/...]
        #[arg(short = 'J', long)]
        projection: String,

        /// Projected to geographic
        #[arg(long)]
        inverse: bool,

        #[arg(allow_hyphen_values = true)]
        x: f64,

        #[arg(allow_hyphen_values = true)]
        y: f64,
    },

    /// Create an empty CF grid file
    #[command(long_about = "
Create a CF grid file with coordinate axes, an unlimited time dimension,
optional sigma levels, an optional grid mapping and the requested variables
taken from the variable definition table.

EXAMPLES:
  cfgrid create new.nc --origin=-800000,-3400000 --delta 20000,20000 \\
    --size 80,140 -n thk -n topg -J 's-39/90'
  cfgrid create new.nc --origin 0,0 --delta 1000,1000 --size 61,61 \\
    --levels 11 -n temp --title 'EISMINT test'
")]
    Create {
        /// File to create
        output: PathBuf,

        /// Projected coordinates of the first node: X,Y
        #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
        origin: (f64, f64),

        /// Node spacing: DX,DY
        #[arg(long, value_parser = parse_pair)]
        delta: (f64, f64),

        /// Grid size: NX,NY
        #[arg(long, value_parser = parse_size)]
        size: (usize, usize),

        /// Number of evenly spaced sigma levels
        #[arg(long)]
        levels: Option<usize>,

        /// Variables to define
        #[arg(short = 'n', long = "variable")]
        variables: Vec<String>,

        /// GMT projection: a|b|l|s LON0/LAT0[/...]
        #[arg(short = 'J', long)]
        projection: Option<String>,

        /// Value of the title attribute
        #[arg(long)]
        title: Option<String>,
    },

    /// Convert a forcing time series to a table
    #[command(long_about = "
Read a plain-text forcing time series (time followed by data columns, '#'
comments) and write it as a table. EIS temperature coefficients can be reduced
to a single temperature column at a latitude.

EXAMPLES:
  cfgrid forcing specmap.data slc.parquet
  cfgrid forcing eis.data temp.dat --eis-latitude 65 --form exp
")]
    Forcing {
        /// Time series text file
        input: PathBuf,

        /// Output table
        output: PathBuf,

        /// Column separator; whitespace when omitted ('tab' for tabs)
        #[arg(long, value_parser = parse_separator)]
        separator: Option<char>,

        /// Reduce EIS temperature coefficients at this latitude
        #[arg(long, allow_hyphen_values = true)]
        eis_latitude: Option<f64>,

        /// EIS temperature form: poly or exp
        #[arg(long, default_value = "poly", value_parser = parse_form)]
        form: TemperatureForm,
    },

    /// Generate configuration templates
    #[command(long_about = "
Generate templates for the toolkit configuration or the variable definition
table, in JSON or YAML.

EXAMPLES:
  cfgrid template config --format yaml > cfgrid.yaml
  cfgrid template variables -o variables.json
  CFGRID_CONFIG=cfgrid.yaml cfgrid info run.nc
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish and PowerShell.

EXAMPLES:
  cfgrid completions bash > ~/.bash_completion.d/cfgrid
  cfgrid completions zsh -o _cfgrid
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Info { .. } => "info",
            Commands::Stats { .. } => "stats",
            Commands::ExtractTs { .. } => "extract-ts",
            Commands::Profile { .. } => "profile",
            Commands::Rsl { .. } => "rsl",
            Commands::AddProj { .. } => "add-proj",
            Commands::Project { .. } => "project",
            Commands::Create { .. } => "create",
            Commands::Forcing { .. } => "forcing",
            Commands::Template { .. } => "template",
            Commands::Completions { .. } => "completions",
        }
    }

    /// Commands whose stdout is data rather than progress messages.
    pub fn prints_data(&self) -> bool {
        matches!(
            self,
            Commands::Info { .. }
                | Commands::Stats { .. }
                | Commands::Project { .. }
                | Commands::Template { .. }
                | Commands::Completions { .. }
        )
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Toolkit configuration
    Config,
    /// Variable definition table
    Variables,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// Parse a coordinate pair
/// Format: A,B or A/B
pub fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split([',', '/']).collect();
    if parts.len() != 2 {
        return Err(format!("Expected a pair 'A,B' or 'A/B', got '{}'", s));
    }
    let a = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{}'", parts[0]))?;
    let b = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid number '{}'", parts[1]))?;
    Ok((a, b))
}

/// Parse profile control points
/// Format: x,y;x,y;...
pub fn parse_points(s: &str) -> Result<Polyline, String> {
    let points = s
        .split(';')
        .filter(|p| !p.trim().is_empty())
        .map(parse_pair)
        .collect::<Result<Vec<_>, _>>()?;
    if points.len() < 2 {
        return Err("A profile needs at least two control points".to_string());
    }
    Ok(points)
}

/// Parse a spot request
/// Format: variable:i:j[:level]
pub fn parse_spot(s: &str) -> Result<SpotRequest, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if !(3..=4).contains(&parts.len()) || parts[0].is_empty() {
        return Err("Spot must be in format 'variable:i:j' or 'variable:i:j:level'".to_string());
    }
    let index = |p: &str, what: &str| {
        p.trim()
            .parse::<usize>()
            .map_err(|_| format!("Invalid {} index '{}' in spot", what, p))
    };
    Ok(SpotRequest {
        variable: parts[0].to_string(),
        node: (index(parts[1], "i")?, index(parts[2], "j")?),
        level: match parts.get(3) {
            Some(l) => index(l, "level")?,
            None => 0,
        },
    })
}

fn parse_round(s: &str) -> Result<Round, String> {
    s.parse::<Round>().map_err(|e| e.to_string())
}

fn parse_form(s: &str) -> Result<TemperatureForm, String> {
    s.parse::<TemperatureForm>().map_err(|e| e.to_string())
}

/// Parse a grid size
/// Format: nx,ny
fn parse_size(s: &str) -> Result<(usize, usize), String> {
    let (nx, ny) = parse_pair(s)?;
    if nx < 2.0 || ny < 2.0 || nx.fract() != 0.0 || ny.fract() != 0.0 {
        return Err(format!("Grid size must be two integers of at least 2, got '{}'", s));
    }
    Ok((nx as usize, ny as usize))
}

fn parse_separator(s: &str) -> Result<char, String> {
    match s {
        "tab" | "\\t" => Ok('\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("Separator must be a single character, got '{}'", s)),
            }
        }
    }
}
