//! Cross-module tests: files written to disk with the CF writer and read
//! back through the grid, profile, statistics and command layers.

use crate::cli::{Cli, RegionArgs, TimeArgs};
use crate::config::ToolkitConfig;
use crate::createfile::{GridSpec, VariableDefinitions, add_projection_info, create_cf_file};
use crate::field::ReadOptions;
use crate::gridfile::{FileMetadata, GridFile, GridFileOptions};
use crate::profile::{IceExtent, ProfileLine, ProfileOptions};
use crate::projection::GridMapping;
use crate::store::MemoryStore;
use crate::timeindex::Round;
use crate::{collect_stats, load_config, open_grid, run, select_slice};
use clap::Parser;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const SPACING: f64 = 10000.0;
const CELL_AREA: f64 = SPACING * SPACING;

/// Writes a 3x3 grid centred on projected (0, 0) with three slices at
/// 0, 1000 and 2000 years. Thickness is 0, 100 and 200 times `factor`
/// everywhere; the last slice melts at the three nodes of the first row and
/// `slc` goes -10, -6, 0.
fn write_sample_grid(path: &Path, factor: f64, mapping: Option<&str>) {
    let grid = GridSpec {
        origin: (-SPACING, -SPACING),
        delta: (SPACING, SPACING),
        nx: 3,
        ny: 3,
        levels: Vec::new(),
    };
    let mapping = mapping.map(|m| GridMapping::from_gmt(m).unwrap());
    let metadata = FileMetadata {
        title: Some("sample run".to_string()),
        institution: Some("test lab".to_string()),
        ..FileMetadata::default()
    };
    let mut writer =
        create_cf_file(path, &VariableDefinitions::builtin(), &grid, &metadata, mapping.as_ref()).unwrap();
    for var in ["thk", "bmlt", "slc"] {
        writer.add_variable(var).unwrap();
    }
    let slc = [-10.0, -6.0, 0.0];
    for t in 0..3 {
        writer.put_time(t, 1000.0 * t as f64).unwrap();
        writer.put_slice("thk", t, &[100.0 * t as f64 * factor; 9]).unwrap();
        let mut bmlt = [0.0; 9];
        if t == 2 {
            bmlt[..3].copy_from_slice(&[0.5, 0.5, 0.5]);
        }
        writer.put_slice("bmlt", t, &bmlt).unwrap();
        writer.put_slice("slc", t, &[slc[t]; 9]).unwrap();
    }
    writer.close().unwrap();
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Writes the default configuration as YAML and returns its path.
fn write_default_config(dir: &Path) -> PathBuf {
    let path = dir.join("cfgrid.yaml");
    std::fs::write(&path, ToolkitConfig::default().to_yaml().unwrap()).unwrap();
    path
}

fn run_args(config: &Path, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["cfgrid".to_string(), "--quiet".to_string(), "--config".to_string(), path_arg(config)];
    argv.extend(args.iter().map(|a| a.to_string()));
    run(&Cli::parse_from(argv))
}

#[cfg(test)]
mod netcdf_roundtrip_tests {
    use super::*;
    use crate::gridfile::SliceSelection;

    #[test]
    fn test_written_grid_statistics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.nc");
        write_sample_grid(&path, 1.0, None);

        let file = GridFile::open(&path, &GridFileOptions::default()).unwrap();
        assert_eq!(file.num_times(), 3);
        assert_eq!(file.times(SliceSelection::All).unwrap(), vec![0.0, 1.0, 2.0]);
        assert_eq!(file.title(), "sample run");
        assert_eq!(file.delta_x(), SPACING);

        let stats = file.stats(2, false).unwrap();
        assert_eq!(stats.time, 2.0);
        assert!((stats.area - 9.0 * CELL_AREA * 1e-12).abs() < 1e-12);
        assert!((stats.volume - 9.0 * 200.0 * CELL_AREA * 1e-15).abs() < 1e-12);
        assert!((stats.melt_fraction - 1.0 / 3.0).abs() < 1e-9);
        assert!(stats.divide_thickness.is_none());

        let empty = file.stats(0, false).unwrap();
        assert_eq!(empty.area, 0.0);
        assert_eq!(empty.melt_fraction, 0.0);
    }

    #[test]
    fn test_written_grid_timeslice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.nc");
        write_sample_grid(&path, 1.0, None);

        let file = GridFile::open(&path, &GridFileOptions::default()).unwrap();
        assert_eq!(file.timeslice(1.4, Round::Nearest).unwrap(), 1);
        assert_eq!(file.timeslice(1.4, Round::Up).unwrap(), 2);
        assert_eq!(file.timeslice(1.5, Round::Nearest).unwrap(), 2);
        assert!(file.timeslice(-0.5, Round::Down).is_err());
    }

    #[test]
    fn test_profile_across_written_grid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.nc");
        write_sample_grid(&path, 1.0, Some("a10/60"));

        let file = GridFile::open(&path, &GridFileOptions::default()).unwrap();
        let options = ProfileOptions {
            interval: 2500.0,
            ..ProfileOptions::default()
        };
        let line = ProfileLine::new(&file, &[(-SPACING, 0.0), (SPACING, 0.0)], &options).unwrap();
        assert!(line.points().len() >= 8);
        assert_eq!(line.xvalues()[0], 0.0);

        let thk = line.sample("thk", 2, 0, ReadOptions::default()).unwrap();
        assert!(thk.iter().all(|&h| (h - 200.0).abs() < 1e-6));
        assert!(line.ice_extent(2).unwrap().is_found());
        assert_eq!(line.ice_extent(0).unwrap(), IceExtent::NoIce(0.0));

        let df = crate::extract::profile_table(&line, &["thk".to_string()], 2, 0, ReadOptions::default()).unwrap();
        assert_eq!(df.height(), line.points().len());
        assert!(df.column("latitude").is_ok());
        assert!(df.column("thk").is_ok());
    }
}

#[cfg(test)]
mod projection_info_tests {
    use super::*;
    use crate::info::get_grid_info;

    fn bare_grid(path: &Path) {
        MemoryStore::new()
            .with_dimension("x1", 3)
            .with_dimension("y1", 2)
            .with_variable("x1", &["x1"], vec![-20000.0, 0.0, 20000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![-20000.0, 20000.0])
            .unwrap()
            .with_variable("topg", &["y1", "x1"], vec![-50.0, 10.0, 200.0, 30.0, 400.0, 900.0])
            .unwrap()
            .with_attribute("topg", "units", "meter")
            .unwrap()
            .with_global("title", "bare grid")
            .save_netcdf(path)
            .unwrap();
    }

    #[test]
    fn test_info_before_and_after_add_projection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.nc");
        bare_grid(&path);
        let config = ToolkitConfig::default();

        let before = get_grid_info(&path, &config).unwrap();
        assert_eq!(before.title, "bare grid");
        assert!(before.projection.is_none());
        assert!(before.time.is_none());
        assert!(before.bounds.ll_geo.is_none());
        let topg = before.variables.iter().find(|v| v.name == "topg").unwrap();
        assert_eq!(topg.units.as_deref(), Some("meter"));
        assert_eq!(topg.dimensions, vec!["y1", "x1"]);

        let mapping = GridMapping::from_gmt("a-40/72").unwrap();
        assert!(add_projection_info(&path, &mapping, (-45.0, 70.0)).unwrap());

        let after = get_grid_info(&path, &config).unwrap();
        let projection = after.projection.unwrap();
        assert_eq!(projection.grid_mapping_name, "lambert_azimuthal_equal_area");
        assert!(projection.proj4.contains("laea"));
        assert_eq!(after.bounds.ll_xy, (-20000.0, -20000.0));
        let (lon, lat) = after.bounds.ll_geo.unwrap();
        assert!(lon < -45.0 && lat < 70.0);
    }

    #[test]
    fn test_add_projection_places_origin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.nc");
        bare_grid(&path);
        let mapping = GridMapping::from_gmt("s-39/90").unwrap();
        add_projection_info(&path, &mapping, (-39.0, 72.0)).unwrap();

        let file = GridFile::open(&path, &GridFileOptions::default()).unwrap();
        let (x, y) = file.project((-39.0, 72.0)).unwrap();
        assert!(x.abs() < 1e-3 && y.abs() < 1e-3);
        let (lon, lat) = file.unproject((0.0, 0.0)).unwrap();
        assert!((lon + 39.0).abs() < 1e-6 && (lat - 72.0).abs() < 1e-6);
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_config_drives_grid_opening() {
        let dir = tempdir().unwrap();
        let grid = dir.path().join("run.nc");
        write_sample_grid(&grid, 1.0, None);
        let config_path = dir.path().join("years.json");
        std::fs::write(&config_path, r#"{"timescale": 1.0, "round": "down"}"#).unwrap();

        let config = load_config(Some(&config_path)).unwrap();
        let file = open_grid(&grid, &config, &RegionArgs::default()).unwrap();
        assert_eq!(file.time(1).unwrap(), 1000.0);

        let at = |time: Option<f64>| TimeArgs { time, round: None };
        assert_eq!(select_slice(&file, &at(Some(1900.0)), &config).unwrap(), 1);
        assert_eq!(select_slice(&file, &at(None), &config).unwrap(), 2);
        let up = TimeArgs {
            time: Some(1100.0),
            round: Some(Round::Up),
        };
        assert_eq!(select_slice(&file, &up, &config).unwrap(), 2);
    }

    #[test]
    fn test_region_applied_on_open() {
        let dir = tempdir().unwrap();
        let grid = dir.path().join("run.nc");
        write_sample_grid(&grid, 1.0, None);
        let config = load_config(None).unwrap();

        let region = RegionArgs {
            llx: Some((0.0, -5000.0)),
            ..RegionArgs::default()
        };
        let file = open_grid(&grid, &config, &region).unwrap();
        assert_eq!(file.ll_xy(), (0.0, -5000.0));
        assert_eq!(file.ur_xy(), (SPACING, SPACING));

        let outside = RegionArgs {
            urx: Some((50000.0, 0.0)),
            ..RegionArgs::default()
        };
        assert!(open_grid(&grid, &config, &outside).is_err());
        // geographic corners need a projection
        let geographic = RegionArgs {
            llg: Some((0.0, 60.0)),
            ..RegionArgs::default()
        };
        assert!(open_grid(&grid, &config, &geographic).is_err());
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "timescale: 0\n").unwrap();
        let error = load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", error).contains("bad.yaml"));
        assert!(load_config(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}

#[cfg(test)]
mod stats_tests {
    use super::*;

    #[test]
    fn test_relative_to_last_file() {
        let dir = tempdir().unwrap();
        let thin = dir.path().join("thin.nc");
        let reference = dir.path().join("reference.nc");
        write_sample_grid(&thin, 1.0, None);
        write_sample_grid(&reference, 2.0, None);

        let files = vec![thin.clone(), reference.clone()];
        let reports = collect_stats(&files, &TimeArgs::default(), false, &ToolkitConfig::default()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].file, thin);
        assert_eq!(reports[0].stats.time, 2.0);

        let relative = reports[0].relative.unwrap();
        assert!((relative.volume - 0.5).abs() < 1e-9);
        assert!((relative.area - 1.0).abs() < 1e-9);
        assert!((relative.melt_fraction - 1.0).abs() < 1e-9);
        assert!((reports[1].relative.unwrap().volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_file_and_empty_reference() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.nc");
        write_sample_grid(&path, 1.0, None);
        let config = ToolkitConfig::default();

        let single = collect_stats(&[path.clone()], &TimeArgs::default(), false, &config).unwrap();
        assert!(single[0].relative.is_none());

        let start = TimeArgs {
            time: Some(0.0),
            round: None,
        };
        let reports = collect_stats(&[path.clone(), path.clone()], &start, false, &config).unwrap();
        let relative = reports[0].relative.unwrap();
        assert!(relative.volume.is_nan());
        assert!(relative.area.is_nan());

        let json = serde_json::to_value(&reports[0]).unwrap();
        assert_eq!(json["time"], 0.0);
        assert!(json.get("relative").is_some());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.nc");
        let result = collect_stats(&[missing], &TimeArgs::default(), false, &ToolkitConfig::default());
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod rsl_tests {
    use super::*;
    use crate::extract::rsl_table;
    use crate::rsl::{JsonRslStore, rsl_residuals};

    #[test]
    fn test_residuals_from_saved_database() {
        let dir = tempdir().unwrap();
        let grid = dir.path().join("run.nc");
        write_sample_grid(&grid, 1.0, Some("a10/60"));

        let mut db = JsonRslStore::new();
        let centre = db.add_location("Centre", 10.0, 60.0, 1);
        let far = db.add_location("Far away", 50.0, 0.0, 1);
        db.add_measurements(centre, &[(1500.0, -5.0), (5000.0, 1.0)]).unwrap();
        db.add_measurements(far, &[(1500.0, 0.0)]).unwrap();
        let db_path = dir.path().join("rsl.json");
        db.save(&db_path).unwrap();

        let file = GridFile::open(&grid, &GridFileOptions::default()).unwrap();
        let store = JsonRslStore::from_file(&db_path).unwrap();
        let residuals = rsl_residuals(&file, &store).unwrap();
        assert_eq!(residuals.len(), 1);
        let r = &residuals[0];
        assert_eq!(r.location_id, centre);
        assert_eq!(r.time, 1.5);
        assert!((r.modelled + 3.0).abs() < 1e-6);
        assert!((r.residual - 2.0).abs() < 1e-6);

        let df = rsl_table(&residuals).unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.column("residual").is_ok());
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;
    use polars::prelude::{ParquetReader, SerReader};

    #[test]
    fn test_extract_ts_writes_text_table() {
        let dir = tempdir().unwrap();
        let config = write_default_config(dir.path());
        let grid = dir.path().join("run.nc");
        write_sample_grid(&grid, 1.0, None);
        let output = dir.path().join("series.dat");

        run_args(
            &config,
            &["extract-ts", &path_arg(&grid), &path_arg(&output), "--volume", "--area", "--spot", "thk:1:1"],
        )
        .unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time\tice_volume\tice_area\tthk_1_1");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].ends_with("\t200.0") || lines[3].ends_with("\t200"));
    }

    #[test]
    fn test_extract_ts_without_request_fails() {
        let dir = tempdir().unwrap();
        let config = write_default_config(dir.path());
        let grid = dir.path().join("run.nc");
        write_sample_grid(&grid, 1.0, None);
        let output = dir.path().join("series.dat");

        assert!(run_args(&config, &["extract-ts", &path_arg(&grid), &path_arg(&output)]).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_profile_and_section_write_parquet() {
        let dir = tempdir().unwrap();
        let config = write_default_config(dir.path());
        let grid = dir.path().join("run.nc");
        write_sample_grid(&grid, 1.0, None);
        let output = dir.path().join("profile.parquet");

        run_args(
            &config,
            &[
                "profile",
                &path_arg(&grid),
                &path_arg(&output),
                "-n",
                "thk",
                "--points",
                "-10000,0;10000,0",
                "--interval",
                "5000",
                "-t",
                "1",
            ],
        )
        .unwrap();

        let df = ParquetReader::new(std::fs::File::open(&output).unwrap()).finish().unwrap();
        assert_eq!(df.height(), 5);
        let thk = df.column("thk").unwrap().f64().unwrap();
        assert!(thk.into_iter().flatten().all(|h| (h - 100.0).abs() < 1e-6));
        assert!(df.column("longitude").is_err());
    }

    #[test]
    fn test_create_then_add_projection() {
        let dir = tempdir().unwrap();
        let config = write_default_config(dir.path());
        let created = dir.path().join("new.nc");

        run_args(
            &config,
            &[
                "create",
                &path_arg(&created),
                "--origin=-20000,-10000",
                "--delta",
                "10000,10000",
                "--size",
                "5,3",
                "--levels",
                "3",
                "-n",
                "thk",
                "-n",
                "temp",
                "--title",
                "fresh grid",
            ],
        )
        .unwrap();

        let file = GridFile::open(&created, &GridFileOptions::default()).unwrap();
        assert_eq!(file.x_coords(), &[-20000.0, -10000.0, 0.0, 10000.0, 20000.0]);
        assert_eq!(file.levels().unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(file.title(), "fresh grid");
        assert!(file.mapping_var().is_none());
        assert!(file.variable("temp").unwrap().is_3d());

        run_args(&config, &["add-proj", &path_arg(&created), "-J", "a-40/72", "--origin=-40/72"]).unwrap();
        let file = GridFile::open(&created, &GridFileOptions::default()).unwrap();
        assert_eq!(file.mapping_var(), Some("mapping"));

        assert!(run_args(&config, &["create", &path_arg(&dir.path().join("x.nc")), "--origin", "0,0", "--delta", "1,1", "--size", "2,2", "-n", "nonsense"]).is_err());
    }

    #[test]
    fn test_forcing_table() {
        let dir = tempdir().unwrap();
        let config = write_default_config(dir.path());
        let input = dir.path().join("specmap.data");
        std::fs::write(&input, "# time  slc  temp\n-2000 -20.0 -5.0\n-1000 -10.0 -2.5\n0 0.0 0.0\n").unwrap();
        let output = dir.path().join("forcing.csv");

        run_args(&config, &["forcing", &path_arg(&input), &path_arg(&output)]).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time\tvalue_1\tvalue_2");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("-2"));
    }

    #[test]
    fn test_variables_template_round_trip() {
        let dir = tempdir().unwrap();
        let config = write_default_config(dir.path());
        let output = dir.path().join("variables.json");

        run_args(&config, &["template", "variables", "--format", "json", "-o", &path_arg(&output)]).unwrap();
        let defs = VariableDefinitions::from_file(&output).unwrap();
        assert_eq!(defs, VariableDefinitions::builtin());

        let config_out = dir.path().join("template.yaml");
        run_args(&config, &["template", "config", "-o", &path_arg(&config_out)]).unwrap();
        assert_eq!(ToolkitConfig::from_file(&config_out).unwrap(), ToolkitConfig::default());
    }
}
