//! # Relative Sea-Level Observations
//!
//! RSL observations are grouped by location. A location carries its
//! geographic position and the number of observations recorded for it; each
//! observation holds an age (years), the observed relative sea level (m) and
//! optional asymmetric errors.
//!
//! [`RslStore`] is the read interface used by the toolkit. [`JsonRslStore`]
//! keeps the whole database in one JSON (or YAML) document:
//!
//! ```json
//! {
//!   "locations": [
//!     {"id": 0, "dataset_id": 0, "name": "Oslo", "longitude": 10.7, "latitude": 59.9, "count": 1}
//!   ],
//!   "measurements": [
//!     {"location_id": 0, "time": -9000.0, "rsl": 120.0, "time_error": [200.0, 200.0]}
//!   ]
//! }
//! ```

use crate::error::{CfError, CfResult};
use crate::gridfile::{GridFile, SliceSelection};
use crate::profile::interpolate_linear;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RslLocation {
    pub id: u32,
    pub dataset_id: u32,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Number of observations at this location.
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RslObservation {
    pub location_id: u32,
    /// Age in years.
    pub time: f64,
    pub rsl: f64,
    /// (plus, minus)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_error: Option<(f64, f64)>,
    /// (plus, minus)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsl_error: Option<(f64, f64)>,
}

pub trait RslStore {
    fn location(&self, id: u32) -> CfResult<Option<RslLocation>>;

    /// Locations with longitude and latitude inside the inclusive ranges.
    fn locations_in_range(&self, longitude: (f64, f64), latitude: (f64, f64)) -> CfResult<Vec<RslLocation>>;

    fn observations(&self, location_id: u32) -> CfResult<Vec<RslObservation>>;

    /// Earliest and latest observation age.
    fn time_range(&self) -> CfResult<Option<(f64, f64)>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRslStore {
    #[serde(default)]
    locations: Vec<RslLocation>,
    #[serde(default)]
    measurements: Vec<RslObservation>,
}

impl JsonRslStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON document, or YAML when the extension is `.yaml`/`.yml`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CfResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let store: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        debug!(
            "Loaded RSL database {}: {} locations, {} observations",
            path.display(),
            store.locations.len(),
            store.measurements.len()
        );
        Ok(store)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> CfResult<()> {
        let path = path.as_ref();
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => serde_json::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn locations(&self) -> &[RslLocation] {
        &self.locations
    }

    /// Adds a location and returns its id.
    pub fn add_location(&mut self, name: &str, longitude: f64, latitude: f64, dataset_id: u32) -> u32 {
        let id = self.locations.iter().map(|l| l.id + 1).max().unwrap_or(0);
        self.locations.push(RslLocation {
            id,
            dataset_id,
            name: name.to_string(),
            longitude,
            latitude,
            count: 0,
        });
        id
    }

    /// Appends observations to an existing location and bumps its count.
    pub fn add_measurements(&mut self, location_id: u32, observations: &[(f64, f64)]) -> CfResult<()> {
        let location = self
            .locations
            .iter_mut()
            .find(|l| l.id == location_id)
            .ok_or_else(|| CfError::InvalidSelection(format!("no RSL location with id {location_id}")))?;
        location.count += observations.len() as u32;
        self.measurements
            .extend(observations.iter().map(|&(time, rsl)| RslObservation {
                location_id,
                time,
                rsl,
                time_error: None,
                rsl_error: None,
            }));
        Ok(())
    }
}

impl RslStore for JsonRslStore {
    fn location(&self, id: u32) -> CfResult<Option<RslLocation>> {
        Ok(self.locations.iter().find(|l| l.id == id).cloned())
    }

    fn locations_in_range(&self, longitude: (f64, f64), latitude: (f64, f64)) -> CfResult<Vec<RslLocation>> {
        Ok(self
            .locations
            .iter()
            .filter(|l| {
                l.longitude >= longitude.0
                    && l.longitude <= longitude.1
                    && l.latitude >= latitude.0
                    && l.latitude <= latitude.1
            })
            .cloned()
            .collect())
    }

    fn observations(&self, location_id: u32) -> CfResult<Vec<RslObservation>> {
        Ok(self
            .measurements
            .iter()
            .filter(|m| m.location_id == location_id)
            .cloned()
            .collect())
    }

    fn time_range(&self) -> CfResult<Option<(f64, f64)>> {
        Ok(self.measurements.iter().fold(None, |range, m| match range {
            None => Some((m.time, m.time)),
            Some((lo, hi)) => Some((f64::min(lo, m.time), f64::max(hi, m.time))),
        }))
    }
}

/// Modelled minus observed sea level for one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RslResidual {
    pub location_id: u32,
    pub longitude: f64,
    pub latitude: f64,
    /// Scaled with the file's timescale.
    pub time: f64,
    pub observed: f64,
    pub modelled: f64,
    pub residual: f64,
}

/// Boundary points traced per grid edge when bounding the grid geographically.
const EDGE_SAMPLES: usize = 16;

fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Longitude and latitude ranges enclosing the grid, traced along its edges.
/// A grid holding a pole or crossing the antimeridian spans all longitudes.
fn geographic_range(file: &GridFile) -> CfResult<((f64, f64), (f64, f64))> {
    let (ll, ur) = (file.ll_xy(), file.ur_xy());
    let ring = [ll, (ur.0, ll.1), ur, (ll.0, ur.1), ll];
    let mut boundary = Vec::with_capacity(4 * EDGE_SAMPLES);
    for edge in ring.windows(2) {
        let (a, b) = (edge[0], edge[1]);
        for k in 0..EDGE_SAMPLES {
            let f = k as f64 / EDGE_SAMPLES as f64;
            boundary.push(file.unproject((a.0 + f * (b.0 - a.0), a.1 + f * (b.1 - a.1)))?);
        }
    }

    let mut lon = span(boundary.iter().map(|p| p.0));
    let mut lat = span(boundary.iter().map(|p| p.1));
    let holds = |pole: f64| {
        file.project((0.0, pole))
            .is_ok_and(|xy| xy.0.is_finite() && xy.1.is_finite() && file.inside(xy))
    };
    let wraps = boundary
        .iter()
        .zip(boundary.iter().cycle().skip(1))
        .any(|(a, b)| (a.0 - b.0).abs() > 180.0);
    let (north, south) = (holds(90.0), holds(-90.0));
    if north {
        lat.1 = 90.0;
    }
    if south {
        lat.0 = -90.0;
    }
    if wraps || north || south {
        lon = (-180.0, 180.0);
    }
    debug!(
        "{} spans longitude {:.2}..{:.2}, latitude {:.2}..{:.2}",
        file.name(),
        lon.0,
        lon.1,
        lat.0,
        lat.1
    );
    Ok((lon, lat))
}

/// Residuals for every observation at every location on the grid whose age
/// lies within the modelled time span.
pub fn rsl_residuals(file: &GridFile, store: &dyn RslStore) -> CfResult<Vec<RslResidual>> {
    let (lon, lat) = geographic_range(file)?;

    let times = file.times(SliceSelection::All)?;
    let Some((&first, &last)) = times.first().zip(times.last()) else {
        return Ok(Vec::new());
    };

    let mut residuals = Vec::new();
    for location in store.locations_in_range(lon, lat)? {
        let lonlat = (location.longitude, location.latitude);
        if !file.inside(file.project(lonlat)?) {
            debug!("RSL location {} ({}) is off the grid", location.id, location.name);
            continue;
        }
        let modelled = file.rsl(lonlat, SliceSelection::All)?;
        for obs in store.observations(location.id)? {
            let t = obs.time * file.timescale();
            if t < first || t > last {
                continue;
            }
            let model = interpolate_linear(&times, &modelled, &[t])?[0];
            residuals.push(RslResidual {
                location_id: location.id,
                longitude: location.longitude,
                latitude: location.latitude,
                time: t,
                observed: obs.rsl,
                modelled: model,
                residual: model - obs.rsl,
            });
        }
    }
    debug!("{} RSL residuals for {}", residuals.len(), file.name());
    Ok(residuals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridfile::GridFileOptions;
    use crate::projection::{Projection, ProjectionKind};
    use crate::store::MemoryStore;
    use tempfile::tempdir;

    fn database() -> JsonRslStore {
        let mut db = JsonRslStore::new();
        let oslo = db.add_location("Oslo", 0.0, 60.0, 0);
        let tropics = db.add_location("Tropics", 50.0, 0.0, 0);
        db.add_measurements(oslo, &[(500.0, -4.0), (5000.0, 1.0)]).unwrap();
        db.add_measurements(tropics, &[(500.0, 0.0)]).unwrap();
        db
    }

    #[test]
    fn test_crud() {
        let db = database();
        assert_eq!(db.locations().len(), 2);
        let oslo = db.location(0).unwrap().unwrap();
        assert_eq!(oslo.name, "Oslo");
        assert_eq!(oslo.count, 2);
        assert!(db.location(7).unwrap().is_none());
        assert_eq!(db.observations(0).unwrap().len(), 2);
        assert_eq!(db.time_range().unwrap(), Some((500.0, 5000.0)));

        let mut db = db;
        assert!(matches!(
            db.add_measurements(9, &[(0.0, 0.0)]),
            Err(CfError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_locations_in_range() {
        let db = database();
        let north = db.locations_in_range((-10.0, 10.0), (50.0, 70.0)).unwrap();
        assert_eq!(north.len(), 1);
        assert_eq!(north[0].id, 0);
        assert!(db.locations_in_range((100.0, 120.0), (0.0, 10.0)).unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let db = database();
        for name in ["rsl.json", "rsl.yaml"] {
            let path = dir.path().join(name);
            db.save(&path).unwrap();
            assert_eq!(JsonRslStore::from_file(&path).unwrap(), db);
        }
    }

    #[test]
    fn test_load_with_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rsl.json");
        std::fs::write(
            &path,
            r#"{"locations": [{"id": 3, "dataset_id": 1, "name": "Bergen", "longitude": 5.3, "latitude": 60.4}],
                "measurements": [{"location_id": 3, "time": -9000, "rsl": 50, "rsl_error": [2, 1]}]}"#,
        )
        .unwrap();
        let db = JsonRslStore::from_file(&path).unwrap();
        let obs = db.observations(3).unwrap();
        assert_eq!(obs[0].rsl_error, Some((2.0, 1.0)));
        assert_eq!(obs[0].time_error, None);
        assert_eq!(db.location(3).unwrap().unwrap().count, 0);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonRslStore::from_file(&path), Err(CfError::Config(_))));
    }

    #[test]
    fn test_residuals_on_grid_holding_the_pole() {
        let store = MemoryStore::new()
            .with_dimension("time", 2)
            .with_dimension("y1", 3)
            .with_dimension("x1", 3)
            .with_variable("time", &["time"], vec![0.0, 1000.0])
            .unwrap()
            .with_variable("x1", &["x1"], vec![-1000000.0, 0.0, 1000000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![-1000000.0, 0.0, 1000000.0])
            .unwrap()
            .with_variable(
                "slc",
                &["time", "y1", "x1"],
                [vec![-10.0; 9], vec![0.0; 9]].concat(),
            )
            .unwrap();
        let projection =
            Projection::new(ProjectionKind::PolarStereographic { lon_0: -39.0, k_0: 1.0 }, 0.0, 0.0).unwrap();
        let file = GridFile::from_store(Box::new(store), "arctic.nc", &GridFileOptions::default())
            .unwrap()
            .with_projection(projection);

        let (lon, lat) = geographic_range(&file).unwrap();
        assert_eq!(lon, (-180.0, 180.0));
        assert_eq!(lat.1, 90.0);
        assert!(lat.0 > 70.0 && lat.0 < 85.0);

        // beyond the pole from the grid centre meridian
        let mut db = JsonRslStore::new();
        let far = db.add_location("Far side", 150.0, 85.0, 0);
        db.add_measurements(far, &[(500.0, -4.0)]).unwrap();
        let residuals = rsl_residuals(&file, &db).unwrap();
        assert_eq!(residuals.len(), 1);
        assert_eq!(residuals[0].location_id, far);
        assert!((residuals[0].modelled + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_residuals() {
        let store = MemoryStore::new()
            .with_dimension("time", 2)
            .with_dimension("y1", 3)
            .with_dimension("x1", 3)
            .with_variable("time", &["time"], vec![0.0, 1000.0])
            .unwrap()
            .with_variable("x1", &["x1"], vec![-100000.0, 0.0, 100000.0])
            .unwrap()
            .with_variable("y1", &["y1"], vec![-100000.0, 0.0, 100000.0])
            .unwrap()
            .with_variable(
                "slc",
                &["time", "y1", "x1"],
                [vec![-10.0; 9], vec![0.0; 9]].concat(),
            )
            .unwrap();
        let projection = Projection::new(
            ProjectionKind::LambertAzimuthalEqualArea { lon_0: 0.0, lat_0: 60.0 },
            0.0,
            0.0,
        )
        .unwrap();
        let file = GridFile::from_store(Box::new(store), "rsl.nc", &GridFileOptions::default())
            .unwrap()
            .with_projection(projection);

        let residuals = rsl_residuals(&file, &database()).unwrap();
        assert_eq!(residuals.len(), 1);
        let r = &residuals[0];
        assert_eq!(r.location_id, 0);
        assert!((r.time - 0.5).abs() < 1e-12);
        assert!((r.modelled + 5.0).abs() < 1e-9);
        assert!((r.residual + 1.0).abs() < 1e-9);
    }
}
