//! # Map Projections
//!
//! Converts between geographic (lon/lat, degrees) and projected (x/y, metres)
//! coordinates for the projections used by CF grid-mapping variables:
//!
//! | CF `grid_mapping_name`         | PROJ  | GMT |
//! |--------------------------------|-------|-----|
//! | `stereographic`                | stere | s   |
//! | `polar_stereographic`          | stere | s   |
//! | `lambert_azimuthal_equal_area` | laea  | a   |
//! | `albers_conical_equal_area`    | aea   | b   |
//! | `lambert_conformal_conic`      | lcc   | l   |
//!
//! The transforms themselves are done by `proj4rs` from a PROJ parameter
//! string built from the grid-mapping attributes, on the WGS84 ellipsoid.
//!
//! ## Example
//!
//! ```rust
//! use cfgrid::projection::{GridMapping, Projection};
//!
//! let mapping = GridMapping::from_gmt("-Ja-40/70")?;
//! let proj = Projection::from_grid_mapping(&mapping)?;
//! let (x, y) = proj.forward((-40.0, 70.0))?;
//! assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
//! # Ok::<(), cfgrid::error::CfError>(())
//! ```

use crate::error::{CfError, CfResult};
use crate::store::{AttrValue, GridStore};
use log::debug;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

const GEOGRAPHIC: &str = "+proj=longlat +ellps=WGS84";
const ELLIPSOID: &str = "WGS84";

/// Projection kind together with its kind-specific parameters (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionKind {
    Stereographic { lon_0: f64, lat_0: f64, k_0: f64 },
    /// Polar variant, origin pinned to the north pole.
    PolarStereographic { lon_0: f64, k_0: f64 },
    LambertAzimuthalEqualArea { lon_0: f64, lat_0: f64 },
    AlbersConicalEqualArea { lon_0: f64, lat_0: f64, lat_1: f64, lat_2: Option<f64> },
    LambertConformalConic { lon_0: f64, lat_0: f64, lat_1: f64, lat_2: Option<f64> },
}

impl ProjectionKind {
    pub fn cf_name(&self) -> &'static str {
        match self {
            ProjectionKind::Stereographic { .. } => "stereographic",
            ProjectionKind::PolarStereographic { .. } => "polar_stereographic",
            ProjectionKind::LambertAzimuthalEqualArea { .. } => "lambert_azimuthal_equal_area",
            ProjectionKind::AlbersConicalEqualArea { .. } => "albers_conical_equal_area",
            ProjectionKind::LambertConformalConic { .. } => "lambert_conformal_conic",
        }
    }

    pub fn proj_name(&self) -> &'static str {
        match self {
            ProjectionKind::Stereographic { .. } | ProjectionKind::PolarStereographic { .. } => "stere",
            ProjectionKind::LambertAzimuthalEqualArea { .. } => "laea",
            ProjectionKind::AlbersConicalEqualArea { .. } => "aea",
            ProjectionKind::LambertConformalConic { .. } => "lcc",
        }
    }

    pub fn gmt_code(&self) -> char {
        match self {
            ProjectionKind::Stereographic { .. } | ProjectionKind::PolarStereographic { .. } => 's',
            ProjectionKind::LambertAzimuthalEqualArea { .. } => 'a',
            ProjectionKind::AlbersConicalEqualArea { .. } => 'b',
            ProjectionKind::LambertConformalConic { .. } => 'l',
        }
    }

    /// Kind-specific PROJ parameters in emission order.
    fn params(&self) -> Vec<(&'static str, f64)> {
        match *self {
            ProjectionKind::Stereographic { lon_0, lat_0, k_0 } => {
                vec![("lat_0", lat_0), ("lon_0", lon_0), ("k_0", k_0)]
            }
            ProjectionKind::PolarStereographic { lon_0, k_0 } => {
                vec![("lat_0", 90.0), ("lon_0", lon_0), ("k_0", k_0)]
            }
            ProjectionKind::LambertAzimuthalEqualArea { lon_0, lat_0 } => {
                vec![("lat_0", lat_0), ("lon_0", lon_0)]
            }
            ProjectionKind::AlbersConicalEqualArea { lon_0, lat_0, lat_1, lat_2 }
            | ProjectionKind::LambertConformalConic { lon_0, lat_0, lat_1, lat_2 } => {
                let mut p = vec![("lat_0", lat_0), ("lon_0", lon_0), ("lat_1", lat_1)];
                if let Some(lat_2) = lat_2 {
                    p.push(("lat_2", lat_2));
                }
                p
            }
        }
    }

    pub fn from_grid_mapping(mapping: &GridMapping) -> CfResult<Self> {
        let require = |value: Option<f64>, attribute: &str| {
            value.ok_or_else(|| CfError::MissingAttribute {
                owner: mapping.grid_mapping_name.clone(),
                attribute: attribute.to_string(),
            })
        };
        let k_0 = mapping.scale_factor_at_projection_origin.unwrap_or(1.0);

        match mapping.grid_mapping_name.as_str() {
            "polar_stereographic" => Ok(ProjectionKind::PolarStereographic {
                lon_0: require(
                    mapping.straight_vertical_longitude_from_pole,
                    "straight_vertical_longitude_from_pole",
                )?,
                k_0,
            }),
            "stereographic" => Ok(ProjectionKind::Stereographic {
                lon_0: require(mapping.longitude_of_central_meridian, "longitude_of_central_meridian")?,
                lat_0: require(mapping.latitude_of_projection_origin, "latitude_of_projection_origin")?,
                k_0,
            }),
            "lambert_azimuthal_equal_area" => Ok(ProjectionKind::LambertAzimuthalEqualArea {
                lon_0: require(mapping.longitude_of_central_meridian, "longitude_of_central_meridian")?,
                lat_0: require(mapping.latitude_of_projection_origin, "latitude_of_projection_origin")?,
            }),
            name @ ("albers_conical_equal_area" | "lambert_conformal_conic") => {
                let lon_0 = require(mapping.longitude_of_central_meridian, "longitude_of_central_meridian")?;
                let lat_0 = require(mapping.latitude_of_projection_origin, "latitude_of_projection_origin")?;
                let (lat_1, lat_2) = match mapping.standard_parallel.as_slice() {
                    [lat_1] => (*lat_1, None),
                    [lat_1, lat_2] => (*lat_1, Some(*lat_2)),
                    other => {
                        return Err(CfError::InvalidProjectionParameters(format!(
                            "{name} needs one or two standard parallels, got {}",
                            other.len()
                        )));
                    }
                };
                if name == "albers_conical_equal_area" {
                    Ok(ProjectionKind::AlbersConicalEqualArea { lon_0, lat_0, lat_1, lat_2 })
                } else {
                    Ok(ProjectionKind::LambertConformalConic { lon_0, lat_0, lat_1, lat_2 })
                }
            }
            other => Err(CfError::UnsupportedProjectionKind(other.to_string())),
        }
    }
}

/// CF grid-mapping attribute bundle.
///
/// Holds exactly the attributes the toolkit understands; conversion to and
/// from [`Projection`] is lossless.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridMapping {
    pub grid_mapping_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude_of_central_meridian: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude_of_projection_origin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub straight_vertical_longitude_from_pole: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor_at_projection_origin: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub standard_parallel: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_easting: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_northing: Option<f64>,
}

impl GridMapping {
    /// Reads the attributes of a grid-mapping variable.
    ///
    /// Older files store the false northing as `false_westing`; that name is
    /// accepted as a fallback.
    pub fn from_store(store: &dyn GridStore, var: &str) -> CfResult<Self> {
        let number = |name: &str| store.attribute(var, name).and_then(|a| a.as_f64());
        let grid_mapping_name = store
            .attribute(var, "grid_mapping_name")
            .and_then(|a| a.as_text().map(str::to_string))
            .ok_or_else(|| CfError::MissingAttribute {
                owner: var.to_string(),
                attribute: "grid_mapping_name".to_string(),
            })?;
        let standard_parallel = match store.attribute(var, "standard_parallel") {
            Some(AttrValue::Numbers(v)) => v,
            Some(other) => other.as_f64().into_iter().collect(),
            None => Vec::new(),
        };

        Ok(Self {
            grid_mapping_name,
            longitude_of_central_meridian: number("longitude_of_central_meridian"),
            latitude_of_projection_origin: number("latitude_of_projection_origin"),
            straight_vertical_longitude_from_pole: number("straight_vertical_longitude_from_pole"),
            scale_factor_at_projection_origin: number("scale_factor_at_projection_origin"),
            standard_parallel,
            false_easting: number("false_easting"),
            false_northing: number("false_northing").or_else(|| number("false_westing")),
        })
    }

    /// Parses a GMT-style projection specification.
    ///
    /// Accepted forms (with or without a leading `-J`):
    /// `alon0/lat0`, `blon0/lat0/lat1/lat2`, `llon0/lat0/lat1/lat2`,
    /// `slon0/lat0[/scale]`.
    pub fn from_gmt(spec: &str) -> CfResult<Self> {
        let spec = spec.trim();
        let spec = spec.strip_prefix("-J").unwrap_or(spec);
        let mut chars = spec.chars();
        let code = chars
            .next()
            .ok_or_else(|| CfError::Parse("empty projection specification".to_string()))?;
        let args: Vec<f64> = chars
            .as_str()
            .split('/')
            .map(|s| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| CfError::Parse(format!("invalid projection argument '{s}'")))
            })
            .collect::<CfResult<_>>()?;

        let wrong_count = |expected: &str| {
            CfError::InvalidProjectionParameters(format!(
                "-J{code} expects {expected} arguments, got {}",
                args.len()
            ))
        };

        let mut mapping = GridMapping::default();
        match code.to_ascii_lowercase() {
            c @ ('b' | 'l') => {
                if args.len() != 4 {
                    return Err(wrong_count("4"));
                }
                mapping.grid_mapping_name = if c == 'b' {
                    "albers_conical_equal_area".to_string()
                } else {
                    "lambert_conformal_conic".to_string()
                };
                mapping.longitude_of_central_meridian = Some(args[0]);
                mapping.latitude_of_projection_origin = Some(args[1]);
                mapping.standard_parallel = vec![args[2], args[3]];
            }
            'a' => {
                if args.len() != 2 {
                    return Err(wrong_count("2"));
                }
                mapping.grid_mapping_name = "lambert_azimuthal_equal_area".to_string();
                mapping.longitude_of_central_meridian = Some(args[0]);
                mapping.latitude_of_projection_origin = Some(args[1]);
            }
            's' => {
                if args.len() != 2 && args.len() != 3 {
                    return Err(wrong_count("2 or 3"));
                }
                mapping.grid_mapping_name = "stereographic".to_string();
                mapping.longitude_of_central_meridian = Some(args[0]);
                mapping.latitude_of_projection_origin = Some(args[1]);
                mapping.scale_factor_at_projection_origin = Some(args.get(2).copied().unwrap_or(1.0));
            }
            _ => return Err(CfError::UnsupportedProjectionKind(format!("-J{spec}"))),
        }
        Ok(mapping)
    }

    /// Attribute list as it should appear on the mapping variable.
    pub fn attributes(&self) -> Vec<(&'static str, AttrValue)> {
        let mut attrs = vec![("grid_mapping_name", AttrValue::from(self.grid_mapping_name.as_str()))];
        let optional = [
            ("longitude_of_central_meridian", self.longitude_of_central_meridian),
            ("latitude_of_projection_origin", self.latitude_of_projection_origin),
            ("straight_vertical_longitude_from_pole", self.straight_vertical_longitude_from_pole),
            ("scale_factor_at_projection_origin", self.scale_factor_at_projection_origin),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                attrs.push((name, AttrValue::from(v)));
            }
        }
        if !self.standard_parallel.is_empty() {
            attrs.push(("standard_parallel", AttrValue::from(self.standard_parallel.clone())));
        }
        for (name, value) in [("false_easting", self.false_easting), ("false_northing", self.false_northing)] {
            if let Some(v) = value {
                attrs.push((name, AttrValue::from(v)));
            }
        }
        attrs
    }

    /// Writes the attributes onto a NetCDF variable.
    pub fn write_netcdf(&self, var: &mut netcdf::VariableMut<'_>) -> CfResult<()> {
        for (name, value) in self.attributes() {
            match value {
                AttrValue::Text(s) => var.put_attribute(name, s.as_str())?,
                AttrValue::Numbers(v) if v.len() == 1 => var.put_attribute(name, v[0])?,
                AttrValue::Numbers(v) => var.put_attribute(name, v)?,
            };
        }
        Ok(())
    }
}

/// A ready-to-use projection.
pub struct Projection {
    kind: ProjectionKind,
    false_easting: f64,
    false_northing: f64,
    projected: Proj,
    geographic: Proj,
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("kind", &self.kind)
            .field("false_easting", &self.false_easting)
            .field("false_northing", &self.false_northing)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Projection {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.false_easting == other.false_easting
            && self.false_northing == other.false_northing
    }
}

impl Projection {
    pub fn new(kind: ProjectionKind, false_easting: f64, false_northing: f64) -> CfResult<Self> {
        let definition = proj4_string(&kind, false_easting, false_northing);
        debug!("Building projection: {}", definition);
        let projected = Proj::from_proj_string(&definition)
            .map_err(|e| CfError::Projection(format!("invalid projection '{definition}': {e:?}")))?;
        let geographic = Proj::from_proj_string(GEOGRAPHIC)
            .map_err(|e| CfError::Projection(format!("invalid geographic definition: {e:?}")))?;
        Ok(Self {
            kind,
            false_easting,
            false_northing,
            projected,
            geographic,
        })
    }

    pub fn from_grid_mapping(mapping: &GridMapping) -> CfResult<Self> {
        let kind = ProjectionKind::from_grid_mapping(mapping)?;
        Self::new(
            kind,
            mapping.false_easting.unwrap_or(0.0),
            mapping.false_northing.unwrap_or(0.0),
        )
    }

    pub fn from_store(store: &dyn GridStore, var: &str) -> CfResult<Self> {
        Self::from_grid_mapping(&GridMapping::from_store(store, var)?)
    }

    pub fn kind(&self) -> &ProjectionKind {
        &self.kind
    }

    pub fn false_easting(&self) -> f64 {
        self.false_easting
    }

    pub fn false_northing(&self) -> f64 {
        self.false_northing
    }

    /// PROJ parameters without the leading `+`, e.g. `["proj=laea", "lat_0=70", ...]`.
    pub fn proj4_params(&self) -> Vec<String> {
        proj4_params(&self.kind, self.false_easting, self.false_northing)
    }

    pub fn proj4_string(&self) -> String {
        proj4_string(&self.kind, self.false_easting, self.false_northing)
    }

    /// Forward (lon/lat to x/y) or, with `inverse`, x/y to lon/lat.
    pub fn project(&self, point: (f64, f64), inverse: bool) -> CfResult<(f64, f64)> {
        if inverse {
            self.inverse(point)
        } else {
            self.forward(point)
        }
    }

    pub fn forward(&self, lonlat: (f64, f64)) -> CfResult<(f64, f64)> {
        let mut p = (lonlat.0.to_radians(), lonlat.1.to_radians(), 0.0);
        transform(&self.geographic, &self.projected, &mut p)
            .map_err(|e| CfError::Projection(format!("forward projection of {lonlat:?} failed: {e:?}")))?;
        Ok((p.0, p.1))
    }

    pub fn inverse(&self, xy: (f64, f64)) -> CfResult<(f64, f64)> {
        let mut p = (xy.0, xy.1, 0.0);
        transform(&self.projected, &self.geographic, &mut p)
            .map_err(|e| CfError::Projection(format!("inverse projection of {xy:?} failed: {e:?}")))?;
        Ok((p.0.to_degrees(), p.1.to_degrees()))
    }

    pub fn project_points(&self, points: &[(f64, f64)], inverse: bool) -> CfResult<Vec<(f64, f64)>> {
        points.iter().map(|&p| self.project(p, inverse)).collect()
    }

    /// Returns a projection whose false easting/northing place `(lon0, lat0)`
    /// at the projected origin.
    pub fn set_origin(&self, lon0: f64, lat0: f64) -> CfResult<Projection> {
        let centred = Projection::new(self.kind, 0.0, 0.0)?;
        let (x, y) = centred.forward((lon0, lat0))?;
        Projection::new(self.kind, -x, -y)
    }

    /// Region string `w/s/e/nr` for the corners of a projected box.
    pub fn region_bounds(&self, ll: (f64, f64), ur: (f64, f64)) -> CfResult<String> {
        let (lon_ll, lat_ll) = self.inverse(ll)?;
        let (lon_ur, lat_ur) = self.inverse(ur)?;
        Ok(format!("{lon_ll:.6}/{lat_ll:.6}/{lon_ur:.6}/{lat_ur:.6}r"))
    }

    /// GMT `-J` projection body, e.g. `s-39.000000/90.000000/1.000000`.
    ///
    /// Single-parallel conics repeat the first parallel.
    pub fn gmt_projection(&self) -> String {
        let code = self.kind.gmt_code();
        match self.kind {
            ProjectionKind::Stereographic { lon_0, lat_0, k_0 } => {
                format!("{code}{lon_0:.6}/{lat_0:.6}/{k_0:.6}")
            }
            ProjectionKind::PolarStereographic { lon_0, k_0 } => {
                format!("{code}{lon_0:.6}/{:.6}/{k_0:.6}", 90.0)
            }
            ProjectionKind::LambertAzimuthalEqualArea { lon_0, lat_0 } => {
                format!("{code}{lon_0:.6}/{lat_0:.6}")
            }
            ProjectionKind::AlbersConicalEqualArea { lon_0, lat_0, lat_1, lat_2 }
            | ProjectionKind::LambertConformalConic { lon_0, lat_0, lat_1, lat_2 } => {
                let lat_2 = lat_2.unwrap_or(lat_1);
                format!("{code}{lon_0:.6}/{lat_0:.6}/{lat_1:.6}/{lat_2:.6}")
            }
        }
    }

    /// The grid-mapping attribute bundle describing this projection.
    pub fn grid_mapping(&self) -> GridMapping {
        let mut mapping = GridMapping {
            grid_mapping_name: self.kind.cf_name().to_string(),
            false_easting: Some(self.false_easting),
            false_northing: Some(self.false_northing),
            ..GridMapping::default()
        };
        match self.kind {
            ProjectionKind::Stereographic { lon_0, lat_0, k_0 } => {
                mapping.longitude_of_central_meridian = Some(lon_0);
                mapping.latitude_of_projection_origin = Some(lat_0);
                mapping.scale_factor_at_projection_origin = Some(k_0);
            }
            ProjectionKind::PolarStereographic { lon_0, k_0 } => {
                mapping.straight_vertical_longitude_from_pole = Some(lon_0);
                mapping.latitude_of_projection_origin = Some(90.0);
                mapping.scale_factor_at_projection_origin = Some(k_0);
            }
            ProjectionKind::LambertAzimuthalEqualArea { lon_0, lat_0 } => {
                mapping.longitude_of_central_meridian = Some(lon_0);
                mapping.latitude_of_projection_origin = Some(lat_0);
            }
            ProjectionKind::AlbersConicalEqualArea { lon_0, lat_0, lat_1, lat_2 }
            | ProjectionKind::LambertConformalConic { lon_0, lat_0, lat_1, lat_2 } => {
                mapping.longitude_of_central_meridian = Some(lon_0);
                mapping.latitude_of_projection_origin = Some(lat_0);
                mapping.standard_parallel = std::iter::once(lat_1).chain(lat_2).collect();
            }
        }
        mapping
    }
}

fn proj4_params(kind: &ProjectionKind, false_easting: f64, false_northing: f64) -> Vec<String> {
    let mut params = vec![format!("proj={}", kind.proj_name())];
    params.extend(kind.params().into_iter().map(|(k, v)| format!("{k}={v}")));
    params.push(format!("x_0={false_easting}"));
    params.push(format!("y_0={false_northing}"));
    params.push(format!("ellps={ELLIPSOID}"));
    params.push("units=m".to_string());
    params
}

fn proj4_string(kind: &ProjectionKind, false_easting: f64, false_northing: f64) -> String {
    proj4_params(kind, false_easting, false_northing)
        .iter()
        .map(|p| format!("+{p}"))
        .collect::<Vec<_>>()
        .join(" ")
}
