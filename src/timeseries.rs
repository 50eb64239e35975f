//! # Forcing Time Series
//!
//! Plain-text time series such as sea-level, temperature or ELA forcing.
//! Each non-empty line holds a time followed by one or more data columns;
//! anything after a `#` is a comment. Times are multiplied by a timescale on
//! load (years to ka by default).
//!
//! ```text
//! # time   slc
//! -120000  -118.0
//! -20000   -120.0
//! 0        0.0
//! ```

use crate::error::{CfError, CfResult};
use crate::timeindex::TimeIndex;
use log::debug;
use polars::prelude::{CsvParseOptions, CsvReadOptions, DataType, SerReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

/// Reference latitude of the exponential EIS temperature form.
pub const EIS_REFERENCE_LATITUDE: f64 = 44.95;

pub const DEFAULT_EIS_LATITUDE: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct TimeSeries {
    index: TimeIndex,
    data: Vec<Vec<f64>>,
}

impl TimeSeries {
    /// Reads a series from disk. `separator` of `None` splits on whitespace.
    pub fn from_file<P: AsRef<Path>>(path: P, separator: Option<char>, timescale: f64) -> CfResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let series = Self::parse(&text, separator, timescale)?;
        debug!(
            "Loaded time series {}: {} records, {} columns",
            path.display(),
            series.len(),
            series.columns()
        );
        Ok(series)
    }

    pub fn parse(text: &str, separator: Option<char>, timescale: f64) -> CfResult<Self> {
        let records = match separator {
            Some(sep) => read_delimited(text, sep)?,
            None => read_whitespace(text)?,
        };
        if records.is_empty() {
            return Err(CfError::Parse("time series holds no records".to_string()));
        }
        let mut times = Vec::with_capacity(records.len());
        let mut data: Vec<Vec<f64>> = Vec::with_capacity(records.len());
        for (n, numbers) in records.into_iter().enumerate() {
            if numbers.len() < 2 {
                return Err(CfError::Parse(format!("record {}: expected time and data", n + 1)));
            }
            if let Some(first) = data.first()
                && first.len() != numbers.len() - 1
            {
                return Err(CfError::Parse(format!(
                    "record {}: {} data columns, expected {}",
                    n + 1,
                    numbers.len() - 1,
                    first.len()
                )));
            }
            times.push(numbers[0] * timescale);
            data.push(numbers[1..].to_vec());
        }
        Ok(Self {
            index: TimeIndex::new(times)?,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn columns(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn times(&self) -> &[f64] {
        self.index.times()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i]
    }

    pub fn column(&self, c: usize) -> CfResult<Vec<f64>> {
        if c >= self.columns() {
            return Err(CfError::InvalidSelection(format!(
                "column {c} outside series with {} columns",
                self.columns()
            )));
        }
        Ok(self.data.iter().map(|row| row[c]).collect())
    }

    /// Index `i` with `t[i] <= time < t[i + 1]`, clamped to the record range.
    pub fn index_at(&self, time: f64) -> usize {
        self.index.bisect(time)
    }

    /// Record in force at `time` (piecewise constant).
    pub fn step(&self, time: f64) -> &[f64] {
        &self.data[self.index_at(time)]
    }

    /// Linear interpolation between records; constant beyond either end.
    pub fn linear(&self, time: f64) -> Vec<f64> {
        let i = self.index_at(time);
        let times = self.times();
        if time <= times[0] || i + 1 >= times.len() {
            return self.data[i].clone();
        }
        let factor = (time - times[i]) / (times[i + 1] - times[i]);
        self.data[i]
            .iter()
            .zip(&self.data[i + 1])
            .map(|(a, b)| a + factor * (b - a))
            .collect()
    }
}

/// How EIS temperature coefficients depend on latitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureForm {
    /// `sum(c[i] * lat^i)`
    #[default]
    Poly,
    /// `c[0] + c[1] * exp(c[2] * (lat - 44.95))`
    Exp,
}

impl FromStr for TemperatureForm {
    type Err = CfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poly" => Ok(TemperatureForm::Poly),
            "exp" => Ok(TemperatureForm::Exp),
            other => Err(CfError::Parse(format!(
                "no handle for temperature calculation type '{other}'"
            ))),
        }
    }
}

/// Reduces EIS temperature coefficients to one temperature column at `latitude`.
pub fn eis_temperature(series: &TimeSeries, latitude: f64, form: TemperatureForm) -> CfResult<TimeSeries> {
    let data = series
        .data
        .iter()
        .map(|c| match form {
            TemperatureForm::Poly => {
                let mut power = 1.0;
                let mut t = 0.0;
                for v in c {
                    t += power * v;
                    power *= latitude;
                }
                Ok(vec![t])
            }
            TemperatureForm::Exp => match c.as_slice() {
                [a, b, k, ..] => Ok(vec![a + b * (k * (latitude - EIS_REFERENCE_LATITUDE)).exp()]),
                _ => Err(CfError::Parse(format!(
                    "exponential temperature form needs 3 coefficients, got {}",
                    c.len()
                ))),
            },
        })
        .collect::<CfResult<Vec<_>>>()?;
    Ok(TimeSeries {
        index: series.index.clone(),
        data,
    })
}

/// Non-empty lines with `#` comments removed.
fn records(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n, line.split('#').next().unwrap_or("").trim()))
        .filter(|(_, line)| !line.is_empty())
}

/// Whitespace-separated records. The polars CSV reader takes a single
/// separator byte and cannot split on runs of blanks, so these are tokenized here.
fn read_whitespace(text: &str) -> CfResult<Vec<Vec<f64>>> {
    records(text)
        .map(|(n, line)| {
            line.split_whitespace()
                .map(|f| {
                    f.parse::<f64>()
                        .map_err(|e| CfError::Parse(format!("line {}: '{f}': {e}", n + 1)))
                })
                .collect()
        })
        .collect()
}

/// Records split on an explicit separator, read through the polars CSV reader.
fn read_delimited(text: &str, separator: char) -> CfResult<Vec<Vec<f64>>> {
    if !separator.is_ascii() {
        return Err(CfError::Parse(format!("separator '{separator}' is not a single byte")));
    }
    let joiner = separator.to_string();
    let cleaned: String = records(text)
        .map(|(_, line)| {
            let fields: Vec<&str> = line.split(separator).map(str::trim).collect();
            fields.join(&joiner) + "\n"
        })
        .collect();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    let frame = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(None)
        .with_parse_options(CsvParseOptions::default().with_separator(separator as u8))
        .into_reader_with_file_handle(Cursor::new(cleaned.into_bytes()))
        .finish()?;
    let columns = frame
        .get_columns()
        .iter()
        .map(|c| {
            let values = c.as_materialized_series().strict_cast(&DataType::Float64)?;
            Ok(values.f64()?.into_iter().collect::<Vec<Option<f64>>>())
        })
        .collect::<CfResult<Vec<_>>>()?;

    (0..frame.height())
        .map(|n| {
            columns
                .iter()
                .map(|c| c[n].ok_or_else(|| CfError::Parse(format!("record {}: missing value", n + 1))))
                .collect()
        })
        .collect()
}
