//! # Time Index
//!
//! Maps a continuous time onto a discrete slice of a strictly increasing time
//! axis. Two entry points are offered:
//!
//! - [`TimeIndex::bisect`] clamps: anything at or before the first sample is
//!   slice 0, anything at or after the last sample is the last slice.
//! - [`TimeIndex::lookup`] rejects times outside the axis with
//!   [`CfError::TimeOutOfRange`] and applies a [`Round`] policy between samples.
//!
//! The last slice found is remembered and tried first on the next query, so
//! sequential scans through time rarely need a full bisection.

use crate::error::{CfError, CfResult};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::str::FromStr;

/// Rounding policy for times falling between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Round {
    #[default]
    Nearest,
    Up,
    Down,
}

impl FromStr for Round {
    type Err = CfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "nearest" => Ok(Round::Nearest),
            "u" | "up" => Ok(Round::Up),
            "d" | "down" => Ok(Round::Down),
            other => Err(CfError::Parse(format!(
                "unknown rounding '{other}', expected one of n, u, d"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeIndex {
    times: Vec<f64>,
    hint: Cell<usize>,
}

impl TimeIndex {
    pub fn new(times: Vec<f64>) -> CfResult<Self> {
        if times.is_empty() {
            return Err(CfError::InvalidSelection("empty time axis".to_string()));
        }
        if times.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(CfError::InvalidSelection(
                "time axis is not strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            times,
            hint: Cell::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn first(&self) -> f64 {
        self.times[0]
    }

    pub fn last(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.first() && t <= self.last()
    }

    /// Index `i` with `times[i] <= t < times[i + 1]`, clamped to the axis.
    pub fn bisect(&self, t: f64) -> usize {
        let n = self.times.len();
        if t.is_nan() || t <= self.times[0] {
            return 0;
        }
        if t >= self.times[n - 1] {
            return n - 1;
        }

        let hint = self.hint.get();
        if hint + 1 < n && self.times[hint] <= t && t < self.times[hint + 1] {
            return hint;
        }
        if hint + 2 < n && self.times[hint + 1] <= t && t < self.times[hint + 2] {
            self.hint.set(hint + 1);
            return hint + 1;
        }

        let (mut lo, mut hi) = (0, n - 1);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if t < self.times[mid] {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        self.hint.set(lo);
        lo
    }

    /// Slice for `t`, failing when `t` lies outside the axis.
    ///
    /// A time equal to a sample maps to that sample whatever the policy.
    /// Halfway between two samples, `Nearest` picks the later one.
    pub fn lookup(&self, t: f64, round: Round) -> CfResult<usize> {
        if !self.contains(t) {
            return Err(CfError::TimeOutOfRange {
                time: t,
                first: self.first(),
                last: self.last(),
            });
        }
        let i = self.bisect(t);
        if self.times[i] == t || i + 1 >= self.times.len() {
            return Ok(i);
        }
        let (t0, t1) = (self.times[i], self.times[i + 1]);
        Ok(match round {
            Round::Down => i,
            Round::Up => i + 1,
            Round::Nearest => {
                if t - t0 < t1 - t {
                    i
                } else {
                    i + 1
                }
            }
        })
    }
}
