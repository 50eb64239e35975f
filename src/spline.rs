//! Natural cubic splines and the separable bicubic interpolation built on them.

use crate::error::{CfError, CfResult};

/// Natural cubic spline through `(x[i], y[i])`, zero curvature at both ends.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn new(x: &[f64], y: &[f64]) -> CfResult<Self> {
        if x.len() != y.len() {
            return Err(CfError::DimensionMismatch(format!(
                "spline abscissa has {} points, ordinate {}",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(CfError::DimensionMismatch(
                "spline needs at least two points".to_string(),
            ));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(CfError::DimensionMismatch(
                "spline abscissa must be strictly increasing".to_string(),
            ));
        }

        let n = x.len();
        let mut m = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm on the interior knots
            let k = n - 2;
            let mut diag = vec![0.0; k];
            let mut upper = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for i in 0..k {
                let h0 = x[i + 1] - x[i];
                let h1 = x[i + 2] - x[i + 1];
                diag[i] = 2.0 * (h0 + h1);
                upper[i] = h1;
                rhs[i] = 6.0 * ((y[i + 2] - y[i + 1]) / h1 - (y[i + 1] - y[i]) / h0);
            }
            for i in 1..k {
                let lower = x[i + 1] - x[i];
                let w = lower / diag[i - 1];
                diag[i] -= w * upper[i - 1];
                rhs[i] -= w * rhs[i - 1];
            }
            m[k] = rhs[k - 1] / diag[k - 1];
            for i in (0..k - 1).rev() {
                m[i + 1] = (rhs[i] - upper[i] * m[i + 2]) / diag[i];
            }
        }

        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    /// Evaluates the spline; outside the knots the end polynomials are extended.
    pub fn eval(&self, at: f64) -> f64 {
        let n = self.x.len();
        let i = self.x.partition_point(|&v| v <= at).clamp(1, n - 1) - 1;
        let h = self.x[i + 1] - self.x[i];
        let a = (self.x[i + 1] - at) / h;
        let b = (at - self.x[i]) / h;
        a * self.y[i]
            + b * self.y[i + 1]
            + ((a * a * a - a) * self.m[i] + (b * b * b - b) * self.m[i + 1]) * h * h / 6.0
    }
}

/// Bicubic interpolation of a grid stored as `values[i * ny + j]` (x-major),
/// splining each x column along y and then the resulting row along x.
pub fn interpolate_grid(xs: &[f64], ys: &[f64], values: &[f64], at: (f64, f64)) -> CfResult<f64> {
    if values.len() != xs.len() * ys.len() {
        return Err(CfError::DimensionMismatch(format!(
            "grid of {}x{} cannot hold {} values",
            xs.len(),
            ys.len(),
            values.len()
        )));
    }
    let ny = ys.len();
    let row: Vec<f64> = values
        .chunks(ny)
        .map(|column| CubicSpline::new(ys, column).map(|s| s.eval(at.1)))
        .collect::<CfResult<_>>()?;
    Ok(CubicSpline::new(xs, &row)?.eval(at.0))
}
