//! One-dimensional interpolants used to refill flagged RR intervals.
//!
//! Every method evaluates inside the span of the known abscissae and holds the
//! first/last known value outside it, so a flagged interval at either end of the
//! recording is never extrapolated into an implausible value.

use serde::{Deserialize, Serialize};

/// Resample known samples onto a grid.
pub trait Interpolator {
    /// `known_t` must be strictly increasing and non-empty, with `known_v` the same length.
    fn fill(&self, grid: &[f64], known_t: &[f64], known_v: &[f64]) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Shape-preserving piecewise cubic Hermite (Fritsch–Carlson slopes).
    Pchip,
    Linear,
    /// Cubic convolution on uniform spacing, not-a-knot spline otherwise.
    Cubic,
    Nearest,
    Next,
    Previous,
    /// Not-a-knot cubic spline.
    Spline,
    /// Modified Akima piecewise cubic.
    Makima,
}

impl Interpolator for Interpolation {
    fn fill(&self, grid: &[f64], known_t: &[f64], known_v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(known_t.len(), known_v.len());
        if known_t.is_empty() {
            return vec![f64::NAN; grid.len()];
        }
        if known_t.len() == 1 {
            return vec![known_v[0]; grid.len()];
        }
        match self {
            Interpolation::Linear => linear(grid, known_t, known_v),
            Interpolation::Nearest => stepwise(grid, known_t, known_v, Step::Nearest),
            Interpolation::Next => stepwise(grid, known_t, known_v, Step::Next),
            Interpolation::Previous => stepwise(grid, known_t, known_v, Step::Previous),
            Interpolation::Pchip => {
                hermite(grid, known_t, known_v, &pchip_slopes(known_t, known_v))
            }
            Interpolation::Makima => {
                hermite(grid, known_t, known_v, &makima_slopes(known_t, known_v))
            }
            Interpolation::Spline => {
                hermite(grid, known_t, known_v, &spline_slopes(known_t, known_v))
            }
            Interpolation::Cubic => {
                if known_t.len() >= 3 && is_uniform(known_t) {
                    cubic_convolution(grid, known_t, known_v)
                } else {
                    hermite(grid, known_t, known_v, &spline_slopes(known_t, known_v))
                }
            }
        }
    }
}

/// Evaluate `eval(k, x)` for `x` inside `[t[k], t[k+1]]`, holding end values outside.
fn piecewise(grid: &[f64], t: &[f64], v: &[f64], eval: impl Fn(usize, f64) -> f64) -> Vec<f64> {
    let last = t.len() - 1;
    grid.iter()
        .map(|&x| {
            if x <= t[0] {
                v[0]
            } else if x >= t[last] {
                v[last]
            } else {
                let k = t.partition_point(|&ti| ti <= x) - 1;
                eval(k, x)
            }
        })
        .collect()
}

fn linear(grid: &[f64], t: &[f64], v: &[f64]) -> Vec<f64> {
    piecewise(grid, t, v, |k, x| {
        let s = (x - t[k]) / (t[k + 1] - t[k]);
        v[k] + s * (v[k + 1] - v[k])
    })
}

#[derive(Clone, Copy)]
enum Step {
    Nearest,
    Next,
    Previous,
}

fn stepwise(grid: &[f64], t: &[f64], v: &[f64], step: Step) -> Vec<f64> {
    piecewise(grid, t, v, |k, x| {
        if x == t[k] {
            return v[k];
        }
        match step {
            Step::Previous => v[k],
            Step::Next => v[k + 1],
            Step::Nearest => {
                if x - t[k] < t[k + 1] - x {
                    v[k]
                } else {
                    v[k + 1]
                }
            }
        }
    })
}

fn hermite(grid: &[f64], t: &[f64], v: &[f64], d: &[f64]) -> Vec<f64> {
    piecewise(grid, t, v, |k, x| {
        let h = t[k + 1] - t[k];
        let s = (x - t[k]) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        (2.0 * s3 - 3.0 * s2 + 1.0) * v[k]
            + (s3 - 2.0 * s2 + s) * h * d[k]
            + (-2.0 * s3 + 3.0 * s2) * v[k + 1]
            + (s3 - s2) * h * d[k + 1]
    })
}

fn secants(t: &[f64], v: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let h: Vec<f64> = t.windows(2).map(|w| w[1] - w[0]).collect();
    let delta = v
        .windows(2)
        .zip(&h)
        .map(|(w, hk)| (w[1] - w[0]) / hk)
        .collect();
    (h, delta)
}

fn pchip_slopes(t: &[f64], v: &[f64]) -> Vec<f64> {
    let n = t.len();
    let (h, delta) = secants(t, v);
    if n == 2 {
        return vec![delta[0]; 2];
    }
    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if delta[k - 1] * delta[k] > 0.0 {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
        }
    }
    d[0] = pchip_end_slope(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = pchip_end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
    d
}

/// One-sided three-point slope, clipped to keep the end shape-preserving.
fn pchip_end_slope(h0: f64, h1: f64, del0: f64, del1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * del0 - h0 * del1) / (h0 + h1);
    if d * del0 <= 0.0 {
        0.0
    } else if del0 * del1 < 0.0 && d.abs() > 3.0 * del0.abs() {
        3.0 * del0
    } else {
        d
    }
}

fn makima_slopes(t: &[f64], v: &[f64]) -> Vec<f64> {
    let n = t.len();
    let (_, delta) = secants(t, v);
    if n == 2 {
        return vec![delta[0]; 2];
    }
    // Two ghost secants on each side.
    let m = delta.len();
    let mut ext = Vec::with_capacity(m + 4);
    let lead1 = 2.0 * delta[0] - delta[1];
    let lead0 = 2.0 * lead1 - delta[0];
    let tail1 = 2.0 * delta[m - 1] - delta[m - 2];
    let tail2 = 2.0 * tail1 - delta[m - 1];
    ext.push(lead0);
    ext.push(lead1);
    ext.extend_from_slice(&delta);
    ext.push(tail1);
    ext.push(tail2);

    (0..n)
        .map(|i| {
            // Secants around node i: ext[i], ext[i+1] | ext[i+2], ext[i+3].
            let (a, b, c, e) = (ext[i], ext[i + 1], ext[i + 2], ext[i + 3]);
            let w1 = (e - c).abs() + (e + c).abs() / 2.0;
            let w2 = (b - a).abs() + (b + a).abs() / 2.0;
            if w1 + w2 == 0.0 {
                0.0
            } else {
                (w1 * b + w2 * c) / (w1 + w2)
            }
        })
        .collect()
}

/// First derivatives of the not-a-knot cubic spline through (t, v).
fn spline_slopes(t: &[f64], v: &[f64]) -> Vec<f64> {
    let n = t.len();
    let (h, delta) = secants(t, v);
    if n == 2 {
        return vec![delta[0]; 2];
    }
    let mut m2 = vec![0.0; n];
    if n == 3 {
        // Not-a-knot on three points is the interpolating parabola.
        let c = 2.0 * (delta[1] - delta[0]) / (h[0] + h[1]);
        m2.iter_mut().for_each(|m| *m = c);
    } else {
        // Unknowns M[1..n-1]; M[0] and M[n-1] are eliminated by the not-a-knot conditions.
        let size = n - 2;
        let mut sub = vec![0.0; size];
        let mut diag = vec![0.0; size];
        let mut sup = vec![0.0; size];
        let mut rhs = vec![0.0; size];
        for r in 0..size {
            let i = r + 1;
            sub[r] = h[i - 1];
            diag[r] = 2.0 * (h[i - 1] + h[i]);
            sup[r] = h[i];
            rhs[r] = 6.0 * (delta[i] - delta[i - 1]);
        }
        let (h0, h1) = (h[0], h[1]);
        diag[0] = 3.0 * h0 + 2.0 * h1 + h0 * h0 / h1;
        sup[0] = h1 - h0 * h0 / h1;
        let (a, b) = (h[n - 3], h[n - 2]);
        sub[size - 1] = a - b * b / a;
        diag[size - 1] = 2.0 * a + 3.0 * b + b * b / a;

        let inner = solve_tridiagonal(&sub, &diag, &sup, &rhs);
        m2[1..n - 1].copy_from_slice(&inner);
        m2[0] = (1.0 + h0 / h1) * m2[1] - (h0 / h1) * m2[2];
        m2[n - 1] = (1.0 + b / a) * m2[n - 2] - (b / a) * m2[n - 3];
    }

    let mut d = vec![0.0; n];
    for k in 0..n - 1 {
        d[k] = delta[k] - h[k] * (2.0 * m2[k] + m2[k + 1]) / 6.0;
    }
    d[n - 1] = delta[n - 2] + h[n - 2] * (m2[n - 2] + 2.0 * m2[n - 1]) / 6.0;
    d
}

/// Thomas algorithm; `sub[0]` and `sup[last]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = if i + 1 < n { sup[i] / denom } else { 0.0 };
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }
    let mut x = vec![0.0; n];
    x[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    x
}

fn is_uniform(t: &[f64]) -> bool {
    let h0 = t[1] - t[0];
    t.windows(2)
        .all(|w| ((w[1] - w[0]) - h0).abs() <= 1e-9 * h0.abs().max(1.0))
}

/// Keys cubic convolution (a = -0.5) with the standard end extrapolation.
fn cubic_convolution(grid: &[f64], t: &[f64], v: &[f64]) -> Vec<f64> {
    let n = v.len();
    let before = 3.0 * v[0] - 3.0 * v[1] + v[2];
    let after = 3.0 * v[n - 1] - 3.0 * v[n - 2] + v[n - 3];
    let at = |i: isize| -> f64 {
        if i < 0 {
            before
        } else if i as usize >= n {
            after
        } else {
            v[i as usize]
        }
    };
    piecewise(grid, t, v, |k, x| {
        let s = (x - t[k]) / (t[k + 1] - t[k]);
        let k = k as isize;
        let (p0, p1, p2, p3) = (at(k - 1), at(k), at(k + 1), at(k + 2));
        p1 + 0.5 * s * (p2 - p0)
            + s * s * (p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3)
            + s * s * s * (-0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3)
    })
}
