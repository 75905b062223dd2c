//! Filtering and order-statistic helpers shared by the beat detectors.

use crate::error::{CardioError, Result};
use num_traits::Float;
use realfft::RealFftPlanner;

/// Sampling rate the sombrero-hat kernel was designed for.
pub const SOMBRERO_DESIGN_FS: f64 = 250.0;

/// Band-pass "sombrero hat" FIR kernel at 250 Hz.
pub const SOMBRERO_KERNEL: [f64; 41] = [
    -7.757327341237223e-05,
    -2.357742589814283e-04,
    -6.689305101192819e-04,
    -0.001770119249103,
    -0.004364327211358,
    -0.010013251577232,
    -0.021344241245400,
    -0.042182820580118,
    -0.077080889653194,
    -0.129740392318591,
    -0.200064921294891,
    -0.280328573340852,
    -0.352139052257134,
    -0.386867664739069,
    -0.351974030208595,
    -0.223363323458050,
    0.0,
    0.286427448595213,
    0.574058766243311,
    0.788100265785590,
    0.867325070584078,
    0.788100265785590,
    0.574058766243311,
    0.286427448595213,
    0.0,
    -0.223363323458050,
    -0.351974030208595,
    -0.386867664739069,
    -0.352139052257134,
    -0.280328573340852,
    -0.200064921294891,
    -0.129740392318591,
    -0.077080889653194,
    -0.042182820580118,
    -0.021344241245400,
    -0.010013251577232,
    -0.004364327211358,
    -0.001770119249103,
    -6.689305101192819e-04,
    -2.357742589814283e-04,
    -7.757327341237223e-05,
];

/// The sombrero kernel stretched onto the time grid of `fs`.
///
/// The tap count scales with `fs / 250` (kept odd so the kernel stays centred) and
/// each tap linearly interpolates the design kernel at the matching time offset.
/// Taps are scaled by `250 / fs` so the pass-band gain matches the design rate.
pub fn sombrero_kernel(fs: f64) -> Vec<f64> {
    if (fs - SOMBRERO_DESIGN_FS).abs() < 1e-9 {
        return SOMBRERO_KERNEL.to_vec();
    }
    let last = (SOMBRERO_KERNEL.len() - 1) as f64;
    let centre = last / 2.0;
    let gain = SOMBRERO_DESIGN_FS / fs;
    let mut taps = ((SOMBRERO_KERNEL.len() as f64 / gain).round() as usize).max(3);
    if taps % 2 == 0 {
        taps += 1;
    }
    let half = (taps - 1) as f64 / 2.0;
    (0..taps)
        .map(|i| {
            let pos = centre + (i as f64 - half) * gain;
            if pos < 0.0 || pos > last {
                return 0.0;
            }
            let lo = pos.floor() as usize;
            let frac = pos - lo as f64;
            let tap = if lo + 1 > SOMBRERO_KERNEL.len() - 1 {
                SOMBRERO_KERNEL[lo]
            } else {
                SOMBRERO_KERNEL[lo] * (1.0 - frac) + SOMBRERO_KERNEL[lo + 1] * frac
            };
            tap * gain
        })
        .collect()
}

pub fn check_sampling_rate(fs: f64) -> Result<()> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(CardioError::InvalidSamplingRate(fs))
    }
}

/// Causal FIR filter; samples before the start are held at `data[0]`.
fn fir(kernel: &[f64], data: &[f64]) -> Vec<f64> {
    let first = data.first().copied().unwrap_or(0.0);
    (0..data.len())
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, &b)| b * if k <= i { data[i - k] } else { first })
                .sum()
        })
        .collect()
}

/// Zero-phase FIR filtering: forward pass, backward pass, with odd reflection
/// padding of `3 * (taps - 1)` samples at each end.
pub fn filtfilt(kernel: &[f64], data: &[f64]) -> Result<Vec<f64>> {
    let pad = 3 * kernel.len().saturating_sub(1);
    let n = data.len();
    if n <= pad {
        return Err(CardioError::InsufficientSamples {
            needed: pad,
            available: n,
        });
    }
    let first = data[0];
    let last = data[n - 1];
    let mut padded = Vec::with_capacity(n + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    padded.extend_from_slice(data);
    padded.extend((1..=pad).map(|i| 2.0 * last - data[n - 1 - i]));

    let mut forward = fir(kernel, &padded);
    forward.reverse();
    let mut backward = fir(kernel, &forward);
    backward.reverse();
    Ok(backward[pad..pad + n].to_vec())
}

pub fn derivative(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

pub fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Causal moving sum over `win` samples.
pub fn moving_sum(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc;
    }
    out
}

/// Centred running median; the window is truncated at the edges.
pub fn median_filter(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 || data.is_empty() {
        return data.to_vec();
    }
    let half = win / 2;
    let mut scratch = Vec::with_capacity(win);
    (0..data.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + win - half).min(data.len());
            scratch.clear();
            scratch.extend_from_slice(&data[lo..hi]);
            median(&mut scratch).unwrap_or(0.0)
        })
        .collect()
}

/// Median of `values` (reorders the slice). NaNs sort last.
pub fn median<T: Float>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let two = T::one() + T::one();
        Some((values[mid - 1] + values[mid]) / two)
    }
}

/// Linear-interpolated percentile, `p` in [0, 100].
pub fn percentile<T: Float>(values: &[T], p: T) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
    let hundred = T::from(100.0)?;
    let rank = p.max(T::zero()).min(hundred) / hundred * T::from(sorted.len() - 1)?;
    let lo = rank.floor().to_usize()?;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = rank - rank.floor();
    Some(sorted[lo] * (T::one() - frac) + sorted[hi] * frac)
}

pub fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

pub fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Run a causal filter forward then backward to cancel its phase lag.
pub fn zero_phase(data: &[f64], filter: impl Fn(&[f64]) -> Vec<f64>) -> Vec<f64> {
    let mut forward = filter(data);
    forward.reverse();
    let mut backward = filter(&forward);
    backward.reverse();
    backward
}

/// Fourier-domain resampling from `from_fs` to `to_fs`.
pub fn resample(data: &[f64], from_fs: f64, to_fs: f64) -> Result<Vec<f64>> {
    check_sampling_rate(from_fs)?;
    check_sampling_rate(to_fs)?;
    let n = data.len();
    let m = (n as f64 * to_fs / from_fs).round() as usize;
    if n == 0 || m == 0 {
        return Ok(Vec::new());
    }
    if m == n {
        return Ok(data.to_vec());
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let c2r = planner.plan_fft_inverse(m);

    let mut input = data.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)
        .map_err(|e| CardioError::Fft(e.to_string()))?;

    let mut target = c2r.make_input_vec();
    let keep = spectrum.len().min(target.len());
    target[..keep].copy_from_slice(&spectrum[..keep]);
    target[0].im = 0.0;
    if m % 2 == 0 {
        if let Some(nyquist) = target.last_mut() {
            nyquist.im = 0.0;
        }
    }

    let mut output = c2r.make_output_vec();
    c2r.process(&mut target, &mut output)
        .map_err(|e| CardioError::Fft(e.to_string()))?;
    let scale = 1.0 / n as f64;
    Ok(output.into_iter().map(|v| v * scale).collect())
}
