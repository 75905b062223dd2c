use super::filters::{
    check_sampling_rate, derivative, filtfilt, median, median_filter, moving_sum, percentile,
    sombrero_kernel, square,
};
use crate::{
    error::{CardioError, Result},
    signal::{Events, Waveform},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Configurable parameters for the R-peak detector. Defaults reproduce the
/// reference Pan–Tompkins variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgDetectorConfig {
    /// Amplitude floor (mV) used by the flat-line guard.
    pub min_amplitude: f64,
    /// Fraction of band-passed samples that must exceed `min_amplitude`.
    pub min_active_fraction: f64,
    /// Moving-sum length in samples at 256 Hz, scaled to the input rate.
    pub integration_samples_256: f64,
    /// Median smoothing window of the energy envelope (seconds).
    pub median_window_s: f64,
    /// Recordings longer than this use `long_percentile` for the energy threshold.
    pub long_record_s: f64,
    pub long_percentile: f64,
    pub short_percentile: f64,
    /// Envelope span (seconds) sampled for the energy threshold; the start skips filter warm-up.
    pub threshold_start_s: f64,
    pub threshold_end_s: f64,
    /// Candidate regions are where the envelope exceeds `candidate_scale * threshold`.
    pub candidate_scale: f64,
    /// A gap longer than `search_back_gap * median gap` is rescanned.
    pub search_back_gap: f64,
    /// Relaxation applied to the candidate level during search-back.
    pub search_back_scale: f64,
    /// Leading span (seconds) that decides the global polarity.
    pub polarity_window_s: f64,
    /// Minimum distance between accepted peaks (seconds).
    pub refractory_s: f64,
}

impl Default for EcgDetectorConfig {
    fn default() -> Self {
        Self {
            min_amplitude: 0.1,
            min_active_fraction: 0.2,
            integration_samples_256: 7.0,
            median_window_s: 0.01,
            long_record_s: 10.0,
            long_percentile: 98.0,
            short_percentile: 99.0,
            threshold_start_s: 1.0,
            threshold_end_s: 90.0,
            candidate_scale: 0.6,
            search_back_gap: 1.5,
            search_back_scale: 0.5,
            polarity_window_s: 30.0,
            refractory_s: 0.25,
        }
    }
}

/// Orientation of the QRS complex in the band-passed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Positive => 1.0,
            Polarity::Negative => -1.0,
        }
    }
}

/// R-peaks plus the detector state that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcgDetection {
    pub events: Events,
    pub polarity: Polarity,
    pub energy_threshold: f64,
    #[serde(skip)]
    pub bandpassed: Vec<f64>,
}

/// Inclusive run of envelope samples above a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: usize,
    end: usize,
}

/// Detect R-peaks in a single ECG lead.
pub fn detect_r_peaks(ts: &Waveform, cfg: &EcgDetectorConfig) -> Result<EcgDetection> {
    let fs = ts.fs;
    check_sampling_rate(fs)?;
    let kernel = sombrero_kernel(fs);
    let bandpassed = filtfilt(&kernel, &ts.data)?;
    check_not_flat(&bandpassed, cfg)?;

    let envelope = energy_envelope(&bandpassed, fs, cfg);
    let energy_threshold = energy_threshold(&envelope, fs, cfg);
    let level = cfg.candidate_scale * energy_threshold;
    let refractory = ((cfg.refractory_s * fs).round() as usize).max(1);

    let segments = find_segments(&envelope, level, 0, envelope.len());
    let found = segments.len();
    let segments = search_back(
        &envelope,
        segments,
        cfg.search_back_scale * level,
        refractory,
        cfg.search_back_gap,
    );
    let polarity_span = (cfg.polarity_window_s * fs).round() as usize;
    let polarity = global_polarity(&bandpassed, &segments, polarity_span);

    let peaks: Vec<usize> = segments
        .iter()
        .map(|seg| locate_extremum(&bandpassed, *seg, polarity))
        .collect();
    let peaks = enforce_refractory(peaks, &bandpassed, refractory);
    debug!(
        "ecg `{}`: threshold {:.4}, {} candidates (+{} search-back), {:?} polarity, {} peaks",
        ts.label,
        energy_threshold,
        found,
        segments.len() - found,
        polarity,
        peaks.len()
    );

    Ok(EcgDetection {
        events: Events::from_indices(peaks),
        polarity,
        energy_threshold,
        bandpassed,
    })
}

fn check_not_flat(bandpassed: &[f64], cfg: &EcgDetectorConfig) -> Result<()> {
    let active = bandpassed
        .iter()
        .filter(|x| x.abs() > cfg.min_amplitude)
        .count();
    let active_fraction = active as f64 / bandpassed.len().max(1) as f64;
    if active_fraction < cfg.min_active_fraction {
        return Err(CardioError::FlatSignal {
            active_fraction,
            min_fraction: cfg.min_active_fraction,
        });
    }
    Ok(())
}

/// Differentiate, square, integrate, median-smooth and undo the integration delay.
fn energy_envelope(bandpassed: &[f64], fs: f64, cfg: &EcgDetectorConfig) -> Vec<f64> {
    let win = ((cfg.integration_samples_256 * fs / 256.0).round() as usize).max(1);
    let integrated = moving_sum(&square(&derivative(bandpassed)), win);
    let median_win = ((cfg.median_window_s * fs).round() as usize).max(1);
    let smoothed = median_filter(&integrated, median_win);
    let delay = win.div_ceil(2);
    let mut envelope: Vec<f64> = smoothed.into_iter().skip(delay).collect();
    envelope.resize(bandpassed.len(), 0.0);
    envelope
}

fn energy_threshold(envelope: &[f64], fs: f64, cfg: &EcgDetectorConfig) -> f64 {
    let n = envelope.len();
    let duration = n as f64 / fs;
    let p = if duration > cfg.long_record_s {
        cfg.long_percentile
    } else {
        cfg.short_percentile
    };
    let start = ((cfg.threshold_start_s * fs).round() as usize).min(n.saturating_sub(1));
    let end = ((cfg.threshold_end_s * fs).round() as usize).min(n);
    let span = if end > start {
        &envelope[start..end]
    } else {
        envelope
    };
    percentile(span, p).unwrap_or(0.0)
}

fn find_segments(envelope: &[f64], level: f64, from: usize, to: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = None;
    for i in from..to {
        if envelope[i] > level {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            segments.push(Segment { start: s, end: i - 1 });
        }
    }
    if let Some(s) = start {
        segments.push(Segment {
            start: s,
            end: to - 1,
        });
    }
    segments
}

/// Rescan unusually long gaps between candidates with a relaxed level.
fn search_back(
    envelope: &[f64],
    mut segments: Vec<Segment>,
    relaxed: f64,
    refractory: usize,
    gap_factor: f64,
) -> Vec<Segment> {
    if segments.len() < 3 {
        return segments;
    }
    let mut gaps: Vec<f64> = segments
        .windows(2)
        .map(|w| (w[1].start - w[0].start) as f64)
        .collect();
    let ordered_gaps = gaps.clone();
    let median_gap = median(&mut gaps).unwrap_or(0.0);

    let mut recovered = Vec::new();
    for (i, gap) in ordered_gaps.iter().enumerate() {
        if *gap <= gap_factor * median_gap {
            continue;
        }
        let from = segments[i].end + refractory;
        let to = segments[i + 1].start.saturating_sub(refractory);
        if from < to {
            recovered.extend(find_segments(envelope, relaxed, from, to));
        }
    }
    if !recovered.is_empty() {
        debug!("search-back recovered {} candidate(s)", recovered.len());
        segments.extend(recovered);
        segments.sort_by_key(|s| s.start);
    }
    segments
}

/// Sign of the median dominant extremum over segments in the leading span.
fn global_polarity(bandpassed: &[f64], segments: &[Segment], span: usize) -> Polarity {
    let dominant = |seg: &Segment| {
        let window = &bandpassed[seg.start..=seg.end];
        let hi = window.iter().copied().fold(f64::MIN, f64::max);
        let lo = window.iter().copied().fold(f64::MAX, f64::min);
        if hi.abs() >= lo.abs() {
            hi
        } else {
            lo
        }
    };
    let mut extrema: Vec<f64> = segments
        .iter()
        .filter(|seg| seg.start < span)
        .map(dominant)
        .collect();
    if extrema.is_empty() {
        extrema = segments.iter().map(dominant).collect();
    }
    match median(&mut extrema) {
        Some(m) if m < 0.0 => Polarity::Negative,
        _ => Polarity::Positive,
    }
}

fn locate_extremum(bandpassed: &[f64], seg: Segment, polarity: Polarity) -> usize {
    let sign = polarity.sign();
    let mut best = seg.start;
    for j in seg.start..=seg.end {
        if sign * bandpassed[j] > sign * bandpassed[best] {
            best = j;
        }
    }
    best
}

/// Keep the larger-amplitude peak of any pair closer than `refractory` samples.
fn enforce_refractory(mut peaks: Vec<usize>, bandpassed: &[f64], refractory: usize) -> Vec<usize> {
    peaks.sort_unstable();
    peaks.dedup();
    let mut accepted: Vec<usize> = Vec::with_capacity(peaks.len());
    for peak in peaks {
        match accepted.last_mut() {
            Some(last) if peak - *last < refractory => {
                if bandpassed[peak].abs() > bandpassed[*last].abs() {
                    *last = peak;
                }
            }
            _ => accepted.push(peak),
        }
    }
    accepted
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::PI;

    fn gauss(t: f64, sigma: f64) -> f64 {
        (-0.5 * (t / sigma).powi(2)).exp()
    }

    fn qrs(dt: f64) -> f64 {
        gauss(dt, 0.012) - 0.15 * gauss(dt + 0.03, 0.01) - 0.15 * gauss(dt - 0.03, 0.01)
    }

    /// PQRST train with baseline wander and tonal noise; returns the planted R-peak samples.
    pub(crate) fn synthetic_ecg(
        fs: f64,
        rr: &[f64],
        amp: f64,
        invert: bool,
    ) -> (Waveform, Vec<usize>) {
        let mut beats = vec![(0.6 * fs).round() as usize];
        for &interval in rr {
            let last = *beats.last().unwrap();
            beats.push(last + (interval * fs).round() as usize);
        }
        let samples = *beats.last().unwrap() + fs as usize;
        let data = (0..samples)
            .map(|i| {
                let t = i as f64 / fs;
                let mut v = 0.1 * (2.0 * PI * 0.3 * t).sin()
                    + 0.02
                        * ((2.0 * PI * 37.3 * t).sin()
                            + (2.0 * PI * 51.7 * t + 1.0).sin()
                            + (2.0 * PI * 61.1 * t + 2.0).sin())
                        / 3.0;
                for &b in &beats {
                    let dt = t - b as f64 / fs;
                    if dt.abs() > 0.6 {
                        continue;
                    }
                    v += amp
                        * (qrs(dt) + 0.12 * gauss(dt + 0.17, 0.025) + 0.3 * gauss(dt - 0.26, 0.05));
                }
                if invert {
                    -v
                } else {
                    v
                }
            })
            .collect();
        (Waveform::new("ecg", fs, data), beats)
    }

    const RR: [f64; 15] = [
        0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88, 0.8, 0.79, 0.83, 0.81, 0.8, 0.78, 0.82,
    ];

    fn assert_recovers(fs: f64, invert: bool) {
        let (ts, planted) = synthetic_ecg(fs, &RR, 1.0, invert);
        let det = detect_r_peaks(&ts, &EcgDetectorConfig::default()).expect("detect");
        assert_eq!(det.events.len(), planted.len(), "fs {fs}, invert {invert}");
        for (found, truth) in det.events.indices.iter().zip(&planted) {
            assert!(
                (*found as i64 - *truth as i64).abs() <= 1,
                "fs {fs}: peak {found} vs planted {truth}"
            );
        }
        let expected = if invert {
            Polarity::Negative
        } else {
            Polarity::Positive
        };
        assert_eq!(det.polarity, expected);
    }

    #[test]
    fn recovers_planted_peaks_at_design_rate() {
        assert_recovers(250.0, false);
    }

    #[test]
    fn recovers_inverted_lead_at_other_rates() {
        assert_recovers(360.0, true);
        assert_recovers(500.0, false);
    }

    #[test]
    fn search_back_recovers_weak_beat() {
        let fs = 250.0;
        let (mut ts, planted) = synthetic_ecg(fs, &[0.8; 14], 1.0, false);
        let weak = planted[7];
        for (i, v) in ts.data.iter_mut().enumerate() {
            let dt = (i as f64 - weak as f64) / fs;
            if dt.abs() < 0.1 {
                *v -= 0.4 * qrs(dt);
            }
        }
        let det = detect_r_peaks(&ts, &EcgDetectorConfig::default()).unwrap();
        assert_eq!(det.events.indices, planted);

        let cfg = EcgDetectorConfig {
            search_back_gap: f64::INFINITY,
            ..EcgDetectorConfig::default()
        };
        let without = detect_r_peaks(&ts, &cfg).unwrap();
        assert_eq!(without.events.len(), planted.len() - 1);
    }

    #[test]
    fn flat_line_is_rejected() {
        let ts = Waveform::new("flat", 250.0, vec![0.5; 2500]);
        let err = detect_r_peaks(&ts, &EcgDetectorConfig::default()).unwrap_err();
        assert!(matches!(err, CardioError::FlatSignal { .. }));
    }

    #[test]
    fn flat_guard_accepts_exactly_the_minimum_fraction() {
        let cfg = EcgDetectorConfig::default();
        let mut bandpassed = vec![0.0; 1000];
        bandpassed[..200].fill(1.0);
        assert!(check_not_flat(&bandpassed, &cfg).is_ok());

        bandpassed[199] = 0.0;
        let err = check_not_flat(&bandpassed, &cfg).unwrap_err();
        assert!(matches!(
            err,
            CardioError::FlatSignal { active_fraction, .. } if active_fraction < 0.2
        ));
    }

    #[test]
    fn low_amplitude_lead_is_not_flat_at_low_rates() {
        for fs in [100.0, 250.0] {
            let (ts, planted) = synthetic_ecg(fs, &[0.8; 12], 0.3, false);
            let det = detect_r_peaks(&ts, &EcgDetectorConfig::default())
                .unwrap_or_else(|e| panic!("fs {fs}: {e}"));
            assert_eq!(det.events.len(), planted.len(), "fs {fs}");
        }
    }

    #[test]
    fn short_input_is_rejected() {
        let ts = Waveform::new("short", 250.0, vec![0.0; 100]);
        let err = detect_r_peaks(&ts, &EcgDetectorConfig::default()).unwrap_err();
        assert!(matches!(err, CardioError::InsufficientSamples { .. }));
    }

    #[test]
    fn noisy_peaks_respect_refractory_period() {
        let fs = 250.0;
        let (mut ts, _) = synthetic_ecg(fs, &RR, 1.0, false);
        let mut rng = StdRng::seed_from_u64(7);
        for v in ts.data.iter_mut() {
            *v += rng.gen_range(-0.08..0.08);
        }
        let det = detect_r_peaks(&ts, &EcgDetectorConfig::default()).unwrap();
        let refractory = (0.25 * fs) as usize;
        assert!(det.events.len() >= RR.len());
        for w in det.events.indices.windows(2) {
            assert!(w[1] > w[0]);
            assert!(w[1] - w[0] >= refractory, "peaks {} and {} too close", w[0], w[1]);
        }
    }
}
