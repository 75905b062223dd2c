use super::filters::{
    check_sampling_rate, resample, single_pole_highpass, single_pole_lowpass, zero_phase,
};
use crate::{
    error::{CardioError, Result},
    signal::{Events, Waveform},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Slope-sum pulse-onset detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpgDetectorConfig {
    /// Rate the detector runs at; other inputs are resampled.
    pub target_fs: f64,
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    /// Slope-sum integration window (seconds).
    pub slope_window_s: f64,
    /// Leading span (seconds) that seeds the adaptive threshold.
    pub learning_s: f64,
    /// Decision level as a fraction of the running slope-sum peak estimate.
    pub threshold_fraction: f64,
    /// How far before a threshold crossing the onset may lie (seconds).
    pub onset_search_s: f64,
    pub refractory_s: f64,
    /// Halve the peak estimate when no crossing happens for this long (seconds).
    pub timeout_s: f64,
    /// Fraction of samples that must change value for the channel to count as live.
    pub min_active_fraction: f64,
}

impl Default for PpgDetectorConfig {
    fn default() -> Self {
        Self {
            target_fs: 125.0,
            highpass_hz: 0.5,
            lowpass_hz: 8.0,
            slope_window_s: 0.128,
            learning_s: 8.0,
            threshold_fraction: 1.0 / 3.0,
            onset_search_s: 0.15,
            refractory_s: 0.25,
            timeout_s: 2.5,
            min_active_fraction: 0.2,
        }
    }
}

/// Pulse onsets plus the band-limited signal at the input rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpgDetection {
    pub events: Events,
    #[serde(skip)]
    pub filtered: Vec<f64>,
}

/// Detect pulse onsets in a PPG channel.
pub fn detect_pulse_onsets(ts: &Waveform, cfg: &PpgDetectorConfig) -> Result<PpgDetection> {
    check_sampling_rate(ts.fs)?;
    check_not_flat(&ts.data, cfg)?;

    let fs = cfg.target_fs;
    let resampled = if (ts.fs - fs).abs() > 1e-9 {
        resample(&ts.data, ts.fs, fs)?
    } else {
        ts.data.clone()
    };
    let baseline_free = zero_phase(&resampled, |s| single_pole_highpass(s, fs, cfg.highpass_hz));
    let smooth = zero_phase(&baseline_free, |s| single_pole_lowpass(s, fs, cfg.lowpass_hz));
    let ssf = slope_sum(&smooth, ((cfg.slope_window_s * fs).round() as usize).max(1));

    let onsets = pick_onsets(&ssf, &baseline_free, fs, cfg);
    let last = ts.len().saturating_sub(1);
    let mut indices: Vec<usize> = onsets
        .iter()
        .map(|&o| ((o as f64 * ts.fs / fs).round() as usize).min(last))
        .collect();
    indices.dedup();
    debug!("ppg `{}`: {} onsets at {} Hz", ts.label, indices.len(), fs);

    let filtered = zero_phase(
        &zero_phase(&ts.data, |s| single_pole_highpass(s, ts.fs, cfg.highpass_hz)),
        |s| single_pole_lowpass(s, ts.fs, cfg.lowpass_hz),
    );
    Ok(PpgDetection {
        events: Events::from_indices(indices),
        filtered,
    })
}

fn check_not_flat(data: &[f64], cfg: &PpgDetectorConfig) -> Result<()> {
    let changing = data
        .windows(2)
        .filter(|w| (w[1] - w[0]).abs() > f64::EPSILON)
        .count();
    let active_fraction = changing as f64 / data.len().saturating_sub(1).max(1) as f64;
    if active_fraction < cfg.min_active_fraction {
        return Err(CardioError::FlatSignal {
            active_fraction,
            min_fraction: cfg.min_active_fraction,
        });
    }
    Ok(())
}

/// Running sum of positive first differences over `win` samples.
fn slope_sum(data: &[f64], win: usize) -> Vec<f64> {
    let mut rises = vec![0.0; data.len()];
    for i in 1..data.len() {
        rises[i] = (data[i] - data[i - 1]).max(0.0);
    }
    super::filters::moving_sum(&rises, win)
}

fn pick_onsets(ssf: &[f64], baseline_free: &[f64], fs: f64, cfg: &PpgDetectorConfig) -> Vec<usize> {
    if ssf.len() < 2 {
        return Vec::new();
    }
    let learning = ((cfg.learning_s * fs).round() as usize).clamp(1, ssf.len());
    let seed = ssf[..learning].iter().sum::<f64>() / learning as f64;
    let mut peak_estimate = 3.0 * seed;

    let refractory = ((cfg.refractory_s * fs).round() as usize).max(1);
    let search = (cfg.onset_search_s * fs).round() as usize;
    let timeout = ((cfg.timeout_s * fs).round() as usize).max(1);

    let mut onsets: Vec<usize> = Vec::new();
    let mut last_crossing = 0usize;
    for i in 1..ssf.len() {
        let threshold = cfg.threshold_fraction * peak_estimate;
        if ssf[i] > threshold && ssf[i - 1] <= threshold {
            let end = (i + refractory).min(ssf.len());
            let peak = ssf[i..end].iter().copied().fold(f64::MIN, f64::max);
            peak_estimate += (peak - peak_estimate) / 10.0;

            let from = i.saturating_sub(search);
            let mut onset = from;
            for j in from..=i {
                if baseline_free[j] < baseline_free[onset] {
                    onset = j;
                }
            }
            if onsets.last().map_or(true, |&prev| onset >= prev + refractory) {
                onsets.push(onset);
            }
            last_crossing = i;
        } else if i - last_crossing > timeout {
            peak_estimate *= 0.5;
            last_crossing = i;
        }
    }
    onsets
}
