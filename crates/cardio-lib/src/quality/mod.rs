//! Windowed signal quality index (SQI) from beat template matching.
//!
//! Beats inside a window are averaged into a template; each beat is scored by how
//! well it correlates with that template (ECG also weighs energy consistency). A
//! window's score is the mean beat score, always in [0, 1] or missing.

use crate::{
    detectors::filters::median,
    signal::SignalKind,
    warnings::{Warning, WarningSink},
};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqiConfig {
    /// ECG scoring window (seconds).
    pub ecg_window_s: f64,
    /// PPG scoring window (seconds).
    pub ppg_window_s: f64,
    /// Recommended minimum SQI.
    pub threshold: f64,
    /// Warn when more than this percentage of windows is below `threshold`.
    pub max_poor_window_pct: f64,
    /// Beat annotation cut-offs.
    pub excellent: f64,
    pub acceptable: f64,
}

impl Default for SqiConfig {
    fn default() -> Self {
        Self {
            ecg_window_s: 10.0,
            ppg_window_s: 30.0,
            threshold: 0.9,
            max_poor_window_pct: 20.0,
            excellent: 0.9,
            acceptable: 0.5,
        }
    }
}

impl SqiConfig {
    pub fn window_s(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Ecg => self.ecg_window_s,
            SignalKind::Ppg => self.ppg_window_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeatAnnotation {
    Excellent,
    Acceptable,
    Unfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatQuality {
    /// Sample index of the beat.
    pub index: usize,
    pub score: Option<f64>,
    pub annotation: BeatAnnotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqiWindow {
    pub start_s: f64,
    pub end_s: f64,
    pub beats: usize,
    /// `None` when the window holds fewer than two complete beats.
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqiSummary {
    /// Mean over scored windows.
    pub mean: Option<f64>,
    /// Percentage of scored windows below `threshold`.
    pub pct_below: f64,
    pub threshold: f64,
    pub windows: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqiReport {
    pub windows: Vec<SqiWindow>,
    pub beats: Vec<BeatQuality>,
    pub summary: SqiSummary,
}

/// Beat extent relative to the median beat period: (before, after).
fn beat_span(kind: SignalKind) -> (f64, f64) {
    match kind {
        SignalKind::Ecg => (0.3, 0.6),
        SignalKind::Ppg => (0.1, 0.8),
    }
}

/// Score the quality of `signal` around the detected `peaks`.
pub fn score_quality(
    signal: &[f64],
    fs: f64,
    peaks: &[usize],
    kind: SignalKind,
    cfg: &SqiConfig,
) -> SqiReport {
    let window_len = ((cfg.window_s(kind) * fs).round() as usize).max(1);
    let n_windows = signal.len().div_ceil(window_len);

    let mut periods: Vec<f64> = peaks.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let period = median(&mut periods).unwrap_or(0.0);
    let (before, after) = beat_span(kind);
    let pre = (before * period).round() as usize;
    let post = (after * period).round() as usize;

    let mut beat_scores: Vec<Option<f64>> = vec![None; peaks.len()];
    let mut windows = Vec::with_capacity(n_windows);
    for w in 0..n_windows {
        let lo = w * window_len;
        let hi = ((w + 1) * window_len).min(signal.len());
        let members: Vec<usize> = (0..peaks.len())
            .filter(|&b| peaks[b] >= lo && peaks[b] < hi)
            .collect();
        let complete: Vec<(usize, &[f64])> = members
            .iter()
            .filter_map(|&b| beat_segment(signal, peaks[b], pre, post).map(|seg| (b, seg)))
            .collect();

        let score = if complete.len() < 2 {
            None
        } else {
            let template = mean_template(complete.iter().map(|(_, seg)| *seg));
            let mut total = 0.0;
            for (b, seg) in &complete {
                let s = beat_score(seg, &template, kind);
                beat_scores[*b] = Some(s);
                total += s;
            }
            Some((total / complete.len() as f64).clamp(0.0, 1.0))
        };
        windows.push(SqiWindow {
            start_s: lo as f64 / fs,
            end_s: hi as f64 / fs,
            beats: members.len(),
            score,
        });
    }

    let beats = peaks
        .iter()
        .zip(&beat_scores)
        .map(|(&index, &score)| BeatQuality {
            index,
            score,
            annotation: annotate(score, cfg),
        })
        .collect();
    let summary = summarize(&windows, cfg.threshold);
    debug!(
        "sqi: {} windows, {} missing, mean {:?}",
        summary.windows, summary.missing, summary.mean
    );
    SqiReport {
        windows,
        beats,
        summary,
    }
}

fn beat_segment(signal: &[f64], peak: usize, pre: usize, post: usize) -> Option<&[f64]> {
    if post == 0 || peak < pre || peak + post >= signal.len() {
        return None;
    }
    Some(&signal[peak - pre..=peak + post])
}

fn mean_template<'a>(segments: impl Iterator<Item = &'a [f64]>) -> Vec<f64> {
    let mut template: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for seg in segments {
        if template.is_empty() {
            template = vec![0.0; seg.len()];
        }
        for (t, v) in template.iter_mut().zip(seg) {
            *t += v;
        }
        count += 1;
    }
    template.iter_mut().for_each(|t| *t /= count.max(1) as f64);
    template
}

fn centred_energy(data: &[f64]) -> (Vec<f64>, f64) {
    let mean = data.iter().sum::<f64>() / data.len().max(1) as f64;
    let centred: Vec<f64> = data.iter().map(|v| v - mean).collect();
    let energy = centred.iter().map(|v| v * v).sum();
    (centred, energy)
}

fn beat_score(seg: &[f64], template: &[f64], kind: SignalKind) -> f64 {
    let (a, ea) = centred_energy(seg);
    let (b, eb) = centred_energy(template);
    if ea <= 0.0 || eb <= 0.0 {
        return 0.0;
    }
    let r = a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>() / (ea * eb).sqrt();
    let similarity = r.max(0.0);
    let score = match kind {
        SignalKind::Ecg => similarity * ea.min(eb) / ea.max(eb),
        SignalKind::Ppg => similarity,
    };
    score.clamp(0.0, 1.0)
}

fn annotate(score: Option<f64>, cfg: &SqiConfig) -> BeatAnnotation {
    match score {
        Some(s) if s >= cfg.excellent => BeatAnnotation::Excellent,
        Some(s) if s >= cfg.acceptable => BeatAnnotation::Acceptable,
        _ => BeatAnnotation::Unfit,
    }
}

fn summarize(windows: &[SqiWindow], threshold: f64) -> SqiSummary {
    let scored: Vec<f64> = windows.iter().filter_map(|w| w.score).collect();
    let mean = if scored.is_empty() {
        None
    } else {
        Some(scored.iter().sum::<f64>() / scored.len() as f64)
    };
    let below = scored.iter().filter(|&&s| s < threshold).count();
    let pct_below = if scored.is_empty() {
        0.0
    } else {
        100.0 * below as f64 / scored.len() as f64
    };
    SqiSummary {
        mean,
        pct_below,
        threshold,
        windows: windows.len(),
        missing: windows.len() - scored.len(),
    }
}

/// Emit the quality warnings for one channel's summary.
pub fn check_quality(
    summary: &SqiSummary,
    channel: usize,
    cfg: &SqiConfig,
    sink: &mut dyn WarningSink,
) {
    if let Some(mean) = summary.mean {
        if mean < cfg.threshold {
            sink.warn(Warning::LowMeanQuality {
                channel,
                value: mean,
                threshold: cfg.threshold,
            });
        }
    }
    if summary.pct_below > cfg.max_poor_window_pct {
        sink.warn(Warning::PoorQualityWindows {
            channel,
            value: summary.pct_below,
            threshold: cfg.max_poor_window_pct,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ecg::tests::synthetic_ecg;
    use crate::detectors::{detect_beats, DetectorConfig};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn ecg_report(noise: f64) -> SqiReport {
        let (mut ts, _) = synthetic_ecg(250.0, &[0.8; 40], 1.0, false);
        let mut rng = StdRng::seed_from_u64(11);
        let det = detect_beats(&ts, SignalKind::Ecg, &DetectorConfig::default()).unwrap();
        for v in ts.data.iter_mut() {
            *v += rng.gen_range(-noise..=noise);
        }
        score_quality(
            &ts.data,
            ts.fs,
            &det.events.indices,
            SignalKind::Ecg,
            &SqiConfig::default(),
        )
    }

    #[test]
    fn clean_ecg_scores_high() {
        let report = ecg_report(0.0);
        let mean = report.summary.mean.unwrap();
        assert!(mean > 0.93, "mean {mean}");
        assert_eq!(report.summary.pct_below, 0.0);
        let mut sink = Vec::new();
        check_quality(&report.summary, 0, &SqiConfig::default(), &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn scores_stay_in_unit_range_under_noise() {
        let clean = ecg_report(0.0).summary.mean.unwrap();
        let report = ecg_report(0.6);
        for w in &report.windows {
            if let Some(s) = w.score {
                assert!((0.0..=1.0).contains(&s));
            }
        }
        for b in &report.beats {
            if let Some(s) = b.score {
                assert!((0.0..=1.0).contains(&s));
            }
        }
        assert!(report.summary.mean.unwrap() < clean);
    }

    #[test]
    fn sparse_window_is_missing() {
        let signal = vec![0.0; 2500];
        let report =
            score_quality(&signal, 250.0, &[200, 2300], SignalKind::Ecg, &SqiConfig::default());
        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].score, None);
        assert_eq!(report.summary.mean, None);
        assert_eq!(report.summary.missing, 1);
        assert!(report
            .beats
            .iter()
            .all(|b| b.annotation == BeatAnnotation::Unfit));
    }

    #[test]
    fn low_mean_quality_warns_without_failing() {
        let summary = SqiSummary {
            mean: Some(0.85),
            pct_below: 10.0,
            threshold: 0.9,
            windows: 10,
            missing: 0,
        };
        let mut sink = Vec::new();
        check_quality(&summary, 3, &SqiConfig::default(), &mut sink);
        assert_eq!(
            sink,
            vec![Warning::LowMeanQuality {
                channel: 3,
                value: 0.85,
                threshold: 0.9
            }]
        );
    }

    #[test]
    fn many_poor_windows_warn_separately() {
        let summary = SqiSummary {
            mean: Some(0.95),
            pct_below: 25.0,
            threshold: 0.9,
            windows: 4,
            missing: 0,
        };
        let mut sink = Vec::new();
        check_quality(&summary, 0, &SqiConfig::default(), &mut sink);
        assert!(matches!(
            sink.as_slice(),
            [Warning::PoorQualityWindows { value, .. }] if *value == 25.0
        ));
    }

    #[test]
    fn ppg_beats_are_annotated() {
        use std::f64::consts::PI;
        let fs = 125.0;
        let period = 100usize;
        let signal: Vec<f64> = (0..3750)
            .map(|i| (2.0 * PI * (i % period) as f64 / period as f64).sin())
            .collect();
        let peaks: Vec<usize> = (1..37).map(|k| k * period).collect();
        let report = score_quality(&signal, fs, &peaks, SignalKind::Ppg, &SqiConfig::default());
        assert_eq!(report.windows.len(), 1);
        assert!((report.windows[0].score.unwrap() - 1.0).abs() < 1e-9);
        assert!(report.beats[..report.beats.len() - 1]
            .iter()
            .all(|b| b.annotation == BeatAnnotation::Excellent));
    }
}
