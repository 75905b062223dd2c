//! Waveforms in, one NN series out.
//!
//! Each channel is detected, scored and corrected independently. Channels that
//! fail are reported and skipped; the channel with the lowest artifact share
//! provides the final NN series.

use crate::{
    artifacts::{ArtifactCounts, Correction, CorrectionMethod, RrCorrector},
    config::PipelineConfig,
    detectors::{detect_beats, BeatDetection},
    error::{CardioError, Result},
    quality::{check_quality, score_quality, SqiReport, SqiSummary},
    selection::{check_artifact_ratio, select_channel, ChannelSelection},
    signal::{SignalKind, Waveform},
    warnings::{Warning, WarningSink},
};
use log::{debug, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Everything computed for one usable channel.
#[derive(Debug, Clone)]
pub struct ChannelResult {
    pub detection: BeatDetection,
    pub quality: SqiReport,
    /// Already trimmed of the first interval.
    pub correction: Correction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Processed {
        beats: usize,
        mean_sqi: Option<f64>,
        pct_below_threshold: f64,
        artifact_pct: f64,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub index: usize,
    pub label: String,
    pub outcome: ChannelOutcome,
}

/// Result of a pipeline run.
///
/// RR-derived series (`rr`, `heart_rate`, `flags`, `nn`) exclude the first
/// interval; `peaks` holds every detected beat of the selected channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub kind: SignalKind,
    pub method: CorrectionMethod,
    pub selection: ChannelSelection,
    pub peaks: Vec<usize>,
    pub peak_times: Vec<f64>,
    pub rr: Vec<f64>,
    pub rr_times: Vec<f64>,
    pub heart_rate: Vec<f64>,
    pub nn: Vec<f64>,
    pub nn_times: Vec<f64>,
    pub flags: Vec<bool>,
    pub artifact_count: usize,
    pub flagged_fraction: f64,
    pub artifact_counts: ArtifactCounts,
    pub quality: SqiSummary,
    pub channels: Vec<ChannelReport>,
    pub warnings: Vec<Warning>,
}

/// Detect, score and correct one channel. Quality warnings go to `sink`.
pub fn process_channel(
    index: usize,
    ts: &Waveform,
    kind: SignalKind,
    cfg: &PipelineConfig,
    sink: &mut dyn WarningSink,
) -> Result<ChannelResult> {
    let detection = detect_beats(ts, kind, &cfg.detector)?;
    let quality = score_quality(
        &detection.filtered,
        ts.fs,
        &detection.events.indices,
        kind,
        &cfg.sqi,
    );
    check_quality(&quality.summary, index, &cfg.sqi, sink);
    let correction = RrCorrector::new(cfg.artifacts, cfg.method).correct_and_trim(&detection.rr)?;
    debug!(
        "channel {index} (`{}`): {} beats, {:.1}% artifacts",
        ts.label,
        detection.events.len(),
        correction.artifact_pct()
    );
    Ok(ChannelResult {
        detection,
        quality,
        correction,
    })
}

fn run_channel(
    index: usize,
    ts: &Waveform,
    kind: SignalKind,
    cfg: &PipelineConfig,
) -> (Result<ChannelResult>, Vec<Warning>) {
    let mut buffered: Vec<Warning> = Vec::new();
    let result = process_channel(index, ts, kind, cfg, &mut buffered);
    (result, buffered)
}

/// Run every channel, pick the best one and return its NN series.
///
/// Warnings are delivered to `sink` in channel order once all channels have
/// finished, and are also kept in the output.
pub fn run_pipeline(
    waves: &[Waveform],
    kind: SignalKind,
    cfg: &PipelineConfig,
    sink: &mut dyn WarningSink,
) -> Result<PipelineOutput> {
    #[cfg(feature = "parallel")]
    let results: Vec<_> = waves
        .par_iter()
        .enumerate()
        .map(|(i, ts)| run_channel(i, ts, kind, cfg))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = waves
        .iter()
        .enumerate()
        .map(|(i, ts)| run_channel(i, ts, kind, cfg))
        .collect();

    let mut warnings = Vec::new();
    let mut channels = Vec::with_capacity(waves.len());
    let mut usable: Vec<Option<ChannelResult>> = Vec::with_capacity(waves.len());
    for (index, (ts, (result, buffered))) in waves.iter().zip(results).enumerate() {
        warnings.extend(buffered);
        let outcome = match &result {
            Ok(r) => ChannelOutcome::Processed {
                beats: r.detection.events.len(),
                mean_sqi: r.quality.summary.mean,
                pct_below_threshold: r.quality.summary.pct_below,
                artifact_pct: r.correction.artifact_pct(),
            },
            Err(err) => {
                warn!("channel {index} (`{}`) excluded: {err}", ts.label);
                ChannelOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        channels.push(ChannelReport {
            index,
            label: ts.label.clone(),
            outcome,
        });
        usable.push(result.ok());
    }

    let candidates = usable.iter().enumerate().filter_map(|(index, r)| {
        r.as_ref().map(|r| ChannelSelection {
            index,
            label: waves[index].label.clone(),
            artifact_pct: r.correction.artifact_pct(),
        })
    });
    let selection = select_channel(candidates).ok_or(CardioError::NoUsablePeaks)?;
    check_artifact_ratio(&selection, waves.len(), cfg.max_artifact_pct, &mut warnings);

    let best = usable
        .get_mut(selection.index)
        .and_then(Option::take)
        .ok_or(CardioError::NoUsablePeaks)?;
    for w in &warnings {
        sink.warn(w.clone());
    }
    Ok(assemble(kind, cfg.method, selection, best, channels, warnings))
}

fn assemble(
    kind: SignalKind,
    method: CorrectionMethod,
    selection: ChannelSelection,
    best: ChannelResult,
    channels: Vec<ChannelReport>,
    warnings: Vec<Warning>,
) -> PipelineOutput {
    let ChannelResult {
        detection,
        quality,
        correction,
    } = best;
    let skip = usize::from(!detection.rr.is_empty());
    PipelineOutput {
        kind,
        method,
        selection,
        peak_times: detection.times,
        peaks: detection.events.indices,
        rr: detection.rr.rr[skip..].to_vec(),
        rr_times: detection.rr.times[skip..].to_vec(),
        heart_rate: detection.heart_rate[skip..].to_vec(),
        artifact_count: correction.artifact_count(),
        flagged_fraction: correction.flagged_fraction(),
        artifact_counts: correction.counts(),
        nn: correction.nn,
        nn_times: correction.nn_times,
        flags: correction.flags,
        quality: quality.summary,
        channels,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detectors::ecg::tests::synthetic_ecg, warnings::NullSink};

    fn ectopic_rr() -> Vec<f64> {
        vec![0.8, 0.8, 0.8, 0.8, 0.45, 1.15, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8]
    }

    #[test]
    fn picks_clean_channel_and_skips_flat_one() {
        let (ectopic, _) = synthetic_ecg(250.0, &ectopic_rr(), 1.0, false);
        let (clean, planted) = synthetic_ecg(250.0, &[0.8; 12], 1.0, false);
        let flat = Waveform::new("flat", 250.0, vec![0.02; clean.len()]);
        let waves = vec![
            Waveform::new("lead-a", 250.0, ectopic.data),
            flat,
            Waveform::new("lead-c", 250.0, clean.data),
        ];

        let mut sink: Vec<Warning> = Vec::new();
        let out =
            run_pipeline(&waves, SignalKind::Ecg, &PipelineConfig::default(), &mut sink).unwrap();

        assert_eq!(out.selection.index, 2);
        assert_eq!(out.selection.label, "lead-c");
        assert_eq!(out.selection.artifact_pct, 0.0);
        assert_eq!(out.peaks, planted);
        assert_eq!(out.nn.len(), planted.len() - 2);
        assert_eq!(out.nn_times.len(), out.nn.len());
        assert_eq!(out.flags.len(), out.rr.len());
        assert_eq!(out.heart_rate.len(), out.rr.len());
        assert!(out.nn.iter().all(|nn| (nn - 0.8).abs() < 1e-9));

        assert!(matches!(
            out.channels[0].outcome,
            ChannelOutcome::Processed { artifact_pct, .. } if artifact_pct > 0.0
        ));
        match &out.channels[1].outcome {
            ChannelOutcome::Failed { reason } => assert!(reason.starts_with("flat signal")),
            other => panic!("flat channel processed: {other:?}"),
        }
        assert!(out.warnings.iter().all(|w| w.channel() != Some(2)));
        assert_eq!(sink, out.warnings);
    }

    #[test]
    fn low_quality_warns_but_still_produces_nn() {
        let (ts, planted) = synthetic_ecg(250.0, &[0.8; 12], 1.0, false);
        let mut cfg = PipelineConfig::default();
        cfg.sqi.threshold = 1.0;

        let mut sink: Vec<Warning> = Vec::new();
        let out = run_pipeline(&[ts], SignalKind::Ecg, &cfg, &mut sink).unwrap();
        assert!(sink.iter().any(|w| matches!(
            w,
            Warning::LowMeanQuality { channel: 0, threshold, .. } if *threshold == 1.0
        )));
        assert_eq!(out.nn.len(), planted.len() - 2);
    }

    #[test]
    fn artifact_burden_of_lone_channel_is_reported() {
        let (ts, _) = synthetic_ecg(250.0, &ectopic_rr(), 1.0, false);
        let mut cfg = PipelineConfig::default();
        cfg.max_artifact_pct = 1.0;

        let mut sink: Vec<Warning> = Vec::new();
        let out = run_pipeline(&[ts], SignalKind::Ecg, &cfg, &mut sink).unwrap();
        assert!(out.artifact_count > 0);
        assert_eq!(out.nn.len(), out.flags.len());
        assert!(sink.iter().any(|w| matches!(w, Warning::HighArtifactRatio { channel: 0, .. })));
    }

    #[test]
    fn no_usable_channel_fails_the_run() {
        let waves = vec![
            Waveform::new("a", 250.0, vec![0.0; 5000]),
            Waveform::new("b", 250.0, vec![1.0; 5000]),
        ];
        let err = run_pipeline(&waves, SignalKind::Ecg, &PipelineConfig::default(), &mut NullSink)
            .unwrap_err();
        assert_eq!(err, CardioError::NoUsablePeaks);

        let err = run_pipeline(&[], SignalKind::Ppg, &PipelineConfig::default(), &mut NullSink)
            .unwrap_err();
        assert_eq!(err, CardioError::NoUsablePeaks);
    }
}
