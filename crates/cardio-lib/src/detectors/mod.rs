pub mod ecg;
pub mod filters;
pub mod ppg;

use crate::{
    error::{CardioError, Result},
    signal::{Events, RRSeries, SignalKind, Waveform},
};
use ecg::{EcgDetectorConfig, Polarity};
use ppg::PpgDetectorConfig;
use serde::{Deserialize, Serialize};

/// Settings for both detector families.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub ecg: EcgDetectorConfig,
    pub ppg: PpgDetectorConfig,
}

/// Beats found in one channel, with the derived RR and heart-rate series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatDetection {
    pub kind: SignalKind,
    pub fs: f64,
    pub sample_count: usize,
    pub events: Events,
    /// Peak timestamps in seconds.
    pub times: Vec<f64>,
    pub rr: RRSeries,
    /// 60 / RR, beats per minute.
    pub heart_rate: Vec<f64>,
    /// ECG only.
    pub polarity: Option<Polarity>,
    /// ECG only.
    pub energy_threshold: Option<f64>,
    /// Band-limited signal the beats were located on, at the input rate.
    #[serde(skip)]
    pub filtered: Vec<f64>,
}

impl BeatDetection {
    pub fn from_events(ts: &Waveform, kind: SignalKind, events: Events) -> Self {
        let rr = RRSeries::from_events(&events, ts.fs);
        Self {
            kind,
            fs: ts.fs,
            sample_count: ts.len(),
            times: events.times(ts.fs),
            heart_rate: rr.heart_rate(),
            rr,
            events,
            polarity: None,
            energy_threshold: None,
            filtered: Vec::new(),
        }
    }
}

/// Run the detector matching `kind` over one waveform.
///
/// Fewer than two beats leaves no RR interval to work with and is reported as
/// `NoUsablePeaks`.
pub fn detect_beats(
    ts: &Waveform,
    kind: SignalKind,
    cfg: &DetectorConfig,
) -> Result<BeatDetection> {
    let detection = match kind {
        SignalKind::Ecg => {
            let found = ecg::detect_r_peaks(ts, &cfg.ecg)?;
            let mut detection = BeatDetection::from_events(ts, kind, found.events);
            detection.polarity = Some(found.polarity);
            detection.energy_threshold = Some(found.energy_threshold);
            detection.filtered = found.bandpassed;
            detection
        }
        SignalKind::Ppg => {
            let found = ppg::detect_pulse_onsets(ts, &cfg.ppg)?;
            let mut detection = BeatDetection::from_events(ts, kind, found.events);
            detection.filtered = found.filtered;
            detection
        }
    };
    if detection.events.len() < 2 {
        return Err(CardioError::NoUsablePeaks);
    }
    Ok(detection)
}
