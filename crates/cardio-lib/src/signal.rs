use crate::error::CardioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One recorded cardiovascular channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    /// Channel label as it appeared in the recording
    pub label: String,
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl Waveform {
    pub fn new(label: impl Into<String>, fs: f64, data: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            fs,
            data,
        }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// Which physiological signal a waveform carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Ecg,
    Ppg,
}

impl FromStr for SignalKind {
    type Err = CardioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ecg" => Ok(SignalKind::Ecg),
            "ppg" => Ok(SignalKind::Ppg),
            other => Err(CardioError::InvalidSignalKind(other.to_string())),
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Ecg => f.write_str("ecg"),
            SignalKind::Ppg => f.write_str("ppg"),
        }
    }
}

/// Heartbeat positions (R-peaks or pulse onsets) as sample indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Event timestamps in seconds.
    pub fn times(&self, fs: f64) -> Vec<f64> {
        self.indices.iter().map(|&i| i as f64 / fs).collect()
    }
}

/// RR intervals (seconds), each stamped with the time of the beat that closes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
    pub times: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let mut rr = Vec::new();
        let mut times = Vec::new();
        for w in events.indices.windows(2) {
            let dt = (w[1] as f64 - w[0] as f64) / fs;
            rr.push(dt);
            times.push(w[1] as f64 / fs);
        }
        Self { rr, times }
    }

    /// Build a series from bare intervals; timestamps are their running sum.
    pub fn from_intervals(rr: Vec<f64>) -> Self {
        let mut acc = 0.0;
        let times = rr
            .iter()
            .map(|interval| {
                acc += interval;
                acc
            })
            .collect();
        Self { rr, times }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }

    /// Instantaneous heart rate in beats per minute.
    pub fn heart_rate(&self) -> Vec<f64> {
        self.rr
            .iter()
            .map(|&dt| if dt > 0.0 { 60.0 / dt } else { f64::NAN })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rr_from_events_stamps_closing_beat() {
        let events = Events::from_indices(vec![100, 300, 550]);
        let rr = RRSeries::from_events(&events, 250.0);
        assert_eq!(rr.rr, vec![0.8, 1.0]);
        assert_eq!(rr.times, vec![1.2, 2.2]);
        assert_eq!(rr.heart_rate(), vec![75.0, 60.0]);
    }

    #[test]
    fn intervals_accumulate_into_times() {
        let rr = RRSeries::from_intervals(vec![0.5, 0.5, 1.0]);
        assert_eq!(rr.times, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn signal_kind_parses_case_insensitively() {
        assert_eq!("ECG".parse::<SignalKind>().unwrap(), SignalKind::Ecg);
        assert_eq!(" ppg ".parse::<SignalKind>().unwrap(), SignalKind::Ppg);
        let err = "eeg".parse::<SignalKind>().unwrap_err();
        assert!(matches!(err, CardioError::InvalidSignalKind(ref k) if k == "eeg"));
    }
}
