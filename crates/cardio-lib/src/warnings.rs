//! Non-fatal quality findings and the sinks that receive them.
//!
//! Every stage that can raise a warning takes a `&mut dyn WarningSink` instead of
//! consulting process-wide state, so callers decide whether warnings are logged,
//! collected or dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HRV frequency bands whose estimation needs a minimum recording length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyBand {
    Ulf,
    Vlf,
    Lf,
    Hf,
}

impl FrequencyBand {
    /// Shortest recording (seconds) that resolves the band.
    pub fn min_duration_s(self) -> f64 {
        match self {
            FrequencyBand::Ulf => 86_400.0,
            FrequencyBand::Vlf => 300.0,
            FrequencyBand::Lf => 120.0,
            FrequencyBand::Hf => 60.0,
        }
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrequencyBand::Ulf => "ULF",
            FrequencyBand::Vlf => "VLF",
            FrequencyBand::Lf => "LF",
            FrequencyBand::Hf => "HF",
        };
        f.write_str(name)
    }
}

/// A structured, non-fatal finding. `value` is the measured metric and
/// `threshold` the limit it was compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Mean SQI of a channel fell below the recommended minimum.
    LowMeanQuality {
        channel: usize,
        value: f64,
        threshold: f64,
    },
    /// Too many SQI windows (percent) scored below the recommended minimum.
    PoorQualityWindows {
        channel: usize,
        value: f64,
        threshold: f64,
    },
    /// Flagged RR intervals (percent) of a single-channel run.
    HighArtifactRatio {
        channel: usize,
        value: f64,
        threshold: f64,
    },
    /// Flagged RR intervals (percent) of the best channel of a multi-channel run.
    ChannelArtifactRatioExceeded {
        channel: usize,
        value: f64,
        threshold: f64,
    },
    /// Recording (seconds) is shorter than the band requires.
    ShortRecording {
        band: FrequencyBand,
        value: f64,
        threshold: f64,
    },
}

impl Warning {
    pub fn value(&self) -> f64 {
        match self {
            Warning::LowMeanQuality { value, .. }
            | Warning::PoorQualityWindows { value, .. }
            | Warning::HighArtifactRatio { value, .. }
            | Warning::ChannelArtifactRatioExceeded { value, .. }
            | Warning::ShortRecording { value, .. } => *value,
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            Warning::LowMeanQuality { threshold, .. }
            | Warning::PoorQualityWindows { threshold, .. }
            | Warning::HighArtifactRatio { threshold, .. }
            | Warning::ChannelArtifactRatioExceeded { threshold, .. }
            | Warning::ShortRecording { threshold, .. } => *threshold,
        }
    }

    pub fn channel(&self) -> Option<usize> {
        match self {
            Warning::LowMeanQuality { channel, .. }
            | Warning::PoorQualityWindows { channel, .. }
            | Warning::HighArtifactRatio { channel, .. }
            | Warning::ChannelArtifactRatioExceeded { channel, .. } => Some(*channel),
            Warning::ShortRecording { .. } => None,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LowMeanQuality {
                channel,
                value,
                threshold,
            } => write!(
                f,
                "channel {channel}: mean SQI {value:.2} is below the recommended {threshold:.2}; \
                 beat detection may be unreliable"
            ),
            Warning::PoorQualityWindows {
                channel,
                value,
                threshold,
            } => write!(
                f,
                "channel {channel}: {value:.1}% of SQI windows are below threshold \
                 (limit {threshold:.1}%); consider another channel or manual inspection"
            ),
            Warning::HighArtifactRatio {
                channel,
                value,
                threshold,
            } => write!(
                f,
                "channel {channel}: {value:.1}% of RR intervals were flagged as artifacts \
                 (limit {threshold:.1}%)"
            ),
            Warning::ChannelArtifactRatioExceeded {
                channel,
                value,
                threshold,
            } => write!(
                f,
                "best channel {channel} still has {value:.1}% flagged RR intervals \
                 (limit {threshold:.1}%)"
            ),
            Warning::ShortRecording {
                band,
                value,
                threshold,
            } => write!(
                f,
                "{band} power needs at least {threshold:.0} s of data, recording has {value:.1} s"
            ),
        }
    }
}

/// Receiver for warnings emitted while processing.
pub trait WarningSink {
    fn warn(&mut self, warning: Warning);
}

impl WarningSink for Vec<Warning> {
    fn warn(&mut self, warning: Warning) {
        self.push(warning);
    }
}

/// Forwards warnings to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl WarningSink for LogSink {
    fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl WarningSink for NullSink {
    fn warn(&mut self, _warning: Warning) {}
}

/// Warn when `duration_s` cannot resolve `band`. Returns true when long enough.
pub fn check_band_duration(
    duration_s: f64,
    band: FrequencyBand,
    sink: &mut dyn WarningSink,
) -> bool {
    let required = band.min_duration_s();
    if duration_s < required {
        sink.warn(Warning::ShortRecording {
            band,
            value: duration_s,
            threshold: required,
        });
        false
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_recording_reports_band_and_limits() {
        let mut sink = Vec::new();
        assert!(!check_band_duration(90.0, FrequencyBand::Lf, &mut sink));
        assert!(check_band_duration(90.0, FrequencyBand::Hf, &mut sink));
        assert_eq!(
            sink,
            vec![Warning::ShortRecording {
                band: FrequencyBand::Lf,
                value: 90.0,
                threshold: 120.0,
            }]
        );
        assert_eq!(sink[0].channel(), None);
    }

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let w = Warning::LowMeanQuality {
            channel: 2,
            value: 0.85,
            threshold: 0.9,
        };
        let js = serde_json::to_value(&w).unwrap();
        assert_eq!(js["kind"], "low_mean_quality");
        assert_eq!(js["channel"], 2);
        assert!(w.to_string().contains("0.85"));
    }

    #[test]
    fn null_sink_swallows_warnings() {
        let mut sink = NullSink;
        check_band_duration(1.0, FrequencyBand::Vlf, &mut sink);
    }
}
