use crate::warnings::{Warning, WarningSink};
use log::info;
use serde::{Deserialize, Serialize};

/// The channel a multi-channel run settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSelection {
    pub index: usize,
    pub label: String,
    /// Flagged RR intervals, percent.
    pub artifact_pct: f64,
}

/// Pick the candidate with the lowest artifact percentage.
///
/// Candidates are visited in input order and only a strictly lower percentage
/// replaces the current best, so ties resolve to the earliest channel.
pub fn select_channel<I>(candidates: I) -> Option<ChannelSelection>
where
    I: IntoIterator<Item = ChannelSelection>,
{
    let best = candidates.into_iter().fold(None, |best: Option<ChannelSelection>, c| match best {
        Some(b) if b.artifact_pct <= c.artifact_pct => Some(b),
        _ => Some(c),
    })?;
    info!(
        "selected channel {} (`{}`), {:.1}% artifacts",
        best.index, best.label, best.artifact_pct
    );
    Some(best)
}

/// Warn when the chosen channel's artifact burden is above `max_pct`.
///
/// A run with a single usable channel reports `HighArtifactRatio`; a run that
/// compared several reports `ChannelArtifactRatioExceeded`.
pub fn check_artifact_ratio(
    selection: &ChannelSelection,
    compared: usize,
    max_pct: f64,
    sink: &mut dyn WarningSink,
) -> bool {
    if selection.artifact_pct <= max_pct {
        return true;
    }
    let (channel, value, threshold) = (selection.index, selection.artifact_pct, max_pct);
    sink.warn(if compared > 1 {
        Warning::ChannelArtifactRatioExceeded {
            channel,
            value,
            threshold,
        }
    } else {
        Warning::HighArtifactRatio {
            channel,
            value,
            threshold,
        }
    });
    false
}
