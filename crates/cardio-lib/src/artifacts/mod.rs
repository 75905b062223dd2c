pub mod interp;

pub use interp::{Interpolation, Interpolator};

use crate::{
    detectors::filters::median,
    error::{CardioError, Result},
    signal::RRSeries,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Bounds an RR interval must satisfy to count as normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactCriteria {
    /// Shortest plausible interval (seconds); 0.375 s is 160 bpm.
    pub min_rr_s: f64,
    /// Longest plausible interval (seconds).
    pub max_rr_s: f64,
    /// Largest relative departure from the local median before a beat is ectopic.
    pub max_relative_change: f64,
    /// Neighbours considered on each side for the local median.
    pub context: usize,
}

impl Default for ArtifactCriteria {
    fn default() -> Self {
        Self {
            min_rr_s: 60.0 / 160.0,
            max_rr_s: 2.0,
            max_relative_change: 0.2,
            context: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    TooShort,
    TooLong,
    Ectopic,
}

impl ArtifactCriteria {
    fn plausible(&self, rr: f64) -> bool {
        rr.is_finite() && rr >= self.min_rr_s && rr <= self.max_rr_s
    }

    /// Label every interval, `None` meaning normal.
    pub fn classify(&self, rr: &[f64]) -> Vec<Option<ArtifactKind>> {
        (0..rr.len())
            .map(|i| {
                let value = rr[i];
                if value.is_nan() || value < self.min_rr_s {
                    return Some(ArtifactKind::TooShort);
                }
                if value > self.max_rr_s {
                    return Some(ArtifactKind::TooLong);
                }
                let lo = i.saturating_sub(self.context);
                let hi = (i + self.context + 1).min(rr.len());
                let mut neighbours: Vec<f64> = (lo..hi)
                    .filter(|&j| j != i && self.plausible(rr[j]))
                    .map(|j| rr[j])
                    .collect();
                let local = median(&mut neighbours)?;
                ((value - local).abs() / local > self.max_relative_change)
                    .then_some(ArtifactKind::Ectopic)
            })
            .collect()
    }
}

/// How flagged intervals are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CorrectionMethod {
    /// Drop flagged intervals.
    Remove,
    #[default]
    Pchip,
    Linear,
    Cubic,
    Nearest,
    Next,
    Previous,
    Spline,
    Makima,
}

impl CorrectionMethod {
    pub const ALL: [CorrectionMethod; 9] = [
        CorrectionMethod::Remove,
        CorrectionMethod::Pchip,
        CorrectionMethod::Linear,
        CorrectionMethod::Cubic,
        CorrectionMethod::Nearest,
        CorrectionMethod::Next,
        CorrectionMethod::Previous,
        CorrectionMethod::Spline,
        CorrectionMethod::Makima,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CorrectionMethod::Remove => "remove",
            CorrectionMethod::Pchip => "pchip",
            CorrectionMethod::Linear => "linear",
            CorrectionMethod::Cubic => "cubic",
            CorrectionMethod::Nearest => "nearest",
            CorrectionMethod::Next => "next",
            CorrectionMethod::Previous => "previous",
            CorrectionMethod::Spline => "spline",
            CorrectionMethod::Makima => "makima",
        }
    }

    /// The fill strategy, or `None` for `Remove`.
    pub fn interpolation(self) -> Option<Interpolation> {
        match self {
            CorrectionMethod::Remove => None,
            CorrectionMethod::Pchip => Some(Interpolation::Pchip),
            CorrectionMethod::Linear => Some(Interpolation::Linear),
            CorrectionMethod::Cubic => Some(Interpolation::Cubic),
            CorrectionMethod::Nearest => Some(Interpolation::Nearest),
            CorrectionMethod::Next => Some(Interpolation::Next),
            CorrectionMethod::Previous => Some(Interpolation::Previous),
            CorrectionMethod::Spline => Some(Interpolation::Spline),
            CorrectionMethod::Makima => Some(Interpolation::Makima),
        }
    }
}

impl FromStr for CorrectionMethod {
    type Err = CardioError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CorrectionMethod::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or(CardioError::UnsupportedCorrectionMethod(wanted))
    }
}

impl TryFrom<String> for CorrectionMethod {
    type Error = CardioError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flagged intervals per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCounts {
    pub too_short: usize,
    pub too_long: usize,
    pub ectopic: usize,
}

/// NN series produced from one RR series.
///
/// `flags` and `kinds` stay aligned with the RR series they came from;
/// `source_index[k]` is the RR position that `nn[k]` was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub method: CorrectionMethod,
    pub nn: Vec<f64>,
    pub nn_times: Vec<f64>,
    pub flags: Vec<bool>,
    pub kinds: Vec<Option<ArtifactKind>>,
    pub source_index: Vec<usize>,
}

impl Correction {
    pub fn artifact_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    /// Flagged intervals over all intervals, 0 for an empty series.
    pub fn flagged_fraction(&self) -> f64 {
        if self.flags.is_empty() {
            0.0
        } else {
            self.artifact_count() as f64 / self.flags.len() as f64
        }
    }

    pub fn artifact_pct(&self) -> f64 {
        self.flagged_fraction() * 100.0
    }

    pub fn counts(&self) -> ArtifactCounts {
        let mut counts = ArtifactCounts::default();
        for kind in self.kinds.iter().flatten() {
            match kind {
                ArtifactKind::TooShort => counts.too_short += 1,
                ArtifactKind::TooLong => counts.too_long += 1,
                ArtifactKind::Ectopic => counts.ectopic += 1,
            }
        }
        counts
    }

    /// Drop the first interval everywhere it appears.
    ///
    /// The first beat sits inside the filter warm-up, so its interval is never
    /// reported.
    pub fn trim_first_beat(mut self) -> Self {
        if self.flags.is_empty() {
            return self;
        }
        self.flags.remove(0);
        self.kinds.remove(0);

        let mut nn = Vec::with_capacity(self.nn.len());
        let mut nn_times = Vec::with_capacity(self.nn.len());
        let mut source_index = Vec::with_capacity(self.nn.len());
        for ((&v, &t), &src) in self.nn.iter().zip(&self.nn_times).zip(&self.source_index) {
            if src == 0 {
                continue;
            }
            nn.push(v);
            nn_times.push(t);
            source_index.push(src - 1);
        }
        self.nn = nn;
        self.nn_times = nn_times;
        self.source_index = source_index;
        self
    }
}

/// Flags implausible intervals and replaces or removes them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RrCorrector {
    pub criteria: ArtifactCriteria,
    pub method: CorrectionMethod,
}

impl RrCorrector {
    pub fn new(criteria: ArtifactCriteria, method: CorrectionMethod) -> Self {
        Self { criteria, method }
    }

    /// Classify and correct every interval, keeping the first one.
    pub fn correct(&self, rr: &RRSeries) -> Result<Correction> {
        let kinds = self.criteria.classify(&rr.rr);
        let flags: Vec<bool> = kinds.iter().map(Option::is_some).collect();

        let (nn, nn_times, source_index) = match self.method.interpolation() {
            None => {
                let kept: Vec<usize> = (0..rr.len()).filter(|&i| !flags[i]).collect();
                (
                    kept.iter().map(|&i| rr.rr[i]).collect(),
                    kept.iter().map(|&i| rr.times[i]).collect(),
                    kept,
                )
            }
            Some(strategy) => {
                let nn = fill_flagged(rr, &flags, strategy)?;
                (nn, rr.times.clone(), (0..rr.len()).collect())
            }
        };

        let correction = Correction {
            method: self.method,
            nn,
            nn_times,
            flags,
            kinds,
            source_index,
        };
        debug!(
            "rr correction ({}): {} of {} intervals flagged",
            self.method,
            correction.artifact_count(),
            rr.len()
        );
        Ok(correction)
    }

    /// `correct` followed by the first-beat trim.
    pub fn correct_and_trim(&self, rr: &RRSeries) -> Result<Correction> {
        Ok(self.correct(rr)?.trim_first_beat())
    }
}

fn fill_flagged(rr: &RRSeries, flags: &[bool], strategy: Interpolation) -> Result<Vec<f64>> {
    let mut nn = rr.rr.clone();
    if !flags.iter().any(|&f| f) {
        return Ok(nn);
    }
    let (known_t, known_v): (Vec<f64>, Vec<f64>) = (0..rr.len())
        .filter(|&i| !flags[i])
        .map(|i| (rr.times[i], rr.rr[i]))
        .unzip();
    if known_t.is_empty() {
        return Err(CardioError::NoValidIntervals);
    }
    let flagged: Vec<usize> = (0..rr.len()).filter(|&i| flags[i]).collect();
    let grid: Vec<f64> = flagged.iter().map(|&i| rr.times[i]).collect();
    let filled = strategy.fill(&grid, &known_t, &known_v);
    for (&i, value) in flagged.iter().zip(filled) {
        nn[i] = value;
    }
    Ok(nn)
}
