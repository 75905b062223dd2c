use thiserror::Error;

/// Failures raised by the beat-to-NN pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CardioError {
    /// Too few samples rise above the amplitude floor; the channel carries no beats.
    #[error(
        "flat signal: {:.1}% of samples exceed the amplitude floor (need at least {:.1}%)",
        active_fraction * 100.0,
        min_fraction * 100.0
    )]
    FlatSignal {
        active_fraction: f64,
        min_fraction: f64,
    },

    #[error("invalid signal kind `{0}` (expected `ecg` or `ppg`)")]
    InvalidSignalKind(String),

    #[error("unsupported correction method `{0}`")]
    UnsupportedCorrectionMethod(String),

    /// Every channel failed detection.
    #[error("no channel produced usable peaks")]
    NoUsablePeaks,

    /// Interpolation was requested but every interval is flagged.
    #[error("no artifact-free intervals to interpolate from")]
    NoValidIntervals,

    #[error("insufficient samples: need more than {needed}, have {available}")]
    InsufficientSamples { needed: usize, available: usize },

    #[error("invalid sampling rate {0} Hz (must be finite and positive)")]
    InvalidSamplingRate(f64),

    #[error("FFT error: {0}")]
    Fft(String),
}

pub type Result<T> = std::result::Result<T, CardioError>;
