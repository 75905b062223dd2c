pub mod artifacts;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod quality;
pub mod selection;
pub mod signal;
pub mod warnings;

pub use artifacts::{
    ArtifactCriteria, Correction, CorrectionMethod, Interpolation, Interpolator, RrCorrector,
};
pub use config::PipelineConfig;
pub use detectors::{detect_beats, BeatDetection, DetectorConfig};
pub use error::{CardioError, Result};
pub use pipeline::{run_pipeline, PipelineOutput};
pub use quality::{score_quality, SqiConfig, SqiReport};
pub use selection::{select_channel, ChannelSelection};
pub use signal::*;
pub use warnings::{LogSink, NullSink, Warning, WarningSink};
