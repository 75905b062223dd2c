//! Readers for the plain-text inputs the CLI accepts.

pub mod csv;
pub mod text;

pub use self::csv::{parse_csv_channels, read_csv_channels};
pub use text::{parse_rr_series, read_rr_series, read_text, read_waveform, RrUnit};
