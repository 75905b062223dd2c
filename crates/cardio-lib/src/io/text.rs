use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{io::Read, path::Path};

use crate::signal::{RRSeries, Waveform};

/// Read a whole text source; `-` means standard input.
pub fn read_text(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Parse newline-delimited samples, ignoring blank and `#` comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not a number: {trimmed}", idx + 1))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a single-channel waveform sampled at `fs`.
pub fn read_waveform(path: &Path, fs: f64) -> Result<Waveform> {
    let data = parse_f64_series(&read_text(path)?)
        .with_context(|| format!("parsing samples from {}", path.display()))?;
    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| s != "-")
        .unwrap_or_else(|| "stdin".to_string());
    Ok(Waveform::new(label, fs, data))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RrUnit {
    #[default]
    Seconds,
    Milliseconds,
}

/// Parse one RR interval per line into a series stamped by running sum.
pub fn parse_rr_series(text: &str, unit: RrUnit) -> Result<RRSeries> {
    let mut rr = parse_f64_series(text)?;
    if let Some((idx, bad)) = rr.iter().enumerate().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
        anyhow::bail!("interval {} is not a positive duration: {bad}", idx + 1);
    }
    if unit == RrUnit::Milliseconds {
        rr.iter_mut().for_each(|v| *v /= 1000.0);
    }
    Ok(RRSeries::from_intervals(rr))
}

pub fn read_rr_series(path: &Path, unit: RrUnit) -> Result<RRSeries> {
    parse_rr_series(&read_text(path)?, unit)
        .with_context(|| format!("parsing RR intervals from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let data = parse_f64_series("# lead II\n0.1\n\n -0.25 \n1e-3\n").unwrap();
        assert_eq!(data, vec![0.1, -0.25, 1e-3]);
    }

    #[test]
    fn reports_offending_line() {
        let err = parse_f64_series("0.1\n0.2\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert!(parse_f64_series("# nothing\n").is_err());
    }

    #[test]
    fn rr_in_milliseconds_is_converted() {
        let rr = parse_rr_series("800\n750\n", RrUnit::Milliseconds).unwrap();
        assert_eq!(rr.rr, vec![0.8, 0.75]);
        assert!((rr.times[1] - 1.55).abs() < 1e-12);
        assert!(parse_rr_series("0.8\n-0.1\n", RrUnit::Seconds).is_err());
    }

    #[test]
    fn waveform_label_comes_from_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lead_ii.txt");
        std::fs::write(&path, "0.0\n0.5\n1.0\n").unwrap();
        let ts = read_waveform(&path, 250.0).unwrap();
        assert_eq!(ts.label, "lead_ii");
        assert_eq!(ts.len(), 3);
        assert_eq!(ts.fs, 250.0);
    }
}
