use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::{io::Read, path::Path};

use crate::signal::Waveform;

const TIME_COLUMNS: [&str; 3] = ["time", "timestamp", "t"];

fn is_time_column(name: &str) -> bool {
    TIME_COLUMNS.iter().any(|t| name.eq_ignore_ascii_case(t))
}

/// Parse a headed CSV into one waveform per channel column.
///
/// A `time`/`timestamp` column (seconds) is not a channel; it supplies the
/// sampling rate when `fs` is `None`. `select` restricts and orders the
/// channels by header name; empty means every non-time column.
pub fn parse_csv_channels<R: Read>(
    reader: R,
    fs: Option<f64>,
    select: &[String],
) -> Result<Vec<Waveform>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);
    let headers = reader.headers().context("reading header row")?.clone();
    let time_idx = headers.iter().position(is_time_column);

    let columns: Vec<usize> = if select.is_empty() {
        (0..headers.len()).filter(|&i| Some(i) != time_idx).collect()
    } else {
        select
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case(name))
                    .with_context(|| format!("missing channel column '{name}'"))
            })
            .collect::<Result<_>>()?
    };
    if columns.is_empty() {
        anyhow::bail!("no channel columns found");
    }

    let mut data: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    let mut times = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", row + 1))?;
        if let Some(t) = time_idx {
            let raw = record.get(t).unwrap_or_default();
            times.push(
                raw.parse::<f64>()
                    .with_context(|| format!("row {}: bad timestamp {raw:?}", row + 1))?,
            );
        }
        for (slot, &col) in data.iter_mut().zip(&columns) {
            let raw = record.get(col).unwrap_or_default();
            let value = raw.parse::<f64>().with_context(|| {
                format!("row {}: bad value {raw:?} in '{}'", row + 1, &headers[col])
            })?;
            slot.push(value);
        }
    }

    let fs = match fs {
        Some(fs) => fs,
        None => infer_fs(&times).context("no sampling rate given and no usable time column")?,
    };
    Ok(columns
        .iter()
        .zip(data)
        .map(|(&col, samples)| Waveform::new(&headers[col], fs, samples))
        .collect())
}

pub fn read_csv_channels(path: &Path, fs: Option<f64>, select: &[String]) -> Result<Vec<Waveform>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_csv_channels(file, fs, select).with_context(|| format!("parsing {}", path.display()))
}

/// Sampling rate from the overall span of a timestamp column.
fn infer_fs(times: &[f64]) -> Option<f64> {
    let (first, last) = (times.first()?, times.last()?);
    let span = last - first;
    (span > 0.0).then(|| (times.len() - 1) as f64 / span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = "time,lead_i,lead_ii\n0.000,0.1,0.2\n0.004,0.3,0.4\n0.008,0.5,0.6\n";

    #[test]
    fn splits_columns_into_waveforms() {
        let waves = parse_csv_channels(SAMPLE.as_bytes(), None, &[]).unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].label, "lead_i");
        assert_eq!(waves[1].data, vec![0.2, 0.4, 0.6]);
        assert!((waves[0].fs - 250.0).abs() < 1e-9);
    }

    #[test]
    fn selection_orders_channels_and_fs_overrides() {
        let waves =
            parse_csv_channels(SAMPLE.as_bytes(), Some(500.0), &["LEAD_II".to_string()]).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].label, "lead_ii");
        assert_eq!(waves[0].fs, 500.0);

        let err = parse_csv_channels(SAMPLE.as_bytes(), None, &["v1".to_string()]).unwrap_err();
        assert!(err.to_string().contains("missing channel column 'v1'"));
    }

    #[test]
    fn needs_a_rate_without_time_column() {
        let text = "ecg\n0.1\n0.2\n";
        assert!(parse_csv_channels(text.as_bytes(), None, &[]).is_err());
        let waves = parse_csv_channels(text.as_bytes(), Some(128.0), &[]).unwrap();
        assert_eq!(waves[0].fs, 128.0);
    }

    #[test]
    fn rejects_non_numeric_cells() {
        let err = parse_csv_channels("a\n0.1\nx\n".as_bytes(), Some(1.0), &[]).unwrap_err();
        assert!(format!("{err:#}").contains("row 2"));
    }

    #[test]
    fn reads_multichannel_fixture() {
        let path = sample_path("test_data/ecg_multichannel.csv");
        let waves = read_csv_channels(&path, None, &[]).expect("read fixture");
        assert_eq!(waves.len(), 3);
        assert!((waves[0].fs - 250.0).abs() < 1e-6);
        assert!(waves.iter().all(|w| w.len() == waves[0].len()));
    }

    fn sample_path(relative: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(|p| p.parent())
            .expect("workspace root")
            .join(relative)
    }
}
