use crate::{
    artifacts::{ArtifactCriteria, CorrectionMethod},
    detectors::DetectorConfig,
    quality::SqiConfig,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Every tunable of a pipeline run. Missing TOML tables fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub sqi: SqiConfig,
    pub artifacts: ArtifactCriteria,
    pub method: CorrectionMethod,
    /// Artifact percentage above which the selected channel is reported.
    pub max_artifact_pct: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            sqi: SqiConfig::default(),
            artifacts: ArtifactCriteria::default(),
            method: CorrectionMethod::default(),
            max_artifact_pct: 20.0,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing pipeline config")
    }
}

pub fn read_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    PipelineConfig::from_toml_str(&contents)
        .with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_tables_override_single_fields() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
method = "makima"
max_artifact_pct = 10.0

[detector.ecg]
refractory_s = 0.3

[sqi]
threshold = 0.8

[artifacts]
max_rr_s = 1.5
"#,
        )
        .unwrap();
        assert_eq!(cfg.method, CorrectionMethod::Makima);
        assert_eq!(cfg.max_artifact_pct, 10.0);
        assert_eq!(cfg.detector.ecg.refractory_s, 0.3);
        assert_eq!(cfg.detector.ecg.search_back_scale, 0.5);
        assert_eq!(cfg.sqi.threshold, 0.8);
        assert_eq!(cfg.sqi.ppg_window_s, 30.0);
        assert_eq!(cfg.artifacts.max_rr_s, 1.5);
        assert_eq!(cfg.artifacts.context, 5);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = PipelineConfig::from_toml_str("method = \"akima\"").unwrap_err();
        assert!(format!("{err:#}").contains("unsupported correction method `akima`"));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardio.toml");
        fs::write(&path, "method = \"remove\"\n").unwrap();
        assert_eq!(read_config(&path).unwrap().method, CorrectionMethod::Remove);
        assert!(read_config(&dir.path().join("missing.toml")).is_err());
    }
}
