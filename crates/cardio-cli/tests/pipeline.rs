use assert_cmd::cargo::cargo_bin_cmd;
use cardio_lib::{
    artifacts::CorrectionMethod,
    pipeline::{ChannelOutcome, PipelineOutput},
    warnings::Warning,
};
use std::{error::Error, fs, path::PathBuf};

fn run(extra: &[&str]) -> Result<PipelineOutput, Box<dyn Error>> {
    let input = sample_path("test_data/ecg_multichannel.csv");
    let mut cmd = cargo_bin_cmd!("cardio");
    cmd.args(["pipeline", "--input", &input]).args(extra);
    let out = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&out)?)
}

#[test]
fn selects_cleanest_channel() -> Result<(), Box<dyn Error>> {
    let out = run(&[])?;
    assert_eq!(out.selection.index, 2);
    assert_eq!(out.selection.label, "lead_c");
    assert_eq!(out.method, CorrectionMethod::Pchip);
    assert_eq!(out.peaks.len(), 13);
    assert_eq!(out.nn.len(), 11);
    assert_eq!(out.nn_times.len(), out.nn.len());
    assert_eq!(out.artifact_count, 0);
    assert!(out.nn.iter().all(|nn| (nn - 0.8).abs() < 1e-9));

    assert_eq!(out.channels.len(), 3);
    match &out.channels[0].outcome {
        ChannelOutcome::Processed { artifact_pct, .. } => assert!(*artifact_pct > 0.0),
        other => panic!("lead_a should be processed: {other:?}"),
    }
    match &out.channels[1].outcome {
        ChannelOutcome::Failed { reason } => assert!(reason.contains("flat signal")),
        other => panic!("lead_flat should fail: {other:?}"),
    }
    Ok(())
}

#[test]
fn channel_subset_and_method_flag() -> Result<(), Box<dyn Error>> {
    let out = run(&["--channels", "lead_a", "--method", "remove"])?;
    assert_eq!(out.selection.label, "lead_a");
    assert_eq!(out.method, CorrectionMethod::Remove);
    assert_eq!(out.artifact_count, 2);
    assert_eq!(out.flags.len(), 11);
    assert_eq!(out.nn.len(), 9);
    Ok(())
}

#[test]
fn config_file_sets_method_and_ratio() -> Result<(), Box<dyn Error>> {
    let config = sample_path("test_data/pipeline.toml");
    let out = run(&["--channels", "lead_a", "--config", &config])?;
    assert_eq!(out.method, CorrectionMethod::Linear);
    assert_eq!(out.nn.len(), 11);
    // 2 of 11 intervals flagged against a 10% limit on a single channel.
    assert!(out.warnings.iter().any(|w| matches!(
        w,
        Warning::HighArtifactRatio { channel: 0, threshold, .. } if *threshold == 10.0
    )));
    Ok(())
}

#[test]
fn flag_overrides_config_method() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("cardio.toml");
    fs::write(&config, "method = \"spline\"\n")?;
    let config = config.to_string_lossy().to_string();

    let out = run(&["--config", &config])?;
    assert_eq!(out.method, CorrectionMethod::Spline);
    let out = run(&["--config", &config, "--method", "previous"])?;
    assert_eq!(out.method, CorrectionMethod::Previous);
    Ok(())
}

#[test]
fn only_flat_channel_fails_the_run() {
    let input = sample_path("test_data/ecg_multichannel.csv");
    let mut cmd = cargo_bin_cmd!("cardio");
    cmd.args(["pipeline", "--input", &input, "--channels", "lead_flat"]);
    let out = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&out).contains("no channel produced usable peaks"));
}

fn sample_path(relative: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative)
        .to_string_lossy()
        .to_string()
}
