use super::defaults::MAX_ID_LEN;
use super::validation::{check_identifier, check_program};
use super::{AppConfig, RecordingFormat, DEFAULT_SAMPLE_SECONDS};
use crate::error::NoiseError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

fn loop_args<'a>(extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["test-app", "-m", "1", "-n", "0.1"];
    args.extend_from_slice(extra);
    args
}

fn assert_config_error(cfg: &AppConfig) {
    match cfg.resolve() {
        Err(NoiseError::Configuration(_)) => {}
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn resolves_defaults() {
    let cfg = AppConfig::parse_from(loop_args(&[]));
    let resolved = cfg.resolve().expect("defaults should resolve");
    assert_eq!(resolved.microphone, "1");
    assert_eq!(
        resolved.sample_duration,
        Duration::from_secs(u64::from(DEFAULT_SAMPLE_SECONDS))
    );
    assert_eq!(resolved.threshold, 0.1);
    assert!(!resolved.verbose);
    assert_eq!(resolved.format, RecordingFormat::S16Le);
    assert_eq!(resolved.sample_stem, PathBuf::from("/home/pi/noise"));
    assert_eq!(resolved.wav_path(), PathBuf::from("/home/pi/noise.wav"));
    assert_eq!(resolved.tools.arecord, "arecord");
    assert_eq!(resolved.tools.upload, "drive");
}

#[test]
fn resolution_is_idempotent() {
    let args = loop_args(&["-s", "7", "-v", "--format", "S24_LE", "--upload-parent", "abc"]);
    let first = AppConfig::parse_from(args.clone()).resolve().expect("resolve");
    let second = AppConfig::parse_from(args).resolve().expect("resolve");
    assert_eq!(first, second);

    let cfg = AppConfig::parse_from(loop_args(&[]));
    assert_eq!(cfg.resolve().expect("resolve"), cfg.resolve().expect("resolve"));
}

#[test]
fn missing_microphone_is_a_configuration_error() {
    let cfg = AppConfig::parse_from(["test-app", "-n", "0.1"]);
    assert_config_error(&cfg);
}

#[test]
fn missing_threshold_is_a_configuration_error() {
    let cfg = AppConfig::parse_from(["test-app", "-m", "1"]);
    assert_config_error(&cfg);
}

#[test]
fn rejects_non_positive_threshold() {
    for value in ["0", "-0.5", "NaN", "inf"] {
        let flag = format!("--threshold={value}");
        let cfg = AppConfig::parse_from(["test-app", "-m", "1", flag.as_str()]);
        assert_config_error(&cfg);
    }
}

#[test]
fn rejects_sample_out_of_bounds() {
    assert_config_error(&AppConfig::parse_from(loop_args(&["-s", "0"])));
    assert_config_error(&AppConfig::parse_from(loop_args(&["-s", "3601"])));
}

#[test]
fn accepts_sample_bounds() {
    assert!(AppConfig::parse_from(loop_args(&["-s", "1"])).resolve().is_ok());
    assert!(AppConfig::parse_from(loop_args(&["-s", "3600"])).resolve().is_ok());
}

#[test]
fn rejects_zero_tool_timeout() {
    assert_config_error(&AppConfig::parse_from(loop_args(&["--tool-timeout", "0"])));
}

#[test]
fn capture_timeout_adds_sample_duration() {
    let resolved = AppConfig::parse_from(loop_args(&["-s", "10", "--tool-timeout", "30"]))
        .resolve()
        .expect("resolve");
    assert_eq!(resolved.capture_timeout(), Duration::from_secs(40));
}

#[test]
fn rejects_microphone_with_shell_metacharacters() {
    for dangerous in ["1;reboot", "card|x", "a b", "$(id)", "`id`", "x\ny"] {
        let cfg = AppConfig::parse_from(["test-app", "-m", dangerous, "-n", "0.1"]);
        assert!(cfg.resolve().is_err(), "microphone '{dangerous}' should be rejected");
    }
}

#[test]
fn accepts_named_cards() {
    let cfg = AppConfig::parse_from(["test-app", "-m", "Device_1", "-n", "0.1"]);
    assert_eq!(cfg.resolve().expect("resolve").microphone, "Device_1");
}

#[test]
fn identifier_length_is_capped() {
    let long = "a".repeat(MAX_ID_LEN + 1);
    assert!(check_identifier(&long, "--microphone").is_err());
    assert!(check_identifier(&"a".repeat(MAX_ID_LEN), "--microphone").is_ok());
}

#[test]
fn rejects_empty_or_dangerous_tool_names() {
    assert!(check_program("  ", "--sox-cmd").is_err());
    assert!(check_program("sox; rm -rf /", "--sox-cmd").is_err());
    assert!(check_program("/usr/local/bin/sox", "--sox-cmd").is_ok());
    assert!(check_program("sox", "--sox-cmd").is_ok());
}

#[test]
fn rejects_directory_sample_path() {
    assert_config_error(&AppConfig::parse_from(loop_args(&["--sample-path", "/"])));
}

#[test]
fn sample_stem_keeps_existing_dots() {
    let resolved = AppConfig::parse_from(loop_args(&["--sample-path", "/tmp/noise.v2"]))
        .resolve()
        .expect("resolve");
    assert_eq!(resolved.wav_path(), PathBuf::from("/tmp/noise.v2.wav"));
}

#[test]
fn utility_modes_do_not_need_loop_parameters() {
    let cfg = AppConfig::parse_from(["test-app", "--test", "2"]);
    assert!(cfg.validate_common().is_ok());
    let cfg = AppConfig::parse_from(["test-app", "--test", "2;ls"]);
    assert!(cfg.validate_common().is_err());
}

#[test]
fn json_requires_test_mode() {
    assert!(AppConfig::try_parse_from(["test-app", "--json"]).is_err());
    assert!(AppConfig::try_parse_from(["test-app", "--test", "1", "--json"]).is_ok());
}

#[test]
fn recording_format_labels_are_stable() {
    assert_eq!(RecordingFormat::S16Le.label(), "S16_LE");
    assert_eq!(RecordingFormat::S24Le.label(), "S24_LE");
    assert_eq!(RecordingFormat::S32Le.label(), "S32_LE");
    assert_eq!(RecordingFormat::U8.label(), "U8");
    let cfg = AppConfig::parse_from(["test-app", "--format", "S32_LE"]);
    assert_eq!(cfg.format, RecordingFormat::S32Le);
}
