//! Startup dependency checks and the `--doctor` report.

use crate::cards::{parse_cards, read_cards};
use crate::config::{AppConfig, DetectorConfig, ToolPaths};
use crate::error::NoiseError;
use crate::process::resolve_program;
use std::path::Path;
use std::{env, fmt::Display};

pub struct DoctorReport {
    lines: Vec<String>,
}

impl DoctorReport {
    pub fn new(title: &str) -> Self {
        Self {
            lines: vec![title.to_string()],
        }
    }

    pub fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("{title}:"));
    }

    pub fn push_kv(&mut self, key: &str, value: impl Display) {
        self.lines.push(format!("  {key}: {value}"));
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

fn missing_tool(label: &str, program: &str, hint: &str) -> NoiseError {
    NoiseError::DependencyMissing {
        what: label.to_string(),
        path: program.into(),
        hint: Some(hint.to_string()),
    }
}

/// Check only the tools the caller names; `--test` needs capture and stats only.
pub fn require_tools<'a>(
    tools: impl IntoIterator<Item = (&'static str, &'a str, &'static str)>,
) -> Result<(), NoiseError> {
    for (label, program, hint) in tools {
        if resolve_program(program).is_none() {
            return Err(missing_tool(label, program, hint));
        }
    }
    Ok(())
}

/// Everything the detection loop needs before the first cycle.
pub fn preflight(config: &DetectorConfig, cards_file: &Path) -> Result<(), NoiseError> {
    require_tools(config.tools.entries())?;
    if !cards_file.exists() {
        return Err(NoiseError::DependencyMissing {
            what: "sound card listing".to_string(),
            path: cards_file.to_path_buf(),
            hint: None,
        });
    }
    let sample_dir = config
        .sample_stem
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if !sample_dir.is_dir() {
        return Err(NoiseError::DependencyMissing {
            what: "sample directory".to_string(),
            path: sample_dir.to_path_buf(),
            hint: Some("create it or pass --sample-path".to_string()),
        });
    }
    Ok(())
}

fn tool_status(program: &str) -> String {
    resolve_program(program)
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "missing".to_string())
}

/// Environment summary for `--doctor`; never fails, reports problems inline.
pub fn doctor_report(config: &AppConfig) -> DoctorReport {
    let mut report = DoctorReport::new("noisewatch doctor");
    report.push_kv("version", env!("CARGO_PKG_VERSION"));
    report.push_kv("os", format!("{}/{}", env::consts::OS, env::consts::ARCH));

    report.section("Tools");
    let tools = ToolPaths {
        arecord: config.arecord_cmd.clone(),
        sox: config.sox_cmd.clone(),
        lame: config.lame_cmd.clone(),
        upload: config.upload_cmd.clone(),
    };
    for (label, program, _) in tools.entries() {
        report.push_kv(label, tool_status(program));
    }

    report.section("Paths");
    report.push_kv("sample_path", config.sample_path.display());
    report.push_kv("log_file", config.log_file.display());
    report.push_kv("pid_file", config.pid_file.display());
    report.push_kv("cards_file", config.cards_file.display());

    report.section("Sound cards");
    match read_cards(&config.cards_file) {
        Ok(listing) => {
            let cards = parse_cards(&listing);
            if cards.is_empty() {
                report.push_line("  none detected");
            }
            for card in cards {
                report.push_kv(
                    &card.index.to_string(),
                    format!("[{}] {}", card.id, card.description),
                );
            }
        }
        Err(err) => report.push_kv("error", format!("{err:#}")),
    }

    report.section("Detector");
    match config.resolve() {
        Ok(resolved) => {
            report.push_kv("microphone", &resolved.microphone);
            report.push_kv("threshold", resolved.threshold);
            report.push_kv("sample_seconds", resolved.sample_duration.as_secs());
            report.push_kv("format", resolved.format);
            match preflight(&resolved, &config.cards_file) {
                Ok(()) => report.push_kv("preflight", "ok"),
                Err(err) => report.push_kv("preflight", err),
            }
        }
        Err(err) => report.push_kv("config", err),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn loop_config(extra: &[&str]) -> AppConfig {
        let mut args = vec!["test-app", "-m", "1", "-n", "0.1"];
        args.extend_from_slice(extra);
        AppConfig::parse_from(args)
    }

    #[test]
    fn missing_capture_tool_fails_preflight() {
        let cfg = loop_config(&["--arecord-cmd", "/nonexistent/arecord"]);
        let resolved = cfg.resolve().expect("resolve");
        match preflight(&resolved, Path::new("/")) {
            Err(err @ NoiseError::DependencyMissing { .. }) => {
                assert!(err.is_fatal());
                assert!(err.to_string().contains("alsa-utils"));
            }
            other => panic!("expected dependency error, got {other:?}"),
        }
    }

    #[test]
    fn preflight_passes_with_available_tools() {
        let tmp = std::env::temp_dir();
        let stem = tmp.join("noisewatch-preflight");
        let stem = stem.to_string_lossy().into_owned();
        let cfg = loop_config(&[
            "--arecord-cmd",
            "sh",
            "--sox-cmd",
            "sh",
            "--lame-cmd",
            "sh",
            "--upload-cmd",
            "sh",
            "--sample-path",
            stem.as_str(),
        ]);
        let resolved = cfg.resolve().expect("resolve");
        assert!(preflight(&resolved, &tmp).is_ok());
    }

    #[test]
    fn missing_cards_file_fails_preflight() {
        let cfg = loop_config(&[
            "--arecord-cmd",
            "sh",
            "--sox-cmd",
            "sh",
            "--lame-cmd",
            "sh",
            "--upload-cmd",
            "sh",
        ]);
        let resolved = cfg.resolve().expect("resolve");
        let err = preflight(&resolved, Path::new("/nonexistent/asound/cards"))
            .expect_err("should fail");
        assert!(matches!(err, NoiseError::DependencyMissing { .. }));
    }

    #[test]
    fn missing_sample_directory_fails_preflight() {
        let cfg = loop_config(&[
            "--arecord-cmd",
            "sh",
            "--sox-cmd",
            "sh",
            "--lame-cmd",
            "sh",
            "--upload-cmd",
            "sh",
            "--sample-path",
            "/nonexistent/dir/noise",
        ]);
        let resolved = cfg.resolve().expect("resolve");
        let err = preflight(&resolved, Path::new("/")).expect_err("should fail");
        assert!(err.to_string().contains("sample directory"));
    }

    #[test]
    fn doctor_report_lists_sections_without_failing() {
        let cfg = AppConfig::parse_from([
            "test-app",
            "--cards-file",
            "/nonexistent/asound/cards",
        ]);
        let rendered = doctor_report(&cfg).render();
        assert!(rendered.starts_with("noisewatch doctor"));
        assert!(rendered.contains("Tools:"));
        assert!(rendered.contains("Sound cards:"));
        assert!(rendered.contains("config: configuration error"));
    }
}
