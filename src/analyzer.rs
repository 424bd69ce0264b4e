//! Loudness extraction from `sox ... -n stat` reports.

use crate::error::NoiseError;
use crate::process::{run_tool, Invocation, ToolError};
use crate::shutdown::Shutdown;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::trace;

/// Peak amplitude measured for one sample.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct SampleReading {
    pub max_amplitude: f64,
}

impl SampleReading {
    pub fn new(max_amplitude: f64) -> Self {
        Self { max_amplitude }
    }
}

fn max_amplitude_re() -> &'static Regex {
    static MAX_AMPLITUDE_RE: OnceLock<Regex> = OnceLock::new();
    MAX_AMPLITUDE_RE.get_or_init(|| {
        Regex::new(r"Maximum amplitude:\s+(-?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)")
            .expect("max amplitude regex should compile")
    })
}

/// Pull the `Maximum amplitude:` value out of a stat report.
pub fn parse_max_amplitude(report: &str) -> Result<SampleReading, NoiseError> {
    let captures = max_amplitude_re().captures(report).ok_or_else(|| {
        NoiseError::Analysis(format!(
            "no 'Maximum amplitude' line in statistics output: {}",
            first_line(report)
        ))
    })?;
    let raw = &captures[1];
    let value: f64 = raw
        .parse()
        .map_err(|err| NoiseError::Analysis(format!("bad amplitude '{raw}': {err}")))?;
    if !value.is_finite() {
        return Err(NoiseError::Analysis(format!("amplitude '{raw}' is not finite")));
    }
    Ok(SampleReading::new(value))
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("<empty>")
}

/// Full `stat` report, used by the one-shot card test.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatReport {
    pub samples_read: Option<u64>,
    pub length_seconds: Option<f64>,
    pub scaled_by: Option<f64>,
    pub maximum_amplitude: Option<f64>,
    pub minimum_amplitude: Option<f64>,
    pub midline_amplitude: Option<f64>,
    pub mean_norm: Option<f64>,
    pub mean_amplitude: Option<f64>,
    pub rms_amplitude: Option<f64>,
    pub maximum_delta: Option<f64>,
    pub minimum_delta: Option<f64>,
    pub mean_delta: Option<f64>,
    pub rms_delta: Option<f64>,
    pub rough_frequency: Option<u64>,
    pub volume_adjustment: Option<f64>,
}

impl StatReport {
    /// Parse every `Label: value` line sox prints; unknown labels are skipped.
    pub fn parse(report: &str) -> Self {
        let mut stats = StatReport::default();
        for line in report.lines() {
            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
            let value = value.trim();
            let float = || value.parse::<f64>().ok();
            match label.as_str() {
                "Samples read" => stats.samples_read = value.parse().ok(),
                "Length (seconds)" => stats.length_seconds = float(),
                "Scaled by" => stats.scaled_by = float(),
                "Maximum amplitude" => stats.maximum_amplitude = float(),
                "Minimum amplitude" => stats.minimum_amplitude = float(),
                "Midline amplitude" => stats.midline_amplitude = float(),
                "Mean norm" => stats.mean_norm = float(),
                "Mean amplitude" => stats.mean_amplitude = float(),
                "RMS amplitude" => stats.rms_amplitude = float(),
                "Maximum delta" => stats.maximum_delta = float(),
                "Minimum delta" => stats.minimum_delta = float(),
                "Mean delta" => stats.mean_delta = float(),
                "RMS delta" => stats.rms_delta = float(),
                "Rough frequency" => stats.rough_frequency = value.parse().ok(),
                "Volume adjustment" => stats.volume_adjustment = float(),
                _ => {}
            }
        }
        stats
    }
}

/// Measures a sample file.
pub trait AmplitudeProbe {
    fn measure(&mut self, wav: &Path, shutdown: &Shutdown) -> Result<SampleReading, NoiseError>;
}

/// Runs `sox -t .wav <file> -n stat`.
#[derive(Debug, Clone)]
pub struct SoxAnalyzer {
    program: String,
    timeout: Duration,
}

impl SoxAnalyzer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Run sox and return its raw report (stdout and stderr joined).
    pub fn stat_report(&self, wav: &Path, shutdown: &Shutdown) -> Result<String, NoiseError> {
        let invocation = Invocation::new(&self.program)
            .args(["-t", ".wav"])
            .arg(wav.as_os_str())
            .args(["-n", "stat"]);
        let output = run_tool(&invocation, self.timeout, shutdown).map_err(|err| match err {
            ToolError::Cancelled { .. } => NoiseError::Cancelled,
            other => NoiseError::Analysis(other.to_string()),
        })?;
        let report = output.combined();
        // sox can exit non-zero on odd headers and still print usable stats.
        if !output.success() && !max_amplitude_re().is_match(&report) {
            return Err(NoiseError::Analysis(format!(
                "{} exited with status {}: {}",
                self.program,
                output.status_label(),
                first_line(&report)
            )));
        }
        Ok(report)
    }
}

impl AmplitudeProbe for SoxAnalyzer {
    fn measure(&mut self, wav: &Path, shutdown: &Shutdown) -> Result<SampleReading, NoiseError> {
        let report = self.stat_report(wav, shutdown)?;
        let reading = parse_max_amplitude(&report)?;
        trace!(max_amplitude = reading.max_amplitude, "sample analysed");
        Ok(reading)
    }
}
