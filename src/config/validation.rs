use super::defaults::{
    FORBIDDEN_ARG_CHARS, MAX_ID_LEN, MAX_PATH_LEN, MAX_SAMPLE_SECONDS, MAX_TOOL_TIMEOUT_SECONDS,
    MIN_SAMPLE_SECONDS,
};
use super::{AppConfig, DetectorConfig, ToolPaths};
use crate::error::NoiseError;
use clap::Parser;
use std::path::Path;
use std::time::Duration;

type Result<T> = std::result::Result<T, NoiseError>;

impl AppConfig {
    /// Parse CLI arguments. Clap handles usage errors and exits by itself.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Checks every mode relies on: sample range, tool names and paths.
    pub fn validate_common(&self) -> Result<()> {
        if !(MIN_SAMPLE_SECONDS..=MAX_SAMPLE_SECONDS).contains(&self.sample_seconds) {
            return Err(NoiseError::config(format!(
                "--sample must be between {MIN_SAMPLE_SECONDS} and {MAX_SAMPLE_SECONDS} seconds, got {}",
                self.sample_seconds
            )));
        }
        if self.tool_timeout_seconds == 0 || self.tool_timeout_seconds > MAX_TOOL_TIMEOUT_SECONDS {
            return Err(NoiseError::config(format!(
                "--tool-timeout must be between 1 and {MAX_TOOL_TIMEOUT_SECONDS} seconds, got {}",
                self.tool_timeout_seconds
            )));
        }
        check_program(&self.arecord_cmd, "--arecord-cmd")?;
        check_program(&self.sox_cmd, "--sox-cmd")?;
        check_program(&self.lame_cmd, "--lame-cmd")?;
        check_program(&self.upload_cmd, "--upload-cmd")?;
        check_path(&self.sample_path, "--sample-path")?;
        if self.sample_path.file_name().is_none() {
            return Err(NoiseError::config(format!(
                "--sample-path '{}' must name a file stem, not a directory",
                self.sample_path.display()
            )));
        }
        if let Some(id) = &self.test {
            check_identifier(id, "--test")?;
        }
        if let Some(parent) = &self.upload_parent {
            check_identifier(parent, "--upload-parent")?;
        }
        Ok(())
    }

    /// Build the detection loop configuration. Pure: the same flags always resolve to
    /// the same value, and nothing on disk is consulted.
    pub fn resolve(&self) -> Result<DetectorConfig> {
        self.validate_common()?;

        let microphone = self
            .microphone
            .as_deref()
            .ok_or_else(|| NoiseError::config("missing required --microphone SOUND_CARD_ID"))?;
        check_identifier(microphone, "--microphone")?;

        let threshold = self
            .threshold
            .ok_or_else(|| NoiseError::config("missing required --threshold NOISE_THRESHOLD"))?;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(NoiseError::config(format!(
                "--threshold must be a positive number, got {threshold}"
            )));
        }

        Ok(DetectorConfig {
            microphone: microphone.trim().to_string(),
            sample_duration: Duration::from_secs(u64::from(self.sample_seconds)),
            threshold,
            verbose: self.verbose,
            format: self.format,
            sample_stem: self.sample_path.clone(),
            tools: ToolPaths {
                arecord: self.arecord_cmd.trim().to_string(),
                sox: self.sox_cmd.trim().to_string(),
                lame: self.lame_cmd.trim().to_string(),
                upload: self.upload_cmd.trim().to_string(),
            },
            upload_parent: self.upload_parent.as_ref().map(|p| p.trim().to_string()),
            tool_timeout: Duration::from_secs(self.tool_timeout_seconds),
        })
    }
}

/// Card ids and folder ids travel as single argv entries; keep them short and plain.
pub(super) fn check_identifier(value: &str, flag: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(NoiseError::config(format!("{flag} cannot be empty")));
    }
    if trimmed.len() > MAX_ID_LEN
        || trimmed
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control() || FORBIDDEN_ARG_CHARS.contains(&ch))
    {
        return Err(NoiseError::config(format!(
            "{flag} must be <= {MAX_ID_LEN} characters with no whitespace or shell metacharacters, got '{trimmed}'"
        )));
    }
    Ok(())
}

/// Tool overrides may be a bare name or a path, but never an empty or shell-laden string.
pub(super) fn check_program(value: &str, flag: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(NoiseError::config(format!("{flag} cannot be empty")));
    }
    if trimmed.len() > MAX_PATH_LEN
        || trimmed
            .chars()
            .any(|ch| ch.is_control() || FORBIDDEN_ARG_CHARS.contains(&ch))
    {
        return Err(NoiseError::config(format!(
            "{flag} must be a program name or path without control or shell metacharacters"
        )));
    }
    Ok(())
}

pub(super) fn check_path(path: &Path, flag: &str) -> Result<()> {
    let raw = path.as_os_str();
    if raw.is_empty() {
        return Err(NoiseError::config(format!("{flag} cannot be empty")));
    }
    if raw.len() > MAX_PATH_LEN {
        return Err(NoiseError::config(format!(
            "{flag} exceeds {MAX_PATH_LEN} bytes"
        )));
    }
    if path.to_string_lossy().chars().any(char::is_control) {
        return Err(NoiseError::config(format!(
            "{flag} must not contain control characters"
        )));
    }
    Ok(())
}
