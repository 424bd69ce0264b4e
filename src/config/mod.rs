//! Command-line parsing and the resolved detector configuration.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use defaults::{
    default_pid_file, AMPLITUDE_CEILING, DEFAULT_ARECORD_CMD, DEFAULT_CARDS_FILE,
    DEFAULT_LAME_CMD, DEFAULT_LOG_FILE, DEFAULT_SAMPLE_PATH, DEFAULT_SAMPLE_SECONDS,
    DEFAULT_SOX_CMD, DEFAULT_TOOL_TIMEOUT_SECONDS, DEFAULT_UPLOAD_CMD, MAX_SAMPLE_SECONDS,
    MIN_SAMPLE_SECONDS,
};

/// CLI options for noisewatch. `resolve` turns them into a [`DetectorConfig`].
#[derive(Debug, Parser, Clone, PartialEq)]
#[command(
    name = "noisewatch",
    about = "Noise detector: records a microphone and archives samples louder than a threshold",
    author,
    version,
    override_usage = "noisewatch -m ID -n THRESHOLD [options]"
)]
pub struct AppConfig {
    /// REQUIRED: sound card id of the microphone (see --detect)
    #[arg(short = 'm', long = "microphone", value_name = "SOUND_CARD_ID")]
    pub microphone: Option<String>,

    /// Sample duration in seconds
    #[arg(short = 's', long = "sample", value_name = "SECONDS", default_value_t = DEFAULT_SAMPLE_SECONDS)]
    pub sample_seconds: u32,

    /// Activation noise threshold, e.g. 0.1
    #[arg(short = 'n', long = "threshold", value_name = "NOISE_THRESHOLD")]
    pub threshold: Option<f64>,

    /// Log every reading and mirror log records to stderr
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    pub verbose: bool,

    /// Print the sound cards known to ALSA and exit
    #[arg(short = 'd', long = "detect", default_value_t = false)]
    pub detect: bool,

    /// Record one sample from the given card, print its statistics and exit
    #[arg(short = 't', long = "test", value_name = "SOUND_CARD_ID")]
    pub test: Option<String>,

    /// With --test, print the statistics as JSON
    #[arg(long = "json", default_value_t = false, requires = "test")]
    pub json: bool,

    /// Terminate the running detector recorded in --pid-file
    #[arg(short = 'k', long = "kill", default_value_t = false)]
    pub kill: bool,

    /// Print environment diagnostics and exit
    #[arg(long = "doctor", default_value_t = false)]
    pub doctor: bool,

    /// Raw capture format handed to arecord
    #[arg(long = "format", value_enum, default_value_t = RecordingFormat::S16Le)]
    pub format: RecordingFormat,

    /// Path stem reused for the .wav/.mp3 pair every cycle
    #[arg(long = "sample-path", env = "NOISEWATCH_SAMPLE_PATH", default_value = DEFAULT_SAMPLE_PATH)]
    pub sample_path: PathBuf,

    /// Log file location
    #[arg(long = "log-file", env = "NOISEWATCH_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Write JSON lines to the log file instead of plain text
    #[arg(long = "log-json", default_value_t = false)]
    pub log_json: bool,

    /// Where the running detector records its pid
    #[arg(long = "pid-file", default_value_os_t = default_pid_file())]
    pub pid_file: PathBuf,

    /// ALSA card listing
    #[arg(long = "cards-file", default_value = DEFAULT_CARDS_FILE)]
    pub cards_file: PathBuf,

    /// Capture tool
    #[arg(long = "arecord-cmd", default_value = DEFAULT_ARECORD_CMD)]
    pub arecord_cmd: String,

    /// Statistics tool
    #[arg(long = "sox-cmd", default_value = DEFAULT_SOX_CMD)]
    pub sox_cmd: String,

    /// MP3 encoder
    #[arg(long = "lame-cmd", default_value = DEFAULT_LAME_CMD)]
    pub lame_cmd: String,

    /// Upload client (invoked as `<cmd> upload --file <mp3>`)
    #[arg(long = "upload-cmd", default_value = DEFAULT_UPLOAD_CMD)]
    pub upload_cmd: String,

    /// Remote folder id passed to the upload client as --parent
    #[arg(long = "upload-parent", value_name = "ID")]
    pub upload_parent: Option<String>,

    /// Upper bound for analysis, encoding and upload runs (seconds)
    #[arg(long = "tool-timeout", value_name = "SECONDS", default_value_t = DEFAULT_TOOL_TIMEOUT_SECONDS)]
    pub tool_timeout_seconds: u64,
}

/// Sample encodings arecord understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordingFormat {
    #[value(name = "S16_LE")]
    S16Le,
    #[value(name = "S24_LE")]
    S24Le,
    #[value(name = "S32_LE")]
    S32Le,
    #[value(name = "U8")]
    U8,
}

impl RecordingFormat {
    pub fn label(self) -> &'static str {
        match self {
            RecordingFormat::S16Le => "S16_LE",
            RecordingFormat::S24Le => "S24_LE",
            RecordingFormat::S32Le => "S32_LE",
            RecordingFormat::U8 => "U8",
        }
    }
}

impl fmt::Display for RecordingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// External programs the detector drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub arecord: String,
    pub sox: String,
    pub lame: String,
    pub upload: String,
}

impl ToolPaths {
    /// `(label, program, install hint)` for each tool.
    pub fn entries(&self) -> [(&'static str, &str, &'static str); 4] {
        [
            ("arecord", self.arecord.as_str(), "install package alsa-utils"),
            ("sox", self.sox.as_str(), "install package sox"),
            ("lame", self.lame.as_str(), "install package lame"),
            ("upload", self.upload.as_str(), "install the drive client"),
        ]
    }
}

/// Validated, immutable parameters of the detection loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub microphone: String,
    pub sample_duration: Duration,
    pub threshold: f64,
    pub verbose: bool,
    pub format: RecordingFormat,
    pub sample_stem: PathBuf,
    pub tools: ToolPaths,
    pub upload_parent: Option<String>,
    pub tool_timeout: Duration,
}

impl DetectorConfig {
    pub fn wav_path(&self) -> PathBuf {
        wav_path(&self.sample_stem)
    }

    /// Capture blocks for the sample itself, so give it that much on top of the usual bound.
    pub fn capture_timeout(&self) -> Duration {
        self.sample_duration + self.tool_timeout
    }
}

/// Raw sample location for a stem.
pub fn wav_path(stem: &Path) -> PathBuf {
    with_extension(stem, "wav")
}

/// Append an extension without clobbering dots already in the stem.
pub(crate) fn with_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut raw = stem.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}
