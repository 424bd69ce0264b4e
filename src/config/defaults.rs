use std::env;
use std::path::PathBuf;

pub const DEFAULT_SAMPLE_SECONDS: u32 = 5;
pub const MIN_SAMPLE_SECONDS: u32 = 1;
pub const MAX_SAMPLE_SECONDS: u32 = 3600;
pub const DEFAULT_TOOL_TIMEOUT_SECONDS: u64 = 120;
pub const MAX_TOOL_TIMEOUT_SECONDS: u64 = 3600;

pub const DEFAULT_SAMPLE_PATH: &str = "/home/pi/noise";
pub const DEFAULT_LOG_FILE: &str = "/home/pi/noise_detector.log";
pub const DEFAULT_CARDS_FILE: &str = "/proc/asound/cards";

pub const DEFAULT_ARECORD_CMD: &str = "arecord";
pub const DEFAULT_SOX_CMD: &str = "sox";
pub const DEFAULT_LAME_CMD: &str = "lame";
pub const DEFAULT_UPLOAD_CMD: &str = "drive";

/// sox reports normalised amplitudes; anything above this can never fire.
pub const AMPLITUDE_CEILING: f64 = 1.0;

pub(super) const MAX_ID_LEN: usize = 64;
pub(super) const MAX_PATH_LEN: usize = 4096;
// Tool names and ids end up in argv of other programs; keep shell metacharacters out.
pub(super) const FORBIDDEN_ARG_CHARS: &[char] =
    &[';', '|', '&', '$', '`', '<', '>', '\\', '\'', '"', '*', '?'];

pub fn default_pid_file() -> PathBuf {
    env::temp_dir().join("noisewatch.pid")
}
