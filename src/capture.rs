//! Fixed-length microphone capture through `arecord`.

use crate::config::{DetectorConfig, RecordingFormat};
use crate::error::NoiseError;
use crate::process::{run_tool, Invocation, ToolError};
use crate::shutdown::Shutdown;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Size of a canonical RIFF/WAVE header; a file this small holds no samples.
const WAV_HEADER_BYTES: u64 = 44;

/// Produces one sample file per call, overwriting the previous one.
pub trait SampleRecorder {
    fn record(&mut self, config: &DetectorConfig, shutdown: &Shutdown) -> Result<(), NoiseError>;
}

/// `arecord` wrapper used by the detection loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArecordRecorder;

impl SampleRecorder for ArecordRecorder {
    fn record(&mut self, config: &DetectorConfig, shutdown: &Shutdown) -> Result<(), NoiseError> {
        let wav = config.wav_path();
        capture_to(
            &config.tools.arecord,
            &config.microphone,
            config.sample_duration,
            config.format,
            &wav,
            config.capture_timeout(),
            shutdown,
        )
    }
}

/// ALSA device string for a card id; `plughw` converts to whatever the card supports.
pub fn alsa_device(card: &str) -> String {
    format!("plughw:{card},0")
}

pub(crate) fn arecord_invocation(
    program: &str,
    card: &str,
    duration: Duration,
    format: RecordingFormat,
    output: &Path,
) -> Invocation {
    Invocation::new(program)
        .arg("-q")
        .arg("-D")
        .arg(alsa_device(card))
        .arg("-d")
        .arg(duration.as_secs().to_string())
        .arg("-f")
        .arg(format.label())
        .arg("-t")
        .arg("wav")
        .arg(output.as_os_str())
}

/// Record `duration` seconds from `card` into `output` and check the result is usable.
pub fn capture_to(
    program: &str,
    card: &str,
    duration: Duration,
    format: RecordingFormat,
    output: &Path,
    timeout: Duration,
    shutdown: &Shutdown,
) -> Result<(), NoiseError> {
    let invocation = arecord_invocation(program, card, duration, format, output);
    let result = run_tool(&invocation, timeout, shutdown).map_err(|err| match err {
        ToolError::Cancelled { .. } => NoiseError::Cancelled,
        other => NoiseError::Capture(other.to_string()),
    })?;
    if !result.success() {
        return Err(NoiseError::Capture(format!(
            "{program} exited with status {}: {}",
            result.status_label(),
            result.stderr.trim()
        )));
    }
    let size = fs::metadata(output)
        .map(|m| m.len())
        .map_err(|err| NoiseError::Capture(format!("no sample at '{}': {err}", output.display())))?;
    if size <= WAV_HEADER_BYTES {
        return Err(NoiseError::Capture(format!(
            "sample '{}' is empty ({size} bytes)",
            output.display()
        )));
    }
    debug!(path = %output.display(), bytes = size, "sample captured");
    Ok(())
}
