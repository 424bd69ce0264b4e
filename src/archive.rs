//! Encode a detected sample to MP3 and hand it to the upload client.

use crate::config::{with_extension, DetectorConfig};
use crate::error::NoiseError;
use crate::process::{run_tool, Invocation, ToolError, ToolOutput};
use crate::shutdown::Shutdown;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

/// Archives one raw sample, returning the path of what was uploaded.
pub trait SampleArchiver {
    fn archive(&mut self, wav: &Path, shutdown: &Shutdown) -> Result<PathBuf, NoiseError>;
}

/// `lame` for encoding, then `<upload> upload --file <mp3> [--parent ID]`.
#[derive(Debug, Clone)]
pub struct LameDriveArchiver {
    lame: String,
    upload: String,
    upload_parent: Option<String>,
    timeout: Duration,
}

impl LameDriveArchiver {
    pub fn new(
        lame: impl Into<String>,
        upload: impl Into<String>,
        upload_parent: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            lame: lame.into(),
            upload: upload.into(),
            upload_parent,
            timeout,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            config.tools.lame.clone(),
            config.tools.upload.clone(),
            config.upload_parent.clone(),
            config.tool_timeout,
        )
    }

    fn encode_invocation(&self, wav: &Path, mp3: &Path) -> Invocation {
        Invocation::new(&self.lame)
            .arg("--quiet")
            .arg(wav.as_os_str())
            .arg(mp3.as_os_str())
    }

    fn upload_invocation(&self, mp3: &Path) -> Invocation {
        let invocation = Invocation::new(&self.upload)
            .args(["upload", "--file"])
            .arg(mp3.as_os_str());
        match &self.upload_parent {
            Some(parent) => invocation.arg("--parent").arg(parent),
            None => invocation,
        }
    }

    fn run_step(
        &self,
        step: &str,
        invocation: &Invocation,
        shutdown: &Shutdown,
    ) -> Result<ToolOutput, NoiseError> {
        let output = run_tool(invocation, self.timeout, shutdown).map_err(|err| match err {
            ToolError::Cancelled { .. } => NoiseError::Cancelled,
            other => NoiseError::Upload(format!("{step}: {other}")),
        })?;
        if !output.success() {
            error!(
                step,
                program = %invocation.program,
                status = %output.status_label(),
                stderr = %output.stderr.trim(),
                "archive step failed"
            );
            return Err(NoiseError::Upload(format!(
                "{step}: {} exited with status {}",
                invocation.program,
                output.status_label()
            )));
        }
        info!(
            step,
            program = %invocation.program,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "archive step finished"
        );
        Ok(output)
    }
}

impl SampleArchiver for LameDriveArchiver {
    fn archive(&mut self, wav: &Path, shutdown: &Shutdown) -> Result<PathBuf, NoiseError> {
        let mp3 = mp3_path_for(wav);
        // A failed encode must not leave an older detection's mp3 looking like this one.
        if let Err(err) = fs::remove_file(&mp3) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(NoiseError::Upload(format!(
                    "encode: cannot replace '{}': {err}",
                    mp3.display()
                )));
            }
        }
        self.run_step("encode", &self.encode_invocation(wav, &mp3), shutdown)?;
        self.run_step("upload", &self.upload_invocation(&mp3), shutdown)?;
        Ok(mp3)
    }
}

/// `<stem>.wav` becomes `<stem>.mp3`; anything else gets `.mp3` appended.
pub fn mp3_path_for(wav: &Path) -> PathBuf {
    match wav.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => wav.with_extension("mp3"),
        _ => with_extension(wav, "mp3"),
    }
}
