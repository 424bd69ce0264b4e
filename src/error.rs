//! Error kinds shared by the detector and its external-tool adapters.

use std::path::PathBuf;

/// Failures the daemon distinguishes. Only the startup kinds are fatal; everything
/// else is scoped to a single detection cycle.
#[derive(thiserror::Error, Debug)]
pub enum NoiseError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{what} not found at '{}'{}", .path.display(), hint_suffix(.hint))]
    DependencyMissing {
        what: String,
        path: PathBuf,
        hint: Option<String>,
    },

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("interrupted by shutdown")]
    Cancelled,
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|h| format!("; {h}"))
        .unwrap_or_default()
}

impl NoiseError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Startup errors terminate the process before the loop runs.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NoiseError::Configuration(_) | NoiseError::DependencyMissing { .. }
        )
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            NoiseError::Configuration(_) => "configuration",
            NoiseError::DependencyMissing { .. } => "dependency_missing",
            NoiseError::Capture(_) => "capture",
            NoiseError::Analysis(_) => "analysis",
            NoiseError::Upload(_) => "upload",
            NoiseError::Cancelled => "cancelled",
        }
    }
}
