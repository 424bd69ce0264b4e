pub mod analyzer;
pub mod archive;
pub mod capture;
pub mod cards;
pub mod config;
pub mod detector;
pub mod doctor;
pub mod error;
pub mod logging;
pub mod pidfile;
pub mod process;
pub mod shutdown;

pub use analyzer::{parse_max_amplitude, SampleReading, SoxAnalyzer, StatReport};
pub use archive::LameDriveArchiver;
pub use capture::ArecordRecorder;
pub use config::{AppConfig, DetectorConfig};
pub use detector::{is_detection, CycleOutcome, DetectionLoop, LoopStats};
pub use error::NoiseError;
pub use shutdown::Shutdown;
