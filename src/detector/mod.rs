//! The sampling-and-decision loop.
//!
//! Each cycle captures a fixed-length sample, measures its peak amplitude and archives
//! the sample when the peak is strictly above the threshold. Cycles run back to back on
//! the calling thread; only a shutdown request ends the loop.


use crate::analyzer::{AmplitudeProbe, SampleReading};
use crate::archive::{mp3_path_for, SampleArchiver};
use crate::capture::SampleRecorder;
use crate::config::DetectorConfig;
use crate::error::NoiseError;
use crate::shutdown::Shutdown;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn};

/// Strict comparison: a reading equal to the threshold is not a detection.
pub fn is_detection(reading: SampleReading, threshold: f64) -> bool {
    reading.max_amplitude > threshold
}

/// Result of a single cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Sample analysed, nothing above the threshold.
    Quiet { reading: SampleReading },
    /// Above the threshold. `archived` holds the uploaded file or the failure.
    Detected {
        reading: SampleReading,
        archived: Result<PathBuf, NoiseError>,
    },
    /// Capture or analysis failed; treated as no detection.
    Skipped { error: NoiseError },
    /// Shutdown was requested before or during the cycle.
    Stopped,
}

impl CycleOutcome {
    pub fn is_detection(&self) -> bool {
        matches!(self, CycleOutcome::Detected { .. })
    }
}

/// Counters reported when the loop returns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub detections: u64,
    pub skipped: u64,
    pub upload_failures: u64,
}

/// Drives recorder → probe → threshold → archiver until shutdown.
pub struct DetectionLoop<R, A, U> {
    config: DetectorConfig,
    recorder: R,
    probe: A,
    archiver: U,
    shutdown: Shutdown,
    stats: LoopStats,
}

impl<R, A, U> DetectionLoop<R, A, U>
where
    R: SampleRecorder,
    A: AmplitudeProbe,
    U: SampleArchiver,
{
    pub fn new(
        config: DetectorConfig,
        recorder: R,
        probe: A,
        archiver: U,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            config,
            recorder,
            probe,
            archiver,
            shutdown,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run cycles until shutdown. Per-cycle failures are logged and never end the loop.
    pub fn run(&mut self) -> LoopStats {
        info!(
            microphone = %self.config.microphone,
            threshold = self.config.threshold,
            sample_s = self.config.sample_duration.as_secs(),
            "detection loop started"
        );
        while !matches!(self.run_cycle(), CycleOutcome::Stopped) {}
        info!(
            cycles = self.stats.cycles,
            detections = self.stats.detections,
            skipped = self.stats.skipped,
            upload_failures = self.stats.upload_failures,
            "detection loop stopped"
        );
        self.stats
    }

    /// One Capturing → Analyzing → Deciding → (Archiving | Logging) pass.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        if self.shutdown.is_requested() {
            return CycleOutcome::Stopped;
        }
        self.stats.cycles += 1;
        let span = info_span!("cycle", n = self.stats.cycles);
        let _entered = span.enter();

        let wav = self.config.wav_path();
        let reading = match self
            .recorder
            .record(&self.config, &self.shutdown)
            .and_then(|()| self.probe.measure(&wav, &self.shutdown))
        {
            Ok(reading) => reading,
            Err(NoiseError::Cancelled) => return CycleOutcome::Stopped,
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "cycle skipped");
                self.stats.skipped += 1;
                return CycleOutcome::Skipped { error: err };
            }
        };

        if self.config.verbose {
            debug!(amplitude = reading.max_amplitude, "Detected amplitude");
        }

        if !is_detection(reading, self.config.threshold) {
            debug!("No sound detected...");
            return CycleOutcome::Quiet { reading };
        }

        self.stats.detections += 1;
        info!(
            amplitude = reading.max_amplitude,
            threshold = self.config.threshold,
            "Sound detected!!!"
        );
        let archived = self.archiver.archive(&wav, &self.shutdown);
        match &archived {
            Ok(uploaded) => info!(file = %uploaded.display(), "sample archived"),
            Err(NoiseError::Cancelled) => return CycleOutcome::Stopped,
            Err(err) => {
                self.stats.upload_failures += 1;
                // The wav is overwritten by the next capture; an encoded copy lasts until
                // the next detection.
                let mp3 = mp3_path_for(&wav);
                if mp3.is_file() {
                    error!(
                        error = %err,
                        encoded = %mp3.display(),
                        "archiving failed; encoded copy left until the next detection"
                    );
                } else {
                    error!(error = %err, "archiving failed; sample was not kept");
                }
            }
        }
        CycleOutcome::Detected { reading, archived }
    }
}
