//! noisewatch entrypoint.
//!
//! Utility modes (`--detect`, `--kill`, `--doctor`, `--test`) run once and exit. Otherwise
//! the detector validates its configuration and tools, then samples the microphone until
//! SIGINT/SIGTERM.

mod cli_utils;

use anyhow::Result;
use noisewatch::config::{AppConfig, DetectorConfig, AMPLITUDE_CEILING};
use noisewatch::doctor::{doctor_report, preflight};
use noisewatch::logging::{init_logging, LogSettings};
use noisewatch::pidfile::PidFileGuard;
use noisewatch::shutdown::install_signal_handlers;
use noisewatch::{ArecordRecorder, DetectionLoop, LameDriveArchiver, Shutdown, SoxAnalyzer};
use tracing::{debug, info, warn};

use crate::cli_utils::{detect_cards, kill_running, test_card};

fn main() -> Result<()> {
    let config = AppConfig::parse_args();

    if config.detect {
        return detect_cards(&config);
    }
    if config.kill {
        return kill_running(&config);
    }
    if config.doctor {
        println!("{}", doctor_report(&config).render());
        return Ok(());
    }

    config.validate_common()?;

    if let Some(card) = config.test.as_deref() {
        init_logging(&LogSettings {
            file: None,
            json: false,
            verbose: config.verbose,
        })?;
        let shutdown = install_signal_handlers()?;
        println!("Testing soundcard...");
        println!("{}", test_card(&config, card, &shutdown)?);
        return Ok(());
    }

    // Fail before touching the log file or the microphone.
    let detector_config = config.resolve()?;
    preflight(&detector_config, &config.cards_file)?;
    let _pid_guard = PidFileGuard::create(&config.pid_file)?;

    init_logging(&LogSettings {
        file: Some(config.log_file.clone()),
        json: config.log_json,
        verbose: config.verbose,
    })?;
    info!("Noise detector started");
    if detector_config.threshold >= AMPLITUDE_CEILING {
        warn!(
            threshold = detector_config.threshold,
            "threshold is at or above the maximum normalised amplitude; nothing will be detected"
        );
    }
    if detector_config.verbose {
        log_parameters(&detector_config);
    }

    let shutdown = install_signal_handlers()?;
    run_detector(detector_config, shutdown);
    info!("Noise detector exiting");
    Ok(())
}

fn log_parameters(config: &DetectorConfig) {
    debug!("Script parameters configurations:");
    debug!("SoundCard ID: {}", config.microphone);
    debug!("Sample Duration: {}s", config.sample_duration.as_secs());
    debug!("Output Format: {}", config.format);
    debug!("Noise Threshold: {}", config.threshold);
    debug!(
        "Record filename (overwritten): {}",
        config.sample_stem.display()
    );
    debug!("Tool timeout: {}s", config.tool_timeout.as_secs());
}

fn run_detector(config: DetectorConfig, shutdown: Shutdown) {
    let analyzer = SoxAnalyzer::new(config.tools.sox.clone(), config.tool_timeout);
    let archiver = LameDriveArchiver::from_config(&config);
    let mut detector = DetectionLoop::new(config, ArecordRecorder, analyzer, archiver, shutdown);
    let stats = detector.run();
    debug!(?stats, "final counters");
}
