use anyhow::Result;
use noisewatch::analyzer::{SoxAnalyzer, StatReport};
use noisewatch::capture::capture_to;
use noisewatch::cards::read_cards;
use noisewatch::config::{wav_path, AppConfig};
use noisewatch::doctor::require_tools;
use noisewatch::pidfile::terminate_running;
use noisewatch::Shutdown;
use std::time::Duration;

pub(crate) fn detect_cards(config: &AppConfig) -> Result<()> {
    println!("Detecting your soundcard...");
    print!("{}", read_cards(&config.cards_file)?);
    Ok(())
}

pub(crate) fn kill_running(config: &AppConfig) -> Result<()> {
    let pid = terminate_running(&config.pid_file)?;
    println!("Sent SIGTERM to noisewatch (pid {pid})");
    Ok(())
}

/// One capture on `card` followed by a stat report, raw or as JSON.
pub(crate) fn test_card(config: &AppConfig, card: &str, shutdown: &Shutdown) -> Result<String> {
    require_tools([
        ("arecord", config.arecord_cmd.as_str(), "install package alsa-utils"),
        ("sox", config.sox_cmd.as_str(), "install package sox"),
    ])?;
    let duration = Duration::from_secs(u64::from(config.sample_seconds));
    let timeout = Duration::from_secs(config.tool_timeout_seconds);
    let wav = wav_path(&config.sample_path);
    capture_to(
        &config.arecord_cmd,
        card,
        duration,
        config.format,
        &wav,
        duration + timeout,
        shutdown,
    )?;
    let report = SoxAnalyzer::new(config.sox_cmd.as_str(), timeout).stat_report(&wav, shutdown)?;
    render_test_report(&report, config.json)
}

pub(crate) fn render_test_report(report: &str, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(&StatReport::parse(report))?)
    } else {
        Ok(report.trim_end().to_string())
    }
}
