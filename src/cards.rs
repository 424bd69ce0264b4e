//! Sound card listing from `/proc/asound/cards`.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// One card entry: `index [id]: driver - description`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundCard {
    pub index: u32,
    pub id: String,
    pub description: String,
}

/// Raw listing, printed as-is by `--detect`.
pub fn read_cards(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

/// Parse the header lines of an ALSA card listing; continuation lines are skipped.
pub fn parse_cards(listing: &str) -> Vec<SoundCard> {
    listing
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (index, rest) = line.split_once(' ')?;
            let index = index.parse().ok()?;
            let rest = rest.trim_start().strip_prefix('[')?;
            let (id, rest) = rest.split_once(']')?;
            let description = rest
                .trim_start()
                .strip_prefix(':')
                .unwrap_or(rest)
                .trim()
                .to_string();
            Some(SoundCard {
                index,
                id: id.trim().to_string(),
                description,
            })
        })
        .collect()
}
