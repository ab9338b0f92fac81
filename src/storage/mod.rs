//! Persistence layer.
//!
//! Reads per-symbol statement snapshots and the company listing from a
//! data directory, and writes batch reports. Everything is JSON.
//!
//! Layout:
//! ```text
//! <dir>/listing.json
//! <dir>/<SYMBOL>/snapshot.json
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::provider::StockSnapshot;
use crate::types::ListedCompany;

/// File name of a symbol's snapshot inside its directory.
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Path of the snapshot for `symbol` under `dir`.
pub fn snapshot_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(symbol).join(SNAPSHOT_FILE)
}

/// Load a symbol's statement snapshot.
pub fn load_snapshot(dir: &Path, symbol: &str) -> Result<StockSnapshot> {
    let path = snapshot_path(dir, symbol);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let snapshot: StockSnapshot = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

    debug!(
        symbol,
        path = %path.display(),
        periods = snapshot.income_statement.len(),
        "Snapshot loaded"
    );
    Ok(snapshot)
}

/// Save a symbol's statement snapshot, creating its directory if needed.
pub fn save_snapshot(dir: &Path, symbol: &str, snapshot: &StockSnapshot) -> Result<()> {
    let path = snapshot_path(dir, symbol);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(snapshot).context("Failed to serialise snapshot")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

    debug!(symbol, path = %path.display(), "Snapshot saved");
    Ok(())
}

/// Load the exchange listing.
pub fn load_listing(path: &Path) -> Result<Vec<ListedCompany>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read listing {}", path.display()))?;
    let listing: Vec<ListedCompany> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse listing {}", path.display()))?;

    info!(path = %path.display(), companies = listing.len(), "Listing loaded");
    Ok(listing)
}

/// Write any serialisable report as pretty JSON.
pub fn save_report<T: Serialize>(report: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    info!(path = %path.display(), "Report saved");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
