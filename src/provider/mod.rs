//! Statement providers.
//!
//! Defines the `StatementProvider` trait the engine and strategies read
//! from, and `Stock`, the provider backed by a statement snapshot held in
//! memory or stored on disk.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::storage;
use crate::types::{BalancePeriod, CashFlowPeriod, IncomePeriod, MarketCapPoint, SimError};

/// Read access to one instrument's financial statements and market cap.
///
/// Statement tables are ordered newest-first. Accessors must fail with
/// `SimError::Usage` until `open` has been called.
pub trait StatementProvider: Send {
    /// Instrument symbol for logging and error reporting.
    fn symbol(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Load the statements. Calling it on an open provider is a no-op.
    fn open(&mut self) -> Result<(), SimError>;

    fn income_statement(&self) -> Result<&[IncomePeriod], SimError>;

    fn balance_sheet(&self) -> Result<&[BalancePeriod], SimError>;

    fn cash_flow(&self) -> Result<&[CashFlowPeriod], SimError>;

    /// Market cap samples dated within `[start, end]`, oldest first.
    /// An empty window is `Ok(vec![])`, not an error.
    fn market_cap(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MarketCapPoint>, SimError>;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Every table a provider serves, as persisted per symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    #[serde(default)]
    pub income_statement: Vec<IncomePeriod>,
    #[serde(default)]
    pub balance_sheet: Vec<BalancePeriod>,
    #[serde(default)]
    pub cash_flow: Vec<CashFlowPeriod>,
    #[serde(default)]
    pub market_cap: Vec<MarketCapPoint>,
}

impl StockSnapshot {
    /// Statement tables newest-first, market cap oldest-first.
    fn normalise(&mut self) {
        self.income_statement
            .sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
        self.balance_sheet
            .sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
        self.cash_flow
            .sort_by(|a, b| b.fiscal_date_ending.cmp(&a.fiscal_date_ending));
        self.market_cap.sort_by(|a, b| a.date.cmp(&b.date));
    }
}

/// Where a `Stock` gets its snapshot from on `open`.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    Memory(StockSnapshot),
    Directory(PathBuf),
}

// ---------------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------------

/// A listed company whose statements are loaded lazily on `open`.
#[derive(Debug, Clone)]
pub struct Stock {
    symbol: String,
    name: String,
    source: SnapshotSource,
    data: Option<StockSnapshot>,
}

impl Stock {
    /// A stock served from an in-memory snapshot.
    pub fn from_snapshot(symbol: &str, name: &str, snapshot: StockSnapshot) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            source: SnapshotSource::Memory(snapshot),
            data: None,
        }
    }

    /// A stock whose snapshot lives under `<dir>/<SYMBOL>/`.
    pub fn from_dir(symbol: &str, name: &str, dir: impl Into<PathBuf>) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            source: SnapshotSource::Directory(dir.into()),
            data: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> Result<&StockSnapshot, SimError> {
        self.data.as_ref().ok_or_else(|| {
            SimError::Usage(format!("stock {} must be opened before reading statements", self.symbol))
        })
    }
}

impl StatementProvider for Stock {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn is_open(&self) -> bool {
        self.data.is_some()
    }

    fn open(&mut self) -> Result<(), SimError> {
        if self.is_open() {
            return Ok(());
        }

        let mut snapshot = match &self.source {
            SnapshotSource::Memory(snapshot) => snapshot.clone(),
            SnapshotSource::Directory(dir) => storage::load_snapshot(dir, &self.symbol)
                .map_err(|e| SimError::data_unavailable(&self.symbol, format!("{e:#}")))?,
        };
        snapshot.normalise();

        debug!(
            symbol = %self.symbol,
            income = snapshot.income_statement.len(),
            balance = snapshot.balance_sheet.len(),
            cash_flow = snapshot.cash_flow.len(),
            market_cap = snapshot.market_cap.len(),
            "Stock opened"
        );
        self.data = Some(snapshot);
        Ok(())
    }

    fn income_statement(&self) -> Result<&[IncomePeriod], SimError> {
        Ok(&self.data()?.income_statement)
    }

    fn balance_sheet(&self) -> Result<&[BalancePeriod], SimError> {
        Ok(&self.data()?.balance_sheet)
    }

    fn cash_flow(&self) -> Result<&[CashFlowPeriod], SimError> {
        Ok(&self.data()?.cash_flow)
    }

    fn market_cap(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MarketCapPoint>, SimError> {
        if end < start {
            return Err(SimError::Usage(format!(
                "market cap window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(self
            .data()?
            .market_cap
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect())
    }
}

impl std::fmt::Display for Stock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.symbol)
        } else {
            write!(f, "{} ({})", self.name, self.symbol)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
