//! Shared types for VALUESIM.
//!
//! These types form the data model used across all modules: statement
//! records as supplied by a provider, market-cap samples, the events a
//! simulation records, strategy decisions and the domain error enum.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// One fiscal period of a statement table.
///
/// The header is shared by every statement kind; the body `T` carries the
/// statement-specific numeric fields. Column names follow the provider's
/// camelCase contract (`fiscalDateEnding`, `reportedCurrency`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialPeriod<T> {
    pub fiscal_date_ending: NaiveDate,
    /// Date the statement was filed. Not every provider reports it.
    #[serde(default, alias = "fillingDate")]
    pub filing_date: Option<NaiveDate>,
    pub reported_currency: String,
    #[serde(flatten)]
    pub statement: T,
}

impl<T> FinancialPeriod<T> {
    pub fn new(fiscal_date_ending: NaiveDate, reported_currency: &str, statement: T) -> Self {
        Self {
            fiscal_date_ending,
            filing_date: None,
            reported_currency: reported_currency.to_string(),
            statement,
        }
    }

    pub fn with_filing_date(mut self, filing_date: NaiveDate) -> Self {
        self.filing_date = Some(filing_date);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomeStatement {
    pub revenue: Decimal,
    pub cost_of_revenue: Decimal,
    pub gross_margin: Decimal,
    pub operating_expenses: Decimal,
    pub operating_income: Decimal,
    pub income_before_tax: Decimal,
    pub net_income: Decimal,
    pub eps: Decimal,
    #[serde(rename = "epsdiluted")]
    pub eps_diluted: Decimal,
    pub weighted_average_shares_out: Decimal,
    pub weighted_average_shares_out_dil: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceSheet {
    pub cash_and_cash_equivalents: Decimal,
    pub total_current_assets: Decimal,
    pub total_non_current_assets: Decimal,
    pub total_assets: Decimal,
    pub total_current_liabilities: Decimal,
    pub long_term_debt: Decimal,
    pub total_non_current_liabilities: Decimal,
    pub total_equity: Decimal,
}

impl BalanceSheet {
    /// Current assets over current liabilities. `None` when there are no
    /// current liabilities to divide by.
    pub fn current_ratio(&self) -> Option<Decimal> {
        self.total_current_assets
            .checked_div(self.total_current_liabilities)
    }

    /// (current + non-current assets) over (current + non-current liabilities).
    pub fn asset_liability_ratio(&self) -> Option<Decimal> {
        let assets = self.total_current_assets + self.total_non_current_assets;
        let liabilities = self.total_current_liabilities + self.total_non_current_liabilities;
        assets.checked_div(liabilities)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CashFlowStatement {
    pub net_income: Decimal,
    pub operating_cash_flow: Decimal,
    pub capital_expenditure: Decimal,
    pub free_cash_flow: Decimal,
    /// Financing outflow: stored negative when dividends were paid.
    pub dividends_paid: Decimal,
}

pub type IncomePeriod = FinancialPeriod<IncomeStatement>;
pub type BalancePeriod = FinancialPeriod<BalanceSheet>;
pub type CashFlowPeriod = FinancialPeriod<CashFlowStatement>;

/// A single market capitalization sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCapPoint {
    pub date: NaiveDate,
    pub market_cap: Decimal,
}

impl MarketCapPoint {
    pub fn new(date: NaiveDate, market_cap: Decimal) -> Self {
        Self { date, market_cap }
    }
}

/// An entry of the exchange listing a batch run samples from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedCompany {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exchange: String,
    pub exchange_short_name: String,
}

// ---------------------------------------------------------------------------
// Simulation events
// ---------------------------------------------------------------------------

/// Which ledger an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Buy,
    Sell,
    Info,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Buy => write!(f, "BUY"),
            Operation::Sell => write!(f, "SELL"),
            Operation::Info => write!(f, "INFO"),
        }
    }
}

/// Metric label of the event carrying the transaction price.
pub const MARKET_CAP_METRIC: &str = "market_cap";
/// Metric label of dividend info events.
pub const DIVIDEND_METRIC: &str = "dividend";

/// A recorded buy, sell or info event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub operation: Operation,
    pub metric: String,
    pub date: NaiveDate,
    pub value: Decimal,
}

impl fmt::Display for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}: {}",
            self.operation, self.metric, self.date, self.value
        )
    }
}

// ---------------------------------------------------------------------------
// Strategy decisions
// ---------------------------------------------------------------------------

/// A diagnostic value a strategy attaches to a decision (e.g. the PE that
/// triggered a buy).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Metric name -> diagnostic, ordered by name so recording is deterministic.
pub type Diagnostics = BTreeMap<String, Diagnostic>;

/// Outcome of a buy or sell evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub signal: bool,
    pub diagnostics: Diagnostics,
}

impl Decision {
    /// A negative decision. Declines never carry diagnostics.
    pub fn decline() -> Self {
        Self::default()
    }

    pub fn accept() -> Self {
        Self {
            signal: true,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_diagnostic(mut self, metric: impl Into<String>, date: NaiveDate, value: Decimal) -> Self {
        self.diagnostics.insert(metric.into(), Diagnostic { date, value });
        self
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for VALUESIM.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data unavailable ({symbol}): {message}")]
    DataUnavailable { symbol: String, message: String },

    #[error("No market cap within {tolerance} days of {target}: nearest is {nearest} ({days} days away)")]
    ToleranceExceeded {
        target: NaiveDate,
        nearest: NaiveDate,
        days: i64,
        tolerance: i64,
    },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Inconsistent data: {0}")]
    Inconsistent(String),

    #[error("Criteria not met ({symbol}): {reason}")]
    CriteriaNotMet { symbol: String, reason: String },

    #[error("Simulation of {symbol} exceeded {secs}s budget")]
    Timeout { symbol: String, secs: u64 },
}

impl SimError {
    pub fn data_unavailable(symbol: &str, message: impl Into<String>) -> Self {
        SimError::DataUnavailable {
            symbol: symbol.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
