//! Current-opportunity screen.
//!
//! Applies a strategy's buy decision to a company as it stands today: the
//! most recent fiscal period, priced at the latest market cap sample. Stale
//! filings or stale prices are rejected rather than evaluated.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::provider::StatementProvider;
use crate::strategy::{Evaluation, Strategy};
use crate::types::{Decision, Diagnostics, MarketCapPoint, SimError};

/// Oldest acceptable filing, in days before today.
pub const MAX_FILING_AGE_DAYS: i64 = 365;
/// Oldest acceptable market cap sample, in days before today.
pub const MAX_MARKET_CAP_AGE_DAYS: i64 = 60;

/// What the screen decided for one company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenOutcome {
    pub symbol: String,
    pub fiscal_date: NaiveDate,
    pub market_cap: MarketCapPoint,
    pub buy: bool,
    pub diagnostics: Diagnostics,
}

pub struct Screener {
    strategy: Arc<dyn Strategy>,
}

impl Screener {
    pub fn new(strategy: Arc<dyn Strategy>) -> Self {
        Self { strategy }
    }

    pub fn evaluate(&self, stock: &mut dyn StatementProvider, today: NaiveDate) -> Result<ScreenOutcome, SimError> {
        if !stock.is_open() {
            stock.open()?;
        }
        let stock: &dyn StatementProvider = stock;
        let symbol = stock.symbol();

        let latest = stock
            .income_statement()?
            .first()
            .ok_or_else(|| SimError::data_unavailable(symbol, "income statement is empty"))?;
        let fiscal_date = latest.fiscal_date_ending;
        let filed = latest.filing_date.unwrap_or(fiscal_date);
        let filing_age = (today - filed).num_days();
        if filing_age > MAX_FILING_AGE_DAYS {
            return Err(SimError::data_unavailable(
                symbol,
                format!("last filing {filed} is {filing_age} days old"),
            ));
        }

        let window_start = today - Duration::days(MAX_MARKET_CAP_AGE_DAYS);
        let market_cap = stock
            .market_cap(window_start, today)?
            .last()
            .copied()
            .ok_or_else(|| {
                SimError::data_unavailable(
                    symbol,
                    format!("no market cap within {MAX_MARKET_CAP_AGE_DAYS} days of {today}"),
                )
            })?;

        let eval = Evaluation {
            fiscal_date,
            transaction_date: market_cap.date,
            price: market_cap.market_cap,
            stock,
        };
        let Decision { signal, diagnostics } = self.strategy.buy(&eval)?;

        if signal {
            info!(symbol, fiscal_date = %fiscal_date, market_cap = %market_cap.market_cap, "Screen: buy");
        } else {
            debug!(symbol, fiscal_date = %fiscal_date, "Screen: no buy");
        }

        Ok(ScreenOutcome {
            symbol: symbol.to_string(),
            fiscal_date,
            market_cap,
            buy: signal,
            diagnostics,
        })
    }
}
