//! Trailing-earnings PE test.
//!
//! PE is the transaction price (market cap) over the mean net income of the
//! `years_to_average` most recent income periods ending on or before the
//! evaluated fiscal date. With fewer periods than that available the test
//! declines; this is a data-sufficiency gate, not an error.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::Evaluation;
use crate::types::{Decision, SimError};

/// Thresholds of the earnings-multiple test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarningsParams {
    /// Buy when `0 < PE <= pe_to_buy`.
    pub pe_to_buy: Decimal,
    /// Sell when `PE >= pe_to_sell` (and positive).
    pub pe_to_sell: Decimal,
    /// Number of income periods averaged into the earnings figure.
    pub years_to_average: usize,
}

impl Default for EarningsParams {
    fn default() -> Self {
        Self {
            pe_to_buy: dec!(10),
            pe_to_sell: dec!(20),
            years_to_average: 5,
        }
    }
}

/// Buy/sell test on the trailing average PE.
#[derive(Debug, Clone)]
pub struct EarningsGate {
    params: EarningsParams,
    metric: String,
}

impl EarningsGate {
    pub fn new(params: EarningsParams) -> Result<Self, SimError> {
        if params.pe_to_sell < params.pe_to_buy {
            return Err(SimError::Configuration(format!(
                "pe_to_sell ({}) is smaller than pe_to_buy ({})",
                params.pe_to_sell, params.pe_to_buy
            )));
        }
        if params.years_to_average == 0 {
            return Err(SimError::Configuration(
                "years_to_average must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            metric: format!("eps_{}", params.years_to_average),
            params,
        })
    }

    pub fn params(&self) -> &EarningsParams {
        &self.params
    }

    /// Name of the PE diagnostic, e.g. `eps_5`.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Trailing PE at the evaluated fiscal date, or `None` when there are
    /// not enough periods or the average earnings are zero.
    pub fn trailing_pe(&self, eval: &Evaluation<'_>) -> Result<Option<Decimal>, SimError> {
        let n = self.params.years_to_average;
        let trailing: Vec<Decimal> = eval
            .stock
            .income_statement()?
            .iter()
            .filter(|p| p.fiscal_date_ending <= eval.fiscal_date)
            .take(n)
            .map(|p| p.statement.net_income)
            .collect();

        if trailing.len() != n {
            debug!(
                symbol = eval.stock.symbol(),
                fiscal_date = %eval.fiscal_date,
                available = trailing.len(),
                required = n,
                "Not enough income periods for PE"
            );
            return Ok(None);
        }

        let mean = trailing.iter().sum::<Decimal>() / Decimal::from(n);
        Ok(eval.price.checked_div(mean))
    }

    pub fn buy(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError> {
        match self.trailing_pe(eval)? {
            Some(pe) if pe > Decimal::ZERO && pe <= self.params.pe_to_buy => {
                Ok(Decision::accept().with_diagnostic(self.metric.clone(), eval.transaction_date, pe))
            }
            _ => Ok(Decision::decline()),
        }
    }

    pub fn sell(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError> {
        match self.trailing_pe(eval)? {
            Some(pe) if pe > Decimal::ZERO && pe >= self.params.pe_to_sell => {
                Ok(Decision::accept().with_diagnostic(self.metric.clone(), eval.transaction_date, pe))
            }
            _ => Ok(Decision::decline()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
