//! Buy/sell decision policies.
//!
//! A strategy is the trailing-earnings PE test followed by any number of
//! buy-side gates (balance-sheet ratios). Gates run in order and the first
//! one that declines short-circuits the buy. Diagnostics of every passing
//! test are merged into the decision so the simulation can record them.

pub mod balance;
pub mod earnings;

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use tracing::debug;

use crate::config::{StrategyConfig, StrategyKind};
use crate::provider::StatementProvider;
use crate::types::{Decision, SimError};
use balance::{AssetLiabilityGate, CurrentRatioGate};
use earnings::{EarningsGate, EarningsParams};

/// Everything a decision is evaluated against.
#[derive(Clone, Copy)]
pub struct Evaluation<'a> {
    /// Fiscal period end of the statements being acted on.
    pub fiscal_date: NaiveDate,
    /// Date the buy or sell would execute at.
    pub transaction_date: NaiveDate,
    /// Market cap nearest the transaction date.
    pub price: Decimal,
    pub stock: &'a dyn StatementProvider,
}

/// Buy/sell decision policy consulted by the engine every period.
pub trait Strategy: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &str;

    fn buy(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError>;

    fn sell(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError>;
}

/// An additional buy-side condition layered on the earnings test.
pub trait Gate: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError>;
}

// ---------------------------------------------------------------------------
// Gated strategy
// ---------------------------------------------------------------------------

/// Earnings test plus an ordered chain of buy gates.
///
/// Sells are decided by the earnings test alone.
pub struct GatedStrategy {
    name: String,
    earnings: EarningsGate,
    buy_gates: Vec<Box<dyn Gate>>,
}

impl GatedStrategy {
    /// Buy on low trailing PE, sell on high trailing PE.
    pub fn earnings(params: EarningsParams) -> Result<Self, SimError> {
        Ok(Self {
            name: "earnings".to_string(),
            earnings: EarningsGate::new(params)?,
            buy_gates: Vec::new(),
        })
    }

    /// Earnings strategy that also requires a minimum current ratio to buy.
    pub fn current_liabilities(params: EarningsParams, current_ratio: Decimal) -> Result<Self, SimError> {
        let mut strategy = Self::earnings(params)?.with_gate(Box::new(CurrentRatioGate::new(current_ratio)));
        strategy.name = "current_liabilities".to_string();
        Ok(strategy)
    }

    /// Current-liabilities strategy that also requires a minimum combined
    /// asset/liability ratio to buy.
    pub fn liabilities(
        params: EarningsParams,
        current_ratio: Decimal,
        total_ratio: Decimal,
    ) -> Result<Self, SimError> {
        let mut strategy = Self::current_liabilities(params, current_ratio)?
            .with_gate(Box::new(AssetLiabilityGate::new(total_ratio)));
        strategy.name = "liabilities".to_string();
        Ok(strategy)
    }

    /// Build the strategy described by the `[strategy]` config section.
    pub fn from_config(cfg: &StrategyConfig) -> Result<Self, SimError> {
        let params = EarningsParams {
            pe_to_buy: to_decimal("pe_to_buy", cfg.pe_to_buy)?,
            pe_to_sell: to_decimal("pe_to_sell", cfg.pe_to_sell)?,
            years_to_average: cfg.years_to_average,
        };
        match cfg.kind {
            StrategyKind::Earnings => Self::earnings(params),
            StrategyKind::CurrentLiabilities => {
                Self::current_liabilities(params, to_decimal("current_ratio", cfg.current_ratio)?)
            }
            StrategyKind::Liabilities => Self::liabilities(
                params,
                to_decimal("current_ratio", cfg.current_ratio)?,
                to_decimal("total_ratio", cfg.total_ratio)?,
            ),
        }
    }

    /// Append a buy gate; it runs after the existing ones.
    pub fn with_gate(mut self, gate: Box<dyn Gate>) -> Self {
        self.buy_gates.push(gate);
        self
    }

    pub fn earnings_gate(&self) -> &EarningsGate {
        &self.earnings
    }

    /// Names of the diagnostics a buy may carry, in evaluation order.
    pub fn buy_metrics(&self) -> Vec<String> {
        std::iter::once(self.earnings.metric().to_string())
            .chain(self.buy_gates.iter().map(|g| g.name().to_string()))
            .collect()
    }

    /// Names of the diagnostics a sell may carry.
    pub fn sell_metrics(&self) -> Vec<String> {
        vec![self.earnings.metric().to_string()]
    }
}

impl Strategy for GatedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn buy(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError> {
        let mut decision = self.earnings.buy(eval)?;
        if !decision.signal {
            return Ok(Decision::decline());
        }

        for gate in &self.buy_gates {
            let outcome = gate.check(eval)?;
            if !outcome.signal {
                debug!(
                    symbol = eval.stock.symbol(),
                    fiscal_date = %eval.fiscal_date,
                    gate = gate.name(),
                    "Buy declined by gate"
                );
                return Ok(Decision::decline());
            }
            decision.diagnostics.extend(outcome.diagnostics);
        }

        Ok(decision)
    }

    fn sell(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError> {
        self.earnings.sell(eval)
    }
}

fn to_decimal(field: &str, value: f64) -> Result<Decimal, SimError> {
    Decimal::from_f64(value)
        .ok_or_else(|| SimError::Configuration(format!("{field} is not a finite number: {value}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
