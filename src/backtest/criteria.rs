//! Company filter applied before a batch simulation.

use tracing::debug;

use crate::config::CriteriaConfig;
use crate::provider::StatementProvider;
use crate::types::SimError;

/// Minimum history and reporting currency a company must have to be
/// simulated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyCriteria {
    pub minimum_years: usize,
    /// Accepted reporting currencies. Empty accepts any.
    pub currencies: Vec<String>,
}

impl From<&CriteriaConfig> for CompanyCriteria {
    fn from(cfg: &CriteriaConfig) -> Self {
        Self {
            minimum_years: cfg.minimum_years,
            currencies: cfg.currencies.clone(),
        }
    }
}

impl CompanyCriteria {
    pub fn new(minimum_years: usize, currencies: Vec<String>) -> Self {
        Self {
            minimum_years,
            currencies,
        }
    }

    /// Opens `stock` if needed, then fails with `CriteriaNotMet` on the
    /// first requirement it does not satisfy.
    pub fn check(&self, stock: &mut dyn StatementProvider) -> Result<(), SimError> {
        if !stock.is_open() {
            stock.open()?;
        }
        let symbol = stock.symbol().to_string();
        let not_met = |reason: String| SimError::CriteriaNotMet {
            symbol: symbol.clone(),
            reason,
        };

        let income = stock.income_statement()?;
        if income.is_empty() || stock.cash_flow()?.is_empty() {
            return Err(not_met("income or cash flow statement is empty".to_string()));
        }

        // The oldest filing decides the reporting currency.
        if let Some(oldest) = income.last() {
            let currency = &oldest.reported_currency;
            if !self.currencies.is_empty() && !self.currencies.contains(currency) {
                return Err(not_met(format!("reports in {currency}")));
            }
        }

        if income.len() < self.minimum_years {
            return Err(not_met(format!(
                "only {} years of income statements, {} required",
                income.len(),
                self.minimum_years
            )));
        }

        debug!(symbol = %symbol, years = income.len(), "Company criteria met");
        Ok(())
    }
}
