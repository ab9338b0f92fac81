//! Balance-sheet ratio gates.
//!
//! Both gates read the balance sheet of the evaluated fiscal period and
//! apply only to buys. A missing balance sheet or a zero denominator makes
//! the gate decline.

use rust_decimal::Decimal;
use tracing::debug;

use super::{Evaluation, Gate};
use crate::types::{BalanceSheet, Decision, SimError};

/// Diagnostic name of the current-assets / current-liabilities ratio.
pub const CURRENT_RATIO_METRIC: &str = "curr-asset-liab-ratio";
/// Diagnostic name of the combined assets / liabilities ratio.
pub const ASSET_LIABILITY_METRIC: &str = "asset-liab-ratio";

fn balance_at<'a>(eval: &Evaluation<'a>) -> Result<Option<&'a BalanceSheet>, SimError> {
    let sheet = eval
        .stock
        .balance_sheet()?
        .iter()
        .find(|p| p.fiscal_date_ending == eval.fiscal_date)
        .map(|p| &p.statement);

    if sheet.is_none() {
        debug!(
            symbol = eval.stock.symbol(),
            fiscal_date = %eval.fiscal_date,
            "No balance sheet for fiscal date"
        );
    }
    Ok(sheet)
}

fn ratio_decision(
    metric: &str,
    ratio: Option<Decimal>,
    minimum: Decimal,
    eval: &Evaluation<'_>,
) -> Decision {
    match ratio {
        Some(r) if r >= minimum => Decision::accept().with_diagnostic(metric, eval.transaction_date, r),
        _ => Decision::decline(),
    }
}

/// Requires `totalCurrentAssets / totalCurrentLiabilities >= minimum`.
#[derive(Debug, Clone)]
pub struct CurrentRatioGate {
    minimum: Decimal,
}

impl CurrentRatioGate {
    pub fn new(minimum: Decimal) -> Self {
        Self { minimum }
    }
}

impl Gate for CurrentRatioGate {
    fn name(&self) -> &str {
        CURRENT_RATIO_METRIC
    }

    fn check(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError> {
        let ratio = balance_at(eval)?.and_then(BalanceSheet::current_ratio);
        Ok(ratio_decision(CURRENT_RATIO_METRIC, ratio, self.minimum, eval))
    }
}

/// Requires `(current + non-current assets) / (current + non-current
/// liabilities) >= minimum`.
#[derive(Debug, Clone)]
pub struct AssetLiabilityGate {
    minimum: Decimal,
}

impl AssetLiabilityGate {
    pub fn new(minimum: Decimal) -> Self {
        Self { minimum }
    }
}

impl Gate for AssetLiabilityGate {
    fn name(&self) -> &str {
        ASSET_LIABILITY_METRIC
    }

    fn check(&self, eval: &Evaluation<'_>) -> Result<Decision, SimError> {
        let ratio = balance_at(eval)?.and_then(BalanceSheet::asset_liability_ratio);
        Ok(ratio_decision(ASSET_LIABILITY_METRIC, ratio, self.minimum, eval))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
