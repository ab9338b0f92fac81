//! Simulation engine.
//!
//! Walks a company's fiscal periods oldest to newest. Each period is acted
//! on a fixed settlement lag after its fiscal end, at the market cap nearest
//! that transaction date. The strategy decides buys and sells against an
//! all-or-nothing ownership state, and every transition, dividend and
//! strategy diagnostic is recorded in a `SimulationResult`.

pub mod screener;
pub mod timeline;

use chrono::{Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backtest::result::SimulationResult;
use crate::config::SimulationConfig;
use crate::provider::StatementProvider;
use crate::strategy::{Evaluation, Strategy};
use crate::types::{CashFlowPeriod, SimError, DIVIDEND_METRIC, MARKET_CAP_METRIC};
use timeline::MarketCapSeries;

/// Whether the company is held, plus the running cash ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OwnershipState {
    pub own: bool,
    pub money: Decimal,
}

impl OwnershipState {
    fn buy(&mut self, price: Decimal) {
        self.money -= price;
        self.own = true;
    }

    fn sell(&mut self, price: Decimal) {
        self.money += price;
        self.own = false;
    }

    fn receive(&mut self, dividend: Decimal) {
        self.money += dividend;
    }
}

/// Runs one strategy over any number of stocks.
#[derive(Clone)]
pub struct Engine {
    strategy: Arc<dyn Strategy>,
    config: SimulationConfig,
}

impl Engine {
    pub fn new(strategy: Arc<dyn Strategy>, config: SimulationConfig) -> Self {
        Self { strategy, config }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn lag(&self) -> Months {
        Months::new(self.config.settlement_lag_months)
    }

    /// Simulate `stock` between optional fiscal-date bounds, as of today.
    pub fn simulate(
        &self,
        stock: &mut dyn StatementProvider,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<SimulationResult, SimError> {
        self.simulate_as_of(stock, start, end, Utc::now().date_naive())
    }

    /// Simulate with an explicit "today" against which `end` is validated.
    pub fn simulate_as_of(
        &self,
        stock: &mut dyn StatementProvider,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<SimulationResult, SimError> {
        validate_bounds(start, end, today)?;

        if !stock.is_open() {
            stock.open()?;
        }
        let stock: &dyn StatementProvider = stock;
        let symbol = stock.symbol();

        let cash_flow = stock.cash_flow()?;
        let (earliest, latest) = match (cash_flow.last(), cash_flow.first()) {
            (Some(oldest), Some(newest)) => (oldest.fiscal_date_ending, newest.fiscal_date_ending),
            _ => return Err(SimError::data_unavailable(symbol, "cash flow statement is empty")),
        };

        let lookahead = self.config.lookahead_years.checked_mul(12).map(Months::new).ok_or_else(|| {
            SimError::Configuration(format!(
                "lookahead of {} years overflows a month count",
                self.config.lookahead_years
            ))
        })?;
        let fetch_end = latest
            .checked_add_months(lookahead)
            .ok_or_else(|| SimError::Inconsistent(format!("date overflow after {latest}")))?;
        let series = MarketCapSeries::new(symbol, stock.market_cap(earliest, fetch_end)?)?;

        let (range_start, range_end) = self.effective_range(&series, start, end)?;
        let periods = periods_within(cash_flow, range_start, range_end);
        if periods.is_empty() {
            return Err(SimError::data_unavailable(
                symbol,
                format!("no fiscal periods strictly between {range_start} and {range_end}"),
            ));
        }

        info!(
            symbol,
            strategy = self.strategy.name(),
            periods = periods.len(),
            from = %range_start,
            to = %range_end,
            "Simulation starting"
        );

        let mut state = OwnershipState::default();
        let mut result = SimulationResult::new(symbol);
        let mut last_mark: Option<(NaiveDate, Decimal)> = None;

        for period in periods {
            let mark = self.step(stock, &series, period, &mut state, &mut result)?;
            last_mark = Some(mark);
        }

        result.set_last_market_cap(*series.last())?;
        match (state.own, last_mark) {
            (true, Some((date, price))) => result.end(Some(date), Some(price))?,
            _ => result.end(None, None)?,
        }

        info!(
            symbol,
            trades = result.sells().len(),
            holding = state.own,
            money = %state.money,
            "Simulation complete"
        );
        Ok(result)
    }

    /// One fiscal period. Returns the transaction date and price used.
    fn step(
        &self,
        stock: &dyn StatementProvider,
        series: &MarketCapSeries,
        period: &CashFlowPeriod,
        state: &mut OwnershipState,
        result: &mut SimulationResult,
    ) -> Result<(NaiveDate, Decimal), SimError> {
        let fiscal_date = period.fiscal_date_ending;
        let transaction_date = fiscal_date
            .checked_add_months(self.lag())
            .ok_or_else(|| SimError::Inconsistent(format!("date overflow after {fiscal_date}")))?;
        let price = series
            .lookup(transaction_date, self.config.tolerance_days)?
            .market_cap;

        if state.own {
            let dividend = -period.statement.dividends_paid;
            if dividend < Decimal::ZERO {
                return Err(SimError::Inconsistent(format!(
                    "{}: dividendsPaid for {fiscal_date} is positive ({})",
                    stock.symbol(),
                    period.statement.dividends_paid
                )));
            }
            state.receive(dividend);
            result.info(DIVIDEND_METRIC, fiscal_date, dividend)?;
        }

        let eval = Evaluation {
            fiscal_date,
            transaction_date,
            price,
            stock,
        };

        // Only the transition allowed by the current state is evaluated.
        if !state.own {
            let decision = self.strategy.buy(&eval)?;
            if decision.signal {
                state.buy(price);
                result.buy(MARKET_CAP_METRIC, transaction_date, price)?;
                for (metric, diagnostic) in decision.diagnostics {
                    result.buy(metric, diagnostic.date, diagnostic.value)?;
                }
                info!(symbol = stock.symbol(), date = %transaction_date, price = %price, "Buy");
            }
        } else {
            let decision = self.strategy.sell(&eval)?;
            if decision.signal {
                state.sell(price);
                result.sell(MARKET_CAP_METRIC, transaction_date, price)?;
                for (metric, diagnostic) in decision.diagnostics {
                    result.sell(metric, diagnostic.date, diagnostic.value)?;
                }
                info!(symbol = stock.symbol(), date = %transaction_date, price = %price, "Sell");
            }
        }

        debug!(
            symbol = stock.symbol(),
            fiscal_date = %fiscal_date,
            transaction_date = %transaction_date,
            price = %price,
            own = state.own,
            "Period processed"
        );
        Ok((transaction_date, price))
    }

    /// Caller bounds intersected with the market cap span, pulled in by the
    /// settlement lag so every period inside has a price near its
    /// transaction date.
    fn effective_range(
        &self,
        series: &MarketCapSeries,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(NaiveDate, NaiveDate), SimError> {
        let lag = self.lag();
        let series_start = series
            .first_date()
            .checked_sub_months(lag)
            .ok_or_else(|| SimError::Inconsistent("date underflow in market cap span".to_string()))?;
        let series_end = series
            .last_date()
            .checked_sub_months(lag)
            .ok_or_else(|| SimError::Inconsistent("date underflow in market cap span".to_string()))?;

        let range_start = start.map_or(series_start, |s| s.max(series_start));
        let range_end = end.map_or(series_end, |e| e.min(series_end));
        Ok((range_start, range_end))
    }
}

fn validate_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Result<(), SimError> {
    if let Some(end) = end {
        if end > today {
            return Err(SimError::Configuration(format!(
                "end boundary {end} is in the future (today is {today})"
            )));
        }
    }
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(SimError::Configuration(format!(
                "start boundary {start} is not before end boundary {end}"
            )));
        }
    }
    Ok(())
}

/// Periods with fiscal end strictly inside `(start, end)`, oldest first.
/// `periods` is newest-first, as providers supply it.
fn periods_within(periods: &[CashFlowPeriod], start: NaiveDate, end: NaiveDate) -> Vec<&CashFlowPeriod> {
    periods
        .iter()
        .rev()
        .filter(|p| p.fiscal_date_ending > start && p.fiscal_date_ending < end)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
