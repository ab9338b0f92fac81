//! Synthetic statement provider for integration testing.
//!
//! Provides a deterministic `StatementProvider` whose statements and market
//! cap series are built year by year from test code, all in memory. Market
//! cap for fiscal year `y` is sampled on the 31st of March of `y + 1`,
//! exactly on its transaction date, with one extra sample on each side of
//! the series so that every fiscal year falls strictly inside the range the
//! engine simulates.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

use valuesim::provider::{StatementProvider, StockSnapshot};
use valuesim::types::*;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Fiscal year end used for every synthetic period.
pub fn fiscal(year: i32) -> NaiveDate {
    date(year, 12, 31)
}

/// Transaction date of fiscal year `year` under a three month lag.
pub fn transaction(year: i32) -> NaiveDate {
    date(year + 1, 3, 31)
}

/// A mock statement provider with fully controllable data.
pub struct MockStock {
    symbol: String,
    snapshot: StockSnapshot,
    open: bool,
    open_calls: Arc<Mutex<usize>>,
    /// If set, `open` fails with this message.
    force_error: Option<String>,
}

impl MockStock {
    pub fn builder(symbol: &str, first_year: i32) -> MockStockBuilder {
        MockStockBuilder {
            symbol: symbol.to_string(),
            first_year,
            net_income: Vec::new(),
            market_cap: Vec::new(),
            dividends_paid: Decimal::ZERO,
            balance: healthy_balance_sheet(),
            shifts: Vec::new(),
            currency: "USD".to_string(),
        }
    }

    /// Number of times `open` actually loaded data.
    pub fn open_calls(&self) -> usize {
        *self.open_calls.lock().unwrap()
    }

    pub fn set_error(&mut self, msg: &str) {
        self.force_error = Some(msg.to_string());
    }

    pub fn snapshot(&self) -> &StockSnapshot {
        &self.snapshot
    }

    /// Drop every market cap sample.
    pub fn clear_market_cap(&mut self) {
        self.snapshot.market_cap.clear();
    }
}

impl StatementProvider for MockStock {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), SimError> {
        if let Some(msg) = &self.force_error {
            return Err(SimError::data_unavailable(&self.symbol, msg.clone()));
        }
        if !self.open {
            *self.open_calls.lock().unwrap() += 1;
            self.open = true;
        }
        Ok(())
    }

    fn income_statement(&self) -> Result<&[IncomePeriod], SimError> {
        self.ensure_open()?;
        Ok(&self.snapshot.income_statement)
    }

    fn balance_sheet(&self) -> Result<&[BalancePeriod], SimError> {
        self.ensure_open()?;
        Ok(&self.snapshot.balance_sheet)
    }

    fn cash_flow(&self) -> Result<&[CashFlowPeriod], SimError> {
        self.ensure_open()?;
        Ok(&self.snapshot.cash_flow)
    }

    fn market_cap(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MarketCapPoint>, SimError> {
        self.ensure_open()?;
        let mut points: Vec<MarketCapPoint> = self
            .snapshot
            .market_cap
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

impl MockStock {
    fn ensure_open(&self) -> Result<(), SimError> {
        if self.open {
            Ok(())
        } else {
            Err(SimError::Usage(format!("{} is not open", self.symbol)))
        }
    }
}

/// Current ratio 2, combined asset/liability ratio 1.5.
pub fn healthy_balance_sheet() -> BalanceSheet {
    BalanceSheet {
        total_current_assets: dec!(400),
        total_current_liabilities: dec!(200),
        total_non_current_assets: dec!(500),
        total_non_current_liabilities: dec!(400),
        ..Default::default()
    }
}

/// Current ratio 2, combined asset/liability ratio 0.8.
pub fn leveraged_balance_sheet() -> BalanceSheet {
    BalanceSheet {
        total_current_assets: dec!(400),
        total_current_liabilities: dec!(200),
        total_non_current_assets: dec!(400),
        total_non_current_liabilities: dec!(800),
        ..Default::default()
    }
}

pub struct MockStockBuilder {
    symbol: String,
    first_year: i32,
    net_income: Vec<Decimal>,
    market_cap: Vec<Decimal>,
    dividends_paid: Decimal,
    balance: BalanceSheet,
    shifts: Vec<(i32, i64)>,
    currency: String,
}

impl MockStockBuilder {
    /// Net income per fiscal year, oldest first. Also fixes the number of
    /// years.
    pub fn net_income(mut self, values: &[Decimal]) -> Self {
        self.net_income = values.to_vec();
        self
    }

    /// Market cap at each fiscal year's transaction date, oldest first.
    pub fn market_cap(mut self, values: &[Decimal]) -> Self {
        self.market_cap = values.to_vec();
        self
    }

    /// `dividendsPaid` as stored by the provider for every year.
    pub fn dividends_paid(mut self, value: Decimal) -> Self {
        self.dividends_paid = value;
        self
    }

    pub fn balance_sheet(mut self, sheet: BalanceSheet) -> Self {
        self.balance = sheet;
        self
    }

    /// Move the market cap sample of fiscal year `year` by `days`.
    pub fn shift_sample(mut self, year: i32, days: i64) -> Self {
        self.shifts.push((year, days));
        self
    }

    pub fn currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn build_snapshot(&self) -> StockSnapshot {
        assert_eq!(
            self.net_income.len(),
            self.market_cap.len(),
            "one market cap per fiscal year"
        );
        let years: Vec<i32> = (0..self.net_income.len() as i32)
            .map(|i| self.first_year + i)
            .collect();

        // Newest first, as providers serve statements.
        let mut income_statement = Vec::new();
        let mut balance_sheet = Vec::new();
        let mut cash_flow = Vec::new();
        for (i, &y) in years.iter().enumerate().rev() {
            income_statement.push(FinancialPeriod::new(
                fiscal(y),
                &self.currency,
                IncomeStatement {
                    net_income: self.net_income[i],
                    ..Default::default()
                },
            ));
            balance_sheet.push(FinancialPeriod::new(fiscal(y), &self.currency, self.balance.clone()));
            cash_flow.push(FinancialPeriod::new(
                fiscal(y),
                &self.currency,
                CashFlowStatement {
                    net_income: self.net_income[i],
                    dividends_paid: self.dividends_paid,
                    ..Default::default()
                },
            ));
        }

        let mut market_cap = Vec::new();
        if let (Some(&first), Some(&last)) = (years.first(), years.last()) {
            market_cap.push(MarketCapPoint::new(date(first + 1, 1, 15), self.market_cap[0]));
            for (i, &y) in years.iter().enumerate() {
                let shift = self
                    .shifts
                    .iter()
                    .filter(|(year, _)| *year == y)
                    .map(|(_, days)| *days)
                    .sum::<i64>();
                market_cap.push(MarketCapPoint::new(
                    transaction(y) + Duration::days(shift),
                    self.market_cap[i],
                ));
            }
            market_cap.push(MarketCapPoint::new(
                date(last + 1, 6, 30),
                self.market_cap[self.market_cap.len() - 1],
            ));
        }

        StockSnapshot {
            income_statement,
            balance_sheet,
            cash_flow,
            market_cap,
        }
    }

    pub fn build(self) -> MockStock {
        MockStock {
            snapshot: self.build_snapshot(),
            symbol: self.symbol,
            open: false,
            open_calls: Arc::new(Mutex::new(0)),
            force_error: None,
        }
    }
}

/// `n` years of constant net income.
pub fn flat_income(n: usize, value: Decimal) -> Vec<Decimal> {
    vec![value; n]
}
