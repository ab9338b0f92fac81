//! Simulation result.
//!
//! Accumulates the buy, sell and info events of one simulation. Once
//! `end` is called the event lists are sorted by date and frozen; every
//! derived figure (totals, dividends, per-trade annualized returns) is
//! computed from the frozen lists and requires the result to be finalized.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::Serialize;

use crate::types::{MarketCapPoint, Operation, SimError, TransactionEvent, DIVIDEND_METRIC, MARKET_CAP_METRIC};

/// Days per year used to annualize holding periods.
const DAYS_PER_YEAR: f64 = 365.0;

/// Market value of a position at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Mark {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// A closed buy → sell round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub buy_date: NaiveDate,
    pub buy_value: Decimal,
    pub sell_date: NaiveDate,
    pub sell_value: Decimal,
    /// Dividends received strictly between buy and sell.
    pub dividends: Decimal,
    pub years: f64,
    pub annualized_return: f64,
}

/// The position still held when the simulation ended, valued at the last
/// available market cap as a hypothetical exit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub buy_date: NaiveDate,
    pub buy_value: Decimal,
    pub mark: Mark,
    pub dividends: Decimal,
    pub years: f64,
    pub annualized_return: f64,
}

/// Dividends grouped by holding window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DividendAttribution {
    /// (sell date closing the window, dividends received in it).
    pub closed: Vec<(NaiveDate, Decimal)>,
    /// Dividends received since the latest buy when the position is still held.
    pub open: Option<Decimal>,
}

/// Compounded annual growth from `entry` to `exit` over `years`.
///
/// Holding periods shorter than a day are not annualized.
pub fn annualized_return(entry: f64, exit: f64, years: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    let growth = exit / entry;
    if years <= 0.0 {
        return growth - 1.0;
    }
    growth.powf(1.0 / years) - 1.0
}

fn years_between(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64 / DAYS_PER_YEAR
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ---------------------------------------------------------------------------
// SimulationResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    symbol: String,
    buys: Vec<TransactionEvent>,
    sells: Vec<TransactionEvent>,
    infos: Vec<TransactionEvent>,
    terminal: Option<Mark>,
    last_market_cap: Option<Mark>,
    finalized: bool,
}

impl SimulationResult {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            buys: Vec::new(),
            sells: Vec::new(),
            infos: Vec::new(),
            terminal: None,
            last_market_cap: None,
            finalized: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn record(
        &mut self,
        operation: Operation,
        metric: impl Into<String>,
        date: NaiveDate,
        value: Decimal,
    ) -> Result<(), SimError> {
        if self.finalized {
            return Err(SimError::Usage(format!(
                "cannot record {operation} on finalized simulation of {}",
                self.symbol
            )));
        }
        let event = TransactionEvent {
            operation,
            metric: metric.into(),
            date,
            value,
        };
        match operation {
            Operation::Buy => self.buys.push(event),
            Operation::Sell => self.sells.push(event),
            Operation::Info => self.infos.push(event),
        }
        Ok(())
    }

    pub fn buy(&mut self, metric: impl Into<String>, date: NaiveDate, value: Decimal) -> Result<(), SimError> {
        self.record(Operation::Buy, metric, date, value)
    }

    pub fn sell(&mut self, metric: impl Into<String>, date: NaiveDate, value: Decimal) -> Result<(), SimError> {
        self.record(Operation::Sell, metric, date, value)
    }

    pub fn info(&mut self, metric: impl Into<String>, date: NaiveDate, value: Decimal) -> Result<(), SimError> {
        self.record(Operation::Info, metric, date, value)
    }

    /// Latest sample of the market cap series the simulation ran against.
    /// A position still held at the end is valued here rather than at the
    /// terminal mark.
    pub fn set_last_market_cap(&mut self, point: MarketCapPoint) -> Result<(), SimError> {
        if self.finalized {
            return Err(SimError::Usage(format!(
                "cannot set last market cap on finalized simulation of {}",
                self.symbol
            )));
        }
        self.last_market_cap = Some(Mark {
            date: point.date,
            value: point.market_cap,
        });
        Ok(())
    }

    /// Freeze the result. `date` and `value` mark a still-open position and
    /// must be given together or not at all.
    pub fn end(&mut self, date: Option<NaiveDate>, value: Option<Decimal>) -> Result<(), SimError> {
        if self.finalized {
            return Err(SimError::Usage(format!(
                "simulation of {} is already finalized",
                self.symbol
            )));
        }
        self.terminal = match (date, value) {
            (Some(date), Some(value)) => Some(Mark { date, value }),
            (None, None) => None,
            _ => {
                return Err(SimError::Usage(
                    "end() needs both a terminal date and value, or neither".to_string(),
                ))
            }
        };

        self.buys.sort_by_key(|e| e.date);
        self.sells.sort_by_key(|e| e.date);
        self.infos.sort_by_key(|e| e.date);
        self.finalized = true;
        Ok(())
    }

    pub fn buys(&self) -> &[TransactionEvent] {
        &self.buys
    }

    pub fn sells(&self) -> &[TransactionEvent] {
        &self.sells
    }

    pub fn infos(&self) -> &[TransactionEvent] {
        &self.infos
    }

    /// Terminal mark of a position held at the end, if any.
    pub fn terminal(&self) -> Option<Mark> {
        self.terminal
    }

    pub fn last_market_cap(&self) -> Option<Mark> {
        self.last_market_cap
    }

    fn ensure_finalized(&self) -> Result<(), SimError> {
        if self.finalized {
            Ok(())
        } else {
            Err(SimError::Usage(format!(
                "simulation of {} must be ended before reading results",
                self.symbol
            )))
        }
    }

    fn price_events(events: &[TransactionEvent]) -> impl Iterator<Item = &TransactionEvent> {
        events.iter().filter(|e| e.metric == MARKET_CAP_METRIC)
    }

    fn dividend_events(&self) -> impl Iterator<Item = &TransactionEvent> {
        self.infos.iter().filter(|e| e.metric == DIVIDEND_METRIC)
    }

    /// Dividends dated strictly inside `(after, before)`.
    fn dividends_within(&self, after: NaiveDate, before: Option<NaiveDate>) -> Decimal {
        self.dividend_events()
            .filter(|e| e.date > after && before.map_or(true, |b| e.date < b))
            .map(|e| e.value)
            .sum()
    }

    /// Sum of all buy prices.
    pub fn total_spent(&self) -> Result<Decimal, SimError> {
        self.ensure_finalized()?;
        Ok(Self::price_events(&self.buys).map(|e| e.value).sum())
    }

    /// Sum of all sell prices.
    pub fn total_sold(&self) -> Result<Decimal, SimError> {
        self.ensure_finalized()?;
        Ok(Self::price_events(&self.sells).map(|e| e.value).sum())
    }

    pub fn dividends_received(&self) -> Result<Decimal, SimError> {
        self.ensure_finalized()?;
        Ok(self.dividend_events().map(|e| e.value).sum())
    }

    /// Final cash ledger: sales and dividends minus purchases.
    pub fn cash_balance(&self) -> Result<Decimal, SimError> {
        Ok(self.total_sold()? + self.dividends_received()? - self.total_spent()?)
    }

    /// Closed round trips, pairing the i-th buy with the i-th sell.
    pub fn trades(&self) -> Result<Vec<Trade>, SimError> {
        self.ensure_finalized()?;
        let trades = Self::price_events(&self.buys)
            .zip(Self::price_events(&self.sells))
            .map(|(buy, sell)| {
                let dividends = self.dividends_within(buy.date, Some(sell.date));
                let years = years_between(buy.date, sell.date);
                let annualized = annualized_return(
                    buy.value.to_f64().unwrap_or(0.0),
                    (sell.value + dividends).to_f64().unwrap_or(0.0),
                    years,
                );
                Trade {
                    buy_date: buy.date,
                    buy_value: buy.value,
                    sell_date: sell.date,
                    sell_value: sell.value,
                    dividends,
                    years,
                    annualized_return: annualized,
                }
            })
            .collect();
        Ok(trades)
    }

    /// Annualized return of every closed trade, in chronological order.
    pub fn returns(&self) -> Result<Vec<f64>, SimError> {
        Ok(self.trades()?.iter().map(|t| t.annualized_return).collect())
    }

    /// Mean annualized return over closed trades only.
    pub fn average_return(&self) -> Result<Option<f64>, SimError> {
        Ok(mean(&self.returns()?))
    }

    /// The buy that has no matching sell, if the position is still held.
    fn open_buy(&self) -> Option<&TransactionEvent> {
        let buys: Vec<&TransactionEvent> = Self::price_events(&self.buys).collect();
        let sells = Self::price_events(&self.sells).count();
        if buys.len() > sells {
            buys.last().copied()
        } else {
            None
        }
    }

    /// Position still held at the end, valued at the last market cap when
    /// one was recorded on or after the terminal mark, else at the terminal
    /// mark itself.
    pub fn open_position(&self) -> Result<Option<OpenPosition>, SimError> {
        self.ensure_finalized()?;
        let (buy, terminal) = match (self.open_buy(), self.terminal) {
            (Some(buy), Some(terminal)) => (buy, terminal),
            _ => return Ok(None),
        };
        let mark = match self.last_market_cap {
            Some(last) if last.date >= terminal.date => last,
            _ => terminal,
        };
        let dividends = self.dividends_within(buy.date, Some(mark.date));
        let years = years_between(buy.date, mark.date);
        Ok(Some(OpenPosition {
            buy_date: buy.date,
            buy_value: buy.value,
            mark,
            dividends,
            years,
            annualized_return: annualized_return(
                buy.value.to_f64().unwrap_or(0.0),
                (mark.value + dividends).to_f64().unwrap_or(0.0),
                years,
            ),
        }))
    }

    /// Mean over closed trades plus the hypothetical exit of the open
    /// position. Kept apart from `average_return`.
    pub fn hypothetical_average_return(&self) -> Result<Option<f64>, SimError> {
        let mut returns = self.returns()?;
        if let Some(open) = self.open_position()? {
            returns.push(open.annualized_return);
        }
        Ok(mean(&returns))
    }

    /// Dividends per closed window, keyed by the closing sell, plus the
    /// dividends of a still-open window.
    pub fn dividends(&self) -> Result<DividendAttribution, SimError> {
        let closed = self
            .trades()?
            .iter()
            .map(|t| (t.sell_date, t.dividends))
            .collect();
        let open = self
            .open_buy()
            .map(|buy| self.dividends_within(buy.date, None));
        Ok(DividendAttribution { closed, open })
    }

    /// Value of a diagnostic recorded alongside an event.
    pub fn metric_at(&self, operation: Operation, metric: &str, date: NaiveDate) -> Option<Decimal> {
        let events = match operation {
            Operation::Buy => &self.buys,
            Operation::Sell => &self.sells,
            Operation::Info => &self.infos,
        };
        events
            .iter()
            .find(|e| e.metric == metric && e.date == date)
            .map(|e| e.value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
