//! Batch simulation across a company listing.
//!
//! Filters the listing by exchange and index range, then simulates every
//! selected company on the blocking pool with a bounded number in flight.
//! Each company has a wall-clock budget; a company that fails or times out
//! is logged and reported, and the batch carries on.

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::criteria::CompanyCriteria;
use super::result::SimulationResult;
use crate::config::BatchConfig;
use crate::engine::Engine;
use crate::provider::Stock;
use crate::types::{ListedCompany, SimError};

/// Builds the provider for one listed company.
pub type StockFactory = Arc<dyn Fn(&ListedCompany) -> Stock + Send + Sync>;

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Which part of the listing to simulate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Accepted `exchangeShortName` values. Empty accepts any.
    pub exchanges: Vec<String>,
    pub start_index: usize,
    /// Exclusive; `None` runs to the end of the filtered listing.
    pub end_index: Option<usize>,
    pub sample_size: Option<usize>,
}

impl Selection {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        Self {
            exchanges: cfg.exchanges.clone(),
            start_index: 0,
            end_index: None,
            sample_size: cfg.sample_size,
        }
    }

    /// Companies to simulate, each with its index in the filtered listing.
    pub fn apply(&self, companies: &[ListedCompany]) -> Vec<(usize, ListedCompany)> {
        let filtered = companies
            .iter()
            .filter(|c| self.exchanges.is_empty() || self.exchanges.contains(&c.exchange_short_name))
            .cloned()
            .enumerate();
        let end = self.end_index.unwrap_or(usize::MAX);
        filtered
            .filter(|(i, _)| *i >= self.start_index && *i < end)
            .take(self.sample_size.unwrap_or(usize::MAX))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    /// Rejected by the company criteria.
    Skipped,
    Failed,
    TimedOut,
}

/// What happened to one company.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyOutcome {
    pub index: usize,
    pub symbol: String,
    pub name: String,
    pub status: OutcomeStatus,
    pub trades: usize,
    pub average_return: Option<f64>,
    pub hypothetical_average_return: Option<f64>,
    pub error: Option<String>,
    #[serde(skip)]
    pub result: Option<SimulationResult>,
}

impl CompanyOutcome {
    fn completed(index: usize, company: &ListedCompany, result: SimulationResult) -> Result<Self, SimError> {
        Ok(Self {
            index,
            symbol: company.symbol.clone(),
            name: company.name.clone(),
            status: OutcomeStatus::Completed,
            trades: result.trades()?.len(),
            average_return: result.average_return()?,
            hypothetical_average_return: result.hypothetical_average_return()?,
            error: None,
            result: Some(result),
        })
    }

    fn errored(index: usize, company: &ListedCompany, error: &SimError) -> Self {
        let status = match error {
            SimError::CriteriaNotMet { .. } => OutcomeStatus::Skipped,
            SimError::Timeout { .. } => OutcomeStatus::TimedOut,
            _ => OutcomeStatus::Failed,
        };
        Self {
            index,
            symbol: company.symbol.clone(),
            name: company.name.clone(),
            status,
            trades: 0,
            average_return: None,
            hypothetical_average_return: None,
            error: Some(error.to_string()),
            result: None,
        }
    }
}

/// Every outcome, in listing order, and the mean realized return.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<CompanyOutcome>,
    /// Mean over completed companies with at least one closed trade; zero
    /// when there are none.
    pub average_return: f64,
}

impl BatchReport {
    pub fn from_outcomes(mut outcomes: Vec<CompanyOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let returns: Vec<f64> = outcomes.iter().filter_map(|o| o.average_return).collect();
        let average_return = if returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64
        };
        Self {
            outcomes,
            average_return,
        }
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct BatchRunner {
    engine: Engine,
    criteria: CompanyCriteria,
    factory: StockFactory,
    concurrency: usize,
    timeout: Duration,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
}

impl BatchRunner {
    pub fn new(engine: Engine, criteria: CompanyCriteria, factory: StockFactory, cfg: &BatchConfig) -> Self {
        let start = engine.config().start;
        let end = engine.config().end;
        Self {
            engine,
            criteria,
            factory,
            concurrency: cfg.concurrency.max(1),
            timeout: Duration::from_secs(cfg.timeout_secs),
            start,
            end,
            today: Utc::now().date_naive(),
        }
    }

    /// Runner over snapshots stored under `dir`.
    pub fn from_dir(engine: Engine, criteria: CompanyCriteria, dir: PathBuf, cfg: &BatchConfig) -> Self {
        let factory: StockFactory = Arc::new(move |c: &ListedCompany| Stock::from_dir(&c.symbol, &c.name, dir.clone()));
        Self::new(engine, criteria, factory, cfg)
    }

    /// Date the simulation end bound is checked against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub async fn run(&self, selected: Vec<(usize, ListedCompany)>) -> BatchReport {
        let total = selected.len();
        info!(companies = total, concurrency = self.concurrency, "Batch starting");

        let outcomes: Vec<CompanyOutcome> = stream::iter(selected)
            .map(|(index, company)| self.run_one(index, company))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            companies = total,
            completed = report.count(OutcomeStatus::Completed),
            skipped = report.count(OutcomeStatus::Skipped),
            failed = report.count(OutcomeStatus::Failed),
            timed_out = report.count(OutcomeStatus::TimedOut),
            average_return = report.average_return,
            "Batch complete"
        );
        report
    }

    async fn run_one(&self, index: usize, company: ListedCompany) -> CompanyOutcome {
        let engine = self.engine.clone();
        let criteria = self.criteria.clone();
        let factory = self.factory.clone();
        let (start, end, today) = (self.start, self.end, self.today);
        let listed = company.clone();

        let task = tokio::task::spawn_blocking(move || -> Result<SimulationResult, SimError> {
            let mut stock = factory(&listed);
            criteria.check(&mut stock)?;
            engine.simulate_as_of(&mut stock, start, end, today)
        });

        // A timed-out simulation keeps running on the blocking pool, but its
        // result is dropped.
        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(result))) => CompanyOutcome::completed(index, &company, result),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join_err)) => Err(SimError::Inconsistent(format!("simulation task failed: {join_err}"))),
            Err(_) => Err(SimError::Timeout {
                symbol: company.symbol.clone(),
                secs: self.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(outcome) => {
                info!(
                    index,
                    symbol = %company.symbol,
                    trades = outcome.trades,
                    average_return = ?outcome.average_return,
                    "Company simulated"
                );
                outcome
            }
            Err(e) => {
                warn!(index, symbol = %company.symbol, error = %e, "Company not simulated");
                CompanyOutcome::errored(index, &company, &e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
