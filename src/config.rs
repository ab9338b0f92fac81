//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys for a statement source) are referenced by env-var name
//! in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub strategy: StrategyConfig,
    pub simulation: SimulationConfig,
    pub criteria: CriteriaConfig,
    pub batch: BatchConfig,
    pub data: DataConfig,
}

/// Which gate chain to build.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Earnings,
    CurrentLiabilities,
    #[default]
    Liabilities,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    pub years_to_average: usize,
    pub pe_to_buy: f64,
    pub pe_to_sell: f64,
    /// Minimum current assets / current liabilities.
    pub current_ratio: f64,
    /// Minimum total assets / total liabilities.
    pub total_ratio: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            years_to_average: 5,
            pe_to_buy: 10.0,
            pe_to_sell: 20.0,
            current_ratio: 1.0,
            total_ratio: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationConfig {
    /// Months between fiscal period end and the transaction.
    pub settlement_lag_months: u32,
    /// Maximum days between the transaction date and the market cap used.
    pub tolerance_days: i64,
    /// Market cap is fetched up to this many years past the last statement.
    pub lookahead_years: u32,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            settlement_lag_months: 3,
            tolerance_days: 15,
            lookahead_years: 1,
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CriteriaConfig {
    pub minimum_years: usize,
    /// Accepted reporting currencies. Empty accepts any.
    pub currencies: Vec<String>,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            minimum_years: 10,
            currencies: vec!["USD".to_string(), "EUR".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub exchanges: Vec<String>,
    /// Companies to simulate; `None` runs the whole filtered listing.
    pub sample_size: Option<usize>,
    pub concurrency: usize,
    /// Wall-clock budget per company.
    pub timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            exchanges: vec!["NYSE".to_string(), "NASDAQ".to_string()],
            sample_size: None,
            concurrency: 4,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `<SYMBOL>/snapshot.json` files.
    pub dir: PathBuf,
    /// Listing file name, relative to `dir`.
    pub listing: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("stock_data"),
            listing: "listing.json".to_string(),
        }
    }
}

impl DataConfig {
    pub fn listing_path(&self) -> PathBuf {
        self.dir.join(&self.listing)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text. Missing sections take defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
