//! VALUESIM: fundamentals-driven buy/sell backtester
//!
//! Entry point. Loads configuration, initialises structured logging,
//! applies command-line overrides and runs one of three commands: a
//! single-stock simulation, a batch over a company listing, or a screen of
//! the listing for current buy opportunities.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use valuesim::backtest::{render_report, BatchRunner, CompanyCriteria, Selection};
use valuesim::config::{AppConfig, StrategyKind};
use valuesim::engine::screener::Screener;
use valuesim::engine::Engine;
use valuesim::provider::Stock;
use valuesim::storage;
use valuesim::strategy::GatedStrategy;

/// Backtest PE and balance-sheet strategies against historical statements.
#[derive(Parser, Debug)]
#[command(name = "valuesim")]
#[command(version = "0.1.0")]
#[command(about = "Fundamentals-driven buy/sell strategy backtester", long_about = None)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate one company
    Simulate {
        /// Stock symbol, e.g. AAPL
        symbol: String,

        /// Company name, used in output only
        #[arg(long, default_value = "")]
        name: String,

        /// Only consider fiscal periods after this date
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Only consider fiscal periods before this date
        #[arg(long)]
        end: Option<NaiveDate>,

        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Simulate every company of the listing that passes the criteria
    Batch {
        #[command(flatten)]
        listing: ListingArgs,

        /// Simulate at most this many companies
        #[arg(long)]
        sample_size: Option<usize>,

        /// Write the batch report as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Evaluate a buy on the latest statements of every listed company
    Screen {
        #[command(flatten)]
        listing: ListingArgs,

        /// Write the buy candidates as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        strategy: StrategyArgs,
    },
}

/// Overrides for the `[strategy]` section.
#[derive(Args, Debug, Default)]
struct StrategyArgs {
    /// earnings, current_liabilities or liabilities
    #[arg(long, value_parser = parse_kind)]
    strategy: Option<StrategyKind>,

    /// Years of net income to average
    #[arg(long)]
    years_to_avg: Option<usize>,

    /// P/E ratio threshold to buy
    #[arg(long)]
    pe_to_buy: Option<f64>,

    /// P/E ratio threshold to sell
    #[arg(long)]
    pe_to_sell: Option<f64>,

    /// Minimum current asset to current liability ratio
    #[arg(long)]
    curr_asset_liab_ratio: Option<f64>,

    /// Minimum total asset to total liability ratio
    #[arg(long)]
    asset_liab_ratio: Option<f64>,
}

/// Which companies of the listing to work on.
#[derive(Args, Debug, Default)]
struct ListingArgs {
    /// Stock exchanges to include
    #[arg(long, num_args = 1..)]
    exchanges: Option<Vec<String>>,

    /// First index in the filtered listing
    #[arg(long, default_value_t = 0)]
    start_index: usize,

    /// Index in the filtered listing to stop before
    #[arg(long)]
    end_index: Option<usize>,

    /// Minimum number of years of income statements
    #[arg(long)]
    minimum_years: Option<usize>,
}

fn parse_kind(s: &str) -> Result<StrategyKind, String> {
    match s {
        "earnings" => Ok(StrategyKind::Earnings),
        "current_liabilities" => Ok(StrategyKind::CurrentLiabilities),
        "liabilities" => Ok(StrategyKind::Liabilities),
        other => Err(format!(
            "unknown strategy '{other}' (expected earnings, current_liabilities or liabilities)"
        )),
    }
}

impl StrategyArgs {
    fn apply(&self, cfg: &mut AppConfig) {
        let s = &mut cfg.strategy;
        if let Some(kind) = self.strategy {
            s.kind = kind;
        }
        if let Some(years) = self.years_to_avg {
            s.years_to_average = years;
        }
        if let Some(pe) = self.pe_to_buy {
            s.pe_to_buy = pe;
        }
        if let Some(pe) = self.pe_to_sell {
            s.pe_to_sell = pe;
        }
        if let Some(ratio) = self.curr_asset_liab_ratio {
            s.current_ratio = ratio;
        }
        if let Some(ratio) = self.asset_liab_ratio {
            s.total_ratio = ratio;
        }
    }
}

impl ListingArgs {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(exchanges) = &self.exchanges {
            cfg.batch.exchanges = exchanges.clone();
        }
        if let Some(years) = self.minimum_years {
            cfg.criteria.minimum_years = years;
        }
    }

    fn selection(&self, cfg: &AppConfig) -> Selection {
        Selection {
            start_index: self.start_index,
            end_index: self.end_index,
            ..Selection::from_config(&cfg.batch)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let mut cfg = load_config(&cli.config)?;

    init_logging();

    match cli.command {
        Commands::Simulate {
            symbol,
            name,
            start,
            end,
            strategy,
        } => {
            strategy.apply(&mut cfg);
            run_simulate(&cfg, &symbol, &name, start.or(cfg.simulation.start), end.or(cfg.simulation.end))?;
        }
        Commands::Batch {
            listing,
            sample_size,
            output,
            strategy,
        } => {
            strategy.apply(&mut cfg);
            listing.apply(&mut cfg);
            if sample_size.is_some() {
                cfg.batch.sample_size = sample_size;
            }
            let selection = listing.selection(&cfg);
            run_batch(&cfg, &selection, output.as_deref()).await?;
        }
        Commands::Screen {
            listing,
            output,
            strategy,
        } => {
            strategy.apply(&mut cfg);
            listing.apply(&mut cfg);
            let selection = listing.selection(&cfg);
            run_screen(&cfg, &selection, output.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load(&path.to_string_lossy())
    } else {
        Ok(AppConfig::default())
    }
}

fn build_strategy(cfg: &AppConfig) -> Result<GatedStrategy> {
    GatedStrategy::from_config(&cfg.strategy).context("Invalid strategy configuration")
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Simulate one company and print its report.
fn run_simulate(
    cfg: &AppConfig,
    symbol: &str,
    name: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let strategy = build_strategy(cfg)?;
    let (buy_metrics, sell_metrics) = (strategy.buy_metrics(), strategy.sell_metrics());
    let engine = Engine::new(Arc::new(strategy), cfg.simulation.clone());

    let mut stock = Stock::from_dir(symbol, name, cfg.data.dir.clone());
    info!(stock = %stock, "Simulating");

    match engine
        .simulate(&mut stock, start, end)
        .and_then(|result| render_report(&result, &buy_metrics, &sell_metrics))
    {
        Ok(report) => print!("{report}"),
        Err(e) => {
            error!(symbol, error = %e, "Simulation failed");
            println!("{stock}: {e}");
        }
    }
    Ok(())
}

/// Simulate the selected part of the listing and print every outcome.
async fn run_batch(cfg: &AppConfig, selection: &Selection, output: Option<&Path>) -> Result<()> {
    let strategy = build_strategy(cfg)?;
    let (buy_metrics, sell_metrics) = (strategy.buy_metrics(), strategy.sell_metrics());
    let engine = Engine::new(Arc::new(strategy), cfg.simulation.clone());

    let companies = storage::load_listing(&cfg.data.listing_path())?;
    let selected = selection.apply(&companies);
    let total = selected.len();

    let runner = BatchRunner::from_dir(
        engine,
        CompanyCriteria::from(&cfg.criteria),
        cfg.data.dir.clone(),
        &cfg.batch,
    );
    let report = runner.run(selected).await;

    for (n, outcome) in report.outcomes.iter().enumerate() {
        let label = format!("{}/{}: {} ({})", n + 1, total, outcome.name, outcome.symbol);
        match (&outcome.result, &outcome.error) {
            (Some(result), _) => {
                println!("{label}");
                match render_report(result, &buy_metrics, &sell_metrics) {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("{e}"),
                }
            }
            (None, Some(e)) => println!("{label}: {e}"),
            (None, None) => println!("{label}"),
        }
    }
    println!("Average return: {}", percent(report.average_return));

    if let Some(path) = output {
        storage::save_report(&report, path)?;
    }
    Ok(())
}

/// Evaluate a buy on the latest figures of every selected company.
fn run_screen(cfg: &AppConfig, selection: &Selection, output: Option<&Path>) -> Result<()> {
    let strategy = build_strategy(cfg)?;
    let screener = Screener::new(Arc::new(strategy));
    let criteria = CompanyCriteria::from(&cfg.criteria);
    let today = Utc::now().date_naive();

    let companies = storage::load_listing(&cfg.data.listing_path())?;
    let selected = selection.apply(&companies);
    let total = selected.len();
    let mut candidates = Vec::new();

    for (index, company) in selected {
        let mut stock = Stock::from_dir(&company.symbol, &company.name, cfg.data.dir.clone());
        let outcome = criteria
            .check(&mut stock)
            .and_then(|_| screener.evaluate(&mut stock, today));
        match outcome {
            Ok(outcome) if outcome.buy => {
                println!("{index}/{total}: {stock}");
                for (metric, diagnostic) in &outcome.diagnostics {
                    println!("{metric}: {}", diagnostic.value.round_dp(2));
                }
                println!();
                candidates.push(outcome);
            }
            Ok(_) => println!("{index}/{total}: {stock}: no buy"),
            Err(e) => {
                warn!(symbol = %company.symbol, error = %e, "Screen skipped company");
                println!("{index}/{total}: {stock}: {e}");
            }
        }
    }

    info!(screened = total, candidates = candidates.len(), "Screen complete");
    if let Some(path) = output {
        storage::save_report(&candidates, path)?;
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("valuesim=info"));

    let json_logging = std::env::var("VALUESIM_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
