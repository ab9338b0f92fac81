//! End-to-end simulations over synthetic companies.
//!
//! Each scenario builds a company whose PE crosses the strategy thresholds
//! at known fiscal years and checks the engine acts exactly there.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use valuesim::backtest::{render_report, BatchRunner, CompanyCriteria, Selection, SimulationResult};
use valuesim::backtest::runner::OutcomeStatus;
use valuesim::config::{BatchConfig, SimulationConfig};
use valuesim::engine::Engine;
use valuesim::provider::{StatementProvider, Stock};
use valuesim::storage;
use valuesim::strategy::earnings::EarningsParams;
use valuesim::strategy::{GatedStrategy, Strategy};
use valuesim::types::{ListedCompany, MarketCapPoint, Operation, SimError, DIVIDEND_METRIC, MARKET_CAP_METRIC};

use crate::fixtures::*;

fn today() -> chrono::NaiveDate {
    date(2024, 6, 1)
}

fn params(pe_to_buy: Decimal, pe_to_sell: Decimal) -> EarningsParams {
    EarningsParams {
        pe_to_buy,
        pe_to_sell,
        years_to_average: 5,
    }
}

fn engine_with(strategy: impl Strategy + 'static) -> Engine {
    Engine::new(Arc::new(strategy), SimulationConfig::default())
}

fn earnings_engine() -> Engine {
    engine_with(GatedStrategy::earnings(params(dec!(10), dec!(20))).unwrap())
}

fn price_dates(events: &[valuesim::types::TransactionEvent]) -> Vec<chrono::NaiveDate> {
    events
        .iter()
        .filter(|e| e.metric == MARKET_CAP_METRIC)
        .map(|e| e.date)
        .collect()
}

/// Market cap for fiscal 2005 to 2016. With net income 100 a year, PE
/// crosses 10 in 2010 and 2013 and crosses 20 in 2012 and 2015.
fn two_cycle_caps() -> Vec<Decimal> {
    [1500, 1500, 1500, 1500, 1500, 800, 1500, 2500, 900, 1200, 2100, 1500]
        .iter()
        .map(|&v| Decimal::from(v))
        .collect()
}

fn two_cycles() -> MockStock {
    MockStock::builder("CYCL", 2005)
        .net_income(&flat_income(12, dec!(100)))
        .market_cap(&two_cycle_caps())
        .build()
}

/// Buys at fiscal 2009 (PE 8) and never sells.
fn buy_and_hold(dividends_paid: Decimal) -> MockStock {
    MockStock::builder("HOLD", 2005)
        .net_income(&flat_income(8, dec!(100)))
        .market_cap(&[
            dec!(1500),
            dec!(1500),
            dec!(1500),
            dec!(1500),
            dec!(800),
            dec!(1500),
            dec!(1500),
            dec!(1500),
        ])
        .dividends_paid(dividends_paid)
        .build()
}

// ---------------------------------------------------------------------------
// Engine round trip
// ---------------------------------------------------------------------------

#[test]
fn test_trades_at_predicted_periods() {
    let mut stock = two_cycles();
    let result = earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap();

    assert_eq!(price_dates(result.buys()), vec![transaction(2010), transaction(2013)]);
    assert_eq!(price_dates(result.sells()), vec![transaction(2012), transaction(2015)]);
    assert_eq!(result.terminal(), None);

    // The PE that triggered each transition is recorded beside it.
    assert_eq!(result.metric_at(Operation::Buy, "eps_5", transaction(2010)), Some(dec!(8)));
    assert_eq!(result.metric_at(Operation::Sell, "eps_5", transaction(2012)), Some(dec!(25)));
    assert_eq!(result.metric_at(Operation::Sell, "eps_5", transaction(2015)), Some(dec!(21)));

    // 800 -> 2500 and 900 -> 2100
    assert_eq!(result.cash_balance().unwrap(), dec!(2900));
    assert_eq!(result.returns().unwrap().len(), 2);
}

#[test]
fn test_sells_never_exceed_buys() {
    for seed in 1..20u32 {
        let caps: Vec<Decimal> = (0..15u32)
            .map(|i| Decimal::from(((i * 7 + seed * 13) % 25 + 4) * 100))
            .collect();
        let mut stock = MockStock::builder("RAND", 2000)
            .net_income(&flat_income(15, dec!(100)))
            .market_cap(&caps)
            .build();
        let result = earnings_engine()
            .simulate_as_of(&mut stock, None, None, today())
            .unwrap();

        let buys = price_dates(result.buys()).len();
        let sells = price_dates(result.sells()).len();
        assert!(sells <= buys, "seed {seed}: {sells} sells > {buys} buys");
        assert!(buys - sells <= 1, "seed {seed}: {buys} buys, {sells} sells");
        assert_eq!(result.terminal().is_some(), buys > sells, "seed {seed}");
    }
}

#[test]
fn test_annualized_return_over_two_years() {
    // Buy at 1000 (PE 10), sell two years later at 1210 (PE 12.1).
    let mut stock = MockStock::builder("TENP", 2005)
        .net_income(&flat_income(8, dec!(100)))
        .market_cap(&[
            dec!(1500),
            dec!(1500),
            dec!(1500),
            dec!(1500),
            dec!(1000),
            dec!(1100),
            dec!(1210),
            dec!(1500),
        ])
        .build();
    let engine = engine_with(GatedStrategy::earnings(params(dec!(10), dec!(12))).unwrap());
    let result = engine.simulate_as_of(&mut stock, None, None, today()).unwrap();

    let returns = result.returns().unwrap();
    assert_eq!(returns.len(), 1);
    assert!((returns[0] - 0.10).abs() < 1e-3, "got {}", returns[0]);
}

// ---------------------------------------------------------------------------
// Dividends
// ---------------------------------------------------------------------------

#[test]
fn test_dividends_paid_sign_normalised() {
    let mut stock = buy_and_hold(dec!(-500));
    let result = earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap();

    let infos = result.infos();
    assert_eq!(infos.len(), 3);
    assert!(infos.iter().all(|e| e.metric == DIVIDEND_METRIC && e.value == dec!(500)));
    assert_eq!(infos[0].date, fiscal(2010));

    let terminal = result.terminal().unwrap();
    assert_eq!(terminal.date, transaction(2012));
    assert_eq!(terminal.value, dec!(1500));

    let attribution = result.dividends().unwrap();
    assert!(attribution.closed.is_empty());
    assert_eq!(attribution.open, Some(dec!(1500)));

    let open = result.open_position().unwrap().unwrap();
    assert_eq!(open.dividends, dec!(1500));
    assert_eq!(result.average_return().unwrap(), None);
    assert!(result.hypothetical_average_return().unwrap().unwrap() > 0.0);
}

#[test]
fn test_positive_dividends_paid_is_inconsistent() {
    let mut stock = buy_and_hold(dec!(500));
    let err = earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap_err();
    assert!(matches!(err, SimError::Inconsistent(_)));
}

// ---------------------------------------------------------------------------
// Market cap tolerance
// ---------------------------------------------------------------------------

#[test]
fn test_sample_fifteen_days_away_is_used() {
    let mut stock = MockStock::builder("LATE", 2005)
        .net_income(&flat_income(8, dec!(100)))
        .market_cap(&flat_income(8, dec!(1500)))
        .shift_sample(2010, 15)
        .build();
    assert!(earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .is_ok());
}

#[test]
fn test_sample_sixteen_days_away_is_rejected() {
    let mut stock = MockStock::builder("LATE", 2005)
        .net_income(&flat_income(8, dec!(100)))
        .market_cap(&flat_income(8, dec!(1500)))
        .shift_sample(2010, 16)
        .build();
    let err = earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap_err();
    assert_eq!(
        err,
        SimError::ToleranceExceeded {
            target: transaction(2010),
            nearest: transaction(2010) + Duration::days(16),
            days: 16,
            tolerance: 15,
        }
    );
}

// ---------------------------------------------------------------------------
// Boundaries and provider state
// ---------------------------------------------------------------------------

#[test]
fn test_future_end_is_configuration_error() {
    let mut stock = two_cycles();
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let err = earnings_engine().simulate(&mut stock, None, Some(tomorrow)).unwrap_err();
    assert!(matches!(err, SimError::Configuration(_)));
}

#[test]
fn test_unopened_provider_is_opened_once() {
    let mut stock = two_cycles();
    assert!(!stock.is_open());
    let engine = earnings_engine();
    engine.simulate_as_of(&mut stock, None, None, today()).unwrap();
    engine.simulate_as_of(&mut stock, None, None, today()).unwrap();
    assert!(stock.is_open());
    assert_eq!(stock.open_calls(), 1);
}

#[test]
fn test_provider_failure_propagates() {
    let mut stock = two_cycles();
    stock.set_error("feed offline");
    let err = earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap_err();
    assert!(matches!(err, SimError::DataUnavailable { .. }));
}

#[test]
fn test_empty_market_cap_is_data_unavailable() {
    let mut stock = two_cycles();
    stock.clear_market_cap();
    let err = earnings_engine()
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap_err();
    assert!(matches!(err, SimError::DataUnavailable { .. }));
}

#[test]
fn test_bounds_restrict_periods() {
    let mut stock = two_cycles();
    // Only fiscal 2011 to 2013: the 2013 buy is the only transition.
    let result = earnings_engine()
        .simulate_as_of(&mut stock, Some(fiscal(2010)), Some(fiscal(2014)), today())
        .unwrap();
    assert_eq!(price_dates(result.buys()), vec![transaction(2013)]);
    assert!(result.sells().is_empty());
    assert_eq!(result.terminal().map(|m| m.date), Some(transaction(2013)));
}

// ---------------------------------------------------------------------------
// Strategy composition
// ---------------------------------------------------------------------------

#[test]
fn test_liabilities_strategy_refuses_leveraged_company() {
    let leveraged = || {
        MockStock::builder("LEVR", 2005)
            .net_income(&flat_income(12, dec!(100)))
            .market_cap(&two_cycle_caps())
            .balance_sheet(leveraged_balance_sheet())
            .build()
    };

    let earnings = earnings_engine()
        .simulate_as_of(&mut leveraged(), None, None, today())
        .unwrap();
    assert_eq!(price_dates(earnings.buys()).len(), 2);

    let current = engine_with(GatedStrategy::current_liabilities(params(dec!(10), dec!(20)), dec!(1)).unwrap())
        .simulate_as_of(&mut leveraged(), None, None, today())
        .unwrap();
    assert_eq!(price_dates(current.buys()).len(), 2);
    assert_eq!(
        current.metric_at(Operation::Buy, "curr-asset-liab-ratio", transaction(2010)),
        Some(dec!(2))
    );

    let liabilities = engine_with(GatedStrategy::liabilities(params(dec!(10), dec!(20)), dec!(1), dec!(1)).unwrap())
        .simulate_as_of(&mut leveraged(), None, None, today())
        .unwrap();
    assert!(liabilities.buys().is_empty());
    assert!(liabilities.sells().is_empty());
}

#[test]
fn test_healthy_company_passes_liabilities_gates() {
    let engine = engine_with(GatedStrategy::liabilities(params(dec!(10), dec!(20)), dec!(1), dec!(1)).unwrap());
    let result = engine
        .simulate_as_of(&mut two_cycles(), None, None, today())
        .unwrap();
    assert_eq!(price_dates(result.buys()).len(), 2);
    assert_eq!(
        result.metric_at(Operation::Buy, "asset-liab-ratio", transaction(2013)),
        Some(dec!(1.5))
    );
}

// ---------------------------------------------------------------------------
// Result lifecycle and reporting
// ---------------------------------------------------------------------------

#[test]
fn test_result_is_frozen() {
    let mut result: SimulationResult = earnings_engine()
        .simulate_as_of(&mut two_cycles(), None, None, today())
        .unwrap();
    assert!(matches!(result.end(None, None), Err(SimError::Usage(_))));
    assert!(matches!(
        result.buy(MARKET_CAP_METRIC, today(), dec!(1)),
        Err(SimError::Usage(_))
    ));
    assert!(matches!(
        result.info(DIVIDEND_METRIC, today(), dec!(1)),
        Err(SimError::Usage(_))
    ));
}

#[test]
fn test_report_marks_hypothetical_sell() {
    let strategy = GatedStrategy::earnings(params(dec!(10), dec!(20))).unwrap();
    let (buy_metrics, sell_metrics) = (strategy.buy_metrics(), strategy.sell_metrics());
    let result = engine_with(strategy)
        .simulate_as_of(&mut buy_and_hold(dec!(-10)), None, None, today())
        .unwrap();

    let text = render_report(&result, &buy_metrics, &sell_metrics).unwrap();
    assert!(text.starts_with("HOLD"));
    assert!(text.contains("SELL*"));
    assert!(text.contains("Average return: n/a"));
    assert!(text.contains("Hypothetical average return*:"));
}

#[test]
fn test_hypothetical_exit_uses_latest_market_cap() {
    let mut snapshot = buy_and_hold(Decimal::ZERO).snapshot().clone();
    snapshot
        .market_cap
        .push(MarketCapPoint::new(date(2013, 12, 15), dec!(9999)));
    let strategy = GatedStrategy::earnings(params(dec!(10), dec!(20))).unwrap();
    let (buy_metrics, sell_metrics) = (strategy.buy_metrics(), strategy.sell_metrics());
    let mut stock = Stock::from_snapshot("HOLD", "Hold Corp", snapshot);
    let result = engine_with(strategy)
        .simulate_as_of(&mut stock, None, None, today())
        .unwrap();

    let terminal = result.terminal().unwrap();
    assert_eq!(terminal.date, transaction(2012));
    assert_eq!(terminal.value, dec!(1500));

    let open = result.open_position().unwrap().unwrap();
    assert_eq!(open.buy_value, dec!(800));
    assert_eq!(open.mark.date, date(2013, 12, 15));
    assert_eq!(open.mark.value, dec!(9999));

    let text = render_report(&result, &buy_metrics, &sell_metrics).unwrap();
    let row = text.lines().find(|l| l.contains("SELL*")).unwrap();
    assert!(row.starts_with("2013-12-15"));
    assert!(row.contains("9999"));
}

// ---------------------------------------------------------------------------
// Stored snapshots and batch runs
// ---------------------------------------------------------------------------

fn temp_dir() -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("valuesim_it_{}", uuid::Uuid::new_v4()));
    p
}

fn listed(symbol: &str) -> ListedCompany {
    ListedCompany {
        symbol: symbol.to_string(),
        name: format!("{symbol} Corp"),
        exchange: "New York Stock Exchange".to_string(),
        exchange_short_name: "NYSE".to_string(),
    }
}

#[test]
fn test_stored_snapshot_matches_in_memory() {
    let dir = temp_dir();
    let mock = two_cycles();
    storage::save_snapshot(&dir, "CYCL", mock.snapshot()).unwrap();

    let mut stored = Stock::from_dir("CYCL", "Cycle Corp", dir.clone());
    let from_disk = earnings_engine()
        .simulate_as_of(&mut stored, None, None, today())
        .unwrap();
    let in_memory = earnings_engine()
        .simulate_as_of(&mut two_cycles(), None, None, today())
        .unwrap();

    assert_eq!(from_disk.buys(), in_memory.buys());
    assert_eq!(from_disk.sells(), in_memory.sells());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_batch_over_stored_listing() {
    let dir = temp_dir();
    storage::save_snapshot(&dir, "CYCL", two_cycles().snapshot()).unwrap();
    let yen = MockStock::builder("YEN", 2005)
        .net_income(&flat_income(12, dec!(100)))
        .market_cap(&flat_income(12, dec!(800)))
        .currency("JPY");
    storage::save_snapshot(&dir, "YEN", &yen.build_snapshot()).unwrap();

    let mut otc = listed("OTC");
    otc.exchange_short_name = "OTC".to_string();
    let listing = vec![listed("CYCL"), otc, listed("YEN"), listed("MISSING")];
    storage::save_report(&listing, &dir.join("listing.json")).unwrap();

    let companies = storage::load_listing(&dir.join("listing.json")).unwrap();
    let selected = Selection::from_config(&BatchConfig::default()).apply(&companies);
    assert_eq!(selected.len(), 3);

    let runner = BatchRunner::from_dir(
        earnings_engine(),
        CompanyCriteria::new(10, vec!["USD".to_string()]),
        dir.clone(),
        &BatchConfig::default(),
    )
    .with_today(today());
    let report = runner.run(selected).await;

    let statuses: Vec<(&str, OutcomeStatus)> = report
        .outcomes
        .iter()
        .map(|o| (o.symbol.as_str(), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("CYCL", OutcomeStatus::Completed),
            ("YEN", OutcomeStatus::Skipped),
            ("MISSING", OutcomeStatus::Failed),
        ]
    );
    assert_eq!(report.outcomes[0].trades, 2);
    assert!(report.average_return > 0.0);

    let out = dir.join("report.json");
    storage::save_report(&report, &out).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["outcomes"].as_array().unwrap().len(), 3);

    let _ = std::fs::remove_dir_all(&dir);
}
