//! Plain-text rendering of a finished simulation.
//!
//! One row per buy and sell in date order, with the requested diagnostic
//! metrics as extra columns. A position still held at the end gets a
//! hypothetical sell row marked with `*`; its return only feeds the
//! hypothetical average, never the realized one.

use rust_decimal::Decimal;
use std::fmt::Write;

use super::result::SimulationResult;
use crate::types::{Operation, SimError, MARKET_CAP_METRIC};

const HYPOTHETICAL_MARK: &str = "*";
const EMPTY_CELL: &str = "-";

struct Row {
    cells: Vec<String>,
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn money(value: Decimal) -> String {
    value.round_dp(2).normalize().to_string()
}

/// Render `result` as a table. Metric columns appear in the order given,
/// buy metrics first; a metric absent on a row renders as `-`.
pub fn render_report(
    result: &SimulationResult,
    buy_metrics: &[String],
    sell_metrics: &[String],
) -> Result<String, SimError> {
    let trades = result.trades()?;
    let open = result.open_position()?;

    let mut header: Vec<String> = vec![
        "date".to_string(),
        "operation".to_string(),
        MARKET_CAP_METRIC.to_string(),
    ];
    header.extend(buy_metrics.iter().cloned());
    header.extend(sell_metrics.iter().filter(|m| !buy_metrics.contains(m)).cloned());
    header.push("dividends".to_string());
    header.push("return".to_string());
    let metric_columns = &header[3..header.len() - 2];

    let metric_cells = |operation: Operation, date, allowed: &[String]| -> Vec<String> {
        metric_columns
            .iter()
            .map(|m| {
                if !allowed.contains(m) {
                    return EMPTY_CELL.to_string();
                }
                result
                    .metric_at(operation, m, date)
                    .map(money)
                    .unwrap_or_else(|| EMPTY_CELL.to_string())
            })
            .collect()
    };

    let mut rows: Vec<Row> = Vec::new();
    for trade in &trades {
        let mut buy = vec![trade.buy_date.to_string(), Operation::Buy.to_string(), money(trade.buy_value)];
        buy.extend(metric_cells(Operation::Buy, trade.buy_date, buy_metrics));
        buy.push(EMPTY_CELL.to_string());
        buy.push(EMPTY_CELL.to_string());
        rows.push(Row { cells: buy });

        let mut sell = vec![trade.sell_date.to_string(), Operation::Sell.to_string(), money(trade.sell_value)];
        sell.extend(metric_cells(Operation::Sell, trade.sell_date, sell_metrics));
        sell.push(money(trade.dividends));
        sell.push(percent(trade.annualized_return));
        rows.push(Row { cells: sell });
    }

    if let Some(open) = &open {
        let mut buy = vec![open.buy_date.to_string(), Operation::Buy.to_string(), money(open.buy_value)];
        buy.extend(metric_cells(Operation::Buy, open.buy_date, buy_metrics));
        buy.push(EMPTY_CELL.to_string());
        buy.push(EMPTY_CELL.to_string());
        rows.push(Row { cells: buy });

        let mut sell = vec![
            open.mark.date.to_string(),
            format!("{}{HYPOTHETICAL_MARK}", Operation::Sell),
            money(open.mark.value),
        ];
        sell.extend(metric_columns.iter().map(|_| EMPTY_CELL.to_string()));
        sell.push(money(open.dividends));
        sell.push(percent(open.annualized_return));
        rows.push(Row { cells: sell });
    }

    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .map(|r| r.cells[i].len())
                .chain(std::iter::once(header[i].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "{}", result.symbol());
    write_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(&mut out, &rule, &widths);
    for row in &rows {
        write_line(&mut out, &row.cells, &widths);
    }

    let realized = result
        .average_return()?
        .map(percent)
        .unwrap_or_else(|| "n/a".to_string());
    let _ = writeln!(out, "Average return: {realized}");
    if open.is_some() {
        let hypothetical = result
            .hypothetical_average_return()?
            .map(percent)
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(out, "Hypothetical average return{HYPOTHETICAL_MARK}: {hypothetical}");
        let _ = writeln!(out, "{HYPOTHETICAL_MARK} position still held, valued at the last market cap");
    }
    Ok(out)
}

fn write_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(c, &w)| format!("{c:<w$}"))
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}
