//! Backtest results, reporting and batch runs over many companies.

pub mod criteria;
pub mod report;
pub mod result;
pub mod runner;

pub use criteria::CompanyCriteria;
pub use report::render_report;
pub use result::SimulationResult;
pub use runner::{BatchReport, BatchRunner, Selection};
