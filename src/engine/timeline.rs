//! Market cap timeline.
//!
//! Joins the irregularly sampled market cap series to arbitrary transaction
//! dates: the sample nearest the target is found by binary search over the
//! date-sorted series and must lie within a day tolerance.

use chrono::NaiveDate;

use crate::types::{MarketCapPoint, SimError};

/// Market cap samples sorted by date.
///
/// Samples sharing a date keep the order they were supplied in.
#[derive(Debug, Clone)]
pub struct MarketCapSeries {
    points: Vec<MarketCapPoint>,
}

impl MarketCapSeries {
    /// Fails with `DataUnavailable` on an empty series.
    pub fn new(symbol: &str, mut points: Vec<MarketCapPoint>) -> Result<Self, SimError> {
        if points.is_empty() {
            return Err(SimError::data_unavailable(symbol, "market cap series is empty"));
        }
        // Stable: equal dates keep supply order.
        points.sort_by_key(|p| p.date);
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }

    pub fn last(&self) -> &MarketCapPoint {
        &self.points[self.points.len() - 1]
    }

    /// First index whose date is not before `date`.
    fn first_at_or_after(&self, date: NaiveDate) -> usize {
        self.points.partition_point(|p| p.date < date)
    }

    /// The sample nearest `target`. When a sample before and one after are
    /// equally far, the later one wins. Among samples sharing a date the
    /// first supplied wins.
    pub fn nearest(&self, target: NaiveDate) -> &MarketCapPoint {
        let after = self.first_at_or_after(target);
        if after == 0 {
            return &self.points[0];
        }
        let before = &self.points[self.first_at_or_after(self.points[after - 1].date)];
        match self.points.get(after) {
            Some(next) if (next.date - target) <= (target - before.date) => next,
            _ => before,
        }
    }

    /// The nearest sample, failing with `ToleranceExceeded` when it is more
    /// than `tolerance_days` away from `target`.
    pub fn lookup(&self, target: NaiveDate, tolerance_days: i64) -> Result<MarketCapPoint, SimError> {
        let point = *self.nearest(target);
        let days = (point.date - target).num_days().abs();
        if days > tolerance_days {
            return Err(SimError::ToleranceExceeded {
                target,
                nearest: point.date,
                days,
                tolerance: tolerance_days,
            });
        }
        Ok(point)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
