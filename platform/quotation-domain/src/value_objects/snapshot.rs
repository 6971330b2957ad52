use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One instrument's bar at a point in time.
///
/// `open`/`high`/`low`/`close` cover the current aggregation window only, while the `day_*`
/// fields track the whole trading day, so the two ranges are not nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcSnapshot {
    pub code: String,
    pub name: String,
    pub day_time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub day_open: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub last_close: f64,
    pub volume: f64,
    pub amount: f64,
    pub turnover: f64,
}

impl OhlcSnapshot {
    /// Folds a new traded price into the window: `close` follows the price, `high`/`low`
    /// only widen.
    pub fn apply_price(&mut self, price: f64) {
        self.close = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
    }
}

/// Cross-section of all instruments active at one timestamp, keyed by code.
pub type CrossSection = BTreeMap<String, OhlcSnapshot>;
