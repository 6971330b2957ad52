use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One quote row as delivered by a feed: either a minute candle from history or a
/// realtime quote. For realtime quotes `open`/`high`/`low` are the day-cumulative values
/// reported by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub code: String,
    pub day_time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub last_close: f64,
    pub volume: f64,
    pub amount: f64,
    pub turnover: f64,
}
