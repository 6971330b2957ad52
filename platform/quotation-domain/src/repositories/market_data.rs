use crate::repositories::FetchError;
use crate::value_objects::daily_bar::DailyBar;
use crate::value_objects::tick::Tick;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuteQuery {
    pub code: String,
    pub period_minutes: i64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuery {
    pub code: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub trait HistoricalQuoteSource {
    /// Minute candles for `query.code` at `query.period_minutes` resolution, inclusive of both
    /// dates when given.
    fn fetch_minute_candles(&self, query: &MinuteQuery) -> Result<Vec<Tick>, FetchError>;

    fn fetch_daily_candles(&self, query: &DailyQuery) -> Result<Vec<DailyBar>, FetchError>;
}
