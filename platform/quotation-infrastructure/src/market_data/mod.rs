use crate::csv_io::{parse_date, parse_timestamp, read_rows};
use quotation_domain::repositories::market_data::{
    DailyQuery, HistoricalQuoteSource, MinuteQuery,
};
use quotation_domain::repositories::FetchError;
use quotation_domain::value_objects::daily_bar::DailyBar;
use quotation_domain::value_objects::tick::Tick;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct MinuteRecord {
    pub day_time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub last_close: f64,
    pub volume: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub turnover: f64,
}

#[derive(Debug, Deserialize)]
pub struct DailyRecord {
    pub trade_date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Historical candles stored as one CSV per code:
/// `{minute_dir}/{period}min/{code}.csv` and `{daily_dir}/{code}.csv`.
#[derive(Debug, Clone)]
pub struct CsvHistoricalSource {
    minute_dir: PathBuf,
    daily_dir: PathBuf,
}

impl CsvHistoricalSource {
    pub fn new(minute_dir: impl Into<PathBuf>, daily_dir: impl Into<PathBuf>) -> Self {
        Self {
            minute_dir: minute_dir.into(),
            daily_dir: daily_dir.into(),
        }
    }

    pub fn minute_path(&self, code: &str, period_minutes: i64) -> PathBuf {
        self.minute_dir
            .join(format!("{period_minutes}min"))
            .join(format!("{code}.csv"))
    }

    pub fn daily_path(&self, code: &str) -> PathBuf {
        self.daily_dir.join(format!("{code}.csv"))
    }
}

impl HistoricalQuoteSource for CsvHistoricalSource {
    fn fetch_minute_candles(&self, query: &MinuteQuery) -> Result<Vec<Tick>, FetchError> {
        let path = self.minute_path(&query.code, query.period_minutes);
        let ticks = load_minute_csv(&path, &query.code)?
            .into_iter()
            .filter(|tick| query.start.map_or(true, |start| tick.day_time.date() >= start))
            .filter(|tick| query.end.map_or(true, |end| tick.day_time.date() <= end))
            .collect::<Vec<_>>();
        tracing::debug!(
            code = %query.code,
            period_minutes = query.period_minutes,
            rows = ticks.len(),
            "minute candles loaded"
        );
        Ok(ticks)
    }

    fn fetch_daily_candles(&self, query: &DailyQuery) -> Result<Vec<DailyBar>, FetchError> {
        let path = self.daily_path(&query.code);
        Ok(load_daily_csv(&path, &query.code)?
            .into_iter()
            .filter(|bar| bar.trade_date >= query.start && bar.trade_date <= query.end)
            .collect())
    }
}

pub fn load_minute_csv(path: &Path, code: &str) -> Result<Vec<Tick>, FetchError> {
    let records: Vec<MinuteRecord> = read_rows("minute", path)?;
    let mut ticks = Vec::with_capacity(records.len());
    for record in records {
        ticks.push(Tick {
            code: code.to_string(),
            day_time: parse_timestamp(&record.day_time)?,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            last_close: record.last_close,
            volume: record.volume,
            amount: record.amount,
            turnover: record.turnover,
        });
    }
    ticks.sort_by_key(|tick| tick.day_time);
    Ok(ticks)
}

pub fn load_daily_csv(path: &Path, code: &str) -> Result<Vec<DailyBar>, FetchError> {
    let records: Vec<DailyRecord> = read_rows("daily", path)?;
    let mut bars = Vec::with_capacity(records.len());
    for record in records {
        bars.push(DailyBar {
            code: code.to_string(),
            trade_date: parse_date(&record.trade_date)?,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }
    bars.sort_by_key(|bar| bar.trade_date);
    Ok(bars)
}
