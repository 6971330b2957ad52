use crate::csv_io::{parse_timestamp, read_rows};
use quotation_domain::repositories::market_stream::LiveQuoteSource;
use quotation_domain::repositories::FetchError;
use quotation_domain::value_objects::tick::Tick;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Deserialize)]
pub struct QuoteRecord {
    pub code: String,
    pub day_time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub last_close: f64,
    pub volume: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub turnover: f64,
}

/// Quote snapshot file maintained by an external collector and re-read on every poll.
///
/// Only the latest row per code is returned. When the file has not been modified since the
/// previous poll an empty batch is returned, so a stalled collector produces no bars.
#[derive(Debug, Clone)]
pub struct CsvQuoteFeed {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl CsvQuoteFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
    }
}

impl LiveQuoteSource for CsvQuoteFeed {
    fn fetch_realtime_quotes(&mut self, codes: &[String]) -> Result<Vec<Tick>, FetchError> {
        let modified = self.modified();
        if modified.is_some() && modified == self.last_modified {
            return Ok(Vec::new());
        }

        let records: Vec<QuoteRecord> = read_rows("quotes", &self.path)?;
        let mut latest: BTreeMap<String, Tick> = BTreeMap::new();
        for record in records {
            if !codes.contains(&record.code) {
                continue;
            }
            let tick = Tick {
                code: record.code.clone(),
                day_time: parse_timestamp(&record.day_time)?,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                last_close: record.last_close,
                volume: record.volume,
                amount: record.amount,
                turnover: record.turnover,
            };
            let newer = latest
                .get(&record.code)
                .map_or(true, |existing| existing.day_time <= tick.day_time);
            if newer {
                latest.insert(record.code, tick);
            }
        }
        self.last_modified = modified;
        metrics::counter!("quotation.infra.quotes.rows_total").increment(latest.len() as u64);
        Ok(latest.into_values().collect())
    }
}
