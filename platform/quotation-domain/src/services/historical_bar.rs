use crate::repositories::calendar::TradingCalendar;
use crate::repositories::market_data::{DailyQuery, HistoricalQuoteSource, MinuteQuery};
use crate::repositories::FetchError;
use crate::value_objects::snapshot::{CrossSection, OhlcSnapshot};
use crate::value_objects::tick::Tick;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Fully materialized replay sequence: timestamp -> cross-section, in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarFrame {
    entries: BTreeMap<NaiveDateTime, CrossSection>,
}

impl BarFrame {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, timestamp: &NaiveDateTime) -> Option<&CrossSection> {
        self.entries.get(timestamp)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &NaiveDateTime> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDateTime, &CrossSection)> {
        self.entries.iter()
    }

    /// First timestamp strictly after `cursor` (or the very first one when `cursor` is `None`).
    pub fn next_after(&self, cursor: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        let lower = cursor.map_or(Bound::Unbounded, Bound::Excluded);
        self.entries
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(ts, _)| *ts)
    }

    fn insert(&mut self, snapshot: OhlcSnapshot) {
        self.entries
            .entry(snapshot.day_time)
            .or_default()
            .insert(snapshot.code.clone(), snapshot);
    }

    fn merge(&mut self, other: BarFrame) {
        for (timestamp, section) in other.entries {
            self.entries.entry(timestamp).or_default().extend(section);
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub codes: &'a [String],
    pub names: &'a BTreeMap<String, String>,
    pub period_minutes: i64,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Last timestamp already handed to the replay cursor. New data starts on the trading
    /// day after it, so the replay never rewinds.
    pub resume_after: Option<NaiveDateTime>,
}

/// Backtest bar builder: slices minute history into daily buckets and flattens them into a
/// single timestamp-ordered [`BarFrame`].
#[derive(Debug, Clone, Default)]
pub struct HistoricalBarBuilder {
    frame: BarFrame,
}

impl HistoricalBarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> &BarFrame {
        &self.frame
    }

    /// Builds every requested code and merges the result into the frame. Either all codes are
    /// merged or, on the first failure, none are. Returns the number of timestamps added.
    pub fn extend(
        &mut self,
        request: &BuildRequest<'_>,
        source: &dyn HistoricalQuoteSource,
        calendar: &dyn TradingCalendar,
    ) -> Result<usize, FetchError> {
        let staging = build(request, source, calendar)?;
        let before = self.frame.len();
        self.frame.merge(staging);
        Ok(self.frame.len() - before)
    }
}

pub fn build(
    request: &BuildRequest<'_>,
    source: &dyn HistoricalQuoteSource,
    calendar: &dyn TradingCalendar,
) -> Result<BarFrame, FetchError> {
    let mut staging = BarFrame::default();
    for code in request.codes {
        let name = request.names.get(code).cloned().ok_or_else(|| {
            FetchError::Lookup(format!("no instrument name resolved for {code}"))
        })?;
        build_code(code, &name, request, source, calendar, &mut staging)?;
    }
    Ok(staging)
}

fn build_code(
    code: &str,
    name: &str,
    request: &BuildRequest<'_>,
    source: &dyn HistoricalQuoteSource,
    calendar: &dyn TradingCalendar,
    staging: &mut BarFrame,
) -> Result<(), FetchError> {
    let mut ticks = source.fetch_minute_candles(&MinuteQuery {
        code: code.to_string(),
        period_minutes: request.period_minutes,
        start: request.start,
        end: request.end,
    })?;
    if ticks.is_empty() {
        return Err(FetchError::DataUnavailable(format!(
            "no {}min candles for {code}",
            request.period_minutes
        )));
    }
    ticks.sort_by_key(|tick| tick.day_time);

    let first_day = ticks[0].day_time.date();
    let last_day = ticks[ticks.len() - 1].day_time.date();
    let start = match request.resume_after {
        Some(resume) => match calendar.next_trading_date(resume.date()) {
            Some(next) => next,
            None => return Ok(()),
        },
        None => first_day,
    };
    if start > last_day {
        return Ok(());
    }

    let pre_start = calendar.previous_trading_date(start).unwrap_or(start);
    let daily = source.fetch_daily_candles(&DailyQuery {
        code: code.to_string(),
        start: pre_start,
        end: last_day,
    })?;
    let daily_close: BTreeMap<NaiveDate, f64> =
        daily.iter().map(|bar| (bar.trade_date, bar.close)).collect();

    let mut bucket: Option<DayBucket> = None;
    for tick in ticks.iter().filter(|tick| tick.day_time.date() >= start) {
        let day = tick.day_time.date();
        if !calendar.is_trading_date(day) {
            continue;
        }
        if bucket.as_ref().map_or(true, |state| state.day != day) {
            let day_open = daily_close.get(&day).copied().ok_or_else(|| {
                FetchError::DataUnavailable(format!("no daily candle for {code} on {day}"))
            })?;
            bucket = Some(DayBucket::new(day, day_open));
        }
        if let Some(state) = bucket.as_mut() {
            staging.insert(state.snapshot(code, name, tick));
        }
    }

    Ok(())
}

/// Running close-based extrema for one calendar day.
struct DayBucket {
    day: NaiveDate,
    day_open: f64,
    day_high: f64,
    day_low: f64,
}

impl DayBucket {
    fn new(day: NaiveDate, day_open: f64) -> Self {
        Self {
            day,
            day_open,
            day_high: f64::NEG_INFINITY,
            day_low: f64::INFINITY,
        }
    }

    fn snapshot(&mut self, code: &str, name: &str, tick: &Tick) -> OhlcSnapshot {
        self.day_high = self.day_high.max(tick.close);
        self.day_low = self.day_low.min(tick.close);
        OhlcSnapshot {
            code: code.to_string(),
            name: name.to_string(),
            day_time: tick.day_time,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            day_open: self.day_open,
            day_high: self.day_high,
            day_low: self.day_low,
            last_close: tick.last_close,
            volume: tick.volume,
            amount: tick.amount,
            turnover: tick.turnover,
        }
    }
}
