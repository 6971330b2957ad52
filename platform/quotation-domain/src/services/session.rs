use crate::events::quote_event::{SessionBoundary, SessionPayload};
use crate::repositories::calendar::TradingCalendar;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

/// Wall-clock boundaries of the two daily trading sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSchedule {
    pub morning_open: NaiveTime,
    pub morning_close: NaiveTime,
    pub noon_open: NaiveTime,
    pub noon_close: NaiveTime,
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self {
            morning_open: hms(9, 30),
            morning_close: hms(11, 30),
            noon_open: hms(13, 0),
            noon_close: hms(15, 0),
        }
    }
}

impl SessionSchedule {
    pub fn new(
        morning_open: NaiveTime,
        morning_close: NaiveTime,
        noon_open: NaiveTime,
        noon_close: NaiveTime,
    ) -> Result<Self, String> {
        if !(morning_open < morning_close && morning_close <= noon_open && noon_open < noon_close)
        {
            return Err(format!(
                "session boundaries must be ordered: {morning_open} < {morning_close} <= {noon_open} < {noon_close}"
            ));
        }
        Ok(Self {
            morning_open,
            morning_close,
            noon_open,
            noon_close,
        })
    }

    /// Inclusive window in which `boundary` may fire on `date`; `None` means open-ended.
    fn window(
        &self,
        date: NaiveDate,
        boundary: SessionBoundary,
    ) -> (NaiveDateTime, Option<NaiveDateTime>) {
        let (start, end) = match boundary {
            SessionBoundary::MorningStart => (self.morning_open, Some(self.morning_close)),
            SessionBoundary::MorningEnd => (self.morning_close, Some(self.noon_open)),
            SessionBoundary::NoonStart => (self.noon_open, Some(self.noon_close)),
            SessionBoundary::NoonEnd => (self.noon_close, None),
        };
        (date.and_time(start), end.map(|t| date.and_time(t)))
    }
}

fn hms(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// How many calendar days of boundary state are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRetention {
    /// Every day observed during the run (backtest replay).
    KeepAll,
    /// Only the current day; a new date replaces the previous entry (live polling).
    CurrentOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDayStatus {
    pub is_trading_day: bool,
    pub morning_start_fired: bool,
    pub morning_end_fired: bool,
    pub noon_start_fired: bool,
    pub noon_end_fired: bool,
}

impl SessionDayStatus {
    fn new(is_trading_day: bool) -> Self {
        Self {
            is_trading_day,
            ..Self::default()
        }
    }

    pub fn fired(&self, boundary: SessionBoundary) -> bool {
        match boundary {
            SessionBoundary::MorningStart => self.morning_start_fired,
            SessionBoundary::MorningEnd => self.morning_end_fired,
            SessionBoundary::NoonStart => self.noon_start_fired,
            SessionBoundary::NoonEnd => self.noon_end_fired,
        }
    }

    fn mark(&mut self, boundary: SessionBoundary) {
        match boundary {
            SessionBoundary::MorningStart => self.morning_start_fired = true,
            SessionBoundary::MorningEnd => self.morning_end_fired = true,
            SessionBoundary::NoonStart => self.noon_start_fired = true,
            SessionBoundary::NoonEnd => self.noon_end_fired = true,
        }
    }

    fn in_session(&self) -> bool {
        (self.morning_start_fired && !self.morning_end_fired)
            || (self.noon_start_fired && !self.noon_end_fired)
    }
}

/// Per-day session state machine.
///
/// Each boundary fires at most once per day, the first time `now` lands inside its window.
/// Boundaries that were skipped (engine resumed late, clock jumped) are not replayed.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    schedule: SessionSchedule,
    retention: DayRetention,
    days: BTreeMap<NaiveDate, SessionDayStatus>,
    trade_date: Option<NaiveDate>,
}

impl SessionTracker {
    pub fn new(schedule: SessionSchedule, retention: DayRetention) -> Self {
        Self {
            schedule,
            retention,
            days: BTreeMap::new(),
            trade_date: None,
        }
    }

    pub fn schedule(&self) -> &SessionSchedule {
        &self.schedule
    }

    /// Current trading date, set once `now` has been observed on an open day.
    pub fn trade_date(&self) -> Option<NaiveDate> {
        self.trade_date
    }

    pub fn day_status(&self, date: NaiveDate) -> Option<&SessionDayStatus> {
        self.days.get(&date)
    }

    pub fn tracked_days(&self) -> usize {
        self.days.len()
    }

    pub fn get_base_event(
        &mut self,
        now: NaiveDateTime,
        calendar: &dyn TradingCalendar,
        frequency: &str,
    ) -> Option<(SessionBoundary, SessionPayload)> {
        let date = now.date();
        if !self.days.contains_key(&date) {
            self.trade_date = None;
            if self.retention == DayRetention::CurrentOnly {
                self.days.clear();
            }
            self.days
                .insert(date, SessionDayStatus::new(calendar.is_trading_date(date)));
        }

        let schedule = self.schedule;
        let status = self.days.get_mut(&date)?;
        if !status.is_trading_day {
            return None;
        }
        self.trade_date = Some(date);

        let boundary = SessionBoundary::ALL.into_iter().find(|boundary| {
            let (start, end) = schedule.window(date, *boundary);
            let inside = now >= start && end.map_or(true, |end| now <= end);
            inside && !status.fired(*boundary)
        })?;
        status.mark(boundary);

        Some((
            boundary,
            SessionPayload {
                frequency: frequency.to_string(),
                trade_date: date,
                day_time: now,
            },
        ))
    }

    pub fn is_trading(&self) -> bool {
        self.trade_date
            .and_then(|date| self.days.get(&date))
            .map_or(false, SessionDayStatus::in_session)
    }
}
