use chrono::{Days, NaiveDate};

/// Longest stretch of closed days searched before giving up.
const MAX_SEARCH_DAYS: u64 = 366;

pub trait TradingCalendar {
    fn is_trading_date(&self, date: NaiveDate) -> bool;

    /// Closest trading date strictly before `date`.
    fn previous_trading_date(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=MAX_SEARCH_DAYS)
            .filter_map(|offset| date.checked_sub_days(Days::new(offset)))
            .find(|candidate| self.is_trading_date(*candidate))
    }

    /// Closest trading date strictly after `date`.
    fn next_trading_date(&self, date: NaiveDate) -> Option<NaiveDate> {
        (1..=MAX_SEARCH_DAYS)
            .filter_map(|offset| date.checked_add_days(Days::new(offset)))
            .find(|candidate| self.is_trading_date(*candidate))
    }
}

impl<F> TradingCalendar for F
where
    F: Fn(NaiveDate) -> bool,
{
    fn is_trading_date(&self, date: NaiveDate) -> bool {
        self(date)
    }
}
