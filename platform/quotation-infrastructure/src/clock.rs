use chrono::{Local, NaiveDateTime};
use quotation_domain::repositories::clock::Clock;

/// Local wall clock; the session schedule is expressed in exchange-local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
