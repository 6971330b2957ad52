use chrono::NaiveDateTime;

/// Source of "now" for engines that follow the wall clock.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}
