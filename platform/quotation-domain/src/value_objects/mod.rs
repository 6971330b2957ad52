pub mod daily_bar;
pub mod frequency;
pub mod snapshot;
pub mod tick;
