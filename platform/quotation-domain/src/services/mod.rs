pub mod historical_bar;
pub mod live_bar;
pub mod session;
