pub mod calendar;
pub mod clock;
pub mod instruments;
pub mod market_data;
pub mod market_stream;

#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    DataUnavailable(String),
    Lookup(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::DataUnavailable(msg) => write!(f, "data unavailable: {msg}"),
            FetchError::Lookup(msg) => write!(f, "lookup failed: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}
