use crate::repositories::FetchError;
use crate::value_objects::tick::Tick;

pub trait LiveQuoteSource {
    /// Latest quote for each requested code the feed knows about. An empty batch means the
    /// feed had nothing to report.
    fn fetch_realtime_quotes(&mut self, codes: &[String]) -> Result<Vec<Tick>, FetchError>;
}
