use chrono::NaiveDate;
use quotation_domain::events::quote_event::QuoteEvent;
use quotation_domain::repositories::instruments::InstrumentLookup;
use quotation_domain::repositories::FetchError;
use quotation_domain::services::session::{DayRetention, SessionSchedule, SessionTracker};
use quotation_domain::value_objects::frequency::Frequency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod backtest;
pub mod realtime;

pub use backtest::BacktestQuotation;
pub use realtime::RealtimeQuotation;

/// Argument of [`Quotation::init`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteOptions {
    pub frequency: String,
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuotationError {
    Config(String),
    DataUnavailable(String),
    Lookup(String),
}

impl QuotationError {
    fn not_initialized() -> Self {
        QuotationError::Config("quotation engine is not initialised".to_string())
    }
}

impl std::fmt::Display for QuotationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotationError::Config(msg) => write!(f, "config: {msg}"),
            QuotationError::DataUnavailable(msg) => write!(f, "data unavailable: {msg}"),
            QuotationError::Lookup(msg) => write!(f, "instrument lookup: {msg}"),
        }
    }
}

impl std::error::Error for QuotationError {}

impl From<FetchError> for QuotationError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::DataUnavailable(msg) => QuotationError::DataUnavailable(msg),
            FetchError::Lookup(msg) => QuotationError::Lookup(msg),
        }
    }
}

/// Pull-based market event source shared by backtest replay and live polling.
pub trait Quotation {
    /// Validates `options` and registers the initial codes. On failure the engine keeps the
    /// state it had before the call.
    fn init(&mut self, options: QuoteOptions) -> Result<(), QuotationError>;

    /// Adds codes to the tracked set. Codes already tracked are ignored.
    fn add_code(&mut self, codes: &[String]) -> Result<(), QuotationError>;

    /// Returns at most one event. `None` is a normal outcome (market closed, bar not due,
    /// replay finished, transient fetch failure).
    fn get_quot(&mut self) -> Option<QuoteEvent>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub frequency: Frequency,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl EngineSettings {
    pub fn from_options(options: &QuoteOptions) -> Result<Self, QuotationError> {
        let frequency = Frequency::parse(&options.frequency).map_err(QuotationError::Config)?;
        if let (Some(start), Some(end)) = (options.start_date, options.end_date) {
            if start > end {
                return Err(QuotationError::Config(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        Ok(Self {
            frequency,
            start_date: options.start_date,
            end_date: options.end_date,
        })
    }
}

/// Per-instance mutable state shared by both engines.
#[derive(Debug, Clone)]
pub struct QuotationContext {
    settings: EngineSettings,
    codes: Vec<String>,
    names: BTreeMap<String, String>,
    session: SessionTracker,
}

impl QuotationContext {
    pub fn new(
        settings: EngineSettings,
        schedule: SessionSchedule,
        retention: DayRetention,
    ) -> Self {
        Self {
            settings,
            codes: Vec::new(),
            names: BTreeMap::new(),
            session: SessionTracker::new(schedule, retention),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn frequency_label(&self) -> &str {
        &self.settings.frequency.label
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionTracker {
        &mut self.session
    }

    /// Codes from `candidates` that are not tracked yet, de-duplicated, in input order.
    pub fn untracked(&self, candidates: &[String]) -> Vec<String> {
        let mut added: Vec<String> = Vec::new();
        for code in candidates {
            let code = code.trim();
            if code.is_empty() || self.names.contains_key(code) || added.iter().any(|c| c == code) {
                continue;
            }
            added.push(code.to_string());
        }
        added
    }

    /// Resolves names for the tracked set plus `added` without mutating the context.
    pub fn resolve_names(
        &self,
        lookup: &dyn InstrumentLookup,
        added: &[String],
    ) -> Result<BTreeMap<String, String>, QuotationError> {
        let mut all = self.codes.clone();
        all.extend(added.iter().cloned());
        let names = lookup.resolve_names(&all)?;
        if let Some(missing) = all.iter().find(|code| !names.contains_key(*code)) {
            return Err(QuotationError::Lookup(format!("unknown instrument code {missing}")));
        }
        Ok(names
            .into_iter()
            .filter(|(code, _)| all.contains(code))
            .collect())
    }

    pub fn commit(&mut self, added: Vec<String>, names: BTreeMap<String, String>) {
        self.codes.extend(added);
        self.names = names;
    }
}

fn record_event(event: &QuoteEvent) {
    metrics::counter!("quotation.events", "kind" => event.kind()).increment(1);
    tracing::debug!(event = event.kind(), "quotation event");
}

fn record_poll_failure(mode: &'static str, err: &QuotationError) {
    metrics::counter!("quotation.poll_failures", "mode" => mode).increment(1);
    tracing::warn!(mode, error = %err, "get_quot failed; returning no event");
}
