use super::{
    record_event, record_poll_failure, EngineSettings, Quotation, QuotationContext,
    QuotationError, QuoteOptions,
};
use chrono::NaiveDateTime;
use quotation_domain::events::quote_event::{QuotationPayload, QuoteEvent, RunWindowPayload};
use quotation_domain::repositories::calendar::TradingCalendar;
use quotation_domain::repositories::instruments::InstrumentLookup;
use quotation_domain::repositories::market_data::HistoricalQuoteSource;
use quotation_domain::services::historical_bar::{BuildRequest, HistoricalBarBuilder};
use quotation_domain::services::session::{DayRetention, SessionSchedule};
use std::time::Instant;
use tracing::info_span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPhase {
    NotStarted,
    Running,
    Exhausted,
}

#[derive(Debug, Clone)]
struct BacktestState {
    ctx: QuotationContext,
    builder: HistoricalBarBuilder,
    phase: ReplayPhase,
    /// Last timestamp returned as a quotation event.
    cursor: Option<NaiveDateTime>,
    /// Timestamp taken from the frame whose boundary events are still being drained.
    pending: Option<NaiveDateTime>,
}

impl BacktestState {
    fn window(&self) -> RunWindowPayload {
        let settings = self.ctx.settings();
        RunWindowPayload {
            frequency: settings.frequency.label.clone(),
            start: settings.start_date,
            end: settings.end_date,
        }
    }

    fn resume_point(&self) -> Option<NaiveDateTime> {
        self.pending.or(self.cursor)
    }
}

/// Replays pre-built minute history as a bounded event sequence:
/// `evt_start`, then boundary and quotation events in timestamp order, then `evt_end`.
pub struct BacktestQuotation {
    source: Box<dyn HistoricalQuoteSource>,
    lookup: Box<dyn InstrumentLookup>,
    calendar: Box<dyn TradingCalendar>,
    schedule: SessionSchedule,
    state: Option<BacktestState>,
}

impl BacktestQuotation {
    pub fn new(
        source: Box<dyn HistoricalQuoteSource>,
        lookup: Box<dyn InstrumentLookup>,
        calendar: Box<dyn TradingCalendar>,
    ) -> Self {
        Self {
            source,
            lookup,
            calendar,
            schedule: SessionSchedule::default(),
            state: None,
        }
    }

    pub fn with_schedule(mut self, schedule: SessionSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn phase(&self) -> Option<ReplayPhase> {
        self.state.as_ref().map(|state| state.phase)
    }

    pub fn codes(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|state| state.ctx.codes())
            .unwrap_or(&[])
    }

    /// Number of distinct timestamps materialized for replay.
    pub fn frame_len(&self) -> usize {
        self.state
            .as_ref()
            .map(|state| state.builder.frame().len())
            .unwrap_or(0)
    }

    fn poll(&mut self) -> Result<Option<QuoteEvent>, QuotationError> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(QuotationError::not_initialized)?;

        match state.phase {
            ReplayPhase::NotStarted => {
                state.phase = ReplayPhase::Running;
                return Ok(Some(QuoteEvent::Start(state.window())));
            }
            ReplayPhase::Exhausted => return Ok(None),
            ReplayPhase::Running => {}
        }

        let timestamp = match state.pending {
            Some(timestamp) => timestamp,
            None => match state.builder.frame().next_after(state.cursor) {
                Some(timestamp) => {
                    state.pending = Some(timestamp);
                    timestamp
                }
                None => {
                    state.phase = ReplayPhase::Exhausted;
                    return Ok(Some(QuoteEvent::End(state.window())));
                }
            },
        };

        let frequency = state.ctx.frequency_label().to_string();
        if let Some((boundary, payload)) =
            state
                .ctx
                .session_mut()
                .get_base_event(timestamp, self.calendar.as_ref(), &frequency)
        {
            return Ok(Some(QuoteEvent::Session(boundary, payload)));
        }

        let list = state
            .builder
            .frame()
            .get(&timestamp)
            .cloned()
            .ok_or_else(|| {
                QuotationError::DataUnavailable(format!("replay frame lost timestamp {timestamp}"))
            })?;
        state.cursor = Some(timestamp);
        state.pending = None;

        Ok(Some(QuoteEvent::Quotation(QuotationPayload {
            frequency,
            trade_date: timestamp.date(),
            day_time: timestamp,
            list,
        })))
    }
}

impl Quotation for BacktestQuotation {
    fn init(&mut self, options: QuoteOptions) -> Result<(), QuotationError> {
        let _span = info_span!(
            "backtest_init",
            frequency = %options.frequency,
            codes = options.codes.len()
        )
        .entered();

        let settings = EngineSettings::from_options(&options)?;
        if settings.frequency.whole_minutes().is_none() {
            return Err(QuotationError::Config(format!(
                "backtest frequency must be a whole number of minutes: {}",
                options.frequency
            )));
        }

        let fresh = BacktestState {
            ctx: QuotationContext::new(settings, self.schedule, DayRetention::KeepAll),
            builder: HistoricalBarBuilder::new(),
            phase: ReplayPhase::NotStarted,
            cursor: None,
            pending: None,
        };
        let previous = self.state.replace(fresh);
        if let Err(err) = self.add_code(&options.codes) {
            tracing::error!(error = %err, "backtest init failed");
            self.state = previous;
            return Err(err);
        }
        Ok(())
    }

    fn add_code(&mut self, codes: &[String]) -> Result<(), QuotationError> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(QuotationError::not_initialized)?;
        let added = state.ctx.untracked(codes);
        if added.is_empty() {
            return Ok(());
        }
        let _span = info_span!("backtest_add_code", added = ?added).entered();

        let names = state.ctx.resolve_names(self.lookup.as_ref(), &added)?;
        let settings = state.ctx.settings();
        let request = BuildRequest {
            codes: &added,
            names: &names,
            period_minutes: settings.frequency.whole_minutes().unwrap_or(1),
            start: settings.start_date,
            end: settings.end_date,
            resume_after: state.resume_point(),
        };

        let started = Instant::now();
        let new_timestamps = state
            .builder
            .extend(&request, self.source.as_ref(), self.calendar.as_ref())
            .map_err(|err| {
                tracing::error!(error = %err, "historical bar build failed");
                QuotationError::from(err)
            })?;
        metrics::histogram!("quotation.build_ms").record(started.elapsed().as_millis() as f64);
        metrics::gauge!("quotation.frame_timestamps").set(state.builder.frame().len() as f64);
        tracing::info!(
            new_timestamps,
            total_timestamps = state.builder.frame().len(),
            "historical frame extended"
        );

        state.ctx.commit(added, names);
        Ok(())
    }

    fn get_quot(&mut self) -> Option<QuoteEvent> {
        match self.poll() {
            Ok(event) => {
                if let Some(event) = event.as_ref() {
                    record_event(event);
                }
                event
            }
            Err(err) => {
                record_poll_failure("backtest", &err);
                None
            }
        }
    }
}
