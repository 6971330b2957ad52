use super::{
    record_event, record_poll_failure, EngineSettings, Quotation, QuotationContext,
    QuotationError, QuoteOptions,
};
use quotation_domain::events::quote_event::{QuotationPayload, QuoteEvent};
use quotation_domain::repositories::calendar::TradingCalendar;
use quotation_domain::repositories::clock::Clock;
use quotation_domain::repositories::instruments::InstrumentLookup;
use quotation_domain::repositories::market_stream::LiveQuoteSource;
use quotation_domain::services::live_bar::LiveBarBuilder;
use quotation_domain::services::session::{DayRetention, SessionSchedule};
use tracing::info_span;

#[derive(Debug, Clone)]
struct RealtimeState {
    ctx: QuotationContext,
    live: LiveBarBuilder,
}

/// Polls a live quote feed against the wall clock. Never emits `evt_start`/`evt_end`.
pub struct RealtimeQuotation {
    feed: Box<dyn LiveQuoteSource>,
    lookup: Box<dyn InstrumentLookup>,
    calendar: Box<dyn TradingCalendar>,
    clock: Box<dyn Clock>,
    schedule: SessionSchedule,
    state: Option<RealtimeState>,
}

impl RealtimeQuotation {
    pub fn new(
        feed: Box<dyn LiveQuoteSource>,
        lookup: Box<dyn InstrumentLookup>,
        calendar: Box<dyn TradingCalendar>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            feed,
            lookup,
            calendar,
            clock,
            schedule: SessionSchedule::default(),
            state: None,
        }
    }

    pub fn with_schedule(mut self, schedule: SessionSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn codes(&self) -> &[String] {
        self.state
            .as_ref()
            .map(|state| state.ctx.codes())
            .unwrap_or(&[])
    }

    pub fn is_trading(&self) -> bool {
        self.state
            .as_ref()
            .map_or(false, |state| state.ctx.session().is_trading())
    }

    fn poll(&mut self) -> Result<Option<QuoteEvent>, QuotationError> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(QuotationError::not_initialized)?;
        let now = self.clock.now();
        let frequency = state.ctx.frequency_label().to_string();

        if let Some((boundary, payload)) =
            state
                .ctx
                .session_mut()
                .get_base_event(now, self.calendar.as_ref(), &frequency)
        {
            // A bar never spans the lunch break or the overnight gap.
            state.live.close_window();
            return Ok(Some(QuoteEvent::Session(boundary, payload)));
        }

        let session = state.ctx.session();
        let Some(trade_date) = session.trade_date().filter(|_| session.is_trading()) else {
            return Ok(None);
        };
        if state.ctx.codes().is_empty() {
            return Ok(None);
        }

        let ticks = self.feed.fetch_realtime_quotes(state.ctx.codes())?;
        if ticks.is_empty() {
            return Ok(None);
        }
        let missing: Vec<&String> = state
            .ctx
            .codes()
            .iter()
            .filter(|code| !ticks.iter().any(|tick| &tick.code == *code))
            .collect();
        if !missing.is_empty() {
            tracing::debug!(missing = ?missing, "codes absent from quote batch");
        }

        let skipped_before = state.live.report().skipped_ticks;
        let published = state
            .live
            .publish_or_accumulate(now, &ticks, state.ctx.names());
        let skipped = state.live.report().skipped_ticks - skipped_before;
        if skipped > 0 {
            metrics::counter!("quotation.live.skipped_codes").increment(skipped);
            tracing::warn!(skipped, "quotes for untracked codes skipped");
        }

        let Some(list) = published else {
            return Ok(None);
        };
        state.live.reset(now);
        Ok(Some(QuoteEvent::Quotation(QuotationPayload {
            frequency,
            trade_date,
            day_time: now,
            list,
        })))
    }
}

impl Quotation for RealtimeQuotation {
    fn init(&mut self, options: QuoteOptions) -> Result<(), QuotationError> {
        let _span = info_span!(
            "realtime_init",
            frequency = %options.frequency,
            codes = options.codes.len()
        )
        .entered();

        let settings = EngineSettings::from_options(&options)?;
        let live =
            LiveBarBuilder::new(settings.frequency.seconds).map_err(QuotationError::Config)?;
        let fresh = RealtimeState {
            ctx: QuotationContext::new(settings, self.schedule, DayRetention::CurrentOnly),
            live,
        };
        let previous = self.state.replace(fresh);
        if let Err(err) = self.add_code(&options.codes) {
            tracing::error!(error = %err, "realtime init failed");
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
        let names = state.ctx.resolve_names(self.lookup.as_ref(), &added)?;
        tracing::info!(added = ?added, tracked = names.len(), "realtime codes added");
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
                record_poll_failure("realtime", &err);
                None
            }
        }
    }
}
