use quotation_application::config::{load_config, EngineMode, QuotationConfig};
use quotation_application::quotation::{BacktestQuotation, Quotation, RealtimeQuotation};
use quotation_domain::events::quote_event::QuoteEvent;
use quotation_infrastructure::calendar::WeekdayCalendar;
use quotation_infrastructure::clock::SystemClock;
use quotation_infrastructure::instruments::CsvInstrumentLookup;
use quotation_infrastructure::market_data::CsvHistoricalSource;
use quotation_infrastructure::market_stream::CsvQuoteFeed;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info_span;

pub struct RunArgs {
    pub config_path: PathBuf,
    /// Stop after this many events; a realtime run never stops on its own.
    pub max_events: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub quotations: u64,
    pub finished: bool,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "events": self.events,
            "quotations": self.quotations,
            "finished": self.finished,
        })
    }
}

pub fn run(args: &RunArgs, out: &mut dyn Write) -> Result<RunSummary, String> {
    let config = load_config(&args.config_path)?;
    let base = args
        .config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let _span = info_span!("quotation_run", mode = ?config.engine.mode).entered();

    let mut engine = build_engine(&config, &base)?;
    engine
        .init(config.options())
        .map_err(|err| format!("engine init failed: {err}"))?;

    let poll_interval = Duration::from_millis(config.poll_interval_ms());
    match config.engine.mode {
        EngineMode::Backtest => drain_backtest(engine.as_mut(), args.max_events, out),
        EngineMode::Realtime => poll_realtime(engine.as_mut(), args.max_events, poll_interval, out),
    }
}

pub fn build_engine(config: &QuotationConfig, base: &Path) -> Result<Box<dyn Quotation>, String> {
    let schedule = config.schedule()?;
    let calendar = WeekdayCalendar::new(config.holidays());
    let lookup = CsvInstrumentLookup::new(resolve(base, &config.data.instruments_csv));

    match config.engine.mode {
        EngineMode::Backtest => {
            let source = CsvHistoricalSource::new(
                resolve(base, &config.data.minute_dir),
                resolve(base, &config.data.daily_dir),
            );
            Ok(Box::new(
                BacktestQuotation::new(Box::new(source), Box::new(lookup), Box::new(calendar))
                    .with_schedule(schedule),
            ))
        }
        EngineMode::Realtime => {
            let quotes = config
                .data
                .quotes_csv
                .as_deref()
                .ok_or_else(|| "data.quotes_csv is required in realtime mode".to_string())?;
            let feed = CsvQuoteFeed::new(resolve(base, quotes));
            Ok(Box::new(
                RealtimeQuotation::new(
                    Box::new(feed),
                    Box::new(lookup),
                    Box::new(calendar),
                    Box::new(SystemClock),
                )
                .with_schedule(schedule),
            ))
        }
    }
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn drain_backtest(
    engine: &mut dyn Quotation,
    max_events: Option<u64>,
    out: &mut dyn Write,
) -> Result<RunSummary, String> {
    let mut summary = RunSummary::default();
    while max_events.map_or(true, |max| summary.events < max) {
        // A replay only yields `None` once it is exhausted or broken.
        let Some(event) = engine.get_quot() else {
            break;
        };
        let done = matches!(event, QuoteEvent::End(_));
        emit(&event, &mut summary, out)?;
        if done {
            summary.finished = true;
            break;
        }
    }
    tracing::info!(
        events = summary.events,
        quotations = summary.quotations,
        "backtest drained"
    );
    Ok(summary)
}

fn poll_realtime(
    engine: &mut dyn Quotation,
    max_events: Option<u64>,
    poll_interval: Duration,
    out: &mut dyn Write,
) -> Result<RunSummary, String> {
    let mut summary = RunSummary::default();
    while max_events.map_or(true, |max| summary.events < max) {
        match engine.get_quot() {
            Some(event) => emit(&event, &mut summary, out)?,
            None => std::thread::sleep(poll_interval),
        }
    }
    summary.finished = true;
    Ok(summary)
}

fn emit(event: &QuoteEvent, summary: &mut RunSummary, out: &mut dyn Write) -> Result<(), String> {
    let line = serde_json::to_string(&event.to_json())
        .map_err(|err| format!("failed to serialize event: {err}"))?;
    writeln!(out, "{line}").map_err(|err| format!("failed to write event: {err}"))?;
    summary.events += 1;
    if matches!(event, QuoteEvent::Quotation(_)) {
        summary.quotations += 1;
    }
    Ok(())
}
