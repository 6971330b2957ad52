use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use quotation_application::quotation::{
    BacktestQuotation, Quotation, QuotationError, QuoteOptions, RealtimeQuotation,
};
use quotation_domain::events::quote_event::{QuoteEvent, SessionBoundary};
use quotation_domain::repositories::clock::Clock;
use quotation_domain::repositories::instruments::InstrumentLookup;
use quotation_domain::repositories::market_data::{
    DailyQuery, HistoricalQuoteSource, MinuteQuery,
};
use quotation_domain::repositories::market_stream::LiveQuoteSource;
use quotation_domain::repositories::FetchError;
use quotation_domain::value_objects::daily_bar::DailyBar;
use quotation_domain::value_objects::tick::Tick;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

const HOURLY: [(u32, u32); 4] = [(10, 30), (11, 30), (14, 0), (15, 0)];

fn weekdays(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 12, d).unwrap()
}

fn at(d: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    day(d).and_hms_opt(hour, minute, second).unwrap()
}

fn tick(code: &str, day_time: NaiveDateTime, close: f64) -> Tick {
    Tick {
        code: code.to_string(),
        day_time,
        open: close,
        high: close + 0.2,
        low: close - 0.2,
        close,
        last_close: close,
        volume: 100.0,
        amount: 100.0 * close,
        turnover: 0.01,
    }
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

#[derive(Default)]
struct FakeHistory {
    minute: BTreeMap<String, Vec<Tick>>,
}

impl FakeHistory {
    /// Hourly bars for every listed day, including weekends, so the calendar has to filter.
    fn with_hourly(mut self, code: &str, days: &[u32], base: f64) -> Self {
        let mut ticks = Vec::new();
        for (i, d) in days.iter().enumerate() {
            for (j, (hour, minute)) in HOURLY.iter().enumerate() {
                let close = base + i as f64 + j as f64 * 0.1;
                ticks.push(tick(code, at(*d, *hour, *minute, 0), close));
            }
        }
        self.minute.insert(code.to_string(), ticks);
        self
    }
}

impl HistoricalQuoteSource for FakeHistory {
    fn fetch_minute_candles(&self, query: &MinuteQuery) -> Result<Vec<Tick>, FetchError> {
        let ticks = self
            .minute
            .get(&query.code)
            .ok_or_else(|| FetchError::DataUnavailable(format!("no history for {}", query.code)))?;
        Ok(ticks
            .iter()
            .filter(|t| query.start.map_or(true, |s| t.day_time.date() >= s))
            .filter(|t| query.end.map_or(true, |e| t.day_time.date() <= e))
            .cloned()
            .collect())
    }

    fn fetch_daily_candles(&self, query: &DailyQuery) -> Result<Vec<DailyBar>, FetchError> {
        Ok(query
            .start
            .iter_days()
            .take_while(|d| *d <= query.end)
            .map(|d| DailyBar {
                code: query.code.clone(),
                trade_date: d,
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 1.0,
            })
            .collect())
    }
}

#[derive(Clone, Default)]
struct FakeLookup {
    calls: Rc<RefCell<Vec<Vec<String>>>>,
}

impl InstrumentLookup for FakeLookup {
    fn resolve_names(&self, codes: &[String]) -> Result<BTreeMap<String, String>, FetchError> {
        self.calls.borrow_mut().push(codes.to_vec());
        Ok(codes
            .iter()
            .filter(|c| c.as_str() != "xx999999")
            .map(|c| (c.clone(), format!("name-{c}")))
            .collect())
    }
}

fn backtest(history: FakeHistory) -> BacktestQuotation {
    BacktestQuotation::new(
        Box::new(history),
        Box::new(FakeLookup::default()),
        Box::new(weekdays),
    )
}

fn drain(engine: &mut BacktestQuotation) -> Vec<QuoteEvent> {
    let mut events = Vec::new();
    for _ in 0..10_000 {
        match engine.get_quot() {
            Some(event) => {
                let done = matches!(event, QuoteEvent::End(_));
                events.push(event);
                if done {
                    break;
                }
            }
            None => break,
        }
    }
    events
}

fn quotation_times(events: &[QuoteEvent]) -> Vec<NaiveDateTime> {
    events
        .iter()
        .filter_map(|event| match event {
            QuoteEvent::Quotation(payload) => Some(payload.day_time),
            _ => None,
        })
        .collect()
}

fn backtest_options(list: &[&str], start: u32, end: u32) -> QuoteOptions {
    QuoteOptions {
        frequency: "60min".to_string(),
        codes: codes(list),
        start_date: Some(day(start)),
        end_date: Some(day(end)),
    }
}

#[test]
fn backtest_emits_start_first_end_last_and_ordered_quotations() {
    let history = FakeHistory::default()
        .with_hourly("sz000001", &[1, 2], 10.0)
        .with_hourly("sh601099", &[1, 2], 5.0);
    let mut engine = backtest(history);
    engine
        .init(backtest_options(&["sz000001", "sh601099"], 1, 2))
        .expect("init");

    let events = drain(&mut engine);
    assert!(matches!(events.first(), Some(QuoteEvent::Start(_))));
    assert!(matches!(events.last(), Some(QuoteEvent::End(_))));
    assert_eq!(events.iter().filter(|e| e.kind() == "evt_start").count(), 1);
    assert_eq!(events.iter().filter(|e| e.kind() == "evt_end").count(), 1);

    let times = quotation_times(&events);
    assert_eq!(times.len(), 8);
    assert!(times.windows(2).all(|w| w[0] < w[1]));

    let kinds: Vec<&str> = events.iter().take(5).map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "evt_start",
            "evt_morning_start",
            "evt_quotation",
            "evt_morning_end",
            "evt_quotation",
        ]
    );

    for event in &events {
        if let QuoteEvent::Quotation(payload) = event {
            assert_eq!(payload.list.len(), 2);
            assert_eq!(payload.trade_date, payload.day_time.date());
            assert_eq!(payload.frequency, "60min");
        }
    }

    assert!(engine.get_quot().is_none());
    assert!(engine.get_quot().is_none());
}

#[test]
fn boundary_events_precede_quotation_for_same_timestamp() {
    let history = FakeHistory::default().with_hourly("sz000001", &[1], 10.0);
    let mut engine = backtest(history);
    engine
        .init(backtest_options(&["sz000001"], 1, 1))
        .expect("init");

    let events = drain(&mut engine);
    let mut seen_boundaries: Vec<SessionBoundary> = Vec::new();
    for event in &events {
        match event {
            QuoteEvent::Session(boundary, payload) => {
                seen_boundaries.push(*boundary);
                assert_eq!(payload.trade_date, day(1));
            }
            QuoteEvent::Quotation(payload) if payload.day_time == at(1, 14, 0, 0) => {
                assert!(seen_boundaries.contains(&SessionBoundary::NoonStart));
            }
            _ => {}
        }
    }
    assert_eq!(seen_boundaries, SessionBoundary::ALL.to_vec());
}

#[test]
fn weekend_days_are_skipped_in_replay() {
    // 2020-12-04 is a Friday; 12-05/12-06 are a weekend.
    let history = FakeHistory::default().with_hourly("sz000001", &[4, 5, 6, 7], 10.0);
    let mut engine = backtest(history);
    engine
        .init(backtest_options(&["sz000001"], 4, 7))
        .expect("init");
    assert_eq!(engine.frame_len(), 8);

    let events = drain(&mut engine);
    for event in &events {
        let stamp = match event {
            QuoteEvent::Quotation(payload) => Some(payload.day_time),
            QuoteEvent::Session(_, payload) => Some(payload.day_time),
            _ => None,
        };
        if let Some(stamp) = stamp {
            assert!(weekdays(stamp.date()), "event on closed day {stamp}");
        }
    }
}

#[test]
fn add_code_mid_run_never_rewinds() {
    let history = FakeHistory::default()
        .with_hourly("sz000001", &[1, 2, 3], 10.0)
        .with_hourly("sz300076", &[1, 2, 3], 3.0);
    let mut engine = backtest(history);
    engine
        .init(backtest_options(&["sz000001"], 1, 3))
        .expect("init");

    let mut events = Vec::new();
    for _ in 0..6 {
        events.extend(engine.get_quot());
    }
    let before = quotation_times(&events);
    let last_seen = *before.last().expect("some quotations replayed");
    assert_eq!(last_seen.date(), day(1));

    engine.add_code(&codes(&["sz300076"])).expect("add code");
    events.extend(drain(&mut engine));

    let times = quotation_times(&events);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
    for event in &events {
        if let QuoteEvent::Quotation(payload) = event {
            let has_new = payload.list.contains_key("sz300076");
            assert_eq!(has_new, payload.day_time.date() > day(1));
        }
    }
}

#[test]
fn failed_add_code_keeps_engine_usable() {
    let history = FakeHistory::default().with_hourly("sz000001", &[1], 10.0);
    let mut engine = backtest(history);
    engine
        .init(backtest_options(&["sz000001"], 1, 1))
        .expect("init");

    let err = engine
        .add_code(&codes(&["sh600000"]))
        .expect_err("history missing");
    assert!(matches!(err, QuotationError::DataUnavailable(_)));
    let err = engine
        .add_code(&codes(&["xx999999"]))
        .expect_err("unknown name");
    assert!(matches!(err, QuotationError::Lookup(_)));
    assert_eq!(engine.codes(), codes(&["sz000001"]).as_slice());

    let events = drain(&mut engine);
    let times = quotation_times(&events);
    assert_eq!(times.len(), 4);
    for event in &events {
        if let QuoteEvent::Quotation(payload) = event {
            assert_eq!(payload.list.keys().collect::<Vec<_>>(), vec!["sz000001"]);
        }
    }
}

#[test]
fn duplicate_codes_are_tracked_once() {
    let history = FakeHistory::default().with_hourly("sz000001", &[1], 10.0);
    let lookup = FakeLookup::default();
    let calls = lookup.calls.clone();
    let mut engine =
        BacktestQuotation::new(Box::new(history), Box::new(lookup), Box::new(weekdays));
    engine
        .init(backtest_options(&["sz000001", "sz000001"], 1, 1))
        .expect("init");
    engine.add_code(&codes(&["sz000001"])).expect("re-add");

    assert_eq!(engine.codes(), codes(&["sz000001"]).as_slice());
    for call in calls.borrow().iter() {
        let mut sorted = call.clone();
        sorted.dedup();
        assert_eq!(&sorted, call);
    }
    assert_eq!(engine.frame_len(), 4);
}

#[test]
fn init_rejects_bad_frequency_without_touching_state() {
    let history = FakeHistory::default().with_hourly("sz000001", &[1], 10.0);
    let mut engine = backtest(history);
    engine
        .init(backtest_options(&["sz000001"], 1, 1))
        .expect("init");

    for frequency in ["60h", "0min", "-1s", "90s", "999999999999999999min"] {
        let mut options = backtest_options(&["sz000001"], 1, 1);
        options.frequency = frequency.to_string();
        let err = engine.init(options).expect_err("bad frequency");
        assert!(matches!(err, QuotationError::Config(_)), "{frequency}");
    }
    assert_eq!(engine.frame_len(), 4);

    let mut failing = backtest_options(&["sz000001", "sh600000"], 1, 1);
    failing.frequency = "30min".to_string();
    assert!(engine.init(failing).is_err());
    assert_eq!(engine.codes(), codes(&["sz000001"]).as_slice());
    assert!(matches!(
        engine.get_quot(),
        Some(QuoteEvent::Start(payload)) if payload.frequency == "60min"
    ));
}

#[test]
fn polling_before_init_yields_no_event() {
    let mut engine = backtest(FakeHistory::default());
    assert!(engine.get_quot().is_none());
    assert!(engine.add_code(&codes(&["sz000001"])).is_err());
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct FakeClock {
    now: Rc<Cell<NaiveDateTime>>,
}

impl FakeClock {
    fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    fn set(&self, now: NaiveDateTime) {
        self.now.set(now);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }
}

/// Serves the scripted price for each requested code; errors are queued explicitly.
#[derive(Clone, Default)]
struct FakeFeed {
    prices: Rc<RefCell<BTreeMap<String, f64>>>,
    failures: Rc<RefCell<VecDeque<FetchError>>>,
    clock: Option<FakeClock>,
}

impl LiveQuoteSource for FakeFeed {
    fn fetch_realtime_quotes(&mut self, codes: &[String]) -> Result<Vec<Tick>, FetchError> {
        if let Some(err) = self.failures.borrow_mut().pop_front() {
            return Err(err);
        }
        let now = self.clock.as_ref().map_or(at(9, 9, 30, 0), |c| c.now());
        let prices = self.prices.borrow();
        Ok(codes
            .iter()
            .filter_map(|code| prices.get(code).map(|price| tick(code, now, *price)))
            .collect())
    }
}

fn realtime(feed: FakeFeed, clock: FakeClock) -> RealtimeQuotation {
    RealtimeQuotation::new(
        Box::new(feed),
        Box::new(FakeLookup::default()),
        Box::new(weekdays),
        Box::new(clock),
    )
}

fn realtime_options(frequency: &str, list: &[&str]) -> QuoteOptions {
    QuoteOptions {
        frequency: frequency.to_string(),
        codes: codes(list),
        start_date: None,
        end_date: None,
    }
}

#[test]
fn realtime_bootstraps_first_bar_then_waits_for_interval() {
    let clock = FakeClock::new(at(9, 9, 29, 59));
    let feed = FakeFeed {
        clock: Some(clock.clone()),
        ..FakeFeed::default()
    };
    feed.prices.borrow_mut().insert("sh601099".to_string(), 3.0);
    let mut engine = realtime(feed.clone(), clock.clone());
    engine
        .init(realtime_options("10s", &["sh601099"]))
        .expect("init");

    assert!(engine.get_quot().is_none(), "market not open yet");
    assert!(!engine.is_trading());

    clock.set(at(9, 9, 30, 0));
    let open = engine.get_quot().expect("morning start");
    assert_eq!(open.kind(), "evt_morning_start");
    assert!(engine.is_trading());

    clock.set(at(9, 9, 30, 1));
    let payload = match engine.get_quot() {
        Some(QuoteEvent::Quotation(payload)) => payload,
        other => panic!("expected bootstrap quotation, got {other:?}"),
    };
    assert_eq!(payload.list["sh601099"].close, 3.0);
    assert_eq!(payload.trade_date, day(9));

    let mut published = Vec::new();
    for second in 2..=13 {
        clock.set(at(9, 9, 30, second));
        feed.prices
            .borrow_mut()
            .insert("sh601099".to_string(), 3.0 + second as f64 * 0.01);
        if let Some(QuoteEvent::Quotation(payload)) = engine.get_quot() {
            published.push((second, payload));
        }
    }
    assert_eq!(published.len(), 1);
    let (second, payload) = &published[0];
    assert_eq!(*second, 12);
    let snap = &payload.list["sh601099"];
    assert_eq!(snap.open, 3.0);
    assert!((snap.close - 3.12).abs() < 1e-9);
    assert!(snap.high >= snap.close && snap.low <= snap.open);
}

#[test]
fn realtime_add_code_after_empty_init() {
    let clock = FakeClock::new(at(9, 10, 0, 0));
    let feed = FakeFeed {
        clock: Some(clock.clone()),
        ..FakeFeed::default()
    };
    feed.prices.borrow_mut().insert("sh600000".to_string(), 9.5);
    let mut engine = realtime(feed, clock.clone());
    engine.init(realtime_options("5s", &[])).expect("init");

    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_morning_start"));
    clock.set(at(9, 10, 0, 1));
    assert!(engine.get_quot().is_none(), "no codes tracked yet");

    engine.add_code(&codes(&["sh600000"])).expect("add code");
    engine.add_code(&codes(&["sh600000"])).expect("re-add is a no-op");
    assert_eq!(engine.codes(), codes(&["sh600000"]).as_slice());

    clock.set(at(9, 10, 0, 2));
    match engine.get_quot() {
        Some(QuoteEvent::Quotation(payload)) => {
            assert_eq!(payload.list.len(), 1);
            assert_eq!(payload.list["sh600000"].name, "name-sh600000");
        }
        other => panic!("expected quotation, got {other:?}"),
    }
}

#[test]
fn realtime_fetch_failure_degrades_to_no_event() {
    let clock = FakeClock::new(at(9, 13, 30, 0));
    let feed = FakeFeed {
        clock: Some(clock.clone()),
        ..FakeFeed::default()
    };
    feed.prices.borrow_mut().insert("sz000001".to_string(), 15.0);
    feed.failures
        .borrow_mut()
        .push_back(FetchError::DataUnavailable("socket reset".to_string()));
    let mut engine = realtime(feed, clock.clone());
    engine
        .init(realtime_options("1min", &["sz000001"]))
        .expect("init");

    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_noon_start"));
    clock.set(at(9, 13, 30, 1));
    assert!(engine.get_quot().is_none(), "transient failure swallowed");
    clock.set(at(9, 13, 30, 2));
    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_quotation"));
}

#[test]
fn realtime_is_silent_on_closed_days() {
    // 2020-12-12 is a Saturday.
    let clock = FakeClock::new(at(12, 10, 0, 0));
    let feed = FakeFeed {
        clock: Some(clock.clone()),
        ..FakeFeed::default()
    };
    feed.prices.borrow_mut().insert("sz000001".to_string(), 15.0);
    let mut engine = realtime(feed, clock.clone());
    engine
        .init(realtime_options("10s", &["sz000001"]))
        .expect("init");

    for second in 0..5 {
        clock.set(at(12, 10, 0, second));
        assert!(engine.get_quot().is_none());
    }
}

#[test]
fn realtime_rejects_unknown_unit() {
    let clock = FakeClock::new(at(9, 10, 0, 0));
    let mut engine = realtime(FakeFeed::default(), clock);
    let err = engine
        .init(realtime_options("10x", &["sz000001"]))
        .expect_err("bad unit");
    assert!(matches!(err, QuotationError::Config(_)));
    assert!(engine.codes().is_empty());
}

#[test]
fn realtime_bar_does_not_span_lunch_break() {
    let clock = FakeClock::new(at(9, 11, 29, 0));
    let feed = FakeFeed {
        clock: Some(clock.clone()),
        ..FakeFeed::default()
    };
    feed.prices.borrow_mut().insert("sh601099".to_string(), 3.0);
    let mut engine = realtime(feed.clone(), clock.clone());
    engine
        .init(realtime_options("10s", &["sh601099"]))
        .expect("init");

    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_morning_start"));
    clock.set(at(9, 11, 29, 1));
    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_quotation"));

    clock.set(at(9, 11, 29, 5));
    feed.prices.borrow_mut().insert("sh601099".to_string(), 3.05);
    assert!(engine.get_quot().is_none(), "window still open");

    clock.set(at(9, 11, 30, 0));
    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_morning_end"));
    clock.set(at(9, 11, 30, 1));
    assert!(engine.get_quot().is_none(), "lunch break");

    clock.set(at(9, 13, 0, 0));
    assert_eq!(engine.get_quot().map(|e| e.kind()), Some("evt_noon_start"));

    clock.set(at(9, 13, 0, 1));
    feed.prices.borrow_mut().insert("sh601099".to_string(), 3.2);
    assert!(
        engine.get_quot().is_none(),
        "first afternoon batch opens a fresh window"
    );

    clock.set(at(9, 13, 0, 11));
    feed.prices.borrow_mut().insert("sh601099".to_string(), 3.3);
    let payload = match engine.get_quot() {
        Some(QuoteEvent::Quotation(payload)) => payload,
        other => panic!("expected afternoon quotation, got {other:?}"),
    };
    assert_eq!(payload.day_time, at(9, 13, 0, 11));
    let snap = &payload.list["sh601099"];
    assert_eq!(snap.open, 3.05);
    assert_eq!(snap.low, 3.05);
    assert_eq!(snap.close, 3.3);
}
