use crate::value_objects::snapshot::{CrossSection, OhlcSnapshot};
use crate::value_objects::tick::Tick;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct LiveBarReport {
    pub skipped_ticks: u64,
}

/// Realtime bar builder: folds polled quote batches into an in-progress cross-section and
/// hands it out once the aggregation interval has elapsed.
///
/// A new window carries each code's previous close forward as its `open`/`high`/`low`. The
/// very first window publishes on its first batch so consumers get a bar immediately.
#[derive(Debug, Clone)]
pub struct LiveBarBuilder {
    frequency_seconds: i64,
    previous_bar: Option<CrossSection>,
    current_bar: Option<CrossSection>,
    window_start: Option<NaiveDateTime>,
    last_publish: Option<NaiveDateTime>,
    report: LiveBarReport,
}

impl LiveBarBuilder {
    pub fn new(frequency_seconds: i64) -> Result<Self, String> {
        if frequency_seconds <= 0 {
            return Err("frequency_seconds must be > 0".to_string());
        }
        Ok(Self {
            frequency_seconds,
            previous_bar: None,
            current_bar: None,
            window_start: None,
            last_publish: None,
            report: LiveBarReport::default(),
        })
    }

    pub fn report(&self) -> &LiveBarReport {
        &self.report
    }

    pub fn current_bar(&self) -> Option<&CrossSection> {
        self.current_bar.as_ref()
    }

    pub fn window_start(&self) -> Option<NaiveDateTime> {
        self.window_start
    }

    /// Folds `ticks` into the current window and returns the bar when it is due.
    ///
    /// `instruments` maps every tracked code to its display name; ticks for other codes are
    /// skipped. The caller must [`reset`](Self::reset) after a bar is returned.
    pub fn publish_or_accumulate(
        &mut self,
        now: NaiveDateTime,
        ticks: &[Tick],
        instruments: &BTreeMap<String, String>,
    ) -> Option<CrossSection> {
        self.update(now, ticks, instruments);

        let window_start = self.window_start?;
        let elapsed = now.signed_duration_since(window_start).num_seconds();
        if elapsed >= self.frequency_seconds || self.last_publish.is_none() {
            return self.current_bar.clone();
        }
        None
    }

    /// Closes the published window: it becomes the carry-forward source of the next one.
    pub fn reset(&mut self, now: NaiveDateTime) {
        self.previous_bar = self.current_bar.take();
        self.window_start = None;
        self.last_publish = Some(now);
    }

    /// Ends the in-progress window without publishing it, e.g. at a session boundary. Its
    /// closes still seed the next window's opens. Once a bar has been published, the next
    /// window waits a full interval.
    pub fn close_window(&mut self) {
        if let Some(bar) = self.current_bar.take() {
            self.previous_bar = Some(bar);
        }
        self.window_start = None;
    }

    fn update(
        &mut self,
        now: NaiveDateTime,
        ticks: &[Tick],
        instruments: &BTreeMap<String, String>,
    ) {
        let mut bar = self.current_bar.take().unwrap_or_default();
        let opening = bar.is_empty();

        for tick in ticks {
            let Some(name) = instruments.get(&tick.code) else {
                self.report.skipped_ticks = self.report.skipped_ticks.saturating_add(1);
                continue;
            };
            match bar.get_mut(&tick.code) {
                Some(snapshot) => {
                    snapshot.apply_price(tick.close);
                    refresh_day_fields(snapshot, tick);
                }
                None => {
                    let carried = self
                        .previous_bar
                        .as_ref()
                        .and_then(|prev| prev.get(&tick.code))
                        .map(|prev| prev.close);
                    bar.insert(tick.code.clone(), seed_snapshot(tick, name, carried));
                }
            }
        }

        if bar.is_empty() {
            return;
        }
        if opening {
            self.window_start = Some(now);
        }
        self.current_bar = Some(bar);
    }
}

fn seed_snapshot(tick: &Tick, name: &str, carried_close: Option<f64>) -> OhlcSnapshot {
    let open = carried_close.unwrap_or(tick.close);
    let mut snapshot = OhlcSnapshot {
        code: tick.code.clone(),
        name: name.to_string(),
        day_time: tick.day_time,
        open,
        high: open,
        low: open,
        close: open,
        day_open: tick.open,
        day_high: tick.high,
        day_low: tick.low,
        last_close: tick.last_close,
        volume: tick.volume,
        amount: tick.amount,
        turnover: tick.turnover,
    };
    snapshot.apply_price(tick.close);
    snapshot
}

// The feed reports day-level values already aggregated, so they are overwritten as-is.
fn refresh_day_fields(snapshot: &mut OhlcSnapshot, tick: &Tick) {
    snapshot.day_high = tick.high;
    snapshot.day_low = tick.low;
    snapshot.day_time = tick.day_time;
    snapshot.volume = tick.volume;
    snapshot.amount = tick.amount;
    snapshot.turnover = tick.turnover;
}
