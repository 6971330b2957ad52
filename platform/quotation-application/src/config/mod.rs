use crate::quotation::QuoteOptions;
use chrono::{NaiveDate, NaiveTime};
use quotation_domain::services::session::SessionSchedule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Backtest,
    Realtime,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct QuotationConfig {
    pub engine: EngineConfig,
    pub session: Option<SessionConfig>,
    pub calendar: Option<CalendarConfig>,
    pub data: DataConfig,
    pub live: Option<LiveConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub mode: EngineMode,
    pub frequency: String,
    #[serde(default)]
    pub codes: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub morning_open: String,
    pub morning_close: String,
    pub noon_open: String,
    pub noon_close: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CalendarConfig {
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub minute_dir: String,
    pub daily_dir: String,
    pub instruments_csv: String,
    pub quotes_csv: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LiveConfig {
    pub poll_interval_ms: Option<u64>,
}

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

impl QuotationConfig {
    pub fn options(&self) -> QuoteOptions {
        QuoteOptions {
            frequency: self.engine.frequency.clone(),
            codes: self.engine.codes.clone(),
            start_date: self.engine.start_date,
            end_date: self.engine.end_date,
        }
    }

    pub fn schedule(&self) -> Result<SessionSchedule, String> {
        let Some(session) = &self.session else {
            return Ok(SessionSchedule::default());
        };
        SessionSchedule::new(
            parse_clock_time(&session.morning_open)?,
            parse_clock_time(&session.morning_close)?,
            parse_clock_time(&session.noon_open)?,
            parse_clock_time(&session.noon_close)?,
        )
    }

    pub fn holidays(&self) -> Vec<NaiveDate> {
        self.calendar
            .as_ref()
            .map(|calendar| calendar.holidays.clone())
            .unwrap_or_default()
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.live
            .as_ref()
            .and_then(|live| live.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }
}

fn parse_clock_time(value: &str) -> Result<NaiveTime, String> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|err| format!("invalid session time {value}: {err}"))
}

pub fn load_config(path: &Path) -> Result<QuotationConfig, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(QuotationConfig, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}
