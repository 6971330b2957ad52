use crate::value_objects::snapshot::CrossSection;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const EVT_START: &str = "evt_start";
pub const EVT_MORNING_START: &str = "evt_morning_start";
pub const EVT_MORNING_END: &str = "evt_morning_end";
pub const EVT_NOON_START: &str = "evt_noon_start";
pub const EVT_NOON_END: &str = "evt_noon_end";
pub const EVT_QUOTATION: &str = "evt_quotation";
pub const EVT_END: &str = "evt_end";

/// The four intraday session boundaries, in the order they fire within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBoundary {
    MorningStart,
    MorningEnd,
    NoonStart,
    NoonEnd,
}

impl SessionBoundary {
    pub const ALL: [SessionBoundary; 4] = [
        SessionBoundary::MorningStart,
        SessionBoundary::MorningEnd,
        SessionBoundary::NoonStart,
        SessionBoundary::NoonEnd,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            SessionBoundary::MorningStart => EVT_MORNING_START,
            SessionBoundary::MorningEnd => EVT_MORNING_END,
            SessionBoundary::NoonStart => EVT_NOON_START,
            SessionBoundary::NoonEnd => EVT_NOON_END,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWindowPayload {
    pub frequency: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionPayload {
    pub frequency: String,
    pub trade_date: NaiveDate,
    pub day_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotationPayload {
    pub frequency: String,
    pub trade_date: NaiveDate,
    pub day_time: NaiveDateTime,
    pub list: CrossSection,
}

/// One event handed to the polling consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteEvent {
    Start(RunWindowPayload),
    Session(SessionBoundary, SessionPayload),
    Quotation(QuotationPayload),
    End(RunWindowPayload),
}

impl QuoteEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            QuoteEvent::Start(_) => EVT_START,
            QuoteEvent::Session(boundary, _) => boundary.event_name(),
            QuoteEvent::Quotation(_) => EVT_QUOTATION,
            QuoteEvent::End(_) => EVT_END,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let payload = match self {
            QuoteEvent::Start(payload) | QuoteEvent::End(payload) => serde_json::to_value(payload),
            QuoteEvent::Session(_, payload) => serde_json::to_value(payload),
            QuoteEvent::Quotation(payload) => serde_json::to_value(payload),
        }
        .unwrap_or(serde_json::Value::Null);
        serde_json::json!({
            "event": self.kind(),
            "payload": payload,
        })
    }
}
