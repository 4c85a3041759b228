// 11.0 events.rs: risk events raised while replaying history. the backtest collects them in
// order; consumers can serialize them for audit or alerting.

use crate::types::Quote;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: EventId,
    pub date: NaiveDate,
    pub payload: RiskEventPayload,
}

impl RiskEvent {
    pub fn new(id: EventId, date: NaiveDate, payload: RiskEventPayload) -> Self {
        Self { id, date, payload }
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            RiskEventPayload::MaxDrawdownExceeded(_) => "MAX_DRAWDOWN_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskEventPayload {
    MaxDrawdownExceeded(DrawdownEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEvent {
    /// (value - initial capital) / initial capital, always below the threshold.
    pub drawdown: Decimal,
    pub threshold: Decimal,
    pub portfolio_value: Quote,
}

/// Append-only event sink with sequential ids.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<RiskEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, date: NaiveDate, payload: RiskEventPayload) -> EventId {
        let id = EventId(self.events.len() as u64);
        self.events.push(RiskEvent::new(id, date, payload));
        id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[RiskEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RiskEvent> {
        self.events
    }
}
