use crate::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of audit events appended during a turn.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ConsentChange,
    RiskAssessed,
    ToolCalled,
    PlanCreated,
    CaseCreated,
    CaseAssigned,
    RateLimited,
    CacheHit,
    CacheMiss,
    ExternalDegraded,
    TurnTimeout,
    InputInvalid,
    InternalError,
}

/// Drop priority under buffer backpressure. Low-priority events are evicted
/// before anything else; safety-relevant kinds are kept as long as possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Low,
    Normal,
    High,
}

impl EventKind {
    pub fn priority(self) -> EventPriority {
        match self {
            EventKind::CacheHit | EventKind::CacheMiss => EventPriority::Low,
            EventKind::ToolCalled | EventKind::RateLimited | EventKind::InputInvalid => {
                EventPriority::Normal
            }
            EventKind::ConsentChange
            | EventKind::RiskAssessed
            | EventKind::PlanCreated
            | EventKind::CaseCreated
            | EventKind::CaseAssigned
            | EventKind::ExternalDegraded
            | EventKind::TurnTimeout
            | EventKind::InternalError => EventPriority::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ConsentChange => "consent_change",
            EventKind::RiskAssessed => "risk_assessed",
            EventKind::ToolCalled => "tool_called",
            EventKind::PlanCreated => "plan_created",
            EventKind::CaseCreated => "case_created",
            EventKind::CaseAssigned => "case_assigned",
            EventKind::RateLimited => "rate_limited",
            EventKind::CacheHit => "cache_hit",
            EventKind::CacheMiss => "cache_miss",
            EventKind::ExternalDegraded => "external_degraded",
            EventKind::TurnTimeout => "turn_timeout",
            EventKind::InputInvalid => "input_invalid",
            EventKind::InternalError => "internal_error",
        }
    }
}

/// One append-only audit record. The payload must already be redacted; the
/// sink never sees raw text.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub kind: EventKind,
    pub session_id: Option<SessionId>,
    pub user_hash: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Monotonic tiebreaker so events within one turn have a total order even
    /// when wall-clock timestamps collide.
    pub seq: u64,
}

impl EventRecord {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            session_id: None,
            user_hash: None,
            payload,
            created_at: Utc::now(),
            seq: 0,
        }
    }

    pub fn for_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn for_user_hash(mut self, user_hash: impl Into<String>) -> Self {
        self.user_hash = Some(user_hash.into());
        self
    }
}

/// Counters exposed through the transport's health endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default)]
pub struct EventSinkHealth {
    pub buffered: u64,
    pub flushed: u64,
    pub dropped_low: u64,
    pub dropped_high: u64,
    pub flush_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_events_are_lowest_priority() {
        assert_eq!(EventKind::CacheHit.priority(), EventPriority::Low);
        assert_eq!(EventKind::CacheMiss.priority(), EventPriority::Low);
        assert!(EventKind::RiskAssessed.priority() > EventKind::CacheHit.priority());
        assert!(EventKind::ToolCalled.priority() > EventKind::CacheMiss.priority());
    }

    #[test]
    fn builder_attaches_session_and_user_hash() {
        let ev = EventRecord::new(EventKind::CaseCreated, json!({"severity": "high"}))
            .for_session("sess-9")
            .for_user_hash("ab12cd34ef56ab78");
        assert_eq!(ev.session_id.as_deref(), Some("sess-9"));
        assert_eq!(ev.user_hash.as_deref(), Some("ab12cd34ef56ab78"));
        assert_eq!(ev.kind, EventKind::CaseCreated);
    }

    #[test]
    fn kind_strings_are_snake_case() {
        assert_eq!(EventKind::RateLimited.as_str(), "rate_limited");
        let parsed: EventKind = serde_json::from_str("\"turn_timeout\"").unwrap();
        assert_eq!(parsed, EventKind::TurnTimeout);
    }
}
