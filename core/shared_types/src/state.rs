use crate::{Intent, RiskLevel, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Ring buffers in conversation state keep at most this many entries.
pub const HISTORY_CAP: usize = 20;

/// The window over which `last_risk_level` is the maximum observed.
pub const RISK_WINDOW: usize = 3;

/// Per-session rolling metrics used to skip expensive classification work.
/// Mutated only by the orchestrator, under the per-session lock.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConversationState {
    pub session_id: SessionId,
    pub message_count: u64,
    pub messages_since_last_full_assessment: u32,
    pub last_risk_level: Option<RiskLevel>,
    pub last_intent: Option<Intent>,
    pub risk_history: VecDeque<RiskLevel>,
    pub intent_history: VecDeque<Intent>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub last_updated: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            message_count: 0,
            messages_since_last_full_assessment: 0,
            last_risk_level: None,
            last_intent: None,
            risk_history: VecDeque::new(),
            intent_history: VecDeque::new(),
            cache_hits: 0,
            cache_misses: 0,
            last_updated: Utc::now(),
        }
    }

    /// Merge a turn's outcome. Counters only ever grow; histories are capped.
    pub fn apply(&mut self, delta: &StateDelta) {
        self.message_count += 1;
        if delta.full_assessment {
            self.messages_since_last_full_assessment = 0;
        } else {
            self.messages_since_last_full_assessment =
                self.messages_since_last_full_assessment.saturating_add(1);
        }

        if let Some(risk) = delta.risk {
            push_capped(&mut self.risk_history, risk);
            // The reported level is the max over the recent window, so a
            // momentary spike is not forgotten by the very next message.
            self.last_risk_level = self
                .risk_history
                .iter()
                .rev()
                .take(RISK_WINDOW)
                .max()
                .copied();
        }

        if let Some(intent) = &delta.intent {
            push_capped(&mut self.intent_history, intent.clone());
            self.last_intent = Some(intent.clone());
        }

        if delta.cache_hit {
            self.cache_hits += 1;
        }
        if delta.cache_miss {
            self.cache_misses += 1;
        }
        self.last_updated = Utc::now();
    }

    /// True when the most recent `n` intents exist and are all identical.
    pub fn last_intents_identical(&self, n: usize) -> bool {
        if self.intent_history.len() < n {
            return false;
        }
        let mut recent = self.intent_history.iter().rev().take(n);
        let first = match recent.next() {
            Some(i) => i,
            None => return false,
        };
        recent.all(|i| i == first)
    }
}

fn push_capped<T>(buf: &mut VecDeque<T>, value: T) {
    if buf.len() == HISTORY_CAP {
        buf.pop_front();
    }
    buf.push_back(value);
}

/// Outcome of one turn, folded into `ConversationState`.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub risk: Option<RiskLevel>,
    pub intent: Option<Intent>,
    /// Whether a full (tier-2) classification ran this turn.
    pub full_assessment: bool,
    pub cache_hit: bool,
    pub cache_miss: bool,
}
