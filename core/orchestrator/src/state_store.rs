//! Conversation state store: per-session rolling metrics with a
//! write-through KV copy so workers share a view of the session.
//!
//! Reads are lock-free snapshots of the in-memory map. Mutations serialize
//! through a per-session lock, and whole turns serialize through the same
//! lock family so two concurrent turns on one session cannot interleave.

use crate::kv_service::KvStore;
use dashmap::DashMap;
use safety_triage_agent::rules;
use shared_types::{
    ConversationState, RiskLevel, SessionId, SkipClassificationConfig, StateDelta,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

fn state_key(session_id: &str) -> String {
    format!("state:{session_id}")
}

pub struct ConversationStateStore {
    kv: Arc<KvStore>,
    states: DashMap<SessionId, ConversationState>,
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
    idle_ttl_seconds: u64,
    skip: SkipClassificationConfig,
}

impl ConversationStateStore {
    pub fn new(kv: Arc<KvStore>, idle_ttl_seconds: u64, skip: SkipClassificationConfig) -> Self {
        Self {
            kv,
            states: DashMap::new(),
            locks: DashMap::new(),
            idle_ttl_seconds,
            skip,
        }
    }

    /// Serialize a whole turn for one session. The second concurrent turn on
    /// the same session waits here rather than interleaving.
    pub async fn turn_guard(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Snapshot of the session state; an empty state on full miss. The store
    /// is advisory: any KV failure just produces the empty state.
    pub async fn load(&self, session_id: &str) -> ConversationState {
        if let Some(state) = self.states.get(session_id) {
            return state.clone();
        }

        if let Some(raw) = self.kv.get(&state_key(session_id)).await {
            match serde_json::from_str::<ConversationState>(&raw) {
                Ok(state) => {
                    self.states.insert(session_id.to_string(), state.clone());
                    return state;
                }
                Err(e) => debug!(error = %e, "stale conversation state ignored"),
            }
        }

        ConversationState::new(session_id)
    }

    /// Fold one turn's outcome into the state and write through to the KV.
    /// Must be called while holding the session's turn guard.
    pub async fn update(&self, session_id: &str, delta: &StateDelta) -> ConversationState {
        let mut state = self.load(session_id).await;
        state.apply(delta);
        self.states.insert(session_id.to_string(), state.clone());

        match serde_json::to_string(&state) {
            Ok(raw) => {
                self.kv
                    .set_with_expiry(&state_key(session_id), &raw, self.idle_ttl_seconds)
                    .await
            }
            Err(e) => debug!(error = %e, "conversation state serialization failed"),
        }

        state
    }

    /// All conditions of the classification shortcut must hold at once:
    /// recent full assessment, calm recent history, stable intent, a short
    /// message and no crisis vocabulary.
    pub fn should_skip_full_classification(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> bool {
        state.messages_since_last_full_assessment < self.skip.max_messages
            && matches!(
                state.last_risk_level,
                Some(RiskLevel::Low) | Some(RiskLevel::Moderate)
            )
            && state.last_intents_identical(3)
            && message.chars().count() < self.skip.max_length
            && !rules::contains_crisis_keyword(message)
    }

    /// Drop sessions idle past the TTL from the in-memory map. The KV copy
    /// carries its own expiry.
    pub fn purge_idle(&self) {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::seconds(self.idle_ttl_seconds.min(i64::MAX as u64) as i64);
        self.states.retain(|_, state| state.last_updated > cutoff);
        self.locks
            .retain(|session_id, _| self.states.contains_key(session_id));
    }

    pub fn resident_sessions(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Intent;

    fn store() -> ConversationStateStore {
        ConversationStateStore::new(
            KvStore::in_memory(),
            3600,
            SkipClassificationConfig::default(),
        )
    }

    fn calm_delta() -> StateDelta {
        StateDelta {
            risk: Some(RiskLevel::Low),
            intent: Some(Intent::GeneralSupport),
            full_assessment: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn load_creates_empty_state_on_miss() {
        let s = store();
        let state = s.load("fresh").await;
        assert_eq!(state.message_count, 0);
        assert!(state.last_risk_level.is_none());
    }

    #[tokio::test]
    async fn update_persists_and_reloads() {
        let s = store();
        s.update("sess", &calm_delta()).await;
        s.update("sess", &calm_delta()).await;
        let state = s.load("sess").await;
        assert_eq!(state.message_count, 2);
        assert_eq!(state.last_risk_level, Some(RiskLevel::Low));
    }

    #[tokio::test]
    async fn state_survives_in_kv_after_local_eviction() {
        let s = store();
        s.update("sess", &calm_delta()).await;
        s.states.clear();
        let state = s.load("sess").await;
        assert_eq!(state.message_count, 1);
    }

    #[tokio::test]
    async fn skip_requires_all_conditions() {
        let s = store();
        for _ in 0..3 {
            s.update("sess", &calm_delta()).await;
        }
        let state = s.load("sess").await;

        assert!(s.should_skip_full_classification(&state, "ok, makasih infonya"));

        // Crisis vocabulary always defeats the shortcut.
        assert!(!s.should_skip_full_classification(&state, "makasih, tapi aku pengen bunuh diri"));

        // A long message defeats it too.
        let long = "a".repeat(300);
        assert!(!s.should_skip_full_classification(&state, &long));

        // High recent risk defeats it.
        let mut risky = state.clone();
        risky.last_risk_level = Some(RiskLevel::High);
        assert!(!s.should_skip_full_classification(&risky, "ok"));

        // Too many messages since the last full assessment defeats it.
        let mut stale = state.clone();
        stale.messages_since_last_full_assessment = 10;
        assert!(!s.should_skip_full_classification(&stale, "ok"));
    }

    #[tokio::test]
    async fn fresh_sessions_never_skip() {
        let s = store();
        let state = s.load("new").await;
        assert!(!s.should_skip_full_classification(&state, "halo"));
    }

    #[tokio::test]
    async fn turn_guard_serializes_same_session() {
        let s = Arc::new(store());
        let guard = s.turn_guard("sess").await;

        let s2 = s.clone();
        let contender = tokio::spawn(async move {
            let _g = s2.turn_guard("sess").await;
        });

        // The contender cannot finish while the guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn purge_drops_idle_sessions() {
        let s = ConversationStateStore::new(
            KvStore::in_memory(),
            0,
            SkipClassificationConfig::default(),
        );
        s.update("sess", &calm_delta()).await;
        assert_eq!(s.resident_sessions(), 1);
        s.purge_idle();
        assert_eq!(s.resident_sessions(), 0);
    }
}
