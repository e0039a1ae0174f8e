//! Aika core: the multi-agent orchestrator behind the mental-health support
//! assistant.
//!
//! This crate is a library; the transport layer (HTTP/WS, auth) embeds it
//! and calls [`Orchestrator::submit_turn`]. Every process-wide resource —
//! the KV service, the conversation-state store, the rate limiter and the
//! event buffer — lives inside one [`Orchestrator`] value with explicit
//! construction and [`Orchestrator::shutdown`].

pub mod assessment_cache;
pub mod config_service;
pub mod controller;
pub mod errors;
pub mod events;
pub mod kv_service;
pub mod llm_client;
pub mod rate_limiter;
pub mod redaction;
pub mod state_store;
pub mod store;
pub mod tools;

use assessment_cache::AssessmentCache;
use events::EventSink;
use kv_service::KvStore;
use rate_limiter::RateLimiter;
use redaction::Redactor;
use safety_triage_agent::SafetyTriageAgent;
use service_desk_agent::ServiceDeskAgent;
use shared_types::{
    AikaConfig, ChatModel, ConversationState, EventSinkHealth, SessionId, StructuredModel,
};
use state_store::ConversationStateStore;
use std::sync::Arc;
use std::time::Duration;
use store::SqlStore;
use support_coach_agent::SupportCoachAgent;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub use controller::FALLBACK_REPLY;
pub use errors::CoreError;

/// How many events the sink buffers before evicting low-priority records.
const EVENT_BUFFER_CAPACITY: usize = 1024;

/// Cadence of the idle-session sweep.
const PURGE_INTERVAL_SECS: u64 = 60;

pub struct Orchestrator {
    pub(crate) config: Arc<AikaConfig>,
    pub(crate) redactor: Arc<Redactor>,
    pub(crate) state_store: Arc<ConversationStateStore>,
    pub(crate) assessment_cache: Arc<AssessmentCache>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) model: Arc<dyn ChatModel>,
    pub(crate) structured: Arc<dyn StructuredModel>,
    pub(crate) sta: SafetyTriageAgent,
    pub(crate) sca: SupportCoachAgent,
    pub(crate) sda: ServiceDeskAgent,
    pub(crate) store: Arc<SqlStore>,
    pub(crate) events: EventSink,
    flusher: Mutex<Option<JoinHandle<()>>>,
    purge_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build a worker against the configured LLM provider. Must run inside
    /// a Tokio runtime: the event flusher and the idle sweep are spawned
    /// here.
    pub fn new(config: AikaConfig) -> Result<Arc<Self>, CoreError> {
        let client = Arc::new(llm_client::HttpLlmClient::new(config.llm.clone()));
        Self::with_models(config, client.clone(), client)
    }

    /// Build a worker with injected model seams. Tests use scripted fakes
    /// here; production goes through [`Orchestrator::new`].
    pub fn with_models(
        config: AikaConfig,
        model: Arc<dyn ChatModel>,
        structured: Arc<dyn StructuredModel>,
    ) -> Result<Arc<Self>, CoreError> {
        // Manifest and dispatcher must agree before the first turn.
        tools::self_check().map_err(CoreError::Internal)?;

        let redactor = Arc::new(
            Redactor::new(config.redaction_salt.clone())
                .map_err(|e| CoreError::Internal(e.to_string()))?,
        );

        let kv = KvStore::new(config.redis.as_ref());
        let state_store = Arc::new(ConversationStateStore::new(
            kv.clone(),
            config.session_idle_ttl_seconds,
            config.skip_classification,
        ));
        let assessment_cache = Arc::new(AssessmentCache::new(
            kv.clone(),
            config.sta_cache_ttl_seconds,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(kv, config.rate_limits.clone()));

        let store =
            SqlStore::new(&config.database.sqlite_path).map_err(CoreError::ExternalUnavailable)?;
        let (events, flusher) = EventSink::new(store.clone(), EVENT_BUFFER_CAPACITY);

        let sta = SafetyTriageAgent::new(config.triage);
        let sca = SupportCoachAgent::new();
        let sda = ServiceDeskAgent::new(config.sla);

        let orchestrator = Arc::new(Self {
            config: Arc::new(config),
            redactor,
            state_store: state_store.clone(),
            assessment_cache,
            rate_limiter,
            model,
            structured,
            sta,
            sca,
            sda,
            store,
            events,
            flusher: Mutex::new(Some(flusher)),
            purge_task: Mutex::new(None),
        });

        let purge = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(PURGE_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                state_store.purge_idle();
            }
        });
        if let Ok(mut slot) = orchestrator.purge_task.try_lock() {
            *slot = Some(purge);
        }

        Ok(orchestrator)
    }

    /// Read-only snapshot of a session's rolling metrics.
    pub async fn get_session_state(&self, session_id: &SessionId) -> ConversationState {
        self.state_store.load(session_id).await
    }

    /// Event sink counters for the transport's health endpoint.
    pub fn event_health(&self) -> EventSinkHealth {
        self.events.health()
    }

    /// Storage handle, used by the transport for seeding reference data
    /// (counsellors, profiles, consent) and by maintenance jobs.
    pub fn store(&self) -> Arc<SqlStore> {
        self.store.clone()
    }

    /// Drain buffered events and stop background tasks. Call once during
    /// worker teardown.
    pub async fn shutdown(&self) {
        if let Some(purge) = self.purge_task.lock().await.take() {
            purge.abort();
        }
        self.events.shutdown();
        if let Some(flusher) = self.flusher.lock().await.take() {
            let _ = flusher.await;
        }
    }
}
