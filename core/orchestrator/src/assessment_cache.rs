//! Tool-result cache for low-risk triage assessments.
//!
//! Key: `assessment:{session_id}:{sha256(text)[:16]}`. Only low and moderate
//! assessments are written; anything else read back is discarded. Failures
//! are misses — the cache is never load-bearing.

use crate::kv_service::KvStore;
use async_trait::async_trait;
use chrono::Utc;
use platform::record_counter;
use safety_triage_agent::AssessmentStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::RiskAssessment;
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone)]
struct CachedAssessment {
    assessment: RiskAssessment,
    cached_at: String,
    message_length: usize,
}

pub struct AssessmentCache {
    kv: Arc<KvStore>,
    ttl_seconds: u64,
}

impl AssessmentCache {
    pub fn new(kv: Arc<KvStore>, ttl_seconds: u64) -> Self {
        Self { kv, ttl_seconds }
    }

    fn key(session_id: &str, redacted_text: &str) -> String {
        let digest = Sha256::digest(redacted_text.as_bytes());
        let hash = hex::encode(digest);
        format!("assessment:{}:{}", session_id, &hash[..16])
    }
}

#[async_trait]
impl AssessmentStore for AssessmentCache {
    async fn get(&self, session_id: &str, redacted_text: &str) -> Option<RiskAssessment> {
        let key = Self::key(session_id, redacted_text);
        let raw = self.kv.get(&key).await?;

        match serde_json::from_str::<CachedAssessment>(&raw) {
            Ok(cached) if cached.assessment.risk_level.is_cacheable() => Some(cached.assessment),
            Ok(_) => {
                // A high or critical entry should never have been written;
                // treat it as poison and drop it.
                debug!(%key, "dropping non-cacheable assessment found in cache");
                self.kv.delete(&key).await;
                None
            }
            Err(e) => {
                debug!(%key, error = %e, "cached assessment unparseable, treating as miss");
                None
            }
        }
    }

    async fn put(&self, redacted_text: &str, assessment: &RiskAssessment) {
        if !assessment.risk_level.is_cacheable() {
            return;
        }

        let entry = CachedAssessment {
            assessment: assessment.clone(),
            cached_at: Utc::now().to_rfc3339(),
            message_length: redacted_text.chars().count(),
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "assessment serialization failed, not caching");
                return;
            }
        };

        let key = Self::key(&assessment.session_id, redacted_text);
        self.kv.set_with_expiry(&key, &raw, self.ttl_seconds).await;
        record_counter("assessment_cache_writes_total", 1);
    }
}
