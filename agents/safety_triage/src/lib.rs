//! Safety Triage Agent: three-tier risk classification for one message.
//!
//! Tier 1 (keyword rules) is authoritative and cheap. Tier 3 (the assessment
//! cache) is consulted before tier 2 (the structured LLM prompt) so repeated
//! low-risk messages never pay for a model call. Fusion across tiers is
//! conservative: the final level is the maximum any tier produced, and a
//! fired handoff is never cleared.

pub mod prompt;
pub mod rules;
pub mod schema;

use async_trait::async_trait;
use platform::record_counter;
use shared_types::{
    AssessmentSource, CompletionRequest, Intent, ModelError, RiskAssessment, RiskLevel, SessionId,
    StructuredModel, TriageThresholds, TurnId,
};

pub use rules::{contains_crisis_keyword, contains_negative_affect, RuleVerdict};

pub const AGENT_NAME: &str = "safety_triage";

/// Everything the pipeline needs for one message. Text must already be
/// redacted — this crate never sees raw input.
#[derive(Debug, Clone)]
pub struct TriageInput {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub redacted_text: String,
    /// Short rolling summary of the conversation, from the state store.
    pub rolling_summary: String,
}

/// Read/write seam to the tool-result cache. Implemented by the
/// orchestrator; a `NoCache` stub exists for tests and cache-off deployments.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    /// Cached assessment for this exact message, if any. Misses and parse
    /// errors both come back as `None`.
    async fn get(&self, session_id: &str, redacted_text: &str) -> Option<RiskAssessment>;

    /// Store a cacheable assessment, keyed by the message it classified.
    /// Failures are swallowed by the implementation; caching is best-effort.
    async fn put(&self, redacted_text: &str, assessment: &RiskAssessment);
}

/// Cache disabled: every lookup misses, every store is a no-op.
pub struct NoCache;

#[async_trait]
impl AssessmentStore for NoCache {
    async fn get(&self, _session_id: &str, _redacted_text: &str) -> Option<RiskAssessment> {
        None
    }

    async fn put(&self, _redacted_text: &str, _assessment: &RiskAssessment) {}
}

/// Result of one pipeline run, with enough detail for the orchestrator to
/// emit cache and degradation events.
#[derive(Debug, Clone)]
pub struct TriageOutcome {
    pub assessment: RiskAssessment,
    pub cache_hit: bool,
    /// Whether the tier-2 model was actually consulted.
    pub tier2_ran: bool,
    /// Whether the result came from a degraded path (model outage or
    /// repeated schema failure).
    pub degraded: bool,
}

pub struct SafetyTriageAgent {
    thresholds: TriageThresholds,
}

impl SafetyTriageAgent {
    pub fn new(thresholds: TriageThresholds) -> Self {
        let thresholds = if thresholds.is_ordered() {
            thresholds
        } else {
            tracing::warn!("triage thresholds out of order, falling back to defaults");
            TriageThresholds::default()
        };
        Self { thresholds }
    }

    /// Run the full pipeline for one message.
    pub async fn assess(
        &self,
        input: &TriageInput,
        model: &dyn StructuredModel,
        cache: &dyn AssessmentStore,
    ) -> TriageOutcome {
        // Tier 1: rules decide outright or abstain.
        match rules::evaluate(&input.redacted_text) {
            RuleVerdict::Crisis => {
                record_counter("sta_tier1_crisis_total", 1);
                let assessment = RiskAssessment::new(
                    input.session_id.clone(),
                    input.turn_id,
                    RiskLevel::Critical,
                    Intent::CrisisSupport,
                    AssessmentSource::Rules,
                    "crisis keyword rule fired",
                );
                return TriageOutcome {
                    assessment,
                    cache_hit: false,
                    tier2_ran: false,
                    degraded: false,
                };
            }
            RuleVerdict::Safe => {
                record_counter("sta_tier1_safe_total", 1);
                let assessment = RiskAssessment::new(
                    input.session_id.clone(),
                    input.turn_id,
                    RiskLevel::Low,
                    Intent::GeneralSupport,
                    AssessmentSource::Rules,
                    "safe pattern rule fired",
                );
                return TriageOutcome {
                    assessment,
                    cache_hit: false,
                    tier2_ran: false,
                    degraded: false,
                };
            }
            RuleVerdict::Undecided { negative_affect } => {
                // Tier 3 before tier 2: the cache only ever holds low and
                // moderate assessments, so a hit can bypass the model. The
                // crisis-keyword guard is redundant with the Crisis arm
                // above but kept explicit as a defence against list drift.
                if !rules::contains_crisis_keyword(&input.redacted_text) {
                    if let Some(mut cached) =
                        cache.get(&input.session_id, &input.redacted_text).await
                    {
                        if cached.risk_level.is_cacheable() {
                            record_counter("sta_cache_hits_total", 1);
                            cached.turn_id = input.turn_id;
                            cached.source = AssessmentSource::Cache;
                            return TriageOutcome {
                                assessment: cached,
                                cache_hit: true,
                                tier2_ran: false,
                                degraded: false,
                            };
                        }
                    }
                }

                self.tier2(input, model, cache, negative_affect).await
            }
        }
    }

    async fn tier2(
        &self,
        input: &TriageInput,
        model: &dyn StructuredModel,
        cache: &dyn AssessmentStore,
        negative_affect: bool,
    ) -> TriageOutcome {
        record_counter("sta_tier2_calls_total", 1);

        let user = prompt::user_prompt(&input.redacted_text, &input.rolling_summary);

        let first = model
            .complete(CompletionRequest {
                system: prompt::system_prompt(),
                user: user.clone(),
                strict_json: true,
            })
            .await;

        let raw = match first {
            Ok(raw) => raw,
            Err(err) => return self.model_outage(input, negative_affect, err),
        };

        let parsed = match schema::parse_tier2(&raw) {
            Ok(parsed) => parsed,
            Err(first_err) => {
                // One retry with a stricter instruction, then safety-default.
                tracing::warn!(error = %first_err, "tier-2 schema failure, retrying once");
                record_counter("sta_schema_retries_total", 1);

                let retry = model
                    .complete(CompletionRequest {
                        system: format!("{}{}", prompt::system_prompt(), prompt::strict_retry_suffix()),
                        user,
                        strict_json: true,
                    })
                    .await;

                match retry {
                    Ok(raw) => match schema::parse_tier2(&raw) {
                        Ok(parsed) => parsed,
                        Err(second_err) => {
                            tracing::warn!(error = %second_err, "tier-2 schema failure after retry");
                            return self.schema_default(input, negative_affect);
                        }
                    },
                    Err(err) => return self.model_outage(input, negative_affect, err),
                }
            }
        };

        let level = schema::map_confidence(parsed.confidence, &self.thresholds);
        let intent = Intent::parse(&parsed.intent);
        if !intent.is_known() {
            tracing::info!(intent = %intent, "tier-2 produced unknown intent");
            record_counter("sta_unknown_intents_total", 1);
        }

        let assessment = RiskAssessment::new(
            input.session_id.clone(),
            input.turn_id,
            level,
            intent,
            AssessmentSource::Llm,
            parsed.notes(),
        );

        if assessment.risk_level.is_cacheable() {
            cache.put(&input.redacted_text, &assessment).await;
        }

        TriageOutcome {
            assessment,
            cache_hit: false,
            tier2_ran: true,
            degraded: false,
        }
    }

    /// Repeated schema failure: default low only when no risk cue exists,
    /// otherwise escalate.
    fn schema_default(&self, input: &TriageInput, negative_affect: bool) -> TriageOutcome {
        record_counter("sta_schema_defaults_total", 1);
        let assessment = if negative_affect {
            RiskAssessment::new(
                input.session_id.clone(),
                input.turn_id,
                RiskLevel::High,
                Intent::GeneralDistress,
                AssessmentSource::Fallback,
                "schema failure with risk cues present",
            )
        } else {
            RiskAssessment::new(
                input.session_id.clone(),
                input.turn_id,
                RiskLevel::Low,
                Intent::GeneralSupport,
                AssessmentSource::Fallback,
                "schema failure, no risk cues",
            )
        };
        TriageOutcome {
            assessment,
            cache_hit: false,
            tier2_ran: true,
            degraded: true,
        }
    }

    /// Model unreachable or out of time: degrade without a model opinion.
    /// Low-signal text settles on moderate; negative-affect text escalates.
    fn model_outage(
        &self,
        input: &TriageInput,
        negative_affect: bool,
        err: ModelError,
    ) -> TriageOutcome {
        tracing::warn!(error = %err, "tier-2 model unavailable, degrading");
        record_counter("sta_fallbacks_total", 1);

        let assessment = if negative_affect {
            let mut a = RiskAssessment::new(
                input.session_id.clone(),
                input.turn_id,
                RiskLevel::High,
                Intent::GeneralDistress,
                AssessmentSource::Fallback,
                "model outage with negative-affect cues",
            );
            a.handoff = true;
            a
        } else {
            let mut a = RiskAssessment::new(
                input.session_id.clone(),
                input.turn_id,
                RiskLevel::Moderate,
                Intent::GeneralDistress,
                AssessmentSource::Fallback,
                "model outage, low-signal text",
            );
            a.handoff = false;
            a
        };

        TriageOutcome {
            assessment,
            cache_hit: false,
            tier2_ran: false,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Scripted model: pops canned answers front-to-back.
    struct ScriptedModel {
        answers: Mutex<Vec<Result<String, ModelError>>>,
    }

    impl ScriptedModel {
        fn new(answers: Vec<Result<String, ModelError>>) -> Self {
            Self {
                answers: Mutex::new(answers),
            }
        }
    }

    #[async_trait]
    impl StructuredModel for ScriptedModel {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, ModelError> {
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Err(ModelError::Unavailable("script exhausted".to_string()))
            } else {
                answers.remove(0)
            }
        }
    }

    struct MemCache {
        entries: Mutex<Vec<(String, RiskAssessment)>>,
    }

    impl MemCache {
        fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AssessmentStore for MemCache {
        async fn get(&self, session_id: &str, redacted_text: &str) -> Option<RiskAssessment> {
            let key = format!("{session_id}:{redacted_text}");
            self.entries
                .lock()
                .unwrap()
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, a)| a.clone())
        }

        async fn put(&self, redacted_text: &str, assessment: &RiskAssessment) {
            let key = format!("{}:{}", assessment.session_id, redacted_text);
            self.entries.lock().unwrap().push((key, assessment.clone()));
        }
    }

    fn input(text: &str) -> TriageInput {
        TriageInput {
            session_id: "sess-1".to_string(),
            turn_id: Uuid::new_v4(),
            redacted_text: text.to_string(),
            rolling_summary: String::new(),
        }
    }

    fn tier2_json(critical: f64, high: f64, moderate: f64, intent: &str) -> String {
        json!({
            "analysis": {
                "severity": "s", "method_mention": "m", "immediacy": "i",
                "protective_factors": "p", "cultural_idiom": "c",
                "academic_stressors": "a", "prior_turn_continuity": "t",
                "confidence_rationale": "r"
            },
            "confidence": { "critical": critical, "high": high, "moderate": moderate },
            "intent": intent
        })
        .to_string()
    }

    fn agent() -> SafetyTriageAgent {
        SafetyTriageAgent::new(TriageThresholds::default())
    }

    #[tokio::test]
    async fn crisis_keywords_skip_the_model_entirely() {
        let model = ScriptedModel::new(vec![]);
        let out = agent()
            .assess(&input("aku pengen bunuh diri"), &model, &NoCache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::Critical);
        assert_eq!(out.assessment.intent, Intent::CrisisSupport);
        assert!(out.assessment.handoff);
        assert_eq!(out.assessment.source, AssessmentSource::Rules);
        assert!(!out.tier2_ran);
    }

    #[tokio::test]
    async fn greetings_skip_the_model_entirely() {
        let model = ScriptedModel::new(vec![]);
        let out = agent()
            .assess(&input("Halo Aika, apa kabar?"), &model, &NoCache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::Low);
        assert!(!out.assessment.handoff);
        assert!(!out.tier2_ran);
    }

    #[tokio::test]
    async fn tier2_maps_confidences_and_caches_low_risk() {
        let model = ScriptedModel::new(vec![Ok(tier2_json(0.05, 0.2, 0.7, "academic_stress"))]);
        let cache = MemCache::new();
        let out = agent()
            .assess(
                &input("Aku stres banget sama skripsi, gabisa tidur 3 hari."),
                &model,
                &cache,
            )
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::Moderate);
        assert_eq!(out.assessment.intent, Intent::AcademicStress);
        assert!(out.tier2_ran);
        assert!(!out.assessment.handoff);
        // Moderate is cacheable.
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tier2_high_risk_is_never_cached() {
        let model = ScriptedModel::new(vec![Ok(tier2_json(0.6, 0.3, 0.1, "general_distress"))]);
        let cache = MemCache::new();
        let out = agent()
            .assess(&input("everything is falling apart and i am so stressed"), &model, &cache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::High);
        assert!(out.assessment.handoff);
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_failure_retries_once_then_defaults_low_without_cues() {
        let model = ScriptedModel::new(vec![
            Ok("not json at all".to_string()),
            Ok("still not json".to_string()),
        ]);
        let out = agent()
            .assess(&input("mau tanya soal kampus"), &model, &NoCache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::Low);
        assert_eq!(out.assessment.source, AssessmentSource::Fallback);
        assert!(out.degraded);
    }

    #[tokio::test]
    async fn schema_failure_with_cues_escalates_high() {
        let model = ScriptedModel::new(vec![
            Ok("garbage".to_string()),
            Ok("garbage".to_string()),
        ]);
        let out = agent()
            .assess(&input("aku sedih dan gak kuat sama semuanya"), &model, &NoCache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::High);
        assert!(out.assessment.handoff);
        assert!(out.degraded);
    }

    #[tokio::test]
    async fn model_outage_degrades_moderate_for_low_signal_text() {
        let model = ScriptedModel::new(vec![Err(ModelError::Unavailable("down".to_string()))]);
        let out = agent()
            .assess(&input("gimana cara daftar konseling ya, agak bingung nih prosesnya"), &model, &NoCache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::Moderate);
        assert!(!out.assessment.handoff);
        assert_eq!(out.assessment.source, AssessmentSource::Fallback);
        assert!(out.degraded);
    }

    #[tokio::test]
    async fn model_outage_with_negative_affect_escalates() {
        let model = ScriptedModel::new(vec![Err(ModelError::Timeout("3s".to_string()))]);
        let out = agent()
            .assess(&input("i feel so hopeless about everything"), &model, &NoCache)
            .await;
        assert_eq!(out.assessment.risk_level, RiskLevel::High);
        assert!(out.assessment.handoff);
    }

    #[tokio::test]
    async fn unknown_intent_survives_as_other() {
        let model = ScriptedModel::new(vec![Ok(tier2_json(0.0, 0.0, 0.1, "exam_panic"))]);
        let out = agent()
            .assess(&input("deg-degan mau sidang minggu depan"), &model, &NoCache)
            .await;
        assert_eq!(
            out.assessment.intent,
            Intent::Other("exam_panic".to_string())
        );
    }
}
