//! Support Coach Agent: state-machined generation of intervention plans.
//!
//! ingest_signal -> determine_type -> generate_plan -> safety_review ->
//! persist, with up to two regenerations on review failure and a terminal
//! abort_to_escalation after that. A plan never leaves this crate without
//! `safety_reviewed = true`.

pub mod catalogue;
pub mod generate;
pub mod review;

use async_trait::async_trait;
use chrono::Utc;
use platform::record_counter;
use shared_types::{
    CompletionRequest, Intent, InterventionPlan, PlanStatus, PlanType, RiskAssessment, RiskLevel,
    SessionId, StructuredModel, UserId,
};
use uuid::Uuid;

pub use catalogue::Language;

pub const AGENT_NAME: &str = "support_coach";

/// Review retries before the engine gives up and escalates.
const MAX_REGENERATIONS: usize = 2;

/// How many resources ride along with a generated plan.
const PLAN_RESOURCE_LIMIT: usize = 3;

/// Persistence seam implemented by the orchestrator's relational store.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Insert a reviewed plan. Must be idempotent on `plan_id`.
    async fn insert_plan(&self, plan: &InterventionPlan) -> Result<(), String>;

    /// Titles of the user's recent plans, used to avoid duplicates.
    async fn recent_plan_titles(&self, user_id: UserId, limit: usize) -> Result<Vec<String>, String>;
}

#[derive(Debug, Clone)]
pub struct CoachInput {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub redacted_text: String,
    pub assessment: RiskAssessment,
    pub language: Language,
}

/// Terminal states of the plan machine.
#[derive(Debug, Clone)]
pub enum CoachOutcome {
    /// A reviewed plan. `persisted` is false when the store write failed;
    /// the orchestrator emits a degradation event in that case.
    Planned {
        plan: InterventionPlan,
        persisted: bool,
        /// True when the canned catalogue plan was used instead of a
        /// generated one.
        canned: bool,
    },
    /// Safety review failed twice; the orchestrator must open a case as if
    /// the risk were high.
    AbortToEscalation { reason: String },
    /// Critical risk never receives a plan; escalation handles it.
    RefusedCritical,
}

pub struct SupportCoachAgent;

impl SupportCoachAgent {
    pub fn new() -> Self {
        Self
    }

    /// `determine_type`: heuristic mapping from classified intent.
    pub fn plan_type_for(intent: &Intent) -> PlanType {
        match intent {
            Intent::AcuteDistress => PlanType::CalmDown,
            Intent::AcademicStress | Intent::GeneralDistress => PlanType::BreakDownProblem,
            _ => PlanType::GeneralCoping,
        }
    }

    pub async fn run(
        &self,
        input: &CoachInput,
        model: &dyn StructuredModel,
        store: &dyn PlanStore,
    ) -> CoachOutcome {
        // ingest_signal
        if input.assessment.risk_level == RiskLevel::Critical {
            record_counter("sca_refused_critical_total", 1);
            return CoachOutcome::RefusedCritical;
        }

        // determine_type
        let plan_type = Self::plan_type_for(&input.assessment.intent);

        let prior_titles = store
            .recent_plan_titles(input.user_id, 5)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not load prior plan titles");
                Vec::new()
            });

        // generate_plan -> safety_review, with bounded regeneration.
        let mut feedback: Option<String> = None;
        for attempt in 0..=MAX_REGENERATIONS {
            let draft = match self
                .generate(input, plan_type, &prior_titles, feedback.as_deref(), model)
                .await
            {
                Ok(draft) => draft,
                Err(reason) => {
                    // Generation failure (outage or persistent bad JSON) is
                    // not a safety failure: fall back to the canned,
                    // pre-reviewed coping plan.
                    tracing::warn!(error = %reason, "plan generation failed, using canned plan");
                    record_counter("sca_canned_fallbacks_total", 1);
                    return self.persist_canned(input, store).await;
                }
            };

            let steps = draft.clone().into_steps();
            match self.safety_review(&draft.title, &steps, input, model).await {
                Ok(()) => {
                    let plan = self.build_plan(input, plan_type, draft.title, draft.concern_type, steps);
                    return self.persist(input, plan, false, store).await;
                }
                Err(reason) => {
                    tracing::info!(attempt, reason = %reason, "plan rejected by safety review");
                    record_counter("sca_review_rejections_total", 1);
                    feedback = Some(reason);
                }
            }
        }

        record_counter("sca_abort_to_escalation_total", 1);
        CoachOutcome::AbortToEscalation {
            reason: feedback.unwrap_or_else(|| "safety review failed".to_string()),
        }
    }

    async fn generate(
        &self,
        input: &CoachInput,
        plan_type: PlanType,
        prior_titles: &[String],
        feedback: Option<&str>,
        model: &dyn StructuredModel,
    ) -> Result<generate::DraftPlan, String> {
        let raw = model
            .complete(CompletionRequest {
                system: generate::system_prompt(),
                user: generate::user_prompt(
                    &input.redacted_text,
                    plan_type,
                    input.assessment.risk_level,
                    prior_titles,
                    feedback,
                ),
                strict_json: true,
            })
            .await
            .map_err(|e| e.to_string())?;

        generate::parse_draft(&raw)
    }

    /// Rule pass first (cheap, deterministic), then the independent model
    /// review. Either rejection is a review failure.
    async fn safety_review(
        &self,
        title: &str,
        steps: &[shared_types::PlanStep],
        input: &CoachInput,
        model: &dyn StructuredModel,
    ) -> Result<(), String> {
        if let review::RuleReview::Fail(reason) =
            review::rule_review(steps, input.assessment.risk_level)
        {
            return Err(reason);
        }

        let raw = model
            .complete(CompletionRequest {
                system: review::review_system_prompt().to_string(),
                user: review::review_user_prompt(title, steps, input.assessment.risk_level),
                strict_json: true,
            })
            .await
            .map_err(|e| format!("review model unavailable: {e}"))?;

        let verdict = review::parse_verdict(&raw)?;
        if verdict.approved {
            Ok(())
        } else {
            Err(if verdict.reasons.is_empty() {
                "review rejected the plan".to_string()
            } else {
                verdict.reasons.join("; ")
            })
        }
    }

    fn build_plan(
        &self,
        input: &CoachInput,
        plan_type: PlanType,
        title: String,
        concern_type: String,
        steps: Vec<shared_types::PlanStep>,
    ) -> InterventionPlan {
        InterventionPlan {
            plan_id: Uuid::new_v4(),
            user_id: input.user_id,
            session_id: input.session_id.clone(),
            plan_type,
            title,
            concern_type,
            severity: input.assessment.risk_level,
            steps,
            resources: catalogue::resources_for(
                &input.assessment.intent,
                input.language,
                PLAN_RESOURCE_LIMIT,
            ),
            safety_reviewed: true,
            status: PlanStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
            progress_pct: 0,
        }
    }

    async fn persist_canned(&self, input: &CoachInput, store: &dyn PlanStore) -> CoachOutcome {
        let (title, steps) = catalogue::canned_coping_plan(input.language);
        let plan = self.build_plan(
            input,
            PlanType::GeneralCoping,
            title,
            input.assessment.intent.as_str().to_string(),
            steps,
        );
        self.persist(input, plan, true, store).await
    }

    async fn persist(
        &self,
        _input: &CoachInput,
        plan: InterventionPlan,
        canned: bool,
        store: &dyn PlanStore,
    ) -> CoachOutcome {
        debug_assert!(plan.is_well_formed());
        let persisted = match store.insert_plan(&plan).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, plan_id = %plan.plan_id, "plan persistence failed");
                false
            }
        };
        if persisted {
            record_counter("sca_plans_created_total", 1);
        }
        CoachOutcome::Planned {
            plan,
            persisted,
            canned,
        }
    }
}

impl Default for SupportCoachAgent {
    fn default() -> Self {
        Self::new()
    }
}
