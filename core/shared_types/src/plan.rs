use crate::{RiskLevel, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Steps per plan are bounded by the generation template.
pub const MIN_PLAN_STEPS: usize = 3;
pub const MAX_PLAN_STEPS: usize = 6;
/// A single step body must stay under this many characters to pass review.
pub const MAX_STEP_BODY_CHARS: usize = 500;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    CalmDown,
    BreakDownProblem,
    GeneralCoping,
    Custom,
}

impl PlanType {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::CalmDown => "calm_down",
            PlanType::BreakDownProblem => "break_down_problem",
            PlanType::GeneralCoping => "general_coping",
            PlanType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calm_down" => Some(PlanType::CalmDown),
            "break_down_problem" => Some(PlanType::BreakDownProblem),
            "general_coping" => Some(PlanType::GeneralCoping),
            "custom" => Some(PlanType::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Abandoned,
}

impl PlanStatus {
    /// Status transitions are monotone: a plan never returns to draft, and
    /// terminal states accept nothing.
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Completed) | (Active, Abandoned)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PlanStatus::Draft),
            "active" => Some(PlanStatus::Active),
            "completed" => Some(PlanStatus::Completed),
            "abandoned" => Some(PlanStatus::Abandoned),
            _ => None,
        }
    }
}

/// One ordered action in an intervention plan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub order: u8,
    pub title: String,
    pub body: String,
    pub est_duration_min: u8,
}

/// Where a curated resource points. External tag form serializes as
/// `{"url": "..."}` or `{"id": "..."}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRef {
    Url(String),
    Id(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Hotline,
    Article,
    Exercise,
    Audio,
    CampusService,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlanResource {
    pub label: String,
    #[serde(rename = "ref")]
    pub reference: ResourceRef,
    pub kind: ResourceKind,
}

/// A structured CBT intervention plan produced by the support coach.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InterventionPlan {
    pub plan_id: Uuid,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub plan_type: PlanType,
    pub title: String,
    pub concern_type: String,
    pub severity: RiskLevel,
    pub steps: Vec<PlanStep>,
    pub resources: Vec<PlanResource>,
    pub safety_reviewed: bool,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 0..=100, monotone non-decreasing over the plan's life.
    pub progress_pct: u8,
}

impl InterventionPlan {
    /// Structural invariants that must hold before a plan leaves draft.
    pub fn is_well_formed(&self) -> bool {
        !self.steps.is_empty()
            && self.progress_pct <= 100
            && (self.status == PlanStatus::Draft || self.safety_reviewed)
    }

    /// Recompute progress from the number of completed steps.
    pub fn progress_for(&self, completed_steps: usize) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let pct = (completed_steps.min(self.steps.len()) * 100) / self.steps.len();
        pct as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(status: PlanStatus, reviewed: bool, steps: usize) -> InterventionPlan {
        InterventionPlan {
            plan_id: Uuid::new_v4(),
            user_id: 7,
            session_id: "sess".to_string(),
            plan_type: PlanType::GeneralCoping,
            title: "Steady footing".to_string(),
            concern_type: "general".to_string(),
            severity: RiskLevel::Moderate,
            steps: (0..steps)
                .map(|i| PlanStep {
                    order: i as u8 + 1,
                    title: format!("Step {}", i + 1),
                    body: "Take one small action.".to_string(),
                    est_duration_min: 5,
                })
                .collect(),
            resources: vec![],
            safety_reviewed: reviewed,
            status,
            created_at: Utc::now(),
            completed_at: None,
            progress_pct: 0,
        }
    }

    #[test]
    fn status_transitions_are_monotone() {
        use PlanStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Abandoned));

        assert!(!Active.can_transition_to(Draft));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Abandoned.can_transition_to(Active));
        assert!(!Draft.can_transition_to(Completed));
    }

    #[test]
    fn unreviewed_plan_cannot_be_active() {
        assert!(!plan_with(PlanStatus::Active, false, 3).is_well_formed());
        assert!(plan_with(PlanStatus::Active, true, 3).is_well_formed());
        assert!(plan_with(PlanStatus::Draft, false, 3).is_well_formed());
        assert!(!plan_with(PlanStatus::Active, true, 0).is_well_formed());
    }

    #[test]
    fn progress_rounds_down_and_saturates() {
        let plan = plan_with(PlanStatus::Active, true, 3);
        assert_eq!(plan.progress_for(0), 0);
        assert_eq!(plan.progress_for(1), 33);
        assert_eq!(plan.progress_for(3), 100);
        assert_eq!(plan.progress_for(9), 100);
    }

    #[test]
    fn resource_ref_serializes_with_external_tag() {
        let url = PlanResource {
            label: "Breathing exercise".to_string(),
            reference: ResourceRef::Url("https://example.org/breathe".to_string()),
            kind: ResourceKind::Exercise,
        };
        let json = serde_json::to_value(&url).unwrap();
        assert_eq!(json["ref"]["url"], "https://example.org/breathe");

        let id = PlanResource {
            label: "Campus counselling".to_string(),
            reference: ResourceRef::Id("ugm-counselling".to_string()),
            kind: ResourceKind::CampusService,
        };
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["ref"]["id"], "ugm-counselling");
    }
}
