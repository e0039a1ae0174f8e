//! The authoritative tool manifest.
//!
//! Every tool the model may call is enumerated here, together with its
//! argument schema, deadline and role gating. Any name outside this list is
//! answered with a structured `unknown_tool` result — never an error path.

use serde_json::{json, Value};
use shared_types::{Role, ToolBudgetsConfig, ToolSpec};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    RunSafetyTriage,
    RunSupportCoach,
    RunServiceDesk,
    GetUserInterventionPlans,
    GetMentalHealthResources,
    GetUserProfile,
    CreateInterventionPlan,
    GetAssignedCases,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        ToolName::RunSafetyTriage,
        ToolName::RunSupportCoach,
        ToolName::RunServiceDesk,
        ToolName::GetUserInterventionPlans,
        ToolName::GetMentalHealthResources,
        ToolName::GetUserProfile,
        ToolName::CreateInterventionPlan,
        ToolName::GetAssignedCases,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::RunSafetyTriage => "run_safety_triage",
            ToolName::RunSupportCoach => "run_support_coach",
            ToolName::RunServiceDesk => "run_service_desk",
            ToolName::GetUserInterventionPlans => "get_user_intervention_plans",
            ToolName::GetMentalHealthResources => "get_mental_health_resources",
            ToolName::GetUserProfile => "get_user_profile",
            ToolName::CreateInterventionPlan => "create_intervention_plan",
            ToolName::GetAssignedCases => "get_assigned_cases",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Which roles may see and call this tool.
    pub fn available_to(self, role: Role) -> bool {
        match self {
            ToolName::GetAssignedCases => matches!(role, Role::Counsellor | Role::Admin),
            _ => true,
        }
    }

    /// Hard deadline for one invocation.
    pub fn deadline(self, budgets: &ToolBudgetsConfig) -> Duration {
        let ms = match self {
            ToolName::RunSafetyTriage => budgets.safety_triage_ms,
            ToolName::RunSupportCoach | ToolName::CreateInterventionPlan => {
                budgets.support_coach_ms
            }
            ToolName::RunServiceDesk => budgets.service_desk_ms,
            ToolName::GetMentalHealthResources => budgets.catalogue_read_ms,
            ToolName::GetUserInterventionPlans
            | ToolName::GetUserProfile
            | ToolName::GetAssignedCases => budgets.catalogue_read_ms,
        };
        Duration::from_millis(ms)
    }

    /// Sub-agent engine this tool fans out to, for response metadata.
    pub fn agent_name(self) -> Option<&'static str> {
        match self {
            ToolName::RunSafetyTriage => Some(safety_triage_agent::AGENT_NAME),
            ToolName::RunSupportCoach | ToolName::CreateInterventionPlan => {
                Some(support_coach_agent::AGENT_NAME)
            }
            ToolName::RunServiceDesk => Some(service_desk_agent::AGENT_NAME),
            _ => None,
        }
    }

    /// Tools that only read state may execute concurrently within one model
    /// turn; agent engines run sequentially in manifest order.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            ToolName::GetUserInterventionPlans
                | ToolName::GetMentalHealthResources
                | ToolName::GetUserProfile
                | ToolName::GetAssignedCases
        )
    }

    fn spec(self) -> ToolSpec {
        let (description, parameters) = match self {
            ToolName::RunSafetyTriage => (
                "Run a full safety assessment of the current message. Use when the \
                 student expresses emotional distress, risk, or a significant change in tone.",
                json!({
                    "type": "object",
                    "properties": {
                        "reason": { "type": "string", "description": "Why triage is needed" }
                    },
                    "required": []
                }),
            ),
            ToolName::RunSupportCoach => (
                "Build and save a short structured coping plan for the student's current \
                 concern. Requires a prior safety assessment this turn.",
                json!({
                    "type": "object",
                    "properties": {
                        "focus": { "type": "string", "description": "What the plan should address" }
                    },
                    "required": []
                }),
            ),
            ToolName::RunServiceDesk => (
                "Escalate to a human counsellor by opening a case. Use for high-risk \
                 situations or when the student asks for a human.",
                json!({
                    "type": "object",
                    "properties": {
                        "reason": { "type": "string" }
                    },
                    "required": []
                }),
            ),
            ToolName::GetUserInterventionPlans => (
                "Fetch the student's most recent active intervention plans.",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": { "type": "integer", "minimum": 1, "maximum": 10 }
                    },
                    "required": []
                }),
            ),
            ToolName::GetMentalHealthResources => (
                "Fetch curated mental-health resources for a topic.",
                json!({
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string", "description": "e.g. academic_stress" }
                    },
                    "required": ["topic"]
                }),
            ),
            ToolName::GetUserProfile => (
                "Read the student's public profile fields.",
                json!({ "type": "object", "properties": {}, "required": [] }),
            ),
            ToolName::CreateInterventionPlan => (
                "Directly create a coping plan of a given type for the student.",
                json!({
                    "type": "object",
                    "properties": {
                        "plan_type": {
                            "type": "string",
                            "enum": ["calm_down", "break_down_problem", "general_coping"]
                        }
                    },
                    "required": []
                }),
            ),
            ToolName::GetAssignedCases => (
                "List the counsellor's open cases, most severe first.",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": { "type": "integer", "minimum": 1, "maximum": 10 }
                    },
                    "required": []
                }),
            ),
        };

        ToolSpec {
            name: self.as_str().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// The manifest advertised to the model for a given caller role.
pub fn manifest(role: Role) -> Vec<ToolSpec> {
    ToolName::ALL
        .iter()
        .filter(|t| t.available_to(role))
        .map(|t| t.spec())
        .collect()
}

/// Structured result of one tool execution, fed back to the model verbatim.
/// Failures are data, not exceptions.
pub fn ok_result(data: Value) -> Value {
    json!({ "status": "ok", "data": data })
}

pub fn error_result(error: &str) -> Value {
    json!({ "status": "error", "error": error })
}

pub fn timeout_result() -> Value {
    json!({ "status": "timeout" })
}

pub fn unknown_tool_result() -> Value {
    json!({ "status": "unknown_tool", "error": "tool_not_implemented" })
}

/// Startup self-check: every manifest entry must round-trip through the
/// parser that the dispatcher keys on. Catches manifest/dispatcher drift at
/// boot rather than mid-conversation.
pub fn self_check() -> Result<(), String> {
    for role in [Role::Student, Role::Counsellor, Role::Admin] {
        for spec in manifest(role) {
            let parsed = ToolName::parse(&spec.name)
                .ok_or_else(|| format!("manifest tool '{}' has no dispatcher entry", spec.name))?;
            if !parsed.available_to(role) {
                return Err(format!(
                    "manifest tool '{}' advertised to a role it rejects",
                    spec.name
                ));
            }
        }
    }
    Ok(())
}
