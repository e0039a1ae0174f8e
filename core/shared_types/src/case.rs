use crate::{CounsellorId, Role, SessionId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum CaseSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CaseSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseSeverity::Low => "low",
            CaseSeverity::Medium => "medium",
            CaseSeverity::High => "high",
            CaseSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(CaseSeverity::Low),
            "medium" => Some(CaseSeverity::Medium),
            "high" => Some(CaseSeverity::High),
            "critical" => Some(CaseSeverity::Critical),
            _ => None,
        }
    }

    /// SLA window measured from case creation.
    pub fn sla_window(self, critical_minutes: i64, default_minutes: i64) -> Duration {
        match self {
            CaseSeverity::Critical => Duration::minutes(critical_minutes),
            _ => Duration::minutes(default_minutes),
        }
    }
}

impl fmt::Display for CaseSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    New,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl CaseStatus {
    /// Monotone workflow: new -> assigned -> in_progress -> {resolved, closed},
    /// resolved -> closed. No transition moves backwards.
    pub fn can_transition_to(self, next: CaseStatus) -> bool {
        use CaseStatus::*;
        matches!(
            (self, next),
            (New, Assigned)
                | (Assigned, InProgress)
                | (InProgress, Resolved)
                | (InProgress, Closed)
                | (Resolved, Closed)
        )
    }

    pub fn is_open(self) -> bool {
        !matches!(self, CaseStatus::Resolved | CaseStatus::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::New => "new",
            CaseStatus::Assigned => "assigned",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Resolved => "resolved",
            CaseStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(CaseStatus::New),
            "assigned" => Some(CaseStatus::Assigned),
            "in_progress" => Some(CaseStatus::InProgress),
            "resolved" => Some(CaseStatus::Resolved),
            "closed" => Some(CaseStatus::Closed),
            _ => None,
        }
    }
}

/// Human-escalation case opened by the service desk. The summary is built
/// from redacted turns only; the user is referenced by keyed hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Case {
    pub case_id: Uuid,
    pub user_hash: String,
    pub session_id: SessionId,
    pub severity: CaseSeverity,
    pub summary_redacted: String,
    pub status: CaseStatus,
    pub assigned_counsellor_id: Option<CounsellorId>,
    pub sla_breach_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// True when the user's `emergency_contact` consent permits outreach.
    #[serde(default)]
    pub contact_permitted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CaseNote {
    pub note_id: Uuid,
    pub case_id: Uuid,
    pub author_role: Role,
    pub body_redacted: String,
    pub created_at: DateTime<Utc>,
}

/// Read-mostly reference data used by the auto-assignment step.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Counsellor {
    pub counsellor_id: CounsellorId,
    pub is_active: bool,
    pub specializations: Vec<String>,
    pub active_case_count: u32,
    pub last_assigned_at: Option<DateTime<Utc>>,
}
