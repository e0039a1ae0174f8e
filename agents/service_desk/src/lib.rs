//! Service Desk Agent: human-escalation case workflow.
//!
//! ingest_escalation -> create_case -> calculate_sla -> auto_assign ->
//! notify. The case id is returned synchronously so the orchestrator can put
//! a reference into the user-facing reply. Assignment failures never block
//! case creation; an unassigned case still starts its SLA clock.

pub mod assign;

use async_trait::async_trait;
use chrono::Utc;
use platform::record_counter;
use shared_types::{
    Case, CaseSeverity, CaseStatus, ConsentRecord, ConsentType, CounsellorId, Counsellor,
    RiskLevel, SessionId, SlaConfig, UserId,
};
use uuid::Uuid;

pub const AGENT_NAME: &str = "service_desk";

/// How many recent turns feed the case summary.
pub const SUMMARY_TURN_LIMIT: usize = 3;

/// Persistence seam implemented by the orchestrator's relational store.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Insert a new case. Must be idempotent on `case_id`.
    async fn insert_case(&self, case: &Case) -> Result<(), String>;

    /// All currently active counsellors with their load counters.
    async fn active_counsellors(&self) -> Result<Vec<Counsellor>, String>;

    /// Record an assignment: case status to `assigned`, counsellor load +1.
    async fn assign_case(&self, case_id: Uuid, counsellor_id: CounsellorId)
        -> Result<(), String>;

    /// Latest consent ledger entry for the user, if any.
    async fn current_consent(
        &self,
        user_id: UserId,
        consent_type: ConsentType,
    ) -> Result<Option<ConsentRecord>, String>;
}

#[derive(Debug, Clone)]
pub struct EscalationInput {
    pub user_id: UserId,
    /// Keyed hash of the user id; cases never store the raw id.
    pub user_hash: String,
    pub session_id: SessionId,
    pub severity: CaseSeverity,
    /// Most recent turns, already redacted, oldest first.
    pub recent_redacted_turns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EscalationOutcome {
    pub case: Case,
    /// False when the store rejected the insert; the orchestrator reports a
    /// degraded turn but still surfaces crisis resources.
    pub persisted: bool,
    /// None when no counsellor was available; a background sweep retries.
    pub assigned_to: Option<CounsellorId>,
}

/// Map a triage risk level onto a case severity. Levels below `high` do not
/// escalate.
pub fn severity_for_risk(level: RiskLevel) -> Option<CaseSeverity> {
    match level {
        RiskLevel::Critical => Some(CaseSeverity::Critical),
        RiskLevel::High => Some(CaseSeverity::High),
        RiskLevel::Moderate | RiskLevel::Low => None,
    }
}

pub struct ServiceDeskAgent {
    sla: SlaConfig,
}

impl ServiceDeskAgent {
    pub fn new(sla: SlaConfig) -> Self {
        Self { sla }
    }

    pub async fn escalate(
        &self,
        input: &EscalationInput,
        store: &dyn CaseStore,
    ) -> Result<EscalationOutcome, String> {
        // ingest_escalation: only high and critical open cases.
        if !matches!(input.severity, CaseSeverity::High | CaseSeverity::Critical) {
            return Err(format!(
                "severity '{}' does not warrant escalation",
                input.severity
            ));
        }

        // The emergency-contact consent decides whether out-of-scope
        // notifiers may reach beyond the student. Absence means no.
        let contact_permitted = match store
            .current_consent(input.user_id, ConsentType::EmergencyContact)
            .await
        {
            Ok(Some(record)) => record.granted,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "consent lookup failed, assuming not permitted");
                false
            }
        };

        // create_case + calculate_sla.
        let now = Utc::now();
        let sla_window = input.severity.sla_window(
            self.sla.critical_sla_minutes,
            self.sla.default_sla_minutes,
        );
        let mut case = Case {
            case_id: Uuid::new_v4(),
            user_hash: input.user_hash.clone(),
            session_id: input.session_id.clone(),
            severity: input.severity,
            summary_redacted: build_summary(&input.recent_redacted_turns),
            status: CaseStatus::New,
            assigned_counsellor_id: None,
            sla_breach_at: now + sla_window,
            created_at: now,
            updated_at: now,
            contact_permitted,
        };

        let persisted = match store.insert_case(&case).await {
            Ok(()) => {
                record_counter("sda_cases_created_total", 1);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, case_id = %case.case_id, "case persistence failed");
                false
            }
        };

        // auto_assign: least-loaded active counsellor, tie-break by earliest
        // last assignment. Assignment only runs against a persisted case.
        let mut assigned_to = None;
        if persisted {
            match store.active_counsellors().await {
                Ok(counsellors) => {
                    if let Some(choice) = assign::select_counsellor(&counsellors) {
                        match store.assign_case(case.case_id, choice).await {
                            Ok(()) => {
                                case.status = CaseStatus::Assigned;
                                case.assigned_counsellor_id = Some(choice);
                                case.updated_at = Utc::now();
                                assigned_to = Some(choice);
                                record_counter("sda_cases_assigned_total", 1);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "assignment write failed, case stays new");
                            }
                        }
                    } else {
                        tracing::warn!(case_id = %case.case_id, "no active counsellor available");
                        record_counter("sda_cases_unassigned_total", 1);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "counsellor lookup failed, case stays new");
                }
            }
        }

        // notify is an audit event plus an out-of-scope notifier handoff;
        // the orchestrator emits the event from this outcome.
        Ok(EscalationOutcome {
            case,
            persisted,
            assigned_to,
        })
    }
}

/// Case summary from the last few redacted turns, oldest first. Turns are
/// clipped so a single long message cannot dominate the case view.
fn build_summary(recent_redacted_turns: &[String]) -> String {
    const PER_TURN_CHARS: usize = 280;

    let start = recent_redacted_turns.len().saturating_sub(SUMMARY_TURN_LIMIT);
    let mut out = String::new();
    for turn in &recent_redacted_turns[start..] {
        let clipped: String = turn.chars().take(PER_TURN_CHARS).collect();
        out.push_str("- ");
        out.push_str(&clipped);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str("(no recent turns available)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;

    struct MemStore {
        cases: Mutex<Vec<Case>>,
        assignments: Mutex<Vec<(Uuid, CounsellorId)>>,
        counsellors: Vec<Counsellor>,
        consent: Option<ConsentRecord>,
        fail_insert: bool,
    }

    impl MemStore {
        fn new(counsellors: Vec<Counsellor>) -> Self {
            Self {
                cases: Mutex::new(Vec::new()),
                assignments: Mutex::new(Vec::new()),
                counsellors,
                consent: None,
                fail_insert: false,
            }
        }
    }

    #[async_trait]
    impl CaseStore for MemStore {
        async fn insert_case(&self, case: &Case) -> Result<(), String> {
            if self.fail_insert {
                return Err("db down".to_string());
            }
            self.cases.lock().unwrap().push(case.clone());
            Ok(())
        }

        async fn active_counsellors(&self) -> Result<Vec<Counsellor>, String> {
            Ok(self.counsellors.clone())
        }

        async fn assign_case(
            &self,
            case_id: Uuid,
            counsellor_id: CounsellorId,
        ) -> Result<(), String> {
            self.assignments.lock().unwrap().push((case_id, counsellor_id));
            Ok(())
        }

        async fn current_consent(
            &self,
            _user_id: UserId,
            _consent_type: ConsentType,
        ) -> Result<Option<ConsentRecord>, String> {
            Ok(self.consent.clone())
        }
    }

    fn counsellor(id: CounsellorId, load: u32, last_assigned_mins_ago: Option<i64>) -> Counsellor {
        Counsellor {
            counsellor_id: id,
            is_active: true,
            specializations: vec![],
            active_case_count: load,
            last_assigned_at: last_assigned_mins_ago.map(|m| Utc::now() - Duration::minutes(m)),
        }
    }

    fn input(severity: CaseSeverity) -> EscalationInput {
        EscalationInput {
            user_id: 42,
            user_hash: "ab12cd34ef56ab78".to_string(),
            session_id: "sess-1".to_string(),
            severity,
            recent_redacted_turns: vec![
                "first turn".to_string(),
                "second turn".to_string(),
                "aku [REDACTED:NAME], tolong".to_string(),
            ],
        }
    }

    #[tokio::test]
    async fn critical_case_gets_two_hour_sla_and_assignment() {
        let store = MemStore::new(vec![counsellor(1, 3, Some(10)), counsellor(2, 1, Some(5))]);
        let agent = ServiceDeskAgent::new(SlaConfig::default());
        let out = agent.escalate(&input(CaseSeverity::Critical), &store).await.unwrap();

        assert!(out.persisted);
        assert_eq!(out.assigned_to, Some(2));
        assert_eq!(out.case.status, CaseStatus::Assigned);
        let sla = out.case.sla_breach_at - out.case.created_at;
        assert!(sla <= Duration::hours(2));
        assert!(sla > Duration::minutes(119));
    }

    #[tokio::test]
    async fn high_case_gets_day_sla() {
        let store = MemStore::new(vec![counsellor(1, 0, None)]);
        let agent = ServiceDeskAgent::new(SlaConfig::default());
        let out = agent.escalate(&input(CaseSeverity::High), &store).await.unwrap();
        let sla = out.case.sla_breach_at - out.case.created_at;
        assert!(sla <= Duration::hours(24));
        assert!(sla > Duration::hours(23));
    }

    #[tokio::test]
    async fn medium_severity_is_rejected() {
        let store = MemStore::new(vec![]);
        let agent = ServiceDeskAgent::new(SlaConfig::default());
        assert!(agent.escalate(&input(CaseSeverity::Medium), &store).await.is_err());
        assert!(store.cases.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_counsellor_leaves_case_new_but_persisted() {
        let store = MemStore::new(vec![]);
        let agent = ServiceDeskAgent::new(SlaConfig::default());
        let out = agent.escalate(&input(CaseSeverity::High), &store).await.unwrap();
        assert!(out.persisted);
        assert!(out.assigned_to.is_none());
        assert_eq!(out.case.status, CaseStatus::New);
        assert!(out.case.assigned_counsellor_id.is_none());
    }

    #[tokio::test]
    async fn insert_failure_reports_unpersisted_case_with_id() {
        let mut store = MemStore::new(vec![counsellor(1, 0, None)]);
        store.fail_insert = true;
        let agent = ServiceDeskAgent::new(SlaConfig::default());
        let out = agent.escalate(&input(CaseSeverity::Critical), &store).await.unwrap();
        assert!(!out.persisted);
        assert!(out.assigned_to.is_none());
        // No assignment may be written for a case that was never persisted.
        assert!(store.assignments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn consent_flag_flows_into_the_case() {
        let mut store = MemStore::new(vec![counsellor(1, 0, None)]);
        store.consent = Some(ConsentRecord {
            user_id: 42,
            consent_type: ConsentType::EmergencyContact,
            granted: true,
            version: "v2".to_string(),
            granted_at: Utc::now(),
            method: "registration_form".to_string(),
        });
        let agent = ServiceDeskAgent::new(SlaConfig::default());
        let out = agent.escalate(&input(CaseSeverity::Critical), &store).await.unwrap();
        assert!(out.case.contact_permitted);
    }

    #[test]
    fn summary_keeps_last_three_turns_and_clips() {
        let turns: Vec<String> = (1..=5).map(|i| format!("turn {i}")).collect();
        let summary = build_summary(&turns);
        assert!(!summary.contains("turn 1"));
        assert!(!summary.contains("turn 2"));
        assert!(summary.contains("turn 3"));
        assert!(summary.contains("turn 5"));

        let long = vec!["x".repeat(1000)];
        let summary = build_summary(&long);
        assert!(summary.chars().count() < 300);
    }

    #[test]
    fn risk_to_severity_mapping() {
        assert_eq!(severity_for_risk(RiskLevel::Critical), Some(CaseSeverity::Critical));
        assert_eq!(severity_for_risk(RiskLevel::High), Some(CaseSeverity::High));
        assert_eq!(severity_for_risk(RiskLevel::Moderate), None);
        assert_eq!(severity_for_risk(RiskLevel::Low), None);
    }
}
