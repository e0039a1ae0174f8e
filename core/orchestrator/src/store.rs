//! Relational store over pooled SQLite: plans, cases, case notes, events,
//! the consent ledger and reference data.
//!
//! All statements run under `spawn_blocking`; write paths are idempotent on
//! their primary keys. Status transitions are checked against the monotone
//! workflows before any row changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use service_desk_agent::CaseStore;
use shared_types::{
    Case, CaseNote, CaseSeverity, CaseStatus, ConsentRecord, ConsentType, Counsellor,
    CounsellorId, EventRecord, InterventionPlan, PlanStatus, PlanType, RiskLevel, Role, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use support_coach_agent::PlanStore;
use tokio::task;
use uuid::Uuid;

type DbPool = r2d2::Pool<SqliteConnectionManager>;

pub struct SqlStore {
    pool: Arc<DbPool>,
}

impl SqlStore {
    pub fn new(db_path: &str) -> Result<Arc<Self>, String> {
        let manager = SqliteConnectionManager::file(db_path);
        let pool = r2d2::Pool::builder()
            .max_size(10)
            .min_idle(Some(2))
            .idle_timeout(Some(Duration::from_secs(300)))
            .build(manager)
            .map_err(|e| format!("Failed to create connection pool: {}", e))?;

        let conn = pool
            .get()
            .map_err(|e| format!("Failed to get connection from pool: {}", e))?;
        init_schema(&conn)?;

        Ok(Arc::new(Self {
            pool: Arc::new(pool),
        }))
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, String> + Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| format!("Failed to get database connection: {}", e))?;
            f(&conn)
        })
        .await
        .map_err(|e| e.to_string())?
    }

    // --- Plans ---

    pub async fn plans_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<InterventionPlan>, String> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT plan_id, user_id, session_id, plan_type, title, concern_type,
                            severity, steps_json, resources_json, safety_reviewed, status,
                            created_at, completed_at, progress_pct
                     FROM intervention_plans
                     WHERE user_id = ?1 AND status = 'active'
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| e.to_string())?;

            let rows = stmt
                .query_map(params![user_id, limit as i64], row_to_plan)
                .map_err(|e| e.to_string())?;

            let mut plans = Vec::new();
            for row in rows {
                plans.push(row.map_err(|e| e.to_string())?);
            }
            Ok(plans)
        })
        .await
    }

    /// Fold step completion into a plan. Progress is monotone; a regression
    /// or an illegal status transition is a consistency violation.
    pub async fn record_plan_progress(
        &self,
        plan_id: Uuid,
        completed_steps: usize,
    ) -> Result<InterventionPlan, String> {
        self.with_conn(move |conn| {
            let plan_id_str = plan_id.to_string();
            let mut plan = conn
                .query_row(
                    "SELECT plan_id, user_id, session_id, plan_type, title, concern_type,
                            severity, steps_json, resources_json, safety_reviewed, status,
                            created_at, completed_at, progress_pct
                     FROM intervention_plans WHERE plan_id = ?1",
                    params![plan_id_str],
                    row_to_plan,
                )
                .optional()
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("plan {plan_id} not found"))?;

            let new_pct = plan.progress_for(completed_steps);
            if new_pct < plan.progress_pct {
                return Err(format!(
                    "consistency violation: progress cannot regress ({} -> {})",
                    plan.progress_pct, new_pct
                ));
            }

            plan.progress_pct = new_pct;
            if new_pct >= 100 {
                if !plan.status.can_transition_to(PlanStatus::Completed) {
                    return Err(format!(
                        "consistency violation: {} plan cannot complete",
                        plan.status.as_str()
                    ));
                }
                plan.status = PlanStatus::Completed;
                plan.completed_at = Some(Utc::now());
            }

            conn.execute(
                "UPDATE intervention_plans
                 SET progress_pct = ?2, status = ?3, completed_at = ?4
                 WHERE plan_id = ?1",
                params![
                    plan_id_str,
                    plan.progress_pct,
                    plan.status.as_str(),
                    plan.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| e.to_string())?;

            Ok(plan)
        })
        .await
    }

    // --- Cases ---

    pub async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, String> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT case_id, user_hash, session_id, severity, summary_redacted, status,
                        assigned_counsellor_id, sla_breach_at, created_at, updated_at,
                        contact_permitted
                 FROM cases WHERE case_id = ?1",
                params![case_id.to_string()],
                row_to_case,
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
    }

    /// Open cases for one counsellor, most severe first, then oldest first.
    pub async fn open_cases_for_counsellor(
        &self,
        counsellor_id: CounsellorId,
        limit: usize,
    ) -> Result<Vec<Case>, String> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT case_id, user_hash, session_id, severity, summary_redacted, status,
                            assigned_counsellor_id, sla_breach_at, created_at, updated_at,
                            contact_permitted
                     FROM cases
                     WHERE assigned_counsellor_id = ?1
                       AND status NOT IN ('resolved', 'closed')
                     ORDER BY CASE severity
                                WHEN 'critical' THEN 0
                                WHEN 'high' THEN 1
                                WHEN 'medium' THEN 2
                                ELSE 3
                              END,
                              created_at ASC
                     LIMIT ?2",
                )
                .map_err(|e| e.to_string())?;

            let rows = stmt
                .query_map(params![counsellor_id, limit as i64], row_to_case)
                .map_err(|e| e.to_string())?;

            let mut cases = Vec::new();
            for row in rows {
                cases.push(row.map_err(|e| e.to_string())?);
            }
            Ok(cases)
        })
        .await
    }

    pub async fn append_case_note(
        &self,
        case_id: Uuid,
        author_role: Role,
        body_redacted: String,
    ) -> Result<CaseNote, String> {
        self.with_conn(move |conn| {
            let note = CaseNote {
                note_id: Uuid::new_v4(),
                case_id,
                author_role,
                body_redacted,
                created_at: Utc::now(),
            };
            conn.execute(
                "INSERT INTO case_notes (note_id, case_id, author_role, body_redacted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    note.note_id.to_string(),
                    note.case_id.to_string(),
                    note.author_role.as_str(),
                    note.body_redacted,
                    note.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(note)
        })
        .await
    }

    // --- Consent ledger ---

    pub async fn record_consent(&self, record: ConsentRecord) -> Result<(), String> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO consent_ledger (user_id, consent_type, granted, version, method, granted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.user_id,
                    record.consent_type.as_str(),
                    record.granted as i64,
                    record.version,
                    record.method,
                    record.granted_at.to_rfc3339(),
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }

    // --- Events ---

    pub async fn append_events(&self, events: Vec<EventRecord>) -> Result<(), String> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "INSERT OR IGNORE INTO events
                     (event_id, kind, session_id, user_hash, payload_json, seq, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|e| e.to_string())?;

            for event in &events {
                stmt.execute(params![
                    event.event_id.to_string(),
                    event.kind.as_str(),
                    event.session_id,
                    event.user_hash,
                    serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string()),
                    event.seq as i64,
                    event.created_at.to_rfc3339(),
                ])
                .map_err(|e| e.to_string())?;
            }
            Ok(())
        })
        .await
    }

    pub async fn count_events(&self, kind: &'static str) -> Result<u64, String> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM events WHERE kind = ?1",
                params![kind],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| e.to_string())
        })
        .await
    }

    // --- Reference data ---

    pub async fn get_user_profile(&self, user_id: UserId) -> Result<Option<Value>, String> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT user_id, display_name, faculty, year_of_study FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(serde_json::json!({
                        "user_id": row.get::<_, i64>(0)?,
                        "display_name": row.get::<_, Option<String>>(1)?,
                        "faculty": row.get::<_, Option<String>>(2)?,
                        "year_of_study": row.get::<_, Option<i64>>(3)?,
                    }))
                },
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
    }

    pub async fn upsert_user(
        &self,
        user_id: UserId,
        display_name: Option<String>,
        faculty: Option<String>,
        year_of_study: Option<i64>,
    ) -> Result<(), String> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (user_id, display_name, faculty, year_of_study)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    display_name = excluded.display_name,
                    faculty = excluded.faculty,
                    year_of_study = excluded.year_of_study",
                params![user_id, display_name, faculty, year_of_study],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_counsellor(&self, counsellor: Counsellor) -> Result<(), String> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO counsellors
                 (counsellor_id, is_active, specializations_json, active_case_count, last_assigned_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(counsellor_id) DO UPDATE SET
                    is_active = excluded.is_active,
                    specializations_json = excluded.specializations_json,
                    active_case_count = excluded.active_case_count,
                    last_assigned_at = excluded.last_assigned_at",
                params![
                    counsellor.counsellor_id,
                    counsellor.is_active as i64,
                    serde_json::to_string(&counsellor.specializations)
                        .unwrap_or_else(|_| "[]".to_string()),
                    counsellor.active_case_count as i64,
                    counsellor.last_assigned_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PlanStore for SqlStore {
    async fn insert_plan(&self, plan: &InterventionPlan) -> Result<(), String> {
        let plan = plan.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO intervention_plans
                 (plan_id, user_id, session_id, plan_type, title, concern_type, severity,
                  steps_json, resources_json, safety_reviewed, status, created_at,
                  completed_at, progress_pct)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    plan.plan_id.to_string(),
                    plan.user_id,
                    plan.session_id,
                    plan.plan_type.as_str(),
                    plan.title,
                    plan.concern_type,
                    plan.severity.as_str(),
                    serde_json::to_string(&plan.steps).map_err(|e| e.to_string())?,
                    serde_json::to_string(&plan.resources).map_err(|e| e.to_string())?,
                    plan.safety_reviewed as i64,
                    plan.status.as_str(),
                    plan.created_at.to_rfc3339(),
                    plan.completed_at.map(|t| t.to_rfc3339()),
                    plan.progress_pct,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }

    async fn recent_plan_titles(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<String>, String> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT title FROM intervention_plans
                     WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                )
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))
                .map_err(|e| e.to_string())?;

            let mut titles = Vec::new();
            for row in rows {
                titles.push(row.map_err(|e| e.to_string())?);
            }
            Ok(titles)
        })
        .await
    }
}

#[async_trait]
impl CaseStore for SqlStore {
    async fn insert_case(&self, case: &Case) -> Result<(), String> {
        let case = case.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO cases
                 (case_id, user_hash, session_id, severity, summary_redacted, status,
                  assigned_counsellor_id, sla_breach_at, created_at, updated_at,
                  contact_permitted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    case.case_id.to_string(),
                    case.user_hash,
                    case.session_id,
                    case.severity.as_str(),
                    case.summary_redacted,
                    case.status.as_str(),
                    case.assigned_counsellor_id,
                    case.sla_breach_at.to_rfc3339(),
                    case.created_at.to_rfc3339(),
                    case.updated_at.to_rfc3339(),
                    case.contact_permitted as i64,
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
    }

    async fn active_counsellors(&self) -> Result<Vec<Counsellor>, String> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT counsellor_id, is_active, specializations_json,
                            active_case_count, last_assigned_at
                     FROM counsellors WHERE is_active = 1",
                )
                .map_err(|e| e.to_string())?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(Counsellor {
                        counsellor_id: row.get(0)?,
                        is_active: row.get::<_, i64>(1)? != 0,
                        specializations: serde_json::from_str(&row.get::<_, String>(2)?)
                            .unwrap_or_default(),
                        active_case_count: row.get::<_, i64>(3)?.max(0) as u32,
                        last_assigned_at: parse_opt_ts(row.get::<_, Option<String>>(4)?),
                    })
                })
                .map_err(|e| e.to_string())?;

            let mut counsellors = Vec::new();
            for row in rows {
                counsellors.push(row.map_err(|e| e.to_string())?);
            }
            Ok(counsellors)
        })
        .await
    }

    /// Assignment is transactional: the case must still accept the
    /// `assigned` transition, and the counsellor's load is bumped in the
    /// same unit of work.
    async fn assign_case(&self, case_id: Uuid, counsellor_id: CounsellorId) -> Result<(), String> {
        self.with_conn(move |conn| {
            let case_id_str = case_id.to_string();

            let status: String = conn
                .query_row(
                    "SELECT status FROM cases WHERE case_id = ?1",
                    params![case_id_str],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("case {case_id} not found"))?;

            let current = CaseStatus::parse(&status)
                .ok_or_else(|| format!("case {case_id} has unknown status '{status}'"))?;
            if !current.can_transition_to(CaseStatus::Assigned) {
                return Err(format!(
                    "consistency violation: case in status '{status}' cannot be assigned"
                ));
            }

            let now = Utc::now().to_rfc3339();
            conn.execute("BEGIN IMMEDIATE", [])
                .map_err(|e| e.to_string())?;

            let result = (|| -> Result<(), String> {
                conn.execute(
                    "UPDATE cases
                     SET status = 'assigned', assigned_counsellor_id = ?2, updated_at = ?3
                     WHERE case_id = ?1",
                    params![case_id_str, counsellor_id, now],
                )
                .map_err(|e| e.to_string())?;

                conn.execute(
                    "UPDATE counsellors
                     SET active_case_count = active_case_count + 1, last_assigned_at = ?2
                     WHERE counsellor_id = ?1",
                    params![counsellor_id, now],
                )
                .map_err(|e| e.to_string())?;
                Ok(())
            })();

            match result {
                Ok(()) => conn.execute("COMMIT", []).map_err(|e| e.to_string()).map(|_| ()),
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    Err(e)
                }
            }
        })
        .await
    }

    async fn current_consent(
        &self,
        user_id: UserId,
        consent_type: ConsentType,
    ) -> Result<Option<ConsentRecord>, String> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT user_id, consent_type, granted, version, method, granted_at
                 FROM consent_ledger
                 WHERE user_id = ?1 AND consent_type = ?2
                 ORDER BY entry_id DESC LIMIT 1",
                params![user_id, consent_type.as_str()],
                |row| {
                    Ok(ConsentRecord {
                        user_id: row.get(0)?,
                        consent_type: ConsentType::parse(&row.get::<_, String>(1)?)
                            .unwrap_or(ConsentType::DataSharing),
                        granted: row.get::<_, i64>(2)? != 0,
                        version: row.get(3)?,
                        method: row.get(4)?,
                        granted_at: parse_opt_ts(Some(row.get::<_, String>(5)?))
                            .unwrap_or_else(Utc::now),
                    })
                },
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
    }
}

fn init_schema(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS intervention_plans (
            plan_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            session_id TEXT NOT NULL,
            plan_type TEXT NOT NULL,
            title TEXT NOT NULL,
            concern_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            steps_json TEXT NOT NULL,
            resources_json TEXT NOT NULL,
            safety_reviewed INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            progress_pct INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_plans_user ON intervention_plans(user_id, status);

        CREATE TABLE IF NOT EXISTS cases (
            case_id TEXT PRIMARY KEY,
            user_hash TEXT NOT NULL,
            session_id TEXT NOT NULL,
            severity TEXT NOT NULL,
            summary_redacted TEXT NOT NULL,
            status TEXT NOT NULL,
            assigned_counsellor_id INTEGER,
            sla_breach_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            contact_permitted INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_cases_counsellor ON cases(assigned_counsellor_id, status);

        CREATE TABLE IF NOT EXISTS case_notes (
            note_id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL,
            author_role TEXT NOT NULL,
            body_redacted TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            event_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            session_id TEXT,
            user_hash TEXT,
            payload_json TEXT NOT NULL,
            seq INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind, created_at);

        CREATE TABLE IF NOT EXISTS consent_ledger (
            entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            consent_type TEXT NOT NULL,
            granted INTEGER NOT NULL,
            version TEXT NOT NULL,
            method TEXT NOT NULL,
            granted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counsellors (
            counsellor_id INTEGER PRIMARY KEY,
            is_active INTEGER NOT NULL,
            specializations_json TEXT NOT NULL,
            active_case_count INTEGER NOT NULL,
            last_assigned_at TEXT
        );

        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY,
            display_name TEXT,
            faculty TEXT,
            year_of_study INTEGER
        );",
    )
    .map_err(|e| e.to_string())
}

fn parse_opt_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    })
}

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<InterventionPlan> {
    let plan_id: String = row.get(0)?;
    let plan_type: String = row.get(3)?;
    let severity: String = row.get(6)?;
    let steps_json: String = row.get(7)?;
    let resources_json: String = row.get(8)?;
    let status: String = row.get(10)?;
    let created_at: String = row.get(11)?;
    let completed_at: Option<String> = row.get(12)?;

    Ok(InterventionPlan {
        plan_id: Uuid::parse_str(&plan_id).unwrap_or_default(),
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        plan_type: PlanType::parse(&plan_type).unwrap_or(PlanType::Custom),
        title: row.get(4)?,
        concern_type: row.get(5)?,
        severity: match severity.as_str() {
            "low" => RiskLevel::Low,
            "moderate" => RiskLevel::Moderate,
            "high" => RiskLevel::High,
            "critical" => RiskLevel::Critical,
            _ => RiskLevel::Moderate,
        },
        steps: serde_json::from_str(&steps_json).unwrap_or_default(),
        resources: serde_json::from_str(&resources_json).unwrap_or_default(),
        safety_reviewed: row.get::<_, i64>(9)? != 0,
        status: PlanStatus::parse(&status).unwrap_or(PlanStatus::Draft),
        created_at: parse_opt_ts(Some(created_at)).unwrap_or_else(Utc::now),
        completed_at: parse_opt_ts(completed_at),
        progress_pct: row.get::<_, i64>(13)?.clamp(0, 100) as u8,
    })
}

fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<Case> {
    let case_id: String = row.get(0)?;
    let severity: String = row.get(3)?;
    let status: String = row.get(5)?;
    let sla_breach_at: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Case {
        case_id: Uuid::parse_str(&case_id).unwrap_or_default(),
        user_hash: row.get(1)?,
        session_id: row.get(2)?,
        severity: CaseSeverity::parse(&severity).unwrap_or(CaseSeverity::High),
        summary_redacted: row.get(4)?,
        status: CaseStatus::parse(&status).unwrap_or(CaseStatus::New),
        assigned_counsellor_id: row.get(6)?,
        sla_breach_at: parse_opt_ts(Some(sla_breach_at)).unwrap_or_else(Utc::now),
        created_at: parse_opt_ts(Some(created_at)).unwrap_or_else(Utc::now),
        updated_at: parse_opt_ts(Some(updated_at)).unwrap_or_else(Utc::now),
        contact_permitted: row.get::<_, i64>(10)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{EventKind, PlanResource, PlanStep, ResourceKind, ResourceRef};
    use tempfile::TempDir;

    async fn store() -> (Arc<SqlStore>, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("aika.db");
        let store = SqlStore::new(path.to_str().unwrap()).expect("store init");
        (store, dir)
    }

    fn plan() -> InterventionPlan {
        InterventionPlan {
            plan_id: Uuid::new_v4(),
            user_id: 42,
            session_id: "sess".to_string(),
            plan_type: PlanType::BreakDownProblem,
            title: "Memecah beban skripsi".to_string(),
            concern_type: "academic_stress".to_string(),
            severity: RiskLevel::Moderate,
            steps: vec![
                PlanStep {
                    order: 1,
                    title: "A".to_string(),
                    body: "a".to_string(),
                    est_duration_min: 5,
                },
                PlanStep {
                    order: 2,
                    title: "B".to_string(),
                    body: "b".to_string(),
                    est_duration_min: 5,
                },
                PlanStep {
                    order: 3,
                    title: "C".to_string(),
                    body: "c".to_string(),
                    est_duration_min: 5,
                },
            ],
            resources: vec![PlanResource {
                label: "Artikel".to_string(),
                reference: ResourceRef::Url("https://example.org".to_string()),
                kind: ResourceKind::Article,
            }],
            safety_reviewed: true,
            status: PlanStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
            progress_pct: 0,
        }
    }

    fn case(severity: CaseSeverity) -> Case {
        let now = Utc::now();
        Case {
            case_id: Uuid::new_v4(),
            user_hash: "ab12cd34ef56ab78".to_string(),
            session_id: "sess".to_string(),
            severity,
            summary_redacted: "- turn".to_string(),
            status: CaseStatus::New,
            assigned_counsellor_id: None,
            sla_breach_at: now + chrono::Duration::hours(2),
            created_at: now,
            updated_at: now,
            contact_permitted: false,
        }
    }

    #[tokio::test]
    async fn plan_insert_is_idempotent_on_plan_id() {
        let (store, _dir) = store().await;
        let p = plan();
        store.insert_plan(&p).await.unwrap();
        store.insert_plan(&p).await.unwrap();

        let plans = store.plans_for_user(42, 10).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].plan_id, p.plan_id);
        assert_eq!(plans[0].steps.len(), 3);
        assert_eq!(plans[0].resources.len(), 1);
    }

    #[tokio::test]
    async fn plan_progress_is_monotone_and_completes() {
        let (store, _dir) = store().await;
        let p = plan();
        store.insert_plan(&p).await.unwrap();

        let after_one = store.record_plan_progress(p.plan_id, 1).await.unwrap();
        assert_eq!(after_one.progress_pct, 33);
        assert_eq!(after_one.status, PlanStatus::Active);

        let done = store.record_plan_progress(p.plan_id, 3).await.unwrap();
        assert_eq!(done.progress_pct, 100);
        assert_eq!(done.status, PlanStatus::Completed);
        assert!(done.completed_at.is_some());

        // Regression is a consistency violation.
        let err = store.record_plan_progress(p.plan_id, 1).await.unwrap_err();
        assert!(err.contains("consistency"));
    }

    #[tokio::test]
    async fn case_insert_is_idempotent_and_assignment_transitions() {
        let (store, _dir) = store().await;
        store
            .upsert_counsellor(Counsellor {
                counsellor_id: 9,
                is_active: true,
                specializations: vec!["anxiety".to_string()],
                active_case_count: 0,
                last_assigned_at: None,
            })
            .await
            .unwrap();

        let c = case(CaseSeverity::Critical);
        store.insert_case(&c).await.unwrap();
        store.insert_case(&c).await.unwrap();

        store.assign_case(c.case_id, 9).await.unwrap();

        let loaded = store.get_case(c.case_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CaseStatus::Assigned);
        assert_eq!(loaded.assigned_counsellor_id, Some(9));

        // Assigning again violates monotonicity.
        let err = store.assign_case(c.case_id, 9).await.unwrap_err();
        assert!(err.contains("consistency"));

        let counsellors = store.active_counsellors().await.unwrap();
        assert_eq!(counsellors[0].active_case_count, 1);
        assert!(counsellors[0].last_assigned_at.is_some());
    }

    #[tokio::test]
    async fn open_cases_order_by_severity_then_age() {
        let (store, _dir) = store().await;
        store
            .upsert_counsellor(Counsellor {
                counsellor_id: 9,
                is_active: true,
                specializations: vec![],
                active_case_count: 0,
                last_assigned_at: None,
            })
            .await
            .unwrap();

        let mut high = case(CaseSeverity::High);
        high.created_at = Utc::now() - chrono::Duration::hours(5);
        let critical = case(CaseSeverity::Critical);

        store.insert_case(&high).await.unwrap();
        store.insert_case(&critical).await.unwrap();
        store.assign_case(high.case_id, 9).await.unwrap();
        store.assign_case(critical.case_id, 9).await.unwrap();

        let open = store.open_cases_for_counsellor(9, 10).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].case_id, critical.case_id);
        assert_eq!(open[1].case_id, high.case_id);
    }

    #[tokio::test]
    async fn consent_ledger_returns_latest_entry() {
        let (store, _dir) = store().await;
        let mut record = ConsentRecord {
            user_id: 42,
            consent_type: ConsentType::EmergencyContact,
            granted: true,
            version: "v1".to_string(),
            granted_at: Utc::now(),
            method: "registration_form".to_string(),
        };
        store.record_consent(record.clone()).await.unwrap();

        record.granted = false;
        record.version = "v2".to_string();
        store.record_consent(record).await.unwrap();

        let current = store
            .current_consent(42, ConsentType::EmergencyContact)
            .await
            .unwrap()
            .unwrap();
        assert!(!current.granted);
        assert_eq!(current.version, "v2");

        assert!(store
            .current_consent(42, ConsentType::Research)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn events_append_and_count() {
        let (store, _dir) = store().await;
        let events = vec![
            EventRecord::new(EventKind::RiskAssessed, serde_json::json!({"risk": "low"})),
            EventRecord::new(EventKind::CacheHit, serde_json::json!({})),
        ];
        store.append_events(events).await.unwrap();
        assert_eq!(store.count_events("risk_assessed").await.unwrap(), 1);
        assert_eq!(store.count_events("cache_hit").await.unwrap(), 1);
        assert_eq!(store.count_events("case_created").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn user_profile_round_trip() {
        let (store, _dir) = store().await;
        assert!(store.get_user_profile(42).await.unwrap().is_none());

        store
            .upsert_user(42, Some("B.".to_string()), Some("Engineering".to_string()), Some(3))
            .await
            .unwrap();
        let profile = store.get_user_profile(42).await.unwrap().unwrap();
        assert_eq!(profile["faculty"], "Engineering");
    }

    #[tokio::test]
    async fn case_notes_append() {
        let (store, _dir) = store().await;
        let c = case(CaseSeverity::High);
        store.insert_case(&c).await.unwrap();
        let note = store
            .append_case_note(c.case_id, Role::Counsellor, "first contact made".to_string())
            .await
            .unwrap();
        assert_eq!(note.case_id, c.case_id);
    }
}
