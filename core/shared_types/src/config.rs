use crate::{Role, TriageThresholds};
use serde::{Deserialize, Serialize};

/// LLM provider endpoint configuration. The endpoint must support function
/// calling; strict JSON mode is required for triage and safety-review
/// prompts.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LlmProviderConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model_name: String,
    #[serde(default = "default_true")]
    pub strict_json: bool,
}

/// Redis cache configuration. When absent (or unreachable) the KV layer runs
/// on its in-memory fallback.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,
}

/// Sliding rate-limit windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    pub const ALL: [RateWindow; 3] = [RateWindow::Minute, RateWindow::Hour, RateWindow::Day];

    pub fn seconds(self) -> u64 {
        match self {
            RateWindow::Minute => 60,
            RateWindow::Hour => 3600,
            RateWindow::Day => 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RateWindow::Minute => "60",
            RateWindow::Hour => "3600",
            RateWindow::Day => "86400",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RateLimitsConfig {
    #[serde(default = "default_student_per_minute")]
    pub per_minute_student: u32,
    #[serde(default = "default_student_per_hour")]
    pub per_hour_student: u32,
    #[serde(default = "default_student_per_day")]
    pub per_day_student: u32,
    #[serde(default = "default_counsellor_per_minute")]
    pub per_minute_counsellor: u32,
    #[serde(default = "default_counsellor_per_hour")]
    pub per_hour_counsellor: u32,
    #[serde(default = "default_counsellor_per_day")]
    pub per_day_counsellor: u32,
    #[serde(default = "default_true")]
    pub bypass_admin: bool,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            per_minute_student: default_student_per_minute(),
            per_hour_student: default_student_per_hour(),
            per_day_student: default_student_per_day(),
            per_minute_counsellor: default_counsellor_per_minute(),
            per_hour_counsellor: default_counsellor_per_hour(),
            per_day_counsellor: default_counsellor_per_day(),
            bypass_admin: true,
        }
    }
}

impl RateLimitsConfig {
    /// Ceiling for a role in a window. Admins fall back to the counsellor
    /// limits when the bypass flag is off.
    pub fn limit_for(&self, role: Role, window: RateWindow) -> u32 {
        match (role, window) {
            (Role::Student, RateWindow::Minute) => self.per_minute_student,
            (Role::Student, RateWindow::Hour) => self.per_hour_student,
            (Role::Student, RateWindow::Day) => self.per_day_student,
            (Role::Counsellor | Role::Admin, RateWindow::Minute) => self.per_minute_counsellor,
            (Role::Counsellor | Role::Admin, RateWindow::Hour) => self.per_hour_counsellor,
            (Role::Counsellor | Role::Admin, RateWindow::Day) => self.per_day_counsellor,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct SlaConfig {
    #[serde(default = "default_critical_sla_minutes")]
    pub critical_sla_minutes: i64,
    #[serde(default = "default_default_sla_minutes")]
    pub default_sla_minutes: i64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            critical_sla_minutes: default_critical_sla_minutes(),
            default_sla_minutes: default_default_sla_minutes(),
        }
    }
}

/// Gate for skipping a full tier-2 classification on quiet stretches of a
/// conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct SkipClassificationConfig {
    #[serde(default = "default_skip_max_messages")]
    pub max_messages: u32,
    #[serde(default = "default_skip_max_length")]
    pub max_length: usize,
}

impl Default for SkipClassificationConfig {
    fn default() -> Self {
        Self {
            max_messages: default_skip_max_messages(),
            max_length: default_skip_max_length(),
        }
    }
}

/// Hard deadlines for tool calls and the whole turn, in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ToolBudgetsConfig {
    #[serde(default = "default_sta_deadline_ms")]
    pub safety_triage_ms: u64,
    #[serde(default = "default_sca_deadline_ms")]
    pub support_coach_ms: u64,
    #[serde(default = "default_sda_deadline_ms")]
    pub service_desk_ms: u64,
    #[serde(default = "default_catalogue_deadline_ms")]
    pub catalogue_read_ms: u64,
    #[serde(default = "default_turn_deadline_ms")]
    pub turn_ms: u64,
}

impl Default for ToolBudgetsConfig {
    fn default() -> Self {
        Self {
            safety_triage_ms: default_sta_deadline_ms(),
            support_coach_ms: default_sca_deadline_ms(),
            service_desk_ms: default_sda_deadline_ms(),
            catalogue_read_ms: default_catalogue_deadline_ms(),
            turn_ms: default_turn_deadline_ms(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// Root configuration for one worker process.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AikaConfig {
    pub llm: LlmProviderConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub skip_classification: SkipClassificationConfig,
    #[serde(default)]
    pub tools: ToolBudgetsConfig,
    #[serde(default)]
    pub triage: TriageThresholds,
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: u8,
    #[serde(default = "default_sta_cache_ttl")]
    pub sta_cache_ttl_seconds: u64,
    #[serde(default = "default_session_idle_ttl")]
    pub session_idle_ttl_seconds: u64,
    /// Process secret for the keyed user hash. Usually injected via
    /// `{{REDACTION_SALT}}` interpolation.
    pub redaction_salt: String,
}

fn default_true() -> bool {
    true
}
fn default_pool_size() -> u32 {
    8
}
fn default_student_per_minute() -> u32 {
    10
}
fn default_student_per_hour() -> u32 {
    120
}
fn default_student_per_day() -> u32 {
    600
}
fn default_counsellor_per_minute() -> u32 {
    30
}
fn default_counsellor_per_hour() -> u32 {
    600
}
fn default_counsellor_per_day() -> u32 {
    2400
}
fn default_critical_sla_minutes() -> i64 {
    120
}
fn default_default_sla_minutes() -> i64 {
    1440
}
fn default_skip_max_messages() -> u32 {
    5
}
fn default_skip_max_length() -> usize {
    200
}
fn default_sta_deadline_ms() -> u64 {
    3_000
}
fn default_sca_deadline_ms() -> u64 {
    8_000
}
fn default_sda_deadline_ms() -> u64 {
    4_000
}
fn default_catalogue_deadline_ms() -> u64 {
    500
}
fn default_turn_deadline_ms() -> u64 {
    20_000
}
fn default_max_tool_turns() -> u8 {
    5
}
fn default_sta_cache_ttl() -> u64 {
    3_600
}
fn default_session_idle_ttl() -> u64 {
    3_600
}
fn default_sqlite_path() -> String {
    "data/aika.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_gets_spec_defaults() {
        let cfg: AikaConfig = toml::from_str(
            r#"
redaction_salt = "test-salt"

[llm]
provider = "openrouter"
model_name = "test-model"
"#,
        )
        .unwrap();

        assert_eq!(cfg.max_tool_turns, 5);
        assert_eq!(cfg.sta_cache_ttl_seconds, 3600);
        assert_eq!(cfg.session_idle_ttl_seconds, 3600);
        assert_eq!(cfg.sla.critical_sla_minutes, 120);
        assert_eq!(cfg.sla.default_sla_minutes, 1440);
        assert_eq!(cfg.skip_classification.max_messages, 5);
        assert_eq!(cfg.skip_classification.max_length, 200);
        assert_eq!(cfg.rate_limits.per_minute_student, 10);
        assert!(cfg.rate_limits.bypass_admin);
        assert!(cfg.llm.strict_json);
        assert!(cfg.redis.is_none());
    }

    #[test]
    fn window_seconds_match_keys() {
        assert_eq!(RateWindow::Minute.seconds(), 60);
        assert_eq!(RateWindow::Hour.seconds(), 3600);
        assert_eq!(RateWindow::Day.seconds(), 86_400);
        for w in RateWindow::ALL {
            assert_eq!(w.as_str(), w.seconds().to_string());
        }
    }

    #[test]
    fn limits_resolve_per_role() {
        let limits = RateLimitsConfig::default();
        assert_eq!(limits.limit_for(Role::Student, RateWindow::Minute), 10);
        assert_eq!(limits.limit_for(Role::Counsellor, RateWindow::Minute), 30);
        // Admin shares the counsellor ceilings when not bypassed outright.
        assert_eq!(limits.limit_for(Role::Admin, RateWindow::Hour), 600);
    }
}
