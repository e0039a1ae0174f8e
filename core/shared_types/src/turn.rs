use crate::{Role, SessionId, TurnId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound message text larger than this is rejected as input-invalid.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// One redacted prior exchange supplied by the transport.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryTurn {
    /// "user" or "assistant".
    pub speaker: Speaker,
    pub text_redacted: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// The transport-facing request for one turn.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TurnRequest {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub text: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

/// The transport-facing response. `reply` is always non-empty; failures
/// inside the core surface as degraded-but-successful turns.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TurnResponse {
    pub reply: String,
    pub metadata: TurnMetadata,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TurnMetadata {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<crate::RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<Uuid>,
    pub agents_invoked: Vec<String>,
    pub tools_invoked: Vec<String>,
    pub processing_time_ms: u64,
}

impl TurnMetadata {
    pub fn new(session_id: SessionId, turn_id: TurnId) -> Self {
        Self {
            session_id,
            turn_id,
            risk_level: None,
            plan_id: None,
            case_id: None,
            agents_invoked: Vec::new(),
            tools_invoked: Vec::new(),
            processing_time_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_request_defaults_optional_fields() {
        let req: TurnRequest = serde_json::from_str(
            r#"{"user_id": 42, "role": "student", "text": "halo"}"#,
        )
        .unwrap();
        assert_eq!(req.user_id, 42);
        assert!(req.session_id.is_none());
        assert!(req.history.is_empty());
    }

    #[test]
    fn metadata_omits_absent_ids() {
        let meta = TurnMetadata::new("sess".to_string(), Uuid::new_v4());
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("plan_id").is_none());
        assert!(json.get("case_id").is_none());
        assert!(json.get("risk_level").is_none());
    }
}
