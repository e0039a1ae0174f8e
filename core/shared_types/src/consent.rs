use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    DataSharing,
    Research,
    EmergencyContact,
}

impl ConsentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentType::DataSharing => "data_sharing",
            ConsentType::Research => "research",
            ConsentType::EmergencyContact => "emergency_contact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data_sharing" => Some(ConsentType::DataSharing),
            "research" => Some(ConsentType::Research),
            "emergency_contact" => Some(ConsentType::EmergencyContact),
            _ => None,
        }
    }
}

/// One entry in the append-only consent ledger. Current state for a
/// `(user_id, consent_type)` pair is the latest entry.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConsentRecord {
    pub user_id: UserId,
    pub consent_type: ConsentType,
    pub granted: bool,
    pub version: String,
    pub granted_at: DateTime<Utc>,
    /// How consent was captured, e.g. "registration_form", "profile_update".
    pub method: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_type_round_trip() {
        for ty in [
            ConsentType::DataSharing,
            ConsentType::Research,
            ConsentType::EmergencyContact,
        ] {
            assert_eq!(ConsentType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ConsentType::parse("marketing"), None);
    }
}
