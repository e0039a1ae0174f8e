use serde::{Deserialize, Serialize};
use std::fmt;

pub mod case;
pub mod config;
pub mod consent;
pub mod event;
pub mod llm;
pub mod plan;
pub mod risk;
pub mod state;
pub mod turn;

pub use case::*;
pub use config::*;
pub use consent::*;
pub use event::*;
pub use llm::*;
pub use plan::*;
pub use risk::*;
pub use state::*;
pub use turn::*;

/// Opaque session identifier. Stable for the life of an interaction window.
pub type SessionId = String;

/// Identifier for a single user turn; doubles as the correlation id used to
/// join logs and traces across the orchestrator and agents.
pub type TurnId = uuid::Uuid;

/// Numeric user identifier owned by the (out of scope) identity layer.
pub type UserId = i64;

/// Counsellor identifier from the relational store.
pub type CounsellorId = i64;

/// Caller role attached to every inbound turn.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Counsellor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Counsellor => "counsellor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
