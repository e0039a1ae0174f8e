use crate::{SessionId, TurnId};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Reasoning notes attached to an assessment are capped at 1 KiB.
pub const MAX_REASONING_NOTES_BYTES: usize = 1024;

/// Risk tier emitted by the safety triage pipeline. Ordering is meaningful:
/// conservative fusion takes the maximum across tiers.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Moderate => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(RiskLevel::Low),
            1 => Some(RiskLevel::Moderate),
            2 => Some(RiskLevel::High),
            3 => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// Risk at or above `high` requires a human handoff.
    pub fn requires_handoff(self) -> bool {
        self >= RiskLevel::High
    }

    /// Only low/moderate assessments may be written to the tool-result cache.
    pub fn is_cacheable(self) -> bool {
        self <= RiskLevel::Moderate
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded-but-extensible intent vocabulary. Unknown values survive a round
/// trip as `Other` so callers can log them instead of failing the turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intent {
    CrisisSupport,
    AcuteDistress,
    AcademicStress,
    GeneralDistress,
    GeneralSupport,
    PracticalRequest,
    Other(String),
}

impl Intent {
    pub fn as_str(&self) -> &str {
        match self {
            Intent::CrisisSupport => "crisis_support",
            Intent::AcuteDistress => "acute_distress",
            Intent::AcademicStress => "academic_stress",
            Intent::GeneralDistress => "general_distress",
            Intent::GeneralSupport => "general_support",
            Intent::PracticalRequest => "practical_request",
            Intent::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "crisis_support" => Intent::CrisisSupport,
            "acute_distress" => Intent::AcuteDistress,
            "academic_stress" => Intent::AcademicStress,
            "general_distress" => Intent::GeneralDistress,
            "general_support" => Intent::GeneralSupport,
            "practical_request" => Intent::PracticalRequest,
            other => Intent::Other(other.to_string()),
        }
    }

    /// True when the caller sent a value outside the known vocabulary.
    pub fn is_known(&self) -> bool {
        !matches!(self, Intent::Other(_))
    }

    /// Values advertised to the LLM in structured prompts.
    pub const KNOWN_VALUES: [&'static str; 6] = [
        "crisis_support",
        "acute_distress",
        "academic_stress",
        "general_distress",
        "general_support",
        "practical_request",
    ];
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Intent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IntentVisitor;

        impl<'de> de::Visitor<'de> for IntentVisitor {
            type Value = Intent;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an intent string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Intent, E> {
                Ok(Intent::parse(v))
            }
        }

        deserializer.deserialize_str(IntentVisitor)
    }
}

/// Which tier produced the final assessment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    Rules,
    Llm,
    Cache,
    Fallback,
}

/// Output of the safety triage pipeline for one turn.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RiskAssessment {
    pub assessment_id: Uuid,
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub risk_level: RiskLevel,
    pub intent: Intent,
    pub handoff: bool,
    pub source: AssessmentSource,
    /// Redacted free text, truncated to `MAX_REASONING_NOTES_BYTES`.
    pub reasoning_notes: String,
    pub created_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn new(
        session_id: SessionId,
        turn_id: TurnId,
        risk_level: RiskLevel,
        intent: Intent,
        source: AssessmentSource,
        reasoning_notes: impl Into<String>,
    ) -> Self {
        let mut notes = reasoning_notes.into();
        truncate_utf8(&mut notes, MAX_REASONING_NOTES_BYTES);
        Self {
            assessment_id: Uuid::new_v4(),
            session_id,
            turn_id,
            risk_level,
            intent,
            handoff: risk_level.requires_handoff(),
            source,
            reasoning_notes: notes,
            created_at: Utc::now(),
        }
    }

    /// Conservative fusion with another tier's result: level is the max, the
    /// handoff flag sticks if any tier raised it.
    pub fn fuse(mut self, other: &RiskAssessment) -> Self {
        if other.risk_level > self.risk_level {
            self.risk_level = other.risk_level;
            self.intent = other.intent.clone();
        }
        self.handoff = self.handoff || other.handoff || self.risk_level.requires_handoff();
        self
    }
}

/// Confidence thresholds for mapping tier-2 model output onto a risk level.
/// Values are configurable but the ordering between them must be preserved.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TriageThresholds {
    pub critical_upper: f64,
    pub critical_lower: f64,
    pub high_upper: f64,
    pub high_lower: f64,
    pub moderate: f64,
}

impl Default for TriageThresholds {
    fn default() -> Self {
        Self {
            critical_upper: 0.65,
            critical_lower: 0.50,
            high_upper: 0.70,
            high_lower: 0.55,
            moderate: 0.65,
        }
    }
}

impl TriageThresholds {
    /// Sanity check used at startup: thresholds must keep their ordering or
    /// the mapping loses monotonicity.
    pub fn is_ordered(&self) -> bool {
        self.critical_lower < self.critical_upper
            && self.high_lower < self.high_upper
            && (0.0..=1.0).contains(&self.critical_upper)
            && (0.0..=1.0).contains(&self.high_upper)
            && (0.0..=1.0).contains(&self.moderate)
    }
}

fn truncate_utf8(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
