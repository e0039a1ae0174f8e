//! Safety review of a drafted plan: a deterministic rule pass plus an
//! independent model check. A plan ships only when both pass.

use serde::Deserialize;
use shared_types::{PlanStep, RiskLevel, MAX_STEP_BODY_CHARS};

/// Terms whose presence in a step fails review outright. The lists cover
/// medical advice, medication, third-party contact instructions and
/// behaviour that can increase risk.
static MEDICAL_TERMS: &[&str] = &[
    "diagnos",
    "medication",
    "prescri",
    "dosage",
    "antidepressant",
    "xanax",
    "valium",
    "obat",
    "dosis",
    "resep",
    "diagnosa",
];

static THIRD_PARTY_TERMS: &[&str] = &[
    "contact your ex",
    "call your ex",
    "confront",
    "hubungi mantan",
    "datangi rumah",
    "labrak",
];

/// Isolation suggestions are disqualifying at any severity.
static ISOLATION_TERMS: &[&str] = &[
    "stay alone",
    "be alone",
    "isolate",
    "menyendiri",
    "mengurung diri",
];

/// Harmful-habit suggestions are disqualifying once risk is elevated.
static RISK_HABIT_TERMS: &[&str] = &[
    "alcohol",
    "drink to",
    "alkohol",
    "minum miras",
    "skip sleep",
    "begadang",
];

/// Outcome of the deterministic rule pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleReview {
    Pass,
    Fail(String),
}

/// Deterministic checks. `severity` matters because an otherwise harmless
/// suggestion ("take a quiet walk alone") reads differently under high risk.
pub fn rule_review(steps: &[PlanStep], severity: RiskLevel) -> RuleReview {
    if steps.is_empty() {
        return RuleReview::Fail("plan has no steps".to_string());
    }

    for step in steps {
        if step.body.chars().count() > MAX_STEP_BODY_CHARS {
            return RuleReview::Fail(format!(
                "step '{}' body exceeds {} characters",
                step.title, MAX_STEP_BODY_CHARS
            ));
        }

        let text = format!("{} {}", step.title, step.body).to_lowercase();

        if let Some(term) = MEDICAL_TERMS.iter().find(|t| text.contains(*t)) {
            return RuleReview::Fail(format!("step '{}' contains medical advice ({term})", step.title));
        }
        if let Some(term) = THIRD_PARTY_TERMS.iter().find(|t| text.contains(*t)) {
            return RuleReview::Fail(format!(
                "step '{}' instructs contact with a third party ({term})",
                step.title
            ));
        }
        if let Some(term) = ISOLATION_TERMS.iter().find(|t| text.contains(*t)) {
            return RuleReview::Fail(format!(
                "step '{}' could increase risk ({term})",
                step.title
            ));
        }
        if severity >= RiskLevel::Moderate {
            if let Some(term) = RISK_HABIT_TERMS.iter().find(|t| text.contains(*t)) {
                return RuleReview::Fail(format!(
                    "step '{}' could increase risk ({term})",
                    step.title
                ));
            }
        }
    }

    RuleReview::Pass
}

/// Model verdict for the independent review prompt.
#[derive(Deserialize, Debug, Clone)]
pub struct ReviewVerdict {
    pub approved: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

pub fn review_system_prompt() -> &'static str {
    "You are a clinical safety reviewer for a university mental-health \
assistant. You receive an intervention plan drafted for a student. Reject the \
plan if any step: gives medical advice or names medication; tells the student \
to contact a specific third party; could plausibly increase risk (for \
example, suggesting isolation or substance use); or is incoherent. You are \
not reviewing style, only safety.\n\
Respond with ONLY a JSON object: {\"approved\": true|false, \"reasons\": [\"...\"]}"
}

pub fn review_user_prompt(title: &str, steps: &[PlanStep], severity: RiskLevel) -> String {
    let mut out = format!("Severity: {severity}\nPlan title: {title}\nSteps:\n");
    for step in steps {
        out.push_str(&format!(
            "{}. {} ({} min): {}\n",
            step.order, step.title, step.est_duration_min, step.body
        ));
    }
    out
}

pub fn parse_verdict(raw: &str) -> Result<ReviewVerdict, String> {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let clean = without_open.strip_suffix("```").unwrap_or(without_open).trim();
    serde_json::from_str(clean).map_err(|e| format!("invalid review verdict: {e}"))
}
