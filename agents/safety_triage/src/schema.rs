//! Strict parsing of the tier-2 model output.

use jsonschema::{Draft, JSONSchema};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{RiskLevel, TriageThresholds};

static TIER2_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    let schema = json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["analysis", "confidence", "intent"],
        "properties": {
            "analysis": {
                "type": "object",
                "required": [
                    "severity",
                    "method_mention",
                    "immediacy",
                    "protective_factors",
                    "cultural_idiom",
                    "academic_stressors",
                    "prior_turn_continuity",
                    "confidence_rationale"
                ],
                "additionalProperties": { "type": "string" }
            },
            "confidence": {
                "type": "object",
                "required": ["critical", "high", "moderate"],
                "properties": {
                    "critical": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "high": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                    "moderate": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                },
                "additionalProperties": false
            },
            "intent": { "type": "string", "minLength": 1 }
        },
        "additionalProperties": false
    });

    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema)
        .expect("tier-2 schema must be valid")
});

#[derive(Deserialize, Debug, Clone)]
pub struct Tier2Analysis {
    pub severity: String,
    pub method_mention: String,
    pub immediacy: String,
    pub protective_factors: String,
    pub cultural_idiom: String,
    pub academic_stressors: String,
    pub prior_turn_continuity: String,
    pub confidence_rationale: String,
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct Confidences {
    pub critical: f64,
    pub high: f64,
    pub moderate: f64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Tier2Output {
    pub analysis: Tier2Analysis,
    pub confidence: Confidences,
    pub intent: String,
}

impl Tier2Output {
    /// Condensed analysis for the assessment's reasoning notes. Everything
    /// here derives from redacted input.
    pub fn notes(&self) -> String {
        format!(
            "severity: {}; method: {}; immediacy: {}; protective: {}; rationale: {}",
            self.analysis.severity,
            self.analysis.method_mention,
            self.analysis.immediacy,
            self.analysis.protective_factors,
            self.analysis.confidence_rationale
        )
    }
}

/// Parse and schema-validate a raw model answer.
pub fn parse_tier2(raw: &str) -> Result<Tier2Output, String> {
    let stripped = strip_fences(raw);
    let value: Value =
        serde_json::from_str(stripped).map_err(|e| format!("invalid JSON: {e}"))?;

    if let Err(errors) = TIER2_SCHEMA.validate(&value) {
        let details = errors
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("; ");
        return Err(format!("schema validation failed: {details}"));
    }

    serde_json::from_value(value).map_err(|e| format!("deserialization failed: {e}"))
}

/// Models occasionally wrap the object in a markdown fence despite the
/// instruction; tolerate that one deviation.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

/// Map the model's continuous confidences onto a risk level. The mapping is
/// intentionally sensitive: thresholds may move via configuration but their
/// ordering is preserved.
pub fn map_confidence(c: Confidences, t: &TriageThresholds) -> RiskLevel {
    if c.critical > t.critical_upper {
        RiskLevel::Critical
    } else if c.critical > t.critical_lower || c.high > t.high_upper {
        RiskLevel::High
    } else if c.high > t.high_lower || c.moderate > t.moderate {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> String {
        json!({
            "analysis": {
                "severity": "moderate distress",
                "method_mention": "none",
                "immediacy": "none",
                "protective_factors": "mentions friends",
                "cultural_idiom": "'capek' used figuratively",
                "academic_stressors": "thesis deadline",
                "prior_turn_continuity": "first mention",
                "confidence_rationale": "clear stressor, no risk language"
            },
            "confidence": { "critical": 0.05, "high": 0.2, "moderate": 0.7 },
            "intent": "academic_stress"
        })
        .to_string()
    }

    #[test]
    fn parses_valid_output() {
        let out = parse_tier2(&valid_payload()).unwrap();
        assert_eq!(out.intent, "academic_stress");
        assert!(out.confidence.moderate > 0.6);
    }

    #[test]
    fn tolerates_markdown_fences() {
        let fenced = format!("```json\n{}\n```", valid_payload());
        assert!(parse_tier2(&fenced).is_ok());
    }

    #[test]
    fn rejects_missing_confidence_and_extra_keys() {
        let missing = json!({
            "analysis": {},
            "intent": "general_support"
        });
        assert!(parse_tier2(&missing.to_string()).is_err());

        let extra = json!({
            "analysis": {
                "severity": "", "method_mention": "", "immediacy": "",
                "protective_factors": "", "cultural_idiom": "",
                "academic_stressors": "", "prior_turn_continuity": "",
                "confidence_rationale": ""
            },
            "confidence": { "critical": 0.0, "high": 0.0, "moderate": 0.0 },
            "intent": "general_support",
            "reply": "should not be here"
        });
        assert!(parse_tier2(&extra.to_string()).is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let bad = json!({
            "analysis": {
                "severity": "", "method_mention": "", "immediacy": "",
                "protective_factors": "", "cultural_idiom": "",
                "academic_stressors": "", "prior_turn_continuity": "",
                "confidence_rationale": ""
            },
            "confidence": { "critical": 1.4, "high": 0.0, "moderate": 0.0 },
            "intent": "general_support"
        });
        assert!(parse_tier2(&bad.to_string()).is_err());
    }

    #[test]
    fn threshold_mapping_orders_levels() {
        let t = TriageThresholds::default();
        let level = |critical, high, moderate| {
            map_confidence(
                Confidences {
                    critical,
                    high,
                    moderate,
                },
                &t,
            )
        };

        assert_eq!(level(0.7, 0.0, 0.0), RiskLevel::Critical);
        assert_eq!(level(0.6, 0.0, 0.0), RiskLevel::High);
        assert_eq!(level(0.0, 0.75, 0.0), RiskLevel::High);
        assert_eq!(level(0.0, 0.6, 0.0), RiskLevel::Moderate);
        assert_eq!(level(0.0, 0.0, 0.7), RiskLevel::Moderate);
        assert_eq!(level(0.1, 0.1, 0.1), RiskLevel::Low);
    }

    #[test]
    fn mapping_is_monotone_in_critical_confidence() {
        let t = TriageThresholds::default();
        let mut last = RiskLevel::Low;
        for i in 0..=10 {
            let c = f64::from(i) / 10.0;
            let level = map_confidence(
                Confidences {
                    critical: c,
                    high: 0.0,
                    moderate: 0.0,
                },
                &t,
            );
            assert!(level >= last, "level regressed at critical={c}");
            last = level;
        }
        assert_eq!(last, RiskLevel::Critical);
    }
}
