//! Plan generation: prompt construction and parsing of the model's draft.

use serde::Deserialize;
use shared_types::{PlanStep, PlanType, RiskLevel, MAX_PLAN_STEPS, MIN_PLAN_STEPS};

/// Draft plan as returned by the model, before safety review. Resources are
/// deliberately absent: they come from the catalogue, never the model.
#[derive(Deserialize, Debug, Clone)]
pub struct DraftPlan {
    pub title: String,
    pub concern_type: String,
    pub steps: Vec<DraftStep>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DraftStep {
    pub title: String,
    pub body: String,
    pub est_duration_min: u8,
}

impl DraftPlan {
    pub fn into_steps(self) -> Vec<PlanStep> {
        self.steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| PlanStep {
                order: i as u8 + 1,
                title: s.title,
                body: s.body,
                est_duration_min: s.est_duration_min,
            })
            .collect()
    }
}

pub fn system_prompt() -> String {
    format!(
        "You are the support coach component of Aika, a mental-health assistant \
for university students. Draft a short, practical intervention plan the \
student can start today. Requirements:\n\
- between {min} and {max} steps;\n\
- every step title starts with an action verb;\n\
- every step body is 1-3 sentences and under 400 characters;\n\
- every step takes 1 to 20 minutes;\n\
- match the language of the student's message;\n\
- never give medical advice, never name medication, never tell the student \
to contact a specific person, never suggest being alone.\n\
\n\
Respond with ONLY a JSON object:\n\
{{\"title\": \"...\", \"concern_type\": \"...\", \
\"steps\": [{{\"title\": \"...\", \"body\": \"...\", \"est_duration_min\": 5}}]}}",
        min = MIN_PLAN_STEPS,
        max = MAX_PLAN_STEPS
    )
}

pub fn user_prompt(
    redacted_text: &str,
    plan_type: PlanType,
    severity: RiskLevel,
    prior_titles: &[String],
    rejection_feedback: Option<&str>,
) -> String {
    let mut out = format!(
        "Plan type: {}\nSeverity: {}\nStudent message (redacted):\n{}\n",
        plan_type, severity, redacted_text
    );
    if !prior_titles.is_empty() {
        out.push_str("\nThe student already has plans with these titles; choose a different angle:\n");
        for title in prior_titles {
            out.push_str("- ");
            out.push_str(title);
            out.push('\n');
        }
    }
    if let Some(feedback) = rejection_feedback {
        out.push_str("\nYour previous draft was rejected by safety review: ");
        out.push_str(feedback);
        out.push_str("\nProduce a corrected draft.\n");
    }
    out
}

/// Parse the model's draft. Structural limits are checked here; content
/// rules are the reviewer's job.
pub fn parse_draft(raw: &str) -> Result<DraftPlan, String> {
    let trimmed = strip_fences(raw);
    let draft: DraftPlan =
        serde_json::from_str(trimmed).map_err(|e| format!("invalid draft JSON: {e}"))?;

    if draft.title.trim().is_empty() {
        return Err("draft title is empty".to_string());
    }
    if !(MIN_PLAN_STEPS..=MAX_PLAN_STEPS).contains(&draft.steps.len()) {
        return Err(format!(
            "draft has {} steps, expected {}..={}",
            draft.steps.len(),
            MIN_PLAN_STEPS,
            MAX_PLAN_STEPS
        ));
    }
    for (i, step) in draft.steps.iter().enumerate() {
        if !(1..=20).contains(&step.est_duration_min) {
            return Err(format!("step {} duration out of range", i + 1));
        }
        if step.title.trim().is_empty() || step.body.trim().is_empty() {
            return Err(format!("step {} is missing a title or body", i + 1));
        }
    }
    Ok(draft)
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft_json(steps: usize) -> String {
        let steps: Vec<_> = (0..steps)
            .map(|i| {
                json!({
                    "title": format!("Lakukan langkah {}", i + 1),
                    "body": "Satu tindakan kecil yang jelas.",
                    "est_duration_min": 5
                })
            })
            .collect();
        json!({
            "title": "Memecah beban skripsi",
            "concern_type": "academic_stress",
            "steps": steps
        })
        .to_string()
    }

    #[test]
    fn accepts_well_formed_draft() {
        let draft = parse_draft(&draft_json(4)).unwrap();
        assert_eq!(draft.steps.len(), 4);
        let steps = draft.into_steps();
        assert_eq!(steps[0].order, 1);
        assert_eq!(steps[3].order, 4);
    }

    #[test]
    fn rejects_step_counts_outside_bounds() {
        assert!(parse_draft(&draft_json(2)).is_err());
        assert!(parse_draft(&draft_json(7)).is_err());
    }

    #[test]
    fn rejects_zero_duration() {
        let bad = json!({
            "title": "t",
            "concern_type": "c",
            "steps": [
                {"title": "a", "body": "b", "est_duration_min": 0},
                {"title": "a", "body": "b", "est_duration_min": 5},
                {"title": "a", "body": "b", "est_duration_min": 5}
            ]
        });
        assert!(parse_draft(&bad.to_string()).is_err());
    }

    #[test]
    fn prompt_carries_prior_titles_and_feedback() {
        let text = user_prompt(
            "aku capek",
            PlanType::BreakDownProblem,
            RiskLevel::Moderate,
            &["Memecah beban skripsi".to_string()],
            Some("step 2 suggests isolation"),
        );
        assert!(text.contains("Memecah beban skripsi"));
        assert!(text.contains("rejected by safety review"));
    }
}
