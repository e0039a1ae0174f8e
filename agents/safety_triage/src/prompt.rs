//! Prompt construction for the tier-2 semantic assessment.

use shared_types::Intent;

/// System instruction for the structured triage prompt. The model walks the
/// eight analysis steps and must answer in strict JSON.
pub fn system_prompt() -> String {
    format!(
        "You are the safety triage component of Aika, a mental-health support \
assistant for university students in Indonesia. Assess the student's message \
for mental-health risk. Work through these eight analysis steps, in order:\n\
1. severity: how serious is the expressed distress?\n\
2. method_mention: is any means of self-harm mentioned, however obliquely?\n\
3. immediacy: is there a time component (tonight, right now, soon)?\n\
4. protective_factors: are friends, family, plans or reasons to stay mentioned?\n\
5. cultural_idiom: Indonesian idioms that understate distress (e.g. 'sudah capek', 'gak kuat').\n\
6. academic_stressors: thesis (skripsi), exams, supervisor pressure, deadlines.\n\
7. prior_turn_continuity: does this continue or escalate the earlier conversation?\n\
8. confidence_rationale: why you assign the confidences below.\n\
\n\
Then report your confidence that the message is critical, high or moderate \
risk, each between 0.0 and 1.0. When uncertain, err toward the higher risk.\n\
\n\
Valid intent values: {intents}. Use the closest match.\n\
\n\
Respond with ONLY a JSON object of this exact shape:\n\
{{\"analysis\": {{\"severity\": \"...\", \"method_mention\": \"...\", \
\"immediacy\": \"...\", \"protective_factors\": \"...\", \
\"cultural_idiom\": \"...\", \"academic_stressors\": \"...\", \
\"prior_turn_continuity\": \"...\", \"confidence_rationale\": \"...\"}}, \
\"confidence\": {{\"critical\": 0.0, \"high\": 0.0, \"moderate\": 0.0}}, \
\"intent\": \"...\"}}",
        intents = Intent::KNOWN_VALUES.join(", ")
    )
}

/// Addendum for the single retry after a schema failure.
pub fn strict_retry_suffix() -> &'static str {
    "\n\nYour previous answer was not valid JSON for the required shape. \
Respond with the JSON object only: no prose, no markdown fences, no keys \
beyond the specified ones."
}

/// User-side content: the redacted message plus a short rolling summary of
/// the conversation so far.
pub fn user_prompt(redacted_text: &str, rolling_summary: &str) -> String {
    if rolling_summary.is_empty() {
        format!("Student message (redacted):\n{}", redacted_text)
    } else {
        format!(
            "Conversation so far (summary):\n{}\n\nStudent message (redacted):\n{}",
            rolling_summary, redacted_text
        )
    }
}
