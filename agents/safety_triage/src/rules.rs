//! Tier-1 keyword rules, English and Indonesian.
//!
//! The crisis list is intentionally blunt: a match here is authoritative and
//! is never overridden downward by later tiers. Additions to these lists go
//! through clinical review, not code review alone.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// Messages longer than this never match the safe-pattern shortcut.
const SAFE_MAX_CHARS: usize = 120;

/// Explicit self-harm statements and method mentions. Substring matched on
/// the lowercased message.
static CRISIS_PHRASES: &[&str] = &[
    // English
    "kill myself",
    "killing myself",
    "end my life",
    "ending my life",
    "want to die",
    "wanna die",
    "suicide",
    "suicidal",
    "hurt myself",
    "hurting myself",
    "harm myself",
    "self-harm",
    "self harm",
    "overdose",
    "no reason to live",
    "better off dead",
    // Indonesian
    "bunuh diri",
    "mengakhiri hidup",
    "akhiri hidup",
    "pengen mati",
    "pingin mati",
    "ingin mati",
    "mau mati aja",
    "menyakiti diri",
    "melukai diri",
    "gantung diri",
    "minum racun",
    "nyilet",
];

/// Short word-bounded crisis terms where plain substring search would
/// misfire (e.g. "die" inside "diet").
static CRISIS_WORD_RE: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([r"\bdie\b", r"\bsilet\b", r"\bod\b"]).expect("crisis word regexes are valid")
});

/// Greetings, gratitude and purely logistical openers that are safe to
/// answer without a full classification.
static SAFE_PHRASES: &[&str] = &[
    // English
    "hello",
    "good morning",
    "good afternoon",
    "good evening",
    "thank you",
    "thanks",
    "how are you",
    "what are your hours",
    "opening hours",
    // Indonesian
    "halo",
    "hai",
    "selamat pagi",
    "selamat siang",
    "selamat sore",
    "selamat malam",
    "apa kabar",
    "terima kasih",
    "makasih",
    "jam buka",
    "jadwal konseling",
];

static SAFE_WORD_RE: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new([r"^hi\b", r"^hey\b"]).expect("safe word regexes are valid"));

/// Hedges that disqualify the safe-pattern shortcut: the greeting may be a
/// lead-in to something heavier.
static HEDGE_PHRASES: &[&str] = &[
    "but", "actually", "honestly", "tapi", "cuma", "sebenarnya", "sebenernya", "jujur",
];

/// Negative-affect cues used by the degraded fallback path. Not crisis on
/// their own, but enough signal that a silent LLM must not produce "low".
static NEGATIVE_AFFECT_PHRASES: &[&str] = &[
    // English
    "stress",
    "stressed",
    "anxious",
    "anxiety",
    "depress",
    "hopeless",
    "worthless",
    "panic",
    "lonely",
    "can't sleep",
    "cant sleep",
    "overwhelmed",
    "give up",
    "crying",
    // Indonesian
    "stres",
    "cemas",
    "sedih",
    "takut",
    "putus asa",
    "gak kuat",
    "ga kuat",
    "nggak kuat",
    "capek banget",
    "gabisa tidur",
    "ga bisa tidur",
    "kesepian",
    "nangis",
    "menyerah",
    "panik",
];

/// Tier-1 verdict for one redacted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVerdict {
    /// Explicit crisis signal: critical, handoff, no further tiers needed.
    Crisis,
    /// Unambiguously safe small talk: low, no further tiers needed.
    Safe,
    /// Rules abstain; later tiers decide.
    Undecided { negative_affect: bool },
}

/// True iff any crisis phrase or word-bounded crisis term matches.
pub fn contains_crisis_keyword(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CRISIS_PHRASES.iter().any(|p| lowered.contains(p)) || CRISIS_WORD_RE.is_match(&lowered)
}

/// True iff any negative-affect cue matches.
pub fn contains_negative_affect(text: &str) -> bool {
    let lowered = text.to_lowercase();
    NEGATIVE_AFFECT_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Evaluate tier-1 rules on a redacted message.
pub fn evaluate(text: &str) -> RuleVerdict {
    if contains_crisis_keyword(text) {
        return RuleVerdict::Crisis;
    }

    let lowered = text.to_lowercase();
    let negative_affect = NEGATIVE_AFFECT_PHRASES.iter().any(|p| lowered.contains(p));

    if !negative_affect
        && text.chars().count() <= SAFE_MAX_CHARS
        && !HEDGE_PHRASES
            .iter()
            .any(|h| lowered.split_whitespace().any(|w| w == *h))
        && (SAFE_PHRASES.iter().any(|p| lowered.contains(p)) || SAFE_WORD_RE.is_match(&lowered))
    {
        return RuleVerdict::Safe;
    }

    RuleVerdict::Undecided { negative_affect }
}
