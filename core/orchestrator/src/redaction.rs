//! PII redaction and keyed user hashing.
//!
//! Every byte persisted, logged or sent to the model has been through
//! `Redactor::redact` first. Redaction is idempotent: replacement tokens
//! never re-match any pattern.

use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Construction failure. Callers must treat this as fatal for any logging
/// path; there is no raw-text fallback.
#[derive(Debug)]
pub struct RedactionUnavailable(pub String);

impl fmt::Display for RedactionUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "redactor unavailable: {}", self.0)
    }
}

impl std::error::Error for RedactionUnavailable {}

/// Result of one redaction pass.
#[derive(Debug, Clone)]
pub struct Redacted {
    pub text: String,
    pub count: usize,
    /// Kinds that fired, in application order, one entry per replacement.
    pub kinds: Vec<&'static str>,
}

struct Rule {
    kind: &'static str,
    pattern: Regex,
}

pub struct Redactor {
    rules: Vec<Rule>,
    salt: String,
}

impl Redactor {
    /// Compile the PII patterns once per worker. Order matters: URLs before
    /// emails (a URL may embed an address), phones before bare digit runs.
    pub fn new(salt: impl Into<String>) -> Result<Self, RedactionUnavailable> {
        let compile = |kind: &'static str, pattern: &str| -> Result<Rule, RedactionUnavailable> {
            Regex::new(pattern)
                .map(|pattern| Rule { kind, pattern })
                .map_err(|e| RedactionUnavailable(format!("pattern {kind}: {e}")))
        };

        let rules = vec![
            compile("URL", r"(?i)\b(?:https?://|www\.)[^\s<>()]+")?,
            compile("EMAIL", r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")?,
            // Indonesian mobile numbers (+62/62/08 prefixes) with optional
            // separators, then generic international numbers.
            compile(
                "PHONE",
                r"(?:\+62|\b62|\b0)[-. ]?8[1-9][0-9](?:[-. ]?[0-9]{3,4}){2,3}\b",
            )?,
            compile("PHONE", r"\+[0-9]{7,15}\b")?,
            // National-ID-like runs: 12 or more consecutive digits.
            compile("ID_NUMBER", r"\b[0-9]{12,}\b")?,
            // Dictionary-hinted first-person name introductions, English and
            // Indonesian. Capitalized words only, up to three.
            compile(
                "NAME",
                r"(?:\b[Nn]ama saya|\b[Nn]amaku|\b[Mm]y name is|\bI am|\bI'm)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})",
            )?,
        ];

        Ok(Self {
            rules,
            salt: salt.into(),
        })
    }

    /// Replace every PII match with `[REDACTED:KIND]`.
    pub fn redact(&self, text: &str) -> Redacted {
        let mut out = text.to_string();
        let mut count = 0;
        let mut kinds = Vec::new();

        for rule in &self.rules {
            // Count first so each replacement is attributed to its kind.
            let hits = rule.pattern.find_iter(&out).count();
            if hits == 0 {
                continue;
            }

            let token = format!("[REDACTED:{}]", rule.kind);
            out = match rule.pattern.captures_len() {
                // Name rule: keep the introducer, replace only the captured
                // name group.
                n if n > 1 => rule
                    .pattern
                    .replace_all(&out, |caps: &regex::Captures| {
                        let full = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
                        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                        full.replacen(name, &token, 1)
                    })
                    .into_owned(),
                _ => rule.pattern.replace_all(&out, token.as_str()).into_owned(),
            };

            count += hits;
            for _ in 0..hits {
                kinds.push(rule.kind);
            }
        }

        Redacted {
            text: out,
            count,
            kinds,
        }
    }

    /// Deterministic 16-hex-character user handle: HMAC-SHA256 of the
    /// decimal user id under the process salt.
    pub fn user_hash(&self, user_id: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.salt.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(user_id.to_string().as_bytes());
        let digest = mac.finalize().into_bytes();
        hex::encode(digest)[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor() -> Redactor {
        Redactor::new("test-salt").expect("patterns compile")
    }

    #[test]
    fn redacts_email_addresses() {
        let r = redactor().redact("Email saya budi@example.com, tolong bantu.");
        assert!(r.text.contains("[REDACTED:EMAIL]"));
        assert!(!r.text.contains("budi@example.com"));
        assert_eq!(r.count, 1);
        assert_eq!(r.kinds, vec!["EMAIL"]);
    }

    #[test]
    fn redacts_indonesian_phone_formats() {
        for sample in [
            "hubungi aku di 081234567890",
            "nomorku +62 812-3456-7890 ya",
            "wa ke 0812 3456 7890",
        ] {
            let r = redactor().redact(sample);
            assert!(
                r.text.contains("[REDACTED:PHONE]"),
                "failed on: {sample} -> {}",
                r.text
            );
        }
    }

    #[test]
    fn redacts_long_digit_runs_as_id_numbers() {
        let r = redactor().redact("NIK 3201234567890123 jangan disebar");
        assert!(r.text.contains("[REDACTED:ID_NUMBER]"));
        assert!(!r.text.contains("3201234567890123"));
    }

    #[test]
    fn redacts_urls() {
        let r = redactor().redact("cek https://instagram.com/budi.s ya");
        assert!(r.text.contains("[REDACTED:URL]"));
    }

    #[test]
    fn redacts_introduced_names_but_keeps_the_introducer() {
        let r = redactor().redact("Halo, nama saya Budi Santoso dan aku butuh bantuan");
        assert!(r.text.contains("nama saya [REDACTED:NAME]"));
        assert!(!r.text.contains("Budi Santoso"));

        let r = redactor().redact("Hi, my name is Sari and I'm struggling");
        assert!(r.text.contains("my name is [REDACTED:NAME]"));
    }

    #[test]
    fn redaction_is_idempotent() {
        let r1 = redactor().redact(
            "Email budi@example.com, telp 081234567890, https://example.com, nama saya Budi",
        );
        let r2 = redactor().redact(&r1.text);
        assert_eq!(r1.text, r2.text);
        assert_eq!(r2.count, 0);
    }

    #[test]
    fn clean_text_passes_through() {
        let input = "Aku stres banget sama skripsi, gabisa tidur 3 hari.";
        let r = redactor().redact(input);
        assert_eq!(r.text, input);
        assert_eq!(r.count, 0);
    }

    #[test]
    fn user_hash_is_deterministic_and_salt_dependent() {
        let a = Redactor::new("salt-a").unwrap();
        let b = Redactor::new("salt-b").unwrap();

        assert_eq!(a.user_hash(42), a.user_hash(42));
        assert_eq!(a.user_hash(42).len(), 16);
        assert!(a.user_hash(42).chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.user_hash(42), a.user_hash(43));
        assert_ne!(a.user_hash(42), b.user_hash(42));
    }
}
