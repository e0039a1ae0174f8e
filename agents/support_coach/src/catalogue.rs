//! Allow-listed resource catalogue.
//!
//! Resources attached to plans and surfaced in replies come only from this
//! list, keyed by intent and language. The model never invents a URL or a
//! phone number.

use shared_types::{Intent, PlanResource, PlanStep, ResourceKind, ResourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Indonesian,
    English,
}

impl Language {
    /// Cheap heuristic, good enough for resource selection: count Indonesian
    /// function words. The transport can override when it knows the locale.
    pub fn detect(text: &str) -> Language {
        const MARKERS: &[&str] = &[
            "aku", "saya", "kamu", "yang", "banget", "gak", "nggak", "udah", "tidak", "tolong",
            "sama", "mau", "bisa", "gimana", "kenapa",
        ];
        let lowered = text.to_lowercase();
        let hits = lowered
            .split_whitespace()
            .filter(|w| MARKERS.contains(w))
            .count();
        if hits >= 2 {
            Language::Indonesian
        } else {
            Language::English
        }
    }
}

struct CatalogueEntry {
    label_id: &'static str,
    label_en: &'static str,
    reference: &'static str,
    is_url: bool,
    kind: ResourceKind,
    /// Topics/intents this entry serves; `"*"` matches everything.
    topics: &'static [&'static str],
    crisis: bool,
}

impl CatalogueEntry {
    fn to_resource(&self, language: Language) -> PlanResource {
        let label = match language {
            Language::Indonesian => self.label_id,
            Language::English => self.label_en,
        };
        let reference = if self.is_url {
            ResourceRef::Url(self.reference.to_string())
        } else {
            ResourceRef::Id(self.reference.to_string())
        };
        PlanResource {
            label: label.to_string(),
            reference,
            kind: self.kind,
        }
    }
}

static CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        label_id: "Hotline kesehatan jiwa Kemenkes (119 ext. 8)",
        label_en: "Ministry of Health mental health hotline (119 ext. 8)",
        reference: "hotline-119-8",
        is_url: false,
        kind: ResourceKind::Hotline,
        topics: &["crisis_support"],
        crisis: true,
    },
    CatalogueEntry {
        label_id: "Layanan konseling kampus (jam kerja)",
        label_en: "Campus counselling service (office hours)",
        reference: "campus-counselling",
        is_url: false,
        kind: ResourceKind::CampusService,
        topics: &["*"],
        crisis: true,
    },
    CatalogueEntry {
        label_id: "Latihan pernapasan 4-7-8",
        label_en: "4-7-8 breathing exercise",
        reference: "https://resources.aika.example/exercises/breathing-478",
        is_url: true,
        kind: ResourceKind::Exercise,
        topics: &["acute_distress", "general_distress"],
        crisis: false,
    },
    CatalogueEntry {
        label_id: "Grounding 5-4-3-2-1 saat panik",
        label_en: "5-4-3-2-1 grounding for panic",
        reference: "https://resources.aika.example/exercises/grounding-54321",
        is_url: true,
        kind: ResourceKind::Exercise,
        topics: &["acute_distress"],
        crisis: false,
    },
    CatalogueEntry {
        label_id: "Memecah tugas besar jadi langkah kecil",
        label_en: "Breaking a large task into small steps",
        reference: "https://resources.aika.example/articles/task-breakdown",
        is_url: true,
        kind: ResourceKind::Article,
        topics: &["academic_stress", "general_distress"],
        crisis: false,
    },
    CatalogueEntry {
        label_id: "Menjaga pola tidur saat musim ujian",
        label_en: "Protecting sleep during exam season",
        reference: "https://resources.aika.example/articles/sleep-hygiene",
        is_url: true,
        kind: ResourceKind::Article,
        topics: &["academic_stress", "general_distress", "general_support"],
        crisis: false,
    },
    CatalogueEntry {
        label_id: "Audio relaksasi 10 menit",
        label_en: "10-minute guided relaxation audio",
        reference: "https://resources.aika.example/audio/relaxation-10min",
        is_url: true,
        kind: ResourceKind::Audio,
        topics: &["acute_distress", "general_distress", "general_support"],
        crisis: false,
    },
    CatalogueEntry {
        label_id: "Jurnal syukur harian",
        label_en: "Daily gratitude journaling guide",
        reference: "https://resources.aika.example/articles/gratitude-journal",
        is_url: true,
        kind: ResourceKind::Article,
        topics: &["general_support", "general_distress"],
        crisis: false,
    },
];

/// Resources for a classified intent, most specific first.
pub fn resources_for(intent: &Intent, language: Language, limit: usize) -> Vec<PlanResource> {
    let topic = intent.as_str();
    let mut out: Vec<PlanResource> = CATALOGUE
        .iter()
        .filter(|e| e.topics.contains(&topic))
        .map(|e| e.to_resource(language))
        .collect();
    // Pad with general entries so every plan has something to lean on.
    if out.len() < limit {
        for e in CATALOGUE.iter().filter(|e| e.topics.contains(&"*")) {
            let r = e.to_resource(language);
            if !out.iter().any(|existing| existing.label == r.label) {
                out.push(r);
            }
        }
    }
    out.truncate(limit);
    out
}

/// Free-text topic lookup for the resources tool. Unknown topics fall back
/// to the general set rather than an empty reply.
pub fn resources_by_topic(topic: &str, language: Language, limit: usize) -> Vec<PlanResource> {
    let intent = Intent::parse(&topic.trim().to_lowercase().replace(' ', "_"));
    let found = resources_for(&intent, language, limit);
    if !found.is_empty() {
        return found;
    }
    resources_for(&Intent::GeneralSupport, language, limit)
}

/// Emergency resources attached to every crisis reply.
pub fn crisis_resources(language: Language) -> Vec<PlanResource> {
    CATALOGUE
        .iter()
        .filter(|e| e.crisis)
        .map(|e| e.to_resource(language))
        .collect()
}

/// Pre-reviewed fallback plan used when generation fails. Content is fixed
/// and has already passed clinical review; it must never be edited by model
/// output.
pub fn canned_coping_plan(language: Language) -> (String, Vec<PlanStep>) {
    match language {
        Language::Indonesian => (
            "Langkah kecil untuk hari ini".to_string(),
            vec![
                PlanStep {
                    order: 1,
                    title: "Tarik napas dulu".to_string(),
                    body: "Duduk dengan nyaman dan ambil napas pelan selama dua menit. \
                           Tidak perlu memperbaiki apa pun dulu."
                        .to_string(),
                    est_duration_min: 2,
                },
                PlanStep {
                    order: 2,
                    title: "Tulis satu hal yang paling berat".to_string(),
                    body: "Tuliskan satu kalimat tentang hal yang paling membebani pikiranmu \
                           sekarang. Menuliskannya membantu otak melepaskannya sebentar."
                        .to_string(),
                    est_duration_min: 5,
                },
                PlanStep {
                    order: 3,
                    title: "Pilih satu langkah kecil".to_string(),
                    body: "Pilih satu tindakan kecil yang bisa selesai dalam sepuluh menit, \
                           lalu lakukan hanya itu."
                        .to_string(),
                    est_duration_min: 10,
                },
                PlanStep {
                    order: 4,
                    title: "Hubungi satu orang".to_string(),
                    body: "Kirim pesan singkat ke teman atau keluarga yang kamu percaya. \
                           Cukup menyapa, tidak harus bercerita panjang."
                        .to_string(),
                    est_duration_min: 5,
                },
            ],
        ),
        Language::English => (
            "Small steps for today".to_string(),
            vec![
                PlanStep {
                    order: 1,
                    title: "Breathe first".to_string(),
                    body: "Sit comfortably and breathe slowly for two minutes. \
                           Nothing needs fixing yet."
                        .to_string(),
                    est_duration_min: 2,
                },
                PlanStep {
                    order: 2,
                    title: "Name the heaviest thing".to_string(),
                    body: "Write one sentence about what weighs on you most right now. \
                           Putting it on paper lets your mind set it down for a moment."
                        .to_string(),
                    est_duration_min: 5,
                },
                PlanStep {
                    order: 3,
                    title: "Pick one small step".to_string(),
                    body: "Choose a single action you can finish in ten minutes, \
                           then do only that."
                        .to_string(),
                    est_duration_min: 10,
                },
                PlanStep {
                    order: 4,
                    title: "Reach out to one person".to_string(),
                    body: "Send a short message to a friend or family member you trust. \
                           A hello is enough; no long story required."
                        .to_string(),
                    est_duration_min: 5,
                },
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_indonesian_from_function_words() {
        assert_eq!(
            Language::detect("Aku stres banget sama skripsi"),
            Language::Indonesian
        );
        assert_eq!(
            Language::detect("I feel stressed about my thesis"),
            Language::English
        );
    }

    #[test]
    fn academic_stress_gets_relevant_resources() {
        let resources = resources_for(&Intent::AcademicStress, Language::Indonesian, 3);
        assert!(!resources.is_empty());
        assert!(resources.len() <= 3);
        assert!(resources
            .iter()
            .any(|r| r.label.contains("tugas") || r.label.contains("tidur")));
    }

    #[test]
    fn unknown_topic_falls_back_to_general() {
        let resources = resources_by_topic("quantum homesickness", Language::English, 3);
        assert!(!resources.is_empty());
    }

    #[test]
    fn crisis_resources_include_a_hotline() {
        let resources = crisis_resources(Language::Indonesian);
        assert!(resources
            .iter()
            .any(|r| matches!(r.kind, ResourceKind::Hotline)));
    }

    #[test]
    fn canned_plan_is_well_formed_in_both_languages() {
        for lang in [Language::Indonesian, Language::English] {
            let (title, steps) = canned_coping_plan(lang);
            assert!(!title.is_empty());
            assert!(steps.len() >= 3);
            for step in &steps {
                assert!((1..=20).contains(&step.est_duration_min));
                assert!(step.body.chars().count() <= 500);
            }
        }
    }
}
