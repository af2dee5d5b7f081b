//! Keyword classification of free-text clinical notes into medical
//! systems.
//!
//! A consultation's diagnosis, visit reason, and systems review are joined
//! and matched case-insensitively against a fixed keyword table. The first
//! matching keyword per system wins, so one consultation counts at most
//! once per system but may count toward several systems.

/// Fixed keyword-to-system table.
///
/// Order matters only for presentation; matching is independent per
/// system.
pub const SYSTEM_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Respiratory",
        &[
            "cough",
            "flu",
            "cold",
            "bronchitis",
            "asthma",
            "pneumonia",
            "congestion",
            "respiratory",
        ],
    ),
    (
        "Cardiovascular",
        &[
            "heart",
            "hypertension",
            "blood pressure",
            "cardiac",
            "cardiovascular",
            "arrhythmia",
            "palpitations",
        ],
    ),
    (
        "Neurological",
        &[
            "headache",
            "migraine",
            "neurological",
            "dizziness",
            "vertigo",
        ],
    ),
    (
        "Musculoskeletal",
        &["pain", "back", "joint", "muscle", "bone", "arthritis", "lumbar"],
    ),
    (
        "Gastrointestinal",
        &[
            "stomach",
            "digestive",
            "diarrhea",
            "constipation",
            "gastritis",
            "intestinal",
            "abdominal pain",
        ],
    ),
    (
        "Genitourinary",
        &[
            "urinary",
            "kidney",
            "bladder",
            "genital",
            "urinary tract infection",
            "dysuria",
        ],
    ),
    (
        "Endocrine",
        &["diabetes", "thyroid", "hormonal", "endocrine", "glucose"],
    ),
    (
        "Dermatologic",
        &["skin", "dermatitis", "rash", "allergy", "eczema", "eruption", "acne"],
    ),
    (
        "Ophthalmologic",
        &["eye", "vision", "ophthalmologic", "conjunctivitis"],
    ),
    (
        "Otorhinolaryngologic",
        &["ear", "throat", "nose", "otitis", "sinusitis"],
    ),
    (
        "Gynecologic",
        &["gynecologic", "menstrual", "pregnancy", "pelvic"],
    ),
    (
        "Pediatric",
        &["child", "infant", "pediatric", "development"],
    ),
];

/// Returns the systems matched by the given free text, each at most once.
pub fn classify_text(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    if lowered.trim().is_empty() {
        return Vec::new();
    }

    let mut systems = Vec::new();
    for (system, keywords) in SYSTEM_KEYWORDS {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            systems.push(*system);
        }
    }
    systems
}
