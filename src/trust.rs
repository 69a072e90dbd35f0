// src/trust.rs
//! # Trust signals
//!
//! Per-candidate provenance, completeness, and serving-review flags for the
//! presentation layer. Derived on demand for whatever candidate is being
//! displayed, never persisted.
//!
//! The provenance registry maps provider keys/sources to short labels:
//! - Loads from JSON config (labels + aliases).
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings to canonical sources.
//! - Fallback order: aliases → exact match → readable title-case of the
//!   raw source name.
//! - Includes a built-in `default_seed()` with the known catalogs.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::lookup::types::RemoteFoodCandidate;

/// Stable identity for a candidate, independent of provenance label or
/// barcode. Keys `CandidateDecision` maps and trust lookups.
pub fn decision_key(candidate: &RemoteFoodCandidate) -> String {
    format!("{}:{}", candidate.source, candidate.source_id)
}

/// Coarse classification of how much nutrient data a candidate carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Completeness {
    Complete,
    Partial,
    Limited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingReviewStatus {
    Ok,
    NeedsReview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustSignals {
    pub decision_key: String,
    pub provenance_label: String,
    pub completeness: Completeness,
    pub serving_review_status: ServingReviewStatus,
}

/// Configuration for provenance labels, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvenanceRegistry {
    /// Short labels for canonical source names.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl ProvenanceRegistry {
    /// Load configuration from a JSON file.
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Short label for a given source or provider key.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical → label.
    /// 2. Exact label match.
    /// 3. Readable fallback derived from the raw source name.
    pub fn label_for(&self, source: &str) -> String {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            let c = normalize(canon);
            if let Some(label) = self.labels.get(&c) {
                return label.clone();
            }
        }

        if let Some(label) = self.labels.get(&s) {
            return label.clone();
        }

        title_case(&s)
    }

    /// Built-in seed covering the known upstream catalogs.
    /// Used as fallback if no config is found.
    pub(crate) fn default_seed() -> Self {
        let mut labels = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("openfoodfacts", "OFF"),
            ("usda", "USDA"),
            ("nutritionix", "Nutritionix"),
        ] {
            labels.insert(k.to_string(), v.to_string());
        }

        for (a, c) in [
            ("off", "openfoodfacts"),
            ("open food facts", "openfoodfacts"),
            ("fdc", "usda"),
            ("food data central", "usda"),
            ("fooddata central", "usda"),
            ("usda fdc", "usda"),
            ("nix", "nutritionix"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self { labels, aliases }
    }
}

impl Default for ProvenanceRegistry {
    fn default() -> Self {
        Self::default_seed()
    }
}

/// Classify nutrient coverage: calories plus all three macros is COMPLETE,
/// calories plus a strict subset of macros is PARTIAL, anything weaker is
/// LIMITED.
pub fn completeness(candidate: &RemoteFoodCandidate) -> Completeness {
    let macros = [
        candidate.protein_g_per_100,
        candidate.carbs_g_per_100,
        candidate.fat_g_per_100,
    ];
    let populated_macros = macros.iter().filter(|m| m.is_some()).count();

    match (candidate.calories_kcal_per_100.is_some(), populated_macros) {
        (true, 3) => Completeness::Complete,
        (true, 1..=2) => Completeness::Partial,
        _ => Completeness::Limited,
    }
}

/// Serving texts that carry no information after folding.
const PLACEHOLDER_SERVINGS: &[&str] = &[
    "unknown", "na", "n a", "none", "null", "portion", "serving", "tbd", "varies",
];

/// `NEEDS_REVIEW` when the folded serving text is blank or a known
/// placeholder, `OK` otherwise.
pub fn serving_review_status(serving_size: Option<&str>) -> ServingReviewStatus {
    let folded = serving_size.map(normalize).unwrap_or_default();
    if folded.is_empty() || PLACEHOLDER_SERVINGS.contains(&folded.as_str()) {
        ServingReviewStatus::NeedsReview
    } else {
        ServingReviewStatus::Ok
    }
}

/// Derive all trust signals for one displayed candidate.
pub fn derive(candidate: &RemoteFoodCandidate, registry: &ProvenanceRegistry) -> TrustSignals {
    TrustSignals {
        decision_key: decision_key(candidate),
        provenance_label: registry.label_for(&candidate.source),
        completeness: completeness(candidate),
        serving_review_status: serving_review_status(candidate.serving_size.as_deref()),
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }

    out = out.replace(['\n', '\r', '\t', '.', ',', '?', '!', '‚', '’', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Readable fallback label: capitalize each word of the normalized source.
fn title_case(s: &str) -> String {
    s.split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(source: &str) -> RemoteFoodCandidate {
        RemoteFoodCandidate {
            source: source.into(),
            source_id: "42".into(),
            provider_key: None,
            barcode: None,
            name: "Test Food".into(),
            brand: None,
            calories_kcal_per_100: None,
            protein_g_per_100: None,
            carbs_g_per_100: None,
            fat_g_per_100: None,
            serving_size: None,
        }
    }

    #[test]
    fn decision_key_is_source_and_id() {
        assert_eq!(decision_key(&candidate("usda")), "usda:42");
    }

    #[test]
    fn known_labels_resolve() {
        let r = ProvenanceRegistry::default_seed();
        assert_eq!(r.label_for("openfoodfacts"), "OFF");
        assert_eq!(r.label_for("usda"), "USDA");
        assert_eq!(r.label_for("nutritionix"), "Nutritionix");
    }

    #[test]
    fn alias_and_case_insensitive_lookup() {
        let r = ProvenanceRegistry::default_seed();
        assert_eq!(r.label_for("Open Food Facts"), "OFF");
        assert_eq!(r.label_for("FDC"), "USDA");
        assert_eq!(r.label_for("FoodData Central"), "USDA");
    }

    #[test]
    fn unknown_source_gets_readable_fallback() {
        let r = ProvenanceRegistry::default_seed();
        assert_eq!(r.label_for("my-local-db"), "My Local Db");
    }

    #[test]
    fn completeness_matrix() {
        let mut c = candidate("usda");
        assert_eq!(completeness(&c), Completeness::Limited);

        c.calories_kcal_per_100 = Some(100.0);
        assert_eq!(completeness(&c), Completeness::Limited);

        c.protein_g_per_100 = Some(5.0);
        assert_eq!(completeness(&c), Completeness::Partial);

        c.carbs_g_per_100 = Some(10.0);
        assert_eq!(completeness(&c), Completeness::Partial);

        c.fat_g_per_100 = Some(2.0);
        assert_eq!(completeness(&c), Completeness::Complete);

        // macros without calories stay limited
        c.calories_kcal_per_100 = None;
        assert_eq!(completeness(&c), Completeness::Limited);
    }

    #[test]
    fn serving_placeholders_need_review() {
        assert_eq!(serving_review_status(None), ServingReviewStatus::NeedsReview);
        assert_eq!(
            serving_review_status(Some("  ")),
            ServingReviewStatus::NeedsReview
        );
        assert_eq!(
            serving_review_status(Some("???")),
            ServingReviewStatus::NeedsReview
        );
        assert_eq!(
            serving_review_status(Some("Unknown")),
            ServingReviewStatus::NeedsReview
        );
        assert_eq!(
            serving_review_status(Some("N/A")),
            ServingReviewStatus::NeedsReview
        );
        assert_eq!(
            serving_review_status(Some("1 portion")),
            ServingReviewStatus::Ok
        );
        assert_eq!(
            serving_review_status(Some("170 g")),
            ServingReviewStatus::Ok
        );
    }

    #[test]
    fn derive_combines_all_signals() {
        let mut c = candidate("openfoodfacts");
        c.calories_kcal_per_100 = Some(46.0);
        c.protein_g_per_100 = Some(1.0);
        c.carbs_g_per_100 = Some(6.7);
        c.fat_g_per_100 = Some(1.5);
        c.serving_size = Some("250 ml".into());

        let r = ProvenanceRegistry::default_seed();
        let signals = derive(&c, &r);
        assert_eq!(signals.decision_key, "openfoodfacts:42");
        assert_eq!(signals.provenance_label, "OFF");
        assert_eq!(signals.completeness, Completeness::Complete);
        assert_eq!(signals.serving_review_status, ServingReviewStatus::Ok);
    }

    #[test]
    fn registry_parses_from_json() {
        let json = r#"{
            "labels": {"mydb": "MyDB"},
            "aliases": {"my db": "mydb"}
        }"#;
        let r: ProvenanceRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(r.label_for("My-DB"), "MyDB");
    }
}
