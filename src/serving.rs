// src/serving.rs
//! Serving-size canonicalization and per-100 nutrient scaling.
//!
//! Serving text arrives in wildly inconsistent shapes ("1 Cup(240 ml)",
//! "170G", "2 Scoops ( 60g )"); the normalizers here fold it into a single
//! canonical spelling so downstream dedupe keys compare equal. Nutrient
//! scaling converts per-serving values to a per-100 g/ml basis using a fixed
//! mass/volume factor table; implausible results are dropped, never clamped.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Nutrient kinds carried per candidate, with their per-100 plausibility
/// ceilings (kcal for calories, grams for macros).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NutrientKind {
    Calories,
    Protein,
    Carbs,
    Fat,
}

impl NutrientKind {
    /// Upper bound for a plausible per-100 value. Anything above is treated
    /// as bad provider data and dropped to `None`.
    pub fn per100_ceiling(self) -> f64 {
        match self {
            NutrientKind::Calories => 900.0,
            NutrientKind::Protein | NutrientKind::Carbs | NutrientKind::Fat => 100.0,
        }
    }
}

/// Canonicalize raw serving text. Null/blank input → `None`.
pub fn normalize_serving_text(raw: Option<&str>) -> Option<String> {
    let raw = raw?;

    // Unicode space variants → ASCII space.
    let mut out: String = raw
        .chars()
        .map(|c| {
            if matches!(
                c,
                '\u{00A0}' | '\u{2002}' | '\u{2003}' | '\u{2007}' | '\u{2009}' | '\u{200A}'
                    | '\u{202F}' | '\u{3000}'
            ) {
                ' '
            } else {
                c
            }
        })
        .collect();

    if out.trim().is_empty() {
        return None;
    }

    // Parenthesis spacing: "1 cup(240 ml)" → "1 cup (240 ml)".
    static RE_BEFORE_PAREN: OnceCell<Regex> = OnceCell::new();
    out = RE_BEFORE_PAREN
        .get_or_init(|| Regex::new(r"(\S)\(").expect("paren regex"))
        .replace_all(&out, "$1 (")
        .to_string();
    static RE_INNER_PAREN: OnceCell<Regex> = OnceCell::new();
    out = RE_INNER_PAREN
        .get_or_init(|| Regex::new(r"\(\s+").expect("paren open regex"))
        .replace_all(&out, "(")
        .to_string();
    static RE_CLOSE_PAREN: OnceCell<Regex> = OnceCell::new();
    out = RE_CLOSE_PAREN
        .get_or_init(|| Regex::new(r"\s+\)").expect("paren close regex"))
        .replace_all(&out, ")")
        .to_string();

    // Rewrite every <number><unit> / <number> <unit> with the canonical unit.
    static RE_NUM_UNIT: OnceCell<Regex> = OnceCell::new();
    let re = RE_NUM_UNIT
        .get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*([A-Za-z]+)").expect("num/unit regex"));
    out = re
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let number = &caps[1];
            let unit = &caps[2];
            match canonical_unit(unit) {
                Some(u) => format!("{number} {u}"),
                None => format!("{number} {unit}"),
            }
        })
        .to_string();

    // Collapse whitespace, trim.
    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Canonicalize a serving unit: trims, strips `.`, lower-cases, maps long
/// and alternate spellings onto `{mg,g,kg,ml,l,oz,lb}`. Unrecognized
/// non-blank input passes through lower-cased and whitespace-collapsed;
/// blank → `None`.
pub fn normalize_serving_unit(raw_unit: &str) -> Option<String> {
    let cleaned = raw_unit.replace('.', "");
    let folded = cleaned
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if folded.is_empty() {
        return None;
    }
    Some(match canonical_unit(&folded) {
        Some(u) => u.to_string(),
        None => folded,
    })
}

/// Map a lower-cased unit spelling to its canonical token, if recognized.
fn canonical_unit(unit: &str) -> Option<&'static str> {
    let folded = unit.to_lowercase();
    Some(match folded.as_str() {
        "mg" | "milligram" | "milligrams" => "mg",
        "g" | "gr" | "gram" | "grams" => "g",
        "kg" | "kilogram" | "kilograms" => "kg",
        "ml" | "millilitre" | "millilitres" | "milliliter" | "milliliters" => "ml",
        "l" | "litre" | "litres" | "liter" | "liters" => "l",
        "oz" | "ounce" | "ounces" => "oz",
        "lb" | "lbs" | "pound" | "pounds" => "lb",
        _ => return None,
    })
}

/// Compose display serving text from structured parts.
///
/// Priority: quantity+unit+weight (when the weight adds information) →
/// quantity+unit → weight alone → unit alone → `None`.
pub fn build_serving_text(
    quantity: Option<f64>,
    unit: Option<&str>,
    weight_grams: Option<f64>,
) -> Option<String> {
    let unit = unit.and_then(normalize_serving_unit);

    match (quantity, unit.as_deref(), weight_grams) {
        (Some(q), Some(u), Some(w)) if u != "g" || !same_amount(q, w) => {
            Some(format!("{} {} ({} g)", format_amount(q), u, format_amount(w)))
        }
        (Some(q), Some(u), _) => Some(format!("{} {}", format_amount(q), u)),
        (_, _, Some(w)) => Some(format!("{} g", format_amount(w))),
        (_, Some(u), None) => Some(u.to_string()),
        _ => None,
    }
}

fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() < f64::EPSILON
}

/// Render whole numbers without a fractional part ("170", not "170.0").
fn format_amount(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Grams (or millilitres) represented by one base unit of serving.
fn unit_base_factor(unit: &str) -> Option<f64> {
    Some(match canonical_unit(unit)? {
        "mg" => 0.001,
        "g" => 1.0,
        "kg" => 1000.0,
        "ml" => 1.0,
        "l" => 1000.0,
        "oz" => 28.349523125,
        "lb" => 453.59237,
        _ => return None,
    })
}

/// Convert a per-serving nutrient value to a per-100-unit basis.
///
/// The serving amount prefers an explicit gram weight, else converts
/// quantity+unit through the fixed factor table. Unconvertible units yield
/// no scaling amount, in which case the raw value passes through unscaled.
/// The result is finally checked against the nutrient kind's per-100
/// ceiling; exceeding it yields `None` (implausible data, dropped).
pub fn per100_equivalent_from_serving(
    nutrient_value: f64,
    kind: NutrientKind,
    serving_weight_grams: Option<f64>,
    serving_quantity: Option<f64>,
    serving_unit: Option<&str>,
) -> Option<f64> {
    if !nutrient_value.is_finite() || nutrient_value < 0.0 {
        return None;
    }

    let amount = serving_base_amount(serving_weight_grams, serving_quantity, serving_unit);
    let scaled = match amount {
        Some(a) if a > 0.0 => nutrient_value * 100.0 / a,
        _ => nutrient_value,
    };

    sanitize_per100(scaled, kind)
}

/// Clamp-free per-100 sanity check shared with candidate sanitation.
pub fn sanitize_per100(value: f64, kind: NutrientKind) -> Option<f64> {
    if !value.is_finite() || value < 0.0 || value > kind.per100_ceiling() {
        return None;
    }
    Some(value)
}

fn serving_base_amount(
    weight_grams: Option<f64>,
    quantity: Option<f64>,
    unit: Option<&str>,
) -> Option<f64> {
    if let Some(w) = weight_grams {
        if w.is_finite() && w > 0.0 {
            return Some(w);
        }
    }
    let q = quantity.filter(|q| q.is_finite() && *q > 0.0)?;
    let factor = unit.and_then(unit_base_factor)?;
    Some(q * factor)
}
