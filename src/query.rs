// src/query.rs
//! Search-query canonicalization: lower-casing, glyph folding, unit token
//! expansion, and derivation of the SQL LIKE pattern used for local matching.
//!
//! Everything here is pure and deterministic; the same input always yields
//! the same output, and `normalize_search_query` is idempotent.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Canonicalize free-text search input.
///
/// - lower-cases (Unicode case folding, locale-invariant)
/// - smart quotes/apostrophes → `'`
/// - multiplication glyphs (×, ✕, ✖) → `x`
/// - long unit words → short codes (`grams` → `g`, `percent` → `%`, ...)
/// - dash/underscore/plus separators and punctuation → single spaces
/// - dots removed unless they sit between two digits
/// - a digit glued to a recognized unit token gets split (`500ml` → `500 ml`)
/// - a trailing `<digit> %` collapses to `<digit>%`
///
/// Blank input → empty string.
pub fn normalize_search_query(input: &str) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    let mut out = input.to_lowercase();

    // Typographic quotes and apostrophes → plain apostrophe.
    out = out.replace(
        [
            '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{02BC}', '\u{201C}', '\u{201D}',
        ],
        "'",
    );

    // Multiplication glyphs → ASCII x (pack sizes like "6×330ml").
    out = out.replace(['\u{00D7}', '\u{2715}', '\u{2716}'], "x");

    // Separators and punctuation → spaces. `%`, `'` and `.` survive; dots
    // are handled below so decimals stay intact.
    out = out.replace(
        [
            '-', '_', '+', ',', ';', ':', '!', '?', '"', '(', ')', '[', ']', '{', '}', '/', '\\',
            '|', '*', '&', '#', '@', '~', '^', '<', '>', '=',
        ],
        " ",
    );

    // Drop dots that are not a numeric decimal point.
    let chars: Vec<char> = out.chars().collect();
    let mut kept = String::with_capacity(out.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '.' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if prev_digit && next_digit {
                kept.push(c);
            }
        } else {
            kept.push(c);
        }
    }
    out = kept;

    // Pack-size "x" glued between digits: "6x330" → "6 x 330".
    static RE_PACK_X: OnceCell<Regex> = OnceCell::new();
    let re_pack_x = RE_PACK_X.get_or_init(|| Regex::new(r"(\d)x(\d)").expect("pack x regex"));
    out = re_pack_x.replace_all(&out, "$1 x $2").to_string();

    // Split a digit glued to a recognized unit token: "330ml" → "330 ml".
    static RE_NUM_UNIT: OnceCell<Regex> = OnceCell::new();
    let re_num_unit = RE_NUM_UNIT.get_or_init(|| {
        Regex::new(
            r"(\d)(kilograms?|milligrams?|millilitres?|milliliters?|litres?|liters?|ounces?|grams?|percent|kcal|mg|kg|ml|oz|lb|g|l|x)\b",
        )
        .expect("digit/unit split regex")
    });
    out = re_num_unit.replace_all(&out, "$1 $2").to_string();

    // Expand long unit words token-wise.
    let tokens: Vec<&str> = out.split_whitespace().map(canonical_query_token).collect();
    out = tokens.join(" ");

    // Collapse a trailing "<digit> %" back to "<digit>%".
    static RE_TRAILING_PCT: OnceCell<Regex> = OnceCell::new();
    let re_pct = RE_TRAILING_PCT.get_or_init(|| Regex::new(r"(\d) %$").expect("trailing % regex"));
    out = re_pct.replace(&out, "$1%").to_string();

    out.trim().to_string()
}

/// Map a single normalized token to its canonical spelling.
fn canonical_query_token(token: &str) -> &str {
    match token {
        "gram" | "grams" => "g",
        "kilogram" | "kilograms" => "kg",
        "milligram" | "milligrams" => "mg",
        "millilitre" | "millilitres" | "milliliter" | "milliliters" => "ml",
        "litre" | "litres" | "liter" | "liters" => "l",
        "ounce" | "ounces" => "oz",
        "percent" => "%",
        "yoghurt" => "yogurt",
        other => other,
    }
}

/// Build an AND-of-substrings SQL LIKE pattern from an already normalized
/// query: tokens are LIKE-escaped and joined with `%`.
///
/// Blank input → empty string; callers must treat empty as "no text filter",
/// not "match nothing".
pub fn build_normalized_sql_like_pattern(normalized_query: &str) -> String {
    let tokens: Vec<String> = normalized_query
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(escape_like_token)
        .collect();
    tokens.join("%")
}

/// Escape `%`, `_` and `\` within a token by prefixing with `\`.
fn escape_like_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits_units() {
        assert_eq!(normalize_search_query("Coke-Zero 330ml"), "coke zero 330 ml");
    }

    #[test]
    fn expands_unit_words_and_spellings() {
        assert_eq!(normalize_search_query("Greek yoghurt 0%"), "greek yogurt 0%");
        assert_eq!(normalize_search_query("2 kilograms rice"), "2 kg rice");
        assert_eq!(normalize_search_query("whole milk 500 millilitres"), "whole milk 500 ml");
    }

    #[test]
    fn percent_word_collapses_when_trailing() {
        assert_eq!(normalize_search_query("yogurt 0 percent"), "yogurt 0%");
    }

    #[test]
    fn multiplication_glyphs_become_x() {
        assert_eq!(normalize_search_query("6×330ml cola"), "6 x 330 ml cola");
    }

    #[test]
    fn smart_quotes_fold_to_apostrophe() {
        assert_eq!(normalize_search_query("Ben & Jerry\u{2019}s"), "ben jerry's");
    }

    #[test]
    fn decimal_dots_survive_other_dots_do_not() {
        assert_eq!(normalize_search_query("1.5l sparkling water"), "1.5 l sparkling water");
        assert_eq!(normalize_search_query("Dr. Oetker pizza"), "dr oetker pizza");
    }

    #[test]
    fn blank_or_punctuation_only_is_empty() {
        assert_eq!(normalize_search_query(""), "");
        assert_eq!(normalize_search_query("   "), "");
        assert_eq!(normalize_search_query("--- !!!"), "");
    }

    #[test]
    fn idempotent_on_documented_examples() {
        for raw in [
            "Coke-Zero 330ml",
            "Greek yoghurt 0%",
            "100% whey_protein",
            "6×330ml cola",
            "1.5l sparkling water",
        ] {
            let once = normalize_search_query(raw);
            let twice = normalize_search_query(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn like_pattern_escapes_and_joins() {
        let normalized = normalize_search_query("100% whey_protein");
        assert_eq!(normalized, "100% whey protein");
        assert_eq!(
            build_normalized_sql_like_pattern(&normalized),
            "100\\%%whey%protein"
        );
    }

    #[test]
    fn like_pattern_blank_is_empty() {
        assert_eq!(build_normalized_sql_like_pattern(""), "");
        assert_eq!(build_normalized_sql_like_pattern("   "), "");
    }
}
