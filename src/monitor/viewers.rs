//! Viewer-count text parsing.
//!
//! Live pages render counts in locale-dependent shapes: `18,450 watching
//! now`, `18.450 assistindo agora`, `18.5K`, `18,5 mil`, `1.2M`, `1,2 mi`.
//! The parser normalizes all of them to an integer, returning 0 when no
//! numeric token can be extracted.

use std::sync::LazyLock;

use regex::Regex;

// Magnitude markers attached to (or near) the numeric token. Input is
// lowercased before matching.
static THOUSAND_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*\s*k\b|\bmil\b").expect("valid regex"));
static MILLION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d[\d.,]*\s*m\b|\bmi\b|milh(?:ão|ao|ões|oes)").expect("valid regex")
});
static NUMERIC_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));
// A separator followed by exactly three digits then a non-digit or the end
// is thousands grouping, not a decimal point.
static GROUPED_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\d{3}(\D|$)").expect("valid regex"));
static GROUPED_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\d{3}(\D|$)").expect("valid regex"));

/// Parse a raw viewer-count text into a non-negative integer.
pub fn parse_viewers(raw: &str) -> u64 {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return 0;
    }

    // Million takes precedence when both markers could match.
    let multiplier = if MILLION_MARKER.is_match(&text) {
        1_000_000.0
    } else if THOUSAND_MARKER.is_match(&text) {
        1_000.0
    } else {
        1.0
    };

    let Some(token) = NUMERIC_TOKEN.find(&text) else {
        return 0;
    };
    let token = token.as_str();

    if multiplier > 1.0 {
        parse_scaled(token, multiplier)
    } else {
        parse_plain(token)
    }
}

/// With a magnitude suffix the token is a real number: comma is a decimal
/// point, any dot beyond the first folds into the fractional part.
fn parse_scaled(token: &str, multiplier: f64) -> u64 {
    let mut number: String = token
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if let Some(first_dot) = number.find('.') {
        let (head, tail) = number.split_at(first_dot + 1);
        let tail: String = tail.chars().filter(|&c| c != '.').collect();
        number = format!("{head}{tail}");
    }

    match number.parse::<f64>() {
        Ok(value) => (value * multiplier).round() as u64,
        Err(_) => 0,
    }
}

/// Without a suffix the `.`/`,` ambiguity is resolved by grouping
/// heuristics before parsing.
fn parse_plain(token: &str) -> u64 {
    let has_dot = token.contains('.');
    let has_comma = token.contains(',');

    let cleaned = if has_dot && has_comma {
        // The later separator is the decimal point, the other is grouping.
        let (decimal, grouping) = if token.rfind('.') > token.rfind(',') {
            ('.', ',')
        } else {
            (',', '.')
        };
        token
            .chars()
            .filter(|&c| c != grouping)
            .map(|c| if c == decimal { '.' } else { c })
            .collect()
    } else if has_comma {
        if GROUPED_COMMA.is_match(token) {
            token.replace(',', "")
        } else {
            token.replacen(',', ".", 1)
        }
    } else if has_dot {
        if GROUPED_DOT.is_match(token) {
            token.replace('.', "")
        } else {
            token.to_string()
        }
    } else {
        token.to_string()
    };

    match cleaned.parse::<f64>() {
        Ok(value) if value >= 0.0 => value.round() as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_with_comma_grouping() {
        assert_eq!(parse_viewers("18,450 watching now"), 18450);
    }

    #[test]
    fn test_plain_with_dot_grouping() {
        assert_eq!(parse_viewers("18.450 assistindo agora"), 18450);
    }

    #[test]
    fn test_thousand_suffix_k() {
        assert_eq!(parse_viewers("18.5k watching now"), 18500);
        assert_eq!(parse_viewers("18.5K watching now"), 18500);
    }

    #[test]
    fn test_thousand_marker_mil() {
        assert_eq!(parse_viewers("18,5 mil assistindo"), 18500);
    }

    #[test]
    fn test_million_suffix_m() {
        assert_eq!(parse_viewers("1.2M watching"), 1_200_000);
    }

    #[test]
    fn test_million_marker_mi() {
        assert_eq!(parse_viewers("1,2 mi assistindo"), 1_200_000);
    }

    #[test]
    fn test_million_marker_milhao() {
        assert_eq!(parse_viewers("1,5 milhão assistindo"), 1_500_000);
    }

    #[test]
    fn test_dot_grouping_without_words() {
        assert_eq!(parse_viewers("2.345"), 2345);
    }

    #[test]
    fn test_bare_integer() {
        assert_eq!(parse_viewers("18 watching now"), 18);
    }

    #[test]
    fn test_no_digits_is_zero() {
        assert_eq!(parse_viewers(""), 0);
        assert_eq!(parse_viewers("   "), 0);
        assert_eq!(parse_viewers("n/a"), 0);
        assert_eq!(parse_viewers("offline"), 0);
    }

    #[test]
    fn test_both_separators_later_wins_as_decimal() {
        assert_eq!(parse_viewers("1.234,5"), 1235);
        assert_eq!(parse_viewers("1,234.5"), 1235);
    }

    #[test]
    fn test_comma_decimal_when_not_grouping() {
        // Two digits after the comma: decimal, not grouping.
        assert_eq!(parse_viewers("18,45"), 18);
    }

    #[test]
    fn test_large_grouped_count() {
        assert_eq!(parse_viewers("1,234,567 watching"), 1_234_567);
    }
}
