//! Token-overlap similarity between normalized questions

use std::collections::HashMap;

use crate::normalize::tokenize;

/// Score in `[0, 1]` between two normalized questions.
///
/// - identical non-empty strings score 1
/// - token counts differing by more than half of the longer count score 0
/// - otherwise `common / max(len)`, where `common` is the multiset
///   intersection of the two token lists
/// - when the longer side has 3 tokens or fewer the score is binary:
///   1 only for equal counts with every token matched
///
/// Symmetric in its arguments.
pub fn similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }

    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    let max_len = tokens_a.len().max(tokens_b.len());
    if max_len == 0 {
        return 0.0;
    }

    let diff = tokens_a.len().abs_diff(tokens_b.len());
    if diff as f32 / max_len as f32 > 0.5 {
        return 0.0;
    }

    let common = common_tokens(&tokens_a, &tokens_b);

    if max_len <= 3 {
        return if tokens_a.len() == tokens_b.len() && common == max_len {
            1.0
        } else {
            0.0
        };
    }

    common as f32 / max_len as f32
}

fn common_tokens(a: &[&str], b: &[&str]) -> usize {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in b {
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut common = 0;
    for token in a {
        if let Some(n) = counts.get_mut(token) {
            if *n > 0 {
                *n -= 1;
                common += 1;
            }
        }
    }
    common
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        assert_eq!(similarity("que es eloos", "que es eloos"), 1.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn test_short_questions_are_binary() {
        assert_eq!(similarity("ok", "ok si"), 0.0);
        assert_eq!(similarity("que es eloos", "que es mies"), 0.0);
        assert_eq!(similarity("eloos que es", "que es eloos"), 1.0);
    }

    #[test]
    fn test_length_gap_scores_zero() {
        // 2 vs 5 tokens: diff 3 > 2.5
        assert_eq!(similarity("horario caritas", "cual es el horario caritas"), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let s = similarity(
            "cual es el horario de caritas",
            "cual es el horario de catequesis",
        );
        assert!((s - 5.0 / 6.0).abs() < 1e-6);
        assert!(s >= 0.75);

        let s = similarity("donde esta la parroquia hoy", "como llego a la iglesia");
        assert!(s < 0.75);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("a a b c", "a b b c"),
            ("que es el grupo eloos", "que es eloos"),
            ("como me apunto a catequesis", "como me inscribo en catequesis"),
            ("ok", "ok si"),
            ("x y z w", "w z y x q"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_repeated_tokens_counted_once_each() {
        // multiset intersection: only one "a" in common
        assert_eq!(similarity("a a x y", "a b c d"), 0.25);
    }
}
