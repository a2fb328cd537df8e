//! Similarity-ratio matching for `apply_patch` when an exact occurrence
//! count doesn't resolve unambiguously. Mirrors the approach used by the
//! patch engine's exact matcher in [`crate::seek_sequence`] but tolerates
//! drift in the body of the match, not just its surrounding whitespace.

use similar::TextDiff;

/// Default similarity threshold below which a fuzzy match is rejected.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.92;

/// The runner-up candidate must trail the winner by at least this much or
/// the match is considered ambiguous.
pub const UNIQUENESS_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    /// Index of the first line of the match, in terms of `content`'s lines.
    pub start_line: usize,
    pub end_line: usize,
    pub similarity: f64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FuzzyError {
    #[error("no window scored above the similarity threshold")]
    NoMatch,
    #[error("multiple windows scored within {margin} of the best match ({best:.3} vs {runner_up:.3})")]
    Ambiguous {
        best: f64,
        runner_up: f64,
        margin: f64,
    },
}

fn ratio(a: &str, b: &str) -> f64 {
    TextDiff::from_lines(a, b).ratio() as f64
}

/// Slide a window the length of `old`'s line count across `content`, scoring
/// every position with a normalized similarity ratio, and return the best
/// match if it clears `min_similarity` and is unambiguous.
pub fn find_best_window(content: &str, old: &str, min_similarity: f64) -> Result<FuzzyMatch, FuzzyError> {
    let lines: Vec<&str> = content.lines().collect();
    let old_lines: Vec<&str> = old.lines().collect();
    let window = old_lines.len().max(1);

    if lines.len() < window {
        return Err(FuzzyError::NoMatch);
    }

    let mut scored: Vec<(usize, f64)> = Vec::new();
    for start in 0..=(lines.len() - window) {
        let candidate = lines[start..start + window].join("\n");
        let score = ratio(old, &candidate);
        scored.push((start, score));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (best_start, best_score) = match scored.first() {
        Some(&(s, sc)) => (s, sc),
        None => return Err(FuzzyError::NoMatch),
    };

    if best_score < min_similarity {
        return Err(FuzzyError::NoMatch);
    }

    if let Some(&(_, runner_up)) = scored.get(1) {
        if best_score - runner_up < UNIQUENESS_MARGIN {
            return Err(FuzzyError::Ambiguous {
                best: best_score,
                runner_up,
                margin: UNIQUENESS_MARGIN,
            });
        }
    }

    Ok(FuzzyMatch {
        start_line: best_start,
        end_line: best_start + window,
        similarity: best_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_drifted_window() {
        let content = "fn main() {\n    let x = 1;\n    println!(\"{}\", x);\n}\n";
        let old = "let x = 1;\nprintln!(\"{x}\", x);\n";
        let found = find_best_window(content, old, 0.5).expect("match");
        assert_eq!(found.start_line, 1);
    }

    #[test]
    fn rejects_below_threshold() {
        let content = "alpha\nbeta\ngamma\n";
        let old = "completely different text\n";
        assert_eq!(find_best_window(content, old, DEFAULT_MIN_SIMILARITY), Err(FuzzyError::NoMatch));
    }

    #[test]
    fn rejects_ambiguous_ties() {
        let content = "x = 1;\ny = 1;\nx = 1;\n";
        let old = "x = 1;\n";
        let err = find_best_window(content, old, 0.1).unwrap_err();
        assert!(matches!(err, FuzzyError::Ambiguous { .. }));
    }
}
