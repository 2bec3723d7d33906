//! Name similarity scorers, each on a 0..=1 scale.
//!
//! Inputs are expected to be normalized already (see [`crate::normalize`]).
//! A [`ScorerSet`] combines scorers by max-reduction; ties go to the
//! earlier scorer.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Levenshtein ratio over whitespace tokens sorted alphabetically.
    TokenSort,
    /// Best Levenshtein ratio of the shorter string against any equal-length
    /// window of the longer one.
    Partial,
    /// Normalized Levenshtein ratio.
    Ratio,
    JaroWinkler,
}

impl ScorerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::TokenSort => "token_sort",
            ScorerKind::Partial => "partial",
            ScorerKind::Ratio => "ratio",
            ScorerKind::JaroWinkler => "jaro_winkler",
        }
    }

    pub fn scorer(self) -> Scorer {
        let score: fn(&str, &str) -> f64 = match self {
            ScorerKind::TokenSort => token_sort,
            ScorerKind::Partial => partial,
            ScorerKind::Ratio => ratio,
            ScorerKind::JaroWinkler => jaro_winkler,
        };
        Scorer {
            name: self.as_str(),
            score,
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named pure similarity function.
#[derive(Clone, Copy)]
pub struct Scorer {
    pub name: &'static str,
    pub score: fn(&str, &str) -> f64,
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scorer").field(&self.name).finish()
    }
}

/// Winning scorer and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub scorer: &'static str,
    pub value: f64,
}

/// Ordered scorer list.
#[derive(Debug, Clone)]
pub struct ScorerSet {
    scorers: Vec<Scorer>,
}

impl ScorerSet {
    pub fn new(scorers: Vec<Scorer>) -> Self {
        Self { scorers }
    }

    pub fn from_kinds(kinds: &[ScorerKind]) -> Self {
        Self::new(kinds.iter().map(|k| k.scorer()).collect())
    }

    /// Max over every scorer, clamped to 0..=1. `None` when the set is empty.
    pub fn best(&self, a: &str, b: &str) -> Option<Score> {
        let mut best: Option<Score> = None;
        for s in &self.scorers {
            let value = (s.score)(a, b).clamp(0.0, 1.0);
            if best.map_or(true, |b| value > b.value) {
                best = Some(Score {
                    scorer: s.name,
                    value,
                });
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Scorers
// ---------------------------------------------------------------------------

pub fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

pub fn token_sort(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

pub fn partial(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    if short_len == 0 {
        return if long.is_empty() { 1.0 } else { 0.0 };
    }
    let long_chars: Vec<char> = long.chars().collect();
    long_chars
        .windows(short_len)
        .map(|w| ratio(short, &w.iter().collect::<String>()))
        .fold(0.0, f64::max)
}

pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_strings_score_one() {
        for kind in [
            ScorerKind::TokenSort,
            ScorerKind::Partial,
            ScorerKind::Ratio,
            ScorerKind::JaroWinkler,
        ] {
            let s = kind.scorer();
            assert!(approx((s.score)("birnin kudu", "birnin kudu"), 1.0), "{}", s.name);
        }
    }

    #[test]
    fn token_sort_ignores_order() {
        assert!(approx(token_sort("kudu birnin", "birnin kudu"), 1.0));
        assert!(ratio("kudu birnin", "birnin kudu") < 0.6);
    }

    #[test]
    fn partial_finds_substring() {
        assert!(approx(partial("kudu", "birnin kudu"), 1.0));
        assert!(approx(partial("birnin kudu", "kudu"), 1.0));
        assert!(approx(partial("", ""), 1.0));
        assert!(approx(partial("", "kudu"), 0.0));
    }

    #[test]
    fn ratio_on_typo() {
        // one deletion over 11 chars
        assert!(approx(ratio("birnin kudu", "birni kudu"), 10.0 / 11.0));
    }

    #[test]
    fn best_picks_max_and_first_on_tie() {
        let set = ScorerSet::from_kinds(&[ScorerKind::Ratio, ScorerKind::TokenSort]);
        let tie = set.best("kawo", "kawo").unwrap();
        assert_eq!(tie.scorer, "ratio");

        let swapped = set.best("kudu birnin", "birnin kudu").unwrap();
        assert_eq!(swapped.scorer, "token_sort");
        assert!(approx(swapped.value, 1.0));
    }

    #[test]
    fn best_clamps_and_handles_empty_set() {
        fn too_high(_: &str, _: &str) -> f64 {
            3.0
        }
        let set = ScorerSet::new(vec![Scorer {
            name: "stub",
            score: too_high,
        }]);
        assert_eq!(set.best("a", "b").unwrap().value, 1.0);
        assert!(ScorerSet::new(Vec::new()).best("a", "b").is_none());
    }
}
