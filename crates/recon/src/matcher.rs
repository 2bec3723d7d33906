//! Pure pairing of two key lists: code, then exact name, then fuzzy name.
//!
//! Works on indices only; callers own the rows and decide what a pairing
//! means for them.

use std::collections::{HashMap, VecDeque};

use geofuse_core::MatchMethod;

use crate::normalize::{normalize_code, NameKey};
use crate::scorer::{Score, ScorerSet};

/// Scores this close below the threshold still count as reaching it.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Join keys of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchKey {
    pub name: NameKey,
    /// Normalized secondary code; `None` when absent or blank.
    pub code: Option<String>,
}

impl MatchKey {
    pub fn new(raw_name: &str, raw_code: Option<&str>) -> Self {
        Self {
            name: NameKey::parse(raw_name),
            code: raw_code.map(normalize_code).filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub left: usize,
    pub right: usize,
    pub method: MatchMethod,
    pub confidence: f64,
    /// Winning scorer for fuzzy pairings.
    pub scorer: Option<&'static str>,
}

/// Best fuzzy candidate that fell below the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCandidate {
    pub left: usize,
    pub right: usize,
    pub score: Score,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPlan {
    pub pairs: Vec<Pairing>,
    /// Unpaired left indices, ascending.
    pub left_only: Vec<usize>,
    /// Unpaired right indices, ascending.
    pub right_only: Vec<usize>,
    pub skipped: Vec<SkippedCandidate>,
}

impl MatchPlan {
    /// Pairing for every left index, `None` where unpaired.
    pub fn by_left(&self, left_len: usize) -> Vec<Option<&Pairing>> {
        let mut out = vec![None; left_len];
        for p in &self.pairs {
            if let Some(slot) = out.get_mut(p.left) {
                *slot = Some(p);
            }
        }
        out
    }

    pub fn count(&self, method: MatchMethod) -> usize {
        self.pairs.iter().filter(|p| p.method == method).count()
    }
}

/// Fuzzy stage settings; `None` disables the stage.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyOptions<'a> {
    pub scorers: &'a ScorerSet,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions<'a> {
    pub use_codes: bool,
    pub fuzzy: Option<FuzzyOptions<'a>>,
}

/// Run every enabled pass in order. Each row is paired at most once.
pub fn plan_matches(left: &[MatchKey], right: &[MatchKey], options: MatchOptions<'_>) -> MatchPlan {
    let mut state = PassState::new(left.len(), right.len());

    if options.use_codes {
        match_by_code(left, right, &mut state);
    }
    match_exact(left, right, &mut state);
    if let Some(fuzzy) = options.fuzzy {
        match_fuzzy(left, right, fuzzy, &mut state);
    }

    state.finish()
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

struct PassState {
    left_used: Vec<bool>,
    right_used: Vec<bool>,
    pairs: Vec<Pairing>,
    skipped: Vec<SkippedCandidate>,
}

impl PassState {
    fn new(left_len: usize, right_len: usize) -> Self {
        Self {
            left_used: vec![false; left_len],
            right_used: vec![false; right_len],
            pairs: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn pair(&mut self, left: usize, right: usize, method: MatchMethod, confidence: f64, scorer: Option<&'static str>) {
        self.left_used[left] = true;
        self.right_used[right] = true;
        self.pairs.push(Pairing {
            left,
            right,
            method,
            confidence,
            scorer,
        });
    }

    fn free_left(&self) -> impl Iterator<Item = usize> + '_ {
        self.left_used.iter().enumerate().filter(|(_, u)| !**u).map(|(i, _)| i)
    }

    fn free_right(&self) -> impl Iterator<Item = usize> + '_ {
        self.right_used.iter().enumerate().filter(|(_, u)| !**u).map(|(i, _)| i)
    }

    fn finish(self) -> MatchPlan {
        let left_only = self.free_left().collect();
        let right_only = self.free_right().collect();
        let mut pairs = self.pairs;
        pairs.sort_by_key(|p| p.left);
        MatchPlan {
            pairs,
            left_only,
            right_only,
            skipped: self.skipped,
        }
    }
}

/// Codes that occur exactly once among the free rows of one side.
fn unique_codes<'k>(keys: &'k [MatchKey], free: impl Iterator<Item = usize>) -> HashMap<&'k str, usize> {
    let mut seen: HashMap<&str, Option<usize>> = HashMap::new();
    for i in free {
        if let Some(code) = keys[i].code.as_deref() {
            seen.entry(code)
                .and_modify(|slot| *slot = None)
                .or_insert(Some(i));
        }
    }
    seen.into_iter().filter_map(|(c, i)| i.map(|i| (c, i))).collect()
}

fn match_by_code(left: &[MatchKey], right: &[MatchKey], state: &mut PassState) {
    let right_codes = unique_codes(right, state.free_right());
    let left_codes = unique_codes(left, state.free_left());
    let mut found: Vec<(usize, usize)> = left_codes
        .iter()
        .filter_map(|(code, &li)| right_codes.get(code).map(|&ri| (li, ri)))
        .collect();
    found.sort_unstable();
    for (li, ri) in found {
        state.pair(li, ri, MatchMethod::Code, 1.0, None);
    }
}

fn match_exact(left: &[MatchKey], right: &[MatchKey], state: &mut PassState) {
    // Full key (base + qualifier): first free right row with the same key.
    let mut by_full: HashMap<String, VecDeque<usize>> = HashMap::new();
    for ri in state.free_right().collect::<Vec<_>>() {
        if !right[ri].name.is_empty() {
            by_full.entry(right[ri].name.full()).or_default().push_back(ri);
        }
    }
    for li in state.free_left().collect::<Vec<_>>() {
        if left[li].name.is_empty() {
            continue;
        }
        if let Some(ri) = by_full.get_mut(&left[li].name.full()).and_then(|q| q.pop_front()) {
            state.pair(li, ri, MatchMethod::Exact, 1.0, None);
        }
    }

    // Base key alone, only where it is unambiguous on both sides.
    let left_base = unique_bases(left, state.free_left());
    let right_base = unique_bases(right, state.free_right());
    let mut found: Vec<(usize, usize)> = left_base
        .iter()
        .filter_map(|(base, &li)| right_base.get(base).map(|&ri| (li, ri)))
        .collect();
    found.sort_unstable();
    for (li, ri) in found {
        state.pair(li, ri, MatchMethod::Exact, 1.0, None);
    }
}

fn unique_bases<'k>(keys: &'k [MatchKey], free: impl Iterator<Item = usize>) -> HashMap<&'k str, usize> {
    let mut seen: HashMap<&str, Option<usize>> = HashMap::new();
    for i in free {
        let base = keys[i].name.base.as_str();
        if base.is_empty() {
            continue;
        }
        seen.entry(base)
            .and_modify(|slot| *slot = None)
            .or_insert(Some(i));
    }
    seen.into_iter().filter_map(|(b, i)| i.map(|i| (b, i))).collect()
}

/// Greedy in left order: each left row takes its best free candidate when
/// that candidate reaches the threshold. No backtracking.
fn match_fuzzy(left: &[MatchKey], right: &[MatchKey], fuzzy: FuzzyOptions<'_>, state: &mut PassState) {
    let right_full: Vec<String> = right.iter().map(|k| k.name.full()).collect();

    for li in state.free_left().collect::<Vec<_>>() {
        let name = left[li].name.full();
        if name.is_empty() {
            continue;
        }

        let mut best: Option<(usize, Score)> = None;
        for ri in state.free_right() {
            if right_full[ri].is_empty() {
                continue;
            }
            let Some(score) = fuzzy.scorers.best(&name, &right_full[ri]) else {
                continue;
            };
            if best.map_or(true, |(_, b)| score.value > b.value) {
                best = Some((ri, score));
            }
        }

        match best {
            Some((ri, score)) if score.value + THRESHOLD_EPSILON >= fuzzy.threshold => {
                state.pair(li, ri, MatchMethod::Fuzzy, score.value, Some(score.scorer));
            }
            Some((ri, score)) => state.skipped.push(SkippedCandidate {
                left: li,
                right: ri,
                score,
            }),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::{Scorer, ScorerKind};
    use proptest::prelude::*;

    fn keys(names: &[&str]) -> Vec<MatchKey> {
        names.iter().map(|n| MatchKey::new(n, None)).collect()
    }

    fn coded(items: &[(&str, &str)]) -> Vec<MatchKey> {
        items.iter().map(|(n, c)| MatchKey::new(n, Some(c))).collect()
    }

    fn default_scorers() -> ScorerSet {
        ScorerSet::from_kinds(&[
            ScorerKind::TokenSort,
            ScorerKind::Partial,
            ScorerKind::Ratio,
            ScorerKind::JaroWinkler,
        ])
    }

    fn full_options(scorers: &ScorerSet, threshold: f64) -> MatchOptions<'_> {
        MatchOptions {
            use_codes: true,
            fuzzy: Some(FuzzyOptions { scorers, threshold }),
        }
    }

    #[test]
    fn code_pass_first() {
        let left = coded(&[("Alpha", "a1"), ("Beta", "B2")]);
        let right = coded(&[("Completely Different", "B2"), ("Alpha", "zz")]);
        let plan = plan_matches(&left, &right, MatchOptions { use_codes: true, fuzzy: None });
        assert_eq!(plan.pairs.len(), 2);
        assert_eq!(plan.pairs[0], Pairing { left: 0, right: 1, method: MatchMethod::Exact, confidence: 1.0, scorer: None });
        assert_eq!(plan.pairs[1].method, MatchMethod::Code);
        assert_eq!(plan.pairs[1].right, 0);
    }

    #[test]
    fn duplicated_codes_are_not_used() {
        let left = coded(&[("A", "X"), ("B", "X")]);
        let right = coded(&[("C", "X")]);
        let plan = plan_matches(&left, &right, MatchOptions { use_codes: true, fuzzy: None });
        assert!(plan.pairs.is_empty());
        assert_eq!(plan.left_only, vec![0, 1]);
        assert_eq!(plan.right_only, vec![0]);
    }

    #[test]
    fn qualified_names_match_on_full_key() {
        let left = keys(&["Kawo (NISKNT04)", "Kawo (NISNAS04)"]);
        let right = keys(&["Kawo (NISNAS04)", "Kawo (NISKNT04)"]);
        let plan = plan_matches(&left, &right, MatchOptions::default());
        assert_eq!(plan.pairs.len(), 2);
        assert_eq!((plan.pairs[0].left, plan.pairs[0].right), (0, 1));
        assert_eq!((plan.pairs[1].left, plan.pairs[1].right), (1, 0));
    }

    #[test]
    fn base_key_only_when_unambiguous() {
        let left = keys(&["Kano (K1)", "Gwale (G1)", "Gwale (G2)"]);
        let right = keys(&["Kano", "Gwale"]);
        let plan = plan_matches(&left, &right, MatchOptions::default());
        assert_eq!(plan.pairs.len(), 1);
        assert_eq!((plan.pairs[0].left, plan.pairs[0].right), (0, 0));
        assert_eq!(plan.left_only, vec![1, 2]);
        assert_eq!(plan.right_only, vec![1]);
    }

    #[test]
    fn fuzzy_typo_matches() {
        let scorers = default_scorers();
        let left = keys(&["Birnin Kudu"]);
        let right = keys(&["Birni Kudu"]);
        let plan = plan_matches(&left, &right, full_options(&scorers, 0.75));
        assert_eq!(plan.pairs.len(), 1);
        let p = &plan.pairs[0];
        assert_eq!(p.method, MatchMethod::Fuzzy);
        assert!(p.confidence >= 0.75);
        assert!(p.scorer.is_some());
    }

    #[test]
    fn fuzzy_below_threshold_is_skipped() {
        let scorers = default_scorers();
        let left = keys(&["Zaria"]);
        let right = keys(&["Ungogo"]);
        let plan = plan_matches(&left, &right, full_options(&scorers, 0.75));
        assert!(plan.pairs.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.left_only, vec![0]);
        assert_eq!(plan.right_only, vec![0]);
    }

    #[test]
    fn threshold_is_inclusive() {
        fn exactly(_: &str, _: &str) -> f64 {
            0.75
        }
        fn just_below(_: &str, _: &str) -> f64 {
            0.74
        }
        let left = keys(&["aaa"]);
        let right = keys(&["bbb"]);

        let at = ScorerSet::new(vec![Scorer { name: "stub", score: exactly }]);
        let plan = plan_matches(&left, &right, full_options(&at, 0.75));
        assert_eq!(plan.pairs.len(), 1);
        assert_eq!(plan.pairs[0].scorer, Some("stub"));
        assert_eq!(plan.pairs[0].confidence, 0.75);

        let below = ScorerSet::new(vec![Scorer { name: "stub", score: just_below }]);
        let plan = plan_matches(&left, &right, full_options(&below, 0.75));
        assert!(plan.pairs.is_empty());
        assert_eq!(plan.skipped[0].score.value, 0.74);
    }

    #[test]
    fn exact_pass_ignores_row_order() {
        let scorers = default_scorers();
        let left = keys(&["Dawakin Kudu", "Dawakin Tofa"]);
        let right = keys(&["Dawakin Tofa", "Dawakin Kudu"]);
        let plan = plan_matches(&left, &right, full_options(&scorers, 0.75));
        assert_eq!(plan.count(MatchMethod::Exact), 2);
        assert_eq!(plan.by_left(2)[0].map(|p| p.right), Some(1));
    }

    #[test]
    fn empty_names_never_pair() {
        let scorers = default_scorers();
        let left = keys(&["", "Kura"]);
        let right = keys(&["", "Kura"]);
        let plan = plan_matches(&left, &right, full_options(&scorers, 0.0));
        assert_eq!(plan.pairs.len(), 1);
        assert_eq!(plan.left_only, vec![0]);
        assert_eq!(plan.right_only, vec![0]);
    }

    proptest! {
        #[test]
        fn every_row_accounted_once(
            left in proptest::collection::vec("[a-e]{1,4}", 0..12),
            right in proptest::collection::vec("[a-e]{1,4}", 0..12),
        ) {
            let scorers = default_scorers();
            let l: Vec<MatchKey> = left.iter().map(|n| MatchKey::new(n, None)).collect();
            let r: Vec<MatchKey> = right.iter().map(|n| MatchKey::new(n, None)).collect();
            let plan = plan_matches(&l, &r, full_options(&scorers, 0.75));

            prop_assert_eq!(plan.pairs.len() + plan.left_only.len(), l.len());
            prop_assert_eq!(plan.pairs.len() + plan.right_only.len(), r.len());

            let mut lefts: Vec<_> = plan.pairs.iter().map(|p| p.left).chain(plan.left_only.iter().copied()).collect();
            lefts.sort_unstable();
            lefts.dedup();
            prop_assert_eq!(lefts.len(), l.len());
            let mut rights: Vec<_> = plan.pairs.iter().map(|p| p.right).chain(plan.right_only.iter().copied()).collect();
            rights.sort_unstable();
            rights.dedup();
            prop_assert_eq!(rights.len(), r.len());
        }
    }
}
