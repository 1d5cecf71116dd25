//! Child matching
//!
//! Decides which committed child continues as which freshly parsed child.
//! Passes run in order, each only over items left unmatched by the previous
//! ones:
//!
//! 1. in place: same index, same digest
//! 2. shifted: same digest, nearest index
//! 3. similar: same kind, text similarity at or above the threshold
//! 4. positional: same index, same kind
//!
//! Equal candidates are ordered by score (higher first), index distance,
//! lineage id compared as text, then new index, so the outcome is identical
//! across runs.

use similar::TextDiff;
use std::cmp::Ordering;
use tracing::debug;
use verdant_history::HistoryConfig;
use verdant_nodey::{ContentHash, Lineage};

/// One item of a child list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: String,
    pub digest: ContentHash,
    pub text: String,
}

impl Candidate {
    #[must_use]
    pub fn new(kind: impl Into<String>, digest: ContentHash, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            digest,
            text: text.into(),
        }
    }

    fn same_content(&self, other: &Self) -> bool {
        self.kind == other.kind && self.digest == other.digest
    }
}

/// Committed child with its lineage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prior {
    pub lineage: Lineage,
    pub candidate: Candidate,
}

/// How a match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    InPlace,
    Shifted,
    Similar,
    Positional,
}

/// Match of one new child to a committed child
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildMatch {
    /// Index into the committed child list
    pub old: usize,
    pub kind: MatchKind,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct Scored {
    old: usize,
    new: usize,
    score: f64,
    delta: usize,
    lineage: Lineage,
    /// `"{cell}.{sub}"`, the tie-break key
    id: String,
}

impl Scored {
    fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.delta.cmp(&other.delta))
            .then_with(|| self.id.cmp(&other.id))
            .then(self.new.cmp(&other.new))
    }
}

/// Normalized text similarity in `[0, 1]`
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Matches committed children to new children
#[derive(Debug, Clone, Copy)]
pub struct ChildMatcher {
    threshold: f64,
}

impl ChildMatcher {
    /// Create matcher with a similarity threshold
    #[inline]
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Create matcher from history configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.similarity_threshold)
    }

    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Match new children against committed ones
    ///
    /// Returns one entry per new child: the committed child it continues, or
    /// `None` if it starts a new lineage. Each committed child is used at
    /// most once; unused ones are superseded.
    #[must_use]
    pub fn match_children(&self, old: &[Prior], new: &[Candidate]) -> Vec<Option<ChildMatch>> {
        let mut state = MatchState::new(old.len(), new.len());

        for (index, candidate) in new.iter().enumerate() {
            if old
                .get(index)
                .is_some_and(|prior| prior.candidate.same_content(candidate))
            {
                state.assign(index, index, MatchKind::InPlace, 1.0);
            }
        }

        let shifted = state.scored(old, new, |prior, candidate| {
            prior.same_content(candidate).then_some(1.0)
        });
        state.assign_greedy(shifted, MatchKind::Shifted);

        let threshold = self.threshold;
        let similar = state.scored(old, new, |prior, candidate| {
            if prior.kind != candidate.kind {
                return None;
            }
            let score = similarity(&prior.text, &candidate.text);
            (score >= threshold).then_some(score)
        });
        state.assign_greedy(similar, MatchKind::Similar);

        for (index, candidate) in new.iter().enumerate() {
            if state.matches[index].is_some() || state.taken.get(index).copied().unwrap_or(true) {
                continue;
            }
            if let Some(prior) = old.get(index).filter(|p| p.candidate.kind == candidate.kind) {
                let score = similarity(&prior.candidate.text, &candidate.text);
                state.assign(index, index, MatchKind::Positional, score);
            }
        }

        state.matches
    }
}

struct MatchState {
    matches: Vec<Option<ChildMatch>>,
    taken: Vec<bool>,
}

impl MatchState {
    fn new(old: usize, new: usize) -> Self {
        Self {
            matches: vec![None; new],
            taken: vec![false; old],
        }
    }

    fn assign(&mut self, old: usize, new: usize, kind: MatchKind, score: f64) {
        self.taken[old] = true;
        self.matches[new] = Some(ChildMatch { old, kind, score });
    }

    /// Score every still-unmatched pair
    fn scored<F>(&self, old: &[Prior], new: &[Candidate], mut score: F) -> Vec<Scored>
    where
        F: FnMut(&Candidate, &Candidate) -> Option<f64>,
    {
        let mut pairs = Vec::new();
        for (n, candidate) in new.iter().enumerate() {
            if self.matches[n].is_some() {
                continue;
            }
            for (o, prior) in old.iter().enumerate() {
                if self.taken[o] {
                    continue;
                }
                if let Some(value) = score(&prior.candidate, candidate) {
                    pairs.push(Scored {
                        old: o,
                        new: n,
                        score: value,
                        delta: o.abs_diff(n),
                        lineage: prior.lineage,
                        id: prior.lineage.to_string(),
                    });
                }
            }
        }
        pairs
    }

    fn assign_greedy(&mut self, mut pairs: Vec<Scored>, kind: MatchKind) {
        pairs.sort_by(Scored::rank);
        for pair in pairs {
            if self.taken[pair.old] || self.matches[pair.new].is_some() {
                continue;
            }
            debug!(
                lineage = %pair.lineage,
                old = pair.old,
                new = pair.new,
                score = pair.score,
                kind = ?kind,
                "matched child"
            );
            self.assign(pair.old, pair.new, kind, pair.score);
        }
    }
}
