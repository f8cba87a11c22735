//! Latest-of-type selection
//!
//! Pure functions over scanned candidate metadata: no filesystem access, so
//! the ordering rules can be tested against synthetic fixtures.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::{Candidate, SourceKind};

/// What a selection key was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBasis {
    PayloadDate,
    ModifiedTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectionKey {
    pub at: NaiveDateTime,
    pub basis: KeyBasis,
}

/// The candidate chosen as latest for its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub candidate: Candidate,
    pub key: SelectionKey,
}

/// Ordering key for a candidate.
///
/// Valuations dumps order by their latest payload date when one was probed;
/// everything else orders by modification time. `at` is the local wall clock
/// reading of that time, used when an mtime has to be ranked against a payload
/// date.
pub fn selection_key(candidate: &Candidate) -> SelectionKey {
    match (candidate.kind, candidate.payload_date) {
        (SourceKind::Valuations, Some(at)) => SelectionKey {
            at,
            basis: KeyBasis::PayloadDate,
        },
        _ => SelectionKey {
            at: candidate.modified.naive_local(),
            basis: KeyBasis::ModifiedTime,
        },
    }
}

fn compare(a: &(SelectionKey, &Candidate), b: &(SelectionKey, &Candidate)) -> Ordering {
    let by_key = match (a.0.basis, b.0.basis) {
        // Two mtimes compare as instants; wall clock readings repeat across a DST fall-back
        (KeyBasis::ModifiedTime, KeyBasis::ModifiedTime) => a.1.modified.cmp(&b.1.modified),
        _ => a.0.at.cmp(&b.0.at),
    };
    by_key.then_with(|| a.1.name.cmp(&b.1.name))
}

/// Pick the latest candidate of `kind`.
///
/// Greater key wins; equal keys fall back to the lexicographically greatest
/// file name, so the result does not depend on directory listing order.
pub fn select_latest(candidates: &[Candidate], kind: SourceKind) -> Option<Selection> {
    candidates
        .iter()
        .filter(|c| c.kind == kind)
        .map(|c| (selection_key(c), c))
        .max_by(compare)
        .map(|(key, candidate)| Selection {
            candidate: candidate.clone(),
            key,
        })
}

/// One selection per supported type that has candidates, in [`SourceKind::ALL`] order.
pub fn select_all(candidates: &[Candidate]) -> Vec<Selection> {
    SourceKind::ALL
        .into_iter()
        .filter_map(|kind| select_latest(candidates, kind))
        .collect()
}
