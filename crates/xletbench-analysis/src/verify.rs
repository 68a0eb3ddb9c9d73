//! Consistency verifier.
//!
//! The inlet attaches after the outlet has started, so it legitimately misses
//! a prefix of the stream. Once attached it must see an exact, contiguous,
//! order-preserving run of the outlet's values. A truncated tail on the inlet
//! side is not loss; any gap, duplicate, reordering, or value the outlet never
//! sent is.

use serde::{Deserialize, Serialize};
use xletbench_core::AlignmentError;

/// First position where the inlet diverges from the outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Index into the inlet sequence.
    pub inlet_index: usize,
    /// Value the outlet sent at that position; `None` past its end.
    pub expected: Option<i64>,
    pub found: i64,
}

/// Outcome of lining up one inlet log against its outlet log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consistency {
    pub loss_detected: bool,
    /// Outlet samples sent before the inlet's first value.
    pub skipped_prefix: usize,
    /// Inlet samples compared (all of them).
    pub compared: usize,
    pub first_mismatch: Option<Mismatch>,
}

/// `Ok(true)` when the inlet lost, duplicated or reordered anything after
/// attaching to the stream.
pub fn verify(outlet: &[i64], inlet: &[i64]) -> Result<bool, AlignmentError> {
    verify_detailed(outlet, inlet).map(|c| c.loss_detected)
}

pub fn verify_detailed(outlet: &[i64], inlet: &[i64]) -> Result<Consistency, AlignmentError> {
    let &first = inlet.first().ok_or(AlignmentError::EmptyInlet)?;
    let start = outlet
        .iter()
        .position(|&v| v == first)
        .ok_or(AlignmentError::NotInOutlet { value: first })?;

    let expected = &outlet[start..];
    let first_mismatch = inlet
        .iter()
        .enumerate()
        .find_map(|(i, &found)| match expected.get(i) {
            Some(&e) if e == found => None,
            other => Some(Mismatch {
                inlet_index: i,
                expected: other.copied(),
                found,
            }),
        });

    if let Some(m) = &first_mismatch {
        log::debug!(
            "inlet diverges at index {}: expected {:?}, found {}",
            m.inlet_index,
            m.expected,
            m.found
        );
    }

    Ok(Consistency {
        loss_detected: first_mismatch.is_some(),
        skipped_prefix: start,
        compared: inlet.len(),
        first_mismatch,
    })
}
