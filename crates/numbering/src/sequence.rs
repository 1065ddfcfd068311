//! Candidate resolution for the next sequence of a family/year.
//!
//! The stored counter is only a lower bound. The real floor comes from the
//! documents already stored for the same `(prefix, year)`, live or soft-deleted.

/// First sequence worth checking for a family/year.
///
/// `stored_next` is the counter's `prochain_numero`; `existing_max` is the
/// highest sequence found among stored documents of that prefix/year. Returns
/// `None` when the floor would overflow `u32`.
pub fn starting_candidate(stored_next: u32, existing_max: Option<u32>) -> Option<u32> {
    let floor = match existing_max {
        Some(max) => max.checked_add(1)?,
        None => 1,
    };
    Some(stored_next.max(floor))
}

/// Sequence after `sequence`, or `None` once the range is used up.
pub fn following(sequence: u32) -> Option<u32> {
    sequence.checked_add(1)
}
