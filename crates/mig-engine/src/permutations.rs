//! Multiset permutation search over creation orderings
//!
//! The driver chooses placements itself and rejects an instance that no
//! longer fits, so the order partitions are created in decides feasibility.
//! Rather than computing placements, the engine tries orderings until the
//! driver accepts one: depth-first backtracking over in-place swaps,
//! lexicographic with respect to the input order.
//!
//! Duplicate shapes are pruned with the standard check (position `i` never
//! receives a value it already held earlier in this branch), so each distinct
//! ordering of the multiset is attempted exactly once.

use tracing::error;

use mig_core::driver::DriverError;
use mig_core::{MigError, MigProfile, Result};

enum Outcome {
    Success,
    /// Every ordering in this branch failed with a retryable error
    Exhausted,
    Fatal(MigError),
}

/// Invoke `attempt` on permutations of `flat` until one succeeds.
///
/// A retryable error ([`MigError::is_retryable`]) advances to the next
/// ordering; any other error aborts the search and propagates. When every
/// ordering fails, the last retryable error is surfaced inside
/// [`MigError::AllOrderingsFailed`].
pub(crate) fn iterate_permutations_until_success<F>(
    mut flat: Vec<MigProfile>,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(&[MigProfile]) -> Result<()>,
{
    let mut last_err = None;
    match permute(&mut flat, 0, &mut attempt, &mut last_err) {
        Outcome::Success => Ok(()),
        Outcome::Fatal(err) => Err(err),
        Outcome::Exhausted => {
            let last = last_err.unwrap_or(MigError::Driver(DriverError::Other(
                "no candidate orderings".to_string(),
            )));
            Err(MigError::AllOrderingsFailed {
                last: Box::new(last),
            })
        }
    }
}

fn permute<F>(
    mps: &mut [MigProfile],
    index: usize,
    attempt: &mut F,
    last_err: &mut Option<MigError>,
) -> Outcome
where
    F: FnMut(&[MigProfile]) -> Result<()>,
{
    if index >= mps.len() {
        return match attempt(mps) {
            Ok(()) => Outcome::Success,
            Err(err) if err.is_retryable() => {
                error!(%err, "candidate creation ordering failed");
                *last_err = Some(err);
                Outcome::Exhausted
            }
            Err(err) => Outcome::Fatal(err),
        };
    }

    for swap_with in index..mps.len() {
        if already_placed(mps, index, swap_with) {
            continue;
        }
        mps.swap(index, swap_with);
        match permute(mps, index + 1, attempt, last_err) {
            Outcome::Success => return Outcome::Success,
            Outcome::Fatal(err) => {
                mps.swap(index, swap_with);
                return Outcome::Fatal(err);
            }
            Outcome::Exhausted => {}
        }
        mps.swap(index, swap_with);
    }

    Outcome::Exhausted
}

/// Whether the value at `candidate` was already tried at position `start` in
/// this branch; skipping it avoids re-enumerating orderings of equal shapes
fn already_placed(mps: &[MigProfile], start: usize, candidate: usize) -> bool {
    mps[start..candidate].contains(&mps[candidate])
}
