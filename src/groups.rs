//! Cycle prevention for hierarchical group moves.
//!
//! Reparenting a group must not create a cycle. The check walks the ancestor
//! chain of the proposed parent upward and fails the move if it ever reaches
//! the group being moved. The walk is bounded so that already-malformed data
//! (a cyclic graph left behind by an earlier bug) cannot hang it.

use crate::error::StoreError;

/// Maximum ancestor hops before the walk gives up.
pub const MAX_ANCESTOR_HOPS: usize = 64;

/// Whether moving `child` under `new_parent` keeps the hierarchy acyclic.
///
/// `parent_of` resolves a group id to its parent id (`None` at a root).
/// Returns `false` when `new_parent` is `child` itself or a descendant of it.
/// If the hop budget runs out without meeting `child`, the move is allowed:
/// at that depth a legitimate hierarchy and a malformed graph look the same
/// to this check, and the bound exists to guarantee termination, not to
/// reject deep trees.
pub fn can_reparent<F>(child: i64, new_parent: i64, mut parent_of: F) -> Result<bool, StoreError>
where
    F: FnMut(i64) -> Result<Option<i64>, StoreError>,
{
    let mut current = Some(new_parent);
    for _ in 0..MAX_ANCESTOR_HOPS {
        match current {
            None => return Ok(true),
            Some(id) if id == child => return Ok(false),
            Some(id) => current = parent_of(id)?,
        }
    }
    Ok(true)
}
