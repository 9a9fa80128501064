//! Position reconciler: dense renumbering for a single move.
//!
//! `moving` is taken out of the preset's ascending order and reinserted next
//! to `slot`: after it when `moving` was earlier, before it when `moving` was
//! later. Every block set is then numbered `0..n` in the new order, so gaps
//! left by deletions close on the next move.

use promptchain_core::{BlockSet, BlockSetId, EntityKind, Error, Result};
use serde::Serialize;

/// The order and positions a move produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovePlan {
    /// Block set ids in their new order.
    pub order: Vec<BlockSetId>,
}

impl MovePlan {
    /// Every block set with its new dense position.
    pub fn positions(&self) -> Vec<(BlockSetId, i64)> {
        self.order
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index as i64))
            .collect()
    }

    /// Only the positions that differ from `current`.
    pub fn changes(&self, current: &[BlockSet]) -> Vec<(BlockSetId, i64)> {
        self.positions()
            .into_iter()
            .filter(|(id, position)| {
                current
                    .iter()
                    .find(|bs| bs.id == *id)
                    .is_none_or(|bs| bs.position != *position)
            })
            .collect()
    }
}

/// Plan moving `moving` into the slot of `slot`.
///
/// `ordered` is the preset's block set ids in ascending position order. Both
/// ids must be in it, or the move fails with `NotFound` and nothing is planned.
pub fn plan_move(ordered: &[BlockSetId], moving: BlockSetId, slot: BlockSetId) -> Result<MovePlan> {
    let from = ordered
        .iter()
        .position(|id| *id == moving)
        .ok_or_else(|| Error::not_found(EntityKind::BlockSet, moving))?;
    let to = ordered
        .iter()
        .position(|id| *id == slot)
        .ok_or_else(|| Error::not_found(EntityKind::BlockSet, slot))?;

    let mut order = ordered.to_vec();
    let id = order.remove(from);
    // After the removal, index `to` is right behind `slot` when moving forward
    // and right at `slot` when moving backward.
    order.insert(to, id);

    Ok(MovePlan { order })
}
