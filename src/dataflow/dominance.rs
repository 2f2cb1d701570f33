//! Dominance trees and frontiers, computed with the iterative
//! Cooper-Harvey-Kennedy algorithm over reverse post-order.

use std::collections::{HashMap, HashSet};

use crate::block::BlockId;
use crate::procedure::Procedure;

/// The dominance tree of a procedure: immediate dominators plus, per block,
/// the set of blocks in its dominance frontier.
#[derive(Debug, Clone, Default)]
pub struct Dominance {
    /// `idom[b]` is `b`'s immediate dominator; the entry block has no
    /// entry (its root-ness is implicit in `Procedure::entry`).
    idom: HashMap<BlockId, BlockId>,
    /// Dominance frontiers: `d` is in `frontiers[b]` iff `b` dominates a
    /// predecessor of `d` but does not strictly dominate `d`.
    frontiers: HashMap<BlockId, HashSet<BlockId>>,
    entry: Option<BlockId>,
}

impl Dominance {
    /// The immediate dominator of `block`, or `None` for the entry block
    /// (the root) or for a block unreachable from the entry.
    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied()
    }

    /// The dominance frontier of `block` (empty if `block` has none).
    pub fn frontier(&self, block: BlockId) -> HashSet<BlockId> {
        self.frontiers.get(&block).cloned().unwrap_or_default()
    }

    /// Every block whose dominance frontier is non-empty, paired with that
    /// frontier. Used by φ-insertion to avoid probing every block.
    pub fn frontiers(&self) -> &HashMap<BlockId, HashSet<BlockId>> {
        &self.frontiers
    }

    /// `true` if `a` dominates `b` (every path from the entry to `b` passes
    /// through `a`; a block trivially dominates itself).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&idom) = self.idom.get(&cur) {
            if idom == a {
                return true;
            }
            if idom == cur {
                break;
            }
            cur = idom;
        }
        false
    }

    /// The entry (root of the dominance tree), if this `Dominance` was
    /// computed from a non-empty procedure.
    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }
}

/// Compute the dominance tree of `proc` using the iterative
/// Cooper-Harvey-Kennedy algorithm over reverse post-order.
pub fn dominance_tree(proc: &Procedure) -> Dominance {
    let order = proc.reverse_postorder();
    if order.is_empty() {
        return Dominance::default();
    }
    let entry = order[0];
    let rpo_index: HashMap<BlockId, usize> = order
        .iter()
        .enumerate()
        .map(|(i, &b)| (b, i))
        .collect();

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in order.iter().skip(1) {
            let preds: Vec<BlockId> = proc
                .blocks
                .predecessors(b)
                .filter(|p| rpo_index.contains_key(p))
                .collect();
            let mut new_idom: Option<BlockId> = None;
            for p in preds {
                if !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, &rpo_index),
                });
            }
            if let Some(new_idom) = new_idom {
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }

    let mut frontiers: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &b in &order {
        let preds: Vec<BlockId> = proc.blocks.predecessors(b).collect();
        if preds.len() < 2 {
            continue;
        }
        for p in preds {
            if !idom.contains_key(&p) {
                continue;
            }
            let mut runner = p;
            while runner != *idom.get(&b).unwrap_or(&entry) {
                frontiers.entry(runner).or_default().insert(b);
                let next = idom.get(&runner).copied().unwrap_or(runner);
                if next == runner {
                    break;
                }
                runner = next;
            }
        }
    }

    Dominance {
        idom,
        frontiers,
        entry: Some(entry),
    }
}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BasicBlock, ControlTransfer};
    use crate::mnemonic::Mnemonic;
    use crate::value::Value;

    fn block(lo: u64, hi: u64) -> BasicBlock {
        BasicBlock::new(vec![Mnemonic::new(lo..hi, "nop", vec![], vec![], vec![]).unwrap()])
            .unwrap()
    }

    #[test]
    fn diamond_dominance() {
        // entry(A) -> B, C; B -> D; C -> D
        let mut proc = Procedure::new("sub_0", block(0, 2));
        let a = proc.entry;
        let b = proc.add_block(block(2, 4));
        let c = proc.add_block(block(4, 6));
        let d = proc.add_block(block(6, 8));
        proc.add_edge(a, b, ControlTransfer {
            resolved: Some(b),
            ..ControlTransfer::unconditional(Value::undefined())
        });
        proc.add_edge(a, c, ControlTransfer {
            resolved: Some(c),
            ..ControlTransfer::unconditional(Value::undefined())
        });
        proc.add_edge(b, d, ControlTransfer {
            resolved: Some(d),
            ..ControlTransfer::unconditional(Value::undefined())
        });
        proc.add_edge(c, d, ControlTransfer {
            resolved: Some(d),
            ..ControlTransfer::unconditional(Value::undefined())
        });

        let dom = dominance_tree(&proc);
        assert_eq!(dom.immediate_dominator(d), Some(a));
        assert!(dom.dominates(a, d));
        assert!(!dom.dominates(b, d));
        assert!(dom.frontier(b).contains(&d));
        assert!(dom.frontier(c).contains(&d));
    }

    #[test]
    fn loop_back_edge_idom() {
        let mut proc = Procedure::new("sub_0", block(0, 2));
        let first = proc.entry;
        let second = proc.add_block(block(2, 4));
        proc.add_edge(first, second, ControlTransfer {
            resolved: Some(second),
            ..ControlTransfer::unconditional(Value::undefined())
        });
        proc.add_edge(second, second, ControlTransfer {
            resolved: Some(second),
            ..ControlTransfer::unconditional(Value::undefined())
        });
        let dom = dominance_tree(&proc);
        assert_eq!(dom.immediate_dominator(second), Some(first));
    }
}
