//! Procedures: a connected subgraph of basic blocks with a distinguished
//! entry.

use std::collections::{HashSet, VecDeque};

use crate::block::{BasicBlock, BlockId, ControlTransfer};
use crate::error::{Error, Result};
use crate::graph::IndexedGraph;
use crate::value::Value;

/// A procedure: a set of basic blocks joined by control transfers, with one
/// distinguished entry block.
///
/// Invariant: `entry` is always a node of `blocks`; every outgoing control
/// transfer whose target is a constant address within `hull(blocks)` is
/// resolved to the block starting at that address (enforced incrementally
/// by the disassembly driver, see `crate::driver`).
pub struct Procedure {
    /// A human-readable name (often `sub_<entry address>`).
    pub name: String,
    /// The entry block.
    pub entry: BlockId,
    /// The block/control-transfer graph.
    pub blocks: IndexedGraph<BasicBlock, ControlTransfer>,
    /// Constant call targets discovered in this procedure's body, by
    /// address (populated by the driver; resolved to callee procedure
    /// names once the callee is known).
    pub callees: Vec<u64>,
    /// Names of procedures known to call this one.
    pub callers: Vec<String>,
    /// Control transfers whose target is not yet a known block of this
    /// procedure (an indirect jump through a register, or a constant not
    /// yet decoded). Not part of `blocks`'s edge set since
    /// [`crate::graph::IndexedGraph`] requires real node endpoints; kept
    /// here, per source block, so SSA renaming still rewrites their guard
    /// and target and the driver can promote them to real edges once SSCP
    /// resolves a constant.
    pub pending_transfers: Vec<(BlockId, ControlTransfer)>,
    rpo_cache: std::cell::RefCell<Option<Vec<BlockId>>>,
}

impl Procedure {
    /// Construct a new procedure whose only block, so far, is `entry_block`.
    pub fn new(name: impl Into<String>, entry_block: BasicBlock) -> Procedure {
        let mut blocks = IndexedGraph::new();
        let entry = blocks.add_node(entry_block);
        Procedure {
            name: name.into(),
            entry,
            blocks,
            callees: Vec::new(),
            callers: Vec::new(),
            pending_transfers: Vec::new(),
            rpo_cache: std::cell::RefCell::new(None),
        }
    }

    /// Record a control transfer whose target is not yet resolvable to a
    /// known block.
    pub fn add_pending_transfer(&mut self, from: BlockId, transfer: ControlTransfer) {
        self.pending_transfers.push((from, transfer));
    }

    /// Remove and return every pending transfer from `from` whose target
    /// `resolve` maps to a constant, leaving the rest untouched. Used by the
    /// driver after each SSCP pass to promote newly-resolved indirect jumps
    /// to real edges.
    pub fn take_resolved_transfers(
        &mut self,
        mut resolve: impl FnMut(&Value) -> Option<u64>,
    ) -> Vec<(BlockId, ControlTransfer, u64)> {
        let mut resolved = Vec::new();
        let mut remaining = Vec::new();
        for (from, transfer) in self.pending_transfers.drain(..) {
            match resolve(&transfer.target) {
                Some(c) => resolved.push((from, transfer, c)),
                None => remaining.push((from, transfer)),
            }
        }
        self.pending_transfers = remaining;
        resolved
    }

    /// Insert a new basic block, invalidating the cached reverse
    /// post-order.
    pub fn add_block(&mut self, block: BasicBlock) -> BlockId {
        self.invalidate_rpo();
        self.blocks.add_node(block)
    }

    /// Insert a control-transfer edge `from -> to`, invalidating the cached
    /// reverse post-order.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, transfer: ControlTransfer) {
        self.invalidate_rpo();
        self.blocks.add_edge(from, to, transfer);
    }

    fn invalidate_rpo(&self) {
        *self.rpo_cache.borrow_mut() = None;
    }

    /// The hull of every block's area: `[min lo, max hi)`.
    pub fn area(&self) -> std::ops::Range<u64> {
        let mut lo = u64::MAX;
        let mut hi = 0u64;
        for id in self.blocks.node_ids() {
            let a = self.blocks.node(id).unwrap().area();
            lo = lo.min(a.start);
            hi = hi.max(a.end);
        }
        if lo > hi {
            0..0
        } else {
            lo..hi
        }
    }

    /// Find the block whose area contains `addr`, if any.
    pub fn block_at(&self, addr: u64) -> Option<BlockId> {
        self.blocks
            .node_ids()
            .find(|&id| self.blocks.node(id).unwrap().contains(addr))
    }

    /// Reverse post-order over the blocks reachable from `entry`, computed
    /// by a DFS post-order traversal and then reversed. This is the
    /// canonical iteration order for dominance, liveness and SSA
    /// construction; the result is cached until the next mutation.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if let Some(cached) = self.rpo_cache.borrow().as_ref() {
            return cached.clone();
        }
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        self.dfs_postorder(self.entry, &mut visited, &mut postorder);
        postorder.reverse();
        *self.rpo_cache.borrow_mut() = Some(postorder.clone());
        postorder
    }

    fn dfs_postorder(
        &self,
        node: BlockId,
        visited: &mut HashSet<BlockId>,
        out: &mut Vec<BlockId>,
    ) {
        if !visited.insert(node) {
            return;
        }
        for succ in self.blocks.successors(node) {
            self.dfs_postorder(succ, visited, out);
        }
        out.push(node);
    }

    /// All blocks reachable from the entry.
    pub fn reachable_blocks(&self) -> HashSet<BlockId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(n) = queue.pop_front() {
            if visited.insert(n) {
                queue.extend(self.blocks.successors(n));
            }
        }
        visited
    }

    /// Split the block at `block` so that a jump targeting `split_at`
    /// lands exactly on a block boundary.
    ///
    /// The first half keeps all of `block`'s incoming edges; the second
    /// half keeps all of `block`'s outgoing edges; an unconditional
    /// transfer links first to second.
    ///
    /// # Errors
    /// Propagates [`Error::Structural`] from [`BasicBlock::split`] if
    /// `split_at` does not fall on a mnemonic boundary within `block`.
    pub fn split_block(&mut self, block: BlockId, split_at: u64) -> Result<BlockId> {
        let original = self
            .blocks
            .node(block)
            .ok_or_else(|| Error::Structural { address: split_at })?
            .clone();
        let (first, second) = original.split(split_at)?;

        // The first half keeps all of `block`'s incoming edges as-is (they
        // still point at `block`'s NodeId, unchanged below). Collect the
        // outgoing edges so they can be moved onto the second half.
        let outgoing: Vec<_> = self
            .blocks
            .out_edges(block)
            .iter()
            .filter_map(|&e| {
                self.blocks
                    .endpoints(e)
                    .map(|(_, dst)| (dst, self.blocks.edge(e).unwrap().clone_shallow()))
            })
            .collect();
        let old_out: Vec<_> = self.blocks.out_edges(block).to_vec();

        *self.blocks.node_mut(block).unwrap() = first;
        let second_id = self.add_block(second);

        for e in old_out {
            self.blocks.remove_edge(e);
        }
        for (dst, transfer) in outgoing {
            self.blocks.add_edge(second_id, dst, transfer);
        }
        self.blocks.add_edge(
            block,
            second_id,
            ControlTransfer {
                resolved: Some(second_id),
                ..ControlTransfer::unconditional(Value::undefined())
            },
        );
        Ok(second_id)
    }

    /// Merge `a` into `b` when `a` has exactly one outgoing, always-taken
    /// transfer to `b`, and `b` has exactly one predecessor (`a`).
    ///
    /// Returns `true` if the merge was performed.
    pub fn try_merge(&mut self, a: BlockId, b: BlockId) -> bool {
        if self.blocks.out_edges(a).len() != 1 || self.blocks.in_edges(b).len() != 1 {
            return false;
        }
        let out_edge = self.blocks.out_edges(a)[0];
        let transfer = self.blocks.edge(out_edge).unwrap();
        if !transfer.guard.is_always() || transfer.resolved != Some(b) {
            return false;
        }
        let mut merged = self.blocks.node(a).unwrap().clone();
        merged
            .mnemonics
            .extend(self.blocks.node(b).unwrap().mnemonics.clone());
        let outgoing: Vec<_> = self
            .blocks
            .out_edges(b)
            .iter()
            .filter_map(|&e| {
                self.blocks
                    .endpoints(e)
                    .map(|(_, dst)| (dst, self.blocks.edge(e).unwrap().clone_shallow()))
            })
            .collect();
        *self.blocks.node_mut(a).unwrap() = merged;
        self.blocks.remove_edge(out_edge);
        for (dst, transfer) in outgoing {
            self.blocks.add_edge(a, dst, transfer);
        }
        self.invalidate_rpo();
        true
    }
}

impl ControlTransfer {
    /// A shallow clone used when relinking edges during block splitting and
    /// merging (guard and target are cheap to clone; `resolved` carries
    /// over as-is).
    fn clone_shallow(&self) -> ControlTransfer {
        ControlTransfer {
            guard: self.guard.clone(),
            target: self.target.clone(),
            resolved: self.resolved,
        }
    }
}
