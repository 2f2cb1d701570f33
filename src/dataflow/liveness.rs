//! Liveness analysis: up-exposed variables, kill sets and live-out sets per
//! block, plus the set of "global" names referenced by more than one block
//! (the inputs φ-insertion needs).

use std::collections::{HashMap, HashSet};

use crate::block::BlockId;
use crate::procedure::Procedure;
use crate::value::Value;

/// Liveness information for one procedure.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    /// Variables read in a block before being written in that same block.
    pub uevar: HashMap<BlockId, HashSet<String>>,
    /// Variables written anywhere in a block.
    pub varkill: HashMap<BlockId, HashSet<String>>,
    /// Variables live on exit from a block.
    pub live_out: HashMap<BlockId, HashSet<String>>,
    /// Names referenced (read or written) by more than one block; the
    /// candidates for φ-insertion.
    pub globals: HashSet<String>,
    /// For each global name, the blocks that define it.
    pub defining_blocks: HashMap<String, HashSet<BlockId>>,
}

impl Liveness {
    /// `true` if `name` is live on exit from `block`.
    pub fn is_live_out(&self, block: BlockId, name: &str) -> bool {
        self.live_out
            .get(&block)
            .map(|s| s.contains(name))
            .unwrap_or(false)
    }
}

/// The variable driving a use or def, recursing into a memory reference's
/// offset the same way SSA renaming does, so a memory-addressed operand or
/// assignee counts as a use/def of its address variable.
fn variable_name(v: &Value) -> Option<&str> {
    match v {
        Value::Memory { offset, .. } => variable_name(offset),
        other => other.variable_name(),
    }
}

/// Compute liveness sets for `proc`.
pub fn liveness(proc: &Procedure) -> Liveness {
    let order = proc.reverse_postorder();
    let mut uevar: HashMap<BlockId, HashSet<String>> = HashMap::new();
    let mut varkill: HashMap<BlockId, HashSet<String>> = HashMap::new();
    let mut referenced_by: HashMap<String, HashSet<BlockId>> = HashMap::new();
    let mut defining_blocks: HashMap<String, HashSet<BlockId>> = HashMap::new();

    for &b in &order {
        let block = proc.blocks.node(b).unwrap();
        let mut killed_so_far: HashSet<String> = HashSet::new();
        let mut ue: HashSet<String> = HashSet::new();
        let mut kill: HashSet<String> = HashSet::new();
        for mnemonic in &block.mnemonics {
            for instr in &mnemonic.instructions {
                for operand in instr.operands() {
                    if let Some(name) = variable_name(operand) {
                        if !killed_so_far.contains(name) {
                            ue.insert(name.to_string());
                        }
                        referenced_by
                            .entry(name.to_string())
                            .or_default()
                            .insert(b);
                    }
                }
                // A plain variable assignee is a def. A memory-reference
                // assignee's offset is a use, not a def — as in
                // `ssa::rename_block`, writing through `[x]` reads the
                // current definition of `x` rather than redefining it.
                match &instr.assignee {
                    Value::Variable { .. } => {
                        let name = instr.assignee.variable_name().unwrap();
                        kill.insert(name.to_string());
                        killed_so_far.insert(name.to_string());
                        referenced_by
                            .entry(name.to_string())
                            .or_default()
                            .insert(b);
                        defining_blocks
                            .entry(name.to_string())
                            .or_default()
                            .insert(b);
                    }
                    Value::Memory { offset, .. } => {
                        if let Some(name) = variable_name(offset) {
                            if !killed_so_far.contains(name) {
                                ue.insert(name.to_string());
                            }
                            referenced_by
                                .entry(name.to_string())
                                .or_default()
                                .insert(b);
                        }
                    }
                    _ => {}
                }
            }
        }
        uevar.insert(b, ue);
        varkill.insert(b, kill);
    }

    let mut live_out: HashMap<BlockId, HashSet<String>> =
        order.iter().map(|&b| (b, HashSet::new())).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for &b in &order {
            let mut new_live_out: HashSet<String> = HashSet::new();
            for succ in proc.blocks.successors(b) {
                if let Some(ue) = uevar.get(&succ) {
                    new_live_out.extend(ue.iter().cloned());
                }
                if let (Some(lo), Some(vk)) = (live_out.get(&succ), varkill.get(&succ)) {
                    new_live_out.extend(lo.difference(vk).cloned());
                }
            }
            if live_out.get(&b) != Some(&new_live_out) {
                live_out.insert(b, new_live_out);
                changed = true;
            }
        }
    }

    let globals: HashSet<String> = referenced_by
        .iter()
        .filter(|(_, blocks)| blocks.len() > 1)
        .map(|(name, _)| name.clone())
        .collect();

    Liveness {
        uevar,
        varkill,
        live_out,
        globals,
        defining_blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BasicBlock, ControlTransfer};
    use crate::instruction::Instruction;
    use crate::mnemonic::Mnemonic;
    use crate::operator::Operator;

    #[test]
    fn up_exposed_and_killed() {
        // block: x := 1 (kill x); y := x + x (uses x, kills y)
        let x = Value::variable("x", 32).unwrap();
        let y = Value::variable("y", 32).unwrap();
        let one = Value::constant(1, 32).unwrap();
        let instr1 = Instruction::new(x.clone(), Operator::Lift(one)).unwrap();
        let instr2 = Instruction::new(y, Operator::IntAdd(x.clone(), x)).unwrap();
        let m = Mnemonic::new(0..2, "seq", vec![], vec![], vec![instr1, instr2]).unwrap();
        let block = BasicBlock::new(vec![m]).unwrap();
        let proc = Procedure::new("sub_0", block);
        let live = liveness(&proc);
        assert!(live.uevar[&proc.entry].is_empty());
        assert!(live.varkill[&proc.entry].contains("x"));
        assert!(live.varkill[&proc.entry].contains("y"));
    }

    #[test]
    fn memory_offset_variable_counts_as_a_use_in_both_store_and_load() {
        // block: store [x] := 1 (the assignee is a memory reference, so its
        // offset is a use of x, not a def — x is never killed here); second
        // block: y := [x] (uses x again through a memory read). x must
        // therefore be live out of the first block and live-in to the
        // second, and x is a global since both blocks reference it.
        let x = Value::variable("x", 32).unwrap();
        let one = Value::constant(1, 32).unwrap();
        let store_addr = Value::memory(x.clone(), 4, crate::value::Endianness::Little, "ram").unwrap();
        let store = Instruction::new(store_addr, Operator::Lift(one)).unwrap();
        let m1 = Mnemonic::new(0..2, "store", vec![], vec![], vec![store]).unwrap();
        let b1 = BasicBlock::new(vec![m1]).unwrap();

        let load_addr = Value::memory(x, 4, crate::value::Endianness::Little, "ram").unwrap();
        let y = Value::variable("y", 32).unwrap();
        let load = Instruction::new(y, Operator::Lift(load_addr)).unwrap();
        let m2 = Mnemonic::new(2..4, "load", vec![], vec![], vec![load]).unwrap();
        let b2 = BasicBlock::new(vec![m2]).unwrap();

        let mut proc = Procedure::new("sub_0", b1);
        let second = proc.add_block(b2);
        proc.add_edge(
            proc.entry,
            second,
            ControlTransfer {
                resolved: Some(second),
                ..ControlTransfer::unconditional(Value::undefined())
            },
        );
        let live = liveness(&proc);
        assert!(live.uevar[&proc.entry].contains("x"), "a memory-addressed assignee's offset is a use of x, not a def");
        assert!(!live.varkill[&proc.entry].contains("x"), "storing through [x] must not kill x itself");
        assert!(live.uevar[&second].contains("x"), "a memory-addressed operand counts as a use of its offset variable");
        assert!(live.globals.contains("x"));
        assert!(live.is_live_out(proc.entry, "x"));
    }

    #[test]
    fn liveness_propagates_across_edge() {
        let x = Value::variable("x", 32).unwrap();
        let one = Value::constant(1, 32).unwrap();
        let def = Instruction::new(x.clone(), Operator::Lift(one)).unwrap();
        let m1 = Mnemonic::new(0..2, "def", vec![], vec![], vec![def]).unwrap();
        let b1 = BasicBlock::new(vec![m1]).unwrap();

        let y = Value::variable("y", 32).unwrap();
        let use_ = Instruction::new(y, Operator::Lift(x.clone())).unwrap();
        let m2 = Mnemonic::new(2..4, "use", vec![], vec![], vec![use_]).unwrap();
        let b2 = BasicBlock::new(vec![m2]).unwrap();

        let mut proc = Procedure::new("sub_0", b1);
        let second = proc.add_block(b2);
        proc.add_edge(
            proc.entry,
            second,
            ControlTransfer {
                resolved: Some(second),
                ..ControlTransfer::unconditional(Value::undefined())
            },
        );
        let live = liveness(&proc);
        assert!(live.is_live_out(proc.entry, "x"));
        assert!(!live.is_live_out(second, "x"));
    }
}
