//! SSA construction: φ-insertion followed by dominator-tree-order renaming.

use std::collections::{HashMap, HashSet};

use crate::block::BlockId;
use crate::dataflow::dominance::Dominance;
use crate::dataflow::liveness::Liveness;
use crate::error::{Error, Result};
use crate::instruction::Instruction;
use crate::mnemonic::Mnemonic;
use crate::operator::Operator;
use crate::procedure::Procedure;
use crate::value::Value;

/// Convert `proc` to SSA form in place: insert φ-instructions at dominance
/// frontiers for every global name, then rename every definition and use by
/// a pre-order walk of the dominator tree.
///
/// # Errors
/// Returns [`Error::Analysis`] if a use has no dominating definition on some
/// incoming path.
pub fn convert(proc: &mut Procedure, dom: &Dominance, live: &Liveness) -> Result<()> {
    insert_phis(proc, dom, live)?;

    let mut counter: HashMap<String, u32> = HashMap::new();
    let mut stacks: HashMap<String, Vec<u32>> = HashMap::new();
    rename_from(proc.entry, proc, dom, &mut counter, &mut stacks)
}

fn insert_phis(proc: &mut Procedure, dom: &Dominance, live: &Liveness) -> Result<()> {
    let mut names: Vec<&String> = live.globals.iter().collect();
    names.sort();
    for name in names {
        let mut worklist: Vec<BlockId> = live
            .defining_blocks
            .get(name)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        let mut on_worklist: HashSet<BlockId> = worklist.iter().copied().collect();
        let mut has_phi: HashSet<BlockId> = HashSet::new();

        while let Some(b) = worklist.pop() {
            let frontier = dom.frontier(b);
            let mut frontier_sorted: Vec<BlockId> = frontier.into_iter().collect();
            frontier_sorted.sort_by_key(|n| n.0);
            for d in frontier_sorted {
                if has_phi.contains(&d) {
                    continue;
                }
                let width = variable_width(proc, name).ok_or_else(|| {
                    Error::Analysis(format!("no definition of {} found to infer width", name))
                })?;
                let pred_count = proc.blocks.predecessors(d).count().max(1);
                let assignee = Value::variable(name.clone(), width)?;
                let instr = Instruction::new(assignee, Operator::Phi(vec![Value::Undefined; pred_count]))?;
                add_phi_to_block_head(proc, d, instr);
                has_phi.insert(d);
                if on_worklist.insert(d) {
                    worklist.push(d);
                }
            }
        }
    }
    Ok(())
}

fn variable_width(proc: &Procedure, name: &str) -> Option<u16> {
    for id in proc.blocks.node_ids() {
        let block = proc.blocks.node(id).unwrap();
        for mnemonic in &block.mnemonics {
            for instr in &mnemonic.instructions {
                if let Value::Variable { name: n, width, .. } = &instr.assignee {
                    if n == name {
                        return Some(*width);
                    }
                }
                for operand in instr.operands() {
                    if let Value::Variable { name: n, width, .. } = operand {
                        if n == name {
                            return Some(*width);
                        }
                    }
                }
            }
        }
    }
    None
}

fn add_phi_to_block_head(proc: &mut Procedure, block: BlockId, instr: Instruction) {
    let bb = proc.blocks.node_mut(block).unwrap();
    match bb.mnemonics.first_mut() {
        Some(head) if head.is_internal_phis() => head.instructions.push(instr),
        _ => {
            let at = bb.area().start;
            bb.mnemonics.insert(0, Mnemonic::internal_phis(at, vec![instr]));
        }
    }
}

fn rewrite_rhs(value: &mut Value, stacks: &HashMap<String, Vec<u32>>) -> Result<()> {
    match value {
        Value::Variable { name, subscript, .. } => {
            let top = stacks
                .get(name.as_str())
                .and_then(|s| s.last())
                .ok_or_else(|| {
                    Error::Analysis(format!(
                        "use of {} has no dominating definition on this path",
                        name
                    ))
                })?;
            *subscript = Some(*top);
            Ok(())
        }
        Value::Memory { offset, .. } => rewrite_rhs(offset, stacks),
        Value::Undefined | Value::Constant { .. } => Ok(()),
    }
}

/// Recursively process `b`, then its dominator-tree children, then pop
/// whatever subscripts `b` pushed.
fn rename_from(
    b: BlockId,
    proc: &mut Procedure,
    dom: &Dominance,
    counter: &mut HashMap<String, u32>,
    stacks: &mut HashMap<String, Vec<u32>>,
) -> Result<()> {
    let pushed = rename_block(b, proc, stacks, counter)?;
    fill_successor_phis(b, proc, stacks);
    rewrite_outgoing_transfers(b, proc, stacks)?;

    let mut children: Vec<BlockId> = proc
        .reverse_postorder()
        .into_iter()
        .filter(|&n| n != b && dom.immediate_dominator(n) == Some(b))
        .collect();
    children.sort_by_key(|n| n.0);
    for child in children {
        rename_from(child, proc, dom, counter, stacks)?;
    }

    for name in pushed {
        if let Some(stack) = stacks.get_mut(&name) {
            stack.pop();
        }
    }
    Ok(())
}

fn fresh(name: &str, counter: &mut HashMap<String, u32>) -> u32 {
    let slot = counter.entry(name.to_string()).or_insert(0);
    let v = *slot;
    *slot += 1;
    v
}

/// Rewrite every instruction of `b` in place, returning the names whose
/// stacks were pushed (so the caller can pop them on the way back up).
fn rename_block(
    b: BlockId,
    proc: &mut Procedure,
    stacks: &mut HashMap<String, Vec<u32>>,
    counter: &mut HashMap<String, u32>,
) -> Result<Vec<String>> {
    let mut pushed = Vec::new();
    let block = proc.blocks.node_mut(b).unwrap();
    for mnemonic in block.mnemonics.iter_mut() {
        if mnemonic.is_internal_phis() {
            for instr in mnemonic.instructions.iter_mut() {
                if let Value::Variable { name, subscript, .. } = &mut instr.assignee {
                    let s = fresh(name, counter);
                    *subscript = Some(s);
                    stacks.entry(name.clone()).or_default().push(s);
                    pushed.push(name.clone());
                }
            }
            continue;
        }
        for instr in mnemonic.instructions.iter_mut() {
            for operand in instr.op.operands_mut() {
                rewrite_rhs(operand, stacks)?;
            }
            match &mut instr.assignee {
                Value::Variable { name, subscript, .. } => {
                    let s = fresh(name, counter);
                    *subscript = Some(s);
                    stacks.entry(name.clone()).or_default().push(s);
                    pushed.push(name.clone());
                }
                Value::Memory { offset, .. } => rewrite_rhs(offset, stacks)?,
                _ => {}
            }
        }
    }
    Ok(pushed)
}

/// Fill in this block's slot in each successor's φ-instructions using the
/// current top of the defining stack (or `Undefined` if this path never
/// defines that name — a legitimate diamond-join asymmetry, not an error).
fn fill_successor_phis(b: BlockId, proc: &mut Procedure, stacks: &HashMap<String, Vec<u32>>) {
    let successors: Vec<BlockId> = proc.blocks.successors(b).collect();
    for succ in successors {
        let preds: Vec<BlockId> = proc.blocks.predecessors(succ).collect();
        let idx = match preds.iter().position(|&p| p == b) {
            Some(i) => i,
            None => continue,
        };
        let block = proc.blocks.node_mut(succ).unwrap();
        let head = match block.mnemonics.first_mut() {
            Some(h) if h.is_internal_phis() => h,
            _ => continue,
        };
        for instr in head.instructions.iter_mut() {
            let (name, width) = match &instr.assignee {
                Value::Variable { name, width, .. } => (name.clone(), *width),
                _ => continue,
            };
            let value = stacks
                .get(&name)
                .and_then(|s| s.last())
                .map(|sub| Value::variable_with_subscript(name.clone(), width, Some(*sub)).unwrap())
                .unwrap_or(Value::Undefined);
            if let Operator::Phi(ops) = &mut instr.op {
                if idx < ops.len() {
                    ops[idx] = value;
                }
            }
        }
    }
}

/// Rewrite the guard relations and target of every outgoing control
/// transfer of `b` using the current definitions.
fn rewrite_outgoing_transfers(
    b: BlockId,
    proc: &mut Procedure,
    stacks: &HashMap<String, Vec<u32>>,
) -> Result<()> {
    let edges: Vec<_> = proc.blocks.out_edges(b).to_vec();
    for e in edges {
        let transfer = proc.blocks.edge_mut(e).unwrap();
        for rel in transfer.guard.relations.iter_mut() {
            rewrite_rhs_allow_unset(&mut rel.op1, stacks);
            rewrite_rhs_allow_unset(&mut rel.op2, stacks);
        }
        rewrite_rhs_allow_unset(&mut transfer.target, stacks);
    }
    for (from, transfer) in proc.pending_transfers.iter_mut() {
        if *from != b {
            continue;
        }
        for rel in transfer.guard.relations.iter_mut() {
            rewrite_rhs_allow_unset(&mut rel.op1, stacks);
            rewrite_rhs_allow_unset(&mut rel.op2, stacks);
        }
        rewrite_rhs_allow_unset(&mut transfer.target, stacks);
    }
    Ok(())
}

/// Like [`rewrite_rhs`] but tolerant of an unset variable (guards and jump
/// targets may legitimately reference architectural state this pass never
/// saw a definition for, e.g. a register the grammar treats as always
/// live-in); such variables are left un-subscripted rather than erroring.
fn rewrite_rhs_allow_unset(value: &mut Value, stacks: &HashMap<String, Vec<u32>>) {
    match value {
        Value::Variable { name, subscript, .. } => {
            if let Some(top) = stacks.get(name.as_str()).and_then(|s| s.last()) {
                *subscript = Some(*top);
            }
        }
        Value::Memory { offset, .. } => rewrite_rhs_allow_unset(offset, stacks),
        Value::Undefined | Value::Constant { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BasicBlock, ControlTransfer};
    use crate::dataflow::{dominance::dominance_tree, liveness::liveness};

    fn mn(lo: u64, hi: u64, instrs: Vec<Instruction>) -> Mnemonic {
        Mnemonic::new(lo..hi, "i", vec![], vec![], instrs).unwrap()
    }

    #[test]
    fn diamond_phi_insertion_and_rename() {
        let x = Value::variable("x", 32).unwrap();
        let one = Value::constant(1, 32).unwrap();
        let two = Value::constant(2, 32).unwrap();

        // A: x := 1; branch to B or C
        let a_def = Instruction::new(x.clone(), Operator::Lift(one)).unwrap();
        let a_block = BasicBlock::new(vec![mn(0, 2, vec![a_def])]).unwrap();
        let mut proc = Procedure::new("sub_0", a_block);
        let a = proc.entry;

        // B: x := 2
        let b_def = Instruction::new(x.clone(), Operator::Lift(two)).unwrap();
        let b_block = BasicBlock::new(vec![mn(2, 4, vec![b_def])]).unwrap();
        let b = proc.add_block(b_block);

        // C: (no def)
        let c_block = BasicBlock::new(vec![mn(4, 6, vec![])]).unwrap();
        let c = proc.add_block(c_block);

        // D: y := x
        let y = Value::variable("y", 32).unwrap();
        let d_use = Instruction::new(y, Operator::Lift(x.clone())).unwrap();
        let d_block = BasicBlock::new(vec![mn(6, 8, vec![d_use])]).unwrap();
        let d = proc.add_block(d_block);

        proc.add_edge(a, b, ControlTransfer { resolved: Some(b), ..ControlTransfer::unconditional(Value::undefined()) });
        proc.add_edge(a, c, ControlTransfer { resolved: Some(c), ..ControlTransfer::unconditional(Value::undefined()) });
        proc.add_edge(b, d, ControlTransfer { resolved: Some(d), ..ControlTransfer::unconditional(Value::undefined()) });
        proc.add_edge(c, d, ControlTransfer { resolved: Some(d), ..ControlTransfer::unconditional(Value::undefined()) });

        let dom = dominance_tree(&proc);
        let live = liveness(&proc);
        convert(&mut proc, &dom, &live).unwrap();

        let d_block = proc.blocks.node(d).unwrap();
        let head = &d_block.mnemonics[0];
        assert!(head.is_internal_phis());
        assert_eq!(head.instructions.len(), 1);
        if let Operator::Phi(ops) = &head.instructions[0].op {
            assert_eq!(ops.len(), 2);
        } else {
            panic!("expected phi");
        }
    }

    #[test]
    fn use_without_definition_is_analysis_error() {
        let y = Value::variable("y", 32).unwrap();
        let x = Value::variable("x", 32).unwrap();
        let instr = Instruction::new(y, Operator::Lift(x)).unwrap();
        let block = BasicBlock::new(vec![mn(0, 2, vec![instr])]).unwrap();
        let proc_orig = Procedure::new("sub_0", block);
        let dom = dominance_tree(&proc_orig);
        let live = liveness(&proc_orig);
        let mut proc = proc_orig;
        assert!(convert(&mut proc, &dom, &live).is_err());
    }
}
