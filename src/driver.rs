//! The disassembly driver: turns an architecture grammar, byte source and
//! entry address into a [`Program`], growing each procedure's local
//! control-flow graph and running the dataflow passes over it to resolve
//! indirect jumps.

use std::collections::{HashMap, HashSet, VecDeque};

use rayon::prelude::*;

use crate::arch::Architecture;
use crate::block::{BasicBlock, BlockId, ControlTransfer, Guard};
use crate::dataflow::{dominance, liveness, sscp, ssa};
use crate::disasm::builder::TemporaryCounter;
use crate::disasm::decode_one;
use crate::disasm::state::Jump;
use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::procedure::Procedure;
use crate::program::Program;
use crate::source::ByteSource;
use crate::value::Value;

/// Driver-tunable knobs. Dataflow analysis defaults to enabled.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Upper bound on procedures decoded concurrently.
    pub max_worklist_threads: usize,
    /// Run dominance/liveness/SSA/SSCP after each procedure's local decode
    /// loop. Disabling this also disables indirect-jump resolution.
    pub run_dataflow: bool,
    /// Safety bound on the redecode/SSCP fixed-point loop. Exceeding it is
    /// an `Error::Analysis` for that procedure, not a panic.
    pub max_fixed_point_iterations: usize,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            max_worklist_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            run_dataflow: true,
            max_fixed_point_iterations: 64,
        }
    }
}

fn addr_width(arch: &dyn Architecture) -> u8 {
    arch.word_width().clamp(1, 64) as u8
}

/// One decode step: the mnemonics a single grammar invocation produced, the
/// address right after them, and the successor jumps (never empty — an
/// action that declares none gets a synthetic unconditional fallthrough).
struct Step {
    mnemonics: Vec<crate::mnemonic::Mnemonic>,
    next_addr: u64,
    jumps: Vec<Jump>,
}

/// Decode every address reachable from `start` by following constant jump
/// targets, stopping at addresses already `covered` by existing blocks of
/// this or another procedure, or past the end of `source`.
fn decode_steps(
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    counter: &mut TemporaryCounter,
    start: u64,
    covered: &impl Fn(u64) -> bool,
) -> Result<HashMap<u64, Step>> {
    let width = addr_width(arch);
    let mut steps: HashMap<u64, Step> = HashMap::new();
    let mut worklist = VecDeque::from([start]);
    while let Some(addr) = worklist.pop_front() {
        if steps.contains_key(&addr) || covered(addr) {
            continue;
        }
        if addr >= source.length() {
            // The implicit fallthrough of the last mnemonic in the source
            // runs off the end; there is simply no successor there, not a
            // decode error.
            continue;
        }
        let (state, consumed) = decode_one(arch, source, addr, counter)?;
        let next_addr = addr + consumed;
        let jumps = if state.jumps.is_empty() {
            vec![Jump {
                target: Value::constant(next_addr, width)?,
                guard: Guard::always(),
            }]
        } else {
            state.jumps
        };
        for j in &jumps {
            if let Some(c) = j.target.as_constant() {
                if !steps.contains_key(&c) && !covered(c) {
                    worklist.push_back(c);
                }
            }
        }
        steps.insert(
            addr,
            Step {
                mnemonics: state.mnemonics,
                next_addr,
                jumps,
            },
        );
    }
    Ok(steps)
}

/// A block's leaders are: `entry`; every jump target that is not a plain
/// single unconditional fallthrough; and every address targeted by more
/// than one step (a join point). Classic leader computation, specialised to
/// this module's `Jump` representation.
fn compute_leaders(steps: &HashMap<u64, Step>, entry: u64) -> HashSet<u64> {
    let mut leaders = HashSet::new();
    leaders.insert(entry);
    let mut incoming: HashMap<u64, usize> = HashMap::new();
    for step in steps.values() {
        for j in &step.jumps {
            if let Some(c) = j.target.as_constant() {
                *incoming.entry(c).or_insert(0) += 1;
                let plain =
                    step.jumps.len() == 1 && j.guard.is_always() && c == step.next_addr;
                if !plain {
                    leaders.insert(c);
                }
            }
        }
    }
    for (addr, count) in incoming {
        if count > 1 {
            leaders.insert(addr);
        }
    }
    leaders.retain(|a| steps.contains_key(a));
    leaders
}

/// A block built from a leader's chain of steps: the concatenated mnemonics
/// and the jumps of its final step (its only outgoing transfers).
#[derive(Clone)]
struct BuiltBlock {
    start: u64,
    mnemonics: Vec<crate::mnemonic::Mnemonic>,
    exit_jumps: Vec<Jump>,
}

/// Follow each leader's chain of plain-fallthrough steps to build its block.
fn build_blocks(steps: &HashMap<u64, Step>, leaders: &HashSet<u64>) -> Vec<BuiltBlock> {
    let mut starts: Vec<u64> = leaders.iter().copied().collect();
    starts.sort_unstable();
    let mut out = Vec::new();
    for start in starts {
        let mut addr = start;
        let mut mnemonics = Vec::new();
        let mut exit_jumps = Vec::new();
        loop {
            let step = match steps.get(&addr) {
                Some(s) => s,
                None => break,
            };
            mnemonics.extend(step.mnemonics.iter().cloned());
            exit_jumps = step.jumps.clone();
            let plain = step.jumps.len() == 1
                && step.jumps[0].guard.is_always()
                && step.jumps[0].target.as_constant() == Some(step.next_addr);
            let next = step.next_addr;
            if plain && steps.contains_key(&next) && !leaders.contains(&next) {
                addr = next;
                continue;
            }
            break;
        }
        if !mnemonics.is_empty() {
            out.push(BuiltBlock {
                start,
                mnemonics,
                exit_jumps,
            });
        }
    }
    out
}

/// Register `b` as a block of `proc`, splitting an existing block if `b`'s
/// start falls inside one, and recording the mapping in `block_of`.
fn register_block(
    proc: &mut Procedure,
    block_of: &mut HashMap<u64, BlockId>,
    b: &BuiltBlock,
) -> Result<()> {
    if block_of.contains_key(&b.start) {
        return Ok(());
    }
    if let Some(existing) = proc.block_at(b.start) {
        if proc.blocks.node(existing).unwrap().area().start == b.start {
            block_of.insert(b.start, existing);
        } else {
            let second = proc.split_block(existing, b.start)?;
            block_of.insert(b.start, second);
        }
        return Ok(());
    }
    let bb = BasicBlock::new(b.mnemonics.clone())?;
    let id = proc.add_block(bb);
    block_of.insert(b.start, id);
    Ok(())
}

/// Find or create the block starting exactly at `addr`, splitting an
/// existing block if `addr` falls in its interior.
fn resolve_block_at(
    proc: &mut Procedure,
    block_of: &mut HashMap<u64, BlockId>,
    addr: u64,
) -> Result<BlockId> {
    if let Some(&id) = block_of.get(&addr) {
        return Ok(id);
    }
    match proc.block_at(addr) {
        Some(existing) if proc.blocks.node(existing).unwrap().area().start == addr => {
            block_of.insert(addr, existing);
            Ok(existing)
        }
        Some(existing) => {
            let second = proc.split_block(existing, addr)?;
            block_of.insert(addr, second);
            Ok(second)
        }
        None => Err(Error::Structural { address: addr }),
    }
}

/// Add `b`'s outgoing edges: a real edge for every constant target that
/// lands inside `source`'s bounds, a [`Procedure::add_pending_transfer`] for
/// a symbolic (variable) target, and no edge at all for a constant target
/// past the end of the source (the final mnemonic's implicit fallthrough).
fn wire_edges_for(
    proc: &mut Procedure,
    block_of: &mut HashMap<u64, BlockId>,
    b: &BuiltBlock,
    width: u8,
    source: &dyn ByteSource,
) -> Result<()> {
    let from = block_of[&b.start];
    for j in &b.exit_jumps {
        match j.target.as_constant() {
            Some(c) => {
                if block_of.get(&c).is_none() && proc.block_at(c).is_none() && c >= source.length()
                {
                    continue;
                }
                let to = resolve_block_at(proc, block_of, c)?;
                proc.add_edge(
                    from,
                    to,
                    ControlTransfer {
                        guard: j.guard.clone(),
                        target: Value::constant(c, width)?,
                        resolved: Some(to),
                    },
                );
            }
            None => {
                proc.add_pending_transfer(
                    from,
                    ControlTransfer::guarded(j.guard.clone(), j.target.clone()),
                );
            }
        }
    }
    Ok(())
}

/// Build a fresh procedure named `name`, starting its local decode loop at
/// `entry`.
fn build_procedure(
    name: String,
    entry: u64,
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    counter: &mut TemporaryCounter,
) -> Result<(Procedure, HashMap<u64, BlockId>)> {
    let width = addr_width(arch);
    let steps = decode_steps(arch, source, counter, entry, &|_| false)?;
    let leaders = compute_leaders(&steps, entry);
    let mut built = build_blocks(&steps, &leaders);
    let entry_idx = built
        .iter()
        .position(|b| b.start == entry)
        .ok_or(Error::Decode { address: entry })?;
    let entry_built = built.remove(entry_idx);

    let entry_block = BasicBlock::new(entry_built.mnemonics.clone())?;
    let mut proc = Procedure::new(name, entry_block);
    let mut block_of: HashMap<u64, BlockId> = HashMap::new();
    block_of.insert(entry, proc.entry);

    for b in &built {
        register_block(&mut proc, &mut block_of, b)?;
    }
    wire_edges_for(&mut proc, &mut block_of, &entry_built, width, source)?;
    for b in &built {
        wire_edges_for(&mut proc, &mut block_of, b, width, source)?;
    }
    Ok((proc, block_of))
}

/// Extend an already-built procedure with the block at `target`, decoding
/// new mnemonics only where `target` is not already covered by an existing
/// block. Called when SSCP resolves a pending transfer to a new constant
/// target.
fn extend_procedure(
    proc: &mut Procedure,
    block_of: &mut HashMap<u64, BlockId>,
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    counter: &mut TemporaryCounter,
    target: u64,
) -> Result<BlockId> {
    let width = addr_width(arch);
    if block_of.contains_key(&target) || proc.block_at(target).is_some() {
        return resolve_block_at(proc, block_of, target);
    }
    let covered = |addr: u64| proc.block_at(addr).is_some();
    let steps = decode_steps(arch, source, counter, target, &covered)?;
    let leaders = compute_leaders(&steps, target);
    let built = build_blocks(&steps, &leaders);
    for b in &built {
        register_block(proc, block_of, b)?;
    }
    for b in &built {
        wire_edges_for(proc, block_of, b, width, source)?;
    }
    resolve_block_at(proc, block_of, target)
}

/// Strip every φ mnemonic and reset every variable's SSA subscript to
/// `None`, so `ssa::convert` can be re-run from scratch over a procedure
/// that has grown since the last pass.
fn reset_ssa_subscripts(proc: &mut Procedure) {
    fn reset_value(v: &mut Value) {
        match v {
            Value::Variable { subscript, .. } => *subscript = None,
            Value::Memory { offset, .. } => reset_value(offset),
            _ => {}
        }
    }

    let ids: Vec<BlockId> = proc.blocks.node_ids().collect();
    for id in &ids {
        let block = proc.blocks.node_mut(*id).unwrap();
        block.mnemonics.retain(|m| !m.is_internal_phis());
        for mnemonic in block.mnemonics.iter_mut() {
            for instr in mnemonic.instructions.iter_mut() {
                reset_value(&mut instr.assignee);
                for operand in instr.op.operands_mut() {
                    reset_value(operand);
                }
            }
        }
    }
    for id in &ids {
        for e in proc.blocks.out_edges(*id).to_vec() {
            let transfer = proc.blocks.edge_mut(e).unwrap();
            reset_value(&mut transfer.target);
            for rel in transfer.guard.relations.iter_mut() {
                reset_value(&mut rel.op1);
                reset_value(&mut rel.op2);
            }
        }
    }
    for (_, transfer) in proc.pending_transfers.iter_mut() {
        reset_value(&mut transfer.target);
        for rel in transfer.guard.relations.iter_mut() {
            reset_value(&mut rel.op1);
            reset_value(&mut rel.op2);
        }
    }
}

/// Run dominance, liveness, SSA and SSCP to a fixed point, promoting every
/// pending transfer SSCP resolves to a constant into a real edge and
/// decoding its target if needed. Returns the final pass's caches for the
/// driver to publish alongside the procedure.
fn run_dataflow(
    proc: &mut Procedure,
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    counter: &mut TemporaryCounter,
    block_of: &mut HashMap<u64, BlockId>,
    config: &DriverConfig,
) -> Result<crate::program::ProcedureCaches> {
    let width = addr_width(arch);
    for _ in 0..config.max_fixed_point_iterations {
        reset_ssa_subscripts(proc);
        let dom = dominance::dominance_tree(proc);
        let live = liveness::liveness(proc);
        ssa::convert(proc, &dom, &live)?;
        let lattice = sscp::propagate(proc);

        let resolved = proc.take_resolved_transfers(|v| lattice.resolve(v));
        if resolved.is_empty() {
            return Ok(crate::program::ProcedureCaches {
                dominance: Some(dom),
                liveness: Some(live),
                sscp: Some(lattice),
            });
        }
        for (from, transfer, constant) in resolved {
            let to = extend_procedure(proc, block_of, arch, source, counter, constant)?;
            proc.add_edge(
                from,
                to,
                ControlTransfer {
                    guard: transfer.guard,
                    target: Value::constant(constant, width)?,
                    resolved: Some(to),
                },
            );
        }
    }
    Err(Error::Analysis(format!(
        "dataflow fixed point not reached within {} iterations",
        config.max_fixed_point_iterations
    )))
}

/// Scan every instruction of `proc` for a `Call` to a constant target.
fn discover_calls(proc: &Procedure) -> Vec<u64> {
    let mut out = Vec::new();
    for id in proc.blocks.node_ids() {
        let block = proc.blocks.node(id).unwrap();
        for mnemonic in &block.mnemonics {
            for instr in &mnemonic.instructions {
                if let Operator::Call(target) = &instr.op {
                    if let Some(c) = target.as_constant() {
                        out.push(c);
                    }
                }
            }
        }
    }
    out
}

/// Decode and publish the procedure starting at `entry`, returning the
/// constant call targets it discovered (for the caller to enqueue), or
/// `None` if `entry` was already claimed by another procedure or decoding
/// failed in a way the driver treats as "abandon this procedure": decode,
/// structural and analysis errors are fatal to the current procedure only.
fn process_work_item(
    program: &Program,
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    entry: u64,
    config: &DriverConfig,
) -> Result<Option<Vec<u64>>> {
    let name = format!("sub_{:x}", entry);
    if !program.try_claim(entry, &name) {
        return Ok(None);
    }

    let mut counter = TemporaryCounter::new();
    let (mut proc, mut block_of) = match build_procedure(name.clone(), entry, arch, source, &mut counter) {
        Ok(built) => built,
        Err(err @ (Error::Decode { .. } | Error::Structural { .. })) => {
            tracing::warn!(procedure = %name, %err, "abandoning procedure");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let mut caches = crate::program::ProcedureCaches::default();
    if config.run_dataflow {
        match run_dataflow(&mut proc, arch, source, &mut counter, &mut block_of, config) {
            Ok(c) => caches = c,
            Err(err @ (Error::Decode { .. } | Error::Structural { .. } | Error::Analysis(_))) => {
                tracing::warn!(procedure = %name, %err, "abandoning procedure after analysis error");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }

    let callees: Vec<u64> = discover_calls(&proc)
        .into_iter()
        .filter(|&c| !program.is_claimed(c))
        .collect();
    for &callee in &callees {
        program.insert_call_edge(&name, format!("sub_{:x}", callee));
    }

    tracing::info!(procedure = %name, blocks = proc.blocks.node_count(), "procedure decoded");
    program.insert_procedure(proc);
    program.write_caches(&name, caches);
    Ok(Some(callees))
}

/// Disassemble `source` starting at `entry`, publishing every procedure and
/// call edge discovered into `program`.
///
/// Procedures are decoded in BFS rounds over the call graph, each round's
/// procedures processed concurrently on a worker pool sized by
/// `config.max_worklist_threads`: different procedures may be decoded in
/// parallel, but one procedure's local decode loop is sequential.
///
/// `progress(done, todo)` is called between rounds; returning `false`
/// cancels the run.
///
/// # Errors
/// Returns [`Error::Cancelled`] if `progress` requests cancellation, or
/// propagates a [`Error::Value`] (a programmer error in grammar
/// construction).
pub fn disassemble(
    program: &Program,
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    entry: u64,
    config: &DriverConfig,
    mut progress: impl FnMut(usize, usize) -> bool,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_worklist_threads.max(1))
        .build()
        .map_err(|e| Error::Analysis(format!("failed to start worklist pool: {}", e)))?;

    let mut frontier = vec![entry];
    let mut done_count = 0usize;

    while !frontier.is_empty() {
        if !progress(done_count, done_count + frontier.len()) {
            return Err(Error::Cancelled);
        }

        let results: Vec<Result<Option<Vec<u64>>>> = pool.install(|| {
            frontier
                .par_iter()
                .map(|&addr| process_work_item(program, arch, source, addr, config))
                .collect()
        });

        let mut next_frontier = Vec::new();
        for result in results {
            done_count += 1;
            if let Some(callees) = result? {
                next_frontier.extend(callees);
            }
        }
        next_frontier.sort_unstable();
        next_frontier.dedup();
        frontier = next_frontier;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::grammar::{Grammar, TokenExpression};
    use crate::mnemonic::Mnemonic;
    use crate::source::MemorySource;
    use crate::value::Endianness;
    use std::sync::Arc;

    struct TestArch;

    impl Architecture for TestArch {
        fn token_width(&self) -> u32 {
            16
        }
        fn token_endian(&self) -> Endianness {
            Endianness::Little
        }
        fn word_width(&self) -> u16 {
            16
        }
        fn registers(&self) -> Vec<String> {
            vec![]
        }
        fn width(&self, _name: &str) -> Option<u16> {
            None
        }
        fn grammar(&self) -> Grammar {
            // ret: 1001 0101 0000 1000, no jump (falls through, or ends the
            // source entirely, per test).
            let ret = TokenExpression::terminal("1001 0101 0000 1000", 16).unwrap();
            // jmp abs12: 1110 + a 12-bit capture, unconditional jump to the
            // byte address `2 * a` (word-addressed, AVR-style).
            let jmp = TokenExpression::terminal("1110 a@aaaaaaaaaaaa", 16).unwrap();
            // call abs12: 1111 + a 12-bit capture, call to `2 * a`, falls
            // through.
            let call = TokenExpression::terminal("1111 a@aaaaaaaaaaaa", 16).unwrap();

            Grammar::new()
                .rule(
                    ret,
                    Arc::new(|state, _builder| {
                        state.emit(Mnemonic::new(
                            state.address..state.address + 2,
                            "ret",
                            vec![],
                            vec![],
                            vec![],
                        )?);
                        Ok(())
                    }),
                )
                .rule(
                    jmp,
                    Arc::new(|state, _builder| {
                        let target = state.capture("a") * 2;
                        state.emit(Mnemonic::new(
                            state.address..state.address + 2,
                            "jmp",
                            vec![],
                            vec![],
                            vec![],
                        )?);
                        state.jump(Value::constant(target, 16)?);
                        Ok(())
                    }),
                )
                .rule(
                    call,
                    Arc::new(|state, builder| {
                        let target = Value::constant(state.capture("a") * 2, 16)?;
                        let instr = builder.call(None, target, 16)?;
                        let instrs = builder.take_instructions();
                        let _ = instr;
                        state.emit(Mnemonic::new(
                            state.address..state.address + 2,
                            "call",
                            vec![],
                            vec![],
                            instrs,
                        )?);
                        Ok(())
                    }),
                )
        }
    }

    #[test]
    fn single_instruction_procedure_has_no_edges() {
        let arch = TestArch;
        let source = MemorySource::new(vec![0x08, 0x95]);
        let config = DriverConfig {
            max_worklist_threads: 1,
            run_dataflow: true,
            max_fixed_point_iterations: 8,
        };
        let mut counter = TemporaryCounter::new();
        let (proc, _) = build_procedure("sub_0".into(), 0, &arch, &source, &mut counter).unwrap();
        assert_eq!(proc.blocks.node_count(), 1);
        assert_eq!(proc.blocks.out_edges(proc.entry).len(), 0);
        let _ = config;
    }

    #[test]
    fn self_jump_produces_loop_edge() {
        // jmp 0x0 as the only instruction: bytes for "1110 0000 0000 0000".
        let arch = TestArch;
        let source = MemorySource::new(vec![0x00, 0xe0]);
        let mut counter = TemporaryCounter::new();
        let (proc, _) = build_procedure("sub_0".into(), 0, &arch, &source, &mut counter).unwrap();
        assert_eq!(proc.blocks.node_count(), 1);
        let succs: Vec<_> = proc.blocks.successors(proc.entry).collect();
        assert_eq!(succs, vec![proc.entry]);
    }

    #[test]
    fn call_discovery_enqueues_second_procedure() {
        // sub_0: call 0x10 (a=8), then jmp $ (a=1, self-loop) — a clean
        // two-block procedure that never reaches past address 4.
        // sub_10: a lone ret at 0x10, at the very end of the source, so its
        // implicit fallthrough falls off the end rather than overlapping
        // sub_0.
        let mut bytes = vec![0x08, 0xf0, 0x01, 0xe0];
        bytes.extend(std::iter::repeat(0u8).take(12));
        bytes.extend_from_slice(&[0x08, 0x95]);
        let arch = TestArch;
        let source = MemorySource::new(bytes);
        let program = Program::new("prog");
        let config = DriverConfig {
            max_worklist_threads: 1,
            run_dataflow: true,
            max_fixed_point_iterations: 8,
        };
        disassemble(&program, &arch, &source, 0, &config, |_, _| true).unwrap();
        assert_eq!(program.procedure_count(), 2);
        assert_eq!(program.call_edges().len(), 1);
    }
}
