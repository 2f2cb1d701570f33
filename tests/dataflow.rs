//! End-to-end dataflow scenarios: resolving an indirect jump through SSCP,
//! and inserting a phi node at a diamond join.

mod support;

use panopticon::prelude::*;
use support::toy_avr::ToyAvr;

fn config() -> DriverConfig {
    DriverConfig {
        max_worklist_threads: 1,
        run_dataflow: true,
        max_fixed_point_iterations: 8,
    }
}

#[test]
fn sscp_resolves_an_indirect_jump_through_a_loaded_constant() {
    // 0: ldi v0, 0x20
    // 2: jsr v0            (indirect jump; the target isn't known until
    //                        constant propagation runs)
    // 4..32: unreached padding
    // 32: ret, whose own fallthrough (34) lands exactly at the end of the
    //     source, so nothing is decoded past it.
    let mut bytes = vec![0x20, 0x10, 0x00, 0x20];
    bytes.resize(32, 0);
    bytes.extend_from_slice(&[0x08, 0x95]);
    assert_eq!(bytes.len(), 34);

    let source = MemorySource::new(bytes);
    let program = Program::new("prog");
    disassemble(&program, &ToyAvr, &source, 0, &config(), |_, _| true).unwrap();

    assert_eq!(program.procedure_count(), 1);
    program
        .with_procedure("sub_0", |proc| {
            assert_eq!(proc.blocks.node_count(), 2, "the jsr's target should have been decoded as a new block");
            assert!(proc.pending_transfers.is_empty(), "the indirect jump must have resolved to a real edge");

            let target = proc
                .blocks
                .successors(proc.entry)
                .next()
                .expect("the resolved jump is now a real edge out of the entry block");
            let block = proc.blocks.node(target).unwrap();
            assert_eq!(block.mnemonics.first().unwrap().opcode, "ret");
        })
        .unwrap();
}

#[test]
fn diamond_branch_inserts_a_phi_at_the_join() {
    // 0:  ldi v0, 0
    // 2:  beq 0x10          (taken if v0 == 0, else falls through to 4)
    // 4:  ldi v0, 7         (else branch)
    // 6:  jmp 0x18          (else branch joins at 24)
    // 8..16: unreached padding
    // 16: ldi v0, 5         (then branch, reached via the beq)
    // 18: jmp 0x18          (then branch joins at 24)
    // 20..24: unreached padding
    // 24: use               (v1 := v0, reading whichever definition reached here)
    // 26: ret
    let mut bytes = vec![
        0x00, 0x10, // ldi v0, 0 @0
        0x08, 0x30, // beq 0x10 @2
        0x07, 0x10, // ldi v0, 7 @4
        0x0c, 0xe0, // jmp 0x18 @6
    ];
    bytes.resize(16, 0);
    bytes.extend_from_slice(&[
        0x05, 0x10, // ldi v0, 5 @16
        0x0c, 0xe0, // jmp 0x18 @18
    ]);
    bytes.resize(24, 0);
    bytes.extend_from_slice(&[
        0x00, 0x40, // use @24
        0x08, 0x95, // ret @26
    ]);
    assert_eq!(bytes.len(), 28);

    let source = MemorySource::new(bytes);
    let program = Program::new("prog");
    disassemble(&program, &ToyAvr, &source, 0, &config(), |_, _| true).unwrap();

    assert_eq!(program.procedure_count(), 1);
    program
        .with_procedure("sub_0", |proc| {
            assert_eq!(proc.blocks.node_count(), 4, "entry, then, else, join");

            let join = proc
                .blocks
                .node_ids()
                .find(|&id| proc.blocks.predecessors(id).count() == 2)
                .expect("the join block has both the then- and else-branch as predecessors");

            let block = proc.blocks.node(join).unwrap();
            let phi = block.mnemonics.first().unwrap();
            assert!(phi.is_internal_phis(), "SSA construction should have prepended a phi mnemonic to the join block");
            assert_eq!(phi.instructions.len(), 1, "only v0 is redefined on both incoming paths");
            match &phi.instructions[0].op {
                Operator::Phi(args) => assert_eq!(args.len(), 2, "one phi operand per predecessor"),
                other => panic!("expected a phi operator, got {:?}", other),
            }
        })
        .unwrap();

    program
        .with_caches("sub_0", |caches| {
            assert!(caches.dominance.is_some());
            assert!(caches.liveness.is_some());
            assert!(caches.sscp.is_some());
        })
        .unwrap();
}
