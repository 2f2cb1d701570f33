//! A small AVR-flavoured test architecture: just enough of a word-addressed,
//! 16-bit-token instruction set to exercise the driver and dataflow passes
//! end to end, without pulling in a real opcode table.
//!
//! Every instruction is exactly one 16-bit token; the leading nibble alone
//! selects the rule, so the grammar never has to break a tie.
//!
//! | opcode | encoding                  | effect                                   |
//! |--------|---------------------------|-------------------------------------------|
//! | `nop`  | `0000 0000 0000 0000`     | no effect, falls through                  |
//! | `ldi`  | `0001 i@iiiiiiiiiiii`     | `v0 := i` (12-bit immediate)               |
//! | `jsr`  | `0010 0000 0000 0000`     | jump to the value of `v0`                 |
//! | `beq`  | `0011 a@aaaaaaaaaaaa`     | jump to `2*a` if `v0 == 0`, else fall through |
//! | `use`  | `0100 0000 0000 0000`     | `v1 := v0`                                 |
//! | `rjmp` | `1100 o@oooooooooooo`     | jump to `address + 2 + 2 * sext12(o)`      |
//! | `jmp`  | `1110 a@aaaaaaaaaaaa`     | jump to `2*a`                              |
//! | `call` | `1111 a@aaaaaaaaaaaa`     | call `2*a`, falls through                  |
//! | `ret`  | `1001 0101 0000 1000`     | no jump (ends the procedure)               |

use std::sync::Arc;

use panopticon::prelude::*;

fn sext12(bits: u64) -> i64 {
    if bits & 0x800 != 0 {
        bits as i64 - 0x1000
    } else {
        bits as i64
    }
}

pub struct ToyAvr;

impl Architecture for ToyAvr {
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
        vec!["v0".to_string(), "v1".to_string()]
    }

    fn width(&self, name: &str) -> Option<u16> {
        match name {
            "v0" | "v1" => Some(16),
            _ => None,
        }
    }

    fn grammar(&self) -> Grammar {
        let nop = TokenExpression::terminal("0000 0000 0000 0000", 16).unwrap();
        let ldi = TokenExpression::terminal("0001 i@iiiiiiiiiiii", 16).unwrap();
        let jsr = TokenExpression::terminal("0010 0000 0000 0000", 16).unwrap();
        let beq = TokenExpression::terminal("0011 a@aaaaaaaaaaaa", 16).unwrap();
        let use_ = TokenExpression::terminal("0100 0000 0000 0000", 16).unwrap();
        let rjmp = TokenExpression::terminal("1100 o@oooooooooooo", 16).unwrap();
        let jmp = TokenExpression::terminal("1110 a@aaaaaaaaaaaa", 16).unwrap();
        let call = TokenExpression::terminal("1111 a@aaaaaaaaaaaa", 16).unwrap();
        let ret = TokenExpression::terminal("1001 0101 0000 1000", 16).unwrap();

        Grammar::new()
            .rule(
                nop,
                Arc::new(|state, _builder| {
                    state.emit(Mnemonic::new(state.address..state.address + 2, "nop", vec![], vec![], vec![])?);
                    Ok(())
                }),
            )
            .rule(
                ldi,
                Arc::new(|state, builder| {
                    let imm = state.capture("i");
                    let v0 = Value::variable("v0", 16)?;
                    let c = Value::constant(imm, 16)?;
                    builder.lift(Some(v0), c, 16)?;
                    let instrs = builder.take_instructions();
                    state.emit(Mnemonic::new(state.address..state.address + 2, "ldi", vec![], vec![], instrs)?);
                    Ok(())
                }),
            )
            .rule(
                jsr,
                Arc::new(|state, _builder| {
                    state.emit(Mnemonic::new(state.address..state.address + 2, "jsr", vec![], vec![], vec![])?);
                    let v0 = Value::variable("v0", 16)?;
                    state.jump(v0);
                    Ok(())
                }),
            )
            .rule(
                beq,
                Arc::new(|state, _builder| {
                    let target = Value::constant(state.capture("a") * 2, 16)?;
                    let next = Value::constant(state.address + 2, 16)?;
                    state.emit(Mnemonic::new(state.address..state.address + 2, "beq", vec![], vec![], vec![])?);
                    let guard = Guard::single(Relation {
                        op1: Value::variable("v0", 16)?,
                        relcode: RelCode::Eq,
                        op2: Value::constant(0, 16)?,
                    });
                    state.jump_if(target, guard);
                    state.jump(next);
                    Ok(())
                }),
            )
            .rule(
                use_,
                Arc::new(|state, builder| {
                    let v0 = Value::variable("v0", 16)?;
                    let v1 = Value::variable("v1", 16)?;
                    builder.lift(Some(v1), v0, 16)?;
                    let instrs = builder.take_instructions();
                    state.emit(Mnemonic::new(state.address..state.address + 2, "use", vec![], vec![], instrs)?);
                    Ok(())
                }),
            )
            .rule(
                rjmp,
                Arc::new(|state, _builder| {
                    let offset = sext12(state.capture("o"));
                    let target = (state.address as i64 + 2 + 2 * offset) as u64;
                    state.emit(Mnemonic::new(state.address..state.address + 2, "rjmp", vec![], vec![], vec![])?);
                    state.jump(Value::constant(target, 16)?);
                    Ok(())
                }),
            )
            .rule(
                jmp,
                Arc::new(|state, _builder| {
                    let target = state.capture("a") * 2;
                    state.emit(Mnemonic::new(state.address..state.address + 2, "jmp", vec![], vec![], vec![])?);
                    state.jump(Value::constant(target, 16)?);
                    Ok(())
                }),
            )
            .rule(
                call,
                Arc::new(|state, builder| {
                    let target = Value::constant(state.capture("a") * 2, 16)?;
                    builder.call(None, target, 16)?;
                    let instrs = builder.take_instructions();
                    state.emit(Mnemonic::new(state.address..state.address + 2, "call", vec![], vec![], instrs)?);
                    Ok(())
                }),
            )
            .rule(
                ret,
                Arc::new(|state, _builder| {
                    state.emit(Mnemonic::new(state.address..state.address + 2, "ret", vec![], vec![], vec![])?);
                    Ok(())
                }),
            )
    }
}
