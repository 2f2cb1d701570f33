//! The recursive-descent disassembler: bit-pattern grammars matched against
//! tokens read from a [`crate::source::ByteSource`], driving semantic
//! actions that emit mnemonics and declare jump successors.

pub mod builder;
pub mod grammar;
pub mod state;
pub mod token;

use crate::arch::Architecture;
use crate::disasm::builder::{Builder, TemporaryCounter};
use crate::disasm::state::DecodeState;
use crate::error::{Error, Result};
use crate::source::ByteSource;
use crate::value::Endianness;

/// Read up to `count` tokens of `width_bits` starting at byte `address` from
/// `source`, stopping early if the source runs out of bytes. Multi-byte
/// tokens are assembled according to `endian`.
fn read_tokens(
    source: &dyn ByteSource,
    address: u64,
    width_bits: u32,
    endian: Endianness,
    count: usize,
) -> Result<Vec<u64>> {
    let token_bytes = (width_bits / 8).max(1) as u64;
    let mut tokens = Vec::with_capacity(count);
    for i in 0..count as u64 {
        let start = address + i * token_bytes;
        if start + token_bytes > source.length() {
            break;
        }
        let bytes = source.read(start, token_bytes)?;
        let mut value = 0u64;
        match endian {
            Endianness::Big => {
                for b in &bytes {
                    value = (value << 8) | (*b as u64);
                }
            }
            Endianness::Little => {
                for b in bytes.iter().rev() {
                    value = (value << 8) | (*b as u64);
                }
            }
        }
        tokens.push(value);
    }
    Ok(tokens)
}

/// Run one decode step of `arch`'s grammar at `address` of `source`.
///
/// Returns the resulting [`DecodeState`] (its mnemonics and declared jumps)
/// and the number of bytes consumed, so the caller can advance to the next
/// address.
///
/// # Errors
/// Returns [`Error::Decode`] if no rule matches and the grammar has no
/// default rule.
pub fn decode_one(
    arch: &dyn Architecture,
    source: &dyn ByteSource,
    address: u64,
    counter: &mut TemporaryCounter,
) -> Result<(DecodeState, u64)> {
    let grammar = arch.grammar();
    let width_bits = arch.token_width();
    let endian = arch.token_endian();
    let lookahead = grammar.max_lookahead();
    let tokens = read_tokens(source, address, width_bits, endian, lookahead)?;

    let token_bytes = (width_bits / 8).max(1) as u64;
    let (consumed_tokens, captures, action) = match grammar.match_top(&tokens) {
        Some((consumed, captures, idx)) => (consumed, captures, grammar.action_at(idx).clone()),
        None if !tokens.is_empty() => match grammar.default_action() {
            Some(action) => (1, Default::default(), action.clone()),
            None => return Err(Error::Decode { address }),
        },
        None => return Err(Error::Decode { address }),
    };

    let mut state = DecodeState::new(address, captures);
    let mut builder = Builder::new(counter);
    action(&mut state, &mut builder)?;

    let consumed_bytes = consumed_tokens as u64 * token_bytes;
    Ok((state, consumed_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::grammar::{Grammar, TokenExpression};
    use crate::mnemonic::Mnemonic;
    use crate::source::MemorySource;
    use std::sync::Arc;

    struct ToyArch;

    impl Architecture for ToyArch {
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
            let ret = TokenExpression::terminal("1001 0101 0000 1000", 16).unwrap();
            Grammar::new().rule(
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
        }
    }

    #[test]
    fn decodes_single_instruction() {
        let arch = ToyArch;
        let source = MemorySource::new(vec![0x08, 0x95]);
        let mut counter = TemporaryCounter::new();
        let (state, consumed) = decode_one(&arch, &source, 0, &mut counter).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(state.mnemonics.len(), 1);
        assert_eq!(state.mnemonics[0].opcode, "ret");
    }

    #[test]
    fn no_match_no_default_is_decode_error() {
        let arch = ToyArch;
        let source = MemorySource::new(vec![0x00, 0x00]);
        let mut counter = TemporaryCounter::new();
        assert!(decode_one(&arch, &source, 0, &mut counter).is_err());
    }
}
