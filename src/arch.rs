//! The architecture collaborator: token shape, register metadata, and the
//! grammar driving decode for one instruction set.

use crate::disasm::grammar::Grammar;
use crate::error::Result;
use crate::value::{Endianness, Value};

/// Everything the core disassembly driver needs to know about one
/// architecture. Implementations typically hold no state beyond what is
/// needed to build the grammar once (e.g. a register table); the driver
/// clones the `Grammar` it returns into each decode session.
pub trait Architecture: Send + Sync {
    /// Width, in bits, of one token the grammar matches against (8 for
    /// AMD64, 16 for AVR).
    fn token_width(&self) -> u32;

    /// Byte order used to assemble consecutive bytes of the source into one
    /// token, when `token_width` exceeds 8.
    fn token_endian(&self) -> Endianness;

    /// The word width of this architecture, used to size temporaries minted
    /// without an explicit destination.
    fn word_width(&self) -> u16;

    /// The architectural register names.
    fn registers(&self) -> Vec<String>;

    /// The bit width of `name`, if it names a register of this
    /// architecture.
    fn width(&self, name: &str) -> Option<u16>;

    /// Mint a fresh temporary variable of this architecture's word width.
    /// The default forwards to [`crate::disasm::builder::TemporaryCounter`]
    /// conventions; architectures needing a different naming scheme may
    /// override it, though none in this crate do.
    fn temporary(&self, counter: &mut crate::disasm::builder::TemporaryCounter) -> Result<Value> {
        counter.fresh(self.word_width())
    }

    /// Build this architecture's grammar.
    fn grammar(&self) -> Grammar;
}
