//! Crate-wide error type.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error variants produced by the region, disassembler, procedure and
/// dataflow machinery.
///
/// Each variant corresponds to one of the error kinds in the design: decode
/// failures abandon the current procedure, structural and analysis failures
/// are fatal to it, value errors are reported at construction time, and
/// cancellation unwinds the driver with whatever was already assembled.
#[derive(Debug, Error)]
pub enum Error {
    /// No rule in the grammar matched at `address`, and the grammar has no
    /// default rule.
    #[error("no rule matched at address {address:#x}")]
    Decode {
        /// Address at which decoding stalled.
        address: u64,
    },

    /// A jump target landed inside an existing mnemonic instead of on one of
    /// its boundaries.
    #[error("jump target {address:#x} misaligned with an existing mnemonic")]
    Structural {
        /// The offending target address.
        address: u64,
    },

    /// A dataflow invariant was violated: SSA renaming found a use with no
    /// dominating definition.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// A `Value` could not be constructed: an over-long variable name, an
    /// out-of-range width, or a zero-byte memory reference.
    #[error("invalid value: {0}")]
    Value(String),

    /// The driver observed a cancellation request between work items.
    #[error("disassembly cancelled")]
    Cancelled,

    /// A region or layer operation was out of bounds or otherwise malformed.
    #[error("region error: {0}")]
    Region(String),
}
