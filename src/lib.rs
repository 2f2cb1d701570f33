//! Panopticon: program structure recovery over a layered byte model.
//!
//! Given a byte source and an architecture's decode grammar, the driver
//! (`driver::disassemble`) discovers procedures by recursive descent,
//! assembles their basic-block graphs, and runs the dataflow suite
//! (dominance, liveness, SSA, sparse conditional constant propagation) to
//! resolve as many indirect control transfers as the lattice allows. The
//! result is a [`program::Program`]: a set of procedures and the call edges
//! between them.
#![warn(missing_docs)]
#![deny(unused_must_use)]

pub mod arch;
pub mod block;
pub mod dataflow;
pub mod disasm;
pub mod driver;
pub mod error;
pub mod graph;
pub mod instruction;
pub mod mnemonic;
pub mod operator;
pub mod procedure;
pub mod program;
pub mod region;
pub mod source;
pub mod value;

pub mod prelude {
    //! Commonly used types, re-exported for convenient `use panopticon::prelude::*`.

    pub use crate::arch::Architecture;
    pub use crate::block::{BasicBlock, BlockId, ControlTransfer, Guard, RelCode, Relation};
    pub use crate::dataflow::dominance::{self, Dominance};
    pub use crate::dataflow::liveness::{self, Liveness};
    pub use crate::dataflow::ssa;
    pub use crate::dataflow::sscp::{self, Lattice, Sscp};
    pub use crate::disasm::builder::{Builder, TemporaryCounter};
    pub use crate::disasm::grammar::{Grammar, TokenExpression};
    pub use crate::disasm::state::{DecodeState, Jump};
    pub use crate::disasm::{decode_one, token};
    pub use crate::driver::{disassemble, DriverConfig};
    pub use crate::error::{Error, Result};
    pub use crate::graph::{EdgeId, IndexedGraph, NodeId};
    pub use crate::instruction::Instruction;
    pub use crate::mnemonic::{FormatToken, Mnemonic};
    pub use crate::operator::Operator;
    pub use crate::procedure::Procedure;
    pub use crate::program::{Program, ProcedureCaches};
    pub use crate::region::{Bound, Layer, ProjectedInterval, Region, RegionGraph};
    pub use crate::source::{ByteSource, MemorySource};
    pub use crate::value::{Endianness, Value};
}
