//! Per-decode-step state shared across a rule's semantic action: the
//! captures a match produced, the mnemonics emitted so far this step, and
//! the jump declarations collected for the driver.

use std::collections::HashMap;

use crate::block::Guard;
use crate::mnemonic::Mnemonic;
use crate::value::Value;

/// A declared successor of the current decode step, as built by
/// [`DecodeState::jump`] or [`DecodeState::jump_if`].
#[derive(Debug, Clone)]
pub struct Jump {
    /// The jump's target, often a constant computed from a capture but
    /// possibly a variable (e.g. an indirect jump through a register).
    pub target: Value,
    /// Condition under which this jump is taken; `Guard::always()` for an
    /// unconditional jump.
    pub guard: Guard,
}

/// State threaded through one invocation of the grammar at one address: the
/// bit captures from the matched pattern, plus whatever the semantic action
/// accumulates.
pub struct DecodeState {
    /// Address of the first token this decode step consumed.
    pub address: u64,
    /// Bit captures from the pattern match, by group name.
    pub captures: HashMap<String, u64>,
    /// Mnemonics emitted by the action so far (normally exactly one).
    pub mnemonics: Vec<Mnemonic>,
    /// Jumps declared by the action. Empty means "implicit fall-through to
    /// the address just after the consumed tokens".
    pub jumps: Vec<Jump>,
}

impl DecodeState {
    /// A fresh state for a decode step starting at `address` with the given
    /// captures.
    pub fn new(address: u64, captures: HashMap<String, u64>) -> DecodeState {
        DecodeState {
            address,
            captures,
            mnemonics: Vec::new(),
            jumps: Vec::new(),
        }
    }

    /// Read a capture group, or `0` if the pattern did not declare it (a
    /// rule with no captures at all is common, e.g. `ret`).
    pub fn capture(&self, name: &str) -> u64 {
        self.captures.get(name).copied().unwrap_or(0)
    }

    /// Record an emitted mnemonic.
    pub fn emit(&mut self, mnemonic: Mnemonic) {
        self.mnemonics.push(mnemonic);
    }

    /// Declare an unconditional jump to `target`.
    pub fn jump(&mut self, target: Value) {
        self.jumps.push(Jump {
            target,
            guard: Guard::always(),
        });
    }

    /// Declare a guarded jump to `target`.
    pub fn jump_if(&mut self, target: Value, guard: Guard) {
        self.jumps.push(Jump { target, guard });
    }
}
