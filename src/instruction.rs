//! A single IL assignment `dst := f(args…)`.

use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::value::Value;

/// One assignment in the IL: `assignee := op(operands…)`.
///
/// `operands` is exactly `op.operands()`; it is not stored twice, it is
/// exposed here as a read view since the design calls out `operands` as a
/// named field of `Instruction`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// The value being defined. Must be a [`Value::Variable`] or
    /// [`Value::Memory`].
    pub assignee: Value,
    /// The operator computing the assigned value.
    pub op: Operator,
}

impl Instruction {
    /// Construct an instruction, checking that `assignee` is a well-formed
    /// lvalue (a variable or a memory reference, never a constant or
    /// `Undefined`).
    ///
    /// # Errors
    /// Returns [`Error::Value`] if `assignee` is not a variable or memory
    /// reference.
    pub fn new(assignee: Value, op: Operator) -> Result<Instruction> {
        match &assignee {
            Value::Variable { .. } | Value::Memory { .. } => Ok(Instruction { assignee, op }),
            other => Err(Error::Value(format!(
                "instruction assignee must be a variable or memory reference, got {:?}",
                other
            ))),
        }
    }

    /// The operator's operands, in order.
    pub fn operands(&self) -> Vec<&Value> {
        self.op.operands()
    }

    /// Mutable access to the operator's operands.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        self.op.operands_mut()
    }

    /// `true` if this instruction is a synthetic φ-assignment.
    pub fn is_phi(&self) -> bool {
        self.op.is_phi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_constant_assignee() {
        let c = Value::constant(1, 8).unwrap();
        let op = Operator::Nop;
        assert!(Instruction::new(c, op).is_err());
    }

    #[test]
    fn accepts_variable_assignee() {
        let v = Value::variable("r0", 32).unwrap();
        let a = Value::constant(1, 32).unwrap();
        let b = Value::constant(2, 32).unwrap();
        let instr = Instruction::new(v, Operator::IntAdd(a, b)).unwrap();
        assert_eq!(instr.operands().len(), 2);
    }
}
