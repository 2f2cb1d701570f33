//! IL operators.
//!
//! Every operator variant carries only its operands; the symbol × domain ×
//! codomain distinction the original implementation expressed as distinct
//! template instantiations is, here, just the enum discriminant. Arity is
//! enforced in [`Instruction::new`](crate::instruction::Instruction::new),
//! not in the type system.

use crate::value::Value;

/// A single IL operator together with its operands.
///
/// Operators fall into three domains: logical (`And`/`Or`/`Not`/`Impl`/
/// `Equiv`), integer (`IntAnd`.. through `IntEqual`), and universal
/// (`Lift`, `Call`, `Phi`, `Nop`) which are untyped with respect to domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    // --- logical, binary ---
    /// Logical conjunction.
    And(Value, Value),
    /// Logical disjunction.
    Or(Value, Value),
    /// Logical implication.
    Impl(Value, Value),
    /// Logical equivalence.
    Equiv(Value, Value),
    // --- logical, unary ---
    /// Logical negation.
    Not(Value),

    // --- integer, binary ---
    /// Bitwise AND.
    IntAnd(Value, Value),
    /// Bitwise OR.
    IntOr(Value, Value),
    /// Bitwise XOR.
    IntXor(Value, Value),
    /// Integer addition.
    IntAdd(Value, Value),
    /// Integer subtraction.
    IntSub(Value, Value),
    /// Integer multiplication.
    IntMul(Value, Value),
    /// Integer division.
    IntDiv(Value, Value),
    /// Integer modulo.
    IntMod(Value, Value),
    /// Unsigned-less-than comparison, yields a one-bit value.
    IntLess(Value, Value),
    /// Equality comparison, yields a one-bit value.
    IntEqual(Value, Value),

    // --- universal ---
    /// Lift an architecture-specific raw value into the IL unchanged.
    Lift(Value),
    /// A procedure call to the (possibly symbolic) target.
    Call(Value),
    /// SSA φ-node: one operand per incoming control-flow edge.
    Phi(Vec<Value>),
    /// No operation.
    Nop,
}

impl Operator {
    /// The operands of this operator, in order.
    pub fn operands(&self) -> Vec<&Value> {
        use Operator::*;
        match self {
            And(a, b) | Or(a, b) | Impl(a, b) | Equiv(a, b) | IntAnd(a, b) | IntOr(a, b)
            | IntXor(a, b) | IntAdd(a, b) | IntSub(a, b) | IntMul(a, b) | IntDiv(a, b)
            | IntMod(a, b) | IntLess(a, b) | IntEqual(a, b) => vec![a, b],
            Not(a) | Lift(a) | Call(a) => vec![a],
            Phi(args) => args.iter().collect(),
            Nop => vec![],
        }
    }

    /// Mutable access to the operands, used by the SSA renamer.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        use Operator::*;
        match self {
            And(a, b) | Or(a, b) | Impl(a, b) | Equiv(a, b) | IntAnd(a, b) | IntOr(a, b)
            | IntXor(a, b) | IntAdd(a, b) | IntSub(a, b) | IntMul(a, b) | IntDiv(a, b)
            | IntMod(a, b) | IntLess(a, b) | IntEqual(a, b) => vec![a, b],
            Not(a) | Lift(a) | Call(a) => vec![a],
            Phi(args) => args.iter_mut().collect(),
            Nop => vec![],
        }
    }

    /// Short mnemonic-style symbol for this operator, used in `Display`
    /// impls and trace logging.
    pub fn symbol(&self) -> &'static str {
        use Operator::*;
        match self {
            And(..) => "and",
            Or(..) => "or",
            Impl(..) => "impl",
            Equiv(..) => "equiv",
            Not(..) => "not",
            IntAnd(..) => "int-and",
            IntOr(..) => "int-or",
            IntXor(..) => "int-xor",
            IntAdd(..) => "int-add",
            IntSub(..) => "int-sub",
            IntMul(..) => "int-mul",
            IntDiv(..) => "int-div",
            IntMod(..) => "int-mod",
            IntLess(..) => "int-less",
            IntEqual(..) => "int-equal",
            Lift(..) => "lift",
            Call(..) => "call",
            Phi(..) => "phi",
            Nop => "nop",
        }
    }

    /// `true` for the universal φ operator.
    pub fn is_phi(&self) -> bool {
        matches!(self, Operator::Phi(_))
    }
}
