//! Simple sparse constant propagation: a three-point lattice over SSA
//! variable values, used by the driver to resolve indirect jump targets.

use std::collections::HashMap;

use crate::operator::Operator;
use crate::procedure::Procedure;
use crate::value::Value;

/// One point of the constant-propagation lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lattice {
    /// No information yet (the weakest element; `meet(Bottom, x) == x`).
    Bottom,
    /// Exactly one constant value has been observed.
    Const(u64),
    /// Two different constants (or an inherently unknown source, such as a
    /// memory load or a call result) have been observed; the value may be
    /// anything.
    Top,
}

/// Meet two lattice points: `⊥ ⊓ x = x`, `Const(c) ⊓ Const(c) = Const(c)`,
/// anything else meets to `Top`.
pub fn meet(a: Lattice, b: Lattice) -> Lattice {
    match (a, b) {
        (Lattice::Bottom, x) | (x, Lattice::Bottom) => x,
        (Lattice::Const(x), Lattice::Const(y)) if x == y => Lattice::Const(x),
        _ => Lattice::Top,
    }
}

/// The result of a constant-propagation pass over one procedure: a lattice
/// point for every SSA variable (name, subscript) the pass observed.
#[derive(Debug, Clone, Default)]
pub struct Sscp {
    values: HashMap<(String, u32), Lattice>,
}

impl Sscp {
    fn get(&self, name: &str, subscript: Option<u32>) -> Lattice {
        match subscript {
            Some(s) => self
                .values
                .get(&(name.to_string(), s))
                .copied()
                .unwrap_or(Lattice::Bottom),
            None => Lattice::Top,
        }
    }

    fn operand_lattice(&self, v: &Value) -> Lattice {
        match v {
            Value::Constant { content, .. } => Lattice::Const(*content),
            Value::Undefined => Lattice::Bottom,
            Value::Variable { name, subscript, .. } => self.get(name, *subscript),
            Value::Memory { .. } => Lattice::Top,
        }
    }

    /// The constant `value` resolves to, if any: a literal constant
    /// resolves to itself; an SSA variable resolves only if its lattice
    /// point is `Const`; anything else (including `Top`/`Bottom`) yields
    /// `None`.
    pub fn resolve(&self, value: &Value) -> Option<u64> {
        match value {
            Value::Constant { content, .. } => Some(*content),
            Value::Variable { name, subscript, .. } => match self.get(name, *subscript) {
                Lattice::Const(c) => Some(c),
                _ => None,
            },
            _ => None,
        }
    }
}

fn truncate(content: u64, width: u16) -> u64 {
    if width == 0 || width >= 64 {
        content
    } else {
        content & ((1u64 << width) - 1)
    }
}

fn eval_binary(a: Lattice, b: Lattice, f: impl Fn(u64, u64) -> Option<u64>) -> Lattice {
    match (a, b) {
        (Lattice::Const(x), Lattice::Const(y)) => match f(x, y) {
            Some(v) => Lattice::Const(v),
            None => Lattice::Top,
        },
        (Lattice::Bottom, Lattice::Bottom) => Lattice::Bottom,
        (Lattice::Top, _) | (_, Lattice::Top) => Lattice::Top,
        _ => Lattice::Bottom,
    }
}

fn eval(op: &Operator, sscp: &Sscp) -> Lattice {
    use Operator::*;
    match op {
        Phi(args) => args
            .iter()
            .map(|a| sscp.operand_lattice(a))
            .fold(Lattice::Bottom, meet),
        Nop | Call(_) => Lattice::Top,
        Lift(a) => sscp.operand_lattice(a),
        Not(a) => match sscp.operand_lattice(a) {
            Lattice::Const(x) => Lattice::Const((x == 0) as u64),
            Lattice::Bottom => Lattice::Bottom,
            Lattice::Top => Lattice::Top,
        },
        And(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some(((x != 0) && (y != 0)) as u64)
        }),
        Or(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some(((x != 0) || (y != 0)) as u64)
        }),
        Impl(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some((!(x != 0) || (y != 0)) as u64)
        }),
        Equiv(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some(((x != 0) == (y != 0)) as u64)
        }),
        IntAnd(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| Some(x & y)),
        IntOr(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| Some(x | y)),
        IntXor(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| Some(x ^ y)),
        IntAdd(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some(x.wrapping_add(y))
        }),
        IntSub(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some(x.wrapping_sub(y))
        }),
        IntMul(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some(x.wrapping_mul(y))
        }),
        IntDiv(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            if y == 0 {
                None
            } else {
                Some(x / y)
            }
        }),
        IntMod(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            if y == 0 {
                None
            } else {
                Some(x % y)
            }
        }),
        IntLess(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some((x < y) as u64)
        }),
        IntEqual(a, b) => eval_binary(sscp.operand_lattice(a), sscp.operand_lattice(b), |x, y| {
            Some((x == y) as u64)
        }),
    }
}

/// Run the constant-propagation fixed point over every SSA definition in
/// `proc`. `proc` must already be in SSA form.
pub fn propagate(proc: &Procedure) -> Sscp {
    let mut sscp = Sscp::default();
    let order = proc.reverse_postorder();
    let mut changed = true;
    let mut guard = 0usize;
    while changed && guard < 10_000 {
        changed = false;
        guard += 1;
        for &b in &order {
            let block = proc.blocks.node(b).unwrap();
            for mnemonic in &block.mnemonics {
                for instr in &mnemonic.instructions {
                    let (name, width, subscript) = match &instr.assignee {
                        Value::Variable { name, width, subscript: Some(s) } => (name.clone(), *width, *s),
                        _ => continue,
                    };
                    let new_val = eval(&instr.op, &sscp);
                    let new_val = match new_val {
                        Lattice::Const(c) => Lattice::Const(truncate(c, width)),
                        other => other,
                    };
                    let key = (name, subscript);
                    let prev = sscp.values.get(&key).copied().unwrap_or(Lattice::Bottom);
                    let combined = meet(prev, new_val);
                    if combined != prev {
                        sscp.values.insert(key, combined);
                        changed = true;
                    }
                }
            }
        }
    }
    sscp
}
