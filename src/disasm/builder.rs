//! Typed IL builders, passed explicitly into every semantic action instead
//! of relying on thread-local "current code generator" state.

use crate::error::Result;
use crate::instruction::Instruction;
use crate::operator::Operator;
use crate::value::Value;

/// A monotonic counter minting architecture-unique temporary names, owned by
/// the driver for the lifetime of one decoding session and threaded through
/// every `Builder`, in place of a module-level global.
#[derive(Debug, Default)]
pub struct TemporaryCounter {
    next: u32,
}

impl TemporaryCounter {
    /// A fresh counter starting at zero.
    pub fn new() -> TemporaryCounter {
        TemporaryCounter { next: 0 }
    }

    /// Mint a fresh temporary variable of the given bit width. Names are
    /// `t0`, `t1`, … up to `t9999`, which fits comfortably inside
    /// [`crate::value::MAX_VARIABLE_NAME_LEN`].
    pub fn fresh(&mut self, width: u16) -> Result<Value> {
        let name = format!("t{}", self.next);
        self.next += 1;
        Value::variable(name, width)
    }
}

/// Builds IL instructions for one semantic action. Every `and`/`or`/… method
/// either assigns into an explicit `dst` or mints a fresh temporary via the
/// shared [`TemporaryCounter`], appends the resulting [`Instruction`] to this
/// builder's list, and returns the assigned value so actions can chain
/// sub-expressions.
pub struct Builder<'a> {
    counter: &'a mut TemporaryCounter,
    instructions: Vec<Instruction>,
}

impl<'a> Builder<'a> {
    /// A fresh builder over the given session-wide temporary counter.
    pub fn new(counter: &'a mut TemporaryCounter) -> Builder<'a> {
        Builder {
            counter,
            instructions: Vec::new(),
        }
    }

    /// Drain the instructions accumulated so far, leaving this builder
    /// empty.
    pub fn take_instructions(&mut self) -> Vec<Instruction> {
        std::mem::take(&mut self.instructions)
    }

    fn assign(&mut self, dst: Option<Value>, width: u16, op: Operator) -> Result<Value> {
        let dst = match dst {
            Some(v) => v,
            None => self.counter.fresh(width)?,
        };
        self.instructions.push(Instruction::new(dst.clone(), op)?);
        Ok(dst)
    }

    /// `dst := a and b` (or a fresh one-bit temporary).
    pub fn and(&mut self, dst: Option<Value>, a: Value, b: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::And(a, b))
    }

    /// `dst := a or b`.
    pub fn or(&mut self, dst: Option<Value>, a: Value, b: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::Or(a, b))
    }

    /// `dst := a impl b`.
    pub fn implies(&mut self, dst: Option<Value>, a: Value, b: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::Impl(a, b))
    }

    /// `dst := a equiv b`.
    pub fn equiv(&mut self, dst: Option<Value>, a: Value, b: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::Equiv(a, b))
    }

    /// `dst := not a`.
    pub fn not(&mut self, dst: Option<Value>, a: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::Not(a))
    }

    /// `dst := a & b`, at `width` bits.
    pub fn int_and(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntAnd(a, b))
    }

    /// `dst := a | b`, at `width` bits.
    pub fn int_or(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntOr(a, b))
    }

    /// `dst := a ^ b`, at `width` bits.
    pub fn int_xor(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntXor(a, b))
    }

    /// `dst := a + b`, at `width` bits.
    pub fn int_add(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntAdd(a, b))
    }

    /// `dst := a - b`, at `width` bits.
    pub fn int_sub(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntSub(a, b))
    }

    /// `dst := a * b`, at `width` bits.
    pub fn int_mul(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntMul(a, b))
    }

    /// `dst := a / b`, at `width` bits.
    pub fn int_div(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntDiv(a, b))
    }

    /// `dst := a % b`, at `width` bits.
    pub fn int_mod(&mut self, dst: Option<Value>, a: Value, b: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::IntMod(a, b))
    }

    /// `dst := a < b` (one-bit result).
    pub fn int_less(&mut self, dst: Option<Value>, a: Value, b: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::IntLess(a, b))
    }

    /// `dst := a == b` (one-bit result).
    pub fn int_equal(&mut self, dst: Option<Value>, a: Value, b: Value) -> Result<Value> {
        self.assign(dst, 1, Operator::IntEqual(a, b))
    }

    /// `dst := lift(a)` — carry an architecture-specific raw value into the
    /// IL unchanged, at `width` bits.
    pub fn lift(&mut self, dst: Option<Value>, a: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::Lift(a))
    }

    /// `dst := call(target)`.
    pub fn call(&mut self, dst: Option<Value>, target: Value, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::Call(target))
    }

    /// `dst := phi(args…)`.
    pub fn phi(&mut self, dst: Option<Value>, args: Vec<Value>, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::Phi(args))
    }

    /// `dst := nop`, at `width` bits (rarely used directly; mostly emitted
    /// by SSA construction, not by grammar actions).
    pub fn nop(&mut self, dst: Option<Value>, width: u16) -> Result<Value> {
        self.assign(dst, width, Operator::Nop)
    }
}
