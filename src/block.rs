//! Basic blocks and the control transfers between them.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::mnemonic::Mnemonic;
use crate::value::Value;

/// A relational comparison operator used inside a [`Guard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelCode {
    /// Unsigned `<=`.
    ULeq,
    /// Signed `<=`.
    SLeq,
    /// Unsigned `>=`.
    UGeq,
    /// Signed `>=`.
    SGeq,
    /// Unsigned `<`.
    ULess,
    /// Signed `<`.
    SLess,
    /// Unsigned `>`.
    UGrtr,
    /// Signed `>`.
    SGrtr,
    /// `==`.
    Eq,
    /// `!=`.
    Neq,
}

impl RelCode {
    /// The negation of this relation code (flips the sense of the
    /// comparison). Total: every `RelCode` has exactly one negation.
    pub fn negate(self) -> RelCode {
        use RelCode::*;
        match self {
            ULeq => UGrtr,
            SLeq => SGrtr,
            UGeq => ULess,
            SGeq => SLess,
            ULess => UGeq,
            SLess => SGeq,
            UGrtr => ULeq,
            SGrtr => SLeq,
            Eq => Neq,
            Neq => Eq,
        }
    }
}

/// One relational predicate `op1 relcode op2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    /// Left-hand operand.
    pub op1: Value,
    /// The comparison.
    pub relcode: RelCode,
    /// Right-hand operand.
    pub op2: Value,
}

/// A conjunction of [`Relation`]s; an empty conjunction is always true.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Guard {
    /// The conjuncts. Empty means "true".
    pub relations: Vec<Relation>,
}

impl Guard {
    /// The always-true guard (empty conjunction).
    pub fn always() -> Guard {
        Guard { relations: vec![] }
    }

    /// A guard with a single relation.
    pub fn single(rel: Relation) -> Guard {
        Guard {
            relations: vec![rel],
        }
    }

    /// `true` if this guard is the always-true guard.
    pub fn is_always(&self) -> bool {
        self.relations.is_empty()
    }

    /// Negate this guard.
    ///
    /// Negating every relation in the conjunction soundly negates a single
    /// relation (flip it). For more than one relation, De Morgan's law
    /// would turn the conjunction into a disjunction, which `Guard` cannot
    /// represent (it is defined as a conjunction only), so there is no
    /// single relation whose negation is equivalent. Rather than guess,
    /// this returns `None` for any guard with more than one relation.
    pub fn negate(&self) -> Option<Guard> {
        match self.relations.as_slice() {
            [] => None,
            [single] => Some(Guard::single(Relation {
                op1: single.op1.clone(),
                relcode: single.relcode.negate(),
                op2: single.op2.clone(),
            })),
            _ => None,
        }
    }
}

/// Opaque handle to a basic block, resolved within one procedure's graph.
pub use crate::graph::NodeId as BlockId;

/// An edge in the control-flow graph: a guarded, possibly-symbolic jump from
/// the block owning it to `target`.
#[derive(Debug, Clone)]
pub struct ControlTransfer {
    /// Condition under which this transfer is taken.
    pub guard: Guard,
    /// The jump target, which may be a constant address or a symbolic
    /// value not yet resolved to a concrete block.
    pub target: Value,
    /// The block this transfer resolves to, once known.
    pub resolved: Option<BlockId>,
}

impl ControlTransfer {
    /// An unconditional transfer to `target`.
    pub fn unconditional(target: Value) -> ControlTransfer {
        ControlTransfer {
            guard: Guard::always(),
            target,
            resolved: None,
        }
    }

    /// A guarded transfer to `target`.
    pub fn guarded(guard: Guard, target: Value) -> ControlTransfer {
        ControlTransfer {
            guard,
            target,
            resolved: None,
        }
    }
}

/// A maximal straight-line sequence of mnemonics: one entry, one exit.
///
/// `mnemonics` must be non-empty, with contiguous, strictly increasing
/// areas; only the last mnemonic may contain a branch instruction (i.e. an
/// `Operator::Call` or a mnemonic that is the source of an outgoing
/// control transfer).
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// The mnemonics making up this block, in address order.
    pub mnemonics: Vec<Mnemonic>,
}

impl BasicBlock {
    /// Construct a basic block from a non-empty, contiguous, strictly
    /// increasing sequence of mnemonics.
    ///
    /// # Errors
    /// Returns [`Error::Value`] if `mnemonics` is empty or its areas are not
    /// contiguous and strictly increasing.
    pub fn new(mnemonics: Vec<Mnemonic>) -> Result<BasicBlock> {
        if mnemonics.is_empty() {
            return Err(Error::Value("basic block must be non-empty".to_string()));
        }
        for pair in mnemonics.windows(2) {
            if pair[0].area.end != pair[1].area.start {
                return Err(Error::Value(format!(
                    "mnemonic areas {:?} and {:?} are not contiguous",
                    pair[0].area, pair[1].area
                )));
            }
        }
        Ok(BasicBlock { mnemonics })
    }

    /// The hull of this block's mnemonic areas: `[first.lo, last.hi)`.
    pub fn area(&self) -> Range<u64> {
        self.mnemonics.first().unwrap().area.start..self.mnemonics.last().unwrap().area.end
    }

    /// Split this block at the mnemonic starting at `split_at`.
    ///
    /// Returns `(first_half, second_half)`, where `first_half` keeps the
    /// mnemonics before `split_at` and `second_half` keeps `split_at`
    /// onward. The caller is responsible for relinking control-flow edges:
    /// the first half's incoming edges stay, the second half's outgoing
    /// edges stay, and an unconditional transfer links first to second (see
    /// `Procedure::split_block`).
    ///
    /// # Errors
    /// Returns [`Error::Structural`] if `split_at` does not equal any
    /// mnemonic's starting address (a misaligned split).
    pub fn split(&self, split_at: u64) -> Result<(BasicBlock, BasicBlock)> {
        let idx = self
            .mnemonics
            .iter()
            .position(|m| m.area.start == split_at)
            .ok_or(Error::Structural {
                address: split_at,
            })?;
        if idx == 0 {
            return Err(Error::Structural {
                address: split_at,
            });
        }
        let (first, second) = self.mnemonics.split_at(idx);
        Ok((
            BasicBlock {
                mnemonics: first.to_vec(),
            },
            BasicBlock {
                mnemonics: second.to_vec(),
            },
        ))
    }

    /// `true` if `addr` lies within this block's hull.
    pub fn contains(&self, addr: u64) -> bool {
        self.area().contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic::Mnemonic;

    fn mn(lo: u64, hi: u64, op: &str) -> Mnemonic {
        Mnemonic::new(lo..hi, op, vec![], vec![], vec![]).unwrap()
    }

    #[test]
    fn rejects_noncontiguous() {
        let m1 = mn(0, 2, "nop");
        let m2 = mn(4, 6, "nop");
        assert!(BasicBlock::new(vec![m1, m2]).is_err());
    }

    #[test]
    fn area_is_hull() {
        let b = BasicBlock::new(vec![mn(0, 2, "nop"), mn(2, 4, "nop")]).unwrap();
        assert_eq!(b.area(), 0..4);
    }

    #[test]
    fn split_requires_mnemonic_boundary() {
        let b = BasicBlock::new(vec![mn(0, 2, "a"), mn(2, 4, "b"), mn(4, 6, "c")]).unwrap();
        assert!(b.split(3).is_err());
        let (first, second) = b.split(4).unwrap();
        assert_eq!(first.area(), 0..4);
        assert_eq!(second.area(), 4..6);
    }

    #[test]
    fn guard_negation_single_relation() {
        let v1 = Value::variable("a", 8).unwrap();
        let v2 = Value::variable("b", 8).unwrap();
        let g = Guard::single(Relation {
            op1: v1,
            relcode: RelCode::Eq,
            op2: v2,
        });
        let n = g.negate().unwrap();
        assert_eq!(n.relations[0].relcode, RelCode::Neq);
    }

    #[test]
    fn guard_negation_multi_relation_unspecified() {
        let v = Value::variable("a", 8).unwrap();
        let g = Guard {
            relations: vec![
                Relation {
                    op1: v.clone(),
                    relcode: RelCode::Eq,
                    op2: v.clone(),
                },
                Relation {
                    op1: v.clone(),
                    relcode: RelCode::ULess,
                    op2: v,
                },
            ],
        };
        assert!(g.negate().is_none());
    }
}
