//! Dataflow analyses over a procedure's block graph: dominance, liveness,
//! SSA construction and sparse constant propagation.
//!
//! These run in sequence, each consuming the last: `dominance_tree` feeds
//! both `liveness` (successor-driven, independent of dominance) and
//! `ssa::convert` (which needs the dominance frontiers for φ-placement and
//! the liveness globals to know which names need φs at all); `sscp::propagate`
//! then runs over the resulting SSA form.

pub mod dominance;
pub mod liveness;
pub mod ssa;
pub mod sscp;
