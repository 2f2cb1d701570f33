//! The program graph: a set of procedures and the call edges between them,
//! shared across the concurrently-decoding driver threads behind a single
//! exclusive lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dataflow::dominance::Dominance;
use crate::dataflow::liveness::Liveness;
use crate::dataflow::sscp::Sscp;
use crate::procedure::Procedure;

/// Per-procedure cached analysis results, recomputed by the driver after
/// each local decode pass.
#[derive(Default)]
pub struct ProcedureCaches {
    /// Dominance tree and frontiers, if computed.
    pub dominance: Option<Dominance>,
    /// Liveness sets, if computed.
    pub liveness: Option<Liveness>,
    /// Sparse constant propagation lattice, if computed.
    pub sscp: Option<Sscp>,
}

struct ProgramInner {
    name: String,
    procedures: HashMap<String, Procedure>,
    caches: HashMap<String, ProcedureCaches>,
    /// Call edges `caller name -> callee name`.
    call_edges: Vec<(String, String)>,
    /// Every address already claimed by some block of some procedure,
    /// mapping address to the owning procedure's name. Used for the "is
    /// this address already claimed?" check the driver performs before
    /// starting a new local decode loop.
    claimed: HashMap<u64, String>,
}

/// A program (flowgraph): the set of procedures discovered so far and the
/// call edges between them.
///
/// All mutating operations take a single exclusive lock, held only for "is
/// this address claimed", procedure/call-edge insertion, and cache
/// write-back. A procedure's internal block graph is only ever touched by
/// the one worker thread decoding it; readers of a finished procedure never
/// race a writer of the same procedure because a procedure is only
/// published into `procedures` once its local decode loop has finished.
#[derive(Clone)]
pub struct Program {
    inner: Arc<Mutex<ProgramInner>>,
}

impl Program {
    /// An empty program.
    pub fn new(name: impl Into<String>) -> Program {
        Program {
            inner: Arc::new(Mutex::new(ProgramInner {
                name: name.into(),
                procedures: HashMap::new(),
                caches: HashMap::new(),
                call_edges: Vec::new(),
                claimed: HashMap::new(),
            })),
        }
    }

    /// This program's name.
    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    /// `true` if `addr` already lies inside some block of some known
    /// procedure.
    pub fn is_claimed(&self, addr: u64) -> bool {
        self.inner.lock().unwrap().claimed.contains_key(&addr)
    }

    /// The name of the procedure owning `addr`, if any.
    pub fn owner_of(&self, addr: u64) -> Option<String> {
        self.inner.lock().unwrap().claimed.get(&addr).cloned()
    }

    /// Atomically check-and-claim: returns `true` (and claims `addr` for
    /// `owner`) only if `addr` was not already claimed by some procedure.
    /// This closes the race the driver's work-queue loop would otherwise
    /// have between checking and claiming an address.
    pub fn try_claim(&self, addr: u64, owner: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.claimed.contains_key(&addr) {
            false
        } else {
            inner.claimed.insert(addr, owner.to_string());
            true
        }
    }

    /// Publish a finished procedure (and claim every address covered by its
    /// blocks), replacing any previous procedure of the same name.
    pub fn insert_procedure(&self, proc: Procedure) {
        let mut inner = self.inner.lock().unwrap();
        let name = proc.name.clone();
        for id in proc.blocks.node_ids() {
            let block = proc.blocks.node(id).unwrap();
            let area = block.area();
            for addr in area.start..area.end {
                inner.claimed.entry(addr).or_insert_with(|| name.clone());
            }
        }
        inner.procedures.insert(name.clone(), proc);
        inner.caches.entry(name).or_default();
        tracing::info!(procedure = %inner.procedures.len(), "procedure published");
    }

    /// Record a call edge `caller -> callee`. Idempotent.
    pub fn insert_call_edge(&self, caller: impl Into<String>, callee: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        let edge = (caller.into(), callee.into());
        if !inner.call_edges.contains(&edge) {
            tracing::debug!(caller = %edge.0, callee = %edge.1, "call edge");
            inner.call_edges.push(edge);
        }
    }

    /// Write back the analysis caches for a procedure.
    pub fn write_caches(&self, name: &str, caches: ProcedureCaches) {
        let mut inner = self.inner.lock().unwrap();
        inner.caches.insert(name.to_string(), caches);
    }

    /// Number of procedures currently known.
    pub fn procedure_count(&self) -> usize {
        self.inner.lock().unwrap().procedures.len()
    }

    /// All known call edges, as `(caller, callee)` name pairs.
    pub fn call_edges(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().call_edges.clone()
    }

    /// Names of every known procedure.
    pub fn procedure_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().procedures.keys().cloned().collect()
    }

    /// Run `f` with read access to a named procedure.
    pub fn with_procedure<R>(&self, name: &str, f: impl FnOnce(&Procedure) -> R) -> Option<R> {
        let inner = self.inner.lock().unwrap();
        inner.procedures.get(name).map(f)
    }

    /// Run `f` with read access to a named procedure's cached analyses.
    pub fn with_caches<R>(&self, name: &str, f: impl FnOnce(&ProcedureCaches) -> R) -> Option<R> {
        let inner = self.inner.lock().unwrap();
        inner.caches.get(name).map(f)
    }
}
