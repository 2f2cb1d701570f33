//! The layered, byte-addressable memory model and its projection onto a
//! flat byte view.
//!
//! A [`Region`] is a named byte address space of fixed length assembled
//! from a DAG of [`Layer`]s mounted over sub-[`Bound`]s. Its
//! [`Region::projection`] is the unique, non-overlapping interval map from
//! `[0, length)` to the topmost layer covering each sub-range.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::graph::{IndexedGraph, NodeId};

/// A half-open byte range `[lo, hi)`.
pub type Bound = Range<u64>;

/// One layer in a region's layer stack.
///
/// Matches the "small variant over an OO hierarchy" design note: the
/// projection algorithm dispatches on this enum explicitly instead of
/// calling a virtual `filter` method.
#[derive(Clone)]
pub enum Layer {
    /// Owned raw bytes, the base case: every offset is backed directly.
    Raw(Vec<u8>),
    /// A pure byte-to-byte transform applied to the layer underneath.
    Map(std::sync::Arc<dyn Fn(u8) -> u8 + Send + Sync>),
    /// A sparse set of byte overrides on top of the layer underneath.
    SparseMutable(BTreeMap<u64, u8>),
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Raw(bytes) => f.debug_tuple("Raw").field(&bytes.len()).finish(),
            Layer::Map(_) => f.write_str("Map(..)"),
            Layer::SparseMutable(m) => f.debug_tuple("SparseMutable").field(&m.len()).finish(),
        }
    }
}

impl Layer {
    /// Apply this layer to a byte read from the layer underneath at region
    /// offset `off`. `Raw` ignores `under` and answers from its own bytes
    /// (and is therefore only valid as the layer at the bottom of a mount);
    /// `Map` and `SparseMutable` are proper filters over `under`.
    fn filter(&self, off: u64, under: u8) -> u8 {
        match self {
            Layer::Raw(bytes) => bytes.get(off as usize).copied().unwrap_or(under),
            Layer::Map(f) => f(under),
            Layer::SparseMutable(overrides) => overrides.get(&off).copied().unwrap_or(under),
        }
    }
}

/// One mounted layer: the sub-range it covers and the layer covering it.
#[derive(Debug, Clone)]
struct Mount {
    bound: Bound,
    layer: Layer,
}

/// One contiguous interval of a region's [`Region::projection`], tagged with
/// the layer that is topmost over it.
#[derive(Debug, Clone)]
pub struct ProjectedInterval {
    /// The covered sub-range.
    pub bound: Bound,
    /// Index into the region's mount list of the topmost layer here.
    pub layer_index: usize,
}

/// A named, fixed-length byte address space built from a DAG of layers.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    length: u64,
    mounts: Vec<Mount>,
}

impl Region {
    /// Construct a region backed initially by `bytes` (the bottom, whole-span
    /// raw layer), with the given `name` and total `length`. `bytes` is
    /// zero-padded or truncated to `length`.
    pub fn new(name: impl Into<String>, length: u64, bytes: Vec<u8>) -> Region {
        let mut bytes = bytes;
        bytes.resize(length as usize, 0);
        Region {
            name: name.into(),
            length,
            mounts: vec![Mount {
                bound: 0..length,
                layer: Layer::Raw(bytes),
            }],
        }
    }

    /// This region's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This region's length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// `true` if this region has zero length.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Mount `layer` over `bound`, shadowing whatever covers that sub-range
    /// already. Later mounts shadow earlier ones (`add` pushes to the end of
    /// the mount list; projection picks the last, i.e. topmost, mount
    /// covering any given offset).
    ///
    /// # Errors
    /// Returns [`Error::Region`] if `bound` does not fit inside
    /// `[0, length)`.
    pub fn add(&mut self, bound: Bound, layer: Layer) -> Result<()> {
        if bound.start >= bound.end || bound.end > self.length {
            return Err(Error::Region(format!(
                "layer bound {:?} does not fit region of length {}",
                bound, self.length
            )));
        }
        self.mounts.push(Mount { bound, layer });
        Ok(())
    }

    /// Compute the projection: an ordered, disjoint set of intervals
    /// covering `[0, length)`, each tagged with the index of the topmost
    /// mount covering it.
    ///
    /// This is a root-first sweep over mount insertion order: each later
    /// mount's bound reassigns whatever sub-range it overlaps from whatever
    /// mount (including the base raw layer) currently owns it, matching the
    /// "root-first DFS over the layer DAG; at each edge the interval is
    /// reassigned from parent to child" algorithm.
    pub fn projection(&self) -> Vec<ProjectedInterval> {
        if self.length == 0 {
            return Vec::new();
        }
        // owner[offset] = index into self.mounts of the topmost mount.
        let mut owner: Vec<usize> = vec![0; self.length as usize];
        for (idx, mount) in self.mounts.iter().enumerate() {
            for off in mount.bound.start..mount.bound.end {
                owner[off as usize] = idx;
            }
        }
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < owner.len() {
            let start = i as u64;
            let idx = owner[i];
            while i < owner.len() && owner[i] == idx {
                i += 1;
            }
            out.push(ProjectedInterval {
                bound: start..(i as u64),
                layer_index: idx,
            });
        }
        out
    }

    /// Produce the flat byte view of this region by composing every
    /// mount's filter over the bytes underneath it.
    ///
    /// # Errors
    /// Returns [`Error::Region`] if `range` is not within `[0, length)`.
    pub fn read(&self, range: Bound) -> Result<Vec<u8>> {
        if range.start >= range.end || range.end > self.length {
            return Err(Error::Region(format!(
                "read range {:?} out of bounds for region of length {}",
                range, self.length
            )));
        }
        let mut out = Vec::with_capacity((range.end - range.start) as usize);
        for off in range.clone() {
            out.push(self.byte_at(off));
        }
        Ok(out)
    }

    /// Resolve a single byte by folding every mount covering `off` over the
    /// base raw layer, oldest to newest. A mount nested inside another one
    /// therefore sees the outer mount's output at `off`, not the bare base
    /// byte — matching a DAG of layers rather than a flat stack over the
    /// bottom raw layer alone.
    fn byte_at(&self, off: u64) -> u8 {
        let mut value = match &self.mounts[0].layer {
            Layer::Raw(bytes) => bytes.get(off as usize).copied().unwrap_or(0),
            _ => 0,
        };
        for mount in &self.mounts[1..] {
            if mount.bound.contains(&off) {
                value = mount.layer.filter(off, value);
            }
        }
        value
    }
}

/// A DAG of regions, with a spanning tree rooted at the outermost
/// container. Used when a program's byte source is itself composed from
/// several named regions (e.g. file sections mapped into a flat address
/// space) — the core pipeline only ever reads the projected view of one
/// region, but callers assembling the input may need to relate regions to
/// each other.
#[derive(Debug, Default)]
pub struct RegionGraph {
    graph: IndexedGraph<Region, Bound>,
    root: Option<NodeId>,
}

impl RegionGraph {
    /// An empty region graph.
    pub fn new() -> Self {
        RegionGraph {
            graph: IndexedGraph::new(),
            root: None,
        }
    }

    /// Insert `region` as the outermost container (the spanning tree root).
    /// Only valid once.
    pub fn set_root(&mut self, region: Region) -> NodeId {
        let id = self.graph.add_node(region);
        self.root = Some(id);
        id
    }

    /// Insert `region` as a child of `parent`, covering `bound` of the
    /// parent's address space.
    pub fn add_child(&mut self, parent: NodeId, region: Region, bound: Bound) -> NodeId {
        let id = self.graph.add_node(region);
        self.graph.add_edge(parent, id, bound);
        id
    }

    /// The root region's handle, if one has been set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Borrow a region by handle.
    pub fn region(&self, id: NodeId) -> Option<&Region> {
        self.graph.node(id)
    }
}
