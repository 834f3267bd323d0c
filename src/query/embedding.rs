//! Partial and complete matches of a query graph.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::model::PropertyValue;
use crate::query::matching::MatchStrategies;
use crate::types::{EdgeId, VertexId};

/// Data graph element bound to one query variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binding {
    /// A vertex.
    Vertex(VertexId),
    /// A fixed-length edge.
    Edge(EdgeId),
    /// A variable-length edge: the traversed edges in order and the
    /// vertices strictly between its endpoints.
    Path {
        /// Traversed edges, first hop first.
        edges: Vec<EdgeId>,
        /// Intermediate vertices; one fewer than `edges`.
        vertices: Vec<VertexId>,
    },
}

impl Binding {
    /// Bound vertex id, if this is a vertex binding.
    pub fn as_vertex(&self) -> Option<VertexId> {
        match self {
            Binding::Vertex(id) => Some(*id),
            _ => None,
        }
    }

    /// Bound edge id, if this is a fixed-length edge binding.
    pub fn as_edge(&self) -> Option<EdgeId> {
        match self {
            Binding::Edge(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Vertex(id) => write!(f, "v{id}"),
            Binding::Edge(id) => write!(f, "e{id}"),
            Binding::Path { edges, vertices } => {
                write!(f, "[")?;
                for (idx, edge) in edges.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",v{}", vertices[idx - 1])?;
                    }
                    write!(f, "{}e{edge}", if idx > 0 { "," } else { "" })?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Role of a query variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VarKind {
    /// Query vertex.
    Vertex,
    /// Fixed-length query edge.
    Edge,
    /// Variable-length query edge.
    Path,
}

/// Maps query variables to embedding slots.
#[derive(Clone, Debug, Default)]
pub struct VarLayout {
    vars: Vec<(String, VarKind)>,
    index: FxHashMap<String, usize>,
}

impl VarLayout {
    /// Creates a layout; slots follow the iteration order.
    pub fn new<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = (S, VarKind)>,
        S: Into<String>,
    {
        let mut layout = Self::default();
        for (var, kind) in vars {
            let var = var.into();
            layout.index.insert(var.clone(), layout.vars.len());
            layout.vars.push((var, kind));
        }
        layout
    }

    /// Slot of `var`.
    pub fn slot(&self, var: &str) -> Option<usize> {
        self.index.get(var).copied()
    }

    /// Variable stored in `slot`.
    pub fn var(&self, slot: usize) -> &str {
        &self.vars[slot].0
    }

    /// Role of the variable in `slot`.
    pub fn kind(&self, slot: usize) -> VarKind {
        self.vars[slot].1
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true when there are no slots.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables in slot order.
    pub fn vars(&self) -> impl Iterator<Item = &str> + '_ {
        self.vars.iter().map(|(var, _)| var.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
struct CachedProperty {
    slot: usize,
    key: String,
    value: PropertyValue,
}

/// Fixed-width row of optional bindings plus cached property values.
///
/// Embeddings are values: extending or merging produces a new embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    slots: SmallVec<[Option<Binding>; 8]>,
    properties: SmallVec<[CachedProperty; 4]>,
}

impl Embedding {
    /// Creates an embedding with `width` empty slots.
    pub fn new(width: usize) -> Self {
        Self {
            slots: SmallVec::from_elem(None, width),
            properties: SmallVec::new(),
        }
    }

    /// Number of slots.
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Binding in `slot`, if any.
    pub fn binding(&self, slot: usize) -> Option<&Binding> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Vertex bound in `slot`.
    pub fn vertex(&self, slot: usize) -> Option<VertexId> {
        self.binding(slot).and_then(Binding::as_vertex)
    }

    /// Returns true when `slot` holds a binding.
    pub fn is_bound(&self, slot: usize) -> bool {
        self.binding(slot).is_some()
    }

    /// Bindings in slot order.
    pub fn bindings(&self) -> impl Iterator<Item = Option<&Binding>> + '_ {
        self.slots.iter().map(Option::as_ref)
    }

    /// Returns a copy with `slot` bound to `binding`.
    pub fn bind(mut self, slot: usize, binding: Binding) -> Self {
        self.slots[slot] = Some(binding);
        self
    }

    /// Returns a copy carrying `value` for `key` of the element in `slot`.
    pub fn with_property(mut self, slot: usize, key: &str, value: PropertyValue) -> Self {
        match self
            .properties
            .iter_mut()
            .find(|cached| cached.slot == slot && cached.key == key)
        {
            Some(cached) => cached.value = value,
            None => self.properties.push(CachedProperty {
                slot,
                key: key.to_owned(),
                value,
            }),
        }
        self
    }

    /// Cached value of `key` for the element in `slot`.
    pub fn cached_property(&self, slot: usize, key: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|cached| cached.slot == slot && cached.key == key)
            .map(|cached| &cached.value)
    }

    /// Combines two embeddings of the same width; bindings of `self` win.
    pub fn merge(&self, other: &Embedding) -> Embedding {
        let mut merged = self.clone();
        for (slot, binding) in other.slots.iter().enumerate() {
            if merged.slots[slot].is_none() {
                merged.slots[slot] = binding.clone();
            }
        }
        for cached in &other.properties {
            if merged.cached_property(cached.slot, &cached.key).is_none() {
                merged.properties.push(cached.clone());
            }
        }
        merged
    }

    /// Keeps only `slots`, in the given order.
    pub fn project(&self, slots: &[usize]) -> Embedding {
        let mut projected = Embedding::new(slots.len());
        for (target, &source) in slots.iter().enumerate() {
            projected.slots[target] = self.slots[source].clone();
            for cached in self.properties.iter().filter(|c| c.slot == source) {
                projected.properties.push(CachedProperty {
                    slot: target,
                    ..cached.clone()
                });
            }
        }
        projected
    }

    /// Bindings of `slots`, used as an equi-join key.
    pub fn key(&self, slots: &[usize]) -> SmallVec<[Option<Binding>; 2]> {
        slots.iter().map(|&slot| self.slots[slot].clone()).collect()
    }

    /// Every vertex id in the embedding, path intermediates included.
    pub fn vertex_ids(&self) -> SmallVec<[VertexId; 8]> {
        let mut ids = SmallVec::new();
        for binding in self.slots.iter().flatten() {
            match binding {
                Binding::Vertex(id) => ids.push(*id),
                Binding::Path { vertices, .. } => ids.extend(vertices.iter().copied()),
                Binding::Edge(_) => {}
            }
        }
        ids
    }

    /// Every edge id in the embedding, path edges included.
    pub fn edge_ids(&self) -> SmallVec<[EdgeId; 8]> {
        let mut ids = SmallVec::new();
        for binding in self.slots.iter().flatten() {
            match binding {
                Binding::Edge(id) => ids.push(*id),
                Binding::Path { edges, .. } => ids.extend(edges.iter().copied()),
                Binding::Vertex(_) => {}
            }
        }
        ids
    }

    /// Checks the isomorphism constraints of `strategies` over the bound slots.
    pub fn satisfies(&self, strategies: MatchStrategies) -> bool {
        (!strategies.vertex.is_isomorphism() || all_distinct(&mut self.vertex_ids()))
            && (!strategies.edge.is_isomorphism() || all_distinct(&mut self.edge_ids()))
    }
}

fn all_distinct<T: Ord>(ids: &mut [T]) -> bool {
    ids.sort_unstable();
    ids.windows(2).all(|pair| pair[0] != pair[1])
}
