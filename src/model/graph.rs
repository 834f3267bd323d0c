//! Logical graphs and graph collections.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Edge, GraphHead, Vertex};
use crate::types::{EpgmError, GraphId, Result, VertexId};

/// A single graph: one head plus the vertices and edges it contains.
///
/// Containment is structural: every vertex and edge stored here belongs to
/// the graph, regardless of its `graph_ids`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalGraph {
    head: GraphHead,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl LogicalGraph {
    /// Creates a logical graph, rejecting duplicate element ids and edges
    /// whose endpoints are missing.
    pub fn new(head: GraphHead, vertices: Vec<Vertex>, edges: Vec<Edge>) -> Result<Self> {
        check_unique(&vertices, &edges)?;
        check_endpoints(&vertices, &edges)?;
        Ok(Self {
            head,
            vertices,
            edges,
        })
    }

    /// Returns the graph head.
    pub fn head(&self) -> &GraphHead {
        &self.head
    }

    /// Returns the vertices.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Returns the edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Converts the graph into a one-graph collection, recording membership
    /// of every element in the head's id.
    pub fn into_collection(self) -> GraphCollection {
        let graph_id = self.head.id;
        let vertices = self
            .vertices
            .into_iter()
            .map(|v| v.in_graph(graph_id))
            .collect();
        let edges = self.edges.into_iter().map(|e| e.in_graph(graph_id)).collect();
        GraphCollection {
            heads: vec![self.head],
            vertices,
            edges,
        }
    }
}

/// A set of graphs sharing one pool of vertices and edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphCollection {
    heads: Vec<GraphHead>,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl GraphCollection {
    /// Creates a collection, rejecting dangling edges and duplicate heads or
    /// elements.
    pub fn new(heads: Vec<GraphHead>, vertices: Vec<Vertex>, edges: Vec<Edge>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(heads.len());
        for head in &heads {
            if !seen.insert(head.id) {
                return Err(EpgmError::InvalidGraph(format!(
                    "graph head {} appears twice",
                    head.id
                )));
            }
        }
        check_unique(&vertices, &edges)?;
        check_endpoints(&vertices, &edges)?;
        Ok(Self {
            heads,
            vertices,
            edges,
        })
    }

    /// Creates an empty collection.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the graph heads.
    pub fn heads(&self) -> &[GraphHead] {
        &self.heads
    }

    /// Returns all vertices of the collection.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Returns all edges of the collection.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the ids of all graphs in the collection.
    pub fn graph_ids(&self) -> BTreeSet<GraphId> {
        self.heads.iter().map(|head| head.id).collect()
    }

    /// Extracts the logical graph with the given id.
    pub fn graph(&self, id: GraphId) -> Option<LogicalGraph> {
        let head = self.heads.iter().find(|head| head.id == id)?.clone();
        let vertices = self
            .vertices
            .iter()
            .filter(|v| v.graph_ids.contains(&id))
            .cloned()
            .collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| e.graph_ids.contains(&id))
            .cloned()
            .collect();
        Some(LogicalGraph {
            head,
            vertices,
            edges,
        })
    }

    /// Returns true when the collection has no graphs.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }
}

fn check_unique(vertices: &[Vertex], edges: &[Edge]) -> Result<()> {
    let mut seen = HashSet::with_capacity(vertices.len());
    if let Some(vertex) = vertices.iter().find(|v| !seen.insert(v.id)) {
        return Err(EpgmError::InvalidGraph(format!(
            "vertex {} appears twice",
            vertex.id
        )));
    }
    let mut seen = HashSet::with_capacity(edges.len());
    if let Some(edge) = edges.iter().find(|e| !seen.insert(e.id)) {
        return Err(EpgmError::InvalidGraph(format!("edge {} appears twice", edge.id)));
    }
    Ok(())
}

fn check_endpoints(vertices: &[Vertex], edges: &[Edge]) -> Result<()> {
    let ids: HashSet<VertexId> = vertices.iter().map(|v| v.id).collect();
    for edge in edges {
        for endpoint in [edge.source, edge.target] {
            if !ids.contains(&endpoint) {
                return Err(EpgmError::InvalidGraph(format!(
                    "edge {} references missing vertex {}",
                    edge.id, endpoint
                )));
            }
        }
    }
    Ok(())
}
