#![forbid(unsafe_code)]

//! Identifier newtypes and the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};

mod error;

pub use error::{EpgmError, EpgmErrorWithCode, Result};

/// Identifier of a vertex.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct VertexId(pub u64);
/// Identifier of an edge.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeId(pub u64);
/// Identifier of a logical graph (its graph head).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct GraphId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VertexId {
    fn from(value: u64) -> Self {
        VertexId(value)
    }
}

impl From<u64> for EdgeId {
    fn from(value: u64) -> Self {
        EdgeId(value)
    }
}

impl From<u64> for GraphId {
    fn from(value: u64) -> Self {
        GraphId(value)
    }
}

/// Hands out fresh identifiers for vertices, edges and graph heads.
///
/// Each generator starts from a random 32-bit prefix so two generators
/// practically never produce overlapping ids. Ids from one generator are
/// unique across all three element kinds.
#[derive(Debug)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Creates a generator with a random prefix.
    pub fn new() -> Self {
        let prefix: u32 = rand::random();
        Self::starting_at((prefix as u64) << 32)
    }

    /// Creates a generator whose first id is `start`.
    pub fn starting_at(start: u64) -> Self {
        Self { next: start }
    }

    fn bump(&mut self) -> u64 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    /// Returns a fresh vertex id.
    pub fn vertex_id(&mut self) -> VertexId {
        VertexId(self.bump())
    }

    /// Returns a fresh edge id.
    pub fn edge_id(&mut self) -> EdgeId {
        EdgeId(self.bump())
    }

    /// Returns a fresh graph id.
    pub fn graph_id(&mut self) -> GraphId {
        GraphId(self.bump())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
