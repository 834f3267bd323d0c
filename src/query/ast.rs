//! Syntax tree of a `MATCH ... WHERE ...` pattern.
//!
//! The tree mirrors the text closely: paths keep their written direction and
//! anonymous elements have no variable. [`crate::query::graph::QueryHandler`]
//! normalises it into a [`crate::query::graph::QueryGraph`].

use crate::model::PropertyValue;
use crate::query::predicate::Predicate;

/// Direction an edge was written in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelDirection {
    /// `(a)-[e]->(b)`
    Outgoing,
    /// `(a)<-[e]-(b)`
    Incoming,
    /// `(a)-[e]-(b)`
    Undirected,
}

/// Inclusive length bounds of a variable-length edge (`*min..max`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PathBounds {
    /// Minimum number of hops, at least 1.
    pub min: u32,
    /// Maximum number of hops, at least `min`.
    pub max: u32,
}

/// `(var:Label {k: v})`
#[derive(Clone, Debug, PartialEq, Default)]
pub struct NodePattern {
    /// Variable name, if any.
    pub var: Option<String>,
    /// Label constraint, if any.
    pub label: Option<String>,
    /// Inline property equalities.
    pub properties: Vec<(String, PropertyValue)>,
}

/// `-[var:Label*1..3 {k: v}]->`
#[derive(Clone, Debug, PartialEq)]
pub struct RelPattern {
    /// Variable name, if any.
    pub var: Option<String>,
    /// Label constraint, if any.
    pub label: Option<String>,
    /// Written direction.
    pub direction: RelDirection,
    /// Length bounds for variable-length edges.
    pub bounds: Option<PathBounds>,
    /// Inline property equalities.
    pub properties: Vec<(String, PropertyValue)>,
}

/// A node followed by any number of `(edge, node)` steps.
#[derive(Clone, Debug, PartialEq)]
pub struct PathPattern {
    /// First node of the path.
    pub start: NodePattern,
    /// Subsequent hops.
    pub steps: Vec<(RelPattern, NodePattern)>,
}

/// Parsed query: comma-separated paths plus an optional WHERE predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchQuery {
    /// Paths of the MATCH clause.
    pub paths: Vec<PathPattern>,
    /// WHERE clause.
    pub predicate: Option<Predicate>,
}
