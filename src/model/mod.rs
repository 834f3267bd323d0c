//! Extended property graph model: graph heads, vertices and edges that each
//! carry an identifier, a label and a property map.
//!
//! The three element kinds are a closed set of plain structs sharing the
//! [`Element`] capability trait. Logical graphs and graph collections are
//! defined in [`graph`]; the [`ascii`] loader builds both from a compact text
//! notation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EdgeId, GraphId, VertexId};

pub mod ascii;
pub mod graph;

pub use graph::{GraphCollection, LogicalGraph};

/// Property value attached to a graph element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum PropertyValue {
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl PropertyValue {
    /// Compares two values of compatible types.
    ///
    /// Integers and floats compare numerically with each other; every other
    /// mixed-type comparison, and any comparison involving null, is undefined.
    pub fn partial_cmp_value(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.partial_cmp(b),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.partial_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a.partial_cmp(b),
            (PropertyValue::Int(a), PropertyValue::Float(b)) => (*a as f64).partial_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (PropertyValue::String(a), PropertyValue::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Returns true for [`PropertyValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "NULL"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v:?}"),
            PropertyValue::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

/// Ordered property map; iteration order is the key order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Renders properties as `{k1=v1,k2=v2}`, or an empty string when there are none.
pub fn format_properties(properties: &Properties) -> String {
    if properties.is_empty() {
        return String::new();
    }
    let body = properties
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{body}}}")
}

/// Capabilities shared by graph heads, vertices and edges.
pub trait Element {
    /// Identifier type of the element kind.
    type Id: Copy + Eq + Ord + fmt::Display;

    /// Returns the element identifier.
    fn id(&self) -> Self::Id;

    /// Returns the element label.
    fn label(&self) -> &str;

    /// Returns the element properties.
    fn properties(&self) -> &Properties;

    /// Looks up a single property.
    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties().get(key)
    }
}

/// Head of a logical graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHead {
    /// Graph identifier.
    pub id: GraphId,
    /// Graph label.
    pub label: String,
    /// Graph properties.
    pub properties: Properties,
}

impl GraphHead {
    /// Creates a graph head without properties.
    pub fn new(id: GraphId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            properties: Properties::new(),
        }
    }

    /// Adds a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Vertex with graph membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Vertex identifier.
    pub id: VertexId,
    /// Vertex label.
    pub label: String,
    /// Vertex properties.
    pub properties: Properties,
    /// Graphs this vertex belongs to.
    pub graph_ids: BTreeSet<GraphId>,
}

impl Vertex {
    /// Creates a vertex without properties or graph membership.
    pub fn new(id: VertexId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            properties: Properties::new(),
            graph_ids: BTreeSet::new(),
        }
    }

    /// Adds a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds graph membership.
    pub fn in_graph(mut self, graph: GraphId) -> Self {
        self.graph_ids.insert(graph);
        self
    }
}

/// Directed edge with graph membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier.
    pub id: EdgeId,
    /// Edge label.
    pub label: String,
    /// Source vertex.
    pub source: VertexId,
    /// Target vertex.
    pub target: VertexId,
    /// Edge properties.
    pub properties: Properties,
    /// Graphs this edge belongs to.
    pub graph_ids: BTreeSet<GraphId>,
}

impl Edge {
    /// Creates an edge without properties or graph membership.
    pub fn new(
        id: EdgeId,
        label: impl Into<String>,
        source: VertexId,
        target: VertexId,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            source,
            target,
            properties: Properties::new(),
            graph_ids: BTreeSet::new(),
        }
    }

    /// Adds a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds graph membership.
    pub fn in_graph(mut self, graph: GraphId) -> Self {
        self.graph_ids.insert(graph);
        self
    }
}

impl Element for GraphHead {
    type Id = GraphId;

    fn id(&self) -> GraphId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl Element for Vertex {
    type Id = VertexId;

    fn id(&self) -> VertexId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl Element for Edge {
    type Id = EdgeId;

    fn id(&self) -> EdgeId {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}
