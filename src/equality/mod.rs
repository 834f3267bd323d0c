//! Graph and collection equality by canonical labels.
//!
//! Every element is rendered to a string according to a [`LabelingMode`];
//! a graph becomes `head[v1,v2,...|e1,e2,...]` with vertex and edge labels
//! sorted, and a collection becomes its sorted graph labels joined by
//! newlines. Two graphs are equal when their canonical labels are.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dataflow::{DataSet, ExecutionEnvironment};
use crate::model::{
    format_properties, Edge, GraphCollection, GraphHead, LogicalGraph, Properties, Vertex,
};
use crate::types::{GraphId, Result, VertexId};

/// How one element kind contributes to a canonical label.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LabelingMode {
    /// Contributes nothing.
    Empty,
    /// The element identifier.
    Id,
    /// The element label followed by its sorted properties.
    Data,
}

impl LabelingMode {
    fn render(self, id: &dyn fmt::Display, label: &str, properties: &Properties) -> String {
        match self {
            LabelingMode::Empty => String::new(),
            LabelingMode::Id => id.to_string(),
            LabelingMode::Data => format!("{label}{}", format_properties(properties)),
        }
    }
}

/// Labelling modes for heads, vertices and edges, plus edge directedness.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CanonicalLabeling {
    /// Mode for graph heads.
    pub head: LabelingMode,
    /// Mode for vertices.
    pub vertex: LabelingMode,
    /// Mode for edges.
    pub edge: LabelingMode,
    /// Whether edge labels keep source and target apart.
    pub directed: bool,
}

impl CanonicalLabeling {
    /// Compares element ids only.
    pub fn by_element_ids() -> Self {
        Self {
            head: LabelingMode::Empty,
            vertex: LabelingMode::Id,
            edge: LabelingMode::Id,
            directed: true,
        }
    }

    /// Compares vertex and edge data, ignoring graph heads.
    pub fn by_element_data() -> Self {
        Self {
            head: LabelingMode::Empty,
            vertex: LabelingMode::Data,
            edge: LabelingMode::Data,
            directed: true,
        }
    }

    /// Compares head, vertex and edge data.
    pub fn by_data() -> Self {
        Self {
            head: LabelingMode::Data,
            vertex: LabelingMode::Data,
            edge: LabelingMode::Data,
            directed: true,
        }
    }

    /// Same modes, ignoring edge direction.
    pub fn undirected(mut self) -> Self {
        self.directed = false;
        self
    }

    /// Label of a graph head.
    pub fn head_label(&self, head: &GraphHead) -> String {
        self.head.render(&head.id, &head.label, &head.properties)
    }

    /// Label of a vertex.
    pub fn vertex_label(&self, vertex: &Vertex) -> String {
        self.vertex.render(&vertex.id, &vertex.label, &vertex.properties)
    }

    /// Label of an edge given the labels of its endpoints.
    pub fn edge_label(&self, edge: &Edge, source: &str, target: &str) -> String {
        let content = self.edge.render(&edge.id, &edge.label, &edge.properties);
        if self.directed {
            format!("{source}-[{content}]->{target}")
        } else if source <= target {
            format!("{source}-[{content}]-{target}")
        } else {
            format!("{target}-[{content}]-{source}")
        }
    }

    /// Canonical label of a logical graph.
    pub fn graph_label(&self, env: &ExecutionEnvironment, graph: &LogicalGraph) -> Result<String> {
        let id = graph.head().id;
        let labels = self.graph_labels(
            env,
            vec![graph.head().clone()],
            graph.vertices().to_vec(),
            graph.edges().to_vec(),
            move |_| vec![id],
        )?;
        Ok(labels.into_iter().next().unwrap_or_default())
    }

    /// Canonical label of a graph collection.
    pub fn collection_label(
        &self,
        env: &ExecutionEnvironment,
        collection: &GraphCollection,
    ) -> Result<String> {
        let mut labels = self.graph_labels(
            env,
            collection.heads().to_vec(),
            collection.vertices().to_vec(),
            collection.edges().to_vec(),
            |graphs| graphs.iter().copied().collect(),
        )?;
        labels.sort();
        Ok(labels.join("\n"))
    }

    /// One label per head. Vertex labels are broadcast to the edge step;
    /// element labels are grouped per graph id together with the head label.
    fn graph_labels<M>(
        &self,
        env: &ExecutionEnvironment,
        heads: Vec<GraphHead>,
        vertices: Vec<Vertex>,
        edges: Vec<Edge>,
        membership: M,
    ) -> Result<Vec<String>>
    where
        M: Fn(&BTreeSet<GraphId>) -> Vec<GraphId> + Clone + Send + Sync + 'static,
    {
        let labeling = *self;
        let vertex_labels: Arc<FxHashMap<VertexId, String>> = Arc::new(
            DataSet::from_vec(env, vertices.clone())
                .map(move |vertex: Vertex| (vertex.id, labeling.vertex_label(&vertex)))
                .broadcast()?
                .iter()
                .cloned()
                .collect(),
        );

        let lookup = Arc::clone(&vertex_labels);
        let vertex_membership = membership.clone();
        let vertex_parts = DataSet::from_vec(env, vertices).flat_map(move |vertex: Vertex| {
            let label = lookup.get(&vertex.id).cloned().unwrap_or_default();
            vertex_membership(&vertex.graph_ids)
                .into_iter()
                .map(move |graph| (graph, Part::Vertex(label.clone())))
        });

        let lookup = Arc::clone(&vertex_labels);
        let edge_parts = DataSet::from_vec(env, edges).flat_map(move |edge: Edge| {
            let source = lookup.get(&edge.source).map(String::as_str).unwrap_or_default();
            let target = lookup.get(&edge.target).map(String::as_str).unwrap_or_default();
            let label = labeling.edge_label(&edge, source, target);
            membership(&edge.graph_ids)
                .into_iter()
                .map(move |graph| (graph, Part::Edge(label.clone())))
        });

        let head_parts = DataSet::from_vec(env, heads)
            .map(move |head: GraphHead| (head.id, Part::Head(labeling.head_label(&head))));

        let labels = head_parts
            .union(vertex_parts)
            .union(edge_parts)
            .group_by_key()?
            .flat_map(|(_, parts): (GraphId, Vec<Part>)| assemble(parts))
            .collect()?;
        debug!(graphs = labels.len(), "canonical labels built");
        Ok(labels)
    }
}

/// Element label tagged with its kind.
#[derive(Clone, Debug)]
enum Part {
    Head(String),
    Vertex(String),
    Edge(String),
}

/// Builds `head[v...|e...]`; groups without a head belong to graphs
/// outside the input and yield nothing.
fn assemble(parts: Vec<Part>) -> Option<String> {
    let mut head = None;
    let mut vertices = Vec::new();
    let mut edges = Vec::new();
    for part in parts {
        match part {
            Part::Head(label) => head = Some(label),
            Part::Vertex(label) => vertices.push(label),
            Part::Edge(label) => edges.push(label),
        }
    }
    vertices.sort();
    edges.sort();
    head.map(|head| format!("{head}[{}|{}]", vertices.join(","), edges.join(",")))
}

/// Equality of two logical graphs by canonical label.
#[derive(Clone, Copy, Debug)]
pub struct GraphEquality {
    labeling: CanonicalLabeling,
}

impl GraphEquality {
    /// Creates the operator.
    pub fn new(labeling: CanonicalLabeling) -> Self {
        Self { labeling }
    }

    /// Labelling used for comparison.
    pub fn labeling(&self) -> CanonicalLabeling {
        self.labeling
    }

    /// Returns true when both graphs have the same canonical label.
    pub fn execute(
        &self,
        env: &ExecutionEnvironment,
        first: &LogicalGraph,
        second: &LogicalGraph,
    ) -> Result<bool> {
        let left = self.labeling.graph_label(env, first)?;
        let right = self.labeling.graph_label(env, second)?;
        let equal = left == right;
        debug!(equal, "graph equality");
        Ok(equal)
    }
}

/// Equality of two graph collections by canonical label.
#[derive(Clone, Copy, Debug)]
pub struct CollectionEquality {
    labeling: CanonicalLabeling,
}

impl CollectionEquality {
    /// Creates the operator.
    pub fn new(labeling: CanonicalLabeling) -> Self {
        Self { labeling }
    }

    /// Labelling used for comparison.
    pub fn labeling(&self) -> CanonicalLabeling {
        self.labeling
    }

    /// Returns true when both collections have the same canonical label.
    pub fn execute(
        &self,
        env: &ExecutionEnvironment,
        first: &GraphCollection,
        second: &GraphCollection,
    ) -> Result<bool> {
        let left = self.labeling.collection_label(env, first)?;
        let right = self.labeling.collection_label(env, second)?;
        let equal = left == right;
        debug!(equal, graphs = first.heads().len(), "collection equality");
        Ok(equal)
    }
}

/// Equality of two graph collections by their sets of graph ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectionEqualityByGraphIds;

impl CollectionEqualityByGraphIds {
    /// Creates the operator.
    pub fn new() -> Self {
        Self
    }

    /// Returns true when both collections hold exactly the same graph ids.
    pub fn execute(
        &self,
        env: &ExecutionEnvironment,
        first: &GraphCollection,
        second: &GraphCollection,
    ) -> Result<bool> {
        let ids = |collection: &GraphCollection| -> Result<BTreeSet<GraphId>> {
            Ok(DataSet::from_vec(env, collection.heads().to_vec())
                .map(|head: GraphHead| head.id)
                .distinct()?
                .collect()?
                .into_iter()
                .collect())
        };
        Ok(ids(first)? == ids(second)?)
    }
}
