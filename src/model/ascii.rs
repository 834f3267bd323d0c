//! Loader for a compact ASCII graph notation.
//!
//! ```text
//! g1:Community{area="Shire"}[
//!     (frodo:Hobbit{name="Frodo"})-[:knows]->(sam:Hobbit);
//!     (sam)-[:knows]->(frodo)
//! ]
//! g2[(frodo)]
//! (gandalf:Wizard)-[:visits]->(frodo)
//! ```
//!
//! A document is a sequence of graph declarations and free paths, optionally
//! separated by `;` or `,`. Paths use the same node and edge syntax as
//! `MATCH` patterns. Variables are global to the document: repeating a
//! variable refers to the same element, so one vertex can belong to several
//! graphs. Anonymous elements are always fresh. Elements outside any graph
//! declaration belong only to the database graph.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use nom::branch::alt;
use nom::combinator::{cut, map, opt, value};
use nom::error::context;
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::Parser;

use crate::model::{Edge, GraphCollection, GraphHead, LogicalGraph, Properties, PropertyValue, Vertex};
use crate::query::ast::{NodePattern, PathPattern, RelDirection};
use crate::query::parser::{self, PResult};
use crate::types::{EdgeId, EpgmError, GraphId, IdGenerator, Result, VertexId};

const DATABASE_LABEL: &str = "db";

struct GraphDecl {
    var: Option<String>,
    label: Option<String>,
    properties: Vec<(String, PropertyValue)>,
    paths: Vec<PathPattern>,
}

enum Statement {
    Graph(GraphDecl),
    Path(PathPattern),
}

fn separator(input: &str) -> PResult<'_, ()> {
    value((), alt((parser::sym(';'), parser::sym(',')))).parse(input)
}

fn graph_decl(input: &str) -> PResult<'_, GraphDecl> {
    let (input, var) = opt(parser::variable).parse(input)?;
    let (input, label) = opt(preceded(parser::sym(':'), parser::identifier)).parse(input)?;
    let (input, properties) = opt(parser::property_map).parse(input)?;
    let (input, paths) = delimited(
        parser::sym('['),
        many0(delimited(
            many0(separator),
            parser::path_pattern,
            many0(separator),
        )),
        cut(context("expected ']'", parser::sym(']'))),
    )
    .parse(input)?;
    Ok((
        input,
        GraphDecl {
            var: var.map(str::to_owned),
            label: label.map(str::to_owned),
            properties: properties.unwrap_or_default(),
            paths,
        },
    ))
}

fn statement(input: &str) -> PResult<'_, Statement> {
    alt((
        map(parser::path_pattern, Statement::Path),
        map(graph_decl, Statement::Graph),
    ))
    .parse(input)
}

fn document(input: &str) -> PResult<'_, Vec<Statement>> {
    let (input, statements) =
        many0(delimited(many0(separator), statement, many0(separator))).parse(input)?;
    let (input, _) = parser::end_of_input(input)?;
    Ok((input, statements))
}

/// Graphs, vertices and edges declared by one ASCII document.
#[derive(Debug)]
pub struct AsciiGraphLoader {
    ids: IdGenerator,
    database_id: GraphId,
    heads: Vec<GraphHead>,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    graph_vars: HashMap<String, usize>,
    vertex_vars: HashMap<String, usize>,
    edge_vars: HashMap<String, usize>,
}

impl AsciiGraphLoader {
    /// Parses `text`, drawing fresh ids from a random-prefixed generator.
    pub fn load(text: &str) -> Result<Self> {
        Self::load_with_ids(text, IdGenerator::new())
    }

    /// Parses `text`, drawing ids from `ids`.
    pub fn load_with_ids(text: &str, mut ids: IdGenerator) -> Result<Self> {
        let statements = parser::finish(text, document)?;
        let mut loader = Self {
            database_id: ids.graph_id(),
            ids,
            heads: Vec::new(),
            vertices: Vec::new(),
            edges: Vec::new(),
            graph_vars: HashMap::new(),
            vertex_vars: HashMap::new(),
            edge_vars: HashMap::new(),
        };
        for statement in statements {
            match statement {
                Statement::Graph(decl) => loader.add_graph(decl)?,
                Statement::Path(path) => loader.add_path(&path, None)?,
            }
        }
        Ok(loader)
    }

    fn add_graph(&mut self, decl: GraphDecl) -> Result<()> {
        let graph = match decl.var.as_ref().and_then(|var| self.graph_vars.get(var)) {
            Some(&idx) => {
                let head = &self.heads[idx];
                if decl.label.as_deref().is_some_and(|label| label != head.label) {
                    return Err(EpgmError::duplicate(
                        decl.var.unwrap_or_default(),
                        "graph redeclared with a different label",
                    ));
                }
                head.id
            }
            None => {
                let mut head = GraphHead::new(self.ids.graph_id(), decl.label.unwrap_or_default());
                head.properties = decl.properties.into_iter().collect();
                let id = head.id;
                if let Some(var) = decl.var {
                    self.graph_vars.insert(var, self.heads.len());
                }
                self.heads.push(head);
                id
            }
        };
        for path in &decl.paths {
            self.add_path(path, Some(graph))?;
        }
        Ok(())
    }

    fn add_path(&mut self, path: &PathPattern, graph: Option<GraphId>) -> Result<()> {
        let mut previous = self.add_vertex(&path.start, graph)?;
        for (rel, node) in &path.steps {
            let next = self.add_vertex(node, graph)?;
            if rel.bounds.is_some() {
                return Err(EpgmError::InvalidGraph(
                    "variable-length edges cannot be declared in graph data".into(),
                ));
            }
            let (source, target) = match rel.direction {
                RelDirection::Incoming => (next, previous),
                RelDirection::Outgoing | RelDirection::Undirected => (previous, next),
            };
            let (source, target) = (self.vertices[source].id, self.vertices[target].id);
            let properties: Properties = rel.properties.iter().cloned().collect();
            match rel.var.as_ref().and_then(|var| self.edge_vars.get(var)) {
                Some(&idx) => {
                    let edge = &mut self.edges[idx];
                    let var = rel.var.as_deref().unwrap_or_default();
                    if edge.source != source || edge.target != target {
                        return Err(EpgmError::duplicate(
                            var,
                            "edge referenced with different endpoints",
                        ));
                    }
                    if rel.label.as_deref().is_some_and(|label| label != edge.label)
                        || (!properties.is_empty() && properties != edge.properties)
                    {
                        return Err(EpgmError::duplicate(
                            var,
                            "edge redeclared with different data",
                        ));
                    }
                    edge.graph_ids.extend(graph);
                }
                None => {
                    if rel.var.as_ref().is_some_and(|var| self.vertex_vars.contains_key(var)) {
                        return Err(EpgmError::duplicate(
                            rel.var.as_deref().unwrap_or_default(),
                            "name used for both a vertex and an edge",
                        ));
                    }
                    let mut edge = Edge::new(
                        self.ids.edge_id(),
                        rel.label.clone().unwrap_or_default(),
                        source,
                        target,
                    );
                    edge.properties = properties;
                    edge.graph_ids.extend(graph);
                    if let Some(var) = &rel.var {
                        self.edge_vars.insert(var.clone(), self.edges.len());
                    }
                    self.edges.push(edge);
                }
            }
            previous = next;
        }
        Ok(())
    }

    fn add_vertex(&mut self, node: &NodePattern, graph: Option<GraphId>) -> Result<usize> {
        let properties: Properties = node.properties.iter().cloned().collect();
        if let Some(&idx) = node.var.as_ref().and_then(|var| self.vertex_vars.get(var)) {
            let vertex = &mut self.vertices[idx];
            let var = node.var.as_deref().unwrap_or_default();
            if node.label.as_deref().is_some_and(|label| label != vertex.label)
                || (!properties.is_empty() && properties != vertex.properties)
            {
                return Err(EpgmError::duplicate(var, "vertex redeclared with different data"));
            }
            vertex.graph_ids.extend(graph);
            return Ok(idx);
        }
        if node.var.as_ref().is_some_and(|var| self.edge_vars.contains_key(var)) {
            return Err(EpgmError::duplicate(
                node.var.as_deref().unwrap_or_default(),
                "name used for both a vertex and an edge",
            ));
        }
        let mut vertex = Vertex::new(self.ids.vertex_id(), node.label.clone().unwrap_or_default());
        vertex.properties = properties;
        vertex.graph_ids.extend(graph);
        let idx = self.vertices.len();
        if let Some(var) = &node.var {
            self.vertex_vars.insert(var.clone(), idx);
        }
        self.vertices.push(vertex);
        Ok(idx)
    }

    /// Vertex bound to `var`.
    pub fn vertex(&self, var: &str) -> Option<&Vertex> {
        self.vertex_vars.get(var).map(|&idx| &self.vertices[idx])
    }

    /// Edge bound to `var`.
    pub fn edge(&self, var: &str) -> Option<&Edge> {
        self.edge_vars.get(var).map(|&idx| &self.edges[idx])
    }

    /// Graph head bound to `var`.
    pub fn graph_head(&self, var: &str) -> Option<&GraphHead> {
        self.graph_vars.get(var).map(|&idx| &self.heads[idx])
    }

    /// Id of the vertex bound to `var`.
    pub fn vertex_id(&self, var: &str) -> Option<VertexId> {
        self.vertex(var).map(|v| v.id)
    }

    /// Id of the edge bound to `var`.
    pub fn edge_id(&self, var: &str) -> Option<EdgeId> {
        self.edge(var).map(|e| e.id)
    }

    /// The graph declared as `var`.
    pub fn logical_graph(&self, var: &str) -> Result<LogicalGraph> {
        let head = self
            .graph_head(var)
            .ok_or_else(|| EpgmError::InvalidGraph(format!("unknown graph variable '{var}'")))?;
        let id = head.id;
        LogicalGraph::new(
            head.clone(),
            self.vertices
                .iter()
                .filter(|v| v.graph_ids.contains(&id))
                .cloned()
                .collect(),
            self.edges
                .iter()
                .filter(|e| e.graph_ids.contains(&id))
                .cloned()
                .collect(),
        )
    }

    /// Every vertex and edge of the document in one graph labelled `db`.
    pub fn database_graph(&self) -> Result<LogicalGraph> {
        let head = GraphHead::new(self.database_id, DATABASE_LABEL);
        LogicalGraph::new(head, self.vertices.clone(), self.edges.clone())
    }

    /// The graphs declared as `vars` in one collection; duplicates collapse.
    pub fn graph_collection(&self, vars: &[&str]) -> Result<GraphCollection> {
        let mut heads = Vec::new();
        let mut ids = BTreeSet::new();
        for var in vars {
            let head = self.graph_head(var).ok_or_else(|| {
                EpgmError::InvalidGraph(format!("unknown graph variable '{var}'"))
            })?;
            if ids.insert(head.id) {
                heads.push(head.clone());
            }
        }
        let vertices = self
            .vertices
            .iter()
            .filter(|v| !v.graph_ids.is_disjoint(&ids))
            .map(|v| restrict_vertex(v, &ids))
            .collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| !e.graph_ids.is_disjoint(&ids))
            .map(|e| restrict_edge(e, &ids))
            .collect();
        GraphCollection::new(heads, vertices, edges)
    }

    /// All declared graphs in declaration order.
    pub fn collection(&self) -> Result<GraphCollection> {
        GraphCollection::new(self.heads.clone(), self.vertices.clone(), self.edges.clone())
    }
}

impl FromStr for AsciiGraphLoader {
    type Err = EpgmError;

    fn from_str(text: &str) -> Result<Self> {
        Self::load(text)
    }
}

fn restrict_vertex(vertex: &Vertex, ids: &BTreeSet<GraphId>) -> Vertex {
    let mut vertex = vertex.clone();
    vertex.graph_ids.retain(|id| ids.contains(id));
    vertex
}

fn restrict_edge(edge: &Edge, ids: &BTreeSet<GraphId>) -> Edge {
    let mut edge = edge.clone();
    edge.graph_ids.retain(|id| ids.contains(id));
    edge
}
