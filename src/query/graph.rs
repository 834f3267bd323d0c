//! Query graphs and their construction from pattern text.
//!
//! [`QueryGraphBuilder`] is the single validation point: the text front end
//! ([`QueryHandler`]) lowers the parsed pattern into builder calls, so the
//! programmatic API and the pattern syntax enforce the same rules.

use std::collections::{BTreeSet, HashSet, VecDeque};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::query::ast::{MatchQuery, NodePattern, PathBounds, RelDirection, RelPattern};
use crate::query::embedding::{VarKind, VarLayout};
use crate::query::parser::parse_query;
use crate::query::predicate::Predicate;
use crate::types::{EpgmError, Result};

/// Direction constraint of a query edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EdgeDirection {
    /// Data edge must run from `source` to `target`.
    Directed,
    /// Data edge may run either way.
    Undirected,
}

/// Vertex of a query graph.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryVertex {
    /// Unique variable name.
    pub variable: String,
    /// Required label.
    pub label: Option<String>,
    /// Conjunction of predicates that only reference this vertex.
    pub predicate: Option<Predicate>,
}

/// Edge of a query graph.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryEdge {
    /// Unique variable name.
    pub variable: String,
    /// Source vertex variable.
    pub source: String,
    /// Target vertex variable.
    pub target: String,
    /// Required label (of every hop, for variable-length edges).
    pub label: Option<String>,
    /// Direction constraint.
    pub direction: EdgeDirection,
    /// Hop bounds of a variable-length edge.
    pub bounds: Option<PathBounds>,
    /// Conjunction of predicates that only reference this edge.
    pub predicate: Option<Predicate>,
}

impl QueryEdge {
    /// Returns true for variable-length edges.
    pub fn is_variable_length(&self) -> bool {
        self.bounds.is_some()
    }

    /// The endpoint opposite to `var`, if `var` is an endpoint.
    pub fn other_endpoint(&self, var: &str) -> Option<&str> {
        if self.source == var {
            Some(&self.target)
        } else if self.target == var {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Immutable, validated query graph.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryGraph {
    vertices: Vec<QueryVertex>,
    edges: Vec<QueryEdge>,
    variables: Vec<String>,
    conjuncts: Vec<Predicate>,
}

impl QueryGraph {
    /// Query vertices in declaration order.
    pub fn vertices(&self) -> &[QueryVertex] {
        &self.vertices
    }

    /// Query edges in declaration order.
    pub fn edges(&self) -> &[QueryEdge] {
        &self.edges
    }

    /// All variables in declaration order; this is the embedding slot order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Looks up a query vertex.
    pub fn vertex(&self, var: &str) -> Option<&QueryVertex> {
        self.vertices.iter().find(|v| v.variable == var)
    }

    /// Looks up a query edge.
    pub fn edge(&self, var: &str) -> Option<&QueryEdge> {
        self.edges.iter().find(|e| e.variable == var)
    }

    /// WHERE conjuncts spanning several variables (or none).
    pub fn conjuncts(&self) -> &[Predicate] {
        &self.conjuncts
    }

    /// Returns true when every vertex is reachable from every other one.
    pub fn is_connected(&self) -> bool {
        self.components().len() <= 1
    }

    /// Embedding slot layout.
    pub fn layout(&self) -> VarLayout {
        VarLayout::new(self.variables.iter().map(|var| {
            let kind = match self.edge(var) {
                Some(edge) if edge.is_variable_length() => VarKind::Path,
                Some(_) => VarKind::Edge,
                None => VarKind::Vertex,
            };
            (var.clone(), kind)
        }))
    }

    fn components(&self) -> Vec<BTreeSet<String>> {
        let mut adjacency: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for vertex in &self.vertices {
            adjacency.entry(vertex.variable.as_str()).or_default();
        }
        for edge in &self.edges {
            adjacency.entry(&edge.source).or_default().push(&edge.target);
            adjacency.entry(&edge.target).or_default().push(&edge.source);
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut components = Vec::new();
        for vertex in &self.vertices {
            if seen.contains(vertex.variable.as_str()) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut queue = VecDeque::from([vertex.variable.as_str()]);
            seen.insert(&vertex.variable);
            while let Some(var) = queue.pop_front() {
                component.insert(var.to_owned());
                for &next in adjacency.get(var).into_iter().flatten() {
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Declared {
    Vertex(usize),
    Edge(usize),
}

/// Incremental, validating constructor of a [`QueryGraph`].
///
/// Errors are deferred: the first one is reported by [`QueryGraphBuilder::build`].
#[derive(Debug, Default)]
pub struct QueryGraphBuilder {
    vertices: Vec<QueryVertex>,
    edges: Vec<QueryEdge>,
    variables: Vec<String>,
    declared: FxHashMap<String, Declared>,
    predicates: Vec<Predicate>,
    error: Option<EpgmError>,
}

impl QueryGraphBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, err: EpgmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Declares (or references) a vertex variable.
    ///
    /// Repeating a variable with no label or the same label is a reference;
    /// a different label is a conflicting redeclaration.
    pub fn vertex(mut self, var: &str, label: Option<&str>) -> Self {
        self.declare_vertex(var, label);
        self
    }

    fn declare_vertex(&mut self, var: &str, label: Option<&str>) {
        match self.declared.get(var).copied() {
            Some(Declared::Edge(_)) => {
                self.fail(EpgmError::duplicate(var, "name used for both a vertex and an edge"))
            }
            Some(Declared::Vertex(idx)) => match (self.vertices[idx].label.as_deref(), label) {
                (Some(existing), Some(new)) if existing != new => self.fail(EpgmError::duplicate(
                    var,
                    "vertex redeclared with a conflicting label",
                )),
                (None, Some(new)) => self.vertices[idx].label = Some(new.to_owned()),
                _ => {}
            },
            None => {
                self.declared
                    .insert(var.to_owned(), Declared::Vertex(self.vertices.len()));
                self.variables.push(var.to_owned());
                self.vertices.push(QueryVertex {
                    variable: var.to_owned(),
                    label: label.map(str::to_owned),
                    predicate: None,
                });
            }
        }
    }

    /// Declares a fixed-length edge from `source` to `target`.
    pub fn edge(
        mut self,
        var: &str,
        source: &str,
        target: &str,
        label: Option<&str>,
        direction: EdgeDirection,
    ) -> Self {
        self.declare_edge(var, source, target, label, direction, None);
        self
    }

    /// Declares a variable-length edge of `bounds.min..=bounds.max` hops.
    pub fn path(
        mut self,
        var: &str,
        source: &str,
        target: &str,
        label: Option<&str>,
        direction: EdgeDirection,
        bounds: PathBounds,
    ) -> Self {
        self.declare_edge(var, source, target, label, direction, Some(bounds));
        self
    }

    fn declare_edge(
        &mut self,
        var: &str,
        source: &str,
        target: &str,
        label: Option<&str>,
        direction: EdgeDirection,
        bounds: Option<PathBounds>,
    ) {
        match self.declared.get(var).copied() {
            Some(Declared::Edge(_)) => {
                self.fail(EpgmError::duplicate(var, "edge variable declared twice"));
                return;
            }
            Some(Declared::Vertex(_)) => {
                self.fail(EpgmError::duplicate(var, "name used for both a vertex and an edge"));
                return;
            }
            None => {}
        }
        if let Some(bounds) = bounds {
            if bounds.min < 1 || bounds.min > bounds.max {
                self.fail(EpgmError::UnsupportedPattern(format!(
                    "invalid path bounds {}..{} on '{var}'",
                    bounds.min, bounds.max
                )));
                return;
            }
        }
        self.declared
            .insert(var.to_owned(), Declared::Edge(self.edges.len()));
        self.variables.push(var.to_owned());
        self.edges.push(QueryEdge {
            variable: var.to_owned(),
            source: source.to_owned(),
            target: target.to_owned(),
            label: label.map(str::to_owned),
            direction,
            bounds,
            predicate: None,
        });
    }

    /// Adds a predicate that every embedding must satisfy.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    fn add_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    /// Validates the declarations and produces the query graph.
    pub fn build(self) -> Result<QueryGraph> {
        let QueryGraphBuilder {
            mut vertices,
            mut edges,
            variables,
            declared,
            predicates,
            error,
        } = self;
        if let Some(err) = error {
            return Err(err);
        }
        if vertices.is_empty() {
            return Err(EpgmError::UnsupportedPattern("pattern has no vertices".into()));
        }
        for edge in &edges {
            for endpoint in [&edge.source, &edge.target] {
                match declared.get(endpoint) {
                    Some(Declared::Vertex(_)) => {}
                    _ => return Err(EpgmError::unresolved(endpoint.as_str(), "edge endpoint")),
                }
            }
        }
        let mut conjuncts = Vec::new();
        let mut element_preds: FxHashMap<String, Vec<Predicate>> = FxHashMap::default();
        for conjunct in predicates.into_iter().flat_map(Predicate::into_conjuncts) {
            let vars = conjunct.variables();
            for var in &vars {
                match declared.get(var) {
                    None => return Err(EpgmError::unresolved(var.as_str(), "WHERE clause")),
                    Some(Declared::Edge(idx)) if edges[*idx].is_variable_length() => {
                        return Err(EpgmError::UnsupportedPattern(format!(
                            "predicate on variable-length edge '{var}': {conjunct}"
                        )))
                    }
                    Some(_) => {}
                }
            }
            match vars.iter().next() {
                Some(only) if vars.len() == 1 => {
                    element_preds.entry(only.clone()).or_default().push(conjunct)
                }
                _ => conjuncts.push(conjunct),
            }
        }
        for (var, preds) in element_preds {
            let predicate = Predicate::conjunction(preds);
            match declared.get(&var) {
                Some(Declared::Vertex(idx)) => vertices[*idx].predicate = predicate,
                Some(Declared::Edge(idx)) => edges[*idx].predicate = predicate,
                None => {}
            }
        }
        let graph = QueryGraph {
            vertices,
            edges,
            variables,
            conjuncts,
        };
        let components = graph.components();
        if components.len() > 1 {
            let parts: Vec<String> = components
                .iter()
                .map(|c| c.iter().cloned().collect::<Vec<_>>().join(","))
                .collect();
            return Err(EpgmError::UnsupportedPattern(format!(
                "disconnected pattern with components {{{}}}",
                parts.join("} {")
            )));
        }
        debug!(
            vertices = graph.vertices.len(),
            edges = graph.edges.len(),
            conjuncts = graph.conjuncts.len(),
            "query graph built"
        );
        Ok(graph)
    }
}

/// Text front end: parses a pattern and builds its [`QueryGraph`].
#[derive(Clone, Debug)]
pub struct QueryHandler {
    query: String,
    graph: QueryGraph,
}

impl QueryHandler {
    /// Parses and validates `query`.
    pub fn new(query: &str) -> Result<Self> {
        let parsed = parse_query(query)?;
        let graph = lower(&parsed)?;
        Ok(Self {
            query: query.to_owned(),
            graph,
        })
    }

    /// The original pattern text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The validated query graph.
    pub fn query_graph(&self) -> &QueryGraph {
        &self.graph
    }

    /// Consumes the handler, returning the query graph.
    pub fn into_query_graph(self) -> QueryGraph {
        self.graph
    }
}

struct Names {
    taken: HashSet<String>,
    vertices: usize,
    edges: usize,
}

impl Names {
    fn fresh(&mut self, vertex: bool) -> String {
        loop {
            let name = if vertex {
                self.vertices += 1;
                format!("__v{}", self.vertices - 1)
            } else {
                self.edges += 1;
                format!("__e{}", self.edges - 1)
            };
            if self.taken.insert(name.clone()) {
                return name;
            }
        }
    }
}

fn user_variables(query: &MatchQuery) -> HashSet<String> {
    let mut taken = HashSet::new();
    for path in &query.paths {
        taken.extend(path.start.var.clone());
        for (rel, node) in &path.steps {
            taken.extend(rel.var.clone());
            taken.extend(node.var.clone());
        }
    }
    taken
}

fn lower(query: &MatchQuery) -> Result<QueryGraph> {
    let mut names = Names {
        taken: user_variables(query),
        vertices: 0,
        edges: 0,
    };
    let mut builder = QueryGraphBuilder::new();
    for path in &query.paths {
        let mut previous = node_name(&mut names, &path.start);
        lower_node(&mut builder, &previous, &path.start);
        for (rel, node) in &path.steps {
            let next = node_name(&mut names, node);
            lower_rel(&mut builder, &mut names, rel, &previous, &next);
            lower_node(&mut builder, &next, node);
            previous = next;
        }
    }
    if let Some(predicate) = &query.predicate {
        builder.add_predicate(predicate.clone());
    }
    builder.build()
}

fn node_name(names: &mut Names, node: &NodePattern) -> String {
    node.var.clone().unwrap_or_else(|| names.fresh(true))
}

fn lower_node(builder: &mut QueryGraphBuilder, var: &str, node: &NodePattern) {
    builder.declare_vertex(var, node.label.as_deref());
    for (key, value) in &node.properties {
        builder.add_predicate(Predicate::property_equals(var, key, value.clone()));
    }
}

fn lower_rel(
    builder: &mut QueryGraphBuilder,
    names: &mut Names,
    rel: &RelPattern,
    previous: &str,
    next: &str,
) {
    let var = rel.var.clone().unwrap_or_else(|| names.fresh(false));
    let (source, target, direction) = match rel.direction {
        RelDirection::Outgoing => (previous, next, EdgeDirection::Directed),
        RelDirection::Incoming => (next, previous, EdgeDirection::Directed),
        RelDirection::Undirected => (previous, next, EdgeDirection::Undirected),
    };
    builder.declare_edge(&var, source, target, rel.label.as_deref(), direction, rel.bounds);
    for (key, value) in &rel.properties {
        builder.add_predicate(Predicate::property_equals(&var, key, value.clone()));
    }
}
