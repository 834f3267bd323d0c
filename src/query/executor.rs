//! Executes physical plans over the dataflow substrate.
//!
//! Every plan node becomes a lazy [`DataSet`] of embeddings; joins and the
//! graph index are the only pipeline breakers. The graph index is built from
//! broadcast vertex and edge sets and shared with every operator closure.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dataflow::{Broadcast, DataSet, ExecutionEnvironment};
use crate::model::{Edge, LogicalGraph, PropertyValue, Vertex};
use crate::query::ast::PathBounds;
use crate::query::embedding::{Binding, Embedding, VarLayout};
use crate::query::graph::{EdgeDirection, QueryGraph};
use crate::query::matching::MatchStrategies;
use crate::query::physical::{BuildSide, Dir, PhysicalNode, PhysicalOp, PhysicalPlan};
use crate::query::predicate::{Bindings, Predicate};
use crate::types::{EdgeId, EpgmError, Result, VertexId};

/// Adjacency and element lookup over one logical graph.
#[derive(Debug)]
pub struct GraphIndex {
    vertices: Broadcast<Vertex>,
    edges: Broadcast<Edge>,
    vertex_pos: FxHashMap<VertexId, usize>,
    edge_pos: FxHashMap<EdgeId, usize>,
    outgoing: FxHashMap<VertexId, Vec<usize>>,
    incoming: FxHashMap<VertexId, Vec<usize>>,
}

impl GraphIndex {
    /// Broadcasts the elements of `graph` and indexes them.
    pub fn build(env: &ExecutionEnvironment, graph: &LogicalGraph) -> Result<Self> {
        let vertices = env.from_vec(graph.vertices().to_vec()).broadcast()?;
        let edges = env.from_vec(graph.edges().to_vec()).broadcast()?;
        let vertex_pos = vertices
            .iter()
            .enumerate()
            .map(|(pos, vertex)| (vertex.id, pos))
            .collect();
        let mut edge_pos = FxHashMap::default();
        let mut outgoing: FxHashMap<VertexId, Vec<usize>> = FxHashMap::default();
        let mut incoming: FxHashMap<VertexId, Vec<usize>> = FxHashMap::default();
        for (pos, edge) in edges.iter().enumerate() {
            edge_pos.insert(edge.id, pos);
            outgoing.entry(edge.source).or_default().push(pos);
            incoming.entry(edge.target).or_default().push(pos);
        }
        debug!(
            vertices = vertices.len(),
            edges = edges.len(),
            "graph index built"
        );
        Ok(Self {
            vertices,
            edges,
            vertex_pos,
            edge_pos,
            outgoing,
            incoming,
        })
    }

    /// All vertices.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Looks up a vertex.
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertex_pos.get(&id).map(|&pos| &self.vertices[pos])
    }

    /// Looks up an edge.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_pos.get(&id).map(|&pos| &self.edges[pos])
    }

    /// Edges incident to `vertex` in direction `dir`, paired with the
    /// opposite endpoint. Self-loops are reported once for [`Dir::Both`].
    pub fn adjacent(&self, vertex: VertexId, dir: Dir) -> Vec<(&Edge, VertexId)> {
        let mut out = Vec::new();
        if matches!(dir, Dir::Out | Dir::Both) {
            for &pos in self.outgoing.get(&vertex).into_iter().flatten() {
                let edge = &self.edges[pos];
                out.push((edge, edge.target));
            }
        }
        if matches!(dir, Dir::In | Dir::Both) {
            for &pos in self.incoming.get(&vertex).into_iter().flatten() {
                let edge = &self.edges[pos];
                if dir == Dir::Both && edge.source == edge.target {
                    continue;
                }
                out.push((edge, edge.source));
            }
        }
        out
    }

    /// Edge-simple walks from `start` with a hop count within `bounds`, as
    /// `(edges, vertices reached after each hop)`.
    pub fn walks(
        &self,
        start: VertexId,
        dir: Dir,
        label: Option<&str>,
        bounds: PathBounds,
    ) -> Vec<(Vec<EdgeId>, Vec<VertexId>)> {
        let mut out = Vec::new();
        let mut stack = vec![(start, Vec::new(), Vec::new())];
        while let Some((at, edges, vertices)) = stack.pop() {
            let hops = edges.len() as u32;
            if hops >= bounds.min {
                out.push((edges.clone(), vertices.clone()));
            }
            if hops >= bounds.max {
                continue;
            }
            for (edge, next) in self.adjacent(at, dir) {
                if !label_matches(&edge.label, label) || edges.contains(&edge.id) {
                    continue;
                }
                let mut next_edges = edges.clone();
                next_edges.push(edge.id);
                let mut next_vertices = vertices.clone();
                next_vertices.push(next);
                stack.push((next, next_edges, next_vertices));
            }
        }
        out
    }
}

fn label_matches(actual: &str, required: Option<&str>) -> bool {
    required.map_or(true, |label| label == actual)
}

/// Builds the path binding of a walk; `reverse` flips it so it runs from the
/// query edge's source to its target.
fn path_binding(mut edges: Vec<EdgeId>, mut reached: Vec<VertexId>, reverse: bool) -> Binding {
    reached.pop();
    if reverse {
        edges.reverse();
        reached.reverse();
    }
    Binding::Path {
        edges,
        vertices: reached,
    }
}

struct Context {
    index: GraphIndex,
    layout: VarLayout,
    strategies: MatchStrategies,
    cached_keys: Vec<Vec<String>>,
    edge_sources: FxHashMap<usize, usize>,
}

impl Context {
    fn slot(&self, var: &str) -> Result<usize> {
        self.layout
            .slot(var)
            .ok_or_else(|| EpgmError::Execution(format!("plan references unknown variable '{var}'")))
    }

    fn bind_vertex(&self, embedding: Embedding, slot: usize, vertex: &Vertex) -> Embedding {
        let embedding = embedding.bind(slot, Binding::Vertex(vertex.id));
        self.cache(embedding, slot, |key| vertex.properties.get(key))
    }

    fn bind_edge(&self, embedding: Embedding, slot: usize, edge: &Edge) -> Embedding {
        let embedding = embedding.bind(slot, Binding::Edge(edge.id));
        self.cache(embedding, slot, |key| edge.properties.get(key))
    }

    fn cache<'a>(
        &self,
        mut embedding: Embedding,
        slot: usize,
        lookup: impl Fn(&str) -> Option<&'a PropertyValue>,
    ) -> Embedding {
        for key in &self.cached_keys[slot] {
            if let Some(value) = lookup(key) {
                embedding = embedding.with_property(slot, key, value.clone());
            }
        }
        embedding
    }

    fn accepts(&self, embedding: &Embedding, predicate: Option<&Predicate>) -> bool {
        predicate.map_or(true, |p| {
            p.accepts(&Row {
                embedding,
                context: self,
            })
        })
    }
}

/// Predicate view of one embedding; properties come from the embedding's
/// cache or, failing that, from the graph index.
struct Row<'a> {
    embedding: &'a Embedding,
    context: &'a Context,
}

impl Bindings for Row<'_> {
    fn property(&self, var: &str, key: &str) -> Option<PropertyValue> {
        let slot = self.context.layout.slot(var)?;
        if let Some(value) = self.embedding.cached_property(slot, key) {
            return Some(value.clone());
        }
        match self.embedding.binding(slot)? {
            Binding::Vertex(id) => self.context.index.vertex(*id)?.properties.get(key).cloned(),
            Binding::Edge(id) => self.context.index.edge(*id)?.properties.get(key).cloned(),
            Binding::Path { .. } => None,
        }
    }

    fn element(&self, var: &str) -> Option<&Binding> {
        self.embedding.binding(self.context.layout.slot(var)?)
    }
}

/// Runs physical plans against one logical graph.
pub struct PlanExecutor {
    env: ExecutionEnvironment,
    context: Arc<Context>,
}

impl PlanExecutor {
    /// Indexes `graph` for plans over `query`.
    pub fn new(
        env: &ExecutionEnvironment,
        graph: &LogicalGraph,
        query: &QueryGraph,
        strategies: MatchStrategies,
    ) -> Result<Self> {
        let layout = query.layout();
        let mut cached_keys = vec![Vec::new(); layout.len()];
        for conjunct in query.conjuncts() {
            for (var, key) in conjunct.property_refs() {
                if let Some(slot) = layout.slot(&var) {
                    if !cached_keys[slot].contains(&key) {
                        cached_keys[slot].push(key);
                    }
                }
            }
        }
        let mut edge_sources = FxHashMap::default();
        for edge in query.edges() {
            if let (Some(edge_slot), Some(source_slot)) =
                (layout.slot(&edge.variable), layout.slot(&edge.source))
            {
                edge_sources.insert(edge_slot, source_slot);
            }
        }
        Ok(Self {
            env: env.clone(),
            context: Arc::new(Context {
                index: GraphIndex::build(env, graph)?,
                layout,
                strategies,
                cached_keys,
                edge_sources,
            }),
        })
    }

    /// Runs `plan` and collects its embeddings.
    pub fn execute(&self, plan: &PhysicalPlan) -> Result<Vec<Embedding>> {
        let embeddings = self.build(&plan.root)?.collect()?;
        debug!(embeddings = embeddings.len(), "plan executed");
        Ok(embeddings)
    }

    fn build(&self, node: &PhysicalNode) -> Result<DataSet<Embedding>> {
        debug!(op = node.op.name(), "stage constructed");
        let ctx = Arc::clone(&self.context);
        let width = ctx.layout.len();
        match &node.op {
            PhysicalOp::VertexScan {
                var,
                label,
                predicate,
            } => {
                let slot = ctx.slot(var)?;
                let label = label.clone();
                let predicate = predicate.clone();
                let positions: Vec<usize> = (0..ctx.index.vertices().len()).collect();
                Ok(self.env.from_vec(positions).flat_map(move |pos| {
                    let vertex = &ctx.index.vertices()[pos];
                    if !label_matches(&vertex.label, label.as_deref()) {
                        return None;
                    }
                    let embedding = ctx.bind_vertex(Embedding::new(width), slot, vertex);
                    ctx.accepts(&embedding, predicate.as_ref()).then_some(embedding)
                }))
            }
            PhysicalOp::EdgeScan {
                edge,
                source,
                target,
                label,
                direction,
                bounds,
                predicate,
            } => {
                let edge_slot = ctx.slot(edge)?;
                let source_slot = ctx.slot(source)?;
                let target_slot = ctx.slot(target)?;
                let label = label.clone();
                let predicate = predicate.clone();
                let direction = *direction;
                match *bounds {
                    None => {
                        let positions: Vec<usize> = (0..ctx.index.edges().len()).collect();
                        Ok(self.env.from_vec(positions).flat_map(move |pos| {
                            let edge = &ctx.index.edges()[pos];
                            let mut out = Vec::new();
                            if !label_matches(&edge.label, label.as_deref()) {
                                return out;
                            }
                            let mut orientations = vec![(edge.source, edge.target)];
                            if direction == EdgeDirection::Undirected && edge.source != edge.target {
                                orientations.push((edge.target, edge.source));
                            }
                            for (from, to) in orientations {
                                if source_slot == target_slot && from != to {
                                    continue;
                                }
                                let (Some(from), Some(to)) =
                                    (ctx.index.vertex(from), ctx.index.vertex(to))
                                else {
                                    continue;
                                };
                                let embedding = ctx.bind_vertex(Embedding::new(width), source_slot, from);
                                let embedding = ctx.bind_vertex(embedding, target_slot, to);
                                let embedding = ctx.bind_edge(embedding, edge_slot, edge);
                                if ctx.accepts(&embedding, predicate.as_ref())
                                    && embedding.satisfies(ctx.strategies)
                                {
                                    out.push(embedding);
                                }
                            }
                            out
                        }))
                    }
                    Some(bounds) => {
                        let dir = match direction {
                            EdgeDirection::Directed => Dir::Out,
                            EdgeDirection::Undirected => Dir::Both,
                        };
                        let positions: Vec<usize> = (0..ctx.index.vertices().len()).collect();
                        Ok(self.env.from_vec(positions).flat_map(move |pos| {
                            let start = &ctx.index.vertices()[pos];
                            let mut out = Vec::new();
                            for (edges, reached) in
                                ctx.index.walks(start.id, dir, label.as_deref(), bounds)
                            {
                                let Some(end) = reached.last().and_then(|&id| ctx.index.vertex(id))
                                else {
                                    continue;
                                };
                                if source_slot == target_slot && end.id != start.id {
                                    continue;
                                }
                                let embedding = ctx.bind_vertex(Embedding::new(width), source_slot, start);
                                let embedding = ctx
                                    .bind_vertex(embedding, target_slot, end)
                                    .bind(edge_slot, path_binding(edges, reached, false));
                                if embedding.satisfies(ctx.strategies) {
                                    out.push(embedding);
                                }
                            }
                            out
                        }))
                    }
                }
            }
            PhysicalOp::Expand {
                from,
                edge,
                to,
                dir,
                label,
                bounds,
                edge_predicate,
                to_label,
                to_predicate,
                closing,
            } => {
                let child = self.build(input(node, 0)?)?;
                let from_slot = ctx.slot(from)?;
                let edge_slot = ctx.slot(edge)?;
                let to_slot = ctx.slot(to)?;
                let reverse = ctx.edge_sources.get(&edge_slot) != Some(&from_slot);
                let dir = *dir;
                let bounds = *bounds;
                let closing = *closing;
                let label = label.clone();
                let edge_predicate = edge_predicate.clone();
                let to_label = to_label.clone();
                let to_predicate = to_predicate.clone();
                Ok(child.flat_map(move |embedding: Embedding| {
                    let mut out = Vec::new();
                    let Some(from_id) = embedding.vertex(from_slot) else {
                        return out;
                    };
                    let existing = if closing { embedding.vertex(to_slot) } else { None };
                    let reached_ok = |id: VertexId| {
                        if closing && existing != Some(id) {
                            return None;
                        }
                        ctx.index
                            .vertex(id)
                            .filter(|v| label_matches(&v.label, to_label.as_deref()))
                    };
                    let mut emit = |candidate: Embedding| {
                        if ctx.accepts(&candidate, to_predicate.as_ref())
                            && candidate.satisfies(ctx.strategies)
                        {
                            out.push(candidate);
                        }
                    };
                    match bounds {
                        None => {
                            for (data_edge, next) in ctx.index.adjacent(from_id, dir) {
                                if !label_matches(&data_edge.label, label.as_deref()) {
                                    continue;
                                }
                                let Some(to_vertex) = reached_ok(next) else {
                                    continue;
                                };
                                let candidate = ctx.bind_edge(embedding.clone(), edge_slot, data_edge);
                                if !ctx.accepts(&candidate, edge_predicate.as_ref()) {
                                    continue;
                                }
                                emit(ctx.bind_vertex(candidate, to_slot, to_vertex));
                            }
                        }
                        Some(bounds) => {
                            for (edges, reached) in
                                ctx.index.walks(from_id, dir, label.as_deref(), bounds)
                            {
                                let Some(to_vertex) = reached.last().and_then(|&id| reached_ok(id))
                                else {
                                    continue;
                                };
                                let candidate = embedding
                                    .clone()
                                    .bind(edge_slot, path_binding(edges, reached, reverse));
                                emit(ctx.bind_vertex(candidate, to_slot, to_vertex));
                            }
                        }
                    }
                    out
                }))
            }
            PhysicalOp::Join { shared, build } => {
                let left = self.build(input(node, 0)?)?;
                let right = self.build(input(node, 1)?)?;
                let slots = shared
                    .iter()
                    .map(|var| ctx.slot(var))
                    .collect::<Result<Vec<usize>>>()?;
                let probe_slots = slots.clone();
                let (probe, hashed, probe_is_left) = match build {
                    BuildSide::Right => (left, right, true),
                    BuildSide::Left => (right, left, false),
                };
                let joined = probe.join(
                    hashed,
                    move |embedding: &Embedding| embedding.key(&probe_slots),
                    move |embedding: &Embedding| embedding.key(&slots),
                )?;
                Ok(joined.flat_map(move |(probe, hashed)| {
                    let merged = if probe_is_left {
                        probe.merge(&hashed)
                    } else {
                        hashed.merge(&probe)
                    };
                    merged.satisfies(ctx.strategies).then_some(merged)
                }))
            }
            PhysicalOp::Filter { predicate, .. } => {
                let child = self.build(input(node, 0)?)?;
                let predicate = predicate.clone();
                Ok(child.filter(move |embedding| ctx.accepts(embedding, Some(&predicate))))
            }
            PhysicalOp::Projection { vars } => {
                let child = self.build(input(node, 0)?)?;
                let slots = vars
                    .iter()
                    .map(|var| ctx.slot(var))
                    .collect::<Result<Vec<usize>>>()?;
                Ok(child.map(move |embedding| embedding.project(&slots)))
            }
        }
    }
}

fn input(node: &PhysicalNode, idx: usize) -> Result<&PhysicalNode> {
    node.inputs.get(idx).ok_or_else(|| {
        EpgmError::Execution(format!("{} is missing input {idx}", node.op.name()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ascii::AsciiGraphLoader;
    use crate::query::graph::QueryHandler;
    use crate::query::matching::MatchStrategy;

    const HOMOMORPHISM: MatchStrategies = MatchStrategies {
        vertex: MatchStrategy::Homomorphism,
        edge: MatchStrategy::Homomorphism,
    };

    fn env() -> ExecutionEnvironment {
        ExecutionEnvironment::new(2).expect("pool")
    }

    fn chain() -> (AsciiGraphLoader, LogicalGraph) {
        let loader =
            AsciiGraphLoader::load("g[(a:N)-[e1:x]->(b:N)-[e2:x]->(c:N)-[e3:y]->(a)]").expect("load");
        let graph = loader.logical_graph("g").expect("graph");
        (loader, graph)
    }

    #[test]
    fn adjacency_reports_self_loops_once() {
        let loader = AsciiGraphLoader::load("g[(a)-[l:x]->(a)-[e:x]->(b)]").expect("load");
        let graph = loader.logical_graph("g").expect("graph");
        let index = GraphIndex::build(&env(), &graph).expect("index");
        let a = loader.vertex_id("a").expect("a");
        assert_eq!(index.adjacent(a, Dir::Out).len(), 2);
        assert_eq!(index.adjacent(a, Dir::In).len(), 1);
        assert_eq!(index.adjacent(a, Dir::Both).len(), 2);
    }

    #[test]
    fn walks_never_repeat_edges() {
        let (loader, graph) = chain();
        let index = GraphIndex::build(&env(), &graph).expect("index");
        let a = loader.vertex_id("a").expect("a");
        let walks = index.walks(a, Dir::Out, None, PathBounds { min: 1, max: 10 });
        assert_eq!(walks.len(), 3);
        assert!(walks.iter().all(|(edges, reached)| edges.len() == reached.len()));
        let labeled = index.walks(a, Dir::Out, Some("x"), PathBounds { min: 2, max: 2 });
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].1.last().copied(), loader.vertex_id("c"));
    }

    #[test]
    fn variable_length_edge_scan_binds_paths() {
        let (loader, graph) = chain();
        let query = QueryHandler::new("MATCH (s)-[p:x*1..2]->(t)").expect("valid");
        let plan = PhysicalPlan::new(
            PhysicalNode::new(PhysicalOp::EdgeScan {
                edge: "p".into(),
                source: "s".into(),
                target: "t".into(),
                label: Some("x".into()),
                direction: EdgeDirection::Directed,
                bounds: Some(PathBounds { min: 1, max: 2 }),
                predicate: None,
            }),
            query.query_graph().variables().to_vec(),
        );
        let executor =
            PlanExecutor::new(&env(), &graph, query.query_graph(), HOMOMORPHISM).expect("executor");
        let embeddings = executor.execute(&plan).expect("execute");
        assert_eq!(embeddings.len(), 3);
        let two_hop = embeddings
            .iter()
            .find(|e| matches!(e.binding(1), Some(Binding::Path { edges, .. }) if edges.len() == 2))
            .expect("two-hop path");
        assert_eq!(two_hop.vertex(0), loader.vertex_id("a"));
        assert_eq!(two_hop.vertex(2), loader.vertex_id("c"));
        assert_eq!(
            two_hop.binding(1),
            Some(&Binding::Path {
                edges: vec![
                    loader.edge_id("e1").expect("e1"),
                    loader.edge_id("e2").expect("e2")
                ],
                vertices: vec![loader.vertex_id("b").expect("b")],
            })
        );
    }

    #[test]
    fn cancelled_environment_fails_the_job() {
        let (_, graph) = chain();
        let env = env();
        let query = QueryHandler::new("MATCH (a)").expect("valid");
        let executor =
            PlanExecutor::new(&env, &graph, query.query_graph(), HOMOMORPHISM).expect("executor");
        let plan = PhysicalPlan::new(
            PhysicalNode::new(PhysicalOp::VertexScan {
                var: "a".into(),
                label: None,
                predicate: None,
            }),
            vec!["a".into()],
        );
        env.cancel_token().cancel();
        let err = executor.execute(&plan).expect_err("cancelled");
        assert!(matches!(err, EpgmError::Cancelled));
    }

    #[test]
    fn malformed_plans_are_execution_errors() {
        let (_, graph) = chain();
        let query = QueryHandler::new("MATCH (a)").expect("valid");
        let executor =
            PlanExecutor::new(&env(), &graph, query.query_graph(), HOMOMORPHISM).expect("executor");
        let plan = PhysicalPlan::new(
            PhysicalNode::new(PhysicalOp::Projection {
                vars: vec!["a".into()],
            }),
            vec!["a".into()],
        );
        let err = executor.execute(&plan).expect_err("missing input");
        assert_eq!(err.code(), "ExecutionFailure");
    }
}
