//! Greedy cost-based planner.
//!
//! The plan table starts with one scan per query vertex (and, optionally, one
//! scan per fixed-length query edge). Every step enumerates all expand and
//! join candidates over the table, keeps the cheapest one, and drops entries
//! it makes redundant. Planning ends when a single entry binds every
//! variable, has checked every vertex and applied every WHERE conjunct.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::PlannerConfig;
use crate::query::graph::{EdgeDirection, QueryEdge, QueryGraph};
use crate::query::physical::{BuildSide, Dir, PhysicalNode, PhysicalOp, PhysicalPlan};
use crate::query::predicate::{CmpOp, Predicate};
use crate::query::statistics::GraphStatistics;
use crate::types::{EpgmError, Result};

/// Planner output containing the chosen physical plan and explain tree.
#[derive(Clone, Debug)]
pub struct PlannerOutput {
    /// The generated physical query plan
    pub plan: PhysicalPlan,
    /// Human-readable explain tree
    pub explain: PlanExplain,
    /// Estimated number of embeddings produced by the plan
    pub estimated_cardinality: f64,
}

/// Human-readable explain tree.
#[derive(Clone, Debug)]
pub struct PlanExplain {
    /// Root node of the explain tree
    pub root: ExplainNode,
}

impl fmt::Display for PlanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render(node: &ExplainNode, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let props = node
                .props
                .iter()
                .map(|prop| format!("{}={}", prop.key, prop.value))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{:indent$}{}({props})", "", node.op, indent = depth * 2)?;
            for input in &node.inputs {
                render(input, depth + 1, f)?;
            }
            Ok(())
        }
        render(&self.root, 0, f)
    }
}

/// Explain node representing an operator with optional metadata.
#[derive(Clone, Debug)]
pub struct ExplainNode {
    /// Operator name
    pub op: String,
    /// Additional properties describing the operator
    pub props: Vec<ExplainProp>,
    /// Input operators
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given operator name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Looks up a property value by key.
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|prop| prop.key == key)
            .map(|prop| prop.value.as_str())
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug)]
struct PlanTableEntry {
    node: PhysicalNode,
    bound: BTreeSet<String>,
    checked: BTreeSet<String>,
    applied: BTreeSet<usize>,
    cardinality: f64,
}

impl PlanTableEntry {
    fn covers(&self, other: &PlanTableEntry) -> bool {
        other.bound.is_subset(&self.bound) && other.checked.is_subset(&self.checked)
    }

    fn describe(&self) -> String {
        self.bound.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

struct Candidate {
    entry: PlanTableEntry,
    consumed: Vec<usize>,
    newly_bound: String,
    description: String,
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    a.entry
        .cardinality
        .total_cmp(&b.entry.cardinality)
        .then_with(|| a.newly_bound.cmp(&b.newly_bound))
        .then_with(|| a.description.cmp(&b.description))
}

/// Query planner that converts query graphs to physical execution plans.
pub struct Planner {
    config: PlannerConfig,
    statistics: Arc<GraphStatistics>,
}

impl Planner {
    /// Creates a new planner with the given configuration and statistics.
    pub fn new(config: PlannerConfig, statistics: Arc<GraphStatistics>) -> Self {
        Self { config, statistics }
    }

    /// Plans `graph`; `projection` restricts and orders the output columns.
    pub fn plan(&self, graph: &QueryGraph, projection: Option<&[String]>) -> Result<PlannerOutput> {
        let columns = output_columns(graph, projection)?;
        let mut table = self.seed(graph);
        let mut step = 0usize;
        loop {
            if let [only] = table.as_slice() {
                if is_complete(graph, only) {
                    break;
                }
            }
            let candidates = self.candidates(graph, &table);
            let considered = candidates.len();
            let best = candidates
                .into_iter()
                .min_by(compare_candidates)
                .ok_or_else(|| {
                    EpgmError::UnsupportedPattern(format!(
                        "no operator extends the plan table [{}]",
                        table
                            .iter()
                            .map(|entry| format!("{{{}}}", entry.describe()))
                            .collect::<Vec<_>>()
                            .join(" ")
                    ))
                })?;
            step += 1;
            debug!(
                step,
                considered,
                candidate = %best.description,
                cardinality = best.entry.cardinality,
                "planner step"
            );
            table = apply(table, best);
        }
        let entry = table
            .pop()
            .ok_or_else(|| EpgmError::UnsupportedPattern("empty plan table".into()))?;
        debug!(
            steps = step,
            cardinality = entry.cardinality,
            "plan complete"
        );
        let root = match projection {
            Some(_) => PhysicalNode::with_inputs(
                PhysicalOp::Projection {
                    vars: columns.clone(),
                },
                vec![entry.node],
            ),
            None => entry.node,
        };
        let explain = PlanExplain {
            root: build_explain_tree(&root),
        };
        Ok(PlannerOutput {
            plan: PhysicalPlan::new(root, columns),
            explain,
            estimated_cardinality: entry.cardinality,
        })
    }

    fn seed(&self, graph: &QueryGraph) -> Vec<PlanTableEntry> {
        let mut table = Vec::new();
        for vertex in graph.vertices() {
            let cardinality = self.vertex_cardinality(vertex.label.as_deref())
                * self.selectivity(vertex.predicate.as_ref());
            let entry = self.attach_filters(
                graph,
                PlanTableEntry {
                    node: PhysicalNode::new(PhysicalOp::VertexScan {
                        var: vertex.variable.clone(),
                        label: vertex.label.clone(),
                        predicate: vertex.predicate.clone(),
                    }),
                    bound: BTreeSet::from([vertex.variable.clone()]),
                    checked: BTreeSet::from([vertex.variable.clone()]),
                    applied: BTreeSet::new(),
                    cardinality,
                },
            );
            debug!(var = %vertex.variable, cardinality = entry.cardinality, "vertex scan seeded");
            table.push(entry);
        }
        if self.config.edge_scan_seeds {
            for edge in graph.edges().iter().filter(|e| !e.is_variable_length()) {
                let mut cardinality = self.edge_cardinality(edge.label.as_deref())
                    * self.selectivity(edge.predicate.as_ref());
                if edge.direction == EdgeDirection::Undirected {
                    cardinality *= 2.0;
                }
                let checked = [&edge.source, &edge.target]
                    .into_iter()
                    .filter(|var| {
                        graph
                            .vertex(var)
                            .is_some_and(|v| v.label.is_none() && v.predicate.is_none())
                    })
                    .cloned()
                    .collect();
                let entry = self.attach_filters(
                    graph,
                    PlanTableEntry {
                        node: PhysicalNode::new(PhysicalOp::EdgeScan {
                            edge: edge.variable.clone(),
                            source: edge.source.clone(),
                            target: edge.target.clone(),
                            label: edge.label.clone(),
                            direction: edge.direction,
                            bounds: None,
                            predicate: edge.predicate.clone(),
                        }),
                        bound: BTreeSet::from([
                            edge.source.clone(),
                            edge.variable.clone(),
                            edge.target.clone(),
                        ]),
                        checked,
                        applied: BTreeSet::new(),
                        cardinality,
                    },
                );
                debug!(var = %edge.variable, cardinality = entry.cardinality, "edge scan seeded");
                table.push(entry);
            }
        }
        prune(table)
    }

    fn candidates(&self, graph: &QueryGraph, table: &[PlanTableEntry]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (idx, entry) in table.iter().enumerate() {
            for edge in graph.edges() {
                if entry.bound.contains(&edge.variable) {
                    continue;
                }
                let mut starts = vec![edge.source.as_str()];
                if edge.target != edge.source {
                    starts.push(edge.target.as_str());
                }
                for from in starts {
                    if entry.bound.contains(from) {
                        out.push(self.expand(graph, idx, entry, edge, from));
                    }
                }
            }
        }
        for left in 0..table.len() {
            for right in left + 1..table.len() {
                let (l, r) = (&table[left], &table[right]);
                let shared: Vec<String> = l.bound.intersection(&r.bound).cloned().collect();
                if shared.is_empty() || l.covers(r) || r.covers(l) {
                    continue;
                }
                out.push(self.join(graph, (left, l), (right, r), shared));
            }
        }
        out
    }

    fn expand(
        &self,
        graph: &QueryGraph,
        idx: usize,
        entry: &PlanTableEntry,
        edge: &QueryEdge,
        from: &str,
    ) -> Candidate {
        let to = edge.other_endpoint(from).unwrap_or(from).to_owned();
        let dir = match edge.direction {
            EdgeDirection::Undirected => Dir::Both,
            EdgeDirection::Directed if edge.source == from => Dir::Out,
            EdgeDirection::Directed => Dir::In,
        };
        let closing = entry.bound.contains(&to);
        let check_to = !entry.checked.contains(&to);
        let to_vertex = graph.vertex(&to);
        let to_label = to_vertex.and_then(|v| v.label.clone());
        let (checked_label, checked_predicate) = match to_vertex {
            Some(vertex) if check_to => (vertex.label.clone(), vertex.predicate.clone()),
            _ => (None, None),
        };
        let from_label = graph.vertex(from).and_then(|v| v.label.as_deref());
        let degree = self.degree(
            from_label,
            edge.label.as_deref(),
            to_label.as_deref(),
            dir,
        );
        let hops = match edge.bounds {
            Some(bounds) => {
                // Paths are edge-simple, so no path is longer than the edge count.
                let longest = self.edge_cardinality(None).max(1.0);
                path_hops(degree, f64::from(bounds.min), f64::from(bounds.max).min(longest))
            }
            None => degree,
        };
        let mut cardinality = entry.cardinality
            * hops
            * self.selectivity(edge.predicate.as_ref())
            * self.selectivity(checked_predicate.as_ref());
        if closing {
            cardinality /= self.vertex_cardinality(to_label.as_deref()).max(1.0);
        }
        let mut bound = entry.bound.clone();
        bound.insert(edge.variable.clone());
        bound.insert(to.clone());
        let mut checked = entry.checked.clone();
        checked.insert(to.clone());
        let newly_bound = if closing || edge.variable < to {
            edge.variable.clone()
        } else {
            to.clone()
        };
        let description = format!(
            "{{{}}}+Expand({from}-[{}]-{to})",
            entry.describe(),
            edge.variable
        );
        let node = PhysicalNode::with_inputs(
            PhysicalOp::Expand {
                from: from.to_owned(),
                edge: edge.variable.clone(),
                to,
                dir,
                label: edge.label.clone(),
                bounds: edge.bounds,
                edge_predicate: edge.predicate.clone(),
                to_label: checked_label,
                to_predicate: checked_predicate,
                closing,
            },
            vec![entry.node.clone()],
        );
        let entry = self.attach_filters(
            graph,
            PlanTableEntry {
                node,
                bound,
                checked,
                applied: entry.applied.clone(),
                cardinality,
            },
        );
        Candidate {
            entry,
            consumed: vec![idx],
            newly_bound,
            description,
        }
    }

    fn join(
        &self,
        graph: &QueryGraph,
        (left_idx, left): (usize, &PlanTableEntry),
        (right_idx, right): (usize, &PlanTableEntry),
        shared: Vec<String>,
    ) -> Candidate {
        let distinct: f64 = shared
            .iter()
            .map(|var| self.distinct_count(graph, var).max(1.0))
            .product();
        let cardinality = left.cardinality * right.cardinality / distinct;
        let build = if right.cardinality <= left.cardinality {
            BuildSide::Right
        } else {
            BuildSide::Left
        };
        let newly_bound = left
            .bound
            .symmetric_difference(&right.bound)
            .next()
            .cloned()
            .unwrap_or_default();
        let description = format!("Join({{{}}},{{{}}})", left.describe(), right.describe());
        let node = PhysicalNode::with_inputs(
            PhysicalOp::Join { shared, build },
            vec![left.node.clone(), right.node.clone()],
        );
        let entry = self.attach_filters(
            graph,
            PlanTableEntry {
                node,
                bound: left.bound.union(&right.bound).cloned().collect(),
                checked: left.checked.union(&right.checked).cloned().collect(),
                applied: left.applied.union(&right.applied).copied().collect(),
                cardinality,
            },
        );
        Candidate {
            entry,
            consumed: vec![left_idx, right_idx],
            newly_bound,
            description,
        }
    }

    fn attach_filters(&self, graph: &QueryGraph, mut entry: PlanTableEntry) -> PlanTableEntry {
        for (idx, conjunct) in graph.conjuncts().iter().enumerate() {
            if entry.applied.contains(&idx)
                || !conjunct.variables().iter().all(|var| entry.bound.contains(var))
            {
                continue;
            }
            let selectivity = self.selectivity(Some(conjunct));
            entry.node = PhysicalNode::with_inputs(
                PhysicalOp::Filter {
                    predicate: conjunct.clone(),
                    selectivity,
                },
                vec![entry.node],
            );
            entry.cardinality *= selectivity;
            entry.applied.insert(idx);
        }
        entry
    }

    fn vertex_cardinality(&self, label: Option<&str>) -> f64 {
        let count = match label {
            Some(label) => self.statistics.vertex_count_by_label(label),
            None => self.statistics.vertex_count(),
        };
        count.map(|c| c as f64).unwrap_or_else(|| {
            trace!(?label, "no vertex count, using default");
            self.config.default_vertex_count
        })
    }

    fn edge_cardinality(&self, label: Option<&str>) -> f64 {
        let count = match label {
            Some(label) => self.statistics.edge_count_by_label(label),
            None => self.statistics.edge_count(),
        };
        count.map(|c| c as f64).unwrap_or_else(|| {
            trace!(?label, "no edge count, using default");
            self.config.default_edge_count
        })
    }

    fn distinct_count(&self, graph: &QueryGraph, var: &str) -> f64 {
        match graph.edge(var) {
            Some(edge) => self.edge_cardinality(edge.label.as_deref()),
            None => self.vertex_cardinality(graph.vertex(var).and_then(|v| v.label.as_deref())),
        }
    }

    fn degree(&self, from: Option<&str>, edge: Option<&str>, to: Option<&str>, dir: Dir) -> f64 {
        match dir {
            Dir::Out => self.directed_degree(from, edge, to, true),
            Dir::In => self.directed_degree(from, edge, to, false),
            Dir::Both => {
                self.directed_degree(from, edge, to, true)
                    + self.directed_degree(from, edge, to, false)
            }
        }
    }

    fn directed_degree(
        &self,
        from: Option<&str>,
        edge: Option<&str>,
        to: Option<&str>,
        outgoing: bool,
    ) -> f64 {
        let stats = &self.statistics;
        if let (Some(from), Some(edge), Some(to)) = (from, edge, to) {
            let triple = if outgoing {
                stats.edge_count_by_triple(from, edge, to)
            } else {
                stats.edge_count_by_triple(to, edge, from)
            };
            if let (Some(edges), Some(vertices)) = (triple, stats.vertex_count_by_label(from)) {
                return ratio(edges, vertices);
            }
        }
        let edges = match edge {
            Some(edge) => stats.edge_count_by_label(edge),
            None => stats.edge_count(),
        };
        let endpoints = edge
            .and_then(|edge| {
                if outgoing {
                    stats.distinct_source_count(edge)
                } else {
                    stats.distinct_target_count(edge)
                }
            })
            .or_else(|| from.and_then(|label| stats.vertex_count_by_label(label)))
            .or_else(|| stats.vertex_count());
        match (edges, endpoints) {
            (Some(edges), Some(endpoints)) => ratio(edges, endpoints),
            _ => {
                trace!(?edge, outgoing, "no degree statistics, using default");
                self.config.default_degree
            }
        }
    }

    fn selectivity(&self, predicate: Option<&Predicate>) -> f64 {
        predicate.map_or(1.0, |p| predicate_selectivity(p, &self.config))
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn predicate_selectivity(predicate: &Predicate, config: &PlannerConfig) -> f64 {
    match predicate {
        Predicate::Cmp(cmp) => match cmp.op {
            CmpOp::Eq => config.equality_selectivity,
            CmpOp::Ne => 1.0 - config.equality_selectivity,
            CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => config.range_selectivity,
        },
        Predicate::And(parts) => parts
            .iter()
            .map(|p| predicate_selectivity(p, config))
            .product(),
        Predicate::Or(parts) => {
            1.0 - parts
                .iter()
                .map(|p| 1.0 - predicate_selectivity(p, config))
                .product::<f64>()
        }
        Predicate::Not(inner) => 1.0 - predicate_selectivity(inner, config),
    }
}

fn output_columns(graph: &QueryGraph, projection: Option<&[String]>) -> Result<Vec<String>> {
    let Some(vars) = projection else {
        return Ok(graph.variables().to_vec());
    };
    let mut seen = BTreeSet::new();
    for var in vars {
        if !graph.variables().contains(var) {
            return Err(EpgmError::unresolved(var.as_str(), "projection"));
        }
        if !seen.insert(var) {
            return Err(EpgmError::duplicate(var.as_str(), "projected twice"));
        }
    }
    Ok(vars.to_vec())
}

fn is_complete(graph: &QueryGraph, entry: &PlanTableEntry) -> bool {
    entry.bound.len() == graph.variables().len()
        && graph
            .vertices()
            .iter()
            .all(|v| entry.checked.contains(&v.variable))
        && entry.applied.len() == graph.conjuncts().len()
}

fn apply(table: Vec<PlanTableEntry>, candidate: Candidate) -> Vec<PlanTableEntry> {
    let Candidate {
        entry, consumed, ..
    } = candidate;
    let mut next: Vec<PlanTableEntry> = table
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !consumed.contains(idx))
        .map(|(_, entry)| entry)
        .collect();
    next.push(entry);
    prune(next)
}

/// Drops entries covered by another entry; the first of two equal entries wins.
fn prune(table: Vec<PlanTableEntry>) -> Vec<PlanTableEntry> {
    let mut kept: Vec<PlanTableEntry> = Vec::with_capacity(table.len());
    for entry in table {
        if kept.iter().any(|other| other.covers(&entry)) {
            continue;
        }
        kept.retain(|other| !entry.covers(other));
        kept.push(entry);
    }
    kept
}

fn build_explain_tree(node: &PhysicalNode) -> ExplainNode {
    let mut explain = ExplainNode::new(node.op.name());
    explain.props = op_props(&node.op);
    explain.inputs = node.inputs.iter().map(build_explain_tree).collect();
    explain
}

fn op_props(op: &PhysicalOp) -> Vec<ExplainProp> {
    let mut props = Vec::new();
    match op {
        PhysicalOp::VertexScan {
            var,
            label,
            predicate,
        } => {
            props.push(ExplainProp::plain("as", var.clone()));
            push_label(&mut props, "label", label);
            push_predicate(&mut props, "predicate", predicate);
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
            props.push(ExplainProp::plain("as", edge.clone()));
            props.push(ExplainProp::plain("source", source.clone()));
            props.push(ExplainProp::plain("target", target.clone()));
            push_label(&mut props, "type", label);
            props.push(ExplainProp::plain("direction", format!("{direction:?}")));
            if let Some(bounds) = bounds {
                props.push(ExplainProp::plain(
                    "length",
                    format!("{}..{}", bounds.min, bounds.max),
                ));
            }
            push_predicate(&mut props, "predicate", predicate);
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
            props.push(ExplainProp::plain("from", from.clone()));
            props.push(ExplainProp::plain("edge", edge.clone()));
            props.push(ExplainProp::plain("to", to.clone()));
            props.push(ExplainProp::plain("dir", format!("{dir:?}")));
            props.push(ExplainProp::plain(
                "type",
                label.clone().unwrap_or_else(|| "*".into()),
            ));
            if let Some(bounds) = bounds {
                props.push(ExplainProp::plain(
                    "length",
                    format!("{}..{}", bounds.min, bounds.max),
                ));
            }
            push_predicate(&mut props, "edge_predicate", edge_predicate);
            push_label(&mut props, "to_label", to_label);
            push_predicate(&mut props, "to_predicate", to_predicate);
            props.push(ExplainProp::plain("closing", closing.to_string()));
        }
        PhysicalOp::Join { shared, build } => {
            props.push(ExplainProp::plain("on", shared.join(", ")));
            props.push(ExplainProp::plain(
                "build",
                match build {
                    BuildSide::Left => "left",
                    BuildSide::Right => "right",
                },
            ));
        }
        PhysicalOp::Filter {
            predicate,
            selectivity,
        } => {
            props.push(ExplainProp::plain("predicate", predicate.to_string()));
            props.push(ExplainProp::plain("selectivity", format!("{selectivity:.3}")));
        }
        PhysicalOp::Projection { vars } => {
            props.push(ExplainProp::plain("vars", vars.join(", ")));
        }
    }
    props
}

fn push_label(props: &mut Vec<ExplainProp>, key: &str, label: &Option<String>) {
    if let Some(label) = label {
        props.push(ExplainProp::plain(key, label.clone()));
    }
}

fn push_predicate(props: &mut Vec<ExplainProp>, key: &str, predicate: &Option<Predicate>) {
    if let Some(predicate) = predicate {
        props.push(ExplainProp::plain(key, predicate.to_string()));
    }
}

/// Expected number of endpoints reached by paths of `min..=max` hops, each
/// hop fanning out by `degree`.
fn path_hops(degree: f64, min: f64, max: f64) -> f64 {
    if max < min {
        return 0.0;
    }
    if (degree - 1.0).abs() < f64::EPSILON {
        return max - min + 1.0;
    }
    let hops = (degree.powf(max + 1.0) - degree.powf(min)) / (degree - 1.0);
    if hops.is_finite() {
        hops
    } else {
        f64::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::graph::QueryHandler;

    fn planner(config: PlannerConfig, statistics: GraphStatistics) -> Planner {
        Planner::new(config, Arc::new(statistics))
    }

    fn no_edge_seeds() -> PlannerConfig {
        PlannerConfig {
            edge_scan_seeds: false,
            ..PlannerConfig::default()
        }
    }

    fn plan(planner: &Planner, query: &str) -> PlannerOutput {
        let handler = QueryHandler::new(query).expect("valid pattern");
        planner
            .plan(handler.query_graph(), None)
            .expect("plan succeeds")
    }

    fn bound_vars(node: &PhysicalNode) -> BTreeSet<String> {
        node.walk()
            .into_iter()
            .flat_map(|n| n.op.bound_vars())
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn single_vertex_plans_a_scan() {
        let output = plan(
            &planner(PlannerConfig::default(), GraphStatistics::new()),
            "MATCH (a)",
        );
        assert!(matches!(output.plan.root.op, PhysicalOp::VertexScan { .. }));
        assert_eq!(output.estimated_cardinality, 1000.0);
        assert_eq!(output.plan.columns, vec!["a"]);
    }

    #[test]
    fn single_unconstrained_edge_uses_an_edge_scan() {
        let output = plan(
            &planner(PlannerConfig::default(), GraphStatistics::new()),
            "MATCH (a)-[e]->(b)",
        );
        assert!(matches!(output.plan.root.op, PhysicalOp::EdgeScan { .. }));
    }

    #[test]
    fn filters_are_pushed_to_the_first_operator_binding_their_variables() {
        let stats = GraphStatistics::new()
            .with_vertex_label_count("A", 1)
            .with_vertex_label_count("B", 100)
            .with_vertex_label_count("C", 100);
        let output = plan(
            &planner(no_edge_seeds(), stats),
            "MATCH (a:A)-[e]->(b:B)-[f]->(c:C) WHERE a.x < b.x",
        );
        let filter = output
            .plan
            .root
            .walk()
            .into_iter()
            .find(|node| matches!(node.op, PhysicalOp::Filter { .. }))
            .expect("filter");
        let below = bound_vars(filter);
        assert!(below.contains("a") && below.contains("b"));
        assert!(!below.contains("c"));
        match &output.plan.root.op {
            PhysicalOp::Expand { edge, to, .. } => {
                assert_eq!(edge, "f");
                assert_eq!(to, "c");
            }
            other => panic!("unexpected root op: {other:?}"),
        }
    }

    #[test]
    fn triangle_plans_a_closing_expand() {
        let output = plan(
            &planner(no_edge_seeds(), GraphStatistics::new()),
            "MATCH (p1)-[e1]->(p2)-[e2]->(p3)-[e3]->(p1)",
        );
        let closing = output.plan.root.walk().into_iter().any(|node| {
            matches!(node.op, PhysicalOp::Expand { closing: true, .. })
        });
        assert!(closing);
        assert_eq!(
            bound_vars(&output.plan.root),
            ["p1", "e1", "p2", "e2", "p3", "e3"]
                .into_iter()
                .map(str::to_owned)
                .collect()
        );
    }

    #[test]
    fn root_binds_exactly_the_declared_variables() {
        let planner = planner(PlannerConfig::default(), GraphStatistics::new());
        for query in [
            "MATCH (a:A)-[e:x]->(b:B)<-[f:y]-(c:C)",
            "MATCH (a)-[p*1..3]->(b)-[e]-(c) WHERE a.k = c.k",
            "MATCH (a:A {n: 1})-->(b), (b)-->(a)",
        ] {
            let output = plan(&planner, query);
            let handler = QueryHandler::new(query).expect("valid");
            let declared: BTreeSet<String> =
                handler.query_graph().variables().iter().cloned().collect();
            assert_eq!(bound_vars(&output.plan.root), declared, "{query}");
        }
    }

    #[test]
    fn projection_validates_and_orders_columns() {
        let planner = planner(PlannerConfig::default(), GraphStatistics::new());
        let handler = QueryHandler::new("MATCH (a)-[e]->(b)").expect("valid");
        let output = planner
            .plan(handler.query_graph(), Some(&["b".to_owned(), "a".to_owned()]))
            .expect("plan");
        assert_eq!(output.plan.columns, vec!["b", "a"]);
        assert!(matches!(output.plan.root.op, PhysicalOp::Projection { .. }));
        let err = planner
            .plan(handler.query_graph(), Some(&["z".to_owned()]))
            .expect_err("unknown column");
        assert_eq!(err.code(), "UnresolvedVariable");
    }

    #[test]
    fn explain_renders_operator_tree() {
        let output = plan(
            &planner(no_edge_seeds(), GraphStatistics::new()),
            "MATCH (a:Person)-[e:knows]->(b)",
        );
        let text = output.explain.to_string();
        assert!(text.contains("Expand("), "{text}");
        assert!(text.contains("VertexScan("), "{text}");
        assert_eq!(output.explain.root.op, "Expand");
    }

    #[test]
    fn planning_is_deterministic() {
        let planner = planner(PlannerConfig::default(), GraphStatistics::new());
        let query = "MATCH (a)-[e]->(b)-[f]->(c)-[g]->(a), (c)-[h]->(d)";
        let first = plan(&planner, query).explain.to_string();
        for _ in 0..5 {
            assert_eq!(plan(&planner, query).explain.to_string(), first);
        }
    }

    #[test]
    fn equal_costs_prefer_the_smallest_new_variable() {
        let planner = planner(no_edge_seeds(), GraphStatistics::new());
        for (query, from, to) in [
            ("MATCH (z)-[y]->(x)", "z", "x"),
            ("MATCH (b)-[e]->(a)", "b", "a"),
        ] {
            match &plan(&planner, query).plan.root.op {
                PhysicalOp::Expand { from: f, to: t, .. } => {
                    assert_eq!((f.as_str(), t.as_str()), (from, to), "{query}");
                }
                other => panic!("{query}: unexpected root {other:?}"),
            }
        }
    }

    #[test]
    fn path_cost_is_bounded_by_the_edge_count() {
        let statistics = GraphStatistics::new().with_vertex_count(2).with_edge_count(1);
        let planner = planner(PlannerConfig::default(), statistics);
        let short = plan(&planner, "MATCH (a)-[p*1..1]->(b)");
        let long = plan(&planner, "MATCH (a)-[p*1..4000000000]->(b)");
        assert!(long.estimated_cardinality.is_finite());
        assert_eq!(long.estimated_cardinality, short.estimated_cardinality);
    }

    #[test]
    fn path_hops_sums_the_geometric_series() {
        assert_eq!(path_hops(2.0, 1.0, 3.0), 14.0);
        assert_eq!(path_hops(1.0, 2.0, 5.0), 4.0);
        assert_eq!(path_hops(0.0, 0.0, 3.0), 1.0);
        assert_eq!(path_hops(3.0, 4.0, 2.0), 0.0);
        assert_eq!(path_hops(10.0, 1.0, 1e9), f64::MAX);
    }
}
