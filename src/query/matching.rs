//! Pattern matching entry point.
//!
//! [`CypherPatternMatching`] ties the pipeline together: the pattern is
//! parsed into a query graph, planned against graph statistics and executed
//! on an [`ExecutionEnvironment`]. The resulting [`MatchResult`] can be
//! materialised into a [`GraphCollection`] with one graph per embedding.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::config::PlannerConfig;
use crate::dataflow::ExecutionEnvironment;
use crate::model::{GraphCollection, GraphHead, LogicalGraph};
use crate::query::embedding::Embedding;
use crate::query::executor::PlanExecutor;
use crate::query::graph::QueryHandler;
use crate::query::planner::{Planner, PlannerOutput};
use crate::query::statistics::GraphStatistics;
use crate::types::{EdgeId, GraphId, IdGenerator, Result, VertexId};

/// Label of the graph heads created by [`MatchResult::into_collection`].
pub const MATCH_GRAPH_LABEL: &str = "match";

/// How query elements may map onto data elements.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub enum MatchStrategy {
    /// Distinct query elements may bind the same data element.
    #[default]
    Homomorphism,
    /// Distinct query elements bind distinct data elements.
    Isomorphism,
}

impl MatchStrategy {
    /// Returns true for [`MatchStrategy::Isomorphism`].
    pub fn is_isomorphism(self) -> bool {
        self == MatchStrategy::Isomorphism
    }
}

/// Vertex and edge strategies of one match.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub struct MatchStrategies {
    /// Strategy for vertices, path intermediates included.
    pub vertex: MatchStrategy,
    /// Strategy for edges, path edges included.
    pub edge: MatchStrategy,
}

/// Embeddings produced by a match, plus the plan that produced them.
#[derive(Clone, Debug)]
pub struct MatchResult {
    columns: Vec<String>,
    embeddings: Vec<Embedding>,
    plan: PlannerOutput,
}

impl MatchResult {
    /// Output variables; embedding slot `i` holds column `i`.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Matched embeddings.
    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    /// Number of embeddings.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns true when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Plan and explain tree used for the match.
    pub fn plan(&self) -> &PlannerOutput {
        &self.plan
    }

    /// Slot of `column`.
    pub fn column(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Builds one graph per embedding from the elements of `graph`.
    pub fn into_collection(self, graph: &LogicalGraph) -> Result<GraphCollection> {
        self.into_collection_with_ids(graph, &mut IdGenerator::new())
    }

    /// Like [`MatchResult::into_collection`], drawing graph ids from `ids`.
    ///
    /// Every embedding becomes a graph head labelled `match`; the bound
    /// vertices and edges, path elements included, gain that graph id. Only
    /// matched elements appear in the collection.
    pub fn into_collection_with_ids(
        self,
        graph: &LogicalGraph,
        ids: &mut IdGenerator,
    ) -> Result<GraphCollection> {
        let mut heads = Vec::with_capacity(self.embeddings.len());
        let mut vertex_graphs: BTreeMap<VertexId, BTreeSet<GraphId>> = BTreeMap::new();
        let mut edge_graphs: BTreeMap<EdgeId, BTreeSet<GraphId>> = BTreeMap::new();
        for embedding in &self.embeddings {
            let head = GraphHead::new(ids.graph_id(), MATCH_GRAPH_LABEL);
            for id in embedding.vertex_ids() {
                vertex_graphs.entry(id).or_default().insert(head.id);
            }
            for id in embedding.edge_ids() {
                edge_graphs.entry(id).or_default().insert(head.id);
            }
            heads.push(head);
        }
        // Projections may drop endpoint columns; keep the collection closed.
        for edge in graph.edges() {
            if let Some(graphs) = edge_graphs.get(&edge.id) {
                for endpoint in [edge.source, edge.target] {
                    vertex_graphs
                        .entry(endpoint)
                        .or_default()
                        .extend(graphs.iter().copied());
                }
            }
        }
        let vertices = graph
            .vertices()
            .iter()
            .filter_map(|vertex| {
                vertex_graphs.get(&vertex.id).map(|graphs| {
                    let mut vertex = vertex.clone();
                    vertex.graph_ids.extend(graphs);
                    vertex
                })
            })
            .collect();
        let edges = graph
            .edges()
            .iter()
            .filter_map(|edge| {
                edge_graphs.get(&edge.id).map(|graphs| {
                    let mut edge = edge.clone();
                    edge.graph_ids.extend(graphs);
                    edge
                })
            })
            .collect();
        GraphCollection::new(heads, vertices, edges)
    }
}

/// Cypher-like pattern matching over a logical graph.
#[derive(Clone, Debug)]
pub struct CypherPatternMatching {
    query: String,
    strategies: MatchStrategies,
    statistics: Option<Arc<GraphStatistics>>,
    planner_config: PlannerConfig,
    projection: Option<Vec<String>>,
}

impl CypherPatternMatching {
    /// Creates a match of `query` under the given strategies.
    pub fn new(
        query: impl Into<String>,
        vertex_strategy: MatchStrategy,
        edge_strategy: MatchStrategy,
    ) -> Self {
        Self {
            query: query.into(),
            strategies: MatchStrategies {
                vertex: vertex_strategy,
                edge: edge_strategy,
            },
            statistics: None,
            planner_config: PlannerConfig::default(),
            projection: None,
        }
    }

    /// Plans with `statistics` instead of computing exact ones from the graph.
    pub fn with_statistics(mut self, statistics: GraphStatistics) -> Self {
        self.statistics = Some(Arc::new(statistics));
        self
    }

    /// Overrides the planner configuration.
    pub fn with_planner_config(mut self, config: PlannerConfig) -> Self {
        self.planner_config = config;
        self
    }

    /// Restricts the output to `vars`, in that order.
    pub fn with_projection<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(vars.into_iter().map(Into::into).collect());
        self
    }

    /// Strategies used by the match.
    pub fn strategies(&self) -> MatchStrategies {
        self.strategies
    }

    /// Parses and plans the query without executing it.
    pub fn explain(&self, graph: &LogicalGraph) -> Result<PlannerOutput> {
        let handler = QueryHandler::new(&self.query)?;
        self.planner(graph)
            .plan(handler.query_graph(), self.projection.as_deref())
    }

    /// Runs the match on `env`.
    ///
    /// Query errors are reported before any dataflow job starts.
    pub fn execute(&self, env: &ExecutionEnvironment, graph: &LogicalGraph) -> Result<MatchResult> {
        let handler = QueryHandler::new(&self.query)?;
        let query_graph = handler.query_graph();
        let plan = self
            .planner(graph)
            .plan(query_graph, self.projection.as_deref())?;
        debug!(
            query = %self.query,
            estimated = plan.estimated_cardinality,
            "executing match"
        );
        let executor = PlanExecutor::new(env, graph, query_graph, self.strategies)?;
        let embeddings = executor.execute(&plan.plan)?;
        debug!(embeddings = embeddings.len(), "match finished");
        Ok(MatchResult {
            columns: plan.plan.columns.clone(),
            embeddings,
            plan,
        })
    }

    fn planner(&self, graph: &LogicalGraph) -> Planner {
        let statistics = self
            .statistics
            .clone()
            .unwrap_or_else(|| Arc::new(GraphStatistics::from_graph(graph)));
        Planner::new(self.planner_config.clone(), statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ascii::AsciiGraphLoader;

    fn env() -> ExecutionEnvironment {
        ExecutionEnvironment::new(2).expect("pool")
    }

    #[test]
    fn strategies_default_to_homomorphism() {
        let strategies = MatchStrategies::default();
        assert!(!strategies.vertex.is_isomorphism());
        assert!(!strategies.edge.is_isomorphism());
    }

    #[test]
    fn collection_holds_one_graph_per_embedding() {
        let loader = AsciiGraphLoader::load("g[(a:A)-[e:x]->(b:B)-[f:x]->(c:B)]").expect("load");
        let graph = loader.logical_graph("g").expect("graph");
        let result = CypherPatternMatching::new(
            "MATCH (s)-[r:x]->(t:B)",
            MatchStrategy::Isomorphism,
            MatchStrategy::Isomorphism,
        )
        .execute(&env(), &graph)
        .expect("match");
        assert_eq!(result.len(), 2);
        let collection = result
            .into_collection_with_ids(&graph, &mut IdGenerator::starting_at(1_000))
            .expect("collection");
        assert_eq!(collection.heads().len(), 2);
        assert!(collection.heads().iter().all(|h| h.label == MATCH_GRAPH_LABEL));
        assert_eq!(collection.vertices().len(), 3);
        assert_eq!(collection.edges().len(), 2);
        let b = collection
            .vertices()
            .iter()
            .find(|v| Some(v.id) == loader.vertex_id("b"))
            .expect("b");
        assert_eq!(b.graph_ids.len(), 3, "member of g and both matches");
    }

    #[test]
    fn query_errors_precede_execution() {
        let loader = AsciiGraphLoader::load("g[(a)]").expect("load");
        let graph = loader.logical_graph("g").expect("graph");
        let env = env();
        env.cancel_token().cancel();
        let err = CypherPatternMatching::new(
            "MATCH (a)-[e]->(b) WHERE z.x = 1",
            MatchStrategy::Homomorphism,
            MatchStrategy::Homomorphism,
        )
        .execute(&env, &graph)
        .expect_err("unresolved");
        assert_eq!(err.code(), "UnresolvedVariable");
    }
}
