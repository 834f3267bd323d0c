//! Pattern matching engine.
//!
//! A pattern string is parsed into an [`ast::MatchQuery`], normalised into a
//! [`graph::QueryGraph`], planned greedily against [`statistics::GraphStatistics`]
//! and executed on the local dataflow substrate.

/// Abstract syntax tree of the pattern language.
///
/// Paths of node and relationship patterns plus an optional `WHERE` expression.
pub mod ast;

/// Embeddings: fixed-width rows of bound vertices, edges and paths.
pub mod embedding;

/// Execution of physical plans over a logical graph.
pub mod executor;

/// Query graph built from the AST, with predicates split per variable.
pub mod graph;

/// Public pattern matching entry point.
pub mod matching;

/// Pattern parser built on `nom`.
pub mod parser;

/// Physical operator tree.
pub mod physical;

/// Greedy cost-based planner.
///
/// Grows partial plans by expand and join steps until every query
/// variable is bound, picking the cheapest candidate at each step.
pub mod planner;

/// Three-valued predicate expressions in negation normal form.
pub mod predicate;

/// Graph statistics used for cardinality estimation.
pub mod statistics;

pub use matching::{CypherPatternMatching, MatchResult, MatchStrategies, MatchStrategy};

/// Execution plan output with explanation capabilities.
pub use planner::{PlanExplain, PlannerOutput};
pub use statistics::{GraphStatistics, GraphStatisticsReader};
