//! Extended property graph model with Cypher-like pattern matching.
//!
//! Patterns are parsed, planned greedily against graph statistics and
//! executed on a local partitioned dataflow ([`dataflow`]). Matches can be
//! materialised as graph collections, and graphs or collections can be
//! compared by canonical labels ([`equality`]).

#![warn(missing_docs)]

pub mod config;
pub mod dataflow;
pub mod equality;
pub mod logging;
pub mod model;
pub mod query;
pub mod types;

pub use config::{EpgmConfig, ExecutionConfig, PlannerConfig};
pub use dataflow::{CancelToken, DataSet, ExecutionEnvironment};
pub use equality::{
    CanonicalLabeling, CollectionEquality, CollectionEqualityByGraphIds, GraphEquality,
    LabelingMode,
};
pub use model::{Edge, GraphCollection, GraphHead, LogicalGraph, PropertyValue, Vertex};
pub use query::{CypherPatternMatching, MatchResult, MatchStrategy};
pub use types::{EpgmError, Result};
