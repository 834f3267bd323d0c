//! Cardinality statistics consumed by the planner.
//!
//! Statistics are read-only once built. Strict `try_*` lookups return
//! [`EpgmError::StatisticsUnavailable`] for missing entries; the planner uses
//! the lenient `Option` lookups and falls back to configured defaults.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::LogicalGraph;
use crate::types::{EpgmError, Result, VertexId};

/// `source label -> edge label -> target label -> edge count`.
pub type TripleCounts = BTreeMap<String, BTreeMap<String, BTreeMap<String, u64>>>;

/// Vertex and edge counts of a data graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStatistics {
    vertex_count: Option<u64>,
    edge_count: Option<u64>,
    vertex_count_by_label: BTreeMap<String, u64>,
    edge_count_by_label: BTreeMap<String, u64>,
    distinct_source_count_by_edge_label: BTreeMap<String, u64>,
    distinct_target_count_by_edge_label: BTreeMap<String, u64>,
    edge_count_by_triple: TripleCounts,
}

impl GraphStatistics {
    /// Creates statistics without any entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total vertex count.
    pub fn with_vertex_count(mut self, count: u64) -> Self {
        self.vertex_count = Some(count);
        self
    }

    /// Sets the total edge count.
    pub fn with_edge_count(mut self, count: u64) -> Self {
        self.edge_count = Some(count);
        self
    }

    /// Sets the number of vertices carrying `label`.
    pub fn with_vertex_label_count(mut self, label: &str, count: u64) -> Self {
        self.vertex_count_by_label.insert(label.to_owned(), count);
        self
    }

    /// Sets the number of edges carrying `label`.
    pub fn with_edge_label_count(mut self, label: &str, count: u64) -> Self {
        self.edge_count_by_label.insert(label.to_owned(), count);
        self
    }

    /// Sets the number of distinct source vertices of `label` edges.
    pub fn with_distinct_source_count(mut self, label: &str, count: u64) -> Self {
        self.distinct_source_count_by_edge_label
            .insert(label.to_owned(), count);
        self
    }

    /// Sets the number of distinct target vertices of `label` edges.
    pub fn with_distinct_target_count(mut self, label: &str, count: u64) -> Self {
        self.distinct_target_count_by_edge_label
            .insert(label.to_owned(), count);
        self
    }

    /// Sets the number of `edge` edges from `source` to `target` vertices.
    pub fn with_triple_count(mut self, source: &str, edge: &str, target: &str, count: u64) -> Self {
        self.edge_count_by_triple
            .entry(source.to_owned())
            .or_default()
            .entry(edge.to_owned())
            .or_default()
            .insert(target.to_owned(), count);
        self
    }

    /// Computes exact statistics of `graph`.
    pub fn from_graph(graph: &LogicalGraph) -> Self {
        let mut stats = GraphStatistics::new()
            .with_vertex_count(graph.vertices().len() as u64)
            .with_edge_count(graph.edges().len() as u64);
        let mut labels: BTreeMap<VertexId, &str> = BTreeMap::new();
        for vertex in graph.vertices() {
            labels.insert(vertex.id, &vertex.label);
            *stats
                .vertex_count_by_label
                .entry(vertex.label.clone())
                .or_default() += 1;
        }
        let mut sources: BTreeMap<&str, HashSet<VertexId>> = BTreeMap::new();
        let mut targets: BTreeMap<&str, HashSet<VertexId>> = BTreeMap::new();
        for edge in graph.edges() {
            *stats
                .edge_count_by_label
                .entry(edge.label.clone())
                .or_default() += 1;
            sources.entry(edge.label.as_str()).or_default().insert(edge.source);
            targets.entry(edge.label.as_str()).or_default().insert(edge.target);
            let source = labels.get(&edge.source).copied().unwrap_or_default();
            let target = labels.get(&edge.target).copied().unwrap_or_default();
            *stats
                .edge_count_by_triple
                .entry(source.to_owned())
                .or_default()
                .entry(edge.label.clone())
                .or_default()
                .entry(target.to_owned())
                .or_default() += 1;
        }
        for (label, ids) in sources {
            stats
                .distinct_source_count_by_edge_label
                .insert(label.to_owned(), ids.len() as u64);
        }
        for (label, ids) in targets {
            stats
                .distinct_target_count_by_edge_label
                .insert(label.to_owned(), ids.len() as u64);
        }
        stats
    }

    /// Total vertex count.
    pub fn vertex_count(&self) -> Option<u64> {
        self.vertex_count
    }

    /// Total edge count.
    pub fn edge_count(&self) -> Option<u64> {
        self.edge_count
    }

    /// Number of vertices carrying `label`.
    pub fn vertex_count_by_label(&self, label: &str) -> Option<u64> {
        self.vertex_count_by_label.get(label).copied()
    }

    /// Number of edges carrying `label`.
    pub fn edge_count_by_label(&self, label: &str) -> Option<u64> {
        self.edge_count_by_label.get(label).copied()
    }

    /// Number of distinct source vertices of `label` edges.
    pub fn distinct_source_count(&self, label: &str) -> Option<u64> {
        self.distinct_source_count_by_edge_label.get(label).copied()
    }

    /// Number of distinct target vertices of `label` edges.
    pub fn distinct_target_count(&self, label: &str) -> Option<u64> {
        self.distinct_target_count_by_edge_label.get(label).copied()
    }

    /// Number of `edge` edges from `source` to `target` vertices.
    pub fn edge_count_by_triple(&self, source: &str, edge: &str, target: &str) -> Option<u64> {
        self.edge_count_by_triple
            .get(source)?
            .get(edge)?
            .get(target)
            .copied()
    }

    /// Strict variant of [`GraphStatistics::vertex_count`].
    pub fn try_vertex_count(&self) -> Result<u64> {
        self.vertex_count
            .ok_or_else(|| EpgmError::StatisticsUnavailable("vertex count".into()))
    }

    /// Strict variant of [`GraphStatistics::edge_count`].
    pub fn try_edge_count(&self) -> Result<u64> {
        self.edge_count
            .ok_or_else(|| EpgmError::StatisticsUnavailable("edge count".into()))
    }

    /// Strict variant of [`GraphStatistics::vertex_count_by_label`].
    pub fn try_vertex_count_by_label(&self, label: &str) -> Result<u64> {
        self.vertex_count_by_label(label).ok_or_else(|| {
            EpgmError::StatisticsUnavailable(format!("vertex label '{label}'"))
        })
    }

    /// Strict variant of [`GraphStatistics::edge_count_by_label`].
    pub fn try_edge_count_by_label(&self, label: &str) -> Result<u64> {
        self.edge_count_by_label(label)
            .ok_or_else(|| EpgmError::StatisticsUnavailable(format!("edge label '{label}'")))
    }

    /// Strict variant of [`GraphStatistics::distinct_source_count`].
    pub fn try_distinct_source_count(&self, label: &str) -> Result<u64> {
        self.distinct_source_count(label).ok_or_else(|| {
            EpgmError::StatisticsUnavailable(format!("distinct sources of '{label}'"))
        })
    }

    /// Strict variant of [`GraphStatistics::distinct_target_count`].
    pub fn try_distinct_target_count(&self, label: &str) -> Result<u64> {
        self.distinct_target_count(label).ok_or_else(|| {
            EpgmError::StatisticsUnavailable(format!("distinct targets of '{label}'"))
        })
    }

    /// Strict variant of [`GraphStatistics::edge_count_by_triple`].
    pub fn try_edge_count_by_triple(&self, source: &str, edge: &str, target: &str) -> Result<u64> {
        self.edge_count_by_triple(source, edge, target).ok_or_else(|| {
            EpgmError::StatisticsUnavailable(format!("triple ({source})-[{edge}]->({target})"))
        })
    }

    /// Parses statistics from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Renders statistics as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reads [`GraphStatistics`] from a directory of headerless CSV files.
///
/// | file | columns |
/// |---|---|
/// | `vertex_count` | `count` |
/// | `edge_count` | `count` |
/// | `vertex_count_by_label` | `label,count` |
/// | `edge_count_by_label` | `label,count` |
/// | `distinct_source_vertex_count_by_edge_label` | `label,count` |
/// | `distinct_target_vertex_count_by_edge_label` | `label,count` |
/// | `edge_count_by_triple` | `source,edge,target,count` |
///
/// A missing file contributes no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphStatisticsReader;

/// File names understood by [`GraphStatisticsReader`].
pub const VERTEX_COUNT_FILE: &str = "vertex_count";
/// See [`GraphStatisticsReader`].
pub const EDGE_COUNT_FILE: &str = "edge_count";
/// See [`GraphStatisticsReader`].
pub const VERTEX_COUNT_BY_LABEL_FILE: &str = "vertex_count_by_label";
/// See [`GraphStatisticsReader`].
pub const EDGE_COUNT_BY_LABEL_FILE: &str = "edge_count_by_label";
/// See [`GraphStatisticsReader`].
pub const DISTINCT_SOURCE_COUNT_FILE: &str = "distinct_source_vertex_count_by_edge_label";
/// See [`GraphStatisticsReader`].
pub const DISTINCT_TARGET_COUNT_FILE: &str = "distinct_target_vertex_count_by_edge_label";
/// See [`GraphStatisticsReader`].
pub const EDGE_COUNT_BY_TRIPLE_FILE: &str = "edge_count_by_triple";

impl GraphStatisticsReader {
    /// Reads every statistics file present in `dir`.
    pub fn read(dir: impl AsRef<Path>) -> Result<GraphStatistics> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(EpgmError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("statistics directory {} not found", dir.display()),
            )));
        }
        let mut stats = GraphStatistics::new();
        if let Some(rows) = read_rows(dir, VERTEX_COUNT_FILE, 1)? {
            stats.vertex_count = single_count(VERTEX_COUNT_FILE, &rows)?;
        }
        if let Some(rows) = read_rows(dir, EDGE_COUNT_FILE, 1)? {
            stats.edge_count = single_count(EDGE_COUNT_FILE, &rows)?;
        }
        for (file, target) in [
            (VERTEX_COUNT_BY_LABEL_FILE, &mut stats.vertex_count_by_label),
            (EDGE_COUNT_BY_LABEL_FILE, &mut stats.edge_count_by_label),
            (
                DISTINCT_SOURCE_COUNT_FILE,
                &mut stats.distinct_source_count_by_edge_label,
            ),
            (
                DISTINCT_TARGET_COUNT_FILE,
                &mut stats.distinct_target_count_by_edge_label,
            ),
        ] {
            for row in read_rows(dir, file, 2)?.unwrap_or_default() {
                target.insert(row[0].clone(), parse_count(file, &row[1])?);
            }
        }
        for row in read_rows(dir, EDGE_COUNT_BY_TRIPLE_FILE, 4)?.unwrap_or_default() {
            let count = parse_count(EDGE_COUNT_BY_TRIPLE_FILE, &row[3])?;
            stats = stats.with_triple_count(&row[0], &row[1], &row[2], count);
        }
        debug!(
            dir = %dir.display(),
            vertex_labels = stats.vertex_count_by_label.len(),
            edge_labels = stats.edge_count_by_label.len(),
            "graph statistics loaded"
        );
        Ok(stats)
    }
}

fn read_rows(dir: &Path, file: &str, columns: usize) -> Result<Option<Vec<Vec<String>>>> {
    let path = dir.join(file);
    let mut handle = match File::open(&path) {
        Ok(handle) => handle,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(file, "statistics file missing, no entries recorded");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let mut text = String::new();
    handle.read_to_string(&mut text)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != columns {
            return Err(EpgmError::InvalidGraph(format!(
                "{file}: expected {columns} columns, found {}",
                record.len()
            )));
        }
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok(Some(rows))
}

fn parse_count(file: &str, field: &str) -> Result<u64> {
    field
        .parse()
        .map_err(|_| EpgmError::InvalidGraph(format!("{file}: invalid count '{field}'")))
}

fn single_count(file: &str, rows: &[Vec<String>]) -> Result<Option<u64>> {
    match rows {
        [] => Ok(None),
        [row] => parse_count(file, &row[0]).map(Some),
        _ => Err(EpgmError::InvalidGraph(format!(
            "{file}: expected a single count"
        ))),
    }
}
