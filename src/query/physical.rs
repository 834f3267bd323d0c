//! Physical operator tree selected by the greedy planner.

use crate::query::ast::PathBounds;
use crate::query::graph::EdgeDirection;
use crate::query::predicate::Predicate;

/// Physical plan produced by the planner.
#[derive(Clone, Debug)]
pub struct PhysicalPlan {
    /// The root node of the physical plan tree.
    pub root: PhysicalNode,
    /// Output variables, in embedding slot order.
    pub columns: Vec<String>,
}

impl PhysicalPlan {
    /// Creates a new physical plan with the given root node and columns.
    pub fn new(root: PhysicalNode, columns: Vec<String>) -> Self {
        Self { root, columns }
    }
}

/// Node within the physical plan tree.
#[derive(Clone, Debug)]
pub struct PhysicalNode {
    /// The physical operator at this node.
    pub op: PhysicalOp,
    /// Child nodes that provide input to this operator.
    pub inputs: Vec<PhysicalNode>,
}

impl PhysicalNode {
    /// Creates a new physical node with no inputs.
    pub fn new(op: PhysicalOp) -> Self {
        Self {
            op,
            inputs: Vec::new(),
        }
    }

    /// Creates a new physical node with the given inputs.
    pub fn with_inputs(op: PhysicalOp, inputs: Vec<PhysicalNode>) -> Self {
        Self { op, inputs }
    }

    /// Pre-order iterator over this node and its descendants.
    pub fn walk(&self) -> Vec<&PhysicalNode> {
        let mut out = vec![self];
        for input in &self.inputs {
            out.extend(input.walk());
        }
        out
    }
}

/// Edge traversal direction of an expand step, relative to the bound vertex.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Dir {
    /// Follow outgoing edges (the bound vertex is the query edge's source).
    Out,
    /// Follow incoming edges (the bound vertex is the query edge's target).
    In,
    /// Follow edges in both directions.
    Both,
}

/// Which join input is hashed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BuildSide {
    /// `inputs[0]`
    Left,
    /// `inputs[1]`
    Right,
}

/// Physical operators.
#[derive(Clone, Debug)]
pub enum PhysicalOp {
    /// Emits one embedding per vertex matching the label and predicate.
    VertexScan {
        /// Variable bound to the vertex.
        var: String,
        /// Required label.
        label: Option<String>,
        /// Element predicate.
        predicate: Option<Predicate>,
    },
    /// Emits one embedding per matching edge or path; binds both endpoints
    /// without checking their labels.
    EdgeScan {
        /// Variable bound to the edge.
        edge: String,
        /// Source vertex variable.
        source: String,
        /// Target vertex variable.
        target: String,
        /// Required edge label.
        label: Option<String>,
        /// Direction constraint.
        direction: EdgeDirection,
        /// Hop bounds of a variable-length edge.
        bounds: Option<PathBounds>,
        /// Element predicate.
        predicate: Option<Predicate>,
    },
    /// Follows edges from a bound vertex.
    Expand {
        /// Bound vertex variable.
        from: String,
        /// Variable bound to the traversed edge or path.
        edge: String,
        /// Vertex variable reached.
        to: String,
        /// Traversal direction relative to `from`.
        dir: Dir,
        /// Required edge label.
        label: Option<String>,
        /// Hop bounds of a variable-length edge.
        bounds: Option<PathBounds>,
        /// Element predicate of the edge.
        edge_predicate: Option<Predicate>,
        /// Label `to` must carry; only set when `to` is checked here.
        to_label: Option<String>,
        /// Element predicate of `to`; only set when `to` is checked here.
        to_predicate: Option<Predicate>,
        /// `to` is already bound and the reached vertex must equal it.
        closing: bool,
    },
    /// Broadcast hash equi-join on the bindings of the shared variables.
    Join {
        /// Variables bound on both sides.
        shared: Vec<String>,
        /// Hashed input.
        build: BuildSide,
    },
    /// Keeps embeddings for which the predicate is true.
    Filter {
        /// Predicate to evaluate.
        predicate: Predicate,
        /// Estimated selectivity.
        selectivity: f64,
    },
    /// Narrows embeddings to `vars`, in order.
    Projection {
        /// Output variables.
        vars: Vec<String>,
    },
}

impl PhysicalOp {
    /// Operator name used in explain output and logs.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOp::VertexScan { .. } => "VertexScan",
            PhysicalOp::EdgeScan { .. } => "EdgeScan",
            PhysicalOp::Expand { .. } => "Expand",
            PhysicalOp::Join { .. } => "Join",
            PhysicalOp::Filter { .. } => "Filter",
            PhysicalOp::Projection { .. } => "Projection",
        }
    }

    /// Variables this operator binds on its own.
    pub fn bound_vars(&self) -> Vec<&str> {
        match self {
            PhysicalOp::VertexScan { var, .. } => vec![var.as_str()],
            PhysicalOp::EdgeScan {
                edge,
                source,
                target,
                ..
            } => vec![source.as_str(), edge.as_str(), target.as_str()],
            PhysicalOp::Expand { edge, to, .. } => vec![edge.as_str(), to.as_str()],
            PhysicalOp::Join { .. } | PhysicalOp::Filter { .. } | PhysicalOp::Projection { .. } => {
                Vec::new()
            }
        }
    }
}
