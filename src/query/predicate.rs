//! Boolean predicates over query variables.
//!
//! Predicates are evaluated with three-valued logic: a comparison involving a
//! missing property, a null, or incomparable operands is *unknown* (`None`).
//! `NOT unknown` stays unknown, and filters keep only rows that evaluate to
//! `Some(true)`.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::model::PropertyValue;
use crate::query::embedding::Binding;

/// Comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    /// Operator that is true exactly when `self` is false on defined operands.
    pub fn negated(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    /// Returns true for `<`, `<=`, `>` and `>=`.
    pub fn is_range(self) -> bool {
        !matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// One side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// `var.key`
    Property {
        /// Query variable.
        var: String,
        /// Property key.
        key: String,
    },
    /// Constant value.
    Literal(PropertyValue),
    /// The element bound to a variable, compared by identity.
    Element(String),
}

impl Operand {
    /// Variable referenced by the operand, if any.
    pub fn variable(&self) -> Option<&str> {
        match self {
            Operand::Property { var, .. } | Operand::Element(var) => Some(var),
            Operand::Literal(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Property { var, key } => write!(f, "{var}.{key}"),
            Operand::Literal(value) => write!(f, "{value}"),
            Operand::Element(var) => write!(f, "{var}"),
        }
    }
}

/// `lhs op rhs`
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    /// Left operand.
    pub lhs: Operand,
    /// Operator.
    pub op: CmpOp,
    /// Right operand.
    pub rhs: Operand,
}

/// Predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Single comparison.
    Cmp(Comparison),
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

/// Values a predicate can see while it is evaluated against one row.
pub trait Bindings {
    /// Looks up `var.key`; `None` when the variable is unbound or the
    /// property does not exist.
    fn property(&self, var: &str, key: &str) -> Option<PropertyValue>;

    /// Returns the element bound to `var`.
    fn element(&self, var: &str) -> Option<&Binding>;
}

enum Term<'a> {
    Value(PropertyValue),
    Element(&'a Binding),
    Unknown,
}

impl Predicate {
    /// Builds a single comparison.
    pub fn compare(lhs: Operand, op: CmpOp, rhs: Operand) -> Predicate {
        Predicate::Cmp(Comparison { lhs, op, rhs })
    }

    /// `var.key = value`, as produced by inline property maps.
    pub fn property_equals(var: &str, key: &str, value: PropertyValue) -> Predicate {
        Predicate::compare(
            Operand::Property {
                var: var.to_owned(),
                key: key.to_owned(),
            },
            CmpOp::Eq,
            Operand::Literal(value),
        )
    }

    /// Variables referenced anywhere in the predicate.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Predicate::Cmp(cmp) => {
                out.extend(cmp.lhs.variable().map(str::to_owned));
                out.extend(cmp.rhs.variable().map(str::to_owned));
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_variables(out);
                }
            }
            Predicate::Not(inner) => inner.collect_variables(out),
        }
    }

    /// Property keys referenced per variable, as `(var, key)` pairs.
    pub fn property_refs(&self) -> BTreeSet<(String, String)> {
        let mut refs = BTreeSet::new();
        self.collect_property_refs(&mut refs);
        refs
    }

    fn collect_property_refs(&self, out: &mut BTreeSet<(String, String)>) {
        match self {
            Predicate::Cmp(cmp) => {
                for operand in [&cmp.lhs, &cmp.rhs] {
                    if let Operand::Property { var, key } = operand {
                        out.insert((var.clone(), key.clone()));
                    }
                }
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_property_refs(out);
                }
            }
            Predicate::Not(inner) => inner.collect_property_refs(out),
        }
    }

    /// Pushes negations down to the comparisons and flattens nested
    /// conjunctions and disjunctions.
    ///
    /// Kleene logic keeps De Morgan's laws, and negating a comparison flips
    /// its operator without changing which operands are unknown, so the
    /// result evaluates identically on every row.
    pub fn into_negation_normal_form(self) -> Predicate {
        match self {
            Predicate::Cmp(cmp) => Predicate::Cmp(cmp),
            Predicate::And(parts) => flatten_and(
                parts
                    .into_iter()
                    .map(Predicate::into_negation_normal_form)
                    .collect(),
            ),
            Predicate::Or(parts) => flatten_or(
                parts
                    .into_iter()
                    .map(Predicate::into_negation_normal_form)
                    .collect(),
            ),
            Predicate::Not(inner) => inner.negate(),
        }
    }

    fn negate(self) -> Predicate {
        match self {
            Predicate::Cmp(cmp) => Predicate::Cmp(Comparison {
                op: cmp.op.negated(),
                ..cmp
            }),
            Predicate::And(parts) => {
                flatten_or(parts.into_iter().map(Predicate::negate).collect())
            }
            Predicate::Or(parts) => {
                flatten_and(parts.into_iter().map(Predicate::negate).collect())
            }
            Predicate::Not(inner) => inner.into_negation_normal_form(),
        }
    }

    /// Splits the predicate into top-level conjuncts after normalisation.
    pub fn into_conjuncts(self) -> Vec<Predicate> {
        match self.into_negation_normal_form() {
            Predicate::And(parts) => parts,
            other => vec![other],
        }
    }

    /// Combines conjuncts back into one predicate; `None` when empty.
    pub fn conjunction(mut parts: Vec<Predicate>) -> Option<Predicate> {
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Predicate::And(parts)),
        }
    }

    /// Evaluates the predicate; `None` means unknown.
    pub fn evaluate<B: Bindings + ?Sized>(&self, row: &B) -> Option<bool> {
        match self {
            Predicate::Cmp(cmp) => compare(resolve(&cmp.lhs, row), cmp.op, resolve(&cmp.rhs, row)),
            Predicate::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.evaluate(row) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Predicate::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.evaluate(row) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Predicate::Not(inner) => inner.evaluate(row).map(|value| !value),
        }
    }

    /// Returns true only when the predicate evaluates to true.
    pub fn accepts<B: Bindings + ?Sized>(&self, row: &B) -> bool {
        self.evaluate(row) == Some(true)
    }
}

fn flatten_and(parts: Vec<Predicate>) -> Predicate {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Predicate::And(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        flat.remove(0)
    } else {
        Predicate::And(flat)
    }
}

fn flatten_or(parts: Vec<Predicate>) -> Predicate {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            Predicate::Or(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        flat.remove(0)
    } else {
        Predicate::Or(flat)
    }
}

fn resolve<'a, B: Bindings + ?Sized>(operand: &Operand, row: &'a B) -> Term<'a> {
    match operand {
        Operand::Property { var, key } => match row.property(var, key) {
            Some(value) if !value.is_null() => Term::Value(value),
            _ => Term::Unknown,
        },
        Operand::Literal(value) if value.is_null() => Term::Unknown,
        Operand::Literal(value) => Term::Value(value.clone()),
        Operand::Element(var) => row.element(var).map_or(Term::Unknown, Term::Element),
    }
}

fn compare(lhs: Term<'_>, op: CmpOp, rhs: Term<'_>) -> Option<bool> {
    match (lhs, rhs) {
        (Term::Value(a), Term::Value(b)) => match a.partial_cmp_value(&b) {
            Some(ordering) => Some(op.holds(ordering)),
            None => match op {
                CmpOp::Eq => Some(false),
                CmpOp::Ne => Some(true),
                _ => None,
            },
        },
        (Term::Element(a), Term::Element(b)) => match op {
            CmpOp::Eq => Some(a == b),
            CmpOp::Ne => Some(a != b),
            _ => None,
        },
        _ => None,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Cmp(cmp) => write!(f, "{} {} {}", cmp.lhs, cmp.op.symbol(), cmp.rhs),
            Predicate::And(parts) => write_joined(f, parts, " AND "),
            Predicate::Or(parts) => write_joined(f, parts, " OR "),
            Predicate::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{part}")?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VertexId;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Row {
        props: HashMap<(String, String), PropertyValue>,
        elements: HashMap<String, Binding>,
    }

    impl Bindings for Row {
        fn property(&self, var: &str, key: &str) -> Option<PropertyValue> {
            self.props.get(&(var.to_owned(), key.to_owned())).cloned()
        }

        fn element(&self, var: &str) -> Option<&Binding> {
            self.elements.get(var)
        }
    }

    fn prop(var: &str, key: &str) -> Operand {
        Operand::Property {
            var: var.into(),
            key: key.into(),
        }
    }

    fn lit(value: impl Into<PropertyValue>) -> Operand {
        Operand::Literal(value.into())
    }

    #[test]
    fn missing_property_is_unknown_and_negation_keeps_it_unknown() {
        let row = Row::default();
        let cmp = Predicate::compare(prop("a", "age"), CmpOp::Gt, lit(3_i64));
        assert_eq!(cmp.evaluate(&row), None);
        let negated = Predicate::Not(Box::new(cmp));
        assert_eq!(negated.evaluate(&row), None);
        assert!(!negated.accepts(&row));
    }

    #[test]
    fn kleene_connectives() {
        let mut row = Row::default();
        row.props
            .insert(("a".into(), "x".into()), PropertyValue::Int(1));
        let known_true = Predicate::compare(prop("a", "x"), CmpOp::Eq, lit(1_i64));
        let known_false = Predicate::compare(prop("a", "x"), CmpOp::Eq, lit(2_i64));
        let unknown = Predicate::compare(prop("a", "y"), CmpOp::Eq, lit(1_i64));
        assert_eq!(
            Predicate::Or(vec![unknown.clone(), known_true.clone()]).evaluate(&row),
            Some(true)
        );
        assert_eq!(
            Predicate::And(vec![unknown.clone(), known_false]).evaluate(&row),
            Some(false)
        );
        assert_eq!(Predicate::And(vec![unknown, known_true]).evaluate(&row), None);
    }

    #[test]
    fn negation_normal_form_splits_into_conjuncts() {
        let c1 = Predicate::compare(
            Operand::Element("c1".into()),
            CmpOp::Eq,
            Operand::Element("c2".into()),
        );
        let c2 = Predicate::compare(
            Operand::Element("o1".into()),
            CmpOp::Eq,
            Operand::Element("o2".into()),
        );
        let not_or = Predicate::Not(Box::new(Predicate::Or(vec![c1, c2])));
        let conjuncts = not_or.into_conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].to_string(), "c1 <> c2");
        assert_eq!(conjuncts[1].to_string(), "o1 <> o2");
    }

    #[test]
    fn element_identity_comparison() {
        let mut row = Row::default();
        row.elements
            .insert("a".into(), Binding::Vertex(VertexId(1)));
        row.elements
            .insert("b".into(), Binding::Vertex(VertexId(1)));
        let same = Predicate::compare(
            Operand::Element("a".into()),
            CmpOp::Eq,
            Operand::Element("b".into()),
        );
        assert_eq!(same.evaluate(&row), Some(true));
        let ordered = Predicate::compare(
            Operand::Element("a".into()),
            CmpOp::Lt,
            Operand::Element("b".into()),
        );
        assert_eq!(ordered.evaluate(&row), None);
    }

    #[test]
    fn mixed_types_are_unequal_but_unordered() {
        let mut row = Row::default();
        row.props
            .insert(("a".into(), "x".into()), PropertyValue::from("1"));
        let eq = Predicate::compare(prop("a", "x"), CmpOp::Eq, lit(1_i64));
        let lt = Predicate::compare(prop("a", "x"), CmpOp::Lt, lit(1_i64));
        assert_eq!(eq.evaluate(&row), Some(false));
        assert_eq!(lt.evaluate(&row), None);
    }
}
