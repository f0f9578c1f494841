//! Query algebra for the SPARQL subset the mapper emits.
//!
//! Queries are built as values rather than strings so that templates can be
//! cloned and constrained safely, and so that backends can either render
//! them to SPARQL text ([`fmt::Display`]) or evaluate them directly.
//!
//! Supported: basic graph patterns, `OPTIONAL`, `GRAPH`, `UNION`, `VALUES`,
//! zero-or-more property paths, a handful of filters, `COUNT(DISTINCT)`,
//! `ORDER BY` / `LIMIT` / `OFFSET`, and the `INSERT DATA`, `DELETE DATA`,
//! `DELETE … WHERE` and `CLEAR GRAPH` update forms.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::rdf::{Iri, Literal, Quad, Term};

/// A query variable, rendered as `?name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(Arc<str>);

impl Var {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name.trim_start_matches('?')))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// Either a variable or a concrete term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermPattern {
    Var(Var),
    Term(Term),
}

impl TermPattern {
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            TermPattern::Var(v) => Some(v),
            TermPattern::Term(_) => None,
        }
    }
}

impl fmt::Display for TermPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermPattern::Var(v) => v.fmt(f),
            TermPattern::Term(t) => t.fmt(f),
        }
    }
}

impl From<Var> for TermPattern {
    fn from(v: Var) -> Self {
        TermPattern::Var(v)
    }
}

impl From<&Var> for TermPattern {
    fn from(v: &Var) -> Self {
        TermPattern::Var(v.clone())
    }
}

impl From<Iri> for TermPattern {
    fn from(iri: Iri) -> Self {
        TermPattern::Term(Term::Iri(iri))
    }
}

impl From<&Iri> for TermPattern {
    fn from(iri: &Iri) -> Self {
        TermPattern::Term(Term::Iri(iri.clone()))
    }
}

impl From<Term> for TermPattern {
    fn from(t: Term) -> Self {
        TermPattern::Term(t)
    }
}

impl From<Literal> for TermPattern {
    fn from(lit: Literal) -> Self {
        TermPattern::Term(Term::Literal(lit))
    }
}

/// A single `subject predicate object` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: TermPattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Filter expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Eq(Var, Term),
    In(Var, Vec<Term>),
    NotIn(Var, Vec<Term>),
    /// Case-insensitive substring match on the string value.
    Contains(Var, String),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Eq(v, t) => write!(f, "{} = {}", v, t),
            Expression::In(v, terms) => write!(f, "{} IN ({})", v, join(terms, ", ")),
            Expression::NotIn(v, terms) => write!(f, "{} NOT IN ({})", v, join(terms, ", ")),
            Expression::Contains(v, needle) => write!(
                f,
                "CONTAINS(LCASE(STR({})), {})",
                v,
                Literal::string(needle.to_lowercase())
            ),
        }
    }
}

/// One element of a group graph pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Triple(TriplePattern),
    /// `subject predicate* object`
    ZeroOrMore {
        subject: TermPattern,
        predicate: Iri,
        object: TermPattern,
    },
    Optional(GroupPattern),
    Graph {
        name: TermPattern,
        group: GroupPattern,
    },
    Union(GroupPattern, GroupPattern),
    Filter(Expression),
    Values {
        var: Var,
        terms: Vec<Term>,
    },
}

/// A `{ ... }` group of elements, evaluated in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPattern {
    elements: Vec<Element>,
}

impl GroupPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn push(&mut self, element: Element) -> &mut Self {
        self.elements.push(element);
        self
    }

    pub fn triple(
        &mut self,
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> &mut Self {
        self.push(Element::Triple(TriplePattern::new(subject, predicate, object)))
    }

    pub fn zero_or_more(
        &mut self,
        subject: impl Into<TermPattern>,
        predicate: Iri,
        object: impl Into<TermPattern>,
    ) -> &mut Self {
        self.push(Element::ZeroOrMore {
            subject: subject.into(),
            predicate,
            object: object.into(),
        })
    }

    pub fn optional(&mut self, group: GroupPattern) -> &mut Self {
        self.push(Element::Optional(group))
    }

    pub fn graph(&mut self, name: impl Into<TermPattern>, group: GroupPattern) -> &mut Self {
        self.push(Element::Graph {
            name: name.into(),
            group,
        })
    }

    pub fn union(&mut self, left: GroupPattern, right: GroupPattern) -> &mut Self {
        self.push(Element::Union(left, right))
    }

    pub fn filter(&mut self, expression: Expression) -> &mut Self {
        self.push(Element::Filter(expression))
    }

    /// Appends all elements of another group.
    pub fn extend(&mut self, other: GroupPattern) -> &mut Self {
        self.elements.extend(other.elements);
        self
    }

    /// Inline data, placed first so it constrains everything after it.
    pub fn values(&mut self, var: Var, terms: Vec<Term>) -> &mut Self {
        self.elements.insert(0, Element::Values { var, terms });
        self
    }

    /// A group holding a single triple pattern.
    pub fn of_triple(
        subject: impl Into<TermPattern>,
        predicate: impl Into<TermPattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        let mut group = Self::new();
        group.triple(subject, predicate, object);
        group
    }

    fn write_indented(&self, out: &mut String, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        for element in &self.elements {
            match element {
                Element::Triple(t) => writeln!(out, "{}{}", pad, t)?,
                Element::ZeroOrMore {
                    subject,
                    predicate,
                    object,
                } => writeln!(out, "{}{} {}* {} .", pad, subject, predicate, object)?,
                Element::Optional(group) => {
                    writeln!(out, "{}OPTIONAL {{", pad)?;
                    group.write_indented(out, depth + 1)?;
                    writeln!(out, "{}}}", pad)?;
                }
                Element::Graph { name, group } => {
                    writeln!(out, "{}GRAPH {} {{", pad, name)?;
                    group.write_indented(out, depth + 1)?;
                    writeln!(out, "{}}}", pad)?;
                }
                Element::Union(left, right) => {
                    writeln!(out, "{}{{", pad)?;
                    left.write_indented(out, depth + 1)?;
                    writeln!(out, "{}}} UNION {{", pad)?;
                    right.write_indented(out, depth + 1)?;
                    writeln!(out, "{}}}", pad)?;
                }
                Element::Filter(expr) => writeln!(out, "{}FILTER({})", pad, expr)?,
                Element::Values { var, terms } => {
                    writeln!(out, "{}VALUES {} {{ {} }}", pad, var, join(terms, " "))?
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for GroupPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_indented(&mut out, 1)?;
        write!(f, "{{\n{}}}", out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// What a select returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Vars(Vec<Var>),
    /// `(COUNT(DISTINCT ?var) AS ?alias)`
    CountDistinct { var: Var, alias: Var },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub projection: Projection,
    pub distinct: bool,
    pub pattern: GroupPattern,
    pub order_by: Vec<(Var, Order)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SelectQuery {
    pub fn new(vars: Vec<Var>, pattern: GroupPattern) -> Self {
        Self {
            projection: Projection::Vars(vars),
            distinct: false,
            pattern,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn count_distinct(var: Var, alias: Var, pattern: GroupPattern) -> Self {
        Self {
            projection: Projection::CountDistinct { var, alias },
            ..Self::new(Vec::new(), pattern)
        }
    }

    /// Restricts a variable to the given terms.
    pub fn values(&mut self, var: Var, terms: Vec<Term>) -> &mut Self {
        self.pattern.values(var, terms);
        self
    }

    pub fn filter(&mut self, expression: Expression) -> &mut Self {
        self.pattern.filter(expression);
        self
    }

    pub fn order_by(&mut self, var: Var, order: Order) -> &mut Self {
        self.order_by.push((var, order));
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        match &self.projection {
            Projection::Vars(vars) if vars.is_empty() => f.write_str("*")?,
            Projection::Vars(vars) => f.write_str(&join(vars, " "))?,
            Projection::CountDistinct { var, alias } => {
                write!(f, "(COUNT(DISTINCT {}) AS {})", var, alias)?
            }
        }
        write!(f, " WHERE {}", self.pattern)?;
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY")?;
            for (var, order) in &self.order_by {
                match order {
                    Order::Asc => write!(f, " ASC({})", var)?,
                    Order::Desc => write!(f, " DESC({})", var)?,
                }
            }
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskQuery {
    pub pattern: GroupPattern,
}

impl AskQuery {
    pub fn new(pattern: GroupPattern) -> Self {
        Self { pattern }
    }
}

impl fmt::Display for AskQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ASK {}", self.pattern)
    }
}

/// One operation of an update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOperation {
    InsertData(Vec<Quad>),
    DeleteData(Vec<Quad>),
    /// Deletes whatever currently matches `pattern`, in `graph` or the default graph.
    DeleteWhere {
        graph: Option<Iri>,
        pattern: TriplePattern,
    },
    ClearGraph(Iri),
    /// Empties the default graph and every named graph.
    ClearAll,
}

impl UpdateOperation {
    /// Quads carried by data operations.
    pub fn quads(&self) -> &[Quad] {
        match self {
            UpdateOperation::InsertData(quads) | UpdateOperation::DeleteData(quads) => quads,
            _ => &[],
        }
    }
}

impl fmt::Display for UpdateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOperation::InsertData(quads) => write!(f, "INSERT DATA {}", QuadBlock(quads)),
            UpdateOperation::DeleteData(quads) => write!(f, "DELETE DATA {}", QuadBlock(quads)),
            UpdateOperation::DeleteWhere { graph, pattern } => match graph {
                Some(g) => write!(
                    f,
                    "DELETE {{ GRAPH {} {{ {} }} }} WHERE {{ GRAPH {} {{ {} }} }}",
                    g, pattern, g, pattern
                ),
                None => write!(f, "DELETE {{ {} }} WHERE {{ {} }}", pattern, pattern),
            },
            UpdateOperation::ClearGraph(g) => write!(f, "CLEAR SILENT GRAPH {}", g),
            UpdateOperation::ClearAll => f.write_str("CLEAR SILENT ALL"),
        }
    }
}

struct QuadBlock<'a>(&'a [Quad]);

impl fmt::Display for QuadBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut by_graph: BTreeMap<Option<&Iri>, Vec<&Quad>> = BTreeMap::new();
        for quad in self.0 {
            by_graph.entry(quad.graph.as_ref()).or_default().push(quad);
        }

        f.write_str("{\n")?;
        for (graph, quads) in by_graph {
            let pad = if graph.is_some() { "    " } else { "  " };
            if let Some(g) = graph {
                writeln!(f, "  GRAPH {} {{", g)?;
            }
            for q in quads {
                writeln!(f, "{}{} {} {} .", pad, q.subject, q.predicate, q.object)?;
            }
            if graph.is_some() {
                f.write_str("  }\n")?;
            }
        }
        f.write_str("}")
    }
}

/// An ordered list of update operations sent as one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    operations: Vec<UpdateOperation>,
}

impl UpdateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: UpdateOperation) {
        // Empty data blocks are valid SPARQL but pointless on the wire.
        if let UpdateOperation::InsertData(q) | UpdateOperation::DeleteData(q) = &operation {
            if q.is_empty() {
                return;
            }
        }
        self.operations.push(operation);
    }

    /// Appends all operations of another request.
    pub fn extend(&mut self, other: UpdateRequest) {
        for op in other.operations {
            self.push(op);
        }
    }

    pub fn operations(&self) -> &[UpdateOperation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// All quads inserted by this request.
    pub fn inserted(&self) -> impl Iterator<Item = &Quad> {
        self.operations.iter().filter_map(|op| match op {
            UpdateOperation::InsertData(q) => Some(q.iter()),
            _ => None,
        }).flatten()
    }

    /// All delete-by-pattern operations of this request.
    pub fn delete_patterns(&self) -> impl Iterator<Item = &TriplePattern> {
        self.operations.iter().filter_map(|op| match op {
            UpdateOperation::DeleteWhere { pattern, .. } => Some(pattern),
            _ => None,
        })
    }
}

impl fmt::Display for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops: Vec<String> = self.operations.iter().map(|op| op.to_string()).collect();
        f.write_str(&ops.join(" ;\n"))
    }
}

impl From<UpdateOperation> for UpdateRequest {
    fn from(op: UpdateOperation) -> Self {
        let mut request = Self::new();
        request.push(op);
        request
    }
}

fn join<T: fmt::Display>(items: &[T], sep: &str) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}
