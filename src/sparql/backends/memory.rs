//! In-memory quad store backend.
//!
//! Evaluates the query algebra directly against a set of quads. It is used
//! by the test suite and is suitable for embedded use with small datasets.
//!
//! Dataset semantics: queries read the union of the default graph and all
//! named graphs; `DELETE … WHERE` without a graph and data operations
//! without a graph target the default graph only.
//!
//! # Example
//!
//! ```ignore
//! use triplemap::sparql::backends::memory::MemoryStore;
//! use triplemap::sparql::QueryExt;
//!
//! let store = MemoryStore::new();
//! store.update(&create).await?;
//! let rows = store.query(select).fetch_all().await?;
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::error::MapperError;
use crate::rdf::{Iri, Literal, Quad, Term};
use crate::rdf::vocabulary::xsd;
use crate::sparql::algebra::{
    AskQuery, Element, Expression, GroupPattern, Order, Projection, SelectQuery, TermPattern,
    TriplePattern, UpdateOperation, UpdateRequest, Var,
};
use crate::sparql::row::{Row, RowStream};
use crate::sparql::traits::{SparqlClient, SparqlExecutor, Transaction};

type Solution = HashMap<Var, Term>;

/// Which graphs a pattern is matched against.
#[derive(Clone, Copy)]
enum Scope<'a> {
    Union,
    Graph(Option<&'a Iri>),
}

/// A thread-safe in-memory quad store.
///
/// Cheap to clone: clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    quads: Arc<RwLock<BTreeSet<Quad>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts quads directly, bypassing the update language.
    pub fn insert<I: IntoIterator<Item = Quad>>(&self, quads: I) -> Result<(), MapperError> {
        let mut guard = self.write()?;
        guard.extend(quads);
        Ok(())
    }

    /// Snapshot of all stored quads.
    pub fn quads(&self) -> Result<Vec<Quad>, MapperError> {
        Ok(self.read()?.iter().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, MapperError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, MapperError> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeSet<Quad>>, MapperError> {
        self.quads
            .read()
            .map_err(|_| MapperError::Internal("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeSet<Quad>>, MapperError> {
        self.quads
            .write()
            .map_err(|_| MapperError::Internal("memory store lock poisoned".to_string()))
    }

    /// Applies every request to a copy of the data and swaps it in only if
    /// all operations succeed.
    fn apply(&self, requests: &[UpdateRequest]) -> Result<(), MapperError> {
        let mut guard = self.write()?;
        let mut next = guard.clone();
        for request in requests {
            for op in request.operations() {
                apply_operation(&mut next, op)?;
            }
        }
        *guard = next;
        Ok(())
    }

    fn run_select(&self, query: &SelectQuery) -> Result<Vec<Row>, MapperError> {
        let quads = self.read()?;
        let mut solutions = eval_group(&quads, &query.pattern, vec![Solution::new()], Scope::Union)?;

        if !query.order_by.is_empty() {
            solutions.sort_by(|a, b| {
                for (var, order) in &query.order_by {
                    let ord = compare_terms(a.get(var), b.get(var));
                    let ord = match order {
                        Order::Asc => ord,
                        Order::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let mut rows: Vec<Row> = match &query.projection {
            Projection::Vars(vars) => solutions
                .into_iter()
                .map(|s| project(s, vars))
                .collect(),
            Projection::CountDistinct { var, alias } => {
                let distinct: HashSet<&Term> = solutions.iter().filter_map(|s| s.get(var)).collect();
                let count = Literal::typed(distinct.len().to_string(), Iri::from_static(xsd::INTEGER));
                vec![Row::default().with(alias.name(), count)]
            }
        };

        if query.distinct {
            let mut seen = Vec::new();
            rows.retain(|row| {
                if seen.contains(row) {
                    false
                } else {
                    seen.push(row.clone());
                    true
                }
            });
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

fn project(solution: Solution, vars: &[Var]) -> Row {
    let data = solution
        .into_iter()
        .filter(|(var, _)| vars.is_empty() || vars.contains(var))
        .map(|(var, term)| (var.name().to_string(), term))
        .collect::<HashMap<_, _>>();
    Row::new(data)
}

fn apply_operation(quads: &mut BTreeSet<Quad>, op: &UpdateOperation) -> Result<(), MapperError> {
    match op {
        UpdateOperation::InsertData(data) => {
            quads.extend(data.iter().cloned());
        }
        UpdateOperation::DeleteData(data) => {
            for quad in data {
                quads.remove(quad);
            }
        }
        UpdateOperation::DeleteWhere { graph, pattern } => {
            let scope = Scope::Graph(graph.as_ref());
            let solutions = eval_triple(quads, pattern, vec![Solution::new()], scope);
            let mut doomed = Vec::new();
            for solution in solutions {
                doomed.push(instantiate(pattern, &solution, graph.clone())?);
            }
            for quad in doomed {
                quads.remove(&quad);
            }
        }
        UpdateOperation::ClearGraph(graph) => {
            quads.retain(|q| q.graph.as_ref() != Some(graph));
        }
        UpdateOperation::ClearAll => quads.clear(),
    }
    Ok(())
}

fn instantiate(
    pattern: &TriplePattern,
    solution: &Solution,
    graph: Option<Iri>,
) -> Result<Quad, MapperError> {
    let resolve = |tp: &TermPattern| -> Option<Term> {
        match tp {
            TermPattern::Term(t) => Some(t.clone()),
            TermPattern::Var(v) => solution.get(v).cloned(),
        }
    };
    let unbound = || MapperError::Internal(format!("unbound variable in delete pattern {}", pattern));

    let subject = resolve(&pattern.subject)
        .and_then(|t| t.as_iri().cloned())
        .ok_or_else(unbound)?;
    let predicate = resolve(&pattern.predicate)
        .and_then(|t| t.as_iri().cloned())
        .ok_or_else(unbound)?;
    let object = resolve(&pattern.object).ok_or_else(unbound)?;
    Ok(Quad::new(subject, predicate, object, graph))
}

fn eval_group(
    quads: &BTreeSet<Quad>,
    group: &GroupPattern,
    seed: Vec<Solution>,
    scope: Scope<'_>,
) -> Result<Vec<Solution>, MapperError> {
    let mut solutions = seed;
    let mut filters = Vec::new();

    for element in group.elements() {
        solutions = match element {
            Element::Triple(pattern) => eval_triple(quads, pattern, solutions, scope),
            Element::ZeroOrMore {
                subject,
                predicate,
                object,
            } => eval_path(quads, subject, predicate, object, solutions)?,
            Element::Optional(inner) => {
                let mut out = Vec::new();
                for solution in solutions {
                    let extended = eval_group(quads, inner, vec![solution.clone()], scope)?;
                    if extended.is_empty() {
                        out.push(solution);
                    } else {
                        out.extend(extended);
                    }
                }
                out
            }
            Element::Graph { name, group } => eval_graph(quads, name, group, solutions)?,
            Element::Union(left, right) => {
                let mut out = eval_group(quads, left, solutions.clone(), scope)?;
                out.extend(eval_group(quads, right, solutions, scope)?);
                out
            }
            Element::Filter(expr) => {
                filters.push(expr);
                solutions
            }
            Element::Values { var, terms } => {
                let mut out = Vec::new();
                for solution in solutions {
                    for term in terms {
                        match solution.get(var) {
                            Some(bound) if bound != term => {}
                            Some(_) => out.push(solution.clone()),
                            None => {
                                let mut s = solution.clone();
                                s.insert(var.clone(), term.clone());
                                out.push(s);
                            }
                        }
                    }
                }
                out
            }
        };
    }

    solutions.retain(|s| filters.iter().all(|f| eval_filter(f, s)));
    Ok(solutions)
}

fn eval_triple(
    quads: &BTreeSet<Quad>,
    pattern: &TriplePattern,
    seed: Vec<Solution>,
    scope: Scope<'_>,
) -> Vec<Solution> {
    let mut out = Vec::new();
    for solution in seed {
        for quad in quads.iter() {
            if let Scope::Graph(g) = scope {
                if quad.graph.as_ref() != g {
                    continue;
                }
            }
            let mut candidate = solution.clone();
            if bind(&mut candidate, &pattern.subject, &Term::Iri(quad.subject.clone()))
                && bind(&mut candidate, &pattern.predicate, &Term::Iri(quad.predicate.clone()))
                && bind(&mut candidate, &pattern.object, &quad.object)
            {
                out.push(candidate);
            }
        }
    }

    // The union view may hold the same triple in several graphs.
    if matches!(scope, Scope::Union) {
        dedupe(&mut out);
    }
    out
}

fn eval_graph(
    quads: &BTreeSet<Quad>,
    name: &TermPattern,
    group: &GroupPattern,
    seed: Vec<Solution>,
) -> Result<Vec<Solution>, MapperError> {
    let graphs: BTreeSet<&Iri> = quads.iter().filter_map(|q| q.graph.as_ref()).collect();
    let mut out = Vec::new();

    for solution in seed {
        let wanted = match name {
            TermPattern::Term(Term::Iri(iri)) => Some(iri.clone()),
            TermPattern::Term(Term::Literal(_)) => continue,
            TermPattern::Var(v) => match solution.get(v) {
                Some(Term::Iri(iri)) => Some(iri.clone()),
                Some(Term::Literal(_)) => continue,
                None => None,
            },
        };

        for graph in graphs.iter().copied() {
            if wanted.as_ref().is_some_and(|w| w != graph) {
                continue;
            }
            let mut seeded = solution.clone();
            if let TermPattern::Var(v) = name {
                seeded.insert(v.clone(), Term::Iri(graph.clone()));
            }
            out.extend(eval_group(quads, group, vec![seeded], Scope::Graph(Some(graph)))?);
        }
    }
    Ok(out)
}

fn eval_path(
    quads: &BTreeSet<Quad>,
    subject: &TermPattern,
    predicate: &Iri,
    object: &TermPattern,
    seed: Vec<Solution>,
) -> Result<Vec<Solution>, MapperError> {
    let mut out = Vec::new();
    for solution in seed {
        let start = resolve(subject, &solution);
        let end = resolve(object, &solution);

        match (start, end) {
            (Some(start), _) => {
                for reached in closure(quads, &start, predicate, true) {
                    let mut candidate = solution.clone();
                    if bind(&mut candidate, object, &reached) {
                        out.push(candidate);
                    }
                }
            }
            (None, Some(end)) => {
                for reached in closure(quads, &end, predicate, false) {
                    let mut candidate = solution.clone();
                    if bind(&mut candidate, subject, &reached) {
                        out.push(candidate);
                    }
                }
            }
            (None, None) => {
                return Err(MapperError::Query {
                    message: "property path with both ends unbound".to_string(),
                    query: format!("{} {}* {}", subject, predicate, object),
                });
            }
        }
    }
    Ok(out)
}

/// Nodes reachable from `start` through zero or more `predicate` edges.
fn closure(quads: &BTreeSet<Quad>, start: &Term, predicate: &Iri, forward: bool) -> Vec<Term> {
    let mut seen = vec![start.clone()];
    let mut frontier = vec![start.clone()];

    while let Some(node) = frontier.pop() {
        for quad in quads.iter().filter(|q| &q.predicate == predicate) {
            let next = if forward {
                (Term::Iri(quad.subject.clone()) == node).then(|| quad.object.clone())
            } else {
                (quad.object == node).then(|| Term::Iri(quad.subject.clone()))
            };
            if let Some(next) = next {
                if !seen.contains(&next) {
                    seen.push(next.clone());
                    frontier.push(next);
                }
            }
        }
    }
    seen
}

fn resolve(pattern: &TermPattern, solution: &Solution) -> Option<Term> {
    match pattern {
        TermPattern::Term(t) => Some(t.clone()),
        TermPattern::Var(v) => solution.get(v).cloned(),
    }
}

/// Binds `pattern` to `value` in `solution`; false on conflict.
fn bind(solution: &mut Solution, pattern: &TermPattern, value: &Term) -> bool {
    match pattern {
        TermPattern::Term(t) => t == value,
        TermPattern::Var(v) => match solution.get(v) {
            Some(bound) => bound == value,
            None => {
                solution.insert(v.clone(), value.clone());
                true
            }
        },
    }
}

fn eval_filter(expr: &Expression, solution: &Solution) -> bool {
    match expr {
        Expression::Eq(var, term) => solution.get(var).is_some_and(|v| terms_equal(v, term)),
        Expression::In(var, terms) => solution
            .get(var)
            .is_some_and(|v| terms.iter().any(|t| terms_equal(v, t))),
        // Unbound operands make the expression an error, which filters out.
        Expression::NotIn(var, terms) => solution
            .get(var)
            .is_some_and(|v| !terms.iter().any(|t| terms_equal(v, t))),
        Expression::Contains(var, needle) => solution
            .get(var)
            .is_some_and(|v| v.value().to_lowercase().contains(&needle.to_lowercase())),
    }
}

fn terms_equal(a: &Term, b: &Term) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Term::Literal(x), Term::Literal(y)) => match (x.as_number(), y.as_number()) {
            (Some(m), Some(n)) => m == n,
            _ => false,
        },
        _ => false,
    }
}

fn compare_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Term::Literal(x)), Some(Term::Literal(y))) => match (x.as_number(), y.as_number()) {
            (Some(m), Some(n)) => m.partial_cmp(&n).unwrap_or(Ordering::Equal),
            _ => x.lexical().cmp(y.lexical()),
        },
        (Some(x), Some(y)) => x.value().cmp(y.value()),
    }
}

fn dedupe(solutions: &mut Vec<Solution>) {
    let mut kept: Vec<Solution> = Vec::with_capacity(solutions.len());
    for s in solutions.drain(..) {
        if !kept.contains(&s) {
            kept.push(s);
        }
    }
    *solutions = kept;
}

#[async_trait]
impl SparqlExecutor for MemoryStore {
    async fn select(&self, query: &SelectQuery) -> Result<RowStream<'_>, MapperError> {
        tracing::debug!("SPARQL SELECT (memory)\n{}", query);
        let rows = self.run_select(query)?;
        Ok(Box::pin(futures::stream::iter(rows.into_iter().map(Ok))))
    }

    async fn ask(&self, query: &AskQuery) -> Result<bool, MapperError> {
        tracing::debug!("SPARQL ASK (memory)\n{}", query);
        let quads = self.read()?;
        let solutions = eval_group(&quads, &query.pattern, vec![Solution::new()], Scope::Union)?;
        Ok(!solutions.is_empty())
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), MapperError> {
        tracing::debug!("SPARQL UPDATE (memory)\n{}", request);
        self.apply(std::slice::from_ref(request))
    }
}

/// A transaction buffering updates until commit.
///
/// Reads go to the committed data; buffered updates are not visible until
/// the transaction commits.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    pending: Mutex<Vec<UpdateRequest>>,
}

#[async_trait]
impl SparqlExecutor for MemoryTransaction<'_> {
    async fn select(&self, query: &SelectQuery) -> Result<RowStream<'_>, MapperError> {
        self.store.select(query).await
    }

    async fn ask(&self, query: &AskQuery) -> Result<bool, MapperError> {
        self.store.ask(query).await
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), MapperError> {
        self.pending
            .lock()
            .map_err(|_| MapperError::Transaction("transaction lock poisoned".to_string()))?
            .push(request.clone());
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction<'_> {
    async fn commit(self) -> Result<(), MapperError> {
        let pending = self
            .pending
            .into_inner()
            .map_err(|_| MapperError::Transaction("transaction lock poisoned".to_string()))?;
        tracing::debug!("SPARQL TRANSACTION COMMIT ({} requests)", pending.len());
        self.store.apply(&pending)
    }

    async fn rollback(self) -> Result<(), MapperError> {
        tracing::debug!("SPARQL TRANSACTION ROLLBACK");
        Ok(())
    }
}

#[async_trait]
impl SparqlClient for MemoryStore {
    type Tx<'a> = MemoryTransaction<'a>;

    async fn begin(&self) -> Result<Self::Tx<'_>, MapperError> {
        tracing::debug!("SPARQL TRANSACTION START");
        Ok(MemoryTransaction {
            store: self,
            pending: Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LiteralCodec;
    use crate::rdf::vocabulary::{rdf, rdfs};
    use crate::sparql::QueryExt;

    fn iri(s: &str) -> Iri {
        Iri::parse(&format!("http://x.org/{}", s)).unwrap()
    }

    fn quad(s: &str, p: &str, o: impl Into<Term>, g: Option<&str>) -> Quad {
        Quad::new(iri(s), iri(p), o, g.map(iri))
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert(vec![
                quad("a", "label", Literal::string("alpha"), None),
                quad("b", "label", Literal::string("beta"), Some("g1")),
                quad("a", "knows", iri("b"), Some("g1")),
                quad("a", "rank", 2i64.to_term(), None),
                quad("b", "rank", 10i64.to_term(), None),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_select_reads_union_of_graphs() {
        let store = seeded();
        let select = SelectQuery::new(
            vec![Var::new("s"), Var::new("label")],
            GroupPattern::of_triple(Var::new("s"), iri("label"), Var::new("label")),
        );
        let rows = store.query(select).fetch_all().await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_optional_keeps_unmatched_solutions() {
        let store = seeded();
        let mut pattern = GroupPattern::of_triple(Var::new("s"), iri("label"), Var::new("label"));
        pattern.optional(GroupPattern::of_triple(Var::new("s"), iri("knows"), Var::new("friend")));

        let rows = store
            .query(SelectQuery::new(vec![Var::new("s"), Var::new("friend")], pattern))
            .order_by("s", Order::Asc)
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_iri("friend").unwrap(), iri("b"));
        assert!(rows[1].get_raw("friend").is_none());
    }

    #[tokio::test]
    async fn test_order_by_numeric_and_limit() {
        let store = seeded();
        let rows = store
            .query(SelectQuery::new(
                vec![Var::new("s")],
                GroupPattern::of_triple(Var::new("s"), iri("rank"), Var::new("rank")),
            ))
            .order_by("rank", Order::Desc)
            .limit(1)
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_iri("s").unwrap(), iri("b"));
    }

    #[tokio::test]
    async fn test_subclass_path_closure() {
        let store = MemoryStore::new();
        let sub = Iri::from_static(rdfs::SUB_CLASS_OF);
        store
            .insert(vec![
                Quad::new(iri("C"), sub.clone(), iri("B"), None),
                Quad::new(iri("B"), sub.clone(), iri("A"), None),
                Quad::new(iri("x"), Iri::from_static(rdf::TYPE), iri("C"), None),
            ])
            .unwrap();

        let mut pattern = GroupPattern::new();
        pattern
            .triple(Var::new("s"), Iri::from_static(rdf::TYPE), Var::new("t"))
            .zero_or_more(Var::new("t"), sub, iri("A"));
        let ask = AskQuery::new(pattern);
        assert!(store.ask(&ask).await.unwrap());
    }

    #[tokio::test]
    async fn test_graph_variable_binding() {
        let store = seeded();
        let mut pattern = GroupPattern::new();
        pattern.graph(
            Var::new("g"),
            GroupPattern::of_triple(iri("a"), Var::new("p"), Var::new("o")),
        );
        let rows = store
            .query(SelectQuery::new(vec![Var::new("g"), Var::new("p")], pattern))
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_iri("g").unwrap(), iri("g1"));
    }

    #[tokio::test]
    async fn test_count_distinct() {
        let store = seeded();
        let rows = store
            .query(SelectQuery::count_distinct(
                Var::new("s"),
                Var::new("count"),
                GroupPattern::of_triple(Var::new("s"), Var::new("p"), Var::new("o")),
            ))
            .fetch_all()
            .await
            .unwrap();
        assert_eq!(rows[0].get::<i64>("count").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_where_targets_one_graph() {
        let store = seeded();
        let request: UpdateRequest = UpdateOperation::DeleteWhere {
            graph: None,
            pattern: TriplePattern::new(iri("b"), iri("label"), Var::new("x")),
        }
        .into();
        store.update(&request).await.unwrap();
        // The label lives in g1, not in the default graph.
        assert_eq!(store.len().unwrap(), 5);

        let request: UpdateRequest = UpdateOperation::DeleteWhere {
            graph: Some(iri("g1")),
            pattern: TriplePattern::new(iri("b"), iri("label"), Var::new("x")),
        }
        .into();
        store.update(&request).await.unwrap();
        assert_eq!(store.len().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let store = MemoryStore::new();
        let insert: UpdateRequest =
            UpdateOperation::InsertData(vec![quad("a", "label", Literal::string("a"), None)]).into();

        let txn = store.begin().await.unwrap();
        txn.update(&insert).await.unwrap();
        assert!(store.is_empty().unwrap());
        txn.rollback().await.unwrap();
        assert!(store.is_empty().unwrap());

        let txn = store.begin().await.unwrap();
        txn.update(&insert).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_operations_apply_in_order() {
        let store = MemoryStore::new();
        let mut request = UpdateRequest::new();
        request.push(UpdateOperation::InsertData(vec![quad(
            "a",
            "label",
            Literal::string("a"),
            None,
        )]));
        request.push(UpdateOperation::DeleteWhere {
            graph: None,
            pattern: TriplePattern::new(iri("a"), iri("label"), Var::new("x")),
        });
        request.push(UpdateOperation::InsertData(vec![quad(
            "a",
            "label",
            Literal::string("b"),
            None,
        )]));
        store.update(&request).await.unwrap();

        let quads = store.quads().unwrap();
        assert_eq!(quads.len(), 1);
        assert_eq!(quads[0].object, Term::Literal(Literal::string("b")));
    }

    #[tokio::test]
    async fn test_clear_graph_and_clear_all() {
        let store = seeded();
        store.clear_graph(&iri("g1")).await.unwrap();
        assert_eq!(store.len().unwrap(), 3);
        assert!(store.quads().unwrap().iter().all(|q| q.graph.is_none()));

        store.clear().await.unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_path_with_unbound_ends_is_rejected() {
        let store = seeded();
        let mut pattern = GroupPattern::new();
        pattern.zero_or_more(Var::new("a"), iri("knows"), Var::new("b"));
        let result = store.ask(&AskQuery::new(pattern)).await;
        assert!(matches!(result, Err(MapperError::Query { .. })));
    }
}
