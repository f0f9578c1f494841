//! Deferred loading of relations.
//!
//! [`Lazy<T>`] is either loaded (holds a value) or pending (holds a loader).
//! Materialized instances get pending proxies for their references and
//! lists; [`Lazy::force`] runs the loader once and caches the value for the
//! proxy's lifetime. Instances built by hand use loaded values, so callers
//! read both the same way.
//!
//! # Example
//!
//! ```ignore
//! let experiment: Experiment = repository.load_by_uri(&uri).await?.ok_or(MapperError::NotFound(uri.to_string()))?;
//!
//! // Nothing was fetched for the projects yet.
//! assert!(!experiment.projects.is_loaded());
//!
//! for project in experiment.projects.force().await? {
//!     println!("{}", project.force().await?.label.as_deref().unwrap_or(""));
//! }
//! ```

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::codec::LiteralCodec;
use crate::error::MapperError;
use crate::mapping::materializer;
use crate::mapping::registry::Registry;
use crate::mapping::schema::Resource;
use crate::mapping::synthesizer;
use crate::rdf::{Iri, Term};
use crate::sparql::{Expression, GroupPattern, QueryExt, SelectQuery, SparqlExecutor, Var};

/// A multi-valued literal field.
pub type LiteralList<V> = Lazy<Vec<V>>;

/// A multi-valued reference field.
pub type RefList<R> = Lazy<Vec<Ref<R>>>;

/// Produces the value of a pending proxy.
#[async_trait]
pub trait Loader<T>: Send + Sync {
    async fn load(&self) -> Result<T, MapperError>;
}

/// What a loader needs to reach the store.
#[derive(Clone)]
pub struct LoadContext {
    pub executor: Arc<dyn SparqlExecutor>,
    pub registry: Arc<Registry>,
    /// Graph reads are restricted to; `None` reads every graph.
    pub graph: Option<Iri>,
}

impl LoadContext {
    pub fn new(executor: Arc<dyn SparqlExecutor>, registry: Arc<Registry>) -> Self {
        Self {
            executor,
            registry,
            graph: None,
        }
    }

    pub fn in_graph(mut self, graph: Option<Iri>) -> Self {
        self.graph = graph;
        self
    }
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Lazy
// ----------------------------------------------------------------------------

/// A value that may be loaded on first access.
///
/// Three states: loaded, pending (has a loader) and detached (neither). A
/// pending value moves to loaded at most once; concurrent calls to
/// [`force`](Lazy::force) share a single load. A failed load leaves the
/// value pending so a later call can retry.
pub struct Lazy<T> {
    cell: OnceCell<T>,
    loader: Option<Arc<dyn Loader<T>>>,
}

impl<T> Lazy<T> {
    pub fn loaded(value: T) -> Self {
        Self {
            cell: OnceCell::new_with(Some(value)),
            loader: None,
        }
    }

    pub fn pending(loader: Arc<dyn Loader<T>>) -> Self {
        Self {
            cell: OnceCell::new(),
            loader: Some(loader),
        }
    }

    /// Neither loaded nor loadable.
    pub fn detached() -> Self {
        Self {
            cell: OnceCell::new(),
            loader: None,
        }
    }

    /// The value, if already loaded. Never triggers a load.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.cell.get_mut()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    pub fn is_pending(&self) -> bool {
        !self.is_loaded() && self.loader.is_some()
    }

    /// Replaces the content with a loaded value.
    pub fn set(&mut self, value: T) {
        *self = Self::loaded(value);
    }

    pub fn into_inner(self) -> Option<T> {
        self.cell.into_inner()
    }
}

impl<T: Send + Sync> Lazy<T> {
    /// Returns the value, loading it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MapperError::Detached`] when there is no value and no
    /// loader, or the loader's error. A failed load can be retried.
    pub async fn force(&self) -> Result<&T, MapperError> {
        if let Some(value) = self.cell.get() {
            return Ok(value);
        }
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| MapperError::Detached(type_name::<T>().to_string()))?;
        self.cell.get_or_try_init(|| loader.load()).await
    }
}

impl<T: Default> Default for Lazy<T> {
    fn default() -> Self {
        Self::loaded(T::default())
    }
}

impl<T> From<T> for Lazy<T> {
    fn from(value: T) -> Self {
        Self::loaded(value)
    }
}

impl<T: Clone> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            loader: self.loader.clone(),
        }
    }
}

impl<T: PartialEq> PartialEq for Lazy<T> {
    /// Compares loaded values; two unloaded proxies are equal.
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Loaded").field(value).finish(),
            None if self.loader.is_some() => f.write_str("Pending"),
            None => f.write_str("Detached"),
        }
    }
}

// ----------------------------------------------------------------------------
// Ref
// ----------------------------------------------------------------------------

/// A reference to another resource.
///
/// Knows the target IRI, the target value, or both. Materialized references
/// know the IRI and load the value on [`force`](Ref::force).
pub struct Ref<R> {
    uri: Option<Iri>,
    value: Lazy<R>,
}

impl<R> Ref<R> {
    /// A reference known only by IRI; it cannot be loaded.
    pub fn from_uri(uri: Iri) -> Self {
        Self {
            uri: Some(uri),
            value: Lazy::detached(),
        }
    }

    /// A reference to an in-memory value; its IRI is the value's identity.
    pub fn loaded(value: R) -> Self {
        Self {
            uri: None,
            value: Lazy::loaded(value),
        }
    }

    pub fn resolved(uri: Iri, value: R) -> Self {
        Self {
            uri: Some(uri),
            value: Lazy::loaded(value),
        }
    }

    pub fn pending(uri: Iri, loader: Arc<dyn Loader<R>>) -> Self {
        Self {
            uri: Some(uri),
            value: Lazy::pending(loader),
        }
    }

    /// The IRI given when the reference was built, if any.
    pub fn uri(&self) -> Option<&Iri> {
        self.uri.as_ref()
    }

    pub fn get(&self) -> Option<&R> {
        self.value.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_loaded()
    }
}

impl<R: Send + Sync> Ref<R> {
    pub async fn force(&self) -> Result<&R, MapperError> {
        self.value.force().await
    }
}

impl<R: Clone> Clone for Ref<R> {
    fn clone(&self) -> Self {
        Self {
            uri: self.uri.clone(),
            value: self.value.clone(),
        }
    }
}

impl<R> PartialEq for Ref<R> {
    /// References are equal when they point at the same IRI.
    fn eq(&self, other: &Self) -> bool {
        self.uri.is_some() && self.uri == other.uri
    }
}

impl<R> fmt::Debug for Ref<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("uri", &self.uri)
            .field("loaded", &self.value.is_loaded())
            .finish()
    }
}

/// One open-ended statement about a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub property: Iri,
    pub value: Term,
    /// Graph holding the statement; `None` for the default graph.
    pub graph: Option<Iri>,
}

impl Relation {
    pub fn new(property: Iri, value: impl Into<Term>) -> Self {
        Self {
            property,
            value: value.into(),
            graph: None,
        }
    }

    pub fn in_graph(mut self, graph: Iri) -> Self {
        self.graph = Some(graph);
        self
    }
}

// ----------------------------------------------------------------------------
// Loaders
// ----------------------------------------------------------------------------

/// The resource and property a list belongs to.
#[derive(Debug, Clone)]
pub(crate) struct Owner {
    pub uri: Iri,
    pub property: Iri,
    pub reverse: bool,
    pub graph: Option<Iri>,
}

impl Owner {
    /// `<uri> <property> ?value`, or `?value <property> <uri>` when reversed.
    fn pattern(&self, value: &Var) -> GroupPattern {
        let triple = if self.reverse {
            GroupPattern::of_triple(value, &self.property, &self.uri)
        } else {
            GroupPattern::of_triple(&self.uri, &self.property, value)
        };
        match &self.graph {
            Some(graph) => {
                let mut group = GroupPattern::new();
                group.graph(graph, triple);
                group
            }
            None => triple,
        }
    }
}

/// Loads one resource by IRI.
pub(crate) struct ResourceLoader<R> {
    uri: Iri,
    ctx: LoadContext,
    _marker: PhantomData<fn() -> R>,
}

impl<R> ResourceLoader<R> {
    pub fn new(uri: Iri, ctx: LoadContext) -> Self {
        Self {
            uri,
            ctx,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<R: Resource> Loader<R> for ResourceLoader<R> {
    async fn load(&self) -> Result<R, MapperError> {
        tracing::debug!(uri = %self.uri, "Loading {}", type_name::<R>());
        materializer::load_by_uri::<R>(&self.ctx, &self.uri)
            .await?
            .ok_or_else(|| MapperError::NotFound(self.uri.as_str().to_string()))
    }
}

/// Loads the literal values of a multi-valued property.
pub(crate) struct LiteralListLoader<V> {
    owner: Owner,
    ctx: LoadContext,
    _marker: PhantomData<fn() -> V>,
}

impl<V> LiteralListLoader<V> {
    pub fn new(owner: Owner, ctx: LoadContext) -> Self {
        Self {
            owner,
            ctx,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<V: LiteralCodec> Loader<Vec<V>> for LiteralListLoader<V> {
    async fn load(&self) -> Result<Vec<V>, MapperError> {
        let value = Var::new("value");
        let mut select = SelectQuery::new(vec![value.clone()], self.owner.pattern(&value));
        select.distinct = true;

        let rows = self.ctx.executor.query(select).fetch_all().await?;
        let codecs = self.ctx.registry.codecs();
        rows.iter()
            .map(|row| codecs.parse::<V>(row.term(value.name())?))
            .collect()
    }
}

/// Loads the targets of a multi-valued reference property.
pub(crate) struct ReferenceListLoader<R> {
    owner: Owner,
    ctx: LoadContext,
    _marker: PhantomData<fn() -> R>,
}

impl<R> ReferenceListLoader<R> {
    pub fn new(owner: Owner, ctx: LoadContext) -> Self {
        Self {
            owner,
            ctx,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<R: Resource> Loader<Vec<Ref<R>>> for ReferenceListLoader<R> {
    async fn load(&self) -> Result<Vec<Ref<R>>, MapperError> {
        let mapping = self.ctx.registry.mapping::<R>()?;
        let descriptor = mapping.descriptor();

        // Targets may live in any graph; only the owning triple is scoped.
        let mut select = synthesizer::build_select(descriptor, None);
        select
            .pattern
            .extend(self.owner.pattern(&descriptor.identity_var()));

        let rows = self.ctx.executor.query(select).fetch_all().await?;
        let targets = materializer::materialize_rows(&mapping, rows, &self.ctx)?;
        Ok(targets
            .into_iter()
            .map(|(uri, target)| Ref::resolved(uri, target))
            .collect())
    }
}

/// Loads every statement of a resource not covered by a field.
pub(crate) struct RelationLoader {
    owner: Iri,
    excluded: Vec<Iri>,
    ctx: LoadContext,
}

impl RelationLoader {
    pub fn new(owner: Iri, excluded: Vec<Iri>, ctx: LoadContext) -> Self {
        Self {
            owner,
            excluded,
            ctx,
        }
    }
}

#[async_trait]
impl Loader<Vec<Relation>> for RelationLoader {
    async fn load(&self) -> Result<Vec<Relation>, MapperError> {
        let property = Var::new("property");
        let value = Var::new("value");
        let graph = Var::new("graph");

        let statement = GroupPattern::of_triple(&self.owner, &property, &value);
        let mut pattern = GroupPattern::new();
        match &self.ctx.graph {
            Some(g) => {
                pattern.graph(g, statement);
            }
            None => {
                pattern.extend(statement.clone());
                let mut named = GroupPattern::new();
                named.graph(&graph, statement);
                pattern.optional(named);
            }
        }
        if !self.excluded.is_empty() {
            let excluded = self.excluded.iter().cloned().map(Term::Iri).collect();
            pattern.filter(Expression::NotIn(property.clone(), excluded));
        }

        let mut select = SelectQuery::new(vec![property.clone(), value.clone(), graph.clone()], pattern);
        select.distinct = true;

        let rows = self.ctx.executor.query(select).fetch_all().await?;
        rows.iter()
            .filter(|row| {
                let bound = row.get_raw(value.name()).is_some();
                if !bound {
                    tracing::warn!(
                        owner = %self.owner,
                        property = ?row.get_raw(property.name()),
                        "Skipping relation with an unrepresentable value"
                    );
                }
                bound
            })
            .map(|row| {
                Ok(Relation {
                    property: row.get_iri(property.name())?,
                    value: row.term(value.name())?.clone(),
                    graph: match (&self.ctx.graph, row.get_raw(graph.name())) {
                        (Some(g), _) => Some(g.clone()),
                        (None, Some(Term::Iri(g))) => Some(g.clone()),
                        (None, _) => None,
                    },
                })
            })
            .collect()
    }
}
