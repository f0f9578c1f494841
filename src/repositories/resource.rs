//! Resource repository: CRUD and search over one mapped type.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use ulid::Ulid;

use crate::config::Config;
use crate::context::Context;
use crate::di::FromContext;
use crate::error::MapperError;
use crate::mapping::descriptor::{ClassDescriptor, Mapping, COUNT_VAR};
use crate::mapping::materializer;
use crate::mapping::proxy::{LoadContext, Ref, ResourceLoader};
use crate::mapping::registry::Registry;
use crate::mapping::schema::Resource;
use crate::mapping::synthesizer;
use crate::rdf::{Iri, Term};
use crate::sparql::{
    AskQuery, Expression, GroupPattern, Order, Projection, QueryExt, SparqlExecutor, UpdateRequest,
    Var,
};

/// Filters, ordering and paging for [`ResourceRepository::search`].
///
/// Fields are named as declared in the schema; the identity field and
/// scalar fields can be filtered and ordered on.
#[derive(Debug, Clone, Default)]
pub struct Search {
    filters: Vec<Expression>,
    order_by: Vec<(Var, Order)>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Term>) -> Self {
        self.filters.push(Expression::Eq(Var::new(field), value.into()));
        self
    }

    pub fn any_of(mut self, field: &str, values: Vec<Term>) -> Self {
        self.filters.push(Expression::In(Var::new(field), values));
        self
    }

    pub fn none_of(mut self, field: &str, values: Vec<Term>) -> Self {
        self.filters.push(Expression::NotIn(Var::new(field), values));
        self
    }

    /// Case-insensitive substring match.
    pub fn contains(mut self, field: &str, needle: &str) -> Self {
        self.filters
            .push(Expression::Contains(Var::new(field), needle.to_string()));
        self
    }

    pub fn order_by(mut self, field: &str, order: Order) -> Self {
        self.order_by.push((Var::new(field), order));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn vars(&self) -> impl Iterator<Item = &Var> {
        self.filters
            .iter()
            .map(|f| match f {
                Expression::Eq(v, _)
                | Expression::In(v, _)
                | Expression::NotIn(v, _)
                | Expression::Contains(v, _) => v,
            })
            .chain(self.order_by.iter().map(|(v, _)| v))
    }

    fn check(&self, descriptor: &ClassDescriptor) -> Result<(), MapperError> {
        for var in self.vars() {
            let known = var.name() == descriptor.identity()
                || descriptor
                    .binding(var.name())
                    .is_some_and(|b| b.is_scalar());
            if !known {
                return Err(MapperError::Query {
                    message: format!("{} has no searchable field '{}'", descriptor.name(), var.name()),
                    query: String::new(),
                });
            }
        }
        Ok(())
    }
}

/// Repository for one resource type.
///
/// Reads and writes use the repository's graph (see [`in_graph`]), falling
/// back to `[mapping] default_graph`. Without either, reads see every graph
/// and writes go to the type's default graph.
///
/// [`in_graph`]: ResourceRepository::in_graph
#[derive(FromContext)]
pub struct ResourceRepository<T> {
    executor: Arc<dyn SparqlExecutor>,
    registry: Arc<Registry>,
    config: Arc<Config>,
    #[from_context(default)]
    graph: Option<Iri>,
    #[from_context(default)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceRepository<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            graph: self.graph.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Resource> ResourceRepository<T> {
    /// The same repository scoped to a named graph.
    pub fn in_graph(mut self, graph: Iri) -> Self {
        self.graph = Some(graph);
        self
    }

    fn graph(&self) -> Result<Option<Iri>, MapperError> {
        match &self.graph {
            Some(graph) => Ok(Some(graph.clone())),
            None => self.config.mapping.default_graph(),
        }
    }

    fn mapping(&self) -> Result<Arc<Mapping<T>>, MapperError> {
        self.registry.mapping::<T>()
    }

    fn load_context(&self) -> Result<LoadContext, MapperError> {
        Ok(LoadContext::new(self.executor.clone(), self.registry.clone()).in_graph(self.graph()?))
    }

    /// A reference to the resource that loads on first `force`.
    ///
    /// No query runs until then; a missing resource surfaces as
    /// [`MapperError::NotFound`] from `force`.
    pub fn get_by_uri(&self, uri: Iri) -> Result<Ref<T>, MapperError> {
        self.mapping()?;
        let loader = ResourceLoader::<T>::new(uri.clone(), self.load_context()?);
        Ok(Ref::pending(uri, Arc::new(loader)))
    }

    /// Selects the resource now.
    pub async fn load_by_uri(&self, uri: &Iri) -> Result<Option<T>, MapperError> {
        materializer::load_by_uri::<T>(&self.load_context()?, uri).await
    }

    /// `?id <property> value`, for the field bound to `property`.
    fn unique_pattern(
        descriptor: &ClassDescriptor,
        property: &Iri,
        value: Term,
    ) -> Result<GroupPattern, MapperError> {
        let binding = descriptor.field_for_property(property).ok_or_else(|| {
            MapperError::MapperNotFound(format!(
                "unique field for {} on {}",
                property,
                descriptor.name()
            ))
        })?;

        let id = descriptor.identity_var();
        let triple = if binding.is_reverse() {
            GroupPattern::of_triple(value, property, &id)
        } else {
            GroupPattern::of_triple(&id, property, value)
        };
        Ok(match binding.graph_override() {
            Some(graph) => {
                let mut group = GroupPattern::new();
                group.graph(graph, triple);
                group
            }
            None => triple,
        })
    }

    /// The resource whose field bound to `property` holds `value`.
    ///
    /// # Errors
    ///
    /// - [`MapperError::MapperNotFound`] when no single field binds `property`
    /// - [`MapperError::MultipleResults`] when several resources match
    pub async fn get_by_unique_property(
        &self,
        property: &Iri,
        value: impl Into<Term>,
    ) -> Result<Option<T>, MapperError> {
        let mapping = self.mapping()?;
        let descriptor = mapping.descriptor();
        let value = value.into();
        let ctx = self.load_context()?;

        let mut select = synthesizer::build_select(descriptor, ctx.graph.as_ref());
        select
            .pattern
            .extend(Self::unique_pattern(descriptor, property, value.clone())?);

        let rows = self.executor.query(select).fetch_all().await?;
        let mut found = materializer::materialize_rows(&mapping, rows, &ctx)?;
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop().map(|(_, instance)| instance)),
            n => Err(MapperError::MultipleResults(format!(
                "{} resources with {} = {}",
                n, property, value
            ))),
        }
    }

    pub async fn exists_by_unique_property(
        &self,
        property: &Iri,
        value: impl Into<Term>,
    ) -> Result<bool, MapperError> {
        let mapping = self.mapping()?;
        let descriptor = mapping.descriptor();

        let mut ask = synthesizer::build_ask(descriptor, self.graph()?.as_ref());
        ask.pattern
            .extend(Self::unique_pattern(descriptor, property, value.into())?);
        self.executor.ask(&ask).await
    }

    /// Instances matching `search`, in the requested order.
    ///
    /// Paging counts instances, not rows: with an offset or limit, one
    /// query picks the page's identities and a second one loads them.
    /// Rows that fail to materialize are logged and skipped.
    pub async fn search(&self, search: &Search) -> Result<Vec<T>, MapperError> {
        let mapping = self.mapping()?;
        let descriptor = mapping.descriptor();
        search.check(descriptor)?;
        let ctx = self.load_context()?;

        let mut select = synthesizer::build_select(descriptor, ctx.graph.as_ref());
        for filter in &search.filters {
            select.filter(filter.clone());
        }
        for (var, order) in &search.order_by {
            select.order_by(var.clone(), *order);
        }

        if search.offset.is_none() && search.limit.is_none() {
            let rows = self.executor.query(select).fetch_all().await?;
            tracing::debug!(class = descriptor.name(), rows = rows.len(), "Search");
            return Ok(materializer::materialize_valid_rows(&mapping, rows, &ctx)
                .into_iter()
                .map(|(_, instance)| instance)
                .collect());
        }

        let id = descriptor.identity_var();
        let mut page = select.clone();
        page.projection = Projection::Vars(vec![id.clone()]);
        page.distinct = true;
        page.offset = search.offset;
        page.limit = search.limit;

        let ids = self
            .executor
            .query(page)
            .fetch_all()
            .await?
            .iter()
            .map(|row| row.get_iri(id.name()))
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        select.values(id, ids.iter().cloned().map(Term::Iri).collect());
        let rows = self.executor.query(select).fetch_all().await?;
        tracing::debug!(
            class = descriptor.name(),
            instances = ids.len(),
            rows = rows.len(),
            "Search page"
        );

        let mut found: HashMap<Iri, T> = materializer::materialize_valid_rows(&mapping, rows, &ctx)
            .into_iter()
            .collect();
        Ok(ids.iter().filter_map(|uri| found.remove(uri)).collect())
    }

    /// Number of instances matching the filters of `search`.
    ///
    /// Ordering and paging are ignored.
    pub async fn count(&self, search: &Search) -> Result<usize, MapperError> {
        let mapping = self.mapping()?;
        let descriptor = mapping.descriptor();
        search.check(descriptor)?;

        let mut select = synthesizer::build_count(descriptor, self.graph()?.as_ref());
        for filter in &search.filters {
            select.filter(filter.clone());
        }

        let Some(row) = self.executor.query(select).fetch_one().await? else {
            return Ok(0);
        };
        let count = row.get_opt::<i64>(COUNT_VAR)?.unwrap_or(0);
        usize::try_from(count)
            .map_err(|e| MapperError::deserialization(count.to_string(), "count", e))
    }

    /// `<base_uri>/<type-local-name>/<ulid>`
    fn mint(&self, descriptor: &ClassDescriptor) -> Result<Iri, MapperError> {
        Iri::parse(&format!(
            "{}/{}/{}",
            self.config.mapping.base_uri.trim_end_matches('/'),
            descriptor.rdf_type().local_name(),
            Ulid::new()
        ))
    }

    fn ensure_identity(&self, mapping: &Mapping<T>, instance: &mut T) -> Result<Iri, MapperError> {
        if let Some(uri) = mapping.identity(instance) {
            return Ok(uri.clone());
        }
        let uri = self.mint(mapping.descriptor())?;
        mapping.set_identity(instance, uri.clone());
        Ok(uri)
    }

    /// Stores a new instance, minting its IRI when it has none.
    pub async fn create(&self, instance: &mut T) -> Result<Iri, MapperError> {
        let mapping = self.mapping()?;
        let uri = self.ensure_identity(&mapping, instance)?;
        let request = synthesizer::build_create(&mapping, &self.registry, self.graph()?.as_ref(), instance)?;
        self.executor.update(&request).await?;
        tracing::debug!(class = mapping.descriptor().name(), uri = %uri, "Created resource");
        Ok(uri)
    }

    /// Stores several instances in one request.
    pub async fn create_many(&self, instances: &mut [T]) -> Result<Vec<Iri>, MapperError> {
        let mapping = self.mapping()?;
        let graph = self.graph()?;
        let mut request = UpdateRequest::new();
        let mut uris = Vec::with_capacity(instances.len());
        for instance in instances.iter_mut() {
            uris.push(self.ensure_identity(&mapping, instance)?);
            request.extend(synthesizer::build_create(&mapping, &self.registry, graph.as_ref(), instance)?);
        }
        self.executor.update(&request).await?;
        tracing::debug!(class = mapping.descriptor().name(), count = uris.len(), "Created resources");
        Ok(uris)
    }

    /// The stored state of `uri`, with its relations loaded.
    async fn snapshot(&self, uri: &Iri) -> Result<T, MapperError> {
        let mapping = self.mapping()?;
        let old = self
            .load_by_uri(uri)
            .await?
            .ok_or_else(|| MapperError::NotFound(uri.to_string()))?;
        if let Some(relations) = mapping.relations(&old) {
            relations.force().await?;
        }
        Ok(old)
    }

    fn identity_of(mapping: &Mapping<T>, instance: &T) -> Result<Iri, MapperError> {
        mapping.identity(instance).cloned().ok_or_else(|| {
            let descriptor = mapping.descriptor();
            MapperError::MissingRequiredField {
                class: descriptor.name().to_string(),
                field: descriptor.identity().to_string(),
            }
        })
    }

    /// Replaces the stored state of an instance with `instance`.
    ///
    /// # Errors
    ///
    /// [`MapperError::NotFound`] when nothing is stored under its IRI.
    pub async fn update(&self, instance: &T) -> Result<(), MapperError> {
        self.update_many(std::slice::from_ref(instance)).await
    }

    /// Updates several instances in one request.
    pub async fn update_many(&self, instances: &[T]) -> Result<(), MapperError> {
        let mapping = self.mapping()?;
        let graph = self.graph()?;
        let mut request = UpdateRequest::new();
        for instance in instances {
            let uri = Self::identity_of(&mapping, instance)?;
            let old = self.snapshot(&uri).await?;
            request.extend(synthesizer::build_update(
                &mapping,
                &self.registry,
                graph.as_ref(),
                &old,
                instance,
            )?);
        }
        self.executor.update(&request).await
    }

    /// Removes every stored triple of the resource.
    pub async fn delete(&self, uri: &Iri) -> Result<(), MapperError> {
        self.delete_many(std::slice::from_ref(uri)).await
    }

    /// Deletes several resources in one request.
    pub async fn delete_many(&self, uris: &[Iri]) -> Result<(), MapperError> {
        let mapping = self.mapping()?;
        let graph = self.graph()?;
        let mut request = UpdateRequest::new();
        for uri in uris {
            let old = self.snapshot(uri).await?;
            request.extend(synthesizer::build_delete(&mapping, &self.registry, graph.as_ref(), &old)?);
        }
        self.executor.update(&request).await?;
        tracing::debug!(class = mapping.descriptor().name(), count = uris.len(), "Deleted resources");
        Ok(())
    }

    /// True when the IRI appears as subject or object of any triple.
    pub async fn uri_exists(&self, uri: &Iri) -> Result<bool, MapperError> {
        let (s, p, o) = (Var::new("s"), Var::new("p"), Var::new("o"));
        let mut pattern = GroupPattern::new();
        pattern.union(
            GroupPattern::of_triple(uri, &p, &o),
            GroupPattern::of_triple(&s, &p, uri),
        );
        let pattern = match self.graph()? {
            Some(graph) => {
                let mut scoped = GroupPattern::new();
                scoped.graph(&graph, pattern);
                scoped
            }
            None => pattern,
        };
        self.executor.ask(&AskQuery::new(pattern)).await
    }

    /// Removes every triple of a named graph.
    pub async fn clear_graph(&self, graph: &Iri) -> Result<(), MapperError> {
        tracing::info!(graph = %graph, "Clearing graph");
        self.executor.clear_graph(graph).await
    }
}
