//! Query synthesis from class descriptors.
//!
//! Read queries are assembled from per-descriptor templates compiled on
//! first use; every call returns a fresh clone the caller may constrain
//! further. Write operations compute their triples from an instance
//! snapshot and return one [`UpdateRequest`] to be applied atomically.

use crate::error::MapperError;
use crate::mapping::descriptor::{ClassDescriptor, Mapping, PropertyBinding, COUNT_VAR, TYPE_VAR};
use crate::mapping::proxy::Relation;
use crate::mapping::registry::Registry;
use crate::mapping::schema::SlotValues;
use crate::rdf::vocabulary::{rdf, rdfs};
use crate::rdf::{Iri, Quad, Term};
use crate::sparql::{
    AskQuery, GroupPattern, SelectQuery, TriplePattern, UpdateOperation, UpdateRequest, Var,
};

/// Graph-independent parts of the read queries of one descriptor.
#[derive(Debug, Clone)]
pub(crate) struct Templates {
    /// Projection of select queries: identity, type, scalar fields.
    vars: Vec<Var>,
    /// Patterns of every scalar binding.
    bindings: GroupPattern,
    /// Patterns of required scalar bindings only.
    required: GroupPattern,
}

impl Templates {
    fn compile(descriptor: &ClassDescriptor) -> Self {
        let id = descriptor.identity_var();
        let mut vars = vec![id.clone(), Var::new(TYPE_VAR)];
        let mut bindings = GroupPattern::new();
        let mut required = GroupPattern::new();

        for binding in descriptor.bindings().iter().filter(|b| b.is_scalar()) {
            vars.push(binding.var());
            let pattern = binding_pattern(binding, &id, &binding.var());
            if binding.is_required() {
                bindings.extend(pattern.clone());
                required.extend(pattern);
            } else {
                bindings.optional(pattern);
            }
        }

        tracing::debug!(class = descriptor.name(), "Compiled query templates");
        Self {
            vars,
            bindings,
            required,
        }
    }
}

fn templates(descriptor: &ClassDescriptor) -> &Templates {
    descriptor
        .templates
        .get_or_init(|| Templates::compile(descriptor))
}

/// `?id <p> ?value` (or reversed), inside the binding's graph if it has one.
fn binding_pattern(binding: &PropertyBinding, id: &Var, value: &Var) -> GroupPattern {
    let triple = if binding.is_reverse() {
        GroupPattern::of_triple(value, binding.property(), id)
    } else {
        GroupPattern::of_triple(id, binding.property(), value)
    };
    match binding.graph_override() {
        Some(graph) => {
            let mut group = GroupPattern::new();
            group.graph(graph, triple);
            group
        }
        None => triple,
    }
}

/// `?id rdf:type ?__type . ?__type rdfs:subClassOf* <rdfType>`
fn type_pattern(descriptor: &ClassDescriptor, graph: Option<&Iri>) -> GroupPattern {
    let id = descriptor.identity_var();
    let type_var = Var::new(TYPE_VAR);
    let typed = GroupPattern::of_triple(&id, Iri::from_static(rdf::TYPE), &type_var);

    let mut pattern = GroupPattern::new();
    match graph {
        Some(graph) => {
            pattern.graph(graph, typed);
        }
        None => {
            pattern.extend(typed);
        }
    }
    pattern.zero_or_more(
        &type_var,
        Iri::from_static(rdfs::SUB_CLASS_OF),
        descriptor.rdf_type(),
    );
    pattern
}

/// Select of every instance of the descriptor's type or a subtype.
///
/// Rows bind the identity variable, `__type` and one variable per scalar
/// field, named after the field.
pub fn build_select(descriptor: &ClassDescriptor, graph: Option<&Iri>) -> SelectQuery {
    let templates = templates(descriptor);
    let mut pattern = type_pattern(descriptor, graph);
    pattern.extend(templates.bindings.clone());
    SelectQuery::new(templates.vars.clone(), pattern)
}

/// Existence check; optional fields do not take part.
pub fn build_ask(descriptor: &ClassDescriptor, graph: Option<&Iri>) -> AskQuery {
    let mut pattern = type_pattern(descriptor, graph);
    pattern.extend(templates(descriptor).required.clone());
    AskQuery::new(pattern)
}

/// Number of distinct instances, projected as `__count`.
pub fn build_count(descriptor: &ClassDescriptor, graph: Option<&Iri>) -> SelectQuery {
    let mut pattern = type_pattern(descriptor, graph);
    pattern.extend(templates(descriptor).bindings.clone());
    SelectQuery::count_distinct(descriptor.identity_var(), Var::new(COUNT_VAR), pattern)
}

/// Graph an instance is written to: the caller's, else the type's default.
fn instance_graph(descriptor: &ClassDescriptor, graph: Option<&Iri>) -> Option<Iri> {
    graph.or(descriptor.default_graph()).cloned()
}

fn binding_graph(binding: &PropertyBinding, base: &Option<Iri>) -> Option<Iri> {
    binding.graph_override().cloned().or_else(|| base.clone())
}

fn owner<T>(mapping: &Mapping<T>, instance: &T) -> Result<Iri, MapperError> {
    let descriptor = mapping.descriptor();
    mapping
        .identity(instance)
        .cloned()
        .ok_or_else(|| MapperError::MissingRequiredField {
            class: descriptor.name().to_string(),
            field: descriptor.identity().to_string(),
        })
}

fn quad(binding: &PropertyBinding, owner: &Iri, value: Term, graph: Option<Iri>) -> Result<Quad, MapperError> {
    if binding.is_reverse() {
        let subject = match value {
            Term::Iri(iri) => iri,
            Term::Literal(literal) => {
                return Err(MapperError::deserialization(
                    literal.lexical(),
                    "IRI",
                    format!("reverse field '{}' needs a resource", binding.field()),
                ))
            }
        };
        Ok(Quad::new(subject, binding.property().clone(), owner.clone(), graph))
    } else {
        Ok(Quad::new(owner.clone(), binding.property().clone(), value, graph))
    }
}

/// Delete-by-pattern with a fresh variable in the value position.
fn delete_pattern(binding: &PropertyBinding, owner: &Iri, var: Var, graph: Option<Iri>) -> UpdateOperation {
    let pattern = if binding.is_reverse() {
        TriplePattern::new(var, binding.property(), owner)
    } else {
        TriplePattern::new(owner, binding.property(), var)
    };
    UpdateOperation::DeleteWhere { graph, pattern }
}

/// Fresh `?x0`, `?x1`, ... variables for one request.
#[derive(Default)]
struct Placeholders(usize);

impl Placeholders {
    fn next(&mut self) -> Var {
        let var = Var::new(&format!("x{}", self.0));
        self.0 += 1;
        var
    }
}

fn pending(descriptor: &ClassDescriptor, field: &str) -> MapperError {
    MapperError::PendingRelation {
        class: descriptor.name().to_string(),
        field: field.to_string(),
    }
}

fn unresolved(descriptor: &ClassDescriptor, field: &str) -> MapperError {
    MapperError::UnresolvedReference {
        class: descriptor.name().to_string(),
        field: field.to_string(),
    }
}

/// Every quad stored for `instance`, type triple first.
fn instance_quads<T>(
    mapping: &Mapping<T>,
    registry: &Registry,
    graph: Option<&Iri>,
    instance: &T,
) -> Result<Vec<Quad>, MapperError> {
    let descriptor = mapping.descriptor();
    let owner = owner(mapping, instance)?;
    let base = instance_graph(descriptor, graph);

    let mut quads = vec![Quad::new(
        owner.clone(),
        Iri::from_static(rdf::TYPE),
        descriptor.rdf_type().clone(),
        base.clone(),
    )];

    for (binding, slot) in mapping.slots() {
        match slot.values(instance, registry)? {
            SlotValues::Values(values) => {
                if values.is_empty() && binding.is_scalar() && binding.is_required() {
                    return Err(MapperError::MissingRequiredField {
                        class: descriptor.name().to_string(),
                        field: binding.field().to_string(),
                    });
                }
                for value in values {
                    quads.push(quad(binding, &owner, value, binding_graph(binding, &base))?);
                }
            }
            SlotValues::Pending => return Err(pending(descriptor, binding.field())),
            SlotValues::Unresolved => return Err(unresolved(descriptor, binding.field())),
        }
    }

    if let Some(relations) = mapping.relations(instance) {
        let field = descriptor.relations().map(|r| r.field.as_str()).unwrap_or_default();
        let relations = relations.get().ok_or_else(|| pending(descriptor, field))?;
        for relation in relations {
            check_relation(registry, relation)?;
            quads.push(Quad::new(
                owner.clone(),
                relation.property.clone(),
                relation.value.clone(),
                relation.graph.clone().or_else(|| base.clone()),
            ));
        }
    }

    Ok(quads)
}

/// Relation literals must be readable back through a codec.
fn check_relation(registry: &Registry, relation: &Relation) -> Result<(), MapperError> {
    if let Term::Literal(literal) = &relation.value {
        if literal.language().is_none() && !registry.codecs().supports_datatype(literal.datatype().as_str()) {
            return Err(MapperError::MapperNotFound(format!(
                "literal codec for datatype {}",
                literal.datatype()
            )));
        }
    }
    Ok(())
}

/// Insert of every triple of `instance`.
///
/// # Errors
///
/// - [`MapperError::MissingRequiredField`] for an empty required scalar or
///   a missing identity
/// - [`MapperError::UnresolvedReference`] for a reference without IRI
/// - [`MapperError::PendingRelation`] for a list that was never loaded
pub fn build_create<T>(
    mapping: &Mapping<T>,
    registry: &Registry,
    graph: Option<&Iri>,
    instance: &T,
) -> Result<UpdateRequest, MapperError> {
    let quads = instance_quads(mapping, registry, graph, instance)?;
    Ok(UpdateOperation::InsertData(quads).into())
}

/// Replaces the stored values of `old` with those of `new`.
///
/// Every value found on the `old` snapshot is removed by pattern, so the
/// deletion matches whatever is currently stored; a list never loaded on
/// `old` is removed with a single pattern, as are all stored rdf types.
/// Then `new` is inserted in full, its own type included.
pub fn build_update<T>(
    mapping: &Mapping<T>,
    registry: &Registry,
    graph: Option<&Iri>,
    old: &T,
    new: &T,
) -> Result<UpdateRequest, MapperError> {
    let descriptor = mapping.descriptor();
    let owner = owner(mapping, old)?;
    let base = instance_graph(descriptor, graph);
    let mut vars = Placeholders::default();
    let mut request = UpdateRequest::new();
    request.push(UpdateOperation::DeleteWhere {
        graph: base.clone(),
        pattern: TriplePattern::new(&owner, Iri::from_static(rdf::TYPE), vars.next()),
    });

    for (binding, slot) in mapping.slots() {
        let target = binding_graph(binding, &base);
        let count = match slot.values(old, registry)? {
            SlotValues::Values(values) => values.len(),
            SlotValues::Pending | SlotValues::Unresolved => 1,
        };
        for _ in 0..count {
            request.push(delete_pattern(binding, &owner, vars.next(), target.clone()));
        }
    }

    if let Some(relations) = mapping.relations(old) {
        let field = descriptor.relations().map(|r| r.field.as_str()).unwrap_or_default();
        let relations = relations.get().ok_or_else(|| pending(descriptor, field))?;
        for relation in relations {
            request.push(UpdateOperation::DeleteWhere {
                graph: relation.graph.clone().or_else(|| base.clone()),
                pattern: TriplePattern::new(&owner, &relation.property, vars.next()),
            });
        }
    }

    request.extend(build_create(mapping, registry, graph, new)?);
    tracing::debug!(
        class = descriptor.name(),
        uri = %owner,
        operations = request.operations().len(),
        "Built update"
    );
    Ok(request)
}

/// Removes every triple of `instance`.
///
/// Values are deleted as found on the snapshot; lists never loaded are
/// deleted by pattern, as are all rdf types of the resource.
pub fn build_delete<T>(
    mapping: &Mapping<T>,
    registry: &Registry,
    graph: Option<&Iri>,
    instance: &T,
) -> Result<UpdateRequest, MapperError> {
    let descriptor = mapping.descriptor();
    let owner = owner(mapping, instance)?;
    let base = instance_graph(descriptor, graph);
    let mut vars = Placeholders::default();

    let mut data = Vec::new();
    let mut patterns = vec![UpdateOperation::DeleteWhere {
        graph: base.clone(),
        pattern: TriplePattern::new(&owner, Iri::from_static(rdf::TYPE), vars.next()),
    }];

    for (binding, slot) in mapping.slots() {
        let target = binding_graph(binding, &base);
        match slot.values(instance, registry)? {
            SlotValues::Values(values) => {
                for value in values {
                    data.push(quad(binding, &owner, value, target.clone())?);
                }
            }
            SlotValues::Pending => patterns.push(delete_pattern(binding, &owner, vars.next(), target)),
            SlotValues::Unresolved => return Err(unresolved(descriptor, binding.field())),
        }
    }

    if let Some(relations) = mapping.relations(instance) {
        let field = descriptor.relations().map(|r| r.field.as_str()).unwrap_or_default();
        let relations = relations.get().ok_or_else(|| pending(descriptor, field))?;
        for relation in relations {
            data.push(Quad::new(
                owner.clone(),
                relation.property.clone(),
                relation.value.clone(),
                relation.graph.clone().or_else(|| base.clone()),
            ));
        }
    }

    let mut request = UpdateRequest::new();
    request.push(UpdateOperation::DeleteData(data));
    for op in patterns {
        request.push(op);
    }
    Ok(request)
}
