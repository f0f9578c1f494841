//! Turns select rows into instances.
//!
//! Scalars are read from the row; list fields, references and the relations
//! field are attached as pending proxies that load on first [`force`].
//!
//! [`force`]: crate::mapping::Lazy::force

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::MapperError;
use crate::mapping::descriptor::{ClassDescriptor, Mapping};
use crate::mapping::proxy::{Lazy, LoadContext, RelationLoader};
use crate::mapping::schema::{Resource, Source};
use crate::mapping::synthesizer;
use crate::rdf::vocabulary::rdf;
use crate::rdf::{Iri, Term};
use crate::sparql::{QueryExt, Row};

fn identity(descriptor: &ClassDescriptor, row: &Row) -> Result<Iri, MapperError> {
    let var = descriptor.identity_var();
    match row.get_raw(var.name()) {
        Some(Term::Iri(iri)) => Ok(iri.clone()),
        Some(other) => Err(MapperError::deserialization(
            other.value(),
            "IRI",
            format!("identity of {} must be a resource", descriptor.name()),
        )),
        None => Err(MapperError::deserialization(
            "",
            "IRI",
            format!("row has no '{}' column", var.name()),
        )),
    }
}

/// Properties the relations field must not report.
fn excluded(descriptor: &ClassDescriptor) -> Vec<Iri> {
    let mut excluded: Vec<Iri> = descriptor.bound_properties().cloned().collect();
    excluded.push(Iri::from_static(rdf::TYPE));
    if let Some(relations) = descriptor.relations() {
        excluded.extend(relations.ignored.iter().cloned());
    }
    excluded.sort();
    excluded.dedup();
    excluded
}

/// Builds one instance from a row of the descriptor's select.
///
/// # Errors
///
/// [`MapperError::Deserialization`] when the identity column is missing or a
/// scalar cannot be decoded with its codec.
pub fn materialize<T: Resource>(
    mapping: &Mapping<T>,
    row: &Row,
    ctx: &LoadContext,
) -> Result<T, MapperError> {
    let descriptor = mapping.descriptor();
    let owner = identity(descriptor, row)?;

    let mut instance = T::default();
    mapping.set_identity(&mut instance, owner.clone());

    for (binding, slot) in mapping.slots() {
        let term = if binding.is_scalar() {
            row.get_raw(binding.var().name())
        } else {
            None
        };
        let source = Source {
            owner: &owner,
            binding,
            term,
            ctx,
        };
        slot.attach(&mut instance, &source)?;
    }

    if let Some(relations) = mapping.relations_mut(&mut instance) {
        let loader = RelationLoader::new(owner, excluded(descriptor), ctx.clone());
        *relations = Lazy::pending(Arc::new(loader));
    }

    Ok(instance)
}

/// Materializes every row, keeping the first row of each identity.
///
/// Several rows for one instance come from subclass types matched by the
/// `rdfs:subClassOf*` path.
pub fn materialize_rows<T: Resource>(
    mapping: &Mapping<T>,
    rows: Vec<Row>,
    ctx: &LoadContext,
) -> Result<Vec<(Iri, T)>, MapperError> {
    let descriptor = mapping.descriptor();
    let mut seen = HashSet::new();
    let mut instances = Vec::new();
    for row in rows {
        let uri = identity(descriptor, &row)?;
        if seen.insert(uri.clone()) {
            instances.push((uri, materialize(mapping, &row, ctx)?));
        }
    }
    Ok(instances)
}

/// Like [`materialize_rows`], but skips rows that fail to decode.
pub(crate) fn materialize_valid_rows<T: Resource>(
    mapping: &Mapping<T>,
    rows: Vec<Row>,
    ctx: &LoadContext,
) -> Vec<(Iri, T)> {
    let descriptor = mapping.descriptor();
    let mut seen = HashSet::new();
    let mut instances = Vec::new();
    for row in rows {
        let result = identity(descriptor, &row).and_then(|uri| {
            if seen.contains(&uri) {
                return Ok(None);
            }
            let instance = materialize(mapping, &row, ctx)?;
            Ok(Some((uri, instance)))
        });
        match result {
            Ok(Some((uri, instance))) => {
                seen.insert(uri.clone());
                instances.push((uri, instance));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(class = descriptor.name(), error = %e, "Skipping row"),
        }
    }
    instances
}

/// Selects and materializes the instance with the given IRI.
///
/// Returns `None` when no instance of `T` (or a subtype) has that IRI.
///
/// # Errors
///
/// [`MapperError::MultipleResults`] when the store holds more than one value
/// for a scalar field of the instance.
pub async fn load_by_uri<T: Resource>(
    ctx: &LoadContext,
    uri: &Iri,
) -> Result<Option<T>, MapperError> {
    let mapping = ctx.registry.mapping::<T>()?;
    let descriptor = mapping.descriptor();
    let id = descriptor.identity_var();

    let rows = ctx
        .executor
        .query(synthesizer::build_select(descriptor, ctx.graph.as_ref()))
        .values(id.name(), vec![Term::Iri(uri.clone())])
        .fetch_all()
        .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };

    // Rows that differ only in `__type` describe the same instance.
    let scalars: Vec<_> = descriptor
        .bindings()
        .iter()
        .filter(|b| b.is_scalar())
        .map(|b| b.var())
        .collect();
    let conflicting = rows[1..].iter().any(|row| {
        scalars
            .iter()
            .any(|var| row.get_raw(var.name()) != first.get_raw(var.name()))
    });
    if conflicting {
        return Err(MapperError::MultipleResults(uri.to_string()));
    }

    materialize(&mapping, first, ctx).map(Some)
}
