//! Compiled class descriptors.
//!
//! [`DescriptorBuilder`] turns a [`Schema`] declaration into a
//! [`Mapping`]: an immutable [`ClassDescriptor`] (the graph shape of the
//! type) paired with the type-erased accessors used to read and fill
//! instances.

use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::codec::CodecRegistry;
use crate::error::ClassDefinitionError;
use crate::mapping::proxy::{Lazy, Relation};
use crate::mapping::schema::{Access, Resource, Schema, Shape, Slot};
use crate::mapping::synthesizer::Templates;
use crate::rdf::{Iri, Vocabulary};
use crate::sparql::Var;

/// Variable bound to the instance's rdf type in select patterns.
pub const TYPE_VAR: &str = "__type";

/// Alias of the count projection.
pub const COUNT_VAR: &str = "__count";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Scalar,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Literal,
    Reference,
}

/// The resource type a reference field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub type_id: TypeId,
    pub name: &'static str,
}

/// One mapped field.
#[derive(Debug, Clone)]
pub struct PropertyBinding {
    field: String,
    property: Iri,
    cardinality: Cardinality,
    value_kind: ValueKind,
    required: bool,
    reverse: bool,
    graph_override: Option<Iri>,
    target: Option<Target>,
}

impl PropertyBinding {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Variable holding the field's value in select patterns.
    pub fn var(&self) -> Var {
        Var::new(&self.field)
    }

    pub fn property(&self) -> &Iri {
        &self.property
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn is_scalar(&self) -> bool {
        self.cardinality == Cardinality::Scalar
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn graph_override(&self) -> Option<&Iri> {
        self.graph_override.as_ref()
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }
}

/// The open-ended relations field of a type.
#[derive(Debug, Clone)]
pub struct RelationsBinding {
    pub field: String,
    /// Properties never reported as relations.
    pub ignored: Vec<Iri>,
}

/// Compiled schema of one resource type.
#[derive(Debug)]
pub struct ClassDescriptor {
    name: &'static str,
    type_id: TypeId,
    identity: String,
    rdf_type: Iri,
    default_graph: Option<Iri>,
    bindings: Vec<PropertyBinding>,
    unique_properties: HashMap<Iri, usize>,
    optional_fields: HashSet<String>,
    reverse_fields: HashSet<String>,
    relations: Option<RelationsBinding>,
    pub(crate) templates: OnceCell<Templates>,
}

impl ClassDescriptor {
    /// Rust type name of the described type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the identity field.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn identity_var(&self) -> Var {
        Var::new(&self.identity)
    }

    pub fn rdf_type(&self) -> &Iri {
        &self.rdf_type
    }

    pub fn default_graph(&self) -> Option<&Iri> {
        self.default_graph.as_ref()
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> &[PropertyBinding] {
        &self.bindings
    }

    pub fn binding(&self, field: &str) -> Option<&PropertyBinding> {
        self.bindings.iter().find(|b| b.field == field)
    }

    /// Reverse lookup: the only field bound to `property`.
    ///
    /// Returns `None` when no field, or more than one field, binds it.
    pub fn field_for_property(&self, property: &Iri) -> Option<&PropertyBinding> {
        self.unique_properties
            .get(property)
            .map(|&index| &self.bindings[index])
    }

    pub fn is_optional(&self, field: &str) -> bool {
        self.optional_fields.contains(field)
    }

    pub fn is_reverse(&self, field: &str) -> bool {
        self.reverse_fields.contains(field)
    }

    pub fn relations(&self) -> Option<&RelationsBinding> {
        self.relations.as_ref()
    }

    /// Every property bound by a field.
    pub fn bound_properties(&self) -> impl Iterator<Item = &Iri> {
        self.bindings.iter().map(|b| &b.property)
    }
}

/// A descriptor plus typed access to instances of `T`.
pub struct Mapping<T> {
    descriptor: Arc<ClassDescriptor>,
    identity: Box<dyn Access<T, Option<Iri>>>,
    slots: Vec<Box<dyn Slot<T>>>,
    relations: Option<Box<dyn Access<T, Lazy<Vec<Relation>>>>>,
}

impl<T> Mapping<T> {
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.descriptor
    }

    /// The instance's IRI, if set.
    pub fn identity<'a>(&self, instance: &'a T) -> Option<&'a Iri> {
        self.identity.get(instance).as_ref()
    }

    pub fn set_identity(&self, instance: &mut T, uri: Iri) {
        *self.identity.get_mut(instance) = Some(uri);
    }

    /// The instance's relations field, if the type declares one.
    pub fn relations<'a>(&self, instance: &'a T) -> Option<&'a Lazy<Vec<Relation>>> {
        self.relations.as_ref().map(|access| access.get(instance))
    }

    pub(crate) fn relations_mut<'a>(
        &self,
        instance: &'a mut T,
    ) -> Option<&'a mut Lazy<Vec<Relation>>> {
        self.relations.as_ref().map(|access| access.get_mut(instance))
    }

    /// Bindings paired with their accessors.
    pub(crate) fn slots(&self) -> impl Iterator<Item = (&PropertyBinding, &dyn Slot<T>)> {
        self.descriptor
            .bindings
            .iter()
            .zip(self.slots.iter().map(|slot| slot.as_ref()))
    }
}

/// Compiles schema declarations into mappings.
pub struct DescriptorBuilder<'a> {
    vocabulary: &'a Vocabulary,
    codecs: &'a CodecRegistry,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(vocabulary: &'a Vocabulary, codecs: &'a CodecRegistry) -> Self {
        Self { vocabulary, codecs }
    }

    /// Compiles the schema of `T`.
    ///
    /// Reference targets are only checked to be resource types here; the
    /// registry verifies they are registered once every type is known.
    pub fn build<T: Resource>(&self) -> Result<Mapping<T>, ClassDefinitionError> {
        self.compile(T::schema())
    }

    pub(crate) fn compile<T: 'static>(
        &self,
        schema: Schema<T>,
    ) -> Result<Mapping<T>, ClassDefinitionError> {
        let class = type_name::<T>();
        let fail = |reason: String| ClassDefinitionError::new(class, reason);

        let rdf_type = schema
            .rdf_type
            .resolve(self.vocabulary)
            .map_err(|e| fail(format!("rdf type {}: {}", schema.rdf_type, e)))?;

        let default_graph = schema
            .default_graph
            .map(Iri::parse)
            .transpose()
            .map_err(|e| fail(format!("default graph: {}", e)))?;

        let mut identities = schema.identities;
        let identity = match identities.len() {
            0 => return Err(fail("no identity field".to_string())),
            1 => identities.remove(0),
            _ => {
                let names: Vec<_> = identities.iter().map(|i| i.name).collect();
                return Err(fail(format!(
                    "more than one identity field ({})",
                    names.join(", ")
                )));
            }
        };
        check_name(identity.name).map_err(&fail)?;

        let mut seen: HashSet<&'static str> = HashSet::from([identity.name]);
        let mut bindings = Vec::with_capacity(schema.fields.len());
        let mut slots = Vec::with_capacity(schema.fields.len());
        let mut unique_properties: HashMap<Iri, usize> = HashMap::new();
        let mut ambiguous: HashSet<Iri> = HashSet::new();
        let mut optional_fields = HashSet::new();
        let mut reverse_fields = HashSet::new();

        for decl in schema.fields {
            let field = decl.field;
            check_name(field.name).map_err(&fail)?;
            if !seen.insert(field.name) {
                return Err(fail(format!("field '{}' is declared twice", field.name)));
            }

            let property = field
                .term
                .resolve(self.vocabulary)
                .map_err(|e| fail(format!("field '{}': {}", field.name, e)))?;

            let graph_override = field
                .graph
                .map(Iri::parse)
                .transpose()
                .map_err(|e| fail(format!("field '{}' graph: {}", field.name, e)))?;

            let (value_kind, target) = match decl.shape {
                Shape::Literal {
                    value_type,
                    value_name,
                } => {
                    if !self.codecs.is_registered_type(value_type) {
                        return Err(fail(format!(
                            "field '{}': no literal codec registered for {}",
                            field.name, value_name
                        )));
                    }
                    if field.reverse {
                        return Err(fail(format!(
                            "field '{}': a literal cannot be the subject of a reverse property",
                            field.name
                        )));
                    }
                    (ValueKind::Literal, None)
                }
                Shape::Reference {
                    target,
                    target_name,
                } => (
                    ValueKind::Reference,
                    Some(Target {
                        type_id: target,
                        name: target_name,
                    }),
                ),
            };

            tracing::debug!(
                class,
                field = field.name,
                property = %property,
                cardinality = ?decl.cardinality,
                kind = ?value_kind,
                required = field.required,
                reverse = field.reverse,
                "Analyzed field"
            );

            let index = bindings.len();
            if !ambiguous.contains(&property) {
                if unique_properties.remove(&property).is_some() {
                    tracing::debug!(
                        class,
                        property = %property,
                        "Property bound by several fields, reverse lookup disabled"
                    );
                    ambiguous.insert(property.clone());
                } else {
                    unique_properties.insert(property.clone(), index);
                }
            }
            if !field.required {
                optional_fields.insert(field.name.to_string());
            }
            if field.reverse {
                reverse_fields.insert(field.name.to_string());
            }

            bindings.push(PropertyBinding {
                field: field.name.to_string(),
                property,
                cardinality: decl.cardinality,
                value_kind,
                required: field.required,
                reverse: field.reverse,
                graph_override,
                target,
            });
            slots.push(decl.slot);
        }

        let mut relation_decls = schema.relations;
        let (relations, relations_access) = match relation_decls.len() {
            0 => (None, None),
            1 => {
                let decl = relation_decls.remove(0);
                check_name(decl.name).map_err(&fail)?;
                if !seen.insert(decl.name) {
                    return Err(fail(format!("field '{}' is declared twice", decl.name)));
                }
                let ignored = decl
                    .ignore
                    .iter()
                    .map(|t| t.resolve(self.vocabulary))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| fail(format!("relations '{}': {}", decl.name, e)))?;
                (
                    Some(RelationsBinding {
                        field: decl.name.to_string(),
                        ignored,
                    }),
                    Some(decl.access),
                )
            }
            _ => return Err(fail("more than one relations field".to_string())),
        };

        let descriptor = ClassDescriptor {
            name: class,
            type_id: TypeId::of::<T>(),
            identity: identity.name.to_string(),
            rdf_type,
            default_graph,
            bindings,
            unique_properties,
            optional_fields,
            reverse_fields,
            relations,
            templates: OnceCell::new(),
        };

        tracing::debug!(
            class,
            rdf_type = %descriptor.rdf_type,
            fields = descriptor.bindings.len(),
            "Compiled class descriptor"
        );

        Ok(Mapping {
            descriptor: Arc::new(descriptor),
            identity: identity.access,
            slots,
            relations: relations_access,
        })
    }
}

/// Field names become query variables.
fn check_name(name: &str) -> Result<(), String> {
    let valid = !name.is_empty()
        && !name.starts_with("__")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid field name", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::proxy::{LiteralList, Ref, RefList};
    use crate::mapping::schema::{term, Field};
    use crate::rdf::Namespace;

    const ONTO: &str = "http://example.org/onto#";

    fn vocabulary() -> Vocabulary {
        Vocabulary::default().with_namespace(Namespace::new(
            "vocab",
            ONTO,
            ["Experiment", "Project", "hasProject", "keyword", "alias"],
        ))
    }

    #[derive(Default)]
    struct Project {
        uri: Option<Iri>,
        label: Option<String>,
    }

    impl Resource for Project {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Project"))
                .identity("uri", |p| &p.uri, |p| &mut p.uri)
                .literal(
                    Field::new("label", term("rdfs", "label")).required(),
                    |p| &p.label,
                    |p| &mut p.label,
                )
        }
    }

    #[derive(Default)]
    struct Experiment {
        uri: Option<Iri>,
        label: Option<String>,
        alias: Option<String>,
        comment: Option<String>,
        keywords: LiteralList<String>,
        projects: RefList<Project>,
        lead: Option<Ref<Project>>,
    }

    impl Resource for Experiment {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Experiment"))
                .identity("uri", |e| &e.uri, |e| &mut e.uri)
                .literal(
                    Field::new("label", term("rdfs", "label")).required(),
                    |e| &e.label,
                    |e| &mut e.label,
                )
                .literal(
                    Field::new("alias", term("vocab", "alias")),
                    |e| &e.alias,
                    |e| &mut e.alias,
                )
                .literal(
                    Field::new("comment", term("vocab", "alias")),
                    |e| &e.comment,
                    |e| &mut e.comment,
                )
                .literal_list(
                    Field::new("keywords", term("vocab", "keyword")),
                    |e| &e.keywords,
                    |e| &mut e.keywords,
                )
                .reference_list(
                    Field::new("projects", term("vocab", "hasProject")),
                    |e| &e.projects,
                    |e| &mut e.projects,
                )
                .reference(
                    Field::new("lead", term("vocab", "hasProject")).reverse(),
                    |e| &e.lead,
                    |e| &mut e.lead,
                )
        }
    }

    fn build<T: Resource>() -> Result<Mapping<T>, ClassDefinitionError> {
        let vocab = vocabulary();
        let codecs = CodecRegistry::default();
        DescriptorBuilder::new(&vocab, &codecs).build::<T>()
    }

    #[test]
    fn test_bindings_in_declaration_order() {
        let mapping = build::<Experiment>().unwrap();
        let descriptor = mapping.descriptor();
        let fields: Vec<_> = descriptor.bindings().iter().map(|b| b.field()).collect();
        assert_eq!(
            fields,
            vec!["label", "alias", "comment", "keywords", "projects", "lead"]
        );
        assert_eq!(descriptor.identity(), "uri");
        assert_eq!(descriptor.rdf_type().as_str(), "http://example.org/onto#Experiment");

        let projects = descriptor.binding("projects").unwrap();
        assert_eq!(projects.cardinality(), Cardinality::List);
        assert_eq!(projects.value_kind(), ValueKind::Reference);
        assert_eq!(projects.target().unwrap().type_id, TypeId::of::<Project>());
    }

    #[test]
    fn test_unique_property_lookup() {
        let mapping = build::<Project>().unwrap();
        let label = Iri::from_static("http://www.w3.org/2000/01/rdf-schema#label");
        assert_eq!(
            mapping.descriptor().field_for_property(&label).unwrap().field(),
            "label"
        );
    }

    #[test]
    fn test_ambiguous_property_is_removed_from_index() {
        let mapping = build::<Experiment>().unwrap();
        let descriptor = mapping.descriptor();

        // alias and comment both claim vocab:alias.
        let alias = Iri::from_static("http://example.org/onto#alias");
        assert!(descriptor.field_for_property(&alias).is_none());
        assert!(descriptor.binding("alias").is_some());
        assert!(descriptor.binding("comment").is_some());

        // projects and lead both claim vocab:hasProject.
        let has_project = Iri::from_static("http://example.org/onto#hasProject");
        assert!(descriptor.field_for_property(&has_project).is_none());

        let keyword = Iri::from_static("http://example.org/onto#keyword");
        assert_eq!(descriptor.field_for_property(&keyword).unwrap().field(), "keywords");
    }

    #[test]
    fn test_optional_and_reverse_side_sets() {
        let mapping = build::<Experiment>().unwrap();
        let descriptor = mapping.descriptor();
        assert!(!descriptor.is_optional("label"));
        assert!(descriptor.is_optional("alias"));
        assert!(descriptor.is_reverse("lead"));
        assert!(!descriptor.is_reverse("projects"));
    }

    #[derive(Default)]
    struct NoIdentity {
        label: Option<String>,
    }

    impl Resource for NoIdentity {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Project")).literal(
                Field::new("label", term("rdfs", "label")),
                |n| &n.label,
                |n| &mut n.label,
            )
        }
    }

    #[derive(Default)]
    struct TwoIdentities {
        a: Option<Iri>,
        b: Option<Iri>,
    }

    impl Resource for TwoIdentities {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Project"))
                .identity("a", |t| &t.a, |t| &mut t.a)
                .identity("b", |t| &t.b, |t| &mut t.b)
        }
    }

    #[derive(Default)]
    struct UnknownTerm {
        uri: Option<Iri>,
        label: Option<String>,
    }

    impl Resource for UnknownTerm {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Project"))
                .identity("uri", |t| &t.uri, |t| &mut t.uri)
                .literal(
                    Field::new("label", term("vocab", "title")),
                    |t| &t.label,
                    |t| &mut t.label,
                )
        }
    }

    #[derive(Default)]
    struct NoCodec {
        uri: Option<Iri>,
        tags: Option<u8>,
    }

    impl crate::codec::LiteralCodec for u8 {
        fn datatype() -> &'static str {
            "http://www.w3.org/2001/XMLSchema#unsignedByte"
        }

        fn parse(lexical: &str) -> Result<Self, String> {
            lexical.parse().map_err(|e: std::num::ParseIntError| e.to_string())
        }

        fn format(&self) -> String {
            self.to_string()
        }
    }

    impl Resource for NoCodec {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new(term("vocab", "Project"))
                .identity("uri", |t| &t.uri, |t| &mut t.uri)
                .literal(
                    Field::new("tags", term("vocab", "keyword")),
                    |t| &t.tags,
                    |t| &mut t.tags,
                )
        }
    }

    #[test]
    fn test_schema_errors() {
        let err = build::<NoIdentity>().err().unwrap();
        assert!(err.reason.contains("no identity field"));

        let err = build::<TwoIdentities>().err().unwrap();
        assert!(err.reason.contains("more than one identity field (a, b)"));

        let err = build::<UnknownTerm>().err().unwrap();
        assert!(err.reason.contains("field 'label'"));

        // u8 has a codec implementation but was never registered.
        let err = build::<NoCodec>().err().unwrap();
        assert!(err.reason.contains("no literal codec registered"));
    }

    #[test]
    fn test_field_names() {
        assert!(check_name("label").is_ok());
        assert!(check_name("__type").is_err());
        assert!(check_name("has-dash").is_err());
        assert!(check_name("").is_err());
    }
}
