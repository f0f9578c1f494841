//! Explicit schema declarations.
//!
//! A type takes part in mapping by implementing [`Resource`] and returning a
//! [`Schema`] that names its rdf type, its identity field and one declaration
//! per mapped field, each with explicit accessor functions.
//!
//! # Example
//!
//! ```ignore
//! impl Resource for Experiment {
//!     fn schema() -> Schema<Self> {
//!         Schema::<Self>::new(term("vocab", "Experiment"))
//!             .default_graph("http://example.org/graph/experiments")
//!             .identity("uri", |e| &e.uri, |e| &mut e.uri)
//!             .literal(
//!                 Field::new("label", term("rdfs", "label")).required(),
//!                 |e| &e.label,
//!                 |e| &mut e.label,
//!             )
//!             .reference_list(
//!                 Field::new("projects", term("vocab", "hasProject")),
//!                 |e| &e.projects,
//!                 |e| &mut e.projects,
//!             )
//!     }
//! }
//! ```

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::codec::LiteralCodec;
use crate::error::MapperError;
use crate::mapping::descriptor::{Cardinality, PropertyBinding};
use crate::mapping::proxy::{
    Lazy, LiteralList, LiteralListLoader, LoadContext, Owner, Ref, RefList, ReferenceListLoader,
    Relation, ResourceLoader,
};
use crate::mapping::registry::Registry;
use crate::rdf::{Iri, Term, Vocabulary};

/// A type whose instances are stored as RDF resources.
pub trait Resource: Default + Send + Sync + 'static {
    fn schema() -> Schema<Self>;
}

/// A reference to an ontology term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermRef {
    /// `namespace:local`, resolved through the [`Vocabulary`].
    Prefixed {
        namespace: &'static str,
        local: &'static str,
    },
    /// A full IRI, used as-is.
    Iri(&'static str),
}

/// `namespace:local`
pub const fn term(namespace: &'static str, local: &'static str) -> TermRef {
    TermRef::Prefixed { namespace, local }
}

pub const fn iri(value: &'static str) -> TermRef {
    TermRef::Iri(value)
}

impl TermRef {
    pub fn resolve(&self, vocabulary: &Vocabulary) -> Result<Iri, MapperError> {
        match self {
            TermRef::Prefixed { namespace, local } => vocabulary.resolve(namespace, local),
            TermRef::Iri(value) => Iri::parse(value),
        }
    }
}

impl fmt::Display for TermRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermRef::Prefixed { namespace, local } => write!(f, "{}:{}", namespace, local),
            TermRef::Iri(value) => write!(f, "<{}>", value),
        }
    }
}

/// Options of one mapped field.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: &'static str,
    pub(crate) term: TermRef,
    pub(crate) required: bool,
    pub(crate) reverse: bool,
    pub(crate) graph: Option<&'static str>,
}

impl Field {
    pub fn new(name: &'static str, term: TermRef) -> Self {
        Self {
            name,
            term,
            required: false,
            reverse: false,
            graph: None,
        }
    }

    /// The field must hold a value when written.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The field's value is the subject of the triple and the instance its object.
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Stores this field's triples in the given graph, whatever graph the
    /// instance itself is written to.
    pub fn in_graph(mut self, graph: &'static str) -> Self {
        self.graph = Some(graph);
        self
    }
}

// ----------------------------------------------------------------------------
// Accessors
// ----------------------------------------------------------------------------

/// Typed access to one field of `T`.
pub(crate) trait Access<T, F>: Send + Sync {
    fn get<'a>(&self, instance: &'a T) -> &'a F;
    fn get_mut<'a>(&self, instance: &'a mut T) -> &'a mut F;
}

struct Accessor<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> Access<T, F> for Accessor<T, F> {
    fn get<'a>(&self, instance: &'a T) -> &'a F {
        (self.get)(instance)
    }

    fn get_mut<'a>(&self, instance: &'a mut T) -> &'a mut F {
        (self.get_mut)(instance)
    }
}

/// Access to a field of an embedded parent value.
struct Embedded<T, P, F> {
    parent: fn(&T) -> &P,
    parent_mut: fn(&mut T) -> &mut P,
    inner: Box<dyn Access<P, F>>,
}

impl<T, P: 'static, F> Access<T, F> for Embedded<T, P, F> {
    fn get<'a>(&self, instance: &'a T) -> &'a F {
        self.inner.get((self.parent)(instance))
    }

    fn get_mut<'a>(&self, instance: &'a mut T) -> &'a mut F {
        self.inner.get_mut((self.parent_mut)(instance))
    }
}

fn accessor<T: 'static, F: 'static>(
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
) -> Box<dyn Access<T, F>> {
    Box::new(Accessor { get, get_mut })
}

/// What a field currently holds, as terms ready to be written.
pub(crate) enum SlotValues {
    Values(Vec<Term>),
    /// A list proxy that was never loaded.
    Pending,
    /// A reference without a resolvable IRI.
    Unresolved,
}

/// What the materializer hands to a slot.
pub(crate) struct Source<'a> {
    pub owner: &'a Iri,
    pub binding: &'a PropertyBinding,
    /// The row's value for the field's variable (scalars only).
    pub term: Option<&'a Term>,
    pub ctx: &'a LoadContext,
}

impl Source<'_> {
    fn list_owner(&self) -> Owner {
        Owner {
            uri: self.owner.clone(),
            property: self.binding.property().clone(),
            reverse: self.binding.is_reverse(),
            graph: self
                .binding
                .graph_override()
                .cloned()
                .or_else(|| self.ctx.graph.clone()),
        }
    }
}

/// Type-erased read/write access to one mapped field.
pub(crate) trait Slot<T>: Send + Sync {
    fn values(&self, instance: &T, registry: &Registry) -> Result<SlotValues, MapperError>;

    /// Fills a scalar from the row or attaches a pending list proxy.
    fn attach(&self, instance: &mut T, source: &Source<'_>) -> Result<(), MapperError>;
}

struct LiteralSlot<T, V> {
    access: Box<dyn Access<T, Option<V>>>,
}

impl<T, V: LiteralCodec> Slot<T> for LiteralSlot<T, V> {
    fn values(&self, instance: &T, registry: &Registry) -> Result<SlotValues, MapperError> {
        let values = match self.access.get(instance) {
            Some(value) => vec![registry.codecs().format(value)?],
            None => Vec::new(),
        };
        Ok(SlotValues::Values(values))
    }

    fn attach(&self, instance: &mut T, source: &Source<'_>) -> Result<(), MapperError> {
        if let Some(term) = source.term {
            *self.access.get_mut(instance) = Some(source.ctx.registry.codecs().parse::<V>(term)?);
        }
        Ok(())
    }
}

struct ReferenceSlot<T, R> {
    access: Box<dyn Access<T, Option<Ref<R>>>>,
}

impl<T, R: Resource> Slot<T> for ReferenceSlot<T, R> {
    fn values(&self, instance: &T, registry: &Registry) -> Result<SlotValues, MapperError> {
        match self.access.get(instance) {
            None => Ok(SlotValues::Values(Vec::new())),
            Some(reference) => Ok(match registry.resolve_ref(reference)? {
                Some(uri) => SlotValues::Values(vec![Term::Iri(uri)]),
                None => SlotValues::Unresolved,
            }),
        }
    }

    fn attach(&self, instance: &mut T, source: &Source<'_>) -> Result<(), MapperError> {
        match source.term {
            None => {}
            Some(Term::Iri(uri)) => {
                let ctx = source
                    .ctx
                    .clone()
                    .in_graph(source.binding.graph_override().cloned());
                let loader = Arc::new(ResourceLoader::<R>::new(uri.clone(), ctx));
                *self.access.get_mut(instance) = Some(Ref::pending(uri.clone(), loader));
            }
            Some(Term::Literal(literal)) => {
                return Err(MapperError::deserialization(
                    literal.lexical(),
                    "IRI",
                    format!("field '{}' is a reference", source.binding.field()),
                ));
            }
        }
        Ok(())
    }
}

struct LiteralListSlot<T, V> {
    access: Box<dyn Access<T, LiteralList<V>>>,
}

impl<T, V: LiteralCodec> Slot<T> for LiteralListSlot<T, V> {
    fn values(&self, instance: &T, registry: &Registry) -> Result<SlotValues, MapperError> {
        match self.access.get(instance).get() {
            None => Ok(SlotValues::Pending),
            Some(values) => values
                .iter()
                .map(|value| registry.codecs().format(value))
                .collect::<Result<Vec<_>, _>>()
                .map(SlotValues::Values),
        }
    }

    fn attach(&self, instance: &mut T, source: &Source<'_>) -> Result<(), MapperError> {
        let loader = LiteralListLoader::<V>::new(source.list_owner(), source.ctx.clone());
        *self.access.get_mut(instance) = Lazy::pending(Arc::new(loader));
        Ok(())
    }
}

struct ReferenceListSlot<T, R> {
    access: Box<dyn Access<T, RefList<R>>>,
}

impl<T, R: Resource> Slot<T> for ReferenceListSlot<T, R> {
    fn values(&self, instance: &T, registry: &Registry) -> Result<SlotValues, MapperError> {
        let Some(references) = self.access.get(instance).get() else {
            return Ok(SlotValues::Pending);
        };
        let mut values = Vec::with_capacity(references.len());
        for reference in references {
            match registry.resolve_ref(reference)? {
                Some(uri) => values.push(Term::Iri(uri)),
                None => return Ok(SlotValues::Unresolved),
            }
        }
        Ok(SlotValues::Values(values))
    }

    fn attach(&self, instance: &mut T, source: &Source<'_>) -> Result<(), MapperError> {
        let loader = ReferenceListLoader::<R>::new(source.list_owner(), source.ctx.clone());
        *self.access.get_mut(instance) = Lazy::pending(Arc::new(loader));
        Ok(())
    }
}

/// A slot of an embedded parent value.
struct EmbeddedSlot<T, P> {
    parent: fn(&T) -> &P,
    parent_mut: fn(&mut T) -> &mut P,
    inner: Box<dyn Slot<P>>,
}

impl<T, P: 'static> Slot<T> for EmbeddedSlot<T, P> {
    fn values(&self, instance: &T, registry: &Registry) -> Result<SlotValues, MapperError> {
        self.inner.values((self.parent)(instance), registry)
    }

    fn attach(&self, instance: &mut T, source: &Source<'_>) -> Result<(), MapperError> {
        self.inner.attach((self.parent_mut)(instance), source)
    }
}

// ----------------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------------

/// Static shape of a declared field.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape {
    Literal {
        value_type: TypeId,
        value_name: &'static str,
    },
    Reference {
        target: TypeId,
        target_name: &'static str,
    },
}

pub(crate) struct IdentityDecl<T> {
    pub name: &'static str,
    pub access: Box<dyn Access<T, Option<Iri>>>,
}

pub(crate) struct FieldDecl<T> {
    pub field: Field,
    pub cardinality: Cardinality,
    pub shape: Shape,
    pub slot: Box<dyn Slot<T>>,
}

pub(crate) struct RelationsDecl<T> {
    pub name: &'static str,
    pub ignore: Vec<TermRef>,
    pub access: Box<dyn Access<T, Lazy<Vec<Relation>>>>,
}

/// The mapping declaration of a [`Resource`] type.
///
/// Scalar fields are `Option`s; list fields are [`Lazy`] vectors so they can
/// be loaded on first access.
pub struct Schema<T> {
    pub(crate) rdf_type: TermRef,
    pub(crate) default_graph: Option<&'static str>,
    pub(crate) identities: Vec<IdentityDecl<T>>,
    pub(crate) fields: Vec<FieldDecl<T>>,
    pub(crate) relations: Vec<RelationsDecl<T>>,
}

impl<T: 'static> Schema<T> {
    pub fn new(rdf_type: TermRef) -> Self {
        Self {
            rdf_type,
            default_graph: None,
            identities: Vec::new(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Graph used for writes when the caller names none.
    pub fn default_graph(mut self, graph: &'static str) -> Self {
        self.default_graph = Some(graph);
        self
    }

    /// The field holding the resource IRI.
    pub fn identity(
        mut self,
        name: &'static str,
        get: fn(&T) -> &Option<Iri>,
        get_mut: fn(&mut T) -> &mut Option<Iri>,
    ) -> Self {
        self.identities.push(IdentityDecl {
            name,
            access: accessor(get, get_mut),
        });
        self
    }

    /// A scalar literal decoded with the codec of `V`.
    pub fn literal<V: LiteralCodec>(
        self,
        field: Field,
        get: fn(&T) -> &Option<V>,
        get_mut: fn(&mut T) -> &mut Option<V>,
    ) -> Self {
        let slot = LiteralSlot {
            access: accessor(get, get_mut),
        };
        self.push(field, Cardinality::Scalar, literal_shape::<V>(), Box::new(slot))
    }

    /// A single reference to another resource.
    pub fn reference<R: Resource>(
        self,
        field: Field,
        get: fn(&T) -> &Option<Ref<R>>,
        get_mut: fn(&mut T) -> &mut Option<Ref<R>>,
    ) -> Self {
        let slot = ReferenceSlot {
            access: accessor(get, get_mut),
        };
        self.push(field, Cardinality::Scalar, reference_shape::<R>(), Box::new(slot))
    }

    /// A multi-valued literal property.
    pub fn literal_list<V: LiteralCodec>(
        self,
        field: Field,
        get: fn(&T) -> &LiteralList<V>,
        get_mut: fn(&mut T) -> &mut LiteralList<V>,
    ) -> Self {
        let slot = LiteralListSlot {
            access: accessor(get, get_mut),
        };
        self.push(field, Cardinality::List, literal_shape::<V>(), Box::new(slot))
    }

    /// A multi-valued reference property.
    pub fn reference_list<R: Resource>(
        self,
        field: Field,
        get: fn(&T) -> &RefList<R>,
        get_mut: fn(&mut T) -> &mut RefList<R>,
    ) -> Self {
        let slot = ReferenceListSlot {
            access: accessor(get, get_mut),
        };
        self.push(field, Cardinality::List, reference_shape::<R>(), Box::new(slot))
    }

    /// Open-ended relations: every triple of the instance that no other
    /// field binds, except the `ignore`d properties.
    pub fn relations(
        mut self,
        name: &'static str,
        ignore: &[TermRef],
        get: fn(&T) -> &Lazy<Vec<Relation>>,
        get_mut: fn(&mut T) -> &mut Lazy<Vec<Relation>>,
    ) -> Self {
        self.relations.push(RelationsDecl {
            name,
            ignore: ignore.to_vec(),
            access: accessor(get, get_mut),
        });
        self
    }

    /// Inherits every declaration of the parent type `P`, stored in an
    /// embedded field of `T`.
    ///
    /// The parent's identity, fields and relations become those of `T`; the
    /// rdf type stays the one given to [`Schema::new`], and the parent's
    /// default graph applies unless `T` sets its own.
    pub fn extends<P: Resource>(
        mut self,
        parent: fn(&T) -> &P,
        parent_mut: fn(&mut T) -> &mut P,
    ) -> Self {
        let base = P::schema();
        if self.default_graph.is_none() {
            self.default_graph = base.default_graph;
        }

        for identity in base.identities {
            self.identities.push(IdentityDecl {
                name: identity.name,
                access: Box::new(Embedded {
                    parent,
                    parent_mut,
                    inner: identity.access,
                }),
            });
        }

        for decl in base.fields {
            self.fields.push(FieldDecl {
                field: decl.field,
                cardinality: decl.cardinality,
                shape: decl.shape,
                slot: Box::new(EmbeddedSlot {
                    parent,
                    parent_mut,
                    inner: decl.slot,
                }),
            });
        }

        for relations in base.relations {
            self.relations.push(RelationsDecl {
                name: relations.name,
                ignore: relations.ignore,
                access: Box::new(Embedded {
                    parent,
                    parent_mut,
                    inner: relations.access,
                }),
            });
        }
        self
    }

    fn push(
        mut self,
        field: Field,
        cardinality: Cardinality,
        shape: Shape,
        slot: Box<dyn Slot<T>>,
    ) -> Self {
        self.fields.push(FieldDecl {
            field,
            cardinality,
            shape,
            slot,
        });
        self
    }
}

fn literal_shape<V: 'static>() -> Shape {
    Shape::Literal {
        value_type: TypeId::of::<V>(),
        value_name: type_name::<V>(),
    }
}

fn reference_shape<R: 'static>() -> Shape {
    Shape::Reference {
        target: TypeId::of::<R>(),
        target_name: type_name::<R>(),
    }
}

/// Resolves wrapper types to the resource they stand for.
///
/// Lets callers look up a descriptor through `Ref<R>` or `Lazy<R>` and get
/// the one registered for `R`.
pub trait Mapped {
    type Target: Resource;
}

impl<R: Resource> Mapped for Ref<R> {
    type Target = R;
}

impl<R: Resource> Mapped for Lazy<R> {
    type Target = R;
}
