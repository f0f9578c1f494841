//! Object/graph mapping.
//!
//! - [`schema`] - Typed declarations: `impl Resource for T`
//! - [`descriptor`] - Compiled per-type metadata and the builder validating it
//! - [`registry`] - Process-wide index of descriptors
//! - [`synthesizer`] - Select, ask, count, create, update and delete queries
//! - [`materializer`] - Rows to instances
//! - [`proxy`] - Lazily loaded references and lists

pub mod descriptor;
pub mod materializer;
pub mod proxy;
pub mod registry;
pub mod schema;
pub mod synthesizer;

pub use descriptor::{
    Cardinality, ClassDescriptor, DescriptorBuilder, Mapping, PropertyBinding, RelationsBinding,
    Target, ValueKind, COUNT_VAR, TYPE_VAR,
};
pub use materializer::{load_by_uri, materialize, materialize_rows};
pub use proxy::{Lazy, LiteralList, LoadContext, Loader, Ref, RefList, Relation};
pub use registry::{Registry, RegistryBuilder};
pub use schema::{iri, term, Field, Mapped, Resource, Schema, TermRef};
