//! Triplemap - object/graph mapping for RDF triple stores
//!
//! Maps annotated Rust types to RDF resources: typed schema declarations
//! compile into class descriptors, descriptors synthesize SPARQL queries and
//! updates, and select rows materialize back into instances whose references
//! and lists load lazily on first access.

pub mod codec;
pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod mapping;
pub mod ontology;
pub mod rdf;
pub mod repositories;
pub mod sparql;
pub mod telemetry;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;

pub use error::{ClassDefinitionError, MapperError};
