//! RDF data model shared by the query layer and the mapper.

mod term;
pub mod vocabulary;

pub use term::{Iri, Literal, Quad, Term};
pub use vocabulary::{Namespace, Vocabulary};
