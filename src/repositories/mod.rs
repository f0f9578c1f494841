//! Data access layer for mapped resources.
//!
//! Repositories combine the synthesizer, the materializer and an executor,
//! using the `FromContext` derive macro for dependency injection.

mod resource;

pub use resource::{ResourceRepository, Search};
