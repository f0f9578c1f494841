//! Backend implementations for different triple stores.
//!
//! Each backend implements the core traits from [`crate::sparql`]:
//!
//! - [`SparqlExecutor`](crate::sparql::SparqlExecutor) - Required
//! - [`Transaction`](crate::sparql::Transaction) - Required
//! - [`SparqlClient`](crate::sparql::SparqlClient) - Required
//!
//! # Available Backends
//!
//! | Backend | Module | Status |
//! |---------|--------|--------|
//! | SPARQL 1.1 protocol over HTTP | [`http`] | Available |
//! | In-memory quad store | [`memory`] | Available |
//!
//! # Implementing a Backend
//!
//! 1. Create a client struct (e.g., `HttpClient`)
//! 2. Create a transaction struct (e.g., `HttpTransaction`)
//! 3. Implement `SparqlExecutor` for both
//! 4. Implement `Transaction` for the transaction struct
//! 5. Implement `SparqlClient` for the client struct

pub mod http;
pub mod memory;
