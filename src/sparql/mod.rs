//! Store abstraction layer for backend-agnostic triple store access.
//!
//! The mapper never talks to a store directly. It builds queries as values
//! ([`algebra`]) and hands them to a [`SparqlExecutor`]. Backends decide
//! whether to render them to SPARQL text or evaluate them in process.
//!
//! # Architecture
//!
//! - [`SparqlExecutor`] - Select, ask and update (required for all backends)
//! - [`Transaction`] - Transaction lifecycle (commit/rollback)
//! - [`SparqlClient`] - Transaction creation
//!
//! # Usage
//!
//! ```ignore
//! use triplemap::sparql::{Sparql, QueryExt};
//! use triplemap::sparql::backends::memory::MemoryStore;
//!
//! let sparql = Sparql::new(MemoryStore::new());
//!
//! let rows = sparql.query(select)
//!     .values("uri", vec![Term::Iri(uri)])
//!     .fetch_all()
//!     .await?;
//!
//! sparql.update(&request).await?;
//! ```

pub mod algebra;
mod query;
mod row;
mod traits;

pub mod backends;

pub use algebra::{
    AskQuery, Element, Expression, GroupPattern, Order, Projection, SelectQuery, TermPattern,
    TriplePattern, UpdateOperation, UpdateRequest, Var,
};
pub use query::{Query, QueryExt};
pub use row::{Row, RowStream};
pub use traits::{SparqlClient, SparqlExecutor, Transaction};

use std::future::Future;

use crate::error::MapperError;

/// High-level wrapper around a [`SparqlClient`].
///
/// Provides direct queries (each update is its own request) and transaction
/// closures (the closure decides between commit and rollback).
///
/// # Example
///
/// ```ignore
/// let sparql = Sparql::new(client);
///
/// sparql.transaction(|txn| async move {
///     txn.update(&first).await?;
///     txn.update(&second).await?;
///     txn.commit().await
/// }).await?;
/// ```
pub struct Sparql<C: SparqlClient> {
    client: C,
}

impl<C: SparqlClient> Sparql<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Consumes the wrapper and returns the underlying client.
    pub fn into_inner(self) -> C {
        self.client
    }

    /// Creates a query builder for a direct select.
    pub fn query(&self, select: SelectQuery) -> Query<'_, C> {
        Query::new(&self.client, select)
    }

    /// Executes a closure within a transaction.
    ///
    /// The closure receives the transaction and is responsible for calling
    /// `commit()` or `rollback()`. A transaction dropped without commit
    /// discards its buffered updates.
    pub async fn transaction<'s, F, R, Fut>(&'s self, f: F) -> Result<R, MapperError>
    where
        F: FnOnce(C::Tx<'s>) -> Fut,
        Fut: Future<Output = Result<R, MapperError>>,
    {
        let txn = self.client.begin().await?;
        f(txn).await
    }
}

// Forward SparqlExecutor to the underlying client for convenience
#[async_trait::async_trait]
impl<C: SparqlClient> SparqlExecutor for Sparql<C> {
    async fn select(&self, query: &SelectQuery) -> Result<RowStream<'_>, MapperError> {
        self.client.select(query).await
    }

    async fn ask(&self, query: &AskQuery) -> Result<bool, MapperError> {
        self.client.ask(query).await
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), MapperError> {
        self.client.update(request).await
    }
}
