//! Core traits for triple store access.
//!
//! This module defines the trait hierarchy that backends must implement:
//!
//! - [`SparqlExecutor`] - Select, ask and update against a store
//! - [`Transaction`] - Transaction lifecycle management
//! - [`SparqlClient`] - Connection handling and transaction creation

use async_trait::async_trait;

use crate::error::MapperError;
use crate::rdf::Iri;
use crate::sparql::algebra::{AskQuery, SelectQuery, UpdateOperation, UpdateRequest};
use crate::sparql::row::RowStream;

/// Executes queries against a triple store.
///
/// This is the query-execution service the mapper calls into. It must be
/// object safe: proxies keep an `Arc<dyn SparqlExecutor>` to load their
/// values long after the query that produced them has finished.
#[async_trait]
pub trait SparqlExecutor: Send + Sync {
    /// Executes a select query and returns a stream of solutions.
    async fn select(&self, query: &SelectQuery) -> Result<RowStream<'_>, MapperError>;

    /// Executes an ask query.
    async fn ask(&self, query: &AskQuery) -> Result<bool, MapperError>;

    /// Executes an update request.
    ///
    /// All operations of one request are applied atomically.
    async fn update(&self, request: &UpdateRequest) -> Result<(), MapperError>;

    /// Removes every triple of a named graph.
    async fn clear_graph(&self, graph: &Iri) -> Result<(), MapperError> {
        self.update(&UpdateOperation::ClearGraph(graph.clone()).into())
            .await
    }

    /// Removes every triple of the store.
    async fn clear(&self) -> Result<(), MapperError> {
        self.update(&UpdateOperation::ClearAll.into()).await
    }
}

/// Transaction lifecycle management.
///
/// Updates issued through a transaction are buffered and applied together
/// on commit.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits the transaction, applying all buffered updates at once.
    ///
    /// Consumes the transaction - it cannot be used after commit.
    async fn commit(self) -> Result<(), MapperError>;

    /// Rolls back the transaction, discarding all buffered updates.
    ///
    /// Consumes the transaction - it cannot be used after rollback.
    async fn rollback(self) -> Result<(), MapperError>;
}

/// A store client that can begin transactions.
///
/// Implementations provide auto-commit execution via [`SparqlExecutor`]
/// and explicit transactions via [`begin`](SparqlClient::begin).
#[async_trait]
pub trait SparqlClient: SparqlExecutor {
    /// The transaction type returned by this client.
    type Tx<'a>: Transaction + SparqlExecutor
    where
        Self: 'a;

    /// Begins a new transaction.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let txn = client.begin().await?;
    /// txn.update(&create_experiment).await?;
    /// txn.update(&create_project).await?;
    /// txn.commit().await?;
    /// ```
    async fn begin(&self) -> Result<Self::Tx<'_>, MapperError>;
}
