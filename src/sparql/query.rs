//! Fluent execution of select queries.

use futures::{StreamExt, TryStreamExt};

use crate::error::MapperError;
use crate::rdf::Term;
use crate::sparql::algebra::{Expression, Order, SelectQuery, Var};
use crate::sparql::row::{Row, RowStream};
use crate::sparql::traits::SparqlExecutor;

/// A builder for constraining and executing a select query.
///
/// `Query` owns its [`SelectQuery`], so constraining it never touches the
/// template it was cloned from.
///
/// # Example
///
/// ```ignore
/// let rows = Query::new(&client, select)
///     .values("uri", vec![Term::Iri(uri)])
///     .fetch_all()
///     .await?;
/// ```
pub struct Query<'a, E: SparqlExecutor + ?Sized> {
    executor: &'a E,
    select: SelectQuery,
}

impl<'a, E: SparqlExecutor + ?Sized> Query<'a, E> {
    pub fn new(executor: &'a E, select: SelectQuery) -> Self {
        Self { executor, select }
    }

    /// Restricts a variable to the given terms (`VALUES`).
    pub fn values(mut self, var: &str, terms: Vec<Term>) -> Self {
        self.select.values(Var::new(var), terms);
        self
    }

    pub fn filter(mut self, expression: Expression) -> Self {
        self.select.filter(expression);
        self
    }

    pub fn order_by(mut self, var: &str, order: Order) -> Self {
        self.select.order_by(Var::new(var), order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.select.limit(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.select.offset(offset);
        self
    }

    /// The query as it will be sent.
    pub fn as_select(&self) -> &SelectQuery {
        &self.select
    }

    /// Executes the query and returns a stream of rows.
    pub async fn execute(self) -> Result<RowStream<'a>, MapperError> {
        self.executor.select(&self.select).await
    }

    /// Executes the query and collects all rows into a vector.
    ///
    /// This is a convenience method for small result sets. For large
    /// results, use [`execute`](Query::execute) and stream the rows.
    pub async fn fetch_all(self) -> Result<Vec<Row>, MapperError> {
        self.execute().await?.try_collect().await
    }

    /// Executes the query and returns the first row, if any.
    pub async fn fetch_one(self) -> Result<Option<Row>, MapperError> {
        let mut stream = self.execute().await?;
        stream.next().await.transpose()
    }

    /// Executes the query and hands every row to `handler`, stopping at
    /// the first error.
    pub async fn for_each<F>(self, mut handler: F) -> Result<usize, MapperError>
    where
        F: FnMut(Row) -> Result<(), MapperError>,
    {
        let mut stream = self.execute().await?;
        let mut count = 0;
        while let Some(row) = stream.next().await {
            handler(row?)?;
            count += 1;
        }
        Ok(count)
    }
}

/// Extension trait providing a convenient `query()` method.
///
/// Implemented for all [`SparqlExecutor`] types, including trait objects.
pub trait QueryExt: SparqlExecutor {
    fn query(&self, select: SelectQuery) -> Query<'_, Self> {
        Query::new(self, select)
    }
}

impl<E: SparqlExecutor + ?Sized> QueryExt for E {}
