//! Row and streaming types for query results.

use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;

use crate::codec::LiteralCodec;
use crate::error::MapperError;
use crate::rdf::{Iri, Term};

/// A stream of solutions from a select query.
///
/// Uses `futures::Stream` so large result sets can be consumed row by row.
pub type RowStream<'a> = Pin<Box<dyn Stream<Item = Result<Row, MapperError>> + Send + 'a>>;

/// One solution: variable name (without `?`) to bound term.
///
/// Unbound variables are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    data: HashMap<String, Term>,
}

impl Row {
    pub fn new(data: HashMap<String, Term>) -> Self {
        Self { data }
    }

    /// Binds a variable, returning the row for chaining.
    pub fn with(mut self, var: &str, term: impl Into<Term>) -> Self {
        self.data.insert(var.to_string(), term.into());
        self
    }

    /// Gets a bound term.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unbound.
    pub fn term(&self, key: &str) -> Result<&Term, MapperError> {
        self.data
            .get(key)
            .ok_or_else(|| MapperError::Internal(format!("column not found: {}", key)))
    }

    /// Gets a value decoded through its literal codec.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let label: String = row.get("label")?;
    /// let count: i64 = row.get("count")?;
    /// ```
    pub fn get<V: LiteralCodec>(&self, key: &str) -> Result<V, MapperError> {
        V::from_term(self.term(key)?)
    }

    /// Like [`Row::get`], returning `None` for an unbound variable.
    ///
    /// Still returns an error if the variable is bound but cannot be decoded.
    pub fn get_opt<V: LiteralCodec>(&self, key: &str) -> Result<Option<V>, MapperError> {
        match self.data.get(key) {
            Some(term) => V::from_term(term).map(Some),
            None => Ok(None),
        }
    }

    /// Gets a variable bound to an IRI.
    pub fn get_iri(&self, key: &str) -> Result<Iri, MapperError> {
        match self.term(key)? {
            Term::Iri(iri) => Ok(iri.clone()),
            Term::Literal(lit) => Err(MapperError::deserialization(
                lit.lexical(),
                "IRI",
                format!("variable ?{} is bound to a literal", key),
            )),
        }
    }

    pub fn get_raw(&self, key: &str) -> Option<&Term> {
        self.data.get(key)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, Term> {
        self.data
    }
}

impl From<HashMap<String, Term>> for Row {
    fn from(data: HashMap<String, Term>) -> Self {
        Self::new(data)
    }
}
