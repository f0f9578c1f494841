//! Error types for the mapping engine and its executors.

use thiserror::Error;

/// A type declaration that cannot be compiled into a descriptor.
///
/// Raised while the registry is being built. It is fatal: an application
/// with a malformed schema should refuse to start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid class definition for {class}: {reason}")]
pub struct ClassDefinitionError {
    pub class: String,
    pub reason: String,
}

impl ClassDefinitionError {
    pub fn new(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by mapping, query synthesis and query execution.
#[derive(Error, Debug)]
pub enum MapperError {
    // Schema errors
    #[error(transparent)]
    ClassDefinition(#[from] ClassDefinitionError),

    #[error("No mapper registered for: {0}")]
    MapperNotFound(String),

    // Write errors
    #[error("Required field '{field}' of {class} is null")]
    MissingRequiredField { class: String, field: String },

    #[error("Reference in field '{field}' of {class} has no resolvable URI")]
    UnresolvedReference { class: String, field: String },

    #[error("List field '{field}' of {class} is not loaded and cannot be written")]
    PendingRelation { class: String, field: String },

    // Read errors
    #[error("Cannot deserialize '{value}' as {expected}: {reason}")]
    Deserialization {
        value: String,
        expected: String,
        reason: String,
    },

    #[error("Reference to {0} is detached and has no loader")]
    Detached(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Multiple objects for the same URI: {0}")]
    MultipleResults(String),

    #[error("Invalid IRI '{value}': {reason}")]
    InvalidIri { value: String, reason: String },

    #[error("RDF parse error: {0}")]
    Parse(String),

    // Store errors
    #[error("SPARQL query error: {message}")]
    Query { message: String, query: String },

    #[error("SPARQL endpoint error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MapperError {
    /// Builds a deserialization error for a lexical value.
    pub fn deserialization(
        value: impl Into<String>,
        expected: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        MapperError::Deserialization {
            value: value.into(),
            expected: expected.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors caused by a malformed schema rather than a request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MapperError::ClassDefinition(_))
    }
}
