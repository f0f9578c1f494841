//! Ontology vocabularies and the term resolver used by schema declarations.
//!
//! Schema declarations refer to ontology terms by `(namespace, local_name)`.
//! A [`Vocabulary`] resolves those pairs to IRIs and rejects any term its
//! namespace does not define, so a typo in a declaration fails at startup
//! instead of producing queries that silently match nothing.

use std::collections::{BTreeSet, HashMap};

use crate::error::MapperError;
use crate::rdf::Iri;

pub mod rdf {
    pub const NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
}

pub mod rdfs {
    pub const NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
    pub const SUB_CLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
    pub const LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
    pub const COMMENT: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
}

pub mod owl {
    pub const NS: &str = "http://www.w3.org/2002/07/owl#";
}

pub mod xsd {
    pub const NS: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const ANY_URI: &str = "http://www.w3.org/2001/XMLSchema#anyURI";

    const NUMERIC: [&str; 6] = [INTEGER, INT, LONG, DECIMAL, FLOAT, DOUBLE];

    pub fn is_numeric(datatype: &str) -> bool {
        NUMERIC.contains(&datatype)
    }
}

/// One ontology namespace and the local names it defines.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub prefix: String,
    pub iri: String,
    terms: BTreeSet<String>,
}

impl Namespace {
    pub fn new<I, S>(prefix: impl Into<String>, iri: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            iri: iri.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn defines(&self, local_name: &str) -> bool {
        self.terms.contains(local_name)
    }
}

/// Resolves `(namespace, local_name)` pairs to IRIs.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    namespaces: HashMap<String, Namespace>,
}

impl Vocabulary {
    /// An empty vocabulary without even the W3C namespaces.
    pub fn empty() -> Self {
        Self {
            namespaces: HashMap::new(),
        }
    }

    /// Adds (or replaces) a namespace.
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.add(namespace);
        self
    }

    pub fn add(&mut self, namespace: Namespace) {
        match self.namespaces.get_mut(&namespace.prefix) {
            // Same prefix and IRI: extend the known terms.
            Some(existing) if existing.iri == namespace.iri => {
                existing.terms.extend(namespace.terms);
            }
            _ => {
                self.namespaces.insert(namespace.prefix.clone(), namespace);
            }
        }
    }

    /// Resolves a term, failing when the namespace or the local name is unknown.
    pub fn resolve(&self, namespace: &str, local_name: &str) -> Result<Iri, MapperError> {
        let ns = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| MapperError::NotFound(format!("ontology namespace '{}'", namespace)))?;

        if !ns.defines(local_name) {
            return Err(MapperError::NotFound(format!(
                "term '{}' in ontology namespace '{}'",
                local_name, namespace
            )));
        }

        Iri::parse(&format!("{}{}", ns.iri, local_name))
    }

    pub fn namespace(&self, prefix: &str) -> Option<&Namespace> {
        self.namespaces.get(prefix)
    }
}

impl Default for Vocabulary {
    /// The W3C namespaces the mapping engine itself relies on.
    fn default() -> Self {
        Self::empty()
            .with_namespace(Namespace::new(
                "rdf",
                rdf::NS,
                ["type", "Property", "langString"],
            ))
            .with_namespace(Namespace::new(
                "rdfs",
                rdfs::NS,
                ["label", "comment", "subClassOf", "seeAlso", "Class", "Resource"],
            ))
            .with_namespace(Namespace::new(
                "owl",
                owl::NS,
                ["Class", "Thing", "sameAs", "ObjectProperty", "DatatypeProperty"],
            ))
            .with_namespace(Namespace::new(
                "xsd",
                xsd::NS,
                [
                    "string", "boolean", "integer", "int", "long", "decimal", "float", "double",
                    "date", "dateTime", "anyURI",
                ],
            ))
    }
}
