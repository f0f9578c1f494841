//! RDF terms: IRIs, literals and the quads built from them.

use std::fmt;
use std::sync::Arc;

use crate::error::MapperError;
use crate::rdf::vocabulary::xsd;

/// An absolute IRI.
///
/// Cheap to clone. The input spelling is kept as-is; validation only
/// checks that the value parses as an absolute IRI.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iri(Arc<str>);

impl Iri {
    /// Parses and validates an IRI.
    pub fn parse(value: &str) -> Result<Self, MapperError> {
        url::Url::parse(value).map_err(|e| MapperError::InvalidIri {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(Arc::from(value)))
    }

    /// Wraps a known-good IRI such as a vocabulary constant.
    pub fn from_static(value: &'static str) -> Self {
        Self(Arc::from(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the last `#` or `/`.
    pub fn local_name(&self) -> &str {
        let s = self.as_str();
        s.rfind(['#', '/'])
            .map(|i| &s[i + 1..])
            .filter(|local| !local.is_empty())
            .unwrap_or(s)
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl fmt::Debug for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl std::str::FromStr for Iri {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A typed or language-tagged literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    lexical: String,
    datatype: Iri,
    language: Option<String>,
}

impl Literal {
    pub fn typed(lexical: impl Into<String>, datatype: Iri) -> Self {
        Self {
            lexical: lexical.into(),
            datatype,
            language: None,
        }
    }

    /// An `xsd:string` literal.
    pub fn string(lexical: impl Into<String>) -> Self {
        Self::typed(lexical, Iri::from_static(xsd::STRING))
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Iri::from_static(crate::rdf::vocabulary::rdf::LANG_STRING),
            language: Some(language.into()),
        }
    }

    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    pub fn datatype(&self) -> &Iri {
        &self.datatype
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Parses the lexical form as a number when the datatype is numeric.
    pub fn as_number(&self) -> Option<f64> {
        if xsd::is_numeric(self.datatype.as_str()) {
            self.lexical.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape(&self.lexical))?;
        match &self.language {
            Some(lang) => write!(f, "@{}", lang),
            None if self.datatype.as_str() == xsd::STRING => Ok(()),
            None => write!(f, "^^{}", self.datatype),
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// A node in object position: either an IRI or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(Iri),
    Literal(Literal),
}

impl Term {
    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Term::Iri(iri) => Some(iri),
            Term::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            Term::Iri(_) => None,
        }
    }

    /// The IRI string or the literal's lexical form.
    pub fn value(&self) -> &str {
        match self {
            Term::Iri(iri) => iri.as_str(),
            Term::Literal(lit) => lit.lexical(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => iri.fmt(f),
            Term::Literal(lit) => lit.fmt(f),
        }
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Iri(iri)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Literal(lit)
    }
}

/// A statement, optionally placed in a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quad {
    pub subject: Iri,
    pub predicate: Iri,
    pub object: Term,
    pub graph: Option<Iri>,
}

impl Quad {
    pub fn new(subject: Iri, predicate: Iri, object: impl Into<Term>, graph: Option<Iri>) -> Self {
        Self {
            subject,
            predicate,
            object: object.into(),
            graph,
        }
    }
}
