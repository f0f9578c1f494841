//! Literal codecs: conversion between Rust values and RDF literals.
//!
//! Each supported value type implements [`LiteralCodec`]. The
//! [`CodecRegistry`] decides which of those types a schema may bind as a
//! literal field; a codec that exists in code but was never registered is
//! rejected when descriptors are built.

use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::error::MapperError;
use crate::rdf::vocabulary::xsd;
use crate::rdf::{Iri, Literal, Term};

/// Conversion between a value type and its literal form.
pub trait LiteralCodec: Sized + Clone + Send + Sync + 'static {
    /// Datatype IRI written on formatted literals.
    fn datatype() -> &'static str;

    /// Further datatypes whose lexical space this codec reads.
    fn reads() -> &'static [&'static str] {
        &[]
    }

    /// Parses a lexical form.
    fn parse(lexical: &str) -> Result<Self, String>;

    /// Produces the lexical form.
    fn format(&self) -> String;

    fn to_term(&self) -> Term {
        Term::Literal(Literal::typed(self.format(), Iri::from_static(Self::datatype())))
    }

    /// Decodes a term; IRIs are decoded from their string value.
    fn from_term(term: &Term) -> Result<Self, MapperError> {
        Self::parse(term.value())
            .map_err(|reason| MapperError::deserialization(term.value(), type_name::<Self>(), reason))
    }
}

impl LiteralCodec for String {
    fn datatype() -> &'static str {
        xsd::STRING
    }

    fn parse(lexical: &str) -> Result<Self, String> {
        Ok(lexical.to_string())
    }

    fn format(&self) -> String {
        self.clone()
    }
}

impl LiteralCodec for bool {
    fn datatype() -> &'static str {
        xsd::BOOLEAN
    }

    fn parse(lexical: &str) -> Result<Self, String> {
        match lexical {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        }
    }

    fn format(&self) -> String {
        self.to_string()
    }
}

macro_rules! numeric_codec {
    ($ty:ty, $datatype:expr, [$($reads:expr),*]) => {
        impl LiteralCodec for $ty {
            fn datatype() -> &'static str {
                $datatype
            }

            fn reads() -> &'static [&'static str] {
                &[$($reads),*]
            }

            fn parse(lexical: &str) -> Result<Self, String> {
                lexical.trim().parse::<$ty>().map_err(|e| e.to_string())
            }

            fn format(&self) -> String {
                self.to_string()
            }
        }
    };
}

numeric_codec!(i32, xsd::INT, []);
numeric_codec!(i64, xsd::LONG, [xsd::INTEGER, xsd::INT]);
numeric_codec!(f32, xsd::FLOAT, []);
numeric_codec!(f64, xsd::DOUBLE, [xsd::DECIMAL, xsd::FLOAT]);

impl LiteralCodec for NaiveDate {
    fn datatype() -> &'static str {
        xsd::DATE
    }

    fn parse(lexical: &str) -> Result<Self, String> {
        NaiveDate::parse_from_str(lexical, "%Y-%m-%d").map_err(|e| e.to_string())
    }

    fn format(&self) -> String {
        self.format("%Y-%m-%d").to_string()
    }
}

impl LiteralCodec for DateTime<FixedOffset> {
    fn datatype() -> &'static str {
        xsd::DATE_TIME
    }

    fn parse(lexical: &str) -> Result<Self, String> {
        DateTime::parse_from_rfc3339(lexical).map_err(|e| e.to_string())
    }

    fn format(&self) -> String {
        self.to_rfc3339()
    }
}

impl LiteralCodec for DateTime<Utc> {
    fn datatype() -> &'static str {
        xsd::DATE_TIME
    }

    fn parse(lexical: &str) -> Result<Self, String> {
        DateTime::parse_from_rfc3339(lexical)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| e.to_string())
    }

    fn format(&self) -> String {
        self.to_rfc3339()
    }
}

impl LiteralCodec for Iri {
    fn datatype() -> &'static str {
        xsd::ANY_URI
    }

    fn parse(lexical: &str) -> Result<Self, String> {
        Iri::parse(lexical).map_err(|e| e.to_string())
    }

    fn format(&self) -> String {
        self.as_str().to_string()
    }
}

/// The set of value types allowed as literal fields.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    types: HashMap<TypeId, &'static str>,
    datatypes: HashSet<&'static str>,
}

impl CodecRegistry {
    /// A registry without any codec.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
            datatypes: HashSet::new(),
        }
    }

    /// Registers a value type.
    pub fn register<V: LiteralCodec>(&mut self) -> &mut Self {
        self.types.insert(TypeId::of::<V>(), type_name::<V>());
        self.datatypes.insert(V::datatype());
        self.datatypes.extend(V::reads().iter().copied());
        self
    }

    pub fn is_registered<V: 'static>(&self) -> bool {
        self.is_registered_type(TypeId::of::<V>())
    }

    pub fn is_registered_type(&self, id: TypeId) -> bool {
        self.types.contains_key(&id)
    }

    /// True when some registered codec writes or reads this datatype.
    pub fn supports_datatype(&self, datatype: &str) -> bool {
        self.datatypes.contains(datatype)
    }

    /// Decodes a term with a registered codec.
    pub fn parse<V: LiteralCodec>(&self, term: &Term) -> Result<V, MapperError> {
        self.ensure_registered::<V>()?;
        V::from_term(term)
    }

    /// Encodes a value with a registered codec.
    pub fn format<V: LiteralCodec>(&self, value: &V) -> Result<Term, MapperError> {
        self.ensure_registered::<V>()?;
        Ok(value.to_term())
    }

    fn ensure_registered<V: LiteralCodec>(&self) -> Result<(), MapperError> {
        if self.is_registered::<V>() {
            Ok(())
        } else {
            Err(MapperError::MapperNotFound(format!(
                "literal codec for {}",
                type_name::<V>()
            )))
        }
    }
}

impl Default for CodecRegistry {
    /// All built-in codecs.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register::<String>()
            .register::<bool>()
            .register::<i32>()
            .register::<i64>()
            .register::<f32>()
            .register::<f64>()
            .register::<NaiveDate>()
            .register::<DateTime<FixedOffset>>()
            .register::<DateTime<Utc>>()
            .register::<Iri>();
        registry
    }
}
