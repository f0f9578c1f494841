//! Loading ontology files into a store.
//!
//! Subclass-aware selects rely on `rdfs:subClassOf` triples being present in
//! the store. [`load_ontology`] parses a Turtle or N-Triples document and
//! inserts its triples, optionally into a named graph.
//!
//! Blank nodes are skolemized to `urn:triplemap:bnode:<load>:<label>`, with
//! one `<load>` id per call, so two loads never share a node.

use std::io::BufRead;

use sophia_api::source::TripleSource;
use sophia_api::term::{Term as _, TermKind};
use sophia_api::triple::Triple;
use sophia_turtle::parser::{nt, turtle};
use ulid::Ulid;

use crate::error::MapperError;
use crate::rdf::{Iri, Literal, Quad, Term};
use crate::sparql::{SparqlExecutor, UpdateOperation};

/// Serialization of an ontology document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    Turtle,
    NTriples,
}

impl RdfFormat {
    /// Guesses the format from a file extension (`ttl`, `nt`).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "ttl" | "turtle" => Some(RdfFormat::Turtle),
            "nt" | "ntriples" => Some(RdfFormat::NTriples),
            _ => None,
        }
    }
}

/// Parses a document into quads, placed in `graph` (default graph if `None`).
pub fn parse_quads<R: BufRead>(
    reader: R,
    format: RdfFormat,
    graph: Option<&Iri>,
) -> Result<Vec<Quad>, MapperError> {
    let load = Ulid::new();
    match format {
        RdfFormat::Turtle => collect(turtle::parse_bufread(reader), graph, load),
        RdfFormat::NTriples => collect(nt::parse_bufread(reader), graph, load),
    }
}

fn collect<S: TripleSource>(
    mut source: S,
    graph: Option<&Iri>,
    load: Ulid,
) -> Result<Vec<Quad>, MapperError> {
    let mut quads = Vec::new();
    let mut failure = None;

    source
        .for_each_triple(|triple| {
            if failure.is_some() {
                return;
            }
            let [s, p, o] = triple.spo();
            let quad = resource(&s, load).and_then(|subject| {
                let predicate = resource(&p, load)?;
                let object = term(&o, load)?;
                Ok(Quad::new(subject, predicate, object, graph.cloned()))
            });
            match quad {
                Ok(quad) => quads.push(quad),
                Err(e) => failure = Some(e),
            }
        })
        .map_err(|e| MapperError::Parse(e.to_string()))?;

    match failure {
        Some(e) => Err(e),
        None => Ok(quads),
    }
}

fn resource<T: sophia_api::term::Term>(term: &T, load: Ulid) -> Result<Iri, MapperError> {
    match term.kind() {
        TermKind::Iri => {
            let iri = term
                .iri()
                .ok_or_else(|| MapperError::Parse("IRI term without IRI".to_string()))?;
            Iri::parse(iri.as_str())
        }
        TermKind::BlankNode => {
            let id = term
                .bnode_id()
                .ok_or_else(|| MapperError::Parse("blank node without label".to_string()))?;
            let label: &str = &id;
            Iri::parse(&format!("urn:triplemap:bnode:{}:{}", load, label))
        }
        kind => Err(MapperError::Parse(format!(
            "unsupported term in resource position: {:?}",
            kind
        ))),
    }
}

fn term<T: sophia_api::term::Term>(term: &T, load: Ulid) -> Result<Term, MapperError> {
    if !matches!(term.kind(), TermKind::Literal) {
        return resource(term, load).map(Term::Iri);
    }

    let lexical = term
        .lexical_form()
        .ok_or_else(|| MapperError::Parse("literal without lexical form".to_string()))?;
    let lexical: &str = &lexical;

    if let Some(tag) = term.language_tag() {
        let tag: &str = &tag;
        return Ok(Term::Literal(Literal::lang(lexical, tag)));
    }
    match term.datatype() {
        Some(datatype) => Ok(Term::Literal(Literal::typed(
            lexical,
            Iri::parse(datatype.as_str())?,
        ))),
        None => Ok(Term::Literal(Literal::string(lexical))),
    }
}

/// Parses a document and inserts its triples in one update.
///
/// Returns the number of triples loaded.
pub async fn load_ontology<R: BufRead>(
    executor: &dyn SparqlExecutor,
    graph: Option<&Iri>,
    reader: R,
    format: RdfFormat,
) -> Result<usize, MapperError> {
    let quads = parse_quads(reader, format, graph)?;
    let count = quads.len();
    executor
        .update(&UpdateOperation::InsertData(quads).into())
        .await?;
    tracing::info!(
        graph = graph.map(|g| g.as_str()).unwrap_or("default"),
        triples = count,
        "Loaded ontology"
    );
    Ok(count)
}
