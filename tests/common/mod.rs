//! Shared model and fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use triplemap::codec::CodecRegistry;
use triplemap::config::Config;
use triplemap::context::Context;
use triplemap::mapping::{
    term, Field, Lazy, LiteralList, Ref, RefList, Registry, RegistryBuilder, Relation, Resource,
    Schema,
};
use triplemap::ontology::{parse_quads, RdfFormat};
use triplemap::rdf::{Iri, Namespace, Quad, Vocabulary};
use triplemap::sparql::backends::memory::MemoryStore;

pub const ONTO: &str = "http://example.org/onto#";
pub const EXPERIMENTS: &str = "http://example.org/graph/experiments";

#[derive(Debug, Default)]
pub struct Person {
    pub uri: Option<Iri>,
    pub name: Option<String>,
    pub projects: RefList<Project>,
}

impl Resource for Person {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new(term("vocab", "Person"))
            .identity("uri", |p| &p.uri, |p| &mut p.uri)
            .literal(
                Field::new("name", term("vocab", "name")).required(),
                |p| &p.name,
                |p| &mut p.name,
            )
            .reference_list(
                Field::new("projects", term("vocab", "memberOf")),
                |p| &p.projects,
                |p| &mut p.projects,
            )
    }
}

#[derive(Debug, Default)]
pub struct Project {
    pub uri: Option<Iri>,
    pub label: Option<String>,
    /// People whose `memberOf` points here.
    pub members: RefList<Person>,
}

impl Resource for Project {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new(term("vocab", "Project"))
            .identity("uri", |p| &p.uri, |p| &mut p.uri)
            .literal(
                Field::new("label", term("rdfs", "label")).required(),
                |p| &p.label,
                |p| &mut p.label,
            )
            .reference_list(
                Field::new("members", term("vocab", "memberOf")).reverse(),
                |p| &p.members,
                |p| &mut p.members,
            )
    }
}

#[derive(Debug, Default)]
pub struct Experiment {
    pub uri: Option<Iri>,
    pub label: Option<String>,
    pub objective: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub budget: Option<f64>,
    pub lead: Option<Ref<Person>>,
    pub keywords: LiteralList<String>,
    pub projects: RefList<Project>,
    pub relations: Lazy<Vec<Relation>>,
}

impl Resource for Experiment {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new(term("vocab", "Experiment"))
            .default_graph(EXPERIMENTS)
            .identity("uri", |e| &e.uri, |e| &mut e.uri)
            .literal(
                Field::new("label", term("rdfs", "label")).required(),
                |e| &e.label,
                |e| &mut e.label,
            )
            .literal(
                Field::new("objective", term("vocab", "hasObjective")),
                |e| &e.objective,
                |e| &mut e.objective,
            )
            .literal(
                Field::new("start_date", term("vocab", "startDate")),
                |e| &e.start_date,
                |e| &mut e.start_date,
            )
            .literal(
                Field::new("budget", term("vocab", "budget")),
                |e| &e.budget,
                |e| &mut e.budget,
            )
            .reference(
                Field::new("lead", term("vocab", "lead")),
                |e| &e.lead,
                |e| &mut e.lead,
            )
            .literal_list(
                Field::new("keywords", term("vocab", "keyword")),
                |e| &e.keywords,
                |e| &mut e.keywords,
            )
            .reference_list(
                Field::new("projects", term("vocab", "hasProject")),
                |e| &e.projects,
                |e| &mut e.projects,
            )
            .relations(
                "relations",
                &[term("rdfs", "comment")],
                |e| &e.relations,
                |e| &mut e.relations,
            )
    }
}

/// An experiment run at a single site.
#[derive(Debug, Default)]
pub struct Pilot {
    pub base: Experiment,
    pub site: Option<String>,
}

impl Resource for Pilot {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new(term("vocab", "Pilot"))
            .extends::<Experiment>(|p| &p.base, |p| &mut p.base)
            .literal(
                Field::new("site", term("vocab", "site")),
                |p| &p.site,
                |p| &mut p.site,
            )
    }
}

pub fn onto(local: &str) -> Iri {
    Iri::parse(&format!("{}{}", ONTO, local)).unwrap()
}

pub fn id(local: &str) -> Iri {
    Iri::parse(&format!("http://example.org/id/{}", local)).unwrap()
}

pub fn vocabulary() -> Vocabulary {
    Vocabulary::default().with_namespace(Namespace::new(
        "vocab",
        ONTO,
        [
            "Experiment",
            "Pilot",
            "Project",
            "Person",
            "name",
            "memberOf",
            "hasProject",
            "hasObjective",
            "startDate",
            "budget",
            "lead",
            "keyword",
            "site",
            "note",
        ],
    ))
}

pub fn registry() -> Arc<Registry> {
    let mut builder = RegistryBuilder::new(vocabulary(), CodecRegistry::default());
    builder
        .register::<Person>()
        .unwrap()
        .register::<Project>()
        .unwrap()
        .register::<Experiment>()
        .unwrap()
        .register::<Pilot>()
        .unwrap();
    Arc::new(builder.build().unwrap())
}

pub const ONTOLOGY: &str = r#"
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix : <http://example.org/onto#> .

:Pilot rdfs:subClassOf :Experiment .
"#;

pub fn ontology() -> Vec<Quad> {
    parse_quads(ONTOLOGY.as_bytes(), RdfFormat::Turtle, None).unwrap()
}

/// A context over a fresh in-memory store holding the ontology.
pub fn memory_context() -> (Context, MemoryStore) {
    let store = MemoryStore::new();
    store.insert(ontology()).unwrap();

    let mut config = Config::default();
    config.mapping.base_uri = "http://example.org/id".to_string();
    triplemap::telemetry::init(&config.log);

    let ctx = Context::new(config, registry(), Arc::new(store.clone()));
    (ctx, store)
}
