//! End-to-end mapping tests against the in-memory store.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use common::*;
use triplemap::di::FromRef;
use triplemap::mapping::{synthesizer, Lazy, Ref, Relation};
use triplemap::rdf::vocabulary::{rdf, xsd};
use triplemap::rdf::{Iri, Literal, Quad, Term};
use triplemap::repositories::{ResourceRepository, Search};
use triplemap::sparql::backends::memory::MemoryStore;
use triplemap::sparql::{Order, Sparql, SparqlExecutor, Transaction};
use triplemap::MapperError;

fn experiment(uri: &str, label: &str, projects: &[&str]) -> Experiment {
    Experiment {
        uri: Some(id(uri)),
        label: Some(label.to_string()),
        objective: Some("Measure yield".to_string()),
        start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        budget: Some(1250.5),
        lead: Some(Ref::from_uri(id("alice"))),
        keywords: Lazy::loaded(vec!["soil".to_string(), "wheat".to_string()]),
        projects: Lazy::loaded(projects.iter().map(|p| Ref::from_uri(id(p))).collect()),
        relations: Lazy::loaded(Vec::new()),
    }
}

async fn seed(ctx: &triplemap::context::Context) {
    let people = ResourceRepository::<Person>::from_ref(ctx);
    people
        .create(&mut Person {
            uri: Some(id("alice")),
            name: Some("Alice".to_string()),
            projects: Lazy::loaded(vec![Ref::from_uri(id("p1"))]),
        })
        .await
        .unwrap();

    let projects = ResourceRepository::<Project>::from_ref(ctx);
    for (uri, label) in [("p1", "Soil survey"), ("p2", "Wheat trial")] {
        projects
            .create(&mut Project {
                uri: Some(id(uri)),
                label: Some(label.to_string()),
                members: Lazy::loaded(Vec::new()),
            })
            .await
            .unwrap();
    }
}

fn quads(store: &MemoryStore) -> BTreeSet<Quad> {
    store.quads().unwrap().into_iter().collect()
}

#[tokio::test]
async fn test_create_then_load_round_trip() {
    let (ctx, store) = memory_context();
    seed(&ctx).await;
    let repo = ResourceRepository::<Experiment>::from_ref(&ctx);

    let mut exp = experiment("exp", "Trial A", &["p1", "p2"]);
    repo.create(&mut exp).await.unwrap();

    // Written to the type's default graph.
    let graph = Iri::from_static(EXPERIMENTS);
    assert!(quads(&store)
        .iter()
        .filter(|q| q.subject == id("exp"))
        .all(|q| q.graph.as_ref() == Some(&graph)));

    let loaded = repo.load_by_uri(&id("exp")).await.unwrap().unwrap();
    assert_eq!(loaded.label, exp.label);
    assert_eq!(loaded.objective, exp.objective);
    assert_eq!(loaded.start_date, exp.start_date);
    assert_eq!(loaded.budget, exp.budget);

    let lead = loaded.lead.as_ref().unwrap();
    assert_eq!(lead.uri(), Some(&id("alice")));
    assert_eq!(lead.force().await.unwrap().name.as_deref(), Some("Alice"));

    let keywords: BTreeSet<_> = loaded.keywords.force().await.unwrap().iter().cloned().collect();
    assert_eq!(keywords, BTreeSet::from(["soil".to_string(), "wheat".to_string()]));

    let mut labels: Vec<_> = loaded
        .projects
        .force()
        .await
        .unwrap()
        .iter()
        .filter_map(|p| p.get().and_then(|p| p.label.clone()))
        .collect();
    labels.sort();
    assert_eq!(labels, vec!["Soil survey", "Wheat trial"]);
}

#[tokio::test]
async fn test_optional_fields_absent() {
    let (ctx, _store) = memory_context();
    let repo = ResourceRepository::<Experiment>::from_ref(&ctx);

    let mut exp = Experiment {
        label: Some("Bare".to_string()),
        ..Default::default()
    };
    let uri = repo.create(&mut exp).await.unwrap();

    let loaded = repo.load_by_uri(&uri).await.unwrap().unwrap();
    assert_eq!(loaded.label.as_deref(), Some("Bare"));
    assert!(loaded.objective.is_none());
    assert!(loaded.lead.is_none());
    assert!(loaded.keywords.force().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_required_field_missing() {
    let (ctx, store) = memory_context();
    let repo = ResourceRepository::<Experiment>::from_ref(&ctx);
    let before = quads(&store);

    let mut exp = experiment("exp", "Trial A", &[]);
    exp.label = None;
    assert!(matches!(
        repo.create(&mut exp).await,
        Err(MapperError::MissingRequiredField { field, .. }) if field == "label"
    ));
    assert_eq!(quads(&store), before);
}

#[tokio::test]
async fn test_update_equals_delete_then_create() {
    let old = || experiment("exp", "Trial A", &["p1"]);
    let new = || {
        let mut exp = experiment("exp", "Trial B", &["p2"]);
        exp.objective = None;
        exp.keywords = Lazy::loaded(vec!["barley".to_string()]);
        exp
    };

    // Store A: create old, then update to new.
    let (ctx_a, store_a) = memory_context();
    seed(&ctx_a).await;
    let repo_a = ResourceRepository::<Experiment>::from_ref(&ctx_a);
    repo_a.create(&mut old()).await.unwrap();
    repo_a.update(&new()).await.unwrap();

    // Store B: create old, delete it, create new.
    let (ctx_b, store_b) = memory_context();
    seed(&ctx_b).await;
    let repo_b = ResourceRepository::<Experiment>::from_ref(&ctx_b);
    repo_b.create(&mut old()).await.unwrap();
    repo_b.delete(&id("exp")).await.unwrap();
    repo_b.create(&mut new()).await.unwrap();

    assert_eq!(quads(&store_a), quads(&store_b));

    let loaded = repo_a.load_by_uri(&id("exp")).await.unwrap().unwrap();
    assert_eq!(loaded.label.as_deref(), Some("Trial B"));
    assert!(loaded.objective.is_none());
    assert_eq!(loaded.keywords.force().await.unwrap(), &vec!["barley".to_string()]);
}

#[tokio::test]
async fn test_update_through_parent_mapping() {
    let pilot = || Pilot {
        base: experiment("pilot", "Pilot A", &[]),
        site: Some("North field".to_string()),
    };
    let renamed = || experiment("pilot", "Pilot B", &[]);

    // Store A: update the pilot through the Experiment mapping.
    let (ctx_a, store_a) = memory_context();
    ResourceRepository::<Pilot>::from_ref(&ctx_a)
        .create(&mut pilot())
        .await
        .unwrap();
    let experiments_a = ResourceRepository::<Experiment>::from_ref(&ctx_a);
    let loaded = experiments_a.load_by_uri(&id("pilot")).await.unwrap().unwrap();
    assert_eq!(loaded.label.as_deref(), Some("Pilot A"));
    experiments_a.update(&renamed()).await.unwrap();

    // Store B: delete and create through the same mapping.
    let (ctx_b, store_b) = memory_context();
    ResourceRepository::<Pilot>::from_ref(&ctx_b)
        .create(&mut pilot())
        .await
        .unwrap();
    let experiments_b = ResourceRepository::<Experiment>::from_ref(&ctx_b);
    experiments_b.delete(&id("pilot")).await.unwrap();
    experiments_b.create(&mut renamed()).await.unwrap();

    assert_eq!(quads(&store_a), quads(&store_b));

    let types: BTreeSet<_> = quads(&store_a)
        .into_iter()
        .filter(|q| q.subject == id("pilot") && q.predicate.as_str() == rdf::TYPE)
        .map(|q| q.object)
        .collect();
    assert_eq!(types, BTreeSet::from([Term::Iri(onto("Experiment"))]));
}

#[tokio::test]
async fn test_search_pages_count_instances() {
    let (ctx, store) = memory_context();
    let experiments = ResourceRepository::<Experiment>::from_ref(&ctx);
    let pilots = ResourceRepository::<Pilot>::from_ref(&ctx);

    experiments
        .create(&mut experiment("exp", "Trial A", &[]))
        .await
        .unwrap();
    for (uri, label) in [("pilot-1", "Pilot A"), ("pilot-2", "Pilot B")] {
        pilots
            .create(&mut Pilot {
                base: experiment(uri, label, &[]),
                site: None,
            })
            .await
            .unwrap();
    }
    // Both pilots also carry the parent type, so each matches twice.
    store
        .insert(
            ["pilot-1", "pilot-2"]
                .into_iter()
                .map(|uri| {
                    Quad::new(
                        id(uri),
                        Iri::from_static(rdf::TYPE),
                        onto("Experiment"),
                        Some(Iri::from_static(EXPERIMENTS)),
                    )
                }),
        )
        .unwrap();

    let labels = |found: Vec<Experiment>| -> Vec<String> {
        found.into_iter().filter_map(|e| e.label).collect()
    };
    let by_label = || Search::new().order_by("label", Order::Asc);

    assert_eq!(experiments.count(&Search::new()).await.unwrap(), 3);
    assert_eq!(
        labels(experiments.search(&by_label().limit(2)).await.unwrap()),
        vec!["Pilot A", "Pilot B"]
    );
    assert_eq!(
        labels(experiments.search(&by_label().offset(1).limit(1)).await.unwrap()),
        vec!["Pilot B"]
    );
    assert_eq!(
        labels(experiments.search(&by_label().offset(2).limit(2)).await.unwrap()),
        vec!["Trial A"]
    );
    assert!(experiments
        .search(&by_label().offset(3))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_subclass_instances_in_parent_select() {
    let (ctx, _store) = memory_context();
    let experiments = ResourceRepository::<Experiment>::from_ref(&ctx);
    let pilots = ResourceRepository::<Pilot>::from_ref(&ctx);

    experiments
        .create(&mut experiment("exp", "Trial A", &[]))
        .await
        .unwrap();
    let mut pilot = Pilot {
        base: experiment("pilot", "Pilot A", &[]),
        site: Some("North field".to_string()),
    };
    pilots.create(&mut pilot).await.unwrap();

    let all = experiments
        .search(&Search::new().order_by("label", Order::Asc))
        .await
        .unwrap();
    let labels: Vec<_> = all.iter().filter_map(|e| e.label.as_deref()).collect();
    assert_eq!(labels, vec!["Pilot A", "Trial A"]);
    assert_eq!(experiments.count(&Search::new()).await.unwrap(), 2);

    // The subtype sees only its own instances, with inherited fields.
    let loaded = pilots.search(&Search::new()).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].base.label.as_deref(), Some("Pilot A"));
    assert_eq!(loaded[0].site.as_deref(), Some("North field"));
}

#[tokio::test]
async fn test_reverse_list() {
    let (ctx, _store) = memory_context();
    seed(&ctx).await;
    let projects = ResourceRepository::<Project>::from_ref(&ctx);

    let p1 = projects.load_by_uri(&id("p1")).await.unwrap().unwrap();
    let members = p1.members.force().await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].uri(), Some(&id("alice")));

    let p2 = projects.load_by_uri(&id("p2")).await.unwrap().unwrap();
    assert!(p2.members.force().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_first_access() {
    let (ctx, _store) = memory_context();
    seed(&ctx).await;
    let people = ResourceRepository::<Person>::from_ref(&ctx);
    let alice = Arc::new(people.get_by_uri(id("alice")).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let alice = alice.clone();
            tokio::spawn(async move { alice.force().await.map(|p| p.name.clone()) })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().as_deref(), Some("Alice"));
    }
    assert!(alice.is_loaded());
}

#[tokio::test]
async fn test_missing_reference_target() {
    let (ctx, _store) = memory_context();
    let people = ResourceRepository::<Person>::from_ref(&ctx);
    let ghost = people.get_by_uri(id("ghost")).unwrap();
    assert!(matches!(ghost.force().await, Err(MapperError::NotFound(_))));
}

#[tokio::test]
async fn test_relations_keep_typed_literals() {
    let (ctx, _store) = memory_context();
    let repo = ResourceRepository::<Experiment>::from_ref(&ctx);

    let count = Literal::typed("12", Iri::from_static(xsd::INT));
    let mut exp = experiment("exp", "Trial A", &[]);
    exp.relations = Lazy::loaded(vec![Relation::new(onto("note"), count.clone())]);
    repo.create(&mut exp).await.unwrap();

    let loaded = repo.load_by_uri(&id("exp")).await.unwrap().unwrap();
    let relations = loaded.relations.force().await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].value, Term::Literal(count));
    assert_eq!(relations[0].graph.as_ref().map(|g| g.as_str()), Some(EXPERIMENTS));

    let mut odd = experiment("odd", "Trial B", &[]);
    odd.relations = Lazy::loaded(vec![Relation::new(
        onto("note"),
        Literal::typed("x", Iri::from_static("http://example.org/dt#custom")),
    )]);
    assert!(matches!(
        repo.create(&mut odd).await,
        Err(MapperError::MapperNotFound(_))
    ));
}

#[tokio::test]
async fn test_update_keeps_integer_relations() {
    let (ctx, store) = memory_context();
    let repo = ResourceRepository::<Experiment>::from_ref(&ctx);
    repo.create(&mut experiment("exp", "Trial A", &[]))
        .await
        .unwrap();

    // Plain Turtle integers arrive as xsd:integer.
    let note = Literal::typed("7", Iri::from_static(xsd::INTEGER));
    store
        .insert(vec![Quad::new(
            id("exp"),
            onto("note"),
            note.clone(),
            Some(Iri::from_static(EXPERIMENTS)),
        )])
        .unwrap();

    let mut exp = repo.load_by_uri(&id("exp")).await.unwrap().unwrap();
    exp.keywords.force().await.unwrap();
    exp.projects.force().await.unwrap();
    exp.relations.force().await.unwrap();
    exp.label = Some("Trial B".to_string());
    repo.update(&exp).await.unwrap();

    let loaded = repo.load_by_uri(&id("exp")).await.unwrap().unwrap();
    assert_eq!(loaded.label.as_deref(), Some("Trial B"));
    let relations = loaded.relations.force().await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].value, Term::Literal(note));
}

#[tokio::test]
async fn test_transaction_applies_on_commit() {
    let store = MemoryStore::new();
    let registry = registry();
    let mapping = registry.mapping::<Experiment>().unwrap();
    let sparql = Sparql::new(store.clone());

    let first = synthesizer::build_create(&mapping, &registry, None, &experiment("a", "A", &[])).unwrap();
    let second = synthesizer::build_create(&mapping, &registry, None, &experiment("b", "B", &[])).unwrap();

    sparql
        .transaction(|txn| async move {
            txn.update(&first).await?;
            txn.rollback().await
        })
        .await
        .unwrap();
    assert!(store.is_empty().unwrap());

    let first = synthesizer::build_create(&mapping, &registry, None, &experiment("a", "A", &[])).unwrap();
    sparql
        .transaction(|txn| async move {
            txn.update(&first).await?;
            txn.update(&second).await?;
            assert!(store.is_empty()?);
            txn.commit().await
        })
        .await
        .unwrap();
    assert!(!sparql.client().is_empty().unwrap());
}
