//! Integration tests for the HTTP SPARQL backend.
//!
//! These tests require a running SPARQL 1.1 endpoint with update support.
//! Run with: `TRIPLEMAP_TEST_ENDPOINT=http://localhost:3030/test cargo test --features integration --test http_integration`
//!
//! The query endpoint is `$TRIPLEMAP_TEST_ENDPOINT/query` and the update
//! endpoint `$TRIPLEMAP_TEST_ENDPOINT/update` (Fuseki layout).

#![cfg(feature = "integration")]

mod common;

use std::sync::Arc;

use common::*;
use serial_test::serial;
use triplemap::config::{Config, SparqlConfig};
use triplemap::context::Context;
use triplemap::di::FromRef;
use triplemap::mapping::Lazy;
use triplemap::ontology::{load_ontology, RdfFormat};
use triplemap::rdf::Iri;
use triplemap::repositories::{ResourceRepository, Search};
use triplemap::sparql::backends::http::HttpClient;
use triplemap::sparql::{SparqlClient, SparqlExecutor, Transaction};

const TEST_GRAPH: &str = "http://example.org/graph/integration";

fn endpoint() -> String {
    std::env::var("TRIPLEMAP_TEST_ENDPOINT").unwrap_or_else(|_| "http://localhost:3030/test".to_string())
}

fn create_context() -> Context {
    let mut config = Config::default();
    config.sparql = SparqlConfig {
        endpoint: format!("{}/query", endpoint()),
        update_endpoint: Some(format!("{}/update", endpoint())),
        ..SparqlConfig::default()
    };
    config.mapping.base_uri = "http://example.org/id".to_string();
    config.mapping.default_graph = Some(TEST_GRAPH.to_string());
    Context::connect(config, registry()).expect("Failed to create client")
}

/// Clean up test data before/after tests
async fn cleanup(ctx: &Context) {
    let _ = ctx.executor.clear_graph(&Iri::from_static(TEST_GRAPH)).await;
    let _ = load_ontology(ctx.executor.as_ref(), None, ONTOLOGY.as_bytes(), RdfFormat::Turtle).await;
}

// All tests share one graph and run serially
#[serial]
mod endpoint_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_load() {
        let ctx = create_context();
        cleanup(&ctx).await;
        let repo = ResourceRepository::<Project>::from_ref(&ctx);

        let mut project = Project {
            label: Some("Soil survey".to_string()),
            members: Lazy::loaded(Vec::new()),
            ..Default::default()
        };
        let uri = repo.create(&mut project).await.expect("Failed to create");

        let loaded = repo
            .load_by_uri(&uri)
            .await
            .expect("Query failed")
            .expect("Project not found");
        assert_eq!(loaded.label.as_deref(), Some("Soil survey"));
        assert_eq!(repo.count(&Search::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let ctx = create_context();
        cleanup(&ctx).await;
        let repo = ResourceRepository::<Project>::from_ref(&ctx);

        let mut project = Project {
            label: Some("Draft".to_string()),
            members: Lazy::loaded(Vec::new()),
            ..Default::default()
        };
        let uri = repo.create(&mut project).await.unwrap();

        project.label = Some("Final".to_string());
        repo.update(&project).await.expect("Failed to update");
        let loaded = repo.load_by_uri(&uri).await.unwrap().unwrap();
        assert_eq!(loaded.label.as_deref(), Some("Final"));

        repo.delete(&uri).await.expect("Failed to delete");
        assert!(!repo.uri_exists(&uri).await.unwrap());
    }

    #[tokio::test]
    async fn test_transaction_commit() {
        let ctx = create_context();
        cleanup(&ctx).await;
        let client = HttpClient::new(&ctx.config.sparql).unwrap();
        let repo = ResourceRepository::<Project>::from_ref(&ctx);

        let mapping = ctx.registry.mapping::<Project>().unwrap();
        let graph = Iri::from_static(TEST_GRAPH);
        let project = Project {
            uri: Some(id("txn-project")),
            label: Some("Transactional".to_string()),
            members: Lazy::loaded(Vec::new()),
        };
        let request = triplemap::mapping::synthesizer::build_create(
            &mapping,
            &ctx.registry,
            Some(&graph),
            &project,
        )
        .unwrap();

        let txn = client.begin().await.unwrap();
        txn.update(&request).await.unwrap();
        assert!(repo.load_by_uri(&id("txn-project")).await.unwrap().is_none());
        txn.commit().await.expect("Failed to commit");

        assert!(repo.load_by_uri(&id("txn-project")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_executor_is_shareable() {
        let ctx = create_context();
        let executor: Arc<dyn SparqlExecutor> = ctx.executor.clone();
        let ok = executor
            .ask(&triplemap::sparql::AskQuery::new(Default::default()))
            .await
            .expect("ASK failed");
        assert!(ok);
    }
}
