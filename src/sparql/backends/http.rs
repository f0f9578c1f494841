//! SPARQL 1.1 protocol backend.
//!
//! Queries are rendered to text and posted to the query endpoint as
//! `application/sparql-query`; updates go to the update endpoint as
//! `application/sparql-update`. Results are read in the SPARQL JSON
//! results format.
//!
//! # Example
//!
//! ```ignore
//! use triplemap::sparql::backends::http::HttpClient;
//! use triplemap::sparql::{Sparql, QueryExt};
//!
//! let client = HttpClient::new(&config.sparql)?;
//! let sparql = Sparql::new(client);
//! let rows = sparql.query(select).fetch_all().await?;
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;

use crate::config::SparqlConfig;
use crate::error::MapperError;
use crate::rdf::vocabulary::xsd;
use crate::rdf::{Iri, Literal, Term};
use crate::sparql::algebra::{AskQuery, SelectQuery, UpdateRequest};
use crate::sparql::row::{Row, RowStream};
use crate::sparql::traits::{SparqlClient, SparqlExecutor, Transaction};

const QUERY_CONTENT_TYPE: &str = "application/sparql-query";
const UPDATE_CONTENT_TYPE: &str = "application/sparql-update";
const RESULTS_JSON: &str = "application/sparql-results+json";

// ----------------------------------------------------------------------------
// SPARQL JSON results
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    results: Option<Bindings>,
    #[serde(default)]
    boolean: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Bindings {
    bindings: Vec<HashMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(default)]
    datatype: Option<String>,
    #[serde(rename = "xml:lang", default)]
    lang: Option<String>,
}

impl Binding {
    /// Converts to a term. Blank nodes are not representable and yield `None`;
    /// the caller logs them.
    fn into_term(self) -> Result<Option<Term>, MapperError> {
        match self.kind.as_str() {
            "uri" => Ok(Some(Term::Iri(Iri::parse(&self.value)?))),
            "literal" | "typed-literal" => {
                let literal = match (self.lang, self.datatype) {
                    (Some(lang), _) => Literal::lang(self.value, lang),
                    (None, Some(datatype)) => Literal::typed(self.value, Iri::parse(&datatype)?),
                    (None, None) => Literal::typed(self.value, Iri::from_static(xsd::STRING)),
                };
                Ok(Some(Term::Literal(literal)))
            }
            "bnode" => Ok(None),
            other => Err(MapperError::Query {
                message: format!("unknown binding type '{}'", other),
                query: String::new(),
            }),
        }
    }
}

fn parse_rows(body: &str) -> Result<Vec<Row>, MapperError> {
    let results: SparqlResults = serde_json::from_str(body).map_err(|e| MapperError::Query {
        message: format!("malformed results document: {}", e),
        query: String::new(),
    })?;

    let bindings = results.results.map(|r| r.bindings).unwrap_or_default();
    let mut rows = Vec::with_capacity(bindings.len());
    for solution in bindings {
        let mut data = HashMap::with_capacity(solution.len());
        for (var, binding) in solution {
            let label = binding.value.clone();
            match binding.into_term()? {
                Some(term) => {
                    data.insert(var, term);
                }
                None => tracing::warn!(var = %var, bnode = %label, "Dropping blank node binding"),
            }
        }
        rows.push(Row::new(data));
    }
    Ok(rows)
}

fn parse_boolean(body: &str) -> Result<bool, MapperError> {
    let results: SparqlResults = serde_json::from_str(body).map_err(|e| MapperError::Query {
        message: format!("malformed results document: {}", e),
        query: String::new(),
    })?;
    results.boolean.ok_or_else(|| MapperError::Query {
        message: "ASK response carries no boolean".to_string(),
        query: String::new(),
    })
}

// ----------------------------------------------------------------------------
// HttpClient
// ----------------------------------------------------------------------------

/// A client for a remote SPARQL endpoint.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    query_endpoint: String,
    update_endpoint: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpClient {
    /// Creates a client from the `[sparql]` configuration section.
    pub fn new(config: &SparqlConfig) -> Result<Self, MapperError> {
        let query_endpoint = Iri::parse(&config.endpoint)?.as_str().to_string();
        let update_endpoint = match &config.update_endpoint {
            Some(endpoint) => Iri::parse(endpoint)?.as_str().to_string(),
            None => query_endpoint.clone(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("triplemap/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        tracing::info!(endpoint = %query_endpoint, "Connected SPARQL client");

        Ok(Self {
            client,
            query_endpoint,
            update_endpoint,
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    async fn post(&self, endpoint: &str, content_type: &str, body: String) -> Result<String, MapperError> {
        let mut request = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, RESULTS_JSON)
            .body(body.clone());
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(MapperError::Query {
                message: format!("endpoint returned {}: {}", status, text.trim()),
                query: body,
            });
        }
        Ok(text)
    }

    async fn send_update(&self, request: &UpdateRequest) -> Result<(), MapperError> {
        if request.is_empty() {
            return Ok(());
        }
        let text = request.to_string();
        tracing::debug!("SPARQL UPDATE\n{}", text);
        self.post(&self.update_endpoint, UPDATE_CONTENT_TYPE, text).await?;
        Ok(())
    }
}

#[async_trait]
impl SparqlExecutor for HttpClient {
    async fn select(&self, query: &SelectQuery) -> Result<RowStream<'_>, MapperError> {
        let text = query.to_string();
        tracing::debug!("SPARQL SELECT\n{}", text);
        let body = self.post(&self.query_endpoint, QUERY_CONTENT_TYPE, text).await?;
        let rows = parse_rows(&body)?;
        Ok(Box::pin(futures::stream::iter(rows.into_iter().map(Ok))))
    }

    async fn ask(&self, query: &AskQuery) -> Result<bool, MapperError> {
        let text = query.to_string();
        tracing::debug!("SPARQL ASK\n{}", text);
        let body = self.post(&self.query_endpoint, QUERY_CONTENT_TYPE, text).await?;
        parse_boolean(&body)
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), MapperError> {
        self.send_update(request).await
    }
}

// ----------------------------------------------------------------------------
// HttpTransaction
// ----------------------------------------------------------------------------

/// A transaction over the SPARQL protocol.
///
/// The protocol has no transactions, so updates are buffered and sent as a
/// single request on commit; the endpoint applies one request atomically.
pub struct HttpTransaction<'a> {
    client: &'a HttpClient,
    pending: Mutex<UpdateRequest>,
}

#[async_trait]
impl SparqlExecutor for HttpTransaction<'_> {
    async fn select(&self, query: &SelectQuery) -> Result<RowStream<'_>, MapperError> {
        self.client.select(query).await
    }

    async fn ask(&self, query: &AskQuery) -> Result<bool, MapperError> {
        self.client.ask(query).await
    }

    async fn update(&self, request: &UpdateRequest) -> Result<(), MapperError> {
        self.pending
            .lock()
            .map_err(|_| MapperError::Transaction("transaction lock poisoned".to_string()))?
            .extend(request.clone());
        Ok(())
    }
}

#[async_trait]
impl Transaction for HttpTransaction<'_> {
    async fn commit(self) -> Result<(), MapperError> {
        let pending = self
            .pending
            .into_inner()
            .map_err(|_| MapperError::Transaction("transaction lock poisoned".to_string()))?;
        tracing::debug!(
            "SPARQL TRANSACTION COMMIT ({} operations)",
            pending.operations().len()
        );
        self.client.send_update(&pending).await
    }

    async fn rollback(self) -> Result<(), MapperError> {
        tracing::debug!("SPARQL TRANSACTION ROLLBACK");
        Ok(())
    }
}

#[async_trait]
impl SparqlClient for HttpClient {
    type Tx<'a> = HttpTransaction<'a>;

    async fn begin(&self) -> Result<Self::Tx<'_>, MapperError> {
        tracing::debug!("SPARQL TRANSACTION START");
        Ok(HttpTransaction {
            client: self,
            pending: Mutex::new(UpdateRequest::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select_results() {
        let body = r#"{
            "head": { "vars": ["uri", "label", "rank", "note"] },
            "results": { "bindings": [
                {
                    "uri": { "type": "uri", "value": "http://x.org/a" },
                    "label": { "type": "literal", "value": "blé", "xml:lang": "fr" },
                    "rank": { "type": "literal", "value": "3",
                              "datatype": "http://www.w3.org/2001/XMLSchema#integer" }
                },
                {
                    "uri": { "type": "uri", "value": "http://x.org/b" },
                    "note": { "type": "bnode", "value": "b0" }
                }
            ] }
        }"#;

        let rows = parse_rows(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_iri("uri").unwrap().as_str(), "http://x.org/a");
        assert_eq!(rows[0].get::<i64>("rank").unwrap(), 3);
        assert_eq!(
            rows[0].get_raw("label").and_then(|t| t.as_literal()).and_then(|l| l.language()),
            Some("fr")
        );
        // The blank node is left unbound; the rest of the row survives.
        assert_eq!(rows[1].len(), 1);
        assert!(rows[1].get_raw("note").is_none());
    }

    #[test]
    fn test_parse_plain_literal_defaults_to_string() {
        let body = r#"{ "results": { "bindings": [
            { "label": { "type": "literal", "value": "a" } }
        ] } }"#;
        let rows = parse_rows(body).unwrap();
        assert_eq!(
            rows[0].get_raw("label"),
            Some(&Term::Literal(Literal::string("a")))
        );
    }

    #[test]
    fn test_parse_boolean() {
        assert!(parse_boolean(r#"{ "head": {}, "boolean": true }"#).unwrap());
        assert!(!parse_boolean(r#"{ "head": {}, "boolean": false }"#).unwrap());
        assert!(parse_boolean(r#"{ "head": {} }"#).is_err());
    }

    #[test]
    fn test_parse_malformed_document() {
        assert!(matches!(parse_rows("not json"), Err(MapperError::Query { .. })));
    }

    #[test]
    fn test_client_rejects_invalid_endpoint() {
        let config = SparqlConfig {
            endpoint: "not an endpoint".to_string(),
            ..SparqlConfig::default()
        };
        assert!(matches!(
            HttpClient::new(&config),
            Err(MapperError::InvalidIri { .. })
        ));
    }
}
