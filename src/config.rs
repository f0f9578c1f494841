//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/triplemap/config.toml` (XDG) or platform config dir
//! 2. Project config: `.triplemap.toml`
//! 3. Environment variables: `TRIPLEMAP_*`
//!
//! # Intended Usage
//!
//! **Global config** (`~/.config/triplemap/config.toml`):
//! ```toml
//! [sparql]
//! endpoint = "http://localhost:7200/repositories/lab"
//! update_endpoint = "http://localhost:7200/repositories/lab/statements"
//! timeout_secs = 30
//! username = "admin"
//! password = "secret"
//! ```
//!
//! **Project config** (`.triplemap.toml`):
//! ```toml
//! [mapping]
//! base_uri = "http://example.org/id"
//! default_graph = "http://example.org/graph/main"
//!
//! [vocabulary.vocab]
//! iri = "http://example.org/onto#"
//! terms = ["Experiment", "Project", "hasProject"]
//!
//! [log]
//! filter = "triplemap=debug"
//! ```
//!
//! Vocabulary sections are merged into the built-in rdf, rdfs, owl and xsd
//! namespaces. IRIs minted by repositories have the form
//! `<base_uri>/<type-local-name>/<ulid>`.

use std::collections::BTreeMap;
use std::ops::Deref;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::MapperError;
use crate::rdf::{Iri, Namespace, Vocabulary};

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sparql: SparqlConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    /// Extra ontology namespaces, keyed by prefix.
    #[serde(default)]
    pub vocabulary: BTreeMap<String, VocabularyConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

/// SPARQL endpoint configuration.
///
/// Typically defined in global config (`~/.config/triplemap/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparqlConfig {
    /// Query endpoint.
    pub endpoint: String,
    /// Update endpoint; the query endpoint when absent.
    #[serde(default)]
    pub update_endpoint: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

impl Default for SparqlConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7200/repositories/triplemap".to_string(),
            update_endpoint: None,
            timeout_secs: default_timeout(),
            username: None,
            password: None,
        }
    }
}

/// Mapping defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Graph used when neither the caller nor the type names one.
    #[serde(default)]
    pub default_graph: Option<String>,
    /// Prefix of minted resource IRIs.
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
}

fn default_base_uri() -> String {
    "http://triplemap.local/id".to_string()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            default_graph: None,
            base_uri: default_base_uri(),
        }
    }
}

impl MappingConfig {
    /// The configured default graph, parsed.
    pub fn default_graph(&self) -> Result<Option<Iri>, MapperError> {
        self.default_graph.as_deref().map(Iri::parse).transpose()
    }
}

/// One ontology namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyConfig {
    pub iri: String,
    #[serde(default)]
    pub terms: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directives; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Config {
    /// Load config with layered resolution (user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// The layered provider chain, exposed so callers can merge overrides.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            // Layer 1: User config (lowest priority)
            .merge(Toml::file(Self::user_config_path()))
            // Layer 2: Project config
            .merge(Toml::file(".triplemap.toml"))
            // Layer 3: Environment variables (highest priority)
            .merge(Env::prefixed("TRIPLEMAP_").split("__"))
    }

    /// The built-in vocabulary extended with the configured namespaces.
    pub fn vocabulary(&self) -> Vocabulary {
        let mut vocabulary = Vocabulary::default();
        for (prefix, ns) in &self.vocabulary {
            vocabulary.add(Namespace::new(prefix.clone(), ns.iri.clone(), ns.terms.clone()));
        }
        vocabulary
    }

    /// User config path: ~/.config/triplemap/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        // Prefer XDG config location (~/.config) on all platforms
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("triplemap").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        // Fall back to platform-specific config dir
        dirs::config_dir()
            .map(|p| p.join("triplemap").join("config.toml"))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sparql.timeout_secs, 30);
        assert_eq!(config.log.filter, "info");
        assert!(config.mapping.default_graph().unwrap().is_none());
    }

    #[test]
    fn test_layered_resolution() {
        Jail::expect_with(|jail| {
            jail.create_file(
                ".triplemap.toml",
                r#"
                [sparql]
                endpoint = "http://localhost:3030/lab/query"
                update_endpoint = "http://localhost:3030/lab/update"

                [mapping]
                base_uri = "http://example.org/id"

                [vocabulary.vocab]
                iri = "http://example.org/onto#"
                terms = ["Experiment"]
                "#,
            )?;
            jail.set_env("TRIPLEMAP_SPARQL__TIMEOUT_SECS", "5");

            let config: Config = Config::figment().extract()?;
            assert_eq!(config.sparql.endpoint, "http://localhost:3030/lab/query");
            assert_eq!(config.sparql.timeout_secs, 5);
            assert_eq!(config.mapping.base_uri, "http://example.org/id");
            assert!(config.vocabulary().resolve("vocab", "Experiment").is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_default_graph() {
        let mapping = MappingConfig {
            default_graph: Some("not an iri".to_string()),
            ..MappingConfig::default()
        };
        assert!(mapping.default_graph().is_err());
    }
}
