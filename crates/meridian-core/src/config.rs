//! Configuration for Meridian services.
//!
//! Loaded from `meridian.toml` plus `MERIDIAN_`-prefixed environment
//! variables (`__` separator), in that priority order. Every field has a
//! working local-development default.

use serde::Deserialize;

/// Top-level configuration shared by the query binary and embedding services.
#[derive(Debug, Clone, Deserialize)]
pub struct MeridianConfig {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub query: QuerySettings,

    /// Directory of ontology definition JSON files loaded at startup.
    #[serde(default = "default_ontology_dir")]
    pub ontology_dir: String,
}

/// Connection settings for the graph store.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_user")]
    pub user: String,

    #[serde(default = "default_neo4j_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Settings for the assisted translation path. When `api_key` is empty the
/// translator runs fast-path only.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Hard cap on one completion call; the per-request deadline may
    /// shorten it further.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Tuning for translation and execution.
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySettings {
    /// Result cap applied when the question does not name a top-N.
    #[serde(default = "default_result_limit")]
    pub default_result_limit: u32,

    /// Ceiling on caller-supplied top-N values.
    #[serde(default = "default_max_result_limit")]
    pub max_result_limit: u32,

    /// How many prior conversation turns feed the assisted prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Per-request budget for the whole pipeline, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_ontology_dir() -> String {
    "./ontologies".to_string()
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_neo4j_password() -> String {
    "meridian-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    20
}

fn default_result_limit() -> u32 {
    10
}

fn default_max_result_limit() -> u32 {
    100
}

fn default_history_window() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for MeridianConfig {
    fn default() -> Self {
        Self {
            neo4j: Neo4jSettings::default(),
            llm: LlmSettings::default(),
            query: QuerySettings::default(),
            ontology_dir: default_ontology_dir(),
        }
    }
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: default_neo4j_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_result_limit: default_result_limit(),
            max_result_limit: default_max_result_limit(),
            history_window: default_history_window(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl MeridianConfig {
    /// Load configuration from `<file_prefix>.toml` and the environment.
    /// Missing file and missing keys fall back to defaults.
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("MERIDIAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let cfg = MeridianConfig::default();
        assert_eq!(cfg.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(cfg.neo4j.max_connections, 16);
        assert_eq!(cfg.query.default_result_limit, 10);
        assert_eq!(cfg.query.history_window, 3);
        assert_eq!(cfg.ontology_dir, "./ontologies");
        assert!(cfg.llm.api_key.is_empty());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = MeridianConfig::load("meridian-test-does-not-exist").unwrap();
        assert_eq!(cfg.query.max_result_limit, 100);
        assert_eq!(cfg.llm.timeout_secs, 20);
    }
}
