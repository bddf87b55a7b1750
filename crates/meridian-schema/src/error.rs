//! Error types for ontology loading and schema queries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid ontology definition: {0}")]
    InvalidDefinition(String),

    #[error("Ontology not loaded: {0}")]
    UnknownOntology(String),

    #[error("Failed to read ontology file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse ontology JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
