//! Strongly-typed ontology definition model.
//!
//! Definitions arrive as JSON files authored per business domain. Parsing
//! happens once at load time; anything malformed is rejected there with a
//! `SchemaError` instead of leaking loosely-typed values into the pipeline.
//!
//! Maps are BTree-backed so every derived view of the schema iterates in a
//! stable order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// A named bundle of entity and relationship type definitions for one
/// business domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyDefinition {
    pub name: String,

    #[serde(default)]
    pub entities: BTreeMap<String, EntitySpec>,

    #[serde(default)]
    pub relationships: BTreeMap<String, RelationSpec>,

    #[serde(
        default,
        rename = "advancedRelationships",
        skip_serializing_if = "Option::is_none"
    )]
    pub advanced_relationships: Option<PatternConfig>,
}

/// One entity type (graph node label) within an ontology.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpec {
    #[serde(default)]
    pub description: String,

    /// Parent entity type within the same ontology; key properties are
    /// inherited through this chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_properties: Vec<String>,

    /// Property entities exist only to be embedded as property values on
    /// another entity, never as independent nodes.
    #[serde(default)]
    pub is_property: bool,

    #[serde(default)]
    pub vector_index: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentSpec>,
}

/// Third-party enrichment hook declared on an entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSpec {
    pub service: String,
    #[serde(default)]
    pub properties: Vec<String>,
}

/// One relationship type, with its domain and range entity types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSpec {
    pub domain: OneOrMany,
    pub range: OneOrMany,
    #[serde(default)]
    pub description: String,
}

/// Ontology authors write `"domain": "Person"` or `"domain": ["Person",
/// "Organization"]` interchangeably.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            OneOrMany::One(s) => std::slice::from_ref(s).iter().map(String::as_str),
            OneOrMany::Many(v) => v.as_slice().iter().map(String::as_str),
        }
    }

    pub fn join(&self, sep: &str) -> String {
        self.iter().collect::<Vec<_>>().join(sep)
    }
}

// ── Advanced Relationship Patterns ────────────────────────────────

/// Per-ontology configuration of derived relationship patterns.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatternConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<PatternFamilyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchical: Option<PatternFamilyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<PatternFamilyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complex: Option<PatternFamilyConfig>,
}

impl PatternConfig {
    pub fn family(&self, family: PatternFamily) -> Option<&PatternFamilyConfig> {
        match family {
            PatternFamily::Temporal => self.temporal.as_ref(),
            PatternFamily::Hierarchical => self.hierarchical.as_ref(),
            PatternFamily::Similarity => self.similarity.as_ref(),
            PatternFamily::Complex => self.complex.as_ref(),
        }
    }
}

/// One pattern family: an enable flag plus optional custom derivation query
/// text overriding the built-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternFamilyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternFamily {
    Temporal,
    Hierarchical,
    Similarity,
    Complex,
}

impl fmt::Display for PatternFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatternFamily::Temporal => "temporal",
            PatternFamily::Hierarchical => "hierarchical",
            PatternFamily::Similarity => "similarity",
            PatternFamily::Complex => "complex",
        };
        f.write_str(s)
    }
}

impl FromStr for PatternFamily {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "temporal" => Ok(PatternFamily::Temporal),
            "hierarchical" => Ok(PatternFamily::Hierarchical),
            "similarity" => Ok(PatternFamily::Similarity),
            "complex" => Ok(PatternFamily::Complex),
            other => Err(SchemaError::InvalidDefinition(format!(
                "unknown pattern family: {other}"
            ))),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────

impl OntologyDefinition {
    /// Parse one ontology definition from JSON, rejecting anything that does
    /// not fit the typed model.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let def: OntologyDefinition = serde_json::from_str(json)?;
        def.validate()?;
        Ok(def)
    }

    /// Read and parse an ontology definition file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::InvalidDefinition(
                "ontology name must not be empty".to_string(),
            ));
        }

        for (entity, spec) in &self.entities {
            if entity.trim().is_empty() {
                return Err(SchemaError::InvalidDefinition(format!(
                    "ontology {}: entity type name must not be empty",
                    self.name
                )));
            }
            if let Some(parent) = &spec.parent {
                if !self.entities.contains_key(parent) {
                    return Err(SchemaError::InvalidDefinition(format!(
                        "ontology {}: entity {entity} declares unknown parent {parent}",
                        self.name
                    )));
                }
            }
        }

        // Relationships pointing at types outside this ontology are legal
        // (cross-ontology edges); only warn so authors can spot typos.
        for (rel, spec) in &self.relationships {
            for endpoint in spec.domain.iter().chain(spec.range.iter()) {
                if !self.entities.contains_key(endpoint) {
                    tracing::debug!(
                        ontology = %self.name,
                        relationship = %rel,
                        endpoint = %endpoint,
                        "relationship endpoint not defined in this ontology"
                    );
                }
            }
        }

        Ok(())
    }
}
