//! Derived relationship patterns.
//!
//! An ontology can declare `advancedRelationships` per pattern family
//! (temporal, hierarchical, similarity, complex): an enable flag and
//! optional custom derivation query text. The engine expands the
//! configuration into MERGE-based Cypher statements and runs them; because
//! every write merges on the endpoint pair and relationship type, re-running
//! a derivation over unchanged data creates no duplicate edges.

use std::sync::Arc;

use neo4rs::query;

use meridian_core::Deadline;
use meridian_schema::{PatternFamily, SchemaError, SchemaRegistry};

use crate::client::{cypher_ident, GraphClient, GraphError};

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Ontology not loaded: {0}")]
    OntologyNotLoaded(String),

    #[error("Pattern family {family} is not enabled for ontology {ontology}")]
    FamilyNotEnabled {
        ontology: String,
        family: PatternFamily,
    },

    #[error("Pattern family complex requires a custom query for ontology {0}")]
    MissingCustomQuery(String),

    #[error("Pattern derivation failed: {0}")]
    Graph(#[from] GraphError),
}

/// What one derivation run did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PatternRunReport {
    pub ontology: String,
    pub family: PatternFamily,
    pub statements: usize,
    pub merged_edges: i64,
}

/// Executes configured pattern derivations against the graph.
pub struct PatternEngine {
    client: GraphClient,
    registry: Arc<SchemaRegistry>,
}

impl PatternEngine {
    pub fn new(client: GraphClient, registry: Arc<SchemaRegistry>) -> Self {
        Self { client, registry }
    }

    /// Run one pattern family for one ontology and write the derived
    /// relationships back to the graph.
    pub async fn derive(
        &self,
        ontology: &str,
        family: PatternFamily,
        deadline: Deadline,
    ) -> Result<PatternRunReport, PatternError> {
        let statements = derivation_statements(&self.registry, ontology, family)?;
        let mut merged_edges = 0i64;

        for cypher in &statements {
            if deadline.expired() {
                return Err(PatternError::Graph(GraphError::DeadlineExceeded));
            }
            let row = tokio::time::timeout(
                deadline.remaining(),
                self.client.query_one(query(cypher)),
            )
            .await
            .map_err(|_| PatternError::Graph(GraphError::DeadlineExceeded))??;

            if let Some(row) = row {
                merged_edges += row.get::<i64>("merged").unwrap_or(0);
            }
        }

        tracing::info!(
            ontology,
            family = %family,
            statements = statements.len(),
            merged_edges,
            "pattern derivation complete"
        );

        Ok(PatternRunReport {
            ontology: ontology.to_string(),
            family,
            statements: statements.len(),
            merged_edges,
        })
    }
}

/// Expand an ontology's configuration for one family into the Cypher
/// statements to run. Pure so the expansion is testable without a store.
pub(crate) fn derivation_statements(
    registry: &SchemaRegistry,
    ontology: &str,
    family: PatternFamily,
) -> Result<Vec<String>, PatternError> {
    let config = registry.pattern_config(ontology).map_err(|e| match e {
        SchemaError::UnknownOntology(name) => PatternError::OntologyNotLoaded(name),
        other => PatternError::OntologyNotLoaded(other.to_string()),
    })?;

    let family_config = config
        .and_then(|c| c.family(family))
        .filter(|fc| fc.enabled)
        .ok_or_else(|| PatternError::FamilyNotEnabled {
            ontology: ontology.to_string(),
            family,
        })?;

    if let Some(custom) = &family_config.query {
        return Ok(vec![custom.clone()]);
    }

    let labels = ontology_node_labels(registry, ontology)?;
    match family {
        PatternFamily::Temporal => Ok(labels
            .iter()
            .map(|label| temporal_statement(label))
            .collect()),
        PatternFamily::Hierarchical => {
            let pairs = registry.inheritance_pairs(ontology);
            if pairs.is_empty() {
                Ok(labels
                    .iter()
                    .map(|label| hierarchical_statement(label, label))
                    .collect())
            } else {
                let mut out = Vec::with_capacity(pairs.len());
                for (child, parent) in &pairs {
                    let child = checked_ident(child)?;
                    let parent = checked_ident(parent)?;
                    out.push(hierarchical_statement(&child, &parent));
                }
                Ok(out)
            }
        }
        PatternFamily::Similarity => {
            let mut out = Vec::new();
            for label in &labels {
                if let Some(key) = registry.key_properties(label).first() {
                    let key = checked_ident(key)?;
                    out.push(similarity_statement(label, &key));
                }
            }
            Ok(out)
        }
        PatternFamily::Complex => Err(PatternError::MissingCustomQuery(ontology.to_string())),
    }
}

/// Independent node labels of one ontology (property entities excluded),
/// validated for interpolation.
fn ontology_node_labels(
    registry: &SchemaRegistry,
    ontology: &str,
) -> Result<Vec<String>, PatternError> {
    let ont = registry
        .ontology(ontology)
        .ok_or_else(|| PatternError::OntologyNotLoaded(ontology.to_string()))?;

    let mut labels = Vec::new();
    for (name, spec) in &ont.entities {
        if spec.is_property {
            continue;
        }
        labels.push(checked_ident(name)?);
    }
    Ok(labels)
}

fn checked_ident(name: &str) -> Result<String, PatternError> {
    Ok(cypher_ident(name)?.to_string())
}

/// Chain nodes of one label in creation order: each node PRECEDES the next.
fn temporal_statement(label: &str) -> String {
    format!(
        "MATCH (n:{label}) WHERE n.created_at IS NOT NULL
         WITH n ORDER BY n.created_at ASC
         WITH collect(n) AS ordered
         UNWIND range(0, size(ordered) - 2) AS i
         WITH ordered[i] AS earlier, ordered[i + 1] AS later
         MERGE (earlier)-[r:PRECEDES]->(later)
         RETURN count(r) AS merged"
    )
}

/// Link instances to the instance their `parent_id` points at.
fn hierarchical_statement(child_label: &str, parent_label: &str) -> String {
    format!(
        "MATCH (child:{child_label}) WHERE child.parent_id IS NOT NULL
         MATCH (parent:{parent_label} {{id: child.parent_id}})
         MERGE (parent)-[r:PARENT_OF]->(child)
         RETURN count(r) AS merged"
    )
}

/// Link instance pairs sharing the label's first key property value. The
/// `a.id < b.id` ordering gives the merged edge a canonical direction.
fn similarity_statement(label: &str, key: &str) -> String {
    format!(
        "MATCH (a:{label}), (b:{label})
         WHERE a.id < b.id AND a.{key} IS NOT NULL AND a.{key} = b.{key}
         MERGE (a)-[r:SIMILAR_TO]->(b)
         RETURN count(r) AS merged"
    )
}
