//! Write operations for the knowledge graph.
//!
//! All writes use MERGE (upsert) semantics so re-ingestion and re-derivation
//! are idempotent. Nodes are keyed by `id`; relationships by their endpoint
//! ids and type. Entity writes apply the cross-ontology label bridge: a node
//! created as `Investor` also carries `Organization` when the bridge says so.

use std::collections::BTreeMap;

use chrono::Utc;
use neo4rs::query;
use uuid::Uuid;

use meridian_schema::LabelBridge;

use crate::client::{cypher_ident, GraphClient, GraphError};

/// An entity instance to write, in whichever ontology vocabulary produced it.
#[derive(Debug, Clone)]
pub struct GraphEntity {
    pub id: Uuid,
    pub primary_type: String,
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

impl GraphEntity {
    pub fn new(primary_type: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            primary_type: primary_type.to_string(),
            name: name.to_string(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }
}

impl GraphClient {
    /// Upsert an entity node carrying its primary label plus every label the
    /// bridge maps it to.
    pub async fn upsert_entity(
        &self,
        bridge: &LabelBridge,
        entity: &GraphEntity,
    ) -> Result<(), GraphError> {
        let (cypher, scalar_params) = build_entity_upsert_cypher(bridge, entity)?;

        let mut q = query(&cypher)
            .param("id", entity.id.to_string())
            .param("name", entity.name.clone())
            .param("now", Utc::now().to_rfc3339());
        for (key, value) in scalar_params {
            q = q.param(&key, value);
        }

        self.run(q).await
    }

    /// Upsert a relationship between two existing nodes. MERGE keyed on the
    /// endpoint pair and relationship type; re-running never duplicates the
    /// edge.
    pub async fn upsert_relationship(
        &self,
        rel_type: &str,
        source_id: &Uuid,
        target_id: &Uuid,
    ) -> Result<(), GraphError> {
        let rel = cypher_ident(rel_type)?;
        let cypher = format!(
            "MATCH (a {{id: $source_id}})
             MATCH (b {{id: $target_id}})
             MERGE (a)-[r:{rel}]->(b)
             ON CREATE SET r.created_at = $now
             ON MATCH SET r.updated_at = $now"
        );

        let q = query(&cypher)
            .param("source_id", source_id.to_string())
            .param("target_id", target_id.to_string())
            .param("now", Utc::now().to_rfc3339());

        self.run(q).await
    }
}

/// Build the MERGE statement for an entity write. Separated from execution
/// so label composition is testable without a live store.
pub(crate) fn build_entity_upsert_cypher(
    bridge: &LabelBridge,
    entity: &GraphEntity,
) -> Result<(String, Vec<(String, String)>), GraphError> {
    let labels = bridge.write_labels(&entity.primary_type);
    let mut label_clause = String::new();
    for label in &labels {
        label_clause.push(':');
        label_clause.push_str(cypher_ident(label)?);
    }

    let mut set_fragments = vec!["n.name = $name".to_string()];
    let mut params = Vec::new();
    for (i, (key, value)) in entity.properties.iter().enumerate() {
        let key = cypher_ident(key)?;
        let param = format!("p{i}");
        set_fragments.push(format!("n.{key} = ${param}"));
        params.push((param, value.clone()));
    }
    let sets = set_fragments.join(", ");

    let cypher = format!(
        "MERGE (n{label_clause} {{id: $id}})
         ON CREATE SET {sets}, n.created_at = $now, n.updated_at = $now
         ON MATCH SET {sets}, n.updated_at = $now"
    );
    Ok((cypher, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_upsert_carries_bridged_labels() {
        let bridge = LabelBridge::standard();
        let entity = GraphEntity::new("Investor", "Blackstone");
        let (cypher, _) = build_entity_upsert_cypher(&bridge, &entity).unwrap();
        assert!(cypher.contains("MERGE (n:Investor:Organization {id: $id})"));
    }

    #[test]
    fn unbridged_entity_gets_single_label() {
        let bridge = LabelBridge::standard();
        let entity = GraphEntity::new("Deal", "Project Neptune");
        let (cypher, _) = build_entity_upsert_cypher(&bridge, &entity).unwrap();
        assert!(cypher.contains("MERGE (n:Deal {id: $id})"));
    }

    #[test]
    fn entity_properties_become_parameterized_sets() {
        let bridge = LabelBridge::new();
        let entity = GraphEntity::new("Deal", "Project Neptune")
            .with_property("status", "open")
            .with_property("stage", "diligence");
        let (cypher, params) = build_entity_upsert_cypher(&bridge, &entity).unwrap();

        // BTreeMap ordering: stage before status.
        assert!(cypher.contains("n.stage = $p0"));
        assert!(cypher.contains("n.status = $p1"));
        assert_eq!(
            params,
            vec![
                ("p0".to_string(), "diligence".to_string()),
                ("p1".to_string(), "open".to_string())
            ]
        );
    }

    #[test]
    fn hostile_label_or_property_is_rejected() {
        let bridge = LabelBridge::new().with_mapping("Investor", ["Bad Label"]);
        let entity = GraphEntity::new("Investor", "x");
        assert!(build_entity_upsert_cypher(&bridge, &entity).is_err());

        let bridge = LabelBridge::new();
        let entity = GraphEntity::new("Deal", "x").with_property("a b", "v");
        assert!(build_entity_upsert_cypher(&bridge, &entity).is_err());
    }
}
