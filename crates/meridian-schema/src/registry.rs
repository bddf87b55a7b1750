//! The composite schema registry: single source of truth for which entity
//! and relationship types exist and how they relate.
//!
//! Entity names are unique within one ontology but may legitimately repeat
//! across ontologies (same concept, different vocabulary). The registry
//! keeps every definition and tracks provenance per (ontology, entity);
//! nothing is silently dropped.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use crate::error::SchemaError;
use crate::ontology::{EntitySpec, OntologyDefinition, PatternConfig};

/// Merged view over all loaded ontology definitions.
///
/// Built during startup, then shared read-only. Calling `load` again during
/// a quiescent reconfiguration phase replaces ontologies by name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    ontologies: BTreeMap<String, OntologyDefinition>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of definitions into the composite schema.
    ///
    /// Re-registration by ontology name replaces the previous definition
    /// rather than duplicating it. Safe to call multiple times, but only
    /// while no queries are in flight.
    pub fn load(&mut self, definitions: Vec<OntologyDefinition>) -> Result<(), SchemaError> {
        for def in definitions {
            if def.name.trim().is_empty() {
                return Err(SchemaError::InvalidDefinition(
                    "ontology name must not be empty".to_string(),
                ));
            }

            if self.ontologies.contains_key(&def.name) {
                tracing::info!(ontology = %def.name, "replacing previously registered ontology");
            } else {
                tracing::info!(
                    ontology = %def.name,
                    entities = def.entities.len(),
                    relationships = def.relationships.len(),
                    "registered ontology"
                );
            }

            for entity in def.entities.keys() {
                let elsewhere: Vec<&str> = self
                    .ontologies
                    .iter()
                    .filter(|(name, ont)| {
                        name.as_str() != def.name && ont.entities.contains_key(entity)
                    })
                    .map(|(name, _)| name.as_str())
                    .collect();
                if !elsewhere.is_empty() {
                    tracing::debug!(
                        entity = %entity,
                        ontology = %def.name,
                        also_defined_in = ?elsewhere,
                        "entity type defined in multiple ontologies"
                    );
                }
            }

            self.ontologies.insert(def.name.clone(), def);
        }
        Ok(())
    }

    /// Load every `*.json` definition in a directory, sorted by file name so
    /// startup is deterministic.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, SchemaError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            definitions.push(OntologyDefinition::from_file(&path)?);
        }
        let count = definitions.len();
        self.load(definitions)?;
        Ok(count)
    }

    // ── Label Queries ────────────────────────────────────────────

    /// Whether `name` is an entity type in any loaded ontology.
    pub fn is_valid_label(&self, name: &str) -> bool {
        self.ontologies
            .values()
            .any(|ont| ont.entities.contains_key(name))
    }

    /// Resolve a label case-insensitively to its canonical casing.
    pub fn canonical_label(&self, name: &str) -> Option<&str> {
        for ont in self.ontologies.values() {
            for entity in ont.entities.keys() {
                if entity.eq_ignore_ascii_case(name) {
                    return Some(entity);
                }
            }
        }
        None
    }

    /// All entity type names across every ontology, deduplicated.
    pub fn all_node_labels(&self) -> BTreeSet<String> {
        self.ontologies
            .values()
            .flat_map(|ont| ont.entities.keys().cloned())
            .collect()
    }

    /// All relationship type names across every ontology, deduplicated.
    pub fn all_relationship_types(&self) -> BTreeSet<String> {
        self.ontologies
            .values()
            .flat_map(|ont| ont.relationships.keys().cloned())
            .collect()
    }

    /// Every ontology that defines the given entity type.
    pub fn provenance(&self, entity_type: &str) -> Vec<&str> {
        self.ontologies
            .iter()
            .filter(|(_, ont)| ont.entities.contains_key(entity_type))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn ontology_names(&self) -> Vec<&str> {
        self.ontologies.keys().map(String::as_str).collect()
    }

    pub fn ontology(&self, name: &str) -> Option<&OntologyDefinition> {
        self.ontologies.get(name)
    }

    // ── Entity Spec Queries ──────────────────────────────────────

    /// Key properties for an entity type: its own, or the nearest
    /// ancestor's, or empty. The parent walk carries a visited set; a cycle
    /// in the definition data is logged and treated as end-of-chain rather
    /// than recursing forever.
    pub fn key_properties(&self, entity_type: &str) -> Vec<String> {
        for ont in self.ontologies.values() {
            if !ont.entities.contains_key(entity_type) {
                continue;
            }

            let mut visited: HashSet<&str> = HashSet::new();
            let mut current = entity_type;
            while let Some(spec) = ont.entities.get(current) {
                if !visited.insert(current) {
                    tracing::warn!(
                        ontology = %ont.name,
                        entity = %current,
                        "parent chain cycle detected; treating entity as parentless"
                    );
                    break;
                }
                if !spec.key_properties.is_empty() {
                    return spec.key_properties.clone();
                }
                match &spec.parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        Vec::new()
    }

    /// All entity types flagged as property entities.
    pub fn property_entity_types(&self) -> BTreeSet<String> {
        self.entity_types_where(|spec| spec.is_property)
    }

    /// All entity types declaring a vector index.
    pub fn vector_indexed_types(&self) -> BTreeSet<String> {
        self.entity_types_where(|spec| spec.vector_index)
    }

    fn entity_types_where(&self, pred: impl Fn(&EntitySpec) -> bool) -> BTreeSet<String> {
        self.ontologies
            .values()
            .flat_map(|ont| {
                ont.entities
                    .iter()
                    .filter(|(_, spec)| pred(spec))
                    .map(|(name, _)| name.clone())
            })
            .collect()
    }

    /// Enrichment service declared for an entity type, if any.
    pub fn enrichment_service(&self, entity_type: &str) -> Option<&str> {
        self.ontologies.values().find_map(|ont| {
            ont.entities
                .get(entity_type)
                .and_then(|spec| spec.enrichment.as_ref())
                .map(|e| e.service.as_str())
        })
    }

    /// Properties the enrichment service populates for an entity type.
    pub fn enrichment_properties(&self, entity_type: &str) -> Vec<String> {
        self.ontologies
            .values()
            .find_map(|ont| {
                ont.entities
                    .get(entity_type)
                    .and_then(|spec| spec.enrichment.as_ref())
                    .map(|e| e.properties.clone())
            })
            .unwrap_or_default()
    }

    /// Advanced relationship pattern configuration for an ontology.
    pub fn pattern_config(&self, ontology: &str) -> Result<Option<&PatternConfig>, SchemaError> {
        let ont = self
            .ontologies
            .get(ontology)
            .ok_or_else(|| SchemaError::UnknownOntology(ontology.to_string()))?;
        Ok(ont.advanced_relationships.as_ref())
    }

    /// (child, parent) pairs of an ontology's inheritance forest, sorted.
    pub fn inheritance_pairs(&self, ontology: &str) -> Vec<(String, String)> {
        self.ontologies
            .get(ontology)
            .map(|ont| {
                ont.entities
                    .iter()
                    .filter_map(|(name, spec)| {
                        spec.parent.as_ref().map(|p| (name.clone(), p.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Prompt Context ───────────────────────────────────────────

    /// Deterministic, human-readable dump of the composite schema, used
    /// verbatim as LLM prompt context. Sorted by name so identical schema
    /// state always produces an identical prompt.
    pub fn schema_representation(&self) -> String {
        let mut entities: BTreeMap<&str, Vec<(&str, &EntitySpec)>> = BTreeMap::new();
        let mut relationships: BTreeMap<&str, Vec<(&str, &crate::ontology::RelationSpec)>> =
            BTreeMap::new();

        for (ont_name, ont) in &self.ontologies {
            for (entity, spec) in &ont.entities {
                entities
                    .entry(entity.as_str())
                    .or_default()
                    .push((ont_name.as_str(), spec));
            }
            for (rel, spec) in &ont.relationships {
                relationships
                    .entry(rel.as_str())
                    .or_default()
                    .push((ont_name.as_str(), spec));
            }
        }

        let mut out = String::new();
        out.push_str("Entity types:\n");
        for (entity, defs) in &entities {
            for (ont_name, spec) in defs {
                let _ = writeln!(
                    out,
                    "  {entity} [{ont_name}]: {}",
                    if spec.description.is_empty() {
                        "(no description)"
                    } else {
                        &spec.description
                    }
                );
            }
        }
        out.push_str("Relationship types:\n");
        for (rel, defs) in &relationships {
            for (ont_name, spec) in defs {
                let _ = writeln!(
                    out,
                    "  {rel} [{ont_name}]: ({}) -> ({}) {}",
                    spec.domain.join(" | "),
                    spec.range.join(" | "),
                    spec.description
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::OntologyDefinition;

    fn crm() -> OntologyDefinition {
        OntologyDefinition::from_json(
            r#"{
            "name": "crm",
            "entities": {
                "Person": { "description": "A human", "keyProperties": ["email"] },
                "Contact": { "description": "A known person", "parent": "Person" },
                "Organization": { "description": "A company", "keyProperties": ["name"] },
                "Note": { "description": "Free text", "isProperty": true }
            },
            "relationships": {
                "WORKS_FOR": { "domain": "Person", "range": "Organization", "description": "Employment" }
            }
        }"#,
        )
        .unwrap()
    }

    fn financial() -> OntologyDefinition {
        OntologyDefinition::from_json(
            r#"{
            "name": "financial",
            "entities": {
                "Investor": { "description": "An investing organization", "keyProperties": ["name"] },
                "Deal": { "description": "An investment deal", "vectorIndex": true },
                "Organization": { "description": "A financial counterparty" }
            },
            "relationships": {
                "INVESTED_IN": { "domain": "Investor", "range": "Deal", "description": "Capital committed" }
            },
            "advancedRelationships": {
                "temporal": { "enabled": true }
            }
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn labels_are_deduplicated_and_cover_all_ontologies() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm(), financial()]).unwrap();

        let labels = reg.all_node_labels();
        // Organization appears in both ontologies but only once in the set.
        assert_eq!(
            labels.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["Contact", "Deal", "Investor", "Note", "Organization", "Person"]
        );
        for entity in crm().entities.keys() {
            assert!(labels.contains(entity));
        }
        for entity in financial().entities.keys() {
            assert!(labels.contains(entity));
        }

        let rels = reg.all_relationship_types();
        assert!(rels.contains("WORKS_FOR"));
        assert!(rels.contains("INVESTED_IN"));
    }

    #[test]
    fn provenance_tracks_repeated_entity_names() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm(), financial()]).unwrap();
        assert_eq!(reg.provenance("Organization"), vec!["crm", "financial"]);
        assert_eq!(reg.provenance("Deal"), vec!["financial"]);
    }

    #[test]
    fn key_properties_inherit_from_nearest_ancestor() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm()]).unwrap();

        // Own key properties win.
        assert_eq!(reg.key_properties("Person"), vec!["email"]);
        // Contact has none; inherits Person's.
        assert_eq!(reg.key_properties("Contact"), vec!["email"]);
        // Note has none anywhere in its (empty) chain.
        assert!(reg.key_properties("Note").is_empty());
        // Unknown type yields empty, not an error.
        assert!(reg.key_properties("Ghost").is_empty());
    }

    #[test]
    fn key_properties_terminate_on_parent_cycle() {
        // Bypass from_json validation to simulate corrupt definition data:
        // A -> B -> A.
        let mut def = crm();
        def.entities.get_mut("Person").unwrap().parent = Some("Contact".to_string());
        def.entities.get_mut("Person").unwrap().key_properties = Vec::new();

        let mut reg = SchemaRegistry::new();
        reg.load(vec![def]).unwrap();

        // Must terminate and fall back to empty.
        assert!(reg.key_properties("Contact").is_empty());
    }

    #[test]
    fn reregistration_replaces_by_name() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm()]).unwrap();
        assert!(reg.is_valid_label("Note"));

        let trimmed = OntologyDefinition::from_json(
            r#"{
            "name": "crm",
            "entities": { "Person": { "description": "A human" } }
        }"#,
        )
        .unwrap();
        reg.load(vec![trimmed]).unwrap();

        assert_eq!(reg.ontology_names(), vec!["crm"]);
        assert!(reg.is_valid_label("Person"));
        assert!(!reg.is_valid_label("Note"));
    }

    #[test]
    fn canonical_label_is_case_insensitive() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm()]).unwrap();
        assert_eq!(reg.canonical_label("organization"), Some("Organization"));
        assert_eq!(reg.canonical_label("CONTACT"), Some("Contact"));
        assert_eq!(reg.canonical_label("Widget"), None);
    }

    #[test]
    fn property_and_vector_types() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm(), financial()]).unwrap();
        assert_eq!(
            reg.property_entity_types().into_iter().collect::<Vec<_>>(),
            vec!["Note"]
        );
        assert_eq!(
            reg.vector_indexed_types().into_iter().collect::<Vec<_>>(),
            vec!["Deal"]
        );
    }

    #[test]
    fn enrichment_lookup() {
        let def = OntologyDefinition::from_json(
            r#"{
            "name": "crm",
            "entities": {
                "Organization": {
                    "description": "A company",
                    "enrichment": { "service": "company-registry", "properties": ["vat_number"] }
                }
            }
        }"#,
        )
        .unwrap();
        let mut reg = SchemaRegistry::new();
        reg.load(vec![def]).unwrap();

        assert_eq!(
            reg.enrichment_service("Organization"),
            Some("company-registry")
        );
        assert_eq!(
            reg.enrichment_properties("Organization"),
            vec!["vat_number"]
        );
        assert_eq!(reg.enrichment_service("Person"), None);
    }

    #[test]
    fn pattern_config_distinguishes_unknown_ontology() {
        let mut reg = SchemaRegistry::new();
        reg.load(vec![crm(), financial()]).unwrap();

        assert!(matches!(
            reg.pattern_config("procurement"),
            Err(SchemaError::UnknownOntology(_))
        ));
        // Loaded but unconfigured.
        assert!(reg.pattern_config("crm").unwrap().is_none());
        // Loaded and configured.
        let cfg = reg.pattern_config("financial").unwrap().unwrap();
        assert!(cfg.temporal.as_ref().unwrap().enabled);
    }

    #[test]
    fn schema_representation_is_deterministic_and_sorted() {
        let mut a = SchemaRegistry::new();
        a.load(vec![crm(), financial()]).unwrap();

        let mut b = SchemaRegistry::new();
        b.load(vec![financial(), crm()]).unwrap();

        let repr = a.schema_representation();
        assert_eq!(repr, b.schema_representation());

        // Both provenance lines for the repeated entity are present.
        assert!(repr.contains("Organization [crm]"));
        assert!(repr.contains("Organization [financial]"));
        assert!(repr.contains("WORKS_FOR [crm]: (Person) -> (Organization)"));

        // Entities listed in sorted order.
        let contact_pos = repr.find("Contact").unwrap();
        let person_pos = repr.find("Person").unwrap();
        assert!(contact_pos < person_pos);
    }

    #[test]
    fn load_dir_reads_sorted_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("10-crm.json"),
            serde_json::to_string(&crm()).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("20-financial.json"),
            serde_json::to_string(&financial()).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not an ontology").unwrap();

        let mut reg = SchemaRegistry::new();
        let count = reg.load_dir(dir.path()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(reg.ontology_names(), vec!["crm", "financial"]);
    }
}
